use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::CatalogClient;
use crate::catalog::http::MAX_PAGE_SIZE;
use crate::fetcher::FetcherRegistry;
use crate::query::{RelationshipsQuery, DEFAULT_MAX_WORKERS};
use crate::resources::ResourceType;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relquery: RelqueryConfig,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub fetchers: FetchersConfig,
}

/// General settings
#[derive(Debug, Clone, Deserialize)]
pub struct RelqueryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RelqueryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Catalog API connection
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub base_url: String,
    pub project: String,
    /// Environment variable holding the bearer token
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

/// Resolver tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
        }
    }
}

/// Per-type `ignore_unknown_ids` overrides; unset types keep the registry default
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchersConfig {
    pub asset: Option<bool>,
    pub time_series: Option<bool>,
    pub file: Option<bool>,
    pub event: Option<bool>,
    pub sequence: Option<bool>,
}

impl FetchersConfig {
    fn get(&self, resource_type: ResourceType) -> Option<bool> {
        match resource_type {
            ResourceType::Asset => self.asset,
            ResourceType::TimeSeries => self.time_series,
            ResourceType::File => self.file,
            ResourceType::Event => self.event,
            ResourceType::Sequence => self.sequence,
        }
    }

    /// Apply the overrides on top of a registry.
    pub fn apply(&self, registry: FetcherRegistry) -> FetcherRegistry {
        ResourceType::ALL
            .into_iter()
            .fold(registry, |registry, t| match self.get(t) {
                Some(ignore) => registry.with_ignore_unknown_ids(t, ignore),
                None => registry,
            })
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_key_env() -> String {
    "RELQUERY_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in RELQUERY_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env may itself set RELQUERY_CONFIG
        let _ = dotenv::dotenv();

        let config_path = std::env::var("RELQUERY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit file path
    ///
    /// Also loads the .env file (if present) before validating.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&config_str)?;
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from a TOML string without validating it
    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s).context("Failed to parse config.toml")
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.catalog.base_url)
            .with_context(|| format!("catalog.base_url is not a valid URL: {}", self.catalog.base_url))?;

        if self.catalog.project.trim().is_empty() {
            anyhow::bail!("catalog.project must not be empty");
        }

        std::env::var(&self.catalog.api_key_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable with your API token.",
                self.catalog.api_key_env
            )
        })?;

        if self.catalog.page_size == 0 || self.catalog.page_size > MAX_PAGE_SIZE {
            anyhow::bail!("catalog.page_size must be between 1 and {}", MAX_PAGE_SIZE);
        }

        if self.resolver.max_workers == 0 {
            anyhow::bail!("resolver.max_workers must be greater than 0");
        }

        Ok(())
    }

    /// Build a catalog client from the `[catalog]` section
    pub fn catalog_client(&self) -> Result<CatalogClient> {
        let token = std::env::var(&self.catalog.api_key_env)
            .with_context(|| format!("Environment variable {} not set", self.catalog.api_key_env))?;

        let client = CatalogClient::new(
            &self.catalog.base_url,
            &self.catalog.project,
            token,
            Duration::from_secs(self.catalog.timeout_secs),
        )?
        .with_page_size(self.catalog.page_size);

        Ok(client)
    }

    /// Build a relationship query backed by the catalog client
    pub fn relationships_query(&self) -> Result<RelationshipsQuery> {
        let client = Arc::new(self.catalog_client()?);
        let registry = self.fetchers.apply(FetcherRegistry::new(client.clone()));

        Ok(RelationshipsQuery::with_registry(client, registry)
            .with_max_workers(self.resolver.max_workers))
    }
}
