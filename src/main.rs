use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use relquery::relationships::DataSetId;
use relquery::{Config, LabelFilter, QueryParams, ResourceFilter, ResourceType};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "relquery", version, about = "Query relationships with resolved endpoints")]
struct Cli {
    /// Config file (overrides RELQUERY_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List relationships and print them with source and target resources as JSON lines
    Query(QueryArgs),
}

#[derive(Args)]
struct QueryArgs {
    /// Source external id (repeatable)
    #[arg(long = "source")]
    sources: Vec<String>,

    /// Source resource type (repeatable)
    #[arg(long = "source-type", value_parser = parse_resource_type)]
    source_types: Vec<ResourceType>,

    /// Keep only sources carrying one of these labels (repeatable)
    #[arg(long = "source-label")]
    source_labels: Vec<String>,

    /// Target external id (repeatable)
    #[arg(long = "target")]
    targets: Vec<String>,

    /// Target resource type (repeatable)
    #[arg(long = "target-type", value_parser = parse_resource_type)]
    target_types: Vec<ResourceType>,

    /// Keep only targets carrying one of these labels (repeatable)
    #[arg(long = "target-label")]
    target_labels: Vec<String>,

    /// Relationship label (repeatable)
    #[arg(long = "label")]
    labels: Vec<String>,

    /// Require every --label instead of any
    #[arg(long)]
    all_labels: bool,

    /// Data set internal id (repeatable)
    #[arg(long = "data-set-id")]
    data_set_ids: Vec<i64>,

    /// Data set external id (repeatable)
    #[arg(long = "data-set-external-id")]
    data_set_external_ids: Vec<String>,

    /// Maximum relationships to list; negative for no limit
    #[arg(long, allow_negative_numbers = true)]
    limit: Option<i64>,
}

fn parse_resource_type(s: &str) -> std::result::Result<ResourceType, String> {
    s.parse().map_err(|e: relquery::RelqueryError| e.to_string())
}

impl QueryArgs {
    fn into_params(self) -> QueryParams {
        let mut params = QueryParams::new();

        if !self.sources.is_empty() {
            params = params.source_external_ids(self.sources);
        }
        if !self.source_types.is_empty() {
            params = params.source_types(self.source_types);
        }
        if !self.source_labels.is_empty() {
            params = params.sources_filter(ResourceFilter::labels(self.source_labels));
        }
        if !self.targets.is_empty() {
            params = params.target_external_ids(self.targets);
        }
        if !self.target_types.is_empty() {
            params = params.target_types(self.target_types);
        }
        if !self.target_labels.is_empty() {
            params = params.targets_filter(ResourceFilter::labels(self.target_labels));
        }
        if !self.labels.is_empty() {
            params = params.labels(if self.all_labels {
                LabelFilter::contains_all(self.labels)
            } else {
                LabelFilter::contains_any(self.labels)
            });
        }

        let data_sets: Vec<DataSetId> = self
            .data_set_ids
            .into_iter()
            .map(|id| DataSetId::Id { id })
            .chain(
                self.data_set_external_ids
                    .into_iter()
                    .map(|external_id| DataSetId::ExternalId { external_id }),
            )
            .collect();
        if !data_sets.is_empty() {
            params = params.data_set_ids(data_sets);
        }

        if let Some(limit) = self.limit {
            params = params.limit(limit);
        }
        params
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Logs go to stderr; stdout carries only results
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.relquery.log_level.as_str()),
    )
    .init();

    match cli.command {
        Command::Query(args) => run_query(&config, args).await,
    }
}

async fn run_query(config: &Config, args: QueryArgs) -> Result<()> {
    let query = config.relationships_query()?;
    let start = Instant::now();

    let results = query.query(args.into_params()).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut count = 0usize;
    for resolved in results {
        serde_json::to_writer(&mut out, &resolved)?;
        writeln!(out)?;
        count += 1;
    }

    log::info!("Resolved {} relationships in {:?}", count, start.elapsed());
    Ok(())
}
