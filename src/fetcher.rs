//! Per-type resource fetchers.
//!
//! Each resource type maps to a fetcher that knows whether the catalog
//! tolerates unknown external ids for that type.

use std::sync::Arc;

use crate::catalog::ResourceCatalog;
use crate::error::{RelqueryError, Result};
use crate::resources::{Resource, ResourceType};

/// Retrieval settings for one resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fetcher {
    pub resource_type: ResourceType,
    pub ignore_unknown_ids: bool,
}

impl Fetcher {
    fn new(resource_type: ResourceType, ignore_unknown_ids: bool) -> Self {
        Self {
            resource_type,
            ignore_unknown_ids,
        }
    }
}

/// Maps every resource type to its fetcher and the catalog behind it.
#[derive(Clone)]
pub struct FetcherRegistry {
    catalog: Arc<dyn ResourceCatalog>,
    asset: Fetcher,
    time_series: Fetcher,
    file: Fetcher,
    event: Fetcher,
    sequence: Fetcher,
}

impl FetcherRegistry {
    /// Registry with the catalog's default unknown-id tolerance:
    /// assets, time series and events ignore unknown ids; files and
    /// sequences reject them.
    pub fn new(catalog: Arc<dyn ResourceCatalog>) -> Self {
        Self {
            catalog,
            asset: Fetcher::new(ResourceType::Asset, true),
            time_series: Fetcher::new(ResourceType::TimeSeries, true),
            file: Fetcher::new(ResourceType::File, false),
            event: Fetcher::new(ResourceType::Event, true),
            sequence: Fetcher::new(ResourceType::Sequence, false),
        }
    }

    /// Override unknown-id tolerance for one type.
    pub fn with_ignore_unknown_ids(mut self, resource_type: ResourceType, ignore: bool) -> Self {
        self.fetcher_mut(resource_type).ignore_unknown_ids = ignore;
        self
    }

    pub fn fetcher(&self, resource_type: ResourceType) -> &Fetcher {
        match resource_type {
            ResourceType::Asset => &self.asset,
            ResourceType::TimeSeries => &self.time_series,
            ResourceType::File => &self.file,
            ResourceType::Event => &self.event,
            ResourceType::Sequence => &self.sequence,
        }
    }

    fn fetcher_mut(&mut self, resource_type: ResourceType) -> &mut Fetcher {
        match resource_type {
            ResourceType::Asset => &mut self.asset,
            ResourceType::TimeSeries => &mut self.time_series,
            ResourceType::File => &mut self.file,
            ResourceType::Event => &mut self.event,
            ResourceType::Sequence => &mut self.sequence,
        }
    }

    /// Batch-retrieve resources of one type by external id.
    ///
    /// `external_ids` must be non-empty. Catalog errors are returned as-is.
    pub async fn fetch(
        &self,
        resource_type: ResourceType,
        external_ids: &[String],
    ) -> Result<Vec<Resource>> {
        if external_ids.is_empty() {
            return Err(RelqueryError::InvalidInput(format!(
                "No external ids to fetch for {}",
                resource_type
            )));
        }

        let fetcher = self.fetcher(resource_type);
        log::debug!(
            "Fetching {} {} resources (ignore_unknown_ids={})",
            external_ids.len(),
            resource_type,
            fetcher.ignore_unknown_ids
        );

        self.catalog
            .retrieve_multiple(resource_type, external_ids, fetcher.ignore_unknown_ids)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::{InMemoryCatalog, RetrieveCall};

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_tolerance() {
        let registry = FetcherRegistry::new(Arc::new(InMemoryCatalog::new()));
        assert!(registry.fetcher(ResourceType::Asset).ignore_unknown_ids);
        assert!(registry.fetcher(ResourceType::TimeSeries).ignore_unknown_ids);
        assert!(registry.fetcher(ResourceType::Event).ignore_unknown_ids);
        assert!(!registry.fetcher(ResourceType::File).ignore_unknown_ids);
        assert!(!registry.fetcher(ResourceType::Sequence).ignore_unknown_ids);
        for t in ResourceType::ALL {
            assert_eq!(registry.fetcher(t).resource_type, t);
        }
    }

    #[test]
    fn test_override_tolerance() {
        let registry = FetcherRegistry::new(Arc::new(InMemoryCatalog::new()))
            .with_ignore_unknown_ids(ResourceType::File, true)
            .with_ignore_unknown_ids(ResourceType::Asset, false);
        assert!(registry.fetcher(ResourceType::File).ignore_unknown_ids);
        assert!(!registry.fetcher(ResourceType::Asset).ignore_unknown_ids);
    }

    #[tokio::test]
    async fn test_fetch_passes_tolerance_flag() {
        let catalog = Arc::new(
            InMemoryCatalog::new()
                .with_resource(Resource::new(ResourceType::Sequence, "S"))
                .with_resource(Resource::new(ResourceType::Event, "E")),
        );
        let registry = FetcherRegistry::new(catalog.clone());

        registry.fetch(ResourceType::Sequence, &ids(&["S"])).await.unwrap();
        registry.fetch(ResourceType::Event, &ids(&["E"])).await.unwrap();

        assert_eq!(
            catalog.calls(),
            vec![
                RetrieveCall {
                    resource_type: ResourceType::Sequence,
                    external_ids: ids(&["S"]),
                    ignore_unknown_ids: false,
                },
                RetrieveCall {
                    resource_type: ResourceType::Event,
                    external_ids: ids(&["E"]),
                    ignore_unknown_ids: true,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_rejects_empty_ids() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let registry = FetcherRegistry::new(catalog.clone());
        let err = registry.fetch(ResourceType::Asset, &[]).await.unwrap_err();
        assert!(matches!(err, RelqueryError::InvalidInput(_)));
        assert!(catalog.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_propagates_catalog_error() {
        let catalog = Arc::new(InMemoryCatalog::new().with_failure(ResourceType::File, 403, "Forbidden"));
        let registry = FetcherRegistry::new(catalog);
        let err = registry.fetch(ResourceType::File, &ids(&["f"])).await.unwrap_err();
        assert!(matches!(err, RelqueryError::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_strict_type_fails_on_unknown_id() {
        let catalog = Arc::new(InMemoryCatalog::new().with_resource(Resource::new(ResourceType::File, "f")));
        let registry = FetcherRegistry::new(catalog);
        let err = registry
            .fetch(ResourceType::File, &ids(&["f", "ghost"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RelqueryError::Api { status: 400, .. }));
    }
}
