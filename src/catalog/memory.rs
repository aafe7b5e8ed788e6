use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::catalog::{RelationshipSource, ResourceCatalog};
use crate::error::{RelqueryError, Result};
use crate::relationships::{DataSetId, Relationship, RelationshipListFilter};
use crate::resources::{Resource, ResourceRef, ResourceType};

/// One recorded `retrieve_multiple` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveCall {
    pub resource_type: ResourceType,
    pub external_ids: Vec<String>,
    pub ignore_unknown_ids: bool,
}

/// In-process catalog holding relationships and resources.
///
/// Behaves like the REST API for listing and retrieval, and additionally
/// supports injected failures and latency per resource type. Every
/// retrieval is recorded so callers can assert on what was requested.
#[derive(Default)]
pub struct InMemoryCatalog {
    relationships: Vec<Relationship>,
    resources: HashMap<ResourceRef, Resource>,
    data_sets: HashMap<String, i64>,
    list_failure: Option<(u16, String)>,
    failures: HashMap<ResourceType, (u16, String)>,
    latency: HashMap<ResourceType, Duration>,
    calls: Mutex<Vec<RetrieveCall>>,
    list_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.insert(resource.resource_ref(), resource);
        self
    }

    /// Register a data set so it can be filtered on by external id.
    pub fn with_data_set(mut self, external_id: impl Into<String>, id: i64) -> Self {
        self.data_sets.insert(external_id.into(), id);
        self
    }

    /// Make every listing call fail with the given API error.
    pub fn with_list_failure(mut self, status: u16, message: impl Into<String>) -> Self {
        self.list_failure = Some((status, message.into()));
        self
    }

    /// Make every retrieval of `resource_type` fail with the given API error.
    pub fn with_failure(
        mut self,
        resource_type: ResourceType,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        self.failures.insert(resource_type, (status, message.into()));
        self
    }

    /// Delay every retrieval of `resource_type`.
    pub fn with_latency(mut self, resource_type: ResourceType, latency: Duration) -> Self {
        self.latency.insert(resource_type, latency);
        self
    }

    /// All retrieval calls made so far, in call order.
    pub fn calls(&self) -> Vec<RetrieveCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Retrieval calls made for one resource type.
    pub fn calls_for(&self, resource_type: ResourceType) -> Vec<RetrieveCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.resource_type == resource_type)
            .collect()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Highest number of retrievals that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn matches(&self, rel: &Relationship, filter: &RelationshipListFilter) -> bool {
        if let Some(ids) = &filter.source_external_ids {
            if !ids.contains(&rel.source_external_id) {
                return false;
            }
        }
        if let Some(types) = &filter.source_types {
            if !types.contains(&rel.source_type) {
                return false;
            }
        }
        if let Some(ids) = &filter.target_external_ids {
            if !ids.contains(&rel.target_external_id) {
                return false;
            }
        }
        if let Some(types) = &filter.target_types {
            if !types.contains(&rel.target_type) {
                return false;
            }
        }
        if let Some(labels) = &filter.labels {
            if !labels.matches(rel.labels.as_deref()) {
                return false;
            }
        }
        if let Some(data_sets) = &filter.data_set_ids {
            let wanted: HashSet<i64> = data_sets
                .iter()
                .filter_map(|ds| match ds {
                    DataSetId::Id { id } => Some(*id),
                    DataSetId::ExternalId { external_id } => self.data_sets.get(external_id).copied(),
                })
                .collect();
            match rel.data_set_id {
                Some(id) if wanted.contains(&id) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Decrements the in-flight counter when a retrieval finishes or is dropped.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RelationshipSource for InMemoryCatalog {
    async fn list_relationships(
        &self,
        filter: &RelationshipListFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Relationship>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        if let Some((status, message)) = &self.list_failure {
            return Err(RelqueryError::api(*status, message.clone()));
        }

        Ok(self
            .relationships
            .iter()
            .filter(|rel| self.matches(rel, filter))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ResourceCatalog for InMemoryCatalog {
    async fn retrieve_multiple(
        &self,
        resource_type: ResourceType,
        external_ids: &[String],
        ignore_unknown_ids: bool,
    ) -> Result<Vec<Resource>> {
        self.calls.lock().unwrap().push(RetrieveCall {
            resource_type,
            external_ids: external_ids.to_vec(),
            ignore_unknown_ids,
        });

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&self.in_flight);
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(latency) = self.latency.get(&resource_type) {
            tokio::time::sleep(*latency).await;
        }

        if let Some((status, message)) = self.failures.get(&resource_type) {
            return Err(RelqueryError::api(*status, message.clone()));
        }

        let mut found = Vec::with_capacity(external_ids.len());
        let mut missing = Vec::new();
        for external_id in external_ids {
            match self
                .resources
                .get(&ResourceRef::new(resource_type, external_id.clone()))
            {
                Some(resource) => found.push(resource.clone()),
                None => missing.push(external_id.clone()),
            }
        }

        if !missing.is_empty() && !ignore_unknown_ids {
            return Err(RelqueryError::Api {
                status: 400,
                message: "Ids not found".to_string(),
                missing,
            });
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationships::LabelFilter;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new()
            .with_data_set("plant-a", 10)
            .with_relationship(
                Relationship::new("r1", (ResourceType::Asset, "A"), (ResourceType::TimeSeries, "T"))
                    .with_labels(["flows-to"])
                    .with_data_set_id(10),
            )
            .with_relationship(
                Relationship::new("r2", (ResourceType::Asset, "B"), (ResourceType::File, "F"))
                    .with_data_set_id(20),
            )
            .with_relationship(Relationship::new(
                "r3",
                (ResourceType::Event, "E"),
                (ResourceType::Asset, "A"),
            ))
            .with_resource(Resource::new(ResourceType::Asset, "A"))
            .with_resource(Resource::new(ResourceType::File, "F"))
    }

    async fn list(filter: RelationshipListFilter, limit: Option<usize>) -> Vec<String> {
        catalog()
            .list_relationships(&filter, limit)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.external_id)
            .collect()
    }

    #[tokio::test]
    async fn test_list_unfiltered_and_limit() {
        assert_eq!(list(RelationshipListFilter::default(), None).await, ids(&["r1", "r2", "r3"]));
        assert_eq!(list(RelationshipListFilter::default(), Some(2)).await, ids(&["r1", "r2"]));
        assert!(list(RelationshipListFilter::default(), Some(0)).await.is_empty());
    }

    #[tokio::test]
    async fn test_list_by_endpoint() {
        let filter = RelationshipListFilter {
            source_types: Some(vec![ResourceType::Asset]),
            target_external_ids: Some(["F".to_string()].into_iter().collect()),
            ..Default::default()
        };
        assert_eq!(list(filter, None).await, ids(&["r2"]));
    }

    #[tokio::test]
    async fn test_list_by_labels_and_data_sets() {
        let by_label = RelationshipListFilter {
            labels: Some(LabelFilter::contains_any(["flows-to"])),
            ..Default::default()
        };
        assert_eq!(list(by_label, None).await, ids(&["r1"]));

        let by_data_set = RelationshipListFilter {
            data_set_ids: Some(vec![
                DataSetId::ExternalId {
                    external_id: "plant-a".to_string(),
                },
                DataSetId::Id { id: 20 },
            ]),
            ..Default::default()
        };
        assert_eq!(list(by_data_set, None).await, ids(&["r1", "r2"]));
    }

    #[tokio::test]
    async fn test_list_failure() {
        let catalog = catalog().with_list_failure(401, "Unauthorized");
        let err = catalog
            .list_relationships(&RelationshipListFilter::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RelqueryError::Api { status: 401, .. }));
        assert_eq!(catalog.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_tolerant_omits_unknown() {
        let catalog = catalog();
        let found = catalog
            .retrieve_multiple(ResourceType::Asset, &ids(&["A", "missing"]), true)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].external_id, "A");
    }

    #[tokio::test]
    async fn test_retrieve_strict_fails_on_unknown() {
        let catalog = catalog();
        let err = catalog
            .retrieve_multiple(ResourceType::File, &ids(&["F", "nope"]), false)
            .await
            .unwrap_err();
        match err {
            RelqueryError::Api { status, missing, .. } => {
                assert_eq!(status, 400);
                assert_eq!(missing, ids(&["nope"]));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retrieve_records_calls() {
        let catalog = catalog();
        catalog
            .retrieve_multiple(ResourceType::Asset, &ids(&["A"]), true)
            .await
            .unwrap();
        assert_eq!(
            catalog.calls(),
            vec![RetrieveCall {
                resource_type: ResourceType::Asset,
                external_ids: ids(&["A"]),
                ignore_unknown_ids: true,
            }]
        );
        assert_eq!(catalog.peak_in_flight(), 1);
        assert!(catalog.calls_for(ResourceType::File).is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let catalog = catalog().with_failure(ResourceType::Asset, 403, "Forbidden");
        let err = catalog
            .retrieve_multiple(ResourceType::Asset, &ids(&["A"]), true)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "API error 403: Forbidden");
    }
}
