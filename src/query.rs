//! Relationship query: list relationships and resolve both endpoints.
//!
//! A query runs in two phases. Relationships are listed first, then the
//! distinct endpoint resources are fetched with one batch call per
//! resource type, at most `max_workers` at a time. Resolved resources are
//! joined back onto the relationships in listing order, and endpoint
//! filters are applied while the result is iterated.

use futures_util::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::catalog::{RelationshipSource, ResourceCatalog};
use crate::error::Result;
use crate::fetcher::FetcherRegistry;
use crate::filter::ResourceFilter;
use crate::relationships::{
    DataSetId, LabelFilter, Relationship, RelationshipListFilter, RelationshipWithResources,
};
use crate::resources::{Resource, ResourceRef, ResourceType};

/// Default number of concurrent fetch calls
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Parameters for [`RelationshipsQuery::query`].
///
/// Unset fields do not constrain the listing; unset endpoint filters
/// accept every resource.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    sources: Option<BTreeSet<String>>,
    source_types: Option<Vec<ResourceType>>,
    sources_filter: ResourceFilter,
    targets: Option<BTreeSet<String>>,
    target_types: Option<Vec<ResourceType>>,
    targets_filter: ResourceFilter,
    data_set_ids: Option<Vec<DataSetId>>,
    labels: Option<LabelFilter>,
    limit: Option<usize>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only relationships whose source is one of these resources.
    pub fn sources<'a, I>(self, resources: I) -> Self
    where
        I: IntoIterator<Item = &'a Resource>,
    {
        self.source_external_ids(resources.into_iter().map(|r| r.external_id.clone()))
    }

    pub fn source_external_ids<I, S>(mut self, external_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = Some(external_ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn source_types(mut self, types: impl IntoIterator<Item = ResourceType>) -> Self {
        self.source_types = Some(types.into_iter().collect());
        self
    }

    pub fn sources_filter(mut self, filter: ResourceFilter) -> Self {
        self.sources_filter = filter;
        self
    }

    /// Only relationships whose target is one of these resources.
    pub fn targets<'a, I>(self, resources: I) -> Self
    where
        I: IntoIterator<Item = &'a Resource>,
    {
        self.target_external_ids(resources.into_iter().map(|r| r.external_id.clone()))
    }

    pub fn target_external_ids<I, S>(mut self, external_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = Some(external_ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn target_types(mut self, types: impl IntoIterator<Item = ResourceType>) -> Self {
        self.target_types = Some(types.into_iter().collect());
        self
    }

    pub fn targets_filter(mut self, filter: ResourceFilter) -> Self {
        self.targets_filter = filter;
        self
    }

    pub fn data_set_ids(mut self, data_set_ids: impl IntoIterator<Item = DataSetId>) -> Self {
        self.data_set_ids = Some(data_set_ids.into_iter().collect());
        self
    }

    /// Relationship label constraint.
    pub fn labels(mut self, labels: LabelFilter) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Cap the number of relationships listed. Negative means unbounded.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = usize::try_from(limit).ok();
        self
    }

    fn list_filter(&self) -> RelationshipListFilter {
        RelationshipListFilter {
            source_external_ids: self.sources.clone(),
            source_types: self.source_types.clone(),
            target_external_ids: self.targets.clone(),
            target_types: self.target_types.clone(),
            labels: self.labels.clone(),
            data_set_ids: self.data_set_ids.clone(),
        }
    }
}

/// Resolves relationships together with their endpoint resources.
pub struct RelationshipsQuery {
    relationships: Arc<dyn RelationshipSource>,
    fetchers: FetcherRegistry,
    max_workers: usize,
}

impl RelationshipsQuery {
    pub fn new(relationships: Arc<dyn RelationshipSource>, catalog: Arc<dyn ResourceCatalog>) -> Self {
        Self::with_registry(relationships, FetcherRegistry::new(catalog))
    }

    pub fn with_registry(relationships: Arc<dyn RelationshipSource>, fetchers: FetcherRegistry) -> Self {
        Self {
            relationships,
            fetchers,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    /// Cap concurrent fetch calls (at least 1).
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// List relationships and resolve their source and target resources.
    ///
    /// Relationships whose endpoints cannot be resolved, or whose resolved
    /// endpoints are rejected by `sources_filter` / `targets_filter`, are
    /// left out of the result. Any listing or fetch error fails the whole
    /// query; no partial result is returned.
    pub async fn query(&self, params: QueryParams) -> Result<ResolvedRelationships> {
        let filter = params.list_filter();
        let relationships = self
            .relationships
            .list_relationships(&filter, params.limit)
            .await?;

        let groups = group_refs_by_type(&relationships);
        log::info!(
            "Listed {} relationships referencing {} resource types",
            relationships.len(),
            groups.len()
        );

        let fetched = self.fetch_all(groups).await?;
        let index = build_index(fetched);
        log::debug!("Resolved {} distinct resources", index.len());

        Ok(ResolvedRelationships {
            relationships: relationships.into_iter(),
            index,
            sources_filter: params.sources_filter,
            targets_filter: params.targets_filter,
        })
    }

    /// Fetch every group concurrently. The first failure observed ends the
    /// fan-out; groups not yet started are never dispatched.
    async fn fetch_all(
        &self,
        groups: BTreeMap<ResourceType, Vec<String>>,
    ) -> Result<Vec<(ResourceType, Vec<Resource>)>> {
        let fetchers = &self.fetchers;
        let mut tasks = stream::iter(groups.into_iter().filter(|(_, ids)| !ids.is_empty()))
            .map(|(resource_type, external_ids)| async move {
                fetchers
                    .fetch(resource_type, &external_ids)
                    .await
                    .map(|resources| (resource_type, resources))
                    .map_err(|e| (resource_type, e))
            })
            .buffer_unordered(self.max_workers);

        let mut fetched = Vec::new();
        while let Some(result) = tasks.next().await {
            match result {
                Ok(batch) => fetched.push(batch),
                Err((resource_type, e)) => {
                    log::warn!("Fetching {} resources failed: {}", resource_type, e);
                    return Err(e);
                }
            }
        }
        Ok(fetched)
    }
}

/// Distinct endpoint external ids of every relationship, grouped by type.
pub fn group_refs_by_type(relationships: &[Relationship]) -> BTreeMap<ResourceType, Vec<String>> {
    let refs: BTreeSet<ResourceRef> = relationships
        .iter()
        .flat_map(|rel| [rel.source_ref(), rel.target_ref()])
        .collect();

    let mut groups: BTreeMap<ResourceType, Vec<String>> = BTreeMap::new();
    for r in refs {
        groups.entry(r.resource_type).or_default().push(r.external_id);
    }
    groups
}

fn build_index(fetched: Vec<(ResourceType, Vec<Resource>)>) -> HashMap<ResourceRef, Arc<Resource>> {
    fetched
        .into_iter()
        .flat_map(|(resource_type, resources)| {
            resources.into_iter().map(move |resource| {
                (
                    ResourceRef::new(resource_type, resource.external_id.clone()),
                    Arc::new(resource),
                )
            })
        })
        .collect()
}

/// Result of a relationship query, in listing order.
///
/// All resources are fetched by the time this is returned; iterating only
/// joins and filters.
pub struct ResolvedRelationships {
    relationships: std::vec::IntoIter<Relationship>,
    index: HashMap<ResourceRef, Arc<Resource>>,
    sources_filter: ResourceFilter,
    targets_filter: ResourceFilter,
}

impl ResolvedRelationships {
    fn resolve(&self, relationship: Relationship) -> Option<RelationshipWithResources> {
        let source = self.index.get(&relationship.source_ref());
        let target = self.index.get(&relationship.target_ref());

        match (source, target) {
            (Some(source), Some(target))
                if self.sources_filter.is_inside(source) && self.targets_filter.is_inside(target) =>
            {
                Some(RelationshipWithResources {
                    source_resource: Arc::clone(source),
                    target_resource: Arc::clone(target),
                    relationship,
                })
            }
            _ => {
                log::trace!("Dropping relationship {}", relationship.external_id);
                None
            }
        }
    }
}

impl Iterator for ResolvedRelationships {
    type Item = RelationshipWithResources;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(relationship) = self.relationships.next() {
            if let Some(resolved) = self.resolve(relationship) {
                return Some(resolved);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.relationships.size_hint().1)
    }
}
