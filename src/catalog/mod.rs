//! Catalog collaborators: listing relationships and retrieving resources.
//!
//! The resolver only talks to these traits. `http` is the REST client,
//! `memory` is a deterministic in-process catalog.

pub mod http;
pub mod memory;

pub use http::CatalogClient;
pub use memory::InMemoryCatalog;

use async_trait::async_trait;

use crate::error::Result;
use crate::relationships::{Relationship, RelationshipListFilter};
use crate::resources::{Resource, ResourceType};

/// Lists relationships matching a filter.
#[async_trait]
pub trait RelationshipSource: Send + Sync {
    /// List relationships, following pagination until exhausted or `limit`
    /// items are collected. `None` means unbounded.
    async fn list_relationships(
        &self,
        filter: &RelationshipListFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Relationship>>;
}

/// Batch retrieval of resources by external id.
#[async_trait]
pub trait ResourceCatalog: Send + Sync {
    /// Retrieve resources of one type. With `ignore_unknown_ids` the
    /// catalog omits ids it does not know; otherwise the whole call fails.
    async fn retrieve_multiple(
        &self,
        resource_type: ResourceType,
        external_ids: &[String],
        ignore_unknown_ids: bool,
    ) -> Result<Vec<Resource>>;
}
