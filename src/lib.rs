pub mod config;
pub mod error;
pub mod resources;
pub mod relationships;
pub mod filter;
pub mod catalog;
pub mod fetcher;
pub mod query;

pub use config::Config;
pub use error::{RelqueryError, Result};
pub use filter::ResourceFilter;
pub use fetcher::FetcherRegistry;
pub use query::{QueryParams, RelationshipsQuery, ResolvedRelationships};
pub use relationships::{LabelFilter, Relationship, RelationshipWithResources};
pub use resources::{Resource, ResourceRef, ResourceType};
