//! Endpoint filters applied to resolved resources.

use std::collections::HashSet;

use crate::resources::Resource;

/// Predicate over a resolved relationship endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResourceFilter {
    /// Accept every resource.
    #[default]
    All,
    /// Accept a resource carrying at least one of these label external ids.
    Labels(HashSet<String>),
}

impl ResourceFilter {
    pub fn labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ResourceFilter::Labels(labels.into_iter().map(Into::into).collect())
    }

    pub fn is_inside(&self, resource: &Resource) -> bool {
        match self {
            ResourceFilter::All => true,
            ResourceFilter::Labels(accepted) => match resource.label_ids() {
                Some(mut ids) => ids.any(|id| accepted.contains(id)),
                None => false,
            },
        }
    }
}
