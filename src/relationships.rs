//! Relationship (edge) model and the listing filter sent to the catalog.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::resources::{Label, Resource, ResourceRef, ResourceType};

/// A directed link between two catalog resources (source --> target).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub external_id: String,
    pub source_external_id: String,
    pub source_type: ResourceType,
    pub target_external_id: String,
    pub target_type: ResourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_set_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Label>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_time: Option<i64>,
}

impl Relationship {
    pub fn new(
        external_id: impl Into<String>,
        source: (ResourceType, &str),
        target: (ResourceType, &str),
    ) -> Self {
        Self {
            external_id: external_id.into(),
            source_external_id: source.1.to_string(),
            source_type: source.0,
            target_external_id: target.1.to_string(),
            target_type: target.0,
            start_time: None,
            end_time: None,
            confidence: None,
            data_set_id: None,
            labels: None,
            created_time: None,
            last_updated_time: None,
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = Some(labels.into_iter().map(Label::new).collect());
        self
    }

    pub fn with_data_set_id(mut self, data_set_id: i64) -> Self {
        self.data_set_id = Some(data_set_id);
        self
    }

    pub fn source_ref(&self) -> ResourceRef {
        ResourceRef::new(self.source_type, self.source_external_id.clone())
    }

    pub fn target_ref(&self) -> ResourceRef {
        ResourceRef::new(self.target_type, self.target_external_id.clone())
    }
}

/// A relationship with both endpoints resolved.
///
/// Endpoint resources are shared between every relationship of the same
/// query that points at them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipWithResources {
    #[serde(flatten)]
    pub relationship: Relationship,
    pub source_resource: Arc<Resource>,
    pub target_resource: Arc<Resource>,
}

/// Relationship label constraint, evaluated by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LabelFilter {
    ContainsAny(Vec<Label>),
    ContainsAll(Vec<Label>),
}

impl LabelFilter {
    pub fn contains_any<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LabelFilter::ContainsAny(labels.into_iter().map(Label::new).collect())
    }

    pub fn contains_all<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LabelFilter::ContainsAll(labels.into_iter().map(Label::new).collect())
    }

    /// Whether a label set satisfies this constraint.
    pub fn matches(&self, labels: Option<&[Label]>) -> bool {
        let labels = labels.unwrap_or_default();
        match self {
            LabelFilter::ContainsAny(wanted) => wanted.iter().any(|w| labels.contains(w)),
            LabelFilter::ContainsAll(wanted) => wanted.iter().all(|w| labels.contains(w)),
        }
    }
}

/// Data set reference, by internal id or external id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataSetId {
    Id {
        id: i64,
    },
    ExternalId {
        #[serde(rename = "externalId")]
        external_id: String,
    },
}

/// Pass-through constraints for listing relationships.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipListFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_external_ids: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_types: Option<Vec<ResourceType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_external_ids: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_types: Option<Vec<ResourceType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<LabelFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_set_ids: Option<Vec<DataSetId>>,
}
