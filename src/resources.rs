//! Resource model: the typed catalog objects relationships point at.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::RelqueryError;

/// Kind of resource a relationship endpoint refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceType {
    Asset,
    TimeSeries,
    File,
    Event,
    Sequence,
}

impl ResourceType {
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Asset,
        ResourceType::TimeSeries,
        ResourceType::File,
        ResourceType::Event,
        ResourceType::Sequence,
    ];

    /// Wire name used in relationship `sourceType` / `targetType`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Asset => "asset",
            ResourceType::TimeSeries => "timeSeries",
            ResourceType::File => "file",
            ResourceType::Event => "event",
            ResourceType::Sequence => "sequence",
        }
    }

    /// REST collection holding resources of this type.
    pub fn collection(&self) -> &'static str {
        match self {
            ResourceType::Asset => "assets",
            ResourceType::TimeSeries => "timeseries",
            ResourceType::File => "files",
            ResourceType::Event => "events",
            ResourceType::Sequence => "sequences",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = RelqueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RelqueryError::InvalidInput(format!("Unknown resource type: {}", s)))
    }
}

/// Identity key used to deduplicate endpoints and join them to resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    pub resource_type: ResourceType,
    pub external_id: String,
}

impl ResourceRef {
    pub fn new(resource_type: ResourceType, external_id: impl Into<String>) -> Self {
        Self {
            resource_type,
            external_id: external_id.into(),
        }
    }
}

/// A label attached to a resource or relationship.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub external_id: String,
}

impl Label {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
        }
    }
}

/// A resolved catalog resource.
///
/// Only the fields the resolver needs are typed; everything else the
/// catalog returns is kept in `properties`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub resource_type: ResourceType,
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Label>>,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

/// Resource as it comes off the wire, before it is tagged with its type.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResourceItem {
    external_id: String,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    labels: Option<Vec<Label>>,
    #[serde(flatten)]
    properties: Map<String, Value>,
}

impl ResourceItem {
    pub(crate) fn into_resource(self, resource_type: ResourceType) -> Resource {
        Resource {
            resource_type,
            external_id: self.external_id,
            id: self.id,
            name: self.name,
            labels: self.labels,
            properties: self.properties,
        }
    }
}

impl Resource {
    pub fn new(resource_type: ResourceType, external_id: impl Into<String>) -> Self {
        Self {
            resource_type,
            external_id: external_id.into(),
            id: None,
            name: None,
            labels: None,
            properties: Map::new(),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = Some(labels.into_iter().map(Label::new).collect());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef::new(self.resource_type, self.external_id.clone())
    }

    /// External ids of the resource's labels, if it carries any.
    pub fn label_ids(&self) -> Option<impl Iterator<Item = &str>> {
        self.labels
            .as_ref()
            .map(|labels| labels.iter().map(|l| l.external_id.as_str()))
    }
}
