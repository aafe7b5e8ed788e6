use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::catalog::{RelationshipSource, ResourceCatalog};
use crate::error::{RelqueryError, Result};
use crate::relationships::{Relationship, RelationshipListFilter};
use crate::resources::{Resource, ResourceItem, ResourceType};

/// Maximum page size the API accepts for relationship listing
pub const MAX_PAGE_SIZE: usize = 1000;

/// Maximum number of ids per byids request
pub const MAX_BYIDS_CHUNK: usize = 1000;

/// Request body for `relationships/list`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListRequest<'a> {
    filter: &'a RelationshipListFilter,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<String>,
}

/// Paged list response
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    items: Vec<T>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExternalIdItem<'a> {
    external_id: &'a str,
}

/// Request body for `{collection}/byids`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ByIdsRequest<'a> {
    items: Vec<ExternalIdItem<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    ignore_unknown_ids: bool,
}

#[derive(Deserialize)]
struct ItemsResponse<T> {
    items: Vec<T>,
}

/// Error envelope returned on non-success responses
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    missing: Vec<MissingItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MissingItem {
    #[serde(default)]
    external_id: Option<String>,
}

/// REST client for the resource catalog
///
/// Implements both collaborator traits against
/// `{base_url}/api/v1/projects/{project}/`.
pub struct CatalogClient {
    client: Client,
    base_url: Url,
    project: String,
    token: String,
    page_size: usize,
}

impl CatalogClient {
    /// Create a new catalog client
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root, e.g. `https://api.cognitedata.com`
    /// * `project` - Project name used in every request path
    /// * `token` - Bearer token
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: &str, project: &str, token: String, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| RelqueryError::Config(format!("Invalid base_url {}: {}", base_url, e)))?;
        // Url::join replaces the last segment unless the path ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        if project.trim().is_empty() {
            return Err(RelqueryError::Config("project must not be empty".to_string()));
        }
        // The project is spliced into the request path as a single segment
        if project.contains(['/', '?', '#']) {
            return Err(RelqueryError::Config(format!(
                "project must not contain '/', '?' or '#': {}",
                project
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            project: project.to_string(),
            token,
            page_size: MAX_PAGE_SIZE,
        })
    }

    /// Set the relationship listing page size (capped at 1000)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(&format!("api/v1/projects/{}/{}", self.project, path))
            .map_err(|e| RelqueryError::InvalidInput(format!("Invalid endpoint {}: {}", path, e)))
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(parse_api_error(status.as_u16(), &body));
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Turn a non-success response body into `RelqueryError::Api`.
fn parse_api_error(status: u16, body: &str) -> RelqueryError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => RelqueryError::Api {
            status,
            message: envelope.error.message,
            missing: envelope
                .error
                .missing
                .into_iter()
                .filter_map(|m| m.external_id)
                .collect(),
        },
        Err(_) => RelqueryError::api(status, body.to_string()),
    }
}

/// Size of the next page given what has been collected so far.
fn next_page_size(page_size: usize, limit: Option<usize>, collected: usize) -> usize {
    match limit {
        Some(limit) => limit.saturating_sub(collected).min(page_size),
        None => page_size,
    }
}

#[async_trait]
impl RelationshipSource for CatalogClient {
    async fn list_relationships(
        &self,
        filter: &RelationshipListFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Relationship>> {
        let mut items = Vec::new();
        let mut cursor = None;

        loop {
            let page = next_page_size(self.page_size, limit, items.len());
            if page == 0 {
                break;
            }

            let request = ListRequest {
                filter,
                limit: page,
                cursor: cursor.take(),
            };
            let response: ListResponse<Relationship> =
                self.post("relationships/list", &request).await?;
            log::debug!("Listed page of {} relationships", response.items.len());
            items.extend(response.items);

            match response.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        if let Some(limit) = limit {
            items.truncate(limit);
        }
        Ok(items)
    }
}

#[async_trait]
impl ResourceCatalog for CatalogClient {
    async fn retrieve_multiple(
        &self,
        resource_type: ResourceType,
        external_ids: &[String],
        ignore_unknown_ids: bool,
    ) -> Result<Vec<Resource>> {
        let path = format!("{}/byids", resource_type.collection());
        let mut resources = Vec::with_capacity(external_ids.len());

        for chunk in external_ids.chunks(MAX_BYIDS_CHUNK) {
            let request = ByIdsRequest {
                items: chunk
                    .iter()
                    .map(|id| ExternalIdItem { external_id: id })
                    .collect(),
                ignore_unknown_ids,
            };
            let response: ItemsResponse<ResourceItem> = self.post(&path, &request).await?;
            resources.extend(
                response
                    .items
                    .into_iter()
                    .map(|item| item.into_resource(resource_type)),
            );
        }

        Ok(resources)
    }
}
