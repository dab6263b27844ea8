//! REST document store implementation.
//!
//! Endpoints, relative to `base_url`:
//! - `GET  /v1/users/{owner}/projects[?pageToken=..]` → `{ documents, nextPageToken }`
//! - `PUT  /v1/users/{owner}/projects/{id}` with the project document as body
//! - `GET  /health` for connectivity probing

use super::storage::{RemoteDocument, RemoteStore};
use crate::error::{SyncError, SyncResult};
use crate::network::ConnectivityProbe;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stitchsync_types::{Project, UserId};
use tracing::{debug, warn};

/// HTTP remote store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRemoteConfig {
    /// Base URL of the document API (e.g. `https://api.stitchsync.app`).
    pub base_url: String,
    /// Bearer token for the signed-in user.
    pub auth_token: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpRemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.stitchsync.app".to_string(),
            auth_token: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DocumentPage {
    #[serde(default)]
    documents: Vec<RemoteDocument>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

fn build_client(timeout: Duration) -> SyncResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SyncError::Network(format!("failed to create HTTP client: {e}")))
}

fn transport_error(context: &str, e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout
    } else {
        SyncError::Network(format!("{context}: {e}"))
    }
}

/// Maps a non-success response onto the error taxonomy.
async fn status_error(context: &str, response: Response) -> SyncError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SyncError::Auth(format!("{context}: {status} {body}"))
        }
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            SyncError::Network(format!("{context}: {status}"))
        }
        s if s.is_server_error() => SyncError::Network(format!("{context}: {status}")),
        _ => SyncError::Storage(format!("{context}: {status} {body}")),
    }
}

/// Remote store backed by a REST document API.
pub struct HttpRemoteStore {
    config: HttpRemoteConfig,
    client: Client,
}

impl HttpRemoteStore {
    /// Creates a store instance.
    pub fn new(config: HttpRemoteConfig) -> SyncResult<Self> {
        let client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, client })
    }

    fn projects_url(&self, owner: &UserId) -> String {
        format!(
            "{}/v1/users/{}/projects",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(owner.as_str())
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    fn provider_name(&self) -> &'static str {
        "HTTP"
    }

    async fn fetch_projects(&self, owner: &UserId) -> SyncResult<Vec<RemoteDocument>> {
        let url = self.projects_url(owner);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.authorize(self.client.get(&url));
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| transport_error("project fetch failed", e))?;

            // A user who never synced has no collection yet.
            if response.status() == StatusCode::NOT_FOUND {
                debug!("No remote collection for {}", owner);
                break;
            }
            if !response.status().is_success() {
                return Err(status_error("project fetch failed", response).await);
            }

            let page: DocumentPage = response.json().await.map_err(|e| {
                SyncError::Network(format!("failed to parse project page: {e}"))
            })?;
            documents.extend(page.documents);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Fetched {} remote documents for {}", documents.len(), owner);
        Ok(documents)
    }

    async fn put_project(&self, owner: &UserId, project: &Project) -> SyncResult<()> {
        let url = format!("{}/{}", self.projects_url(owner), project.id);
        let body = project.to_document()?;

        let response = self
            .authorize(self.client.put(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("project upload failed", e))?;

        if !response.status().is_success() {
            let err = status_error("project upload failed", response).await;
            warn!("Upload of project {} failed: {}", project.id, err);
            return Err(err);
        }

        debug!("Uploaded project {}", project.id);
        Ok(())
    }
}

/// Connectivity probe hitting `GET {base_url}/health`.
pub struct HttpConnectivityProbe {
    url: String,
    client: Client,
}

impl HttpConnectivityProbe {
    /// Creates a probe for the given API base URL.
    pub fn new(base_url: &str, timeout: Duration) -> SyncResult<Self> {
        Ok(Self {
            url: format!("{}/health", base_url.trim_end_matches('/')),
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpConnectivityProbe {
    async fn probe(&self) -> SyncResult<bool> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| transport_error("health check failed", e))?;
        Ok(response.status().is_success())
    }
}
