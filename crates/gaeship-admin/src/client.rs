//! App Engine Admin API client for one service.
//!
//! Implements [`ControlPlane`] on top of three Admin API resources:
//! `apps.services` (read/patch the split), `apps.operations` (poll the
//! patch), and `apps.services.versions` (detect newer deployments).

use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, header};
use http_body_util::Full;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::de::DeserializeOwned;
use tracing::debug;

use gaeship_core::{AllocationMap, ControlPlane, OperationStatus, TrafficSplit};

use crate::error::{AdminError, AdminResult};
use crate::transport::Endpoint;
use crate::wire::{ErrorEnvelope, ListVersionsResponse, Operation, Service, ServicePatch, Split};

/// Production Admin API base URL.
pub const DEFAULT_API_BASE: &str = "https://appengine.googleapis.com";

const USER_AGENT: &str = concat!("gaeship/", env!("CARGO_PKG_VERSION"));

/// Everything but RFC 3986 unreserved characters.
const RESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Settings for an [`AdminClient`].
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Base URL, scheme and authority only.
    pub api_base: String,
    /// Cloud project id (the App Engine app id).
    pub project: String,
    /// Service id, e.g. `default`.
    pub service: String,
    /// OAuth 2.0 bearer token.
    pub access_token: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl AdminConfig {
    pub fn new(project: &str, service: &str, access_token: &str) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            project: project.to_string(),
            service: service.to_string(),
            access_token: access_token.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Admin API client bound to one project and service.
#[derive(Debug, Clone)]
pub struct AdminClient {
    endpoint: Endpoint,
    config: AdminConfig,
}

impl AdminClient {
    pub fn new(config: AdminConfig) -> AdminResult<Self> {
        let endpoint = Endpoint::parse(&config.api_base)?;
        Ok(Self { endpoint, config })
    }

    pub fn project(&self) -> &str {
        &self.config.project
    }

    pub fn service(&self) -> &str {
        &self.config.service
    }

    fn service_path(&self) -> String {
        format!(
            "/v1/apps/{}/services/{}",
            encode(&self.config.project),
            encode(&self.config.service)
        )
    }

    /// GET the service resource.
    pub async fn get_service(&self) -> AdminResult<Service> {
        self.call(Method::GET, &self.service_path(), None).await
    }

    /// PATCH the service split. Returns the operation applying it.
    pub async fn patch_split(&self, split: Split) -> AdminResult<Operation> {
        let body = serde_json::to_vec(&ServicePatch { split }).map_err(AdminError::Encode)?;
        let path = format!("{}?updateMask=split", self.service_path());
        self.call(Method::PATCH, &path, Some(body)).await
    }

    /// GET an operation by its full resource name (`apps/{app}/operations/{id}`).
    pub async fn get_operation(&self, name: &str) -> AdminResult<Operation> {
        let path = format!("/v1/{}", name.trim_start_matches('/'));
        self.call(Method::GET, &path, None).await
    }

    /// List every version of the service, following page tokens.
    pub async fn list_version_ids(&self) -> AdminResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut path = format!("{}/versions?view=BASIC", self.service_path());
            if let Some(token) = &page_token {
                path.push_str("&pageToken=");
                path.push_str(&encode(token));
            }

            let page: ListVersionsResponse = self.call(Method::GET, &path, None).await?;
            ids.extend(page.versions.into_iter().map(|v| v.id));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(ids)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> AdminResult<T> {
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(path)
            .header(header::HOST, self.endpoint.authority())
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "application/json")
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.access_token),
            );
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let req = builder.body(Full::new(Bytes::from(body.unwrap_or_default())))?;

        debug!(%method, path, "admin api request");
        let (status, bytes) = self.endpoint.send(req, self.config.timeout).await?;
        debug!(%method, path, status = status.as_u16(), "admin api response");

        if !status.is_success() {
            return Err(AdminError::Status {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                message: error_message(&bytes),
            });
        }

        serde_json::from_slice(&bytes).map_err(|source| AdminError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

/// Percent-encode a path segment or query value.
fn encode(value: &str) -> String {
    utf8_percent_encode(value, RESERVED).to_string()
}

/// Pull the message out of a Google error envelope, or fall back to the raw body.
fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ => String::from_utf8_lossy(body).trim().to_string(),
    }
}

impl ControlPlane for AdminClient {
    type Error = AdminError;

    async fn get_split(&self) -> AdminResult<TrafficSplit> {
        let service = self.get_service().await?;
        let split = service.split.unwrap_or_default();
        let allocations =
            AllocationMap::from_fractions(split.allocations).map_err(|source| AdminError::Split {
                service: self.config.service.clone(),
                source,
            })?;
        Ok(TrafficSplit {
            shard_by: split.shard_by,
            allocations,
        })
    }

    async fn set_split(&self, split: &TrafficSplit) -> AdminResult<String> {
        let operation = self
            .patch_split(Split {
                shard_by: split.shard_by,
                allocations: split.allocations.to_fractions(),
            })
            .await?;
        Ok(operation.name)
    }

    async fn operation_status(&self, operation: &str) -> AdminResult<OperationStatus> {
        let op = self.get_operation(operation).await?;
        Ok(match (op.done, op.error) {
            (_, Some(status)) => OperationStatus::Failed {
                message: format!("{} (code {})", status.message, status.code),
            },
            (true, None) => OperationStatus::Done,
            (false, None) => OperationStatus::Pending,
        })
    }

    async fn list_versions(&self) -> AdminResult<Vec<String>> {
        self.list_version_ids().await
    }
}
