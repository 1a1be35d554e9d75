//! # NetBox REST Client
//!
//! [`CmdbApi`] over the NetBox REST API.
//!
//! - `GET /api/{path}/?limit=&offset=&ordering=id` paginated list
//! - `POST /api/{path}/` create
//! - `PATCH /api/{path}/{id}/` partial update
//! - `DELETE /api/{path}/{id}/`
//!
//! Requests authenticate with `Authorization: Token <token>`. HTTP statuses
//! are mapped onto [`CmdbError`] so the retry layer can tell transient
//! failures (timeouts, 429, 5xx) from permanent ones.

use super::{CmdbApi, Page};
use crate::config::NetboxConfig;
use crate::error::CmdbError;
use crate::model::{EntityId, EntityKind};
use crate::observability::metrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::debug;
use zeroize::Zeroizing;

pub struct NetboxClient {
    client: Client,
    base_url: String,
    token: Zeroizing<String>,
}

impl std::fmt::Debug for NetboxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetboxClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<Value>,
}

impl NetboxClient {
    /// Create a client for the NetBox instance at `base_url` (scheme, host and
    /// port, without the `/api` suffix).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        token: Zeroizing<String>,
        timeout: Duration,
        validate_cert: bool,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!validate_cert)
            .user_agent(concat!("netbox-ssot/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &NetboxConfig) -> Result<Self> {
        Self::new(
            &config.base_url(),
            config.api_token.clone(),
            Duration::from_secs(config.timeout_secs),
            config.validate_cert,
        )
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}/api/{}/", self.base_url, kind.api_path())
    }

    fn object_url(&self, kind: EntityKind, id: EntityId) -> String {
        format!("{}/api/{}/{id}/", self.base_url, kind.api_path())
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Token {}", self.token.as_str()))
            .header("Accept", "application/json")
    }

    /// Send a request and turn non-success statuses into errors.
    async fn send(
        &self,
        method: &'static str,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<Response, CmdbError> {
        let start = Instant::now();
        let result = match request.send().await {
            Ok(response) => check_status(operation, response).await,
            Err(err) => Err(transport_error(operation, &err)),
        };
        metrics::observe_cmdb_request(method, start.elapsed().as_secs_f64(), result.is_ok());
        debug!(
            operation,
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            ok = result.is_ok(),
            "NetBox request finished"
        );
        result
    }
}

async fn check_status(operation: &str, response: Response) -> Result<Response, CmdbError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(operation, status, body))
}

fn status_error(operation: &str, status: StatusCode, body: String) -> CmdbError {
    let operation = operation.to_string();
    match status.as_u16() {
        404 => CmdbError::NotFound { operation },
        408 | 429 | 500..=599 => CmdbError::Transient {
            operation,
            message: format!("{status}: {body}"),
        },
        409 => CmdbError::Conflict {
            operation,
            message: body,
        },
        400 if is_duplicate_message(&body) => CmdbError::Conflict {
            operation,
            message: body,
        },
        code => CmdbError::Rejected {
            operation,
            status: code,
            message: body,
        },
    }
}

/// NetBox reports unique constraint violations as 400 validation errors.
fn is_duplicate_message(body: &str) -> bool {
    let body = body.to_lowercase();
    body.contains("already exists") || body.contains("must be unique")
}

fn transport_error(operation: &str, err: &reqwest::Error) -> CmdbError {
    if err.is_decode() {
        CmdbError::Decode {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    } else {
        CmdbError::Transient {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }
}

async fn json_body<T: serde::de::DeserializeOwned>(
    operation: &str,
    response: Response,
) -> Result<T, CmdbError> {
    response.json::<T>().await.map_err(|err| CmdbError::Decode {
        operation: operation.to_string(),
        message: err.to_string(),
    })
}

#[async_trait]
impl CmdbApi for NetboxClient {
    async fn list_page(
        &self,
        kind: EntityKind,
        offset: usize,
        limit: usize,
    ) -> Result<Page, CmdbError> {
        let operation = format!("GET {} offset={offset}", kind.api_path());
        let request = self
            .request(Method::GET, &self.collection_url(kind))
            .query(&[("limit", limit), ("offset", offset)])
            .query(&[("ordering", "id")]);
        let response = self.send("GET", &operation, request).await?;
        let list: ListResponse = json_body(&operation, response).await?;
        Ok(Page {
            has_next: list.next.is_some(),
            results: list.results,
        })
    }

    async fn create(
        &self,
        kind: EntityKind,
        payload: &Map<String, Value>,
    ) -> Result<Value, CmdbError> {
        let operation = format!("POST {}", kind.api_path());
        let request = self
            .request(Method::POST, &self.collection_url(kind))
            .json(payload);
        let response = self.send("POST", &operation, request).await?;
        json_body(&operation, response).await
    }

    async fn patch(
        &self,
        kind: EntityKind,
        id: EntityId,
        payload: &Map<String, Value>,
    ) -> Result<Value, CmdbError> {
        let operation = format!("PATCH {}/{id}", kind.api_path());
        let request = self
            .request(Method::PATCH, &self.object_url(kind, id))
            .json(payload);
        let response = self.send("PATCH", &operation, request).await?;
        json_body(&operation, response).await
    }

    async fn delete(&self, kind: EntityKind, id: EntityId) -> Result<(), CmdbError> {
        let operation = format!("DELETE {}/{id}", kind.api_path());
        let request = self.request(Method::DELETE, &self.object_url(kind, id));
        self.send("DELETE", &operation, request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error("GET", StatusCode::NOT_FOUND, String::new()),
            CmdbError::NotFound { .. }
        ));
        assert!(status_error("GET", StatusCode::SERVICE_UNAVAILABLE, String::new()).is_transient());
        assert!(status_error("GET", StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(matches!(
            status_error(
                "POST",
                StatusCode::BAD_REQUEST,
                r#"{"name":["site with this name already exists."]}"#.to_string()
            ),
            CmdbError::Conflict { .. }
        ));
        assert!(matches!(
            status_error("POST", StatusCode::BAD_REQUEST, r#"{"status":["bad choice"]}"#.to_string()),
            CmdbError::Rejected { status: 400, .. }
        ));
    }

    #[test]
    fn test_urls() {
        let client = NetboxClient::new(
            "https://netbox.example.com:443/",
            Zeroizing::new("token".to_string()),
            Duration::from_secs(5),
            true,
        )
        .unwrap();

        assert_eq!(
            client.collection_url(EntityKind::Device),
            "https://netbox.example.com:443/api/dcim/devices/"
        );
        assert_eq!(
            client.object_url(EntityKind::VmInterface, EntityId(12)),
            "https://netbox.example.com:443/api/virtualization/interfaces/12/"
        );
        assert!(!format!("{client:?}").contains("token"));
    }
}
