//! reqwest-backed [`Transport`] for the widget backend REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::Value;
use tracing::debug;

use super::{ApiError, ApiRequest, Method, RequestIdentity, Transport};

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// HTTP transport for the widget backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    /// Create a transport rooted at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Create a new transport with the given bearer token, sharing the
    /// connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(), // Cheap clone, shares connection pool
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.base_url, route.trim_start_matches('/'))
    }

    fn header_value(value: &str) -> Result<header::HeaderValue, ApiError> {
        header::HeaderValue::from_str(value)
            .map_err(|e| ApiError::Transport(format!("invalid header value {:?}: {}", value, e)))
    }

    fn identity_headers(&self, identity: &RequestIdentity) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert("X-Widget-Id", Self::header_value(&identity.widget_id)?);
        headers.insert("X-Account-id", Self::header_value(&identity.account_id)?);
        headers.insert("X-User-id", Self::header_value(&identity.user_id)?);
        headers.insert("X-Language", Self::header_value(&identity.language)?);
        headers.insert(
            "X-Top-Level-Domain",
            Self::header_value(&identity.top_level_domain)?,
        );

        match identity.installation_marker() {
            Some(marker) => {
                headers.insert("X-Widget-Installation", Self::header_value(&marker)?);
            }
            None => {
                if let Some(ref token) = self.token {
                    headers.insert(
                        header::AUTHORIZATION,
                        Self::header_value(&format!("Bearer {}", token))?,
                    );
                }
            }
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    fn decode_body(url: &str, text: &str) -> Result<Value, ApiError> {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let url = self.url(&request.route);
        let headers = self.identity_headers(&request.identity)?;
        debug!(method = %request.method, url = %url, "Sending backend request");

        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self
                .client
                .post(&url)
                .json(request.body.as_ref().unwrap_or(&Value::Object(Default::default()))),
        };

        let response = builder.headers(headers).send().await?;
        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        Self::decode_body(&url, &text)
    }
}
