use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::load::LoadToken;
use crate::domain::transport::{Method, Transport, TransportRequest};
use crate::domain::DomainError;

/// Backend transport using reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn send(&self, request: TransportRequest) -> Result<Value, DomainError> {
        let url = self.url(&request.path);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };

        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| map_send_error(&request, e))?;
        let status = response.status();

        let body = response
            .text()
            .await
            .map_err(|e| map_send_error(&request, e))?;

        if !status.is_success() {
            return Err(DomainError::server(status.as_u16(), error_detail(status, &body)));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body)
            .map_err(|e| DomainError::decode(format!("Invalid JSON from {}: {}", request, e)))
    }
}

fn map_send_error(request: &TransportRequest, error: reqwest::Error) -> DomainError {
    if error.is_timeout() {
        DomainError::timeout(format!("{} exceeded the request timeout", request))
    } else {
        DomainError::network(format!("{} failed: {}", request, error))
    }
}

/// Extracts the backend's `detail` message, falling back to the raw body
fn error_detail(status: reqwest::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("detail").cloned());

    match detail {
        Some(Value::String(message)) => message,
        Some(other) => other.to_string(),
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string(),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        request: TransportRequest,
        token: &LoadToken,
    ) -> Result<Value, DomainError> {
        if token.is_cancelled() {
            return Err(DomainError::cancelled());
        }

        // Dropping the send future aborts the in-flight request
        tokio::select! {
            _ = token.cancelled() => Err(DomainError::cancelled()),
            result = self.send(request) => result,
        }
    }
}
