//! Transport domain - the HTTP contract the entity cache depends on

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::load::LoadToken;
use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// HTTP verbs used by entity clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A single backend call
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl TransportRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

impl fmt::Display for TransportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Backend transport
///
/// Implementations must resolve with [`DomainError::Cancelled`] once `token`
/// is cancelled, aborting the in-flight call, and must report timeouts,
/// unreachable backends and non-2xx answers as distinct errors. An empty
/// success body is returned as `Value::Null`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn request(
        &self,
        request: TransportRequest,
        token: &LoadToken,
    ) -> Result<Value, DomainError>;
}
