//! The request capability models are bound to.
//!
//! [`Transport`] is the seam: production code uses [`ReqwestTransport`],
//! tests swap in [`MockTransport`](crate::mock::MockTransport).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::types::{HttpRequest, HttpResponse};

/// Trait for executing requests and returning the decoded response body.
///
/// Non-2xx responses and transport failures are returned as `Err`; callers
/// treat them as opaque.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: HttpRequest) -> Result<Value, Error>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn request(&self, request: HttpRequest) -> Result<Value, Error> {
        self.as_ref().request(request).await
    }
}

/// Production transport using an async reqwest client.
pub struct ReqwestTransport {
    client: Client,
    base_url: Option<Url>,
    default_headers: HashMap<String, String>,
}

impl ReqwestTransport {
    /// Create a new transport with the given timeout.
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: None,
            default_headers: HashMap::new(),
        })
    }

    /// Create with default timeout of 30 seconds.
    pub fn with_default_timeout() -> Result<Self, Error> {
        Self::new(Duration::from_secs(30))
    }

    /// Resolve relative request URLs against `base_url`.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, Error> {
        self.base_url = Some(Url::parse(base_url)?);
        Ok(self)
    }

    /// Add a header sent with every request
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    fn resolve(&self, url: &str) -> Result<Url, Error> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(Url::parse(url)?);
        }
        match &self.base_url {
            Some(base) => Ok(base.join(url)?),
            None => Err(Error::UrlParse(url::ParseError::RelativeUrlWithoutBase)),
        }
    }

    /// Execute a request and return the full response, whatever its status.
    pub async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        let method: http::Method = request.method.into();
        let url = self.resolve(&request.url)?;

        let mut headers = HeaderMap::new();
        for (name, value) in self.default_headers.iter().chain(request.headers.iter()) {
            headers.insert(
                HeaderName::try_from(name.as_str())?,
                HeaderValue::try_from(value.as_str())?,
            );
        }

        let mut req_builder = self.client.request(method, url).headers(headers);

        if !request.query.is_empty() {
            req_builder = req_builder.query(&request.query);
        }

        if let Some(body) = &request.body {
            req_builder = req_builder.json(body);
        }

        let response = req_builder.send().await?;

        let status = response.status().as_u16();
        let status_text = response
            .status()
            .canonical_reason()
            .unwrap_or("Unknown")
            .to_string();

        let mut resp_headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                resp_headers.insert(name.to_string(), v.to_string());
            }
        }

        let body_text = response.text().await?;
        let body = serde_json::from_str(&body_text).unwrap_or(Value::Null);

        Ok(HttpResponse {
            status,
            status_text,
            headers: resp_headers,
            body,
            body_text: Some(body_text),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn request(&self, request: HttpRequest) -> Result<Value, Error> {
        debug!(method = %request.method, url = %request.url, "sending request");
        let response = self.execute(&request).await?;
        if !response.is_success() {
            return Err(Error::Status {
                status: response.status,
                message: response.failure_message(),
            });
        }
        Ok(response.body)
    }
}
