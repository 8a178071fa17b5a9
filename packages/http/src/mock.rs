//! Mock transport for testing.
//!
//! Routes are keyed by method and URL pattern. A pattern segment `:id`
//! matches the first all-digit segment of a request URL, and the parsed
//! number is handed to the route handler.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Error;
use crate::transport::Transport;
use crate::types::{HttpRequest, Method};

/// What a route handler receives.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    /// Numeric id captured by `:id`, if the URL had one.
    pub id: Option<i64>,
    pub body: Option<Value>,
    pub request: HttpRequest,
}

pub type RouteHandler = Arc<dyn Fn(RouteRequest) -> Result<Value, Error> + Send + Sync>;

struct Route {
    method: Method,
    pattern: String,
    handler: RouteHandler,
}

/// A mock transport that answers from a route table and records requests.
#[derive(Clone, Default)]
pub struct MockTransport {
    routes: Arc<Mutex<Vec<Route>>>,
    recorded_requests: Arc<Mutex<Vec<HttpRequest>>>,
}

/// Replace the first numeric segment with `:id`.
fn normalize(url: &str) -> (Option<i64>, String) {
    let mut id = None;
    let segments: Vec<String> = url
        .split('/')
        .map(|segment| {
            let numeric = !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit());
            if id.is_none() && numeric {
                id = segment.parse().ok();
                ":id".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect();
    (id, segments.join("/"))
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route, builder style.
    pub fn with_route<F>(self, method: Method, pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(RouteRequest) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.add_route(method, pattern, handler);
        self
    }

    /// Add a route. Later routes for the same method and pattern win.
    pub fn add_route<F>(&self, method: Method, pattern: impl Into<String>, handler: F)
    where
        F: Fn(RouteRequest) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Route {
                method,
                pattern: pattern.into(),
                handler: Arc::new(handler),
            });
    }

    /// Get all recorded requests.
    pub fn recorded_requests(&self) -> Vec<HttpRequest> {
        self.recorded_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_recorded(&self) {
        self.recorded_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn find(&self, method: Method, url: &str) -> Option<(Option<i64>, RouteHandler)> {
        let routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let (id, normalized) = normalize(url);
        routes
            .iter()
            .rev()
            .find(|route| {
                route.method == method && (route.pattern == normalized || route.pattern == url)
            })
            .map(|route| {
                let id = if route.pattern == url { None } else { id };
                (id, Arc::clone(&route.handler))
            })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, request: HttpRequest) -> Result<Value, Error> {
        self.recorded_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let (id, handler) = self.find(request.method, &request.url).ok_or_else(|| {
            Error::NotFound {
                method: request.method,
                url: request.url.clone(),
            }
        })?;

        handler(RouteRequest {
            id,
            body: request.body.clone(),
            request,
        })
    }
}
