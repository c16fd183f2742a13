//! # Network Module
//!
//! Request and response values exchanged with the remote API, and the
//! [`Transport`] seam everything network-bound goes through.
//!
//! ## Key Components
//!
//! - `http.rs`: [`HttpTransport`], the `reqwest` implementation
//! - `interceptor.rs`: [`Interceptor`], the cache policy wrapped around a transport
//!
//! A transport returns `Ok` for every request that produced an HTTP status,
//! including 4xx and 5xx. `Err` means no response was received at all.

pub mod http;
pub mod interceptor;

pub use http::HttpTransport;
pub use interceptor::{Interceptor, RequestClass};

use crate::shared::error::TransportError;
use bytes::Bytes;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;

/// How the request was initiated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level page navigation
    Navigate,
    /// Anything else: assets, API calls
    #[default]
    Other,
}

/// An outgoing request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub mode: RequestMode,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
            mode: RequestMode::Other,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// A page navigation
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    /// Attach a JSON body and its content type
    pub fn with_json(mut self, body: &serde_json::Value) -> Result<Self, TransportError> {
        let encoded = serde_json::to_vec(body)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        self.body = Some(Bytes::from(encoded));
        Ok(self.with_header("content-type", "application/json"))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Key under which a response to this request is cached
    ///
    /// Method plus the URL without its fragment, so two requests for the
    /// same resource always share an entry.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        format!("{} {}", self.method, url)
    }
}

/// A response as received from the network or a cache namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// A `200` JSON response
    pub fn json_ok(value: &serde_json::Value) -> Self {
        Self {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::from(value.to_string()),
        }
    }

    /// Any 2xx status
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Body as text, lossily decoded
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Something that can carry a request to the network
pub trait Transport: Send + Sync {
    fn fetch(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn fetch(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        (**self).fetch(request)
    }
}
