//! `reqwest` transport

use crate::network::{HttpRequest, HttpResponse, Transport};
use crate::shared::config::SyncConfig;
use crate::shared::error::TransportError;
use reqwest::Client;
use std::time::Duration;

/// Carries requests over HTTP with a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// A transport that gives up after `timeout`; `None` leaves it to the OS
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::new(builder.build()?))
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, TransportError> {
        Self::with_timeout(config.request_timeout())
    }
}

impl Transport for HttpTransport {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.request(request.method, request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
