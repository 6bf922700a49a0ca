//! `reqwest`-backed [`Transport`] implementation.

use crate::transport::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Production transport over a shared [`reqwest::Client`].
///
/// The client's connection pool is reused across calls; per-request timeouts
/// come from the caller, not the client builder.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Wrap an already-configured client (proxies, pools, TLS settings).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Patch => reqwest::Method::PATCH,
    }
}

fn map_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Io {
            message: e.to_string(),
            connect: e.is_connect(),
        }
    }
}

impl Transport for ReqwestTransport {
    fn execute(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + '_>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(to_reqwest_method(request.method), &request.url)
                .timeout(timeout);

            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if !request.body.is_empty() {
                builder = builder.body(request.body.clone());
            }

            let resp = builder.send().await.map_err(map_error)?;

            let status = resp.status().as_u16();
            let headers = resp
                .headers()
                .iter()
                .filter_map(|(k, v)| {
                    v.to_str()
                        .ok()
                        .map(|v| (k.as_str().to_owned(), v.to_owned()))
                })
                .collect();
            let body = resp.bytes().await.map_err(map_error)?.to_vec();

            tracing::trace!(status, bytes = body.len(), url = %request.url, "http exchange complete");
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}
