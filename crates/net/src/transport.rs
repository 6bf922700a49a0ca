use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

/// HTTP method of an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Patch => "PATCH",
        }
    }
}

/// A prepared request handed to a transport. Header names are matched
/// case-insensitively on read.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// First header value whose name matches, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response produced by a transport.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Minimal response with an empty body, mostly for tests.
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// First header value whose name matches, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Error type for transport operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Socket-level failure. `connect` is true when the connection was never
    /// established, which callers map to a no-connectivity condition.
    #[error("transport i/o failure: {message}")]
    Io { message: String, connect: bool },
    #[error("transport timed out")]
    Timeout,
    #[error("tls failure: {0}")]
    Tls(String),
    #[error("transport cancelled")]
    Cancelled,
}

/// Trait for the HTTP layer beneath the network client.
///
/// `timeout` bounds the whole exchange; implementations return
/// [`TransportError::Timeout`] when it elapses.
pub trait Transport: Send + Sync {
    fn execute(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + '_>>;
}

/// Scripted transport for tests — pops one result per call, records requests.
///
/// An empty script yields `200` with an empty body, so simple tests don't
/// have to enqueue anything.
pub struct MockTransport {
    inner: Mutex<MockInner>,
}

struct MockInner {
    script: VecDeque<Result<HttpResponse, TransportError>>,
    delay: Option<Duration>,
    seen: Vec<HttpRequest>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockInner {
                script: VecDeque::new(),
                delay: None,
                seen: Vec::new(),
            }),
        }
    }

    /// Enqueue a response with the given status and body.
    pub fn respond(&self, status: u16, body: impl Into<Vec<u8>>) {
        let mut g = self.lock();
        g.script.push_back(Ok(HttpResponse {
            status,
            headers: Vec::new(),
            body: body.into(),
        }));
    }

    /// Enqueue a full response.
    pub fn respond_with(&self, response: HttpResponse) {
        self.lock().script.push_back(Ok(response));
    }

    /// Enqueue a transport failure.
    pub fn fail(&self, error: TransportError) {
        self.lock().script.push_back(Err(error));
    }

    /// Delay every call by `dur` before answering (tokio clock, so paused-time
    /// tests can drive transport timeouts deterministically).
    pub fn set_delay(&self, dur: Duration) {
        self.lock().delay = Some(dur);
    }

    /// Number of calls executed so far.
    pub fn calls(&self) -> usize {
        self.lock().seen.len()
    }

    /// Copies of every request seen, in call order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().seen.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn execute(
        &self,
        request: HttpRequest,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + '_>> {
        let (result, delay) = {
            let mut g = self.lock();
            g.seen.push(request);
            let result = g
                .script
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::with_status(200)));
            (result, g.delay)
        };
        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            result
        })
    }
}
