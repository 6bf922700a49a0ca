use std::time::Duration;
use uuid::Uuid;

use crate::types::RequestPriority;
use kairo_net::HttpMethod;

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default retry budget.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// A caller-submitted request. Header names are matched case-insensitively
/// on read.
#[derive(Debug, Clone)]
pub struct NetworkRequest {
    /// Correlation id carried through logs.
    pub id: Uuid,
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub timeout: Duration,
    pub priority: RequestPriority,
    pub retry_enabled: bool,
    pub max_retries: u32,
}

impl NetworkRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            method,
            headers: Vec::new(),
            body: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            priority: RequestPriority::Normal,
            retry_enabled: true,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        let mut req = Self::new(HttpMethod::Post, url);
        req.body = body.into();
        req
    }

    pub fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.retry_enabled = false;
        self
    }

    /// First header value whose name matches, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The outcome of an executed request.
#[derive(Debug, Clone)]
pub struct NetworkResponse {
    pub body: Vec<u8>,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Wall time from gate exit to completion, retries included.
    pub duration: Duration,
    /// Attempts beyond the first.
    pub retry_count: u32,
}

impl NetworkResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value whose name matches, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
