use kairo_net::TransportError;

/// Error type for request execution.
///
/// `Cancelled` covers every gating path: policy denial, deactivated gate,
/// and external cancellation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("operation cancelled")]
    Cancelled,
    #[error("circuit breaker open")]
    CircuitOpen,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("request timed out")]
    Timeout,
    #[error("no network connection")]
    NoConnection,
    #[error("server error: HTTP {0}")]
    ServerError(u16),
    #[error("client error: HTTP {0}")]
    ClientError(u16),
    #[error("unknown network failure")]
    Unknown,
}

impl NetworkError {
    /// Whether the retry loop may attempt the request again.
    ///
    /// Transport faults, timeouts, and 5xx qualify; gating outcomes and 4xx
    /// are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed(_)
                | Self::Timeout
                | Self::NoConnection
                | Self::ServerError(_)
                | Self::Unknown
        )
    }
}

impl From<TransportError> for NetworkError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Io { connect: true, .. } => Self::NoConnection,
            TransportError::Io { message, .. } => Self::RequestFailed(message),
            TransportError::Timeout => Self::Timeout,
            TransportError::Tls(msg) => Self::RequestFailed(format!("tls: {msg}")),
            TransportError::Cancelled => Self::Cancelled,
        }
    }
}

/// Error from an underlying device read. Swallowed and logged inside the
/// monitor; never surfaced through the public API.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    #[error("device facility unavailable: {0}")]
    Unavailable(String),
    #[error("device read failed: {0}")]
    ReadFailed(String),
}
