//! Error taxonomy shared by the transport, session, and api layers.

use reqwest::StatusCode;

/// Everything a client call can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Rejected client-side before any network call.
    #[error("{0}")]
    Validation(String),

    /// Non-2xx response. `detail` is the server's human-readable message, if any.
    #[error("request failed ({status}): {}", api_message(.detail, .body))]
    Api {
        status: StatusCode,
        detail: Option<String>,
        body: String,
    },

    /// 401 on a session-bound request. The session has already been evicted.
    #[error("session expired or invalid")]
    Unauthorized { detail: Option<String> },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("session storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Server-provided `detail` message, when the failure came from the API.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Api { detail, .. } | Self::Unauthorized { detail } => detail.as_deref(),
            _ => None,
        }
    }

    /// HTTP status of the failure, if there was a response at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }

    /// Message to show inline next to a form: server detail, then validation
    /// text, then `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        if let Some(detail) = self.detail() {
            return detail.to_string();
        }
        match self {
            Self::Validation(msg) => msg.clone(),
            _ => fallback.to_string(),
        }
    }

    /// Build the error for a non-2xx response. Only session-bound requests
    /// turn a 401 into [`ClientError::Unauthorized`]; a 401 from the login
    /// endpoint is an ordinary credential failure.
    pub(crate) fn from_response(status: StatusCode, body: &[u8], session_bound: bool) -> Self {
        let detail = extract_detail(body);
        if session_bound && status == StatusCode::UNAUTHORIZED {
            return Self::Unauthorized { detail };
        }
        Self::Api {
            status,
            detail,
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }
}

fn api_message<'a>(detail: &'a Option<String>, body: &'a str) -> &'a str {
    detail.as_deref().unwrap_or(body)
}

/// Pull `{"detail": "..."}` out of an error body. Structured details
/// (validation arrays) are not a displayable message and yield `None`.
pub(crate) fn extract_detail(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("detail")
        .and_then(|d| d.as_str())
        .map(str::to_string)
}
