//! Realtime feed error types.

/// Errors that can occur while fetching, validating or persisting the feed.
///
/// None of these reach readers of the cache; the refresh loop records them
/// and keeps serving the previous snapshot.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// Transport failure (connection refused, TLS, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider rejected the credential
    #[error("unauthorized: check NTA_API_KEY")]
    Unauthorized,

    /// Provider returned a non-2xx status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Payload is not a feed: missing header object or entity array, or
    /// entities that do not deserialize
    #[error("unexpected feed format: {message}")]
    Format { message: String },

    /// Reading or writing the durable snapshot failed
    #[error("snapshot error: {message}")]
    Snapshot { message: String },
}

impl RealtimeError {
    /// Short machine-friendly label, used in logs and status output.
    pub fn kind(&self) -> &'static str {
        match self {
            RealtimeError::Http(_) | RealtimeError::Unauthorized | RealtimeError::Api { .. } => {
                "fetch"
            }
            RealtimeError::Format { .. } => "format",
            RealtimeError::Snapshot { .. } => "snapshot",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = RealtimeError::Api {
            status: 503,
            message: "Service Unavailable".into(),
        };
        assert_eq!(err.to_string(), "API error 503: Service Unavailable");

        let err = RealtimeError::Format {
            message: "missing entity array".into(),
        };
        assert_eq!(err.to_string(), "unexpected feed format: missing entity array");
    }

    #[test]
    fn error_kinds() {
        assert_eq!(RealtimeError::Unauthorized.kind(), "fetch");
        let err = RealtimeError::Format {
            message: String::new(),
        };
        assert_eq!(err.kind(), "format");
    }
}
