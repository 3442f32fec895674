//! Error taxonomy for the sync core.
//!
//! Nothing in here is fatal to the application: transport failures are
//! retried by the channel's reconnect loop, request failures are logged and
//! surfaced, and unknown references are handled by materialization rather
//! than as errors.

use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The push channel could not connect, or dropped mid-stream.
    #[error("transport error: {0}")]
    Transport(String),

    /// A REST call came back with a non-success status.
    #[error("{operation} failed with status {status}")]
    Status { operation: &'static str, status: u16 },

    /// A REST call never produced a response.
    #[error("{operation} request failed: {source}")]
    Request {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no conversation is open")]
    NoOpenConversation,

    #[error("message is empty")]
    EmptyMessage,

    #[error("sync session has shut down")]
    Closed,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub fn from_reqwest(operation: &'static str, err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::Status {
                operation,
                status: status.as_u16(),
            }
        } else {
            Self::Request {
                operation,
                source: err,
            }
        }
    }

    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Http(response) => {
                Self::Transport(format!("handshake rejected with {}", response.status()))
            }
            other => Self::Transport(other.to_string()),
        }
    }

    /// True for failures of the underlying connection rather than of the
    /// request itself.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Request { source, .. } => source.is_connect() || source.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_display_names_operation() {
        let err = SyncError::Status {
            operation: "mark-conversation-read",
            status: 503,
        };
        assert_eq!(
            err.to_string(),
            "mark-conversation-read failed with status 503"
        );
        assert!(!err.is_transport());
    }

    #[test]
    fn transport_errors_are_transport() {
        assert!(SyncError::Transport("reset".into()).is_transport());
        assert!(!SyncError::NoOpenConversation.is_transport());
        assert!(!SyncError::Closed.is_transport());
    }

    #[test]
    fn from_tungstenite_io_error_keeps_message() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = SyncError::from_tungstenite(tungstenite::Error::Io(io));
        assert!(err.is_transport());
        assert!(err.to_string().contains("refused"));
    }

    #[tokio::test]
    async fn from_reqwest_connect_error_is_transport() {
        // Port 1 is never listening
        let err = reqwest::get("http://127.0.0.1:1/nope").await.unwrap_err();
        let err = SyncError::from_reqwest("list-my-conversations", err);
        assert!(matches!(err, SyncError::Request { .. }));
        assert!(err.is_transport());
    }

    #[test]
    fn decode_error_converts() {
        let bad = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: SyncError = bad.into();
        assert!(matches!(err, SyncError::Decode(_)));
    }
}
