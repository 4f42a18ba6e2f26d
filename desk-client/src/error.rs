//! Client error types

use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed (network, timeout, body decoding)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Authentication required (401); reported to the session provider
    #[error("Authentication required")]
    Unauthorized,

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Push channel transport failure
    #[error("Channel error: {0}")]
    Channel(String),

    /// STOMP protocol violation or broker ERROR frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Rejected client-side before any request was made
    #[error("Validation error: {0}")]
    Validation(String),

    /// No signed-in session
    #[error("No active session")]
    NoSession,

    /// Ticket operation without a loaded ticket
    #[error("No ticket loaded")]
    NoActiveTicket,

    /// Notification queue is empty
    #[error("Notification queue is empty")]
    QueueEmpty,

    /// An acknowledgment for the current notification is already running
    #[error("Acknowledgment already in flight")]
    AcknowledgeInFlight,

    /// Mandatory notifications can only leave the queue through acknowledgment
    #[error("Notification {0} is mandatory and must be acknowledged")]
    MandatoryNotification(i64),

    /// Platform (sound / notification / window) failure
    #[error("Platform error: {0}")]
    Platform(String),
}

impl ClientError {
    /// Network-level failures the user may retry ("Tentar novamente")
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Channel(_) => true,
            _ => false,
        }
    }

    /// Message suitable for inline rendering
    pub fn user_message(&self) -> String {
        match self {
            Self::Http(_) => "Falha de comunicação com o servidor".to_string(),
            Self::Unauthorized => "Sessão expirada".to_string(),
            Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ClientError::Api { status: 503, message: "down".into() }.is_transient());
        assert!(ClientError::Api { status: 429, message: "slow".into() }.is_transient());
        assert!(!ClientError::Api { status: 400, message: "bad".into() }.is_transient());
        assert!(ClientError::Channel("reset".into()).is_transient());
        assert!(!ClientError::Unauthorized.is_transient());
        assert!(!ClientError::MandatoryNotification(1).is_transient());
    }

    #[test]
    fn test_user_message_prefers_api_text() {
        let err = ClientError::Api { status: 409, message: "Chamado já assumido".into() };
        assert_eq!(err.user_message(), "Chamado já assumido");
    }
}
