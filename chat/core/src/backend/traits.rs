//! Relay Traits
//!
//! The contract every streaming backend satisfies. The controller only ever
//! sees [`Relay`], so the socket relay and the managed-call relay can be
//! swapped without touching conversation logic.
//!
//! # Contract
//!
//! - One call opens exactly one streaming exchange.
//! - Fragments go to the sink synchronously, in arrival order, one call per
//!   fragment. Nothing is buffered or reordered.
//! - The call resolves once: `Ok(())` on clean termination (zero fragments is
//!   fine), `Err` on anything else. Fragments already delivered stay delivered.
//! - The relay has no side effects beyond the sink.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::messages::{ModelVariant, Role, SessionId};

/// One prior turn handed to the backend as context
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Who produced the turn
    pub role: Role,
    /// Turn text (never empty)
    pub text: String,
}

impl HistoryEntry {
    /// Create a history entry
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// A single streaming exchange request
#[derive(Clone, Debug, PartialEq)]
pub struct RelayRequest {
    /// The new user message (non-empty)
    pub message: String,
    /// Prior turns, oldest first
    pub history: Vec<HistoryEntry>,
    /// Model profile to run against
    pub variant: ModelVariant,
    /// Conversation session the exchange belongs to
    pub session_id: SessionId,
}

impl RelayRequest {
    /// Create a request with empty history
    pub fn new(message: impl Into<String>, session_id: SessionId) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            variant: ModelVariant::default(),
            session_id,
        }
    }

    /// Set the model variant
    #[must_use]
    pub fn with_variant(mut self, variant: ModelVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Set the history, dropping any empty entries
    #[must_use]
    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history
            .into_iter()
            .filter(|entry| !entry.text.is_empty())
            .collect();
        self
    }
}

/// Why an exchange failed
///
/// The `Display` text is what ends up in the conversation's `last_error`.
/// Transport detail and close codes stay in the fields for logging.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    /// Could not open the exchange
    #[error("A connection error occurred. Service may be temporarily unavailable.")]
    Connect(String),

    /// The transport failed mid-exchange
    #[error("Connection lost while streaming response. Please try again.")]
    Transport(String),

    /// The socket closed without a clean status
    #[error("Connection closed. Please check your network or try again later.")]
    Closed {
        /// Close code, if the peer sent one
        code: Option<u16>,
    },

    /// The backend answered with a non-success HTTP status
    #[error("Backend returned HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Error body or message
        message: String,
    },

    /// A stream chunk could not be decoded
    #[error("Received a malformed response chunk: {0}")]
    Decode(String),

    /// The backend reported an error inside the stream
    #[error("Backend reported an error: {0}")]
    Upstream(String),

    /// Nothing arrived from the backend for the idle limit
    #[error("No response for {} seconds. Please try again.", secs(.0))]
    TimedOut(Duration),
}

fn secs(limit: &Duration) -> u64 {
    limit.as_secs()
}

/// Streaming relay trait
///
/// Implement this to add another backend protocol.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Backend name for logs (e.g. "socket", "managed")
    fn name(&self) -> &str;

    /// Run one streaming exchange, handing each fragment to `on_fragment`
    async fn stream(
        &self,
        request: &RelayRequest,
        on_fragment: &mut (dyn FnMut(String) + Send),
    ) -> Result<(), RelayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_request_builder() {
        let session = SessionId::new();
        let request = RelayRequest::new("Hello", session.clone())
            .with_variant(ModelVariant::Reasoning)
            .with_history(vec![
                HistoryEntry::new(Role::User, "Earlier"),
                HistoryEntry::new(Role::Bot, ""),
                HistoryEntry::new(Role::Bot, "Answer"),
            ]);

        assert_eq!(request.message, "Hello");
        assert_eq!(request.variant, ModelVariant::Reasoning);
        assert_eq!(request.session_id, session);
        assert_eq!(request.history.len(), 2);
        assert!(request.history.iter().all(|e| !e.text.is_empty()));
    }

    #[test]
    fn test_relay_error_display() {
        let closed = "Connection closed. Please check your network or try again later.";
        assert_eq!(RelayError::Closed { code: Some(1006) }.to_string(), closed);
        assert_eq!(RelayError::Closed { code: None }.to_string(), closed);

        let err = RelayError::Connect("IO error: Connection refused (os error 111)".to_string());
        assert_eq!(
            err.to_string(),
            "A connection error occurred. Service may be temporarily unavailable."
        );

        let err = RelayError::Transport("error decoding response body".to_string());
        assert_eq!(
            err.to_string(),
            "Connection lost while streaming response. Please try again."
        );

        let err = RelayError::TimedOut(Duration::from_secs(120));
        assert_eq!(err.to_string(), "No response for 120 seconds. Please try again.");

        let err = RelayError::Http {
            status: 403,
            message: "API key not valid".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Backend returned HTTP 403: API key not valid"
        );
    }
}
