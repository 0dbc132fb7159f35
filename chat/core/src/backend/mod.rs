//! Streaming Relays
//!
//! This module provides the backends that turn one user message into a stream
//! of text fragments, all behind the common [`Relay`] trait.
//!
//! # Available Relays
//!
//! - **Socket**: WebSocket chat proxy (default)
//! - **Managed**: Gemini-style `streamGenerateContent` over server-sent events
//! - **Scripted**: canned responses, for tests and offline surfaces
//!
//! # Usage
//!
//! ```ignore
//! use chat_core::backend::{build_relay, RelayRequest};
//! use chat_core::{ChatConfig, SessionId};
//!
//! let relay = build_relay(&ChatConfig::default())?;
//! let request = RelayRequest::new("Hello!", SessionId::new());
//! relay.stream(&request, &mut |fragment| print!("{fragment}")).await?;
//! ```

mod managed;
mod scripted;
mod socket;
mod traits;

use std::sync::Arc;

pub use managed::{ManagedRelay, ManagedRelayConfig, ModelProfile, SseDecoder, DEFAULT_MANAGED_URL};
pub use scripted::{ScriptedRelay, ScriptedResponse};
pub use socket::{SocketRelay, SocketRelayConfig, DEFAULT_APP_ID, DEFAULT_SOCKET_URL};
pub use traits::{HistoryEntry, Relay, RelayError, RelayRequest};

use crate::config::{ChatConfig, RelayKind};

/// Build the relay selected by the configuration
///
/// # Errors
///
/// Returns an error if the managed relay's HTTP client cannot be created.
pub fn build_relay(config: &ChatConfig) -> Result<Arc<dyn Relay>, RelayError> {
    let relay: Arc<dyn Relay> = match config.relay {
        RelayKind::Socket => Arc::new(SocketRelay::new(config.socket_relay_config())),
        RelayKind::Managed => Arc::new(ManagedRelay::new(config.managed_relay_config())?),
    };

    tracing::info!(relay = relay.name(), "Relay selected");
    Ok(relay)
}
