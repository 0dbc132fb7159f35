//! Chat Core - Headless Streaming Chat
//!
//! This crate holds everything behind a single-conversation chat assistant,
//! independent of any UI. A terminal, a web view, or a test harness drives it
//! the same way.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      UI Surface                            │
//! │        reads Conversation / follows SurfaceMessage         │
//! └─────────────────────────────┬─────────────────────────────┘
//!                               │ submit(text)
//! ┌─────────────────────────────┼─────────────────────────────┐
//! │                    CHAT CORE                               │
//! │  ┌──────────────────────────┴──────────────────────────┐   │
//! │  │              ConversationController                  │   │
//! │  │  ┌──────────────┐              ┌──────────────────┐  │   │
//! │  │  │ Conversation │ ◄── folds ── │  Relay (socket / │  │   │
//! │  │  │   (store)    │   fragments  │  managed / test) │  │   │
//! │  │  └──────────────┘              └──────────────────┘  │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ConversationController`]: submits user turns and folds the response
//! - [`Conversation`]: ordered turns plus pending/error/elapsed state
//! - [`Relay`]: one streaming exchange per call, fragments to a sink
//! - [`SurfaceMessage`]: state transitions mirrored to a UI surface
//! - [`ChatConfig`]: defaults, TOML file, environment, CLI overrides
//!
//! # Quick Start
//!
//! ```ignore
//! use chat_core::{build_relay, load_config, ConversationController};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let relay = build_relay(&config)?;
//!     let mut controller = ConversationController::with_shared(relay, config.controller_config());
//!
//!     controller.submit_and_wait("Hello").await?;
//!
//!     for turn in controller.conversation().turns() {
//!         println!("{:?}: {}", turn.role, turn.content);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: the [`Relay`] trait and its socket, managed and scripted implementations
//! - [`config`]: configuration loading with source priority
//! - [`controller`]: the conversation controller
//! - [`messages`]: identifiers, roles, variants and surface messages
//! - [`store`]: the in-memory conversation log

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod controller;
pub mod messages;
pub mod store;

// Re-exports for convenience
pub use backend::{
    build_relay, HistoryEntry, ManagedRelay, ManagedRelayConfig, ModelProfile, Relay, RelayError,
    RelayRequest, ScriptedRelay, ScriptedResponse, SocketRelay, SocketRelayConfig,
};
pub use controller::{ControllerConfig, ConversationController, SubmitError};
pub use messages::{ModelVariant, Role, SessionId, SurfaceMessage, TurnId};
pub use store::{Conversation, Fold, Turn};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ChatConfig, ChatConfigToml,
    ConfigError, ConfigOverrides, ConfigSource, RelayKind,
};
