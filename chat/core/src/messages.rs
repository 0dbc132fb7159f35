//! Chat Messages
//!
//! Identifiers, roles, and the messages the controller pushes to a connected
//! UI surface (terminal, web view, test harness).
//!
//! # Design Philosophy
//!
//! The controller owns the conversation. Surfaces are renderers: they either
//! read the [`Conversation`](crate::store::Conversation) directly or follow the
//! [`SurfaceMessage`] stream, which mirrors every state transition in order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Messages from the controller to a UI surface
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SurfaceMessage {
    /// A turn was appended to the conversation
    TurnAppended {
        /// Turn identifier
        id: TurnId,
        /// Who produced the turn
        role: Role,
        /// Initial content (the first fragment for bot turns)
        content: String,
    },

    /// A fragment was appended to the open bot turn
    Fragment {
        /// Turn the fragment belongs to
        turn_id: TurnId,
        /// The fragment text
        text: String,
    },

    /// The exchange finished cleanly
    StreamEnd {
        /// Bot turn produced by the exchange, if any fragment arrived
        turn_id: Option<TurnId>,
        /// Response time attached to the bot turn
        elapsed_seconds: Option<f64>,
    },

    /// The exchange failed
    StreamError {
        /// Partial bot turn left in place, if any
        turn_id: Option<TurnId>,
        /// User-presentable error
        error: String,
    },

    /// The pending flag changed
    Pending {
        /// Whether a submission is in flight
        pending: bool,
    },

    /// The live elapsed counter advanced
    Elapsed {
        /// Elapsed time in tenths of a second
        tenths: u32,
    },
}

/// Turn identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

impl TurnId {
    /// Well-known id of the bootstrap greeting turn
    pub const GREETING: &'static str = "initial";

    /// Generate a new unique turn ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("turn_{id}"))
    }

    /// Id of the bootstrap greeting turn
    #[must_use]
    pub fn greeting() -> Self {
        Self(Self::GREETING.to_string())
    }

    /// Whether this is the greeting turn's id
    #[must_use]
    pub fn is_greeting(&self) -> bool {
        self.0 == Self::GREETING
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session identifier
///
/// Generated once per conversation and handed to the relay on every call,
/// so the backend can key its own context on it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random session ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who produced a turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User input
    User,
    /// Model output
    Bot,
}

/// Which model profile a submission runs against
///
/// Selected by the user and passed through unchanged on every submission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Quick answers, no extended reasoning
    #[default]
    Fast,
    /// Slower answers with a thinking budget
    Reasoning,
}

impl ModelVariant {
    /// Human-readable label for menus and status lines
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Fast => "Fast",
            Self::Reasoning => "Reasoning",
        }
    }

    /// Config/CLI spelling
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Reasoning => "reasoning",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" | "pro" => Ok(Self::Fast),
            "reasoning" | "thinking" | "think" => Ok(Self::Reasoning),
            other => Err(format!(
                "unknown model variant '{other}' (expected 'fast' or 'reasoning')"
            )),
        }
    }
}
