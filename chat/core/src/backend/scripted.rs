//! Scripted Relay
//!
//! A relay that replays canned fragments instead of talking to a backend.
//! Used by the controller tests and handy for surfaces that want to run
//! without network access.
//!
//! # Usage
//!
//! ```ignore
//! use chat_core::backend::{RelayError, ScriptedRelay, ScriptedResponse};
//!
//! let relay = ScriptedRelay::new()
//!     .with_response(ScriptedResponse::complete(&["Hi", " there!"]))
//!     .with_response(ScriptedResponse::failing(&[], RelayError::Closed { code: Some(1011) }));
//!
//! // After the test, inspect what the controller sent
//! assert_eq!(relay.requests()[0].message, "Hello");
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::traits::{Relay, RelayError, RelayRequest};

/// One canned exchange
#[derive(Clone, Debug)]
pub struct ScriptedResponse {
    /// Fragments delivered in order
    pub fragments: Vec<String>,
    /// How the exchange settles after the fragments
    pub outcome: Result<(), RelayError>,
}

impl ScriptedResponse {
    /// Deliver `fragments`, then terminate cleanly
    pub fn complete(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| (*f).to_string()).collect(),
            outcome: Ok(()),
        }
    }

    /// Deliver `fragments`, then fail with `error`
    pub fn failing(fragments: &[&str], error: RelayError) -> Self {
        Self {
            fragments: fragments.iter().map(|f| (*f).to_string()).collect(),
            outcome: Err(error),
        }
    }
}

/// Relay that replays queued [`ScriptedResponse`]s
///
/// Each call pops the next response; once the queue is empty calls succeed
/// with no fragments. With a gate installed, every exchange holds after its
/// fragments until [`ScriptedRelay::release`] is called.
#[derive(Debug, Default)]
pub struct ScriptedRelay {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<RelayRequest>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedRelay {
    /// Create a relay with no queued responses
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response (builder form)
    #[must_use]
    pub fn with_response(self, response: ScriptedResponse) -> Self {
        self.push(response);
        self
    }

    /// Hold every exchange open until released
    #[must_use]
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Notify::new()));
        self
    }

    /// Queue a response
    pub fn push(&self, response: ScriptedResponse) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
    }

    /// Let one held exchange settle
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<RelayRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Number of exchanges started
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Relay for ScriptedRelay {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        request: &RelayRequest,
        on_fragment: &mut (dyn FnMut(String) + Send),
    ) -> Result<(), RelayError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let response = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front())
            .unwrap_or_else(|| ScriptedResponse::complete(&[]));

        for fragment in response.fragments {
            on_fragment(fragment);
        }

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        response.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::SessionId;

    #[tokio::test]
    async fn test_replays_in_order() {
        let relay = ScriptedRelay::new()
            .with_response(ScriptedResponse::complete(&["a", "b"]))
            .with_response(ScriptedResponse::failing(
                &["c"],
                RelayError::Closed { code: Some(1011) },
            ));

        let request = RelayRequest::new("hi", SessionId::new());
        let mut seen = Vec::new();

        let first = relay.stream(&request, &mut |f| seen.push(f)).await;
        assert!(first.is_ok());
        let second = relay.stream(&request, &mut |f| seen.push(f)).await;
        assert_eq!(second, Err(RelayError::Closed { code: Some(1011) }));
        let third = relay.stream(&request, &mut |f| seen.push(f)).await;
        assert!(third.is_ok());

        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(relay.call_count(), 3);
    }
}
