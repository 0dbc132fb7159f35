//! Conversation Controller
//!
//! Orchestrates one user turn at a time: appends the user turn, runs a relay
//! exchange with the prior history, folds fragments into a single growing bot
//! turn, and finalizes timing or error state.
//!
//! # Design Philosophy
//!
//! The controller is the only writer of the [`Conversation`]. The relay runs
//! on a spawned task and reports back over a channel; nothing changes in the
//! conversation until the owner drives the controller with
//! [`ConversationController::poll_streaming`] (non-blocking, for render
//! loops) or [`ConversationController::wait_settled`].
//!
//! Every state transition is mirrored to an optional surface channel as a
//! [`SurfaceMessage`].

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;

use crate::backend::{Relay, RelayError, RelayRequest};
use crate::messages::{ModelVariant, Role, SessionId, SurfaceMessage};
use crate::store::{Conversation, Fold};

/// Live elapsed counter resolution
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Controller configuration
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Greeting turn inserted at creation (`None` = start empty)
    pub greeting: Option<String>,
    /// Initially selected variant
    pub variant: ModelVariant,
    /// Longest silence from the relay before the exchange fails
    /// (`None` = wait forever)
    pub stream_timeout: Option<Duration>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            greeting: None,
            variant: ModelVariant::Fast,
            stream_timeout: Some(Duration::from_secs(120)),
        }
    }
}

/// Why a submission was refused
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// Input was empty after trimming
    #[error("Message is empty")]
    Empty,
    /// A previous submission has not settled yet
    #[error("A response is still in progress")]
    Pending,
}

/// Events forwarded from the exchange task
#[derive(Debug)]
enum StreamEvent {
    Fragment(String),
    Tick,
    Settled(Result<(), RelayError>),
}

/// The exchange currently in flight
struct Exchange {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    started: Instant,
    variant: ModelVariant,
}

/// Headless controller for one conversation
pub struct ConversationController<R: Relay + ?Sized> {
    /// Streaming relay
    relay: Arc<R>,
    /// Conversation log
    conversation: Conversation,
    /// Variant used by the next submission
    variant: ModelVariant,
    /// Idle limit between relay fragments
    stream_timeout: Option<Duration>,
    /// Channel to a connected surface
    surface: Option<mpsc::UnboundedSender<SurfaceMessage>>,
    /// In-flight exchange
    exchange: Option<Exchange>,
}

impl<R: Relay + 'static> ConversationController<R> {
    /// Create a controller that owns its relay
    pub fn new(relay: R, config: ControllerConfig) -> Self {
        Self::with_shared(Arc::new(relay), config)
    }
}

impl<R: Relay + ?Sized + 'static> ConversationController<R> {
    /// Create a controller over a shared relay (including `Arc<dyn Relay>`)
    pub fn with_shared(relay: Arc<R>, config: ControllerConfig) -> Self {
        Self {
            relay,
            conversation: Conversation::new(config.greeting.as_deref()),
            variant: config.variant,
            stream_timeout: config.stream_timeout,
            surface: None,
            exchange: None,
        }
    }

    /// Mirror state transitions to a surface channel
    #[must_use]
    pub fn with_surface(mut self, tx: mpsc::UnboundedSender<SurfaceMessage>) -> Self {
        self.surface = Some(tx);
        self
    }

    /// The relay this controller streams through
    pub fn relay(&self) -> &Arc<R> {
        &self.relay
    }

    /// Read access to the conversation
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Session identifier passed to the relay
    pub fn session_id(&self) -> &SessionId {
        self.conversation.session_id()
    }

    /// Currently selected variant
    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    /// Select the variant for subsequent submissions
    pub fn select_variant(&mut self, variant: ModelVariant) {
        if self.variant != variant {
            tracing::debug!(from = %self.variant, to = %variant, "Variant selected");
        }
        self.variant = variant;
    }

    /// Whether a submission is in flight
    pub fn is_pending(&self) -> bool {
        self.conversation.pending()
    }

    /// Submit user input
    ///
    /// Appends the user turn and starts the relay exchange on a spawned
    /// task. Results land in the conversation as the controller is driven.
    ///
    /// # Errors
    ///
    /// [`SubmitError::Empty`] for blank input, [`SubmitError::Pending`] while
    /// a previous submission is in flight. Neither touches the conversation.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn submit(&mut self, text: &str) -> Result<(), SubmitError> {
        let message = text.trim();
        if message.is_empty() {
            return Err(SubmitError::Empty);
        }
        if self.conversation.pending() {
            return Err(SubmitError::Pending);
        }

        // History is everything before the new user turn
        let history = self.conversation.history();

        self.conversation.begin_submission();
        self.emit(SurfaceMessage::Pending { pending: true });
        self.emit(SurfaceMessage::Elapsed { tenths: 0 });

        let user_id = self.conversation.push_user(message.to_string());
        self.emit(SurfaceMessage::TurnAppended {
            id: user_id,
            role: Role::User,
            content: message.to_string(),
        });

        let request = RelayRequest::new(message, self.session_id().clone())
            .with_variant(self.variant)
            .with_history(history);

        tracing::debug!(
            relay = self.relay.name(),
            session = %request.session_id,
            variant = %request.variant,
            history = request.history.len(),
            "Starting exchange"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        self.exchange = Some(Exchange {
            events: rx,
            started: Instant::now(),
            variant: self.variant,
        });
        tokio::spawn(drive(
            Arc::clone(&self.relay),
            request,
            self.stream_timeout,
            tx,
        ));

        Ok(())
    }

    /// Apply every event that has already arrived
    ///
    /// Never blocks. Returns true if there was activity.
    pub fn poll_streaming(&mut self) -> bool {
        let events: Vec<StreamEvent> = {
            let Some(exchange) = self.exchange.as_mut() else {
                return false;
            };

            let mut collected = Vec::new();
            loop {
                match exchange.events.try_recv() {
                    Ok(event) => {
                        let settled = matches!(event, StreamEvent::Settled(_));
                        collected.push(event);
                        if settled {
                            break;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        collected.push(StreamEvent::Settled(Err(lost_exchange())));
                        break;
                    }
                }
            }
            collected
        };

        if events.is_empty() {
            return false;
        }

        for event in events {
            self.apply(event);
        }
        true
    }

    /// Wait for the next event and apply it
    ///
    /// Returns whether the submission is still pending afterwards; false
    /// immediately when nothing is in flight.
    pub async fn process_next(&mut self) -> bool {
        let event = match self.exchange.as_mut() {
            Some(exchange) => exchange
                .events
                .recv()
                .await
                .unwrap_or_else(|| StreamEvent::Settled(Err(lost_exchange()))),
            None => return false,
        };

        self.apply(event);
        self.exchange.is_some()
    }

    /// Drive the in-flight submission until it settles
    pub async fn wait_settled(&mut self) {
        while self.process_next().await {}
    }

    /// Submit and drive the exchange to completion
    ///
    /// # Errors
    ///
    /// Same as [`ConversationController::submit`].
    pub async fn submit_and_wait(&mut self, text: &str) -> Result<(), SubmitError> {
        self.submit(text)?;
        self.wait_settled().await;
        Ok(())
    }

    fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Fragment(text) => {
                if text.is_empty() {
                    return;
                }
                let variant = self
                    .exchange
                    .as_ref()
                    .map_or(self.variant, |exchange| exchange.variant);

                match self.conversation.fold_fragment(&text, variant) {
                    Fold::Opened(id) => {
                        tracing::trace!(turn = %id, len = text.len(), "Opened bot turn");
                        self.emit(SurfaceMessage::TurnAppended {
                            id,
                            role: Role::Bot,
                            content: text,
                        });
                    }
                    Fold::Appended(turn_id) => {
                        tracing::trace!(turn = %turn_id, len = text.len(), "Fragment");
                        self.emit(SurfaceMessage::Fragment { turn_id, text });
                    }
                }
            }
            StreamEvent::Tick => {
                let tenths = self.conversation.tick();
                self.emit(SurfaceMessage::Elapsed { tenths });
            }
            StreamEvent::Settled(result) => self.settle(result),
        }
    }

    fn settle(&mut self, result: Result<(), RelayError>) {
        let started = self.exchange.take().map(|exchange| exchange.started);

        match result {
            Ok(()) => {
                let elapsed = started.map(|s| round_tenths(s.elapsed()));
                let turn_id = self.conversation.close_open_turn(elapsed);
                let elapsed_seconds = turn_id.as_ref().and(elapsed);

                tracing::debug!(
                    turn = ?turn_id,
                    elapsed = ?elapsed_seconds,
                    "Exchange complete"
                );
                self.emit(SurfaceMessage::StreamEnd {
                    turn_id,
                    elapsed_seconds,
                });
            }
            Err(error) => {
                let turn_id = self.conversation.close_open_turn(None);
                let message = error.to_string();

                tracing::warn!(
                    relay = self.relay.name(),
                    partial = turn_id.is_some(),
                    error = %message,
                    detail = ?error,
                    "Exchange failed"
                );
                self.conversation.set_error(message.clone());
                self.emit(SurfaceMessage::StreamError {
                    turn_id,
                    error: message,
                });
            }
        }

        self.conversation.end_submission();
        self.emit(SurfaceMessage::Pending { pending: false });
    }

    fn emit(&self, message: SurfaceMessage) {
        if let Some(tx) = &self.surface {
            // A departed surface is not an error
            let _ = tx.send(message);
        }
    }
}

/// Run one exchange, forwarding fragments and ticks until it settles
///
/// The exchange fails with [`RelayError::TimedOut`] once `idle_timeout`
/// passes without a fragment. The check runs on each tick.
async fn drive<R: Relay + ?Sized>(
    relay: Arc<R>,
    request: RelayRequest,
    idle_timeout: Option<Duration>,
    events: mpsc::UnboundedSender<StreamEvent>,
) {
    let (fragment_tx, mut fragment_rx) = mpsc::unbounded_channel();
    let mut sink = move |fragment: String| {
        let _ = fragment_tx.send(fragment);
    };

    let exchange = relay.stream(&request, &mut sink);
    tokio::pin!(exchange);

    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;
    let mut last_activity = Instant::now();

    let result = loop {
        tokio::select! {
            biased;
            Some(fragment) = fragment_rx.recv() => {
                last_activity = Instant::now();
                let _ = events.send(StreamEvent::Fragment(fragment));
            }
            result = &mut exchange => break result,
            _ = ticker.tick() => {
                let _ = events.send(StreamEvent::Tick);
                if let Some(limit) = idle_timeout {
                    if last_activity.elapsed() >= limit {
                        break Err(RelayError::TimedOut(limit));
                    }
                }
            }
        }
    };

    // Fragments delivered in the final poll
    while let Ok(fragment) = fragment_rx.try_recv() {
        let _ = events.send(StreamEvent::Fragment(fragment));
    }
    let _ = events.send(StreamEvent::Settled(result));
}

fn lost_exchange() -> RelayError {
    RelayError::Transport("exchange task ended without a result".to_string())
}

/// Round to one decimal place of seconds
fn round_tenths(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 10.0).round() / 10.0
}
