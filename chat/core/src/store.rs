//! Message Store
//!
//! The conversation log: an ordered list of turns plus the flags a surface
//! needs to render it (`pending`, `last_error`, the live elapsed counter).
//!
//! # Design Philosophy
//!
//! The log is append-only. The one exception is the open bot turn, which
//! grows in place as fragments arrive and is frozen when its exchange
//! settles. Turns are never removed during a session and nothing is
//! persisted.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::backend::HistoryEntry;
use crate::messages::{ModelVariant, Role, SessionId, TurnId};

/// One conversation turn
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: TurnId,
    /// Who produced this turn
    pub role: Role,
    /// Turn content
    pub content: String,
    /// When the turn was created (Unix timestamp ms)
    pub created_at: u64,
    /// Response time in seconds, set once on successful bot turns
    pub elapsed_seconds: Option<f64>,
    /// Whether fragments are still arriving
    pub streaming: bool,
    /// Variant that produced a bot turn
    pub variant: Option<ModelVariant>,
}

impl Turn {
    /// Create a user turn
    pub fn user(content: String) -> Self {
        Self {
            id: TurnId::new(),
            role: Role::User,
            content,
            created_at: now_ms(),
            elapsed_seconds: None,
            streaming: false,
            variant: None,
        }
    }

    /// Create an open bot turn seeded with its first fragment
    pub fn bot(first_fragment: String, variant: ModelVariant) -> Self {
        Self {
            id: TurnId::new(),
            role: Role::Bot,
            content: first_fragment,
            created_at: now_ms(),
            elapsed_seconds: None,
            streaming: true,
            variant: Some(variant),
        }
    }

    /// Create the bootstrap greeting turn
    pub fn greeting(content: String) -> Self {
        Self {
            id: TurnId::greeting(),
            role: Role::Bot,
            content,
            created_at: now_ms(),
            elapsed_seconds: None,
            streaming: false,
            variant: None,
        }
    }

    /// Whether this is the bootstrap greeting
    pub fn is_greeting(&self) -> bool {
        self.id.is_greeting()
    }

    /// Creation time in the local timezone
    pub fn created_local(&self) -> Option<DateTime<Local>> {
        i64::try_from(self.created_at)
            .ok()
            .and_then(|ms| Local.timestamp_millis_opt(ms).single())
    }

    /// `HH:MM` label for the creation time
    pub fn time_label(&self) -> String {
        self.created_local()
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_default()
    }

    /// "Processed in Xs" label for finished bot turns
    pub fn processed_label(&self) -> Option<String> {
        match (self.role, self.elapsed_seconds) {
            (Role::Bot, Some(secs)) => Some(format!("Processed in {secs:.1}s")),
            _ => None,
        }
    }
}

/// What folding a fragment did to the log
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fold {
    /// A new bot turn was opened with the fragment
    Opened(TurnId),
    /// The fragment was appended to the open bot turn
    Appended(TurnId),
}

impl Fold {
    /// The bot turn affected
    pub fn turn_id(&self) -> &TurnId {
        match self {
            Self::Opened(id) | Self::Appended(id) => id,
        }
    }
}

/// An in-memory conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    session_id: SessionId,
    turns: Vec<Turn>,
    /// Bot turn still receiving fragments (if any)
    open_turn: Option<TurnId>,
    pending: bool,
    last_error: Option<String>,
    /// Live elapsed counter in tenths of a second
    elapsed_tenths: u32,
}

impl Conversation {
    /// Create a conversation, seeded with a greeting if one is given
    pub fn new(greeting: Option<&str>) -> Self {
        Self::with_session_id(SessionId::new(), greeting)
    }

    /// Create a conversation with a specific session ID
    pub fn with_session_id(session_id: SessionId, greeting: Option<&str>) -> Self {
        let turns = greeting
            .filter(|text| !text.is_empty())
            .map(|text| vec![Turn::greeting(text.to_string())])
            .unwrap_or_default();

        Self {
            session_id,
            turns,
            open_turn: None,
            pending: false,
            last_error: None,
            elapsed_tenths: 0,
        }
    }

    /// Session this conversation belongs to
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// All turns in display order
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the log has no turns at all
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Most recent turn
    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Turn by ID
    pub fn get(&self, id: &TurnId) -> Option<&Turn> {
        self.turns.iter().find(|t| &t.id == id)
    }

    /// Whether a submission is in flight
    pub fn pending(&self) -> bool {
        self.pending
    }

    /// Error from the most recent failed submission
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Live elapsed counter in tenths of a second
    pub fn elapsed_tenths(&self) -> u32 {
        self.elapsed_tenths
    }

    /// Live elapsed counter in seconds
    pub fn elapsed_seconds(&self) -> f64 {
        f64::from(self.elapsed_tenths) / 10.0
    }

    /// Pending, and no fragment has arrived yet for the latest user turn
    pub fn is_thinking(&self) -> bool {
        self.pending && self.last_turn().is_some_and(|t| t.role == Role::User)
    }

    /// The open bot turn's ID
    pub fn open_turn(&self) -> Option<&TurnId> {
        self.open_turn.as_ref()
    }

    /// Context for the relay: every turn except the greeting and empty ones
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.turns
            .iter()
            .filter(|t| !t.is_greeting() && !t.content.is_empty())
            .map(|t| HistoryEntry::new(t.role, t.content.clone()))
            .collect()
    }

    /// Enter the pending state for a new submission
    pub(crate) fn begin_submission(&mut self) {
        self.last_error = None;
        self.pending = true;
        self.elapsed_tenths = 0;
    }

    /// Leave the pending state
    pub(crate) fn end_submission(&mut self) {
        self.pending = false;
    }

    /// Record a failed submission
    pub(crate) fn set_error(&mut self, error: String) {
        self.last_error = Some(error);
    }

    /// Advance the live counter by one tick
    pub(crate) fn tick(&mut self) -> u32 {
        self.elapsed_tenths = self.elapsed_tenths.saturating_add(1);
        self.elapsed_tenths
    }

    /// Append a user turn
    pub(crate) fn push_user(&mut self, content: String) -> TurnId {
        let turn = Turn::user(content);
        let id = turn.id.clone();
        self.turns.push(turn);
        id
    }

    /// Fold a fragment into the open bot turn, opening one if needed
    pub(crate) fn fold_fragment(&mut self, fragment: &str, variant: ModelVariant) -> Fold {
        if let Some(open_id) = self.open_turn.clone() {
            if let Some(turn) = self.turns.iter_mut().rev().find(|t| t.id == open_id) {
                turn.content.push_str(fragment);
                return Fold::Appended(open_id);
            }
        }

        let turn = Turn::bot(fragment.to_string(), variant);
        let id = turn.id.clone();
        self.turns.push(turn);
        self.open_turn = Some(id.clone());
        Fold::Opened(id)
    }

    /// Freeze the open bot turn, attaching timing on success
    pub(crate) fn close_open_turn(&mut self, elapsed_seconds: Option<f64>) -> Option<TurnId> {
        let open_id = self.open_turn.take()?;
        let turn = self.turns.iter_mut().rev().find(|t| t.id == open_id)?;
        turn.streaming = false;
        if elapsed_seconds.is_some() {
            turn.elapsed_seconds = elapsed_seconds;
        }
        Some(open_id)
    }
}

/// Get current timestamp in milliseconds
fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const GREETING: &str = "Welcome! How can I help?";

    #[test]
    fn test_conversation_creation() {
        let conversation = Conversation::new(Some(GREETING));
        assert_eq!(conversation.len(), 1);
        assert!(conversation.turns()[0].is_greeting());
        assert_eq!(conversation.turns()[0].role, Role::Bot);
        assert!(!conversation.pending());
        assert_eq!(conversation.last_error(), None);

        assert!(Conversation::new(None).is_empty());
        assert!(Conversation::new(Some("")).is_empty());
    }

    #[test]
    fn test_fold_opens_then_appends() {
        let mut conversation = Conversation::new(None);
        conversation.push_user("Hello".to_string());

        let first = conversation.fold_fragment("He", ModelVariant::Fast);
        let second = conversation.fold_fragment("llo", ModelVariant::Fast);

        assert!(matches!(first, Fold::Opened(_)));
        assert_eq!(second, Fold::Appended(first.turn_id().clone()));
        assert_eq!(conversation.len(), 2);

        let bot = conversation.get(first.turn_id()).unwrap();
        assert_eq!(bot.content, "Hello");
        assert!(bot.streaming);
        assert_eq!(bot.variant, Some(ModelVariant::Fast));
    }

    #[test]
    fn test_fold_split_equals_whole() {
        let mut split = Conversation::new(None);
        split.fold_fragment("He", ModelVariant::Fast);
        split.fold_fragment("llo", ModelVariant::Fast);

        let mut whole = Conversation::new(None);
        whole.fold_fragment("Hello", ModelVariant::Fast);

        assert_eq!(split.turns()[0].content, whole.turns()[0].content);
    }

    #[test]
    fn test_close_open_turn() {
        let mut conversation = Conversation::new(None);
        let fold = conversation.fold_fragment("Hi", ModelVariant::Reasoning);

        let closed = conversation.close_open_turn(Some(1.3));
        assert_eq!(closed.as_ref(), Some(fold.turn_id()));
        assert_eq!(conversation.open_turn(), None);

        let bot = conversation.get(fold.turn_id()).unwrap();
        assert!(!bot.streaming);
        assert_eq!(bot.elapsed_seconds, Some(1.3));
        assert_eq!(bot.processed_label().as_deref(), Some("Processed in 1.3s"));

        // Nothing open any more
        assert_eq!(conversation.close_open_turn(Some(2.0)), None);

        // The next fragment opens a fresh turn
        let next = conversation.fold_fragment("Again", ModelVariant::Fast);
        assert!(matches!(next, Fold::Opened(_)));
        assert_ne!(next.turn_id(), fold.turn_id());
    }

    #[test]
    fn test_close_without_timing_keeps_partial_content() {
        let mut conversation = Conversation::new(None);
        let fold = conversation.fold_fragment("Partial", ModelVariant::Fast);

        conversation.close_open_turn(None);

        let bot = conversation.get(fold.turn_id()).unwrap();
        assert_eq!(bot.content, "Partial");
        assert_eq!(bot.elapsed_seconds, None);
        assert_eq!(bot.processed_label(), None);
    }

    #[test]
    fn test_history_excludes_greeting_and_empty_turns() {
        let mut conversation = Conversation::new(Some(GREETING));
        conversation.push_user("First".to_string());
        conversation.fold_fragment("Answer", ModelVariant::Fast);
        conversation.close_open_turn(Some(0.4));
        conversation.push_user(String::new());

        let history = conversation.history();
        assert_eq!(
            history,
            vec![
                HistoryEntry::new(Role::User, "First"),
                HistoryEntry::new(Role::Bot, "Answer"),
            ]
        );
    }

    #[test]
    fn test_submission_flags() {
        let mut conversation = Conversation::new(None);
        conversation.set_error("old failure".to_string());
        conversation.tick();

        conversation.begin_submission();
        assert!(conversation.pending());
        assert_eq!(conversation.last_error(), None);
        assert_eq!(conversation.elapsed_tenths(), 0);

        conversation.push_user("Hi".to_string());
        assert!(conversation.is_thinking());

        conversation.tick();
        conversation.tick();
        assert!((conversation.elapsed_seconds() - 0.2).abs() < f64::EPSILON);

        conversation.fold_fragment("Hey", ModelVariant::Fast);
        assert!(!conversation.is_thinking());

        conversation.end_submission();
        assert!(!conversation.pending());
    }

    #[test]
    fn test_turn_labels() {
        let turn = Turn::user("Hi".to_string());
        assert_eq!(turn.time_label().len(), 5);
        assert_eq!(turn.processed_label(), None);
        assert!(turn.created_local().is_some());
    }
}
