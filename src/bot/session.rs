//! Per-user conversation state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use teloxide::types::UserId;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::debug;

use crate::ai::Turn;

/// Where a user currently is. Every flow starts from `Idle` and any new
/// command replaces the current variant wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    #[default]
    Idle,
    /// Free chat; the whole history goes to the model on each turn.
    Gpt { history: Vec<Turn> },
    /// Persona keyboard shown, nothing picked yet.
    ChoosingPersona,
    Talk { persona: String, prompt: String, history: Vec<Turn> },
    Quiz(QuizState),
    Translate(TranslateState),
    Voice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizPhase {
    ChoosingTopic,
    /// A question is out and the next text is the answer.
    Asking { question: String },
    /// The answer was judged; waiting for more / change topic / end.
    Answered { question: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizState {
    pub topic: Option<String>,
    pub phase: QuizPhase,
    pub score: u32,
    pub answered: u32,
}

impl Default for QuizState {
    fn default() -> Self {
        Self::new()
    }
}

impl QuizState {
    pub fn new() -> Self {
        Self { topic: None, phase: QuizPhase::ChoosingTopic, score: 0, answered: 0 }
    }

    /// A fresh question on `topic` is out.
    pub fn ask(&mut self, topic: &str, question: String) {
        self.topic = Some(topic.to_string());
        self.phase = QuizPhase::Asking { question };
    }

    /// Record the verdict for the pending question. Returns false if no
    /// question was pending, in which case nothing changes.
    pub fn judge(&mut self, correct: bool) -> bool {
        let QuizPhase::Asking { question } = &self.phase else {
            return false;
        };
        self.phase = QuizPhase::Answered { question: question.clone() };
        self.answered += 1;
        if correct {
            self.score += 1;
        }
        true
    }

    /// Back to the topic keyboard. Score carries over; the old topic does not,
    /// so a leftover "next question" button has nothing to ask about.
    pub fn change_topic(&mut self) {
        self.topic = None;
        self.phase = QuizPhase::ChoosingTopic;
    }

    /// The question currently on screen, answered or not.
    pub fn last_question(&self) -> Option<&str> {
        match &self.phase {
            QuizPhase::Asking { question } | QuizPhase::Answered { question } => Some(question),
            QuizPhase::ChoosingTopic => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateState {
    ChoosingLanguage,
    Translating { language: String },
}

/// All sessions, one async lock per user.
///
/// Holding a user's lock for a whole event keeps that user's events in
/// order without blocking anyone else.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, Slot>>,
}

struct Slot {
    session: Arc<AsyncMutex<Session>>,
    touched: Instant,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The user's session slot, created `Idle` on first use.
    pub fn slot(&self, user: UserId) -> Arc<AsyncMutex<Session>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let slot = sessions.entry(user).or_insert_with(|| Slot {
            session: Arc::default(),
            touched: now,
        });
        slot.touched = now;
        slot.session.clone()
    }

    /// Drop slots no event is using that are back at `Idle` or have not been
    /// touched for `max_idle`. Returns how many were dropped.
    pub fn purge_idle(&self, max_idle: Duration) -> usize {
        self.purge_idle_at(Instant::now(), max_idle)
    }

    pub fn purge_idle_at(&self, now: Instant, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|user, slot| {
            // Held by an event in flight
            if Arc::strong_count(&slot.session) > 1 {
                return true;
            }
            let expired = now.saturating_duration_since(slot.touched) >= max_idle;
            let idle = slot.session.try_lock().is_ok_and(|session| *session == Session::Idle);
            if expired && !idle {
                debug!("Dropping stale session of {}", user.0);
            }
            !(expired || idle)
        });
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
