//! Conversation Context Store
//!
//! Keeps the ordered turn history of every conversation so responders have
//! continuity across requests. Each conversation sits behind its own async
//! mutex: two turns of the same conversation run one after the other, while
//! different conversations never wait on each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

/// One completed exchange in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub user: String,
    pub assistant: String,
    pub agent_name: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn new(
        user: impl Into<String>,
        assistant: impl Into<String>,
        agent_name: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
            agent_name: agent_name.into(),
            at: Utc::now(),
        }
    }
}

/// History of one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_id: String,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            turns: Vec::new(),
            created_at: now,
            last_active: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Agent that answered the most recent turn
    pub fn last_agent(&self) -> Option<&str> {
        self.turns.last().map(|t| t.agent_name.as_str())
    }
}

/// Exclusive access to one conversation, held for the duration of a turn
pub struct ConversationGuard {
    inner: OwnedMutexGuard<ConversationContext>,
}

impl Deref for ConversationGuard {
    type Target = ConversationContext;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Concurrency-safe map from conversation id to context
pub struct ConversationStore {
    contexts: Mutex<HashMap<String, Arc<AsyncMutex<ConversationContext>>>>,
    max_turns: usize,
}

impl ConversationStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
            max_turns: max_turns.max(1),
        }
    }

    /// Acquire the conversation, creating an empty one when unknown
    ///
    /// Waits while another turn of the same conversation holds its guard.
    pub async fn get_or_create(&self, conversation_id: &str) -> ConversationGuard {
        let slot = {
            let mut contexts = self.contexts.lock().unwrap_or_else(PoisonError::into_inner);
            contexts
                .entry(conversation_id.to_string())
                .or_insert_with(|| {
                    debug!(conversation_id, "Creating conversation context");
                    Arc::new(AsyncMutex::new(ConversationContext::new(conversation_id)))
                })
                .clone()
        };

        ConversationGuard {
            inner: slot.lock_owned().await,
        }
    }

    /// Append a completed turn, trimming the oldest turns beyond `max_turns`
    pub fn update(&self, guard: &mut ConversationGuard, turn: Turn) {
        let context = &mut *guard.inner;
        context.last_active = turn.at;
        context.turns.push(turn);

        let excess = context.turns.len().saturating_sub(self.max_turns);
        if excess > 0 {
            context.turns.drain(..excess);
        }

        debug!(
            conversation_id = %context.conversation_id,
            turns = context.turns.len(),
            "Conversation updated"
        );
    }

    /// Copy of a conversation's current state
    pub async fn snapshot(&self, conversation_id: &str) -> Option<ConversationContext> {
        let slot = self
            .contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation_id)
            .cloned()?;
        let context = slot.lock().await;
        Some(context.clone())
    }

    /// Drop conversations idle for longer than `age`
    ///
    /// A conversation whose guard is held or awaited is kept.
    pub fn evict_idle_older_than(&self, age: Duration) -> usize {
        let Ok(age) = chrono::Duration::from_std(age) else {
            return 0;
        };
        let cutoff = Utc::now() - age;

        let mut contexts = self.contexts.lock().unwrap_or_else(PoisonError::into_inner);
        let before = contexts.len();
        contexts.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(context) => context.last_active >= cutoff,
                Err(_) => true,
            }
        });
        let evicted = before - contexts.len();

        if evicted > 0 {
            info!(evicted, "Evicted idle conversations");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(50)
    }
}
