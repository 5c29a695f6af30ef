//! Message Ledger
//!
//! The authoritative in-memory record of every request and the ordered
//! updates produced while processing it.
//!
//! The index is guarded by an `RwLock` and every request owns its own
//! `Mutex`, so appends to different requests proceed in parallel while
//! appends to the same request are serialized. No lock is ever held across
//! an `.await`.

use crate::error::{SemkerError, SemkerResult};
use crate::protocol::{
    MessageStatus, Request, RequestList, RequestSummary, StatusView, Update, RECEIVED_MESSAGE,
};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A request plus its append-only update history
#[derive(Debug)]
struct LedgerEntry {
    request: Request,
    updates: Vec<Update>,
}

impl LedgerEntry {
    fn current_status(&self) -> MessageStatus {
        self.updates
            .last()
            .map(|u| u.status)
            .unwrap_or(MessageStatus::Received)
    }

    fn last_timestamp(&self) -> chrono::DateTime<Utc> {
        self.updates
            .last()
            .map(|u| u.processed_at)
            .unwrap_or(self.request.received_at)
    }

    fn summary(&self) -> RequestSummary {
        RequestSummary {
            request_id: self.request.request_id,
            status: self.current_status(),
            conversation_id: self.request.conversation_id.clone(),
            timestamp: self.request.received_at,
        }
    }
}

#[derive(Debug, Default)]
struct LedgerIndex {
    entries: HashMap<Uuid, Arc<Mutex<LedgerEntry>>>,
    order: Vec<Uuid>,
}

/// Thread-safe request ledger shared by the scheduler and the HTTP surface
#[derive(Debug, Default)]
pub struct MessageLedger {
    index: RwLock<LedgerIndex>,
}

impl MessageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request and record its initial `received` update
    ///
    /// Input validation is the caller's job; this never fails.
    pub fn create(&self, content: &str, conversation_id: &str) -> Request {
        let request = Request::new(content, conversation_id);
        let mut received = Update::new(request.request_id, MessageStatus::Received)
            .with_result(RECEIVED_MESSAGE);
        received.processed_at = request.received_at;

        let entry = LedgerEntry {
            request: request.clone(),
            updates: vec![received],
        };

        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        index
            .entries
            .insert(request.request_id, Arc::new(Mutex::new(entry)));
        index.order.push(request.request_id);
        drop(index);

        debug!(
            request_id = %request.request_id,
            conversation_id = %request.conversation_id,
            "Request registered in ledger"
        );

        request
    }

    fn entry(&self, request_id: Uuid) -> SemkerResult<Arc<Mutex<LedgerEntry>>> {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        index
            .entries
            .get(&request_id)
            .cloned()
            .ok_or_else(|| SemkerError::not_found(request_id))
    }

    /// Append an update, changing the request's current status atomically
    ///
    /// Fails with `NotFound` for unknown ids and `InvalidTransition` when the
    /// request is already terminal.
    pub fn append_update(
        &self,
        request_id: Uuid,
        status: MessageStatus,
        result: Option<String>,
        agent_name: Option<String>,
    ) -> SemkerResult<Update> {
        let entry = self.entry(request_id)?;
        let mut entry = entry.lock().unwrap_or_else(PoisonError::into_inner);

        let current = entry.current_status();
        if !current.can_transition_to(status) {
            warn!(
                request_id = %request_id,
                from = %current,
                to = %status,
                "Rejected illegal status transition"
            );
            return Err(SemkerError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        let mut update = Update::new(request_id, status);
        update.result = result;
        update.agent_name = agent_name;

        // Wall clocks can step backwards; keep the sequence non-decreasing.
        let floor = entry.last_timestamp();
        if update.processed_at < floor {
            update.processed_at = floor;
        }

        entry.updates.push(update.clone());

        debug!(
            request_id = %request_id,
            status = %status,
            agent_name = ?update.agent_name,
            sequence = entry.updates.len(),
            "Ledger update appended"
        );

        Ok(update)
    }

    /// All updates for a request in creation order
    pub fn get_updates(&self, request_id: Uuid) -> SemkerResult<Vec<Update>> {
        let entry = self.entry(request_id)?;
        let entry = entry.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entry.updates.clone())
    }

    /// Current status, content and submission time of a request
    pub fn get_status(&self, request_id: Uuid) -> SemkerResult<StatusView> {
        let entry = self.entry(request_id)?;
        let entry = entry.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(StatusView {
            request_id,
            status: entry.current_status(),
            content: entry.request.content.clone(),
            conversation_id: entry.request.conversation_id.clone(),
            timestamp: entry.request.received_at,
        })
    }

    /// Snapshot of every known request in insertion order
    pub fn list_all(&self) -> RequestList {
        self.list_page(0, usize::MAX)
    }

    /// Page through the insertion-ordered snapshot
    ///
    /// `total_count` always reports every retained request.
    pub fn list_page(&self, offset: usize, limit: usize) -> RequestList {
        let (total_count, page): (usize, Vec<Arc<Mutex<LedgerEntry>>>) = {
            let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
            let page = index
                .order
                .iter()
                .skip(offset)
                .take(limit)
                .filter_map(|id| index.entries.get(id).cloned())
                .collect();
            (index.order.len(), page)
        };

        let summaries = page
            .iter()
            .map(|entry| {
                entry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .summary()
            })
            .collect();

        RequestList {
            total_count,
            summaries,
        }
    }

    /// Whether the ledger knows this request
    pub fn contains(&self, request_id: Uuid) -> bool {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .contains_key(&request_id)
    }

    pub fn len(&self) -> usize {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove terminal requests whose final update is older than `age`
    ///
    /// Requests that have not reached a terminal status are never evicted.
    pub fn evict_terminal_older_than(&self, age: Duration) -> usize {
        let Ok(age) = chrono::Duration::from_std(age) else {
            return 0;
        };
        let cutoff = Utc::now() - age;

        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        let expired: HashSet<Uuid> = index
            .entries
            .iter()
            .filter(|(_, entry)| {
                let entry = entry.lock().unwrap_or_else(PoisonError::into_inner);
                entry.current_status().is_terminal() && entry.last_timestamp() < cutoff
            })
            .map(|(id, _)| *id)
            .collect();

        if expired.is_empty() {
            return 0;
        }

        for id in &expired {
            index.entries.remove(id);
        }
        index.order.retain(|id| !expired.contains(id));

        info!(evicted = expired.len(), "Evicted finished requests from ledger");
        expired.len()
    }
}
