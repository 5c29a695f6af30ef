//! Periodic retention sweeps for the in-memory stores

use crate::config::RetentionSection;
use crate::conversation::ConversationStore;
use crate::ledger::MessageLedger;
use crate::observability::metrics::metrics;
use crate::retention_span;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Outcome of a single sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub requests: usize,
    pub conversations: usize,
}

/// Evict finished requests and idle conversations according to `policy`
///
/// An age of 0 skips the corresponding store.
pub fn sweep_once(
    ledger: &MessageLedger,
    conversations: &ConversationStore,
    policy: &RetentionSection,
) -> SweepReport {
    let _span = retention_span!(
        request_ttl_secs = policy.request_ttl_secs,
        conversation_idle_secs = policy.conversation_idle_secs
    )
    .entered();

    let requests = if policy.request_ttl_secs > 0 {
        ledger.evict_terminal_older_than(Duration::from_secs(policy.request_ttl_secs))
    } else {
        0
    };
    let idle = if policy.conversation_idle_secs > 0 {
        conversations.evict_idle_older_than(Duration::from_secs(policy.conversation_idle_secs))
    } else {
        0
    };

    metrics().retention_swept(requests, idle);
    debug!(requests, conversations = idle, "Retention sweep finished");
    SweepReport {
        requests,
        conversations: idle,
    }
}

/// Spawn the sweeper; returns `None` when both ages are 0
pub fn spawn_retention_sweeper(
    ledger: Arc<MessageLedger>,
    conversations: Arc<ConversationStore>,
    policy: RetentionSection,
) -> Option<JoinHandle<()>> {
    if !policy.sweeps_enabled() {
        debug!("Retention sweeps disabled");
        return None;
    }

    let period = Duration::from_secs(policy.sweep_interval_secs.max(1));
    info!(
        interval_secs = period.as_secs(),
        request_ttl_secs = policy.request_ttl_secs,
        conversation_idle_secs = policy.conversation_idle_secs,
        "Starting retention sweeper"
    );

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // first tick completes immediately

        loop {
            interval.tick().await;
            sweep_once(&ledger, &conversations, &policy);
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Turn;
    use crate::protocol::MessageStatus;

    fn policy(request_ttl_secs: u64, conversation_idle_secs: u64) -> RetentionSection {
        RetentionSection {
            request_ttl_secs,
            conversation_idle_secs,
            ..RetentionSection::default()
        }
    }

    #[test]
    fn test_disabled_policy_spawns_nothing() {
        let handle = spawn_retention_sweeper(
            Arc::new(MessageLedger::new()),
            Arc::new(ConversationStore::default()),
            RetentionSection::default(),
        );
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_sweep_once_skips_zero_ages() {
        let ledger = MessageLedger::new();
        let request = ledger.create("hello", "conv-1");
        ledger
            .append_update(request.request_id, MessageStatus::Completed, None, None)
            .unwrap();
        let conversations = ConversationStore::default();
        drop(conversations.get_or_create("conv-1").await);

        let report = sweep_once(&ledger, &conversations, &policy(0, 0));

        assert_eq!(report, SweepReport::default());
        assert_eq!(ledger.len(), 1);
        assert_eq!(conversations.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_once_keeps_recent_entries() {
        let ledger = MessageLedger::new();
        let request = ledger.create("hello", "conv-1");
        ledger
            .append_update(request.request_id, MessageStatus::Completed, None, None)
            .unwrap();
        let conversations = ConversationStore::default();
        let mut guard = conversations.get_or_create("conv-1").await;
        conversations.update(&mut guard, Turn::new("hello", "hi", "Faq"));
        drop(guard);

        let report = sweep_once(&ledger, &conversations, &policy(3600, 3600));

        assert_eq!(report, SweepReport::default());
        assert!(ledger.contains(request.request_id));
        assert_eq!(conversations.len(), 1);
    }
}
