//! Processing Scheduler
//!
//! `submit` registers a request in the ledger and returns at once. Each
//! request then gets exactly one background unit made of two tasks:
//!
//! - a **worker** that marks the request `inprogress`, dispatches it through
//!   the [`Router`] and forwards progress events into the ledger;
//! - a **supervisor** that owns the worker's join handle, applies the
//!   optional deadline and writes the single terminal update, whatever the
//!   worker did (returned, failed, panicked or hung).
//!
//! A worker first takes its conversation, then a semaphore permit, so a
//! turn queued behind its own conversation never holds one of the bounded
//! slots. The deadline starts once both are held. `submit` never blocks on
//! either.

use crate::agent::ResponderOutput;
use crate::config::SemkerConfig;
use crate::error::{sanitize_error_message, SemkerError, SemkerResult};
use crate::ledger::MessageLedger;
use crate::observability::metrics::{metrics, Outcome};
use crate::progress::{progress_channel, LedgerProgressReporter};
use crate::protocol::{MessageStatus, Request, SubmitReceipt};
use crate::request_span;
use crate::routing::Router;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

pub const PROCESSING_STARTED_MESSAGE: &str = "Processing started.";

const DEFAULT_MAX_CONCURRENT: usize = 64;
const DEFAULT_MAX_MESSAGE_LENGTH: usize = 10_000;

pub struct ProcessingScheduler {
    ledger: Arc<MessageLedger>,
    router: Arc<Router>,
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
    units: Mutex<JoinSet<()>>,
    accepting: AtomicBool,
    max_message_length: usize,
}

impl ProcessingScheduler {
    pub fn new(ledger: Arc<MessageLedger>, router: Arc<Router>) -> Self {
        Self {
            ledger,
            router,
            permits: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT)),
            timeout: None,
            units: Mutex::new(JoinSet::new()),
            accepting: AtomicBool::new(true),
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }

    pub fn from_config(
        config: &SemkerConfig,
        ledger: Arc<MessageLedger>,
        router: Arc<Router>,
    ) -> Self {
        Self::new(ledger, router)
            .with_timeout(config.processing.timeout())
            .with_max_concurrent(config.processing.max_concurrent)
            .with_max_message_length(config.server.max_message_length)
    }

    /// Deadline per request; `None` lets units run until the responder returns
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
        self
    }

    pub fn with_max_message_length(mut self, max_message_length: usize) -> Self {
        self.max_message_length = max_message_length;
        self
    }

    pub fn ledger(&self) -> &Arc<MessageLedger> {
        &self.ledger
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Accept a request for background processing
    ///
    /// Validation failures create no ledger entry. Must be called from
    /// within a tokio runtime.
    pub fn submit(&self, content: &str, conversation_id: &str) -> SemkerResult<SubmitReceipt> {
        if let Err(e) = self.validate(content, conversation_id) {
            metrics().request_rejected();
            return Err(e);
        }

        // Checked under the lock so `shutdown` cannot miss a late unit.
        let mut units = self.units.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.accepting.load(Ordering::SeqCst) {
            metrics().request_rejected();
            return Err(SemkerError::validation("Server is shutting down"));
        }

        let request = self.ledger.create(content, conversation_id);
        metrics().request_received();

        let receipt = SubmitReceipt {
            request_id: request.request_id,
            status: MessageStatus::Received,
            received_at: request.received_at,
        };

        let span = request_span!(
            request_id = %request.request_id,
            conversation_id = %request.conversation_id
        );
        let unit = Unit {
            ledger: self.ledger.clone(),
            router: self.router.clone(),
            permits: self.permits.clone(),
            timeout: self.timeout,
        };

        while let Some(finished) = units.try_join_next() {
            if let Err(e) = finished {
                error!(error = %e, "Supervisor task ended abnormally");
            }
        }
        units.spawn(unit.supervise(request).instrument(span));
        drop(units);

        info!(
            request_id = %receipt.request_id,
            conversation_id = %conversation_id,
            "Request accepted"
        );
        Ok(receipt)
    }

    fn validate(&self, content: &str, conversation_id: &str) -> SemkerResult<()> {
        if conversation_id.trim().is_empty() {
            return Err(SemkerError::validation("Conversation ID is required"));
        }
        if content.trim().is_empty() {
            return Err(SemkerError::validation("Message content is required"));
        }
        let length = content.chars().count();
        if length > self.max_message_length {
            return Err(SemkerError::validation(format!(
                "Message content is {length} characters; the limit is {}",
                self.max_message_length
            )));
        }
        Ok(())
    }

    /// Number of units that have not finished yet
    pub fn in_flight(&self) -> usize {
        let mut units = self.units.lock().unwrap_or_else(PoisonError::into_inner);
        while units.try_join_next().is_some() {}
        units.len()
    }

    /// Stop accepting requests and wait for every unit to write its terminal update
    pub async fn shutdown(&self) {
        let mut units = {
            let mut guard = self.units.lock().unwrap_or_else(PoisonError::into_inner);
            self.accepting.store(false, Ordering::SeqCst);
            std::mem::take(&mut *guard)
        };

        info!(in_flight = units.len(), "Draining in-flight requests");
        while let Some(finished) = units.join_next().await {
            if let Err(e) = finished {
                error!(error = %e, "Supervisor task ended abnormally");
            }
        }
        info!("Processing scheduler drained");
    }
}

/// Terminal update decided by the supervisor
enum Terminal {
    Completed(ResponderOutput),
    Failed {
        message: String,
        agent_name: Option<String>,
        outcome: Outcome,
    },
}

/// Everything one background unit needs, detached from the scheduler handle
struct Unit {
    ledger: Arc<MessageLedger>,
    router: Arc<Router>,
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
}

impl Unit {
    async fn supervise(self, request: Request) {
        let request_id = request.request_id;

        let (admitted_tx, admitted_rx) = oneshot::channel();
        let mut worker = tokio::spawn(
            process(
                self.ledger.clone(),
                self.router,
                self.permits,
                request,
                admitted_tx,
            )
            .in_current_span(),
        );
        let abort = worker.abort_handle();

        // Queueing for the conversation or a permit does not count against the deadline.
        let finished_early = tokio::select! {
            joined = &mut worker => Some(joined),
            _ = admitted_rx => None,
        };
        let started = Instant::now();
        metrics().processing_started();

        let terminal = match (finished_early, self.timeout) {
            (Some(joined), _) => terminal_from_join(joined),
            (None, Some(limit)) => match tokio::time::timeout(limit, &mut worker).await {
                Ok(joined) => terminal_from_join(joined),
                Err(_) => {
                    abort.abort();
                    warn!(
                        request_id = %request_id,
                        timeout_secs = limit.as_secs(),
                        "Request timed out"
                    );
                    Terminal::Failed {
                        message: format!(
                            "Processing timed out after {} seconds.",
                            limit.as_secs()
                        ),
                        agent_name: None,
                        outcome: Outcome::TimedOut,
                    }
                }
            },
            (None, None) => terminal_from_join(worker.await),
        };

        let outcome = finalize(&self.ledger, request_id, terminal);
        metrics().processing_finished(outcome, started.elapsed());
    }
}

fn terminal_from_join(joined: Result<SemkerResult<ResponderOutput>, JoinError>) -> Terminal {
    match joined {
        Ok(Ok(output)) => Terminal::Completed(output),
        Ok(Err(e)) => {
            let agent_name = match &e {
                SemkerError::Responder { agent, .. } => Some(agent.clone()),
                _ => None,
            };
            Terminal::Failed {
                message: e.public_message(),
                agent_name,
                outcome: Outcome::Failed,
            }
        }
        Err(join_error) if join_error.is_panic() => {
            let detail = panic_detail(join_error.into_panic());
            Terminal::Failed {
                message: sanitize_error_message(&format!(
                    "Processing failed unexpectedly: {detail}"
                )),
                agent_name: None,
                outcome: Outcome::Panicked,
            }
        }
        Err(_) => Terminal::Failed {
            message: "Processing was cancelled.".to_string(),
            agent_name: None,
            outcome: Outcome::Failed,
        },
    }
}

fn panic_detail(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

fn finalize(ledger: &MessageLedger, request_id: Uuid, terminal: Terminal) -> Outcome {
    let (status, result, agent_name, outcome) = match terminal {
        Terminal::Completed(output) => {
            metrics().agent_answered(&output.agent_name);
            (
                MessageStatus::Completed,
                output.result,
                Some(output.agent_name),
                Outcome::Completed,
            )
        }
        Terminal::Failed {
            message,
            agent_name,
            outcome,
        } => (MessageStatus::Failed, message, agent_name, outcome),
    };

    match ledger.append_update(request_id, status, Some(result), agent_name) {
        Ok(update) => info!(
            request_id = %request_id,
            status = %update.status,
            agent_name = update.agent_name.as_deref().unwrap_or("-"),
            "Request finalized"
        ),
        Err(e) => error!(
            request_id = %request_id,
            error = %e,
            "Could not record terminal update"
        ),
    }
    outcome
}

/// Worker body: everything up to, but excluding, the terminal update
async fn process(
    ledger: Arc<MessageLedger>,
    router: Arc<Router>,
    permits: Arc<Semaphore>,
    request: Request,
    admitted: oneshot::Sender<()>,
) -> SemkerResult<ResponderOutput> {
    let request_id = request.request_id;
    let conversation = router.acquire(&request.conversation_id).await;
    // The semaphore is never closed; a missing permit only lifts the bound.
    let _permit = permits.acquire_owned().await.ok();
    let _ = admitted.send(());

    ledger.append_update(
        request_id,
        MessageStatus::InProgress,
        Some(PROCESSING_STARTED_MESSAGE.to_string()),
        None,
    )?;

    let (sender, receiver) = progress_channel();
    let reporter = LedgerProgressReporter::new(ledger, request_id);

    let dispatch = async move {
        let result = router.dispatch_in(conversation, &request, &sender).await;
        drop(sender);
        result
    };
    let (result, recorded) = tokio::join!(dispatch, reporter.run(receiver));

    metrics().progress_recorded(recorded);
    debug!(request_id = %request_id, progress_updates = recorded, "Dispatch finished");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Domain, Responder, ResponderRegistry};
    use crate::config::RoutingStrategy;
    use crate::conversation::ConversationStore;
    use crate::protocol::Update;
    use crate::testing::mocks::ScriptedResponder;

    fn scheduler_with(responder: ScriptedResponder) -> ProcessingScheduler {
        let mut registry = ResponderRegistry::new();
        registry.register(Domain::Faq, Arc::new(responder) as Arc<dyn Responder>);
        let router = Router::new(
            Arc::new(registry),
            Arc::new(ConversationStore::default()),
            RoutingStrategy::Rules,
        );
        ProcessingScheduler::new(Arc::new(MessageLedger::new()), Arc::new(router))
    }

    async fn wait_terminal(scheduler: &ProcessingScheduler, id: Uuid) -> Vec<Update> {
        for _ in 0..200 {
            let updates = scheduler.ledger().get_updates(id).unwrap();
            if updates.last().is_some_and(|u| u.status.is_terminal()) {
                return updates;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("request {id} never reached a terminal status");
    }

    #[tokio::test]
    async fn test_submit_returns_received_receipt() {
        let scheduler = scheduler_with(
            ScriptedResponder::replying("Faq", "hi").with_delay(Duration::from_millis(50)),
        );

        let receipt = scheduler.submit("hello", "conv-1").unwrap();

        assert_eq!(receipt.status, MessageStatus::Received);
        let first = &scheduler.ledger().get_updates(receipt.request_id).unwrap()[0];
        assert_eq!(first.status, MessageStatus::Received);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_completed_sequence() {
        let scheduler = scheduler_with(
            ScriptedResponder::replying("Faq", "hi").with_progress(&["Faq Agent response received."]),
        );

        let receipt = scheduler.submit("hello", "conv-1").unwrap();
        let updates = wait_terminal(&scheduler, receipt.request_id).await;

        let statuses: Vec<_> = updates.iter().map(|u| u.status).collect();
        assert_eq!(
            statuses,
            vec![
                MessageStatus::Received,
                MessageStatus::InProgress,
                MessageStatus::InProgress,
                MessageStatus::Completed,
            ]
        );
        assert_eq!(updates[1].result.as_deref(), Some(PROCESSING_STARTED_MESSAGE));
        assert_eq!(updates[1].agent_name, None);
        assert_eq!(updates[3].agent_name.as_deref(), Some("Faq"));
    }

    #[tokio::test]
    async fn test_validation_rejects_without_ledger_entry() {
        let scheduler = scheduler_with(ScriptedResponder::replying("Faq", "hi"));

        for (content, conversation) in [("hello", ""), ("hello", "   "), ("", "conv-1")] {
            let result = scheduler.submit(content, conversation);
            assert!(matches!(result, Err(SemkerError::Validation { .. })));
        }
        assert!(scheduler.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_content_is_rejected() {
        let scheduler =
            scheduler_with(ScriptedResponder::replying("Faq", "hi")).with_max_message_length(5);

        let result = scheduler.submit("too long", "conv-1");
        assert!(matches!(result, Err(SemkerError::Validation { .. })));
        assert!(scheduler.submit("short", "conv-1").is_ok());
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_responder_failure_is_attributed() {
        let scheduler = scheduler_with(ScriptedResponder::failing("Faq", "model unavailable"));

        let receipt = scheduler.submit("hello", "conv-1").unwrap();
        let updates = wait_terminal(&scheduler, receipt.request_id).await;
        let last = updates.last().unwrap();

        assert_eq!(last.status, MessageStatus::Failed);
        assert_eq!(last.agent_name.as_deref(), Some("Faq"));
        assert!(last.result.as_deref().unwrap().contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let scheduler = scheduler_with(ScriptedResponder::replying("Faq", "hi"));
        scheduler.shutdown().await;

        assert!(matches!(
            scheduler.submit("hello", "conv-1"),
            Err(SemkerError::Validation { .. })
        ));
    }

    #[test]
    fn test_panic_detail_extracts_message() {
        assert_eq!(panic_detail(Box::new("boom")), "boom");
        assert_eq!(panic_detail(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_detail(Box::new(42_u8)), "worker panicked");
    }
}
