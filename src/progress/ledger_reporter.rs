use super::ProgressReceiver;
use crate::ledger::MessageLedger;
use crate::protocol::MessageStatus;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Forwards progress events for one request into the ledger
pub struct LedgerProgressReporter {
    ledger: Arc<MessageLedger>,
    request_id: Uuid,
}

impl LedgerProgressReporter {
    pub fn new(ledger: Arc<MessageLedger>, request_id: Uuid) -> Self {
        Self { ledger, request_id }
    }

    /// Drain `receiver` until every sender is dropped
    ///
    /// Returns the number of events recorded. Once the ledger rejects an
    /// append (the request was force-finalized) remaining events are
    /// discarded.
    pub async fn run(self, mut receiver: ProgressReceiver) -> usize {
        let mut recorded = 0;
        let mut accepting = true;

        while let Some(event) = receiver.recv().await {
            if !accepting {
                continue;
            }

            match self.ledger.append_update(
                self.request_id,
                MessageStatus::InProgress,
                Some(event.message),
                event.agent_name,
            ) {
                Ok(_) => recorded += 1,
                Err(e) => {
                    warn!(
                        request_id = %self.request_id,
                        error = %e,
                        "Dropping progress for finalized request"
                    );
                    accepting = false;
                }
            }
        }

        debug!(request_id = %self.request_id, recorded, "Progress channel drained");
        recorded
    }
}
