//! The path a new transaction takes from the user to the ledger, or to the outbox.

use crate::api::Ledger;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{ErrorKind, LedgerError};
use crate::model::{NewTransaction, PendingTransaction, Transaction};
use crate::outbox::Outbox;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Where a submitted transaction ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "transaction", rename_all = "snake_case")]
pub enum Submission {
    /// The ledger accepted it.
    Confirmed(Transaction),
    /// It is in the outbox and will be sent once the ledger is reachable.
    SavedOffline(PendingTransaction),
}

impl Submission {
    pub fn message(&self) -> String {
        match self {
            Submission::Confirmed(t) => format!("Transaction added as {}", t.id),
            Submission::SavedOffline(p) => format!(
                "Transaction saved offline as {}, will sync later",
                p.temp_id
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The ledger (or local validation) refused the transaction. It was not saved anywhere.
    #[error("transaction not saved: {0}")]
    Rejected(#[source] LedgerError),
    /// The ledger was unreachable and the outbox could not be written either.
    #[error("unable to save the transaction offline: {0:#}")]
    Storage(anyhow::Error),
}

impl SubmitError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SubmitError::Rejected(e) => Some(e.kind()),
            SubmitError::Storage(_) => None,
        }
    }
}

pub struct Submitter {
    ledger: Arc<dyn Ledger>,
    outbox: Outbox,
    monitor: Arc<ConnectivityMonitor>,
}

impl Submitter {
    pub fn new(ledger: Arc<dyn Ledger>, outbox: Outbox, monitor: Arc<ConnectivityMonitor>) -> Self {
        Self {
            ledger,
            outbox,
            monitor,
        }
    }

    /// Sends `payload` to the ledger, or saves it to the outbox when the ledger is unreachable
    /// or failing. Payloads that fail validation are never saved.
    ///
    /// The outbox entry's temporary id is used as the idempotency key of the first attempt, so a
    /// create whose response was lost is recognized when the entry is retried.
    pub async fn submit(&self, payload: NewTransaction) -> Result<Submission, SubmitError> {
        let payload = payload.normalized();
        payload.validate().map_err(SubmitError::Rejected)?;
        let pending = PendingTransaction::new(payload);

        if !self.monitor.is_online() {
            return self.save_offline(pending).await;
        }

        match self
            .ledger
            .create(&pending.payload, Some(&pending.temp_id))
            .await
        {
            Ok(transaction) => {
                info!("Created transaction {}", transaction.id);
                Ok(Submission::Confirmed(transaction))
            }
            Err(e) if e.is_retryable() => {
                warn!("Unable to reach the ledger: {e}");
                if e.kind() == ErrorKind::Network {
                    self.monitor.probe().await;
                }
                self.save_offline(pending).await
            }
            Err(e) => Err(SubmitError::Rejected(e)),
        }
    }

    async fn save_offline(&self, pending: PendingTransaction) -> Result<Submission, SubmitError> {
        self.outbox
            .push(&pending)
            .await
            .map_err(SubmitError::Storage)?;
        Ok(Submission::SavedOffline(pending))
    }
}
