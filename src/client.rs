//! Wires the ledger, the connectivity monitor, the outbox and the reconciler together.

use crate::api::{self, Ledger, Mode};
use crate::connectivity::{self, ConnectivityMonitor};
use crate::error::ErrorKind;
use crate::model::{
    merge_entries, LedgerEntry, ListFilters, NewTransaction, Pagination, Transaction,
    TransactionPatch,
};
use crate::outbox::Outbox;
use crate::reconcile::{DrainReport, Reconciler};
use crate::submit::{SubmitError, Submission, Submitter};
use crate::{Config, Result};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// The transaction list as the user sees it: pending entries merged with one ledger page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryList {
    pub entries: Vec<LedgerEntry>,
    pub pagination: Pagination,
    pub pending: usize,
    /// False when the ledger could not be reached and only pending entries are listed.
    pub online: bool,
}

/// One app session. Cheap to share behind an `Arc`.
pub struct Client {
    config: Config,
    ledger: Arc<dyn Ledger>,
    monitor: Arc<ConnectivityMonitor>,
    outbox: Outbox,
    submitter: Submitter,
    reconciler: Arc<Reconciler>,
}

impl Client {
    /// Builds a session for `config`. The monitor starts out assuming the ledger is reachable;
    /// the first failed request or probe corrects that.
    pub async fn new(config: Config, mode: Mode) -> Result<Self> {
        let ledger = api::ledger(&config, mode).await?;
        let probe = connectivity::probe(&config, mode)?;
        let monitor = Arc::new(ConnectivityMonitor::new(true, probe));
        Ok(Self::from_parts(config, ledger, monitor))
    }

    pub fn from_parts(
        config: Config,
        ledger: Arc<dyn Ledger>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        let outbox = config.outbox();
        let submitter = Submitter::new(ledger.clone(), outbox.clone(), monitor.clone());
        let reconciler = Arc::new(Reconciler::new(
            outbox.clone(),
            ledger.clone(),
            monitor.clone(),
            config.page_size(),
            config.min_sync_interval(),
        ));
        Self {
            config,
            ledger,
            monitor,
            outbox,
            submitter,
            reconciler,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub async fn submit(
        &self,
        payload: NewTransaction,
    ) -> std::result::Result<Submission, SubmitError> {
        self.submitter.submit(payload).await
    }

    pub async fn sync(&self) -> Result<DrainReport> {
        self.reconciler.sync_now().await
    }

    /// Lists pending entries followed by one page of the ledger. When the ledger is unreachable
    /// the pending entries are still listed.
    pub async fn list(&self, filters: &ListFilters) -> Result<EntryList> {
        let pending = self.outbox.all().await?;
        let (page, online) = match self.ledger.list(filters).await {
            Ok(page) => (page, true),
            Err(e) if e.is_retryable() => {
                warn!("Unable to load transactions from the ledger: {e}");
                if e.kind() == ErrorKind::Network {
                    self.monitor.probe().await;
                }
                (Default::default(), false)
            }
            Err(e) => return Err(e).context("Unable to load transactions"),
        };
        Ok(EntryList {
            entries: merge_entries(&pending, &page.transactions, filters),
            pagination: page.pagination,
            pending: pending.len(),
            online,
        })
    }

    /// Edits a confirmed transaction. Pending entries cannot be edited: they have no ledger id.
    pub async fn update(&self, id: &str, patch: &TransactionPatch) -> Result<Transaction> {
        reject_temp_id(id)?;
        patch.validate()?;
        self.ledger
            .update(id, patch)
            .await
            .with_context(|| format!("Unable to update transaction {id}"))
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        reject_temp_id(id)?;
        self.ledger
            .delete(id)
            .await
            .with_context(|| format!("Unable to delete transaction {id}"))
    }
}

fn reject_temp_id(id: &str) -> Result<()> {
    anyhow::ensure!(
        !id.starts_with(crate::utils::TEMP_ID_PREFIX),
        "{id} is waiting to be synced and cannot be changed yet"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TestLedger;
    use crate::connectivity::StaticProbe;
    use crate::model::Amount;
    use crate::test::{payload, TestEnv};
    use std::str::FromStr;

    /// The probe always answers reachable; `online` is only the starting state.
    async fn client(env: &TestEnv, ledger: Arc<TestLedger>, online: bool) -> Client {
        let probe = Arc::new(StaticProbe::new(true));
        let monitor = Arc::new(ConnectivityMonitor::new(online, probe));
        Client::from_parts(env.config(), ledger, monitor)
    }

    #[tokio::test]
    async fn test_list_merges_pending_first() {
        let env = TestEnv::new().await;
        let ledger = Arc::new(TestLedger::default());
        let client = client(&env, ledger, false).await;
        client.submit(payload("Offline lunch")).await.unwrap();

        let list = client.list(&ListFilters::default()).await.unwrap();
        assert_eq!(list.pending, 1);
        assert!(list.online);
        assert_eq!(list.entries.len(), 6);
        assert!(list.entries[0].is_pending());
        assert_eq!(list.entries[0].description(), "Offline lunch");
    }

    #[tokio::test]
    async fn test_list_while_unreachable_shows_pending() {
        let env = TestEnv::new().await;
        let ledger = Arc::new(TestLedger::default());
        ledger.set_reachable(false);
        let client = client(&env, ledger, true).await;
        env.outbox().enqueue(payload("Queued")).await.unwrap();

        let list = client.list(&ListFilters::default()).await.unwrap();
        assert!(!list.online);
        assert_eq!(list.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_offline_then_sync() {
        let env = TestEnv::new().await;
        let ledger = Arc::new(TestLedger::empty());
        let client = client(&env, ledger.clone(), false).await;
        client.submit(payload("A")).await.unwrap();
        client.submit(payload("B")).await.unwrap();
        assert!(ledger.transactions().is_empty());

        let report = client.sync().await.unwrap();
        assert_eq!(report.confirmed().len(), 2);
        assert!(client.outbox().is_empty().await.unwrap());
        assert!(client.monitor().is_online());
        assert!(!client.monitor().was_offline());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let env = TestEnv::new().await;
        let ledger = Arc::new(TestLedger::default());
        let client = client(&env, ledger.clone(), true).await;

        let patch = TransactionPatch {
            amount: Some(Amount::from_str("$1,300").unwrap()),
            ..Default::default()
        };
        let updated = client.update("1", &patch).await.unwrap();
        assert_eq!(updated.amount, Amount::from_str("1300").unwrap());

        client.delete("3").await.unwrap();
        assert_eq!(ledger.transactions().len(), 4);

        assert!(client.delete("offline-abc").await.is_err());
        assert!(client
            .update("1", &TransactionPatch::default())
            .await
            .is_err());
    }
}
