//! Drains the outbox into the ledger.
//!
//! A drain pass takes a snapshot of the outbox, replays each entry as a create in FIFO order, and
//! then swaps the entries that still fail back into the outbox in one transaction. Only one pass
//! runs at a time per home, even across processes; a trigger that arrives while a pass is in
//! flight is coalesced into it. Entries that are enqueued while a pass is in flight are left for
//! the next pass.

use crate::api::Ledger;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{ErrorKind, LedgerError};
use crate::model::{ListFilters, PendingTransaction, Transaction, TransactionPage};
use crate::outbox::{DrainLease, Outbox};
use crate::Result;
use anyhow::bail;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// An entry that the ledger accepted during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmed {
    pub temp_id: String,
    pub transaction: Transaction,
}

/// An entry that is still in the outbox after a pass, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failed {
    pub temp_id: String,
    pub description: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl Failed {
    fn new(entry: &PendingTransaction, error: &LedgerError) -> Self {
        Self {
            temp_id: entry.temp_id.clone(),
            description: entry.payload.description.clone(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// What a drain request did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DrainReport {
    /// Another pass was already in flight. It will handle the entries.
    Coalesced,
    /// A connectivity-triggered pass ran too recently.
    Throttled { retry_in_ms: u64 },
    /// The ledger could not be reached, nothing was attempted.
    Offline,
    /// The outbox was empty. No request was made.
    Empty,
    /// Every entry was confirmed. `refreshed` is the first page of the ledger after the pass, if
    /// the re-fetch succeeded.
    Complete {
        confirmed: Vec<Confirmed>,
        refreshed: Option<TransactionPage>,
    },
    /// Some entries failed and remain in the outbox.
    Partial {
        confirmed: Vec<Confirmed>,
        failed: Vec<Failed>,
    },
}

impl DrainReport {
    pub fn confirmed(&self) -> &[Confirmed] {
        match self {
            DrainReport::Complete { confirmed, .. } | DrainReport::Partial { confirmed, .. } => {
                confirmed
            }
            _ => &[],
        }
    }

    pub fn failed(&self) -> &[Failed] {
        match self {
            DrainReport::Partial { failed, .. } => failed,
            _ => &[],
        }
    }

    /// A one-line summary for the user.
    pub fn message(&self) -> String {
        match self {
            DrainReport::Coalesced => "A sync is already in progress".to_string(),
            DrainReport::Throttled { retry_in_ms } => {
                format!("Synced recently, next sync in {}s", retry_in_ms.div_ceil(1000))
            }
            DrainReport::Offline => "Offline, pending transactions will sync later".to_string(),
            DrainReport::Empty => "Nothing to sync".to_string(),
            DrainReport::Complete { confirmed, .. } => {
                format!("Synced {} transaction(s)", confirmed.len())
            }
            DrainReport::Partial { confirmed, failed } => format!(
                "Synced {} transaction(s), failed to sync {}",
                confirmed.len(),
                failed.len()
            ),
        }
    }
}

/// Releases the in-flight flag when a pass ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Reconciler {
    outbox: Outbox,
    ledger: Arc<dyn Ledger>,
    monitor: Arc<ConnectivityMonitor>,
    refresh: ListFilters,
    min_interval: Duration,
    in_flight: AtomicBool,
    last_pass: Mutex<Option<Instant>>,
}

impl Reconciler {
    pub fn new(
        outbox: Outbox,
        ledger: Arc<dyn Ledger>,
        monitor: Arc<ConnectivityMonitor>,
        page_size: u32,
        min_interval: Duration,
    ) -> Self {
        Self {
            outbox,
            ledger,
            monitor,
            refresh: ListFilters::first_page(page_size),
            min_interval,
            in_flight: AtomicBool::new(false),
            last_pass: Mutex::new(None),
        }
    }

    pub fn is_draining(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Runs one drain pass. With an empty outbox this is a no-op: no request is made and the
    /// connectivity state is not touched.
    ///
    /// A pass holds the outbox's drain lease from the snapshot to the final swap. While another
    /// pass holds it, in this process or another one on the same home, the request is coalesced.
    pub async fn drain(&self) -> Result<DrainReport> {
        let Some(_in_flight) = InFlight::acquire(&self.in_flight) else {
            debug!("Drain already in flight, coalescing");
            return Ok(DrainReport::Coalesced);
        };
        let Some(lease) = self.outbox.try_lease().await? else {
            debug!("Another session is draining the outbox, coalescing");
            return Ok(DrainReport::Coalesced);
        };

        let report = self.drain_leased(&lease).await;
        if let Err(e) = lease.release().await {
            warn!("{e:#}");
        }
        report
    }

    async fn drain_leased(&self, lease: &DrainLease) -> Result<DrainReport> {
        let snapshot = self.outbox.all().await?;
        if snapshot.is_empty() {
            return Ok(DrainReport::Empty);
        }
        *self.last_pass.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        info!("Syncing {} pending transaction(s)", snapshot.len());

        let mut confirmed = Vec::new();
        let mut failed = Vec::new();
        let mut remaining = Vec::new();
        let mut attempted = 0;
        for entry in &snapshot {
            let held = lease.renew().await.unwrap_or_else(|e| {
                warn!("{e:#}");
                false
            });
            if !held {
                break;
            }
            attempted += 1;
            match self.ledger.create(&entry.payload, Some(&entry.temp_id)).await {
                Ok(transaction) => {
                    debug!("{} confirmed as {}", entry.temp_id, transaction.id);
                    confirmed.push(Confirmed {
                        temp_id: entry.temp_id.clone(),
                        transaction,
                    });
                }
                Err(e) => {
                    warn!("Failed to sync '{}' ({}): {e}", entry.payload.description, entry.temp_id);
                    failed.push(Failed::new(entry, &e));
                    remaining.push(entry.clone());
                }
            }
        }

        // Entries that were never attempted stay queued as they are
        self.outbox
            .replace_with(&snapshot[..attempted], &remaining)
            .await?;
        if attempted < snapshot.len() {
            bail!(
                "Lost the drain lease after {attempted} of {} transaction(s), the rest stay \
                pending",
                snapshot.len()
            );
        }

        if !failed.is_empty() {
            warn!("Failed to sync {} transaction(s)", failed.len());
            return Ok(DrainReport::Partial { confirmed, failed });
        }

        self.monitor.acknowledge_recovered();
        let refreshed = match self.ledger.list(&self.refresh).await {
            Ok(page) => Some(page),
            Err(e) => {
                warn!("Synced, but unable to refresh the transaction list: {e}");
                None
            }
        };
        info!("Synced {} transaction(s)", confirmed.len());
        Ok(DrainReport::Complete {
            confirmed,
            refreshed,
        })
    }

    /// A user asked to sync now. Checks reachability first, then drains regardless of how
    /// recently the last pass ran.
    pub async fn sync_now(&self) -> Result<DrainReport> {
        if self.is_draining() {
            return Ok(DrainReport::Coalesced);
        }
        if !self.monitor.probe().await {
            return Ok(DrainReport::Offline);
        }
        let report = self.drain().await?;
        if report == DrainReport::Empty {
            self.monitor.acknowledge_recovered();
        }
        Ok(report)
    }

    /// Connectivity came back. Drains unless a pass is in flight or ran within the minimum
    /// interval. With nothing to drain, the recovery is acknowledged right away.
    pub async fn on_recovered(&self) -> Result<DrainReport> {
        if self.is_draining() {
            debug!("Recovery while a drain is in flight, coalescing");
            return Ok(DrainReport::Coalesced);
        }
        if let Some(wait) = self.throttle_remaining() {
            debug!("Recovery within the minimum sync interval, waiting {wait:?}");
            return Ok(DrainReport::Throttled {
                retry_in_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            });
        }
        if !self.monitor.probe().await {
            return Ok(DrainReport::Offline);
        }
        let report = self.drain().await?;
        if report == DrainReport::Empty {
            self.monitor.acknowledge_recovered();
        }
        Ok(report)
    }

    fn throttle_remaining(&self) -> Option<Duration> {
        let last = (*self.last_pass.lock().unwrap_or_else(PoisonError::into_inner))?;
        self.min_interval
            .checked_sub(last.elapsed())
            .filter(|d| !d.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TestLedger;
    use crate::connectivity::StaticProbe;
    use crate::test::{payload, TestEnv};
    use crate::Config;

    struct Harness {
        env: TestEnv,
        ledger: Arc<TestLedger>,
        probe: Arc<StaticProbe>,
        monitor: Arc<ConnectivityMonitor>,
        reconciler: Arc<Reconciler>,
    }

    async fn harness(ledger: TestLedger, min_interval: Duration) -> Harness {
        let env = TestEnv::new().await;
        let ledger = Arc::new(ledger);
        let probe = Arc::new(StaticProbe::new(true));
        let monitor = Arc::new(ConnectivityMonitor::new(true, probe.clone()));
        let reconciler = Arc::new(Reconciler::new(
            env.outbox(),
            ledger.clone(),
            monitor.clone(),
            20,
            min_interval,
        ));
        Harness {
            env,
            ledger,
            probe,
            monitor,
            reconciler,
        }
    }

    async fn enqueue(h: &Harness, descriptions: &[&str]) -> Vec<PendingTransaction> {
        let mut entries = Vec::new();
        for d in descriptions {
            entries.push(h.env.outbox().enqueue(payload(d)).await.unwrap());
        }
        entries
    }

    #[tokio::test]
    async fn test_sessions_on_one_home_never_drain_together() {
        let env = TestEnv::new().await;
        let ledger = Arc::new(TestLedger::empty().with_delay(Duration::from_millis(50)));
        env.outbox().enqueue(payload("Rent")).await.unwrap();

        let session = |config: Config| {
            let probe = Arc::new(StaticProbe::new(true));
            let monitor = Arc::new(ConnectivityMonitor::new(true, probe));
            Reconciler::new(config.outbox(), ledger.clone(), monitor, 20, Duration::ZERO)
        };
        let watching = session(env.reload().await);
        let syncing = session(env.reload().await);

        let (a, b) = tokio::join!(watching.drain(), syncing.drain());
        let reports = [a.unwrap(), b.unwrap()];
        assert_eq!(
            reports
                .iter()
                .filter(|r| **r == DrainReport::Coalesced)
                .count(),
            1
        );
        assert_eq!(reports.iter().map(|r| r.confirmed().len()).sum::<usize>(), 1);
        assert_eq!(ledger.create_calls(), 1);
        assert_eq!(ledger.transactions().len(), 1);

        // The lease is free again once the pass is over
        assert_eq!(syncing.drain().await.unwrap(), DrainReport::Empty);
        assert_eq!(watching.drain().await.unwrap(), DrainReport::Empty);
    }

    #[tokio::test]
    async fn test_empty_outbox_is_a_no_op() {
        let h = harness(TestLedger::empty(), Duration::ZERO).await;
        h.monitor.observe(false);
        h.monitor.observe(true);

        let report = h.reconciler.drain().await.unwrap();
        assert_eq!(report, DrainReport::Empty);
        assert_eq!(h.ledger.create_calls(), 0);
        assert_eq!(h.ledger.list_calls(), 0);
        // drain itself leaves the connectivity state alone
        assert!(h.monitor.was_offline());
    }

    #[tokio::test]
    async fn test_full_drain_confirms_clears_and_refetches() {
        let h = harness(TestLedger::empty(), Duration::ZERO).await;
        let entries = enqueue(&h, &["A", "B", "C"]).await;
        h.monitor.observe(false);
        h.monitor.observe(true);

        let report = h.reconciler.drain().await.unwrap();
        let DrainReport::Complete {
            confirmed,
            refreshed,
        } = report
        else {
            panic!("expected a complete drain, got {report:?}");
        };
        let order: Vec<_> = confirmed.iter().map(|c| c.temp_id.clone()).collect();
        let expected: Vec<_> = entries.iter().map(|e| e.temp_id.clone()).collect();
        assert_eq!(order, expected);
        assert_eq!(refreshed.unwrap().transactions.len(), 3);

        assert!(h.env.outbox().is_empty().await.unwrap());
        assert!(!h.monitor.was_offline());
        assert_eq!(h.ledger.list_calls(), 1);
        let stored: Vec<_> = h
            .ledger
            .transactions()
            .into_iter()
            .map(|t| t.description)
            .collect();
        assert_eq!(stored, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_only_failed_entries() {
        let ledger = TestLedger::empty();
        ledger.fail_on(
            "B",
            LedgerError::Server {
                status: 503,
                message: "maintenance".into(),
            },
        );
        let h = harness(ledger, Duration::ZERO).await;
        let entries = enqueue(&h, &["A", "B", "C"]).await;
        h.monitor.observe(false);
        h.monitor.observe(true);

        let report = h.reconciler.drain().await.unwrap();
        assert_eq!(report.confirmed().len(), 2);
        assert_eq!(report.failed().len(), 1);
        assert_eq!(report.failed()[0].kind, ErrorKind::Server);
        assert_eq!(report.message(), "Synced 2 transaction(s), failed to sync 1");

        assert_eq!(h.env.outbox().all().await.unwrap(), vec![entries[1].clone()]);
        // No refresh and no acknowledgement after a partial pass
        assert!(h.monitor.was_offline());
        assert_eq!(h.ledger.list_calls(), 0);

        // The next pass picks up the survivor
        h.ledger.clear_faults();
        let report = h.reconciler.drain().await.unwrap();
        assert_eq!(report.confirmed().len(), 1);
        assert!(h.env.outbox().is_empty().await.unwrap());
        assert!(!h.monitor.was_offline());
    }

    #[tokio::test]
    async fn test_rejected_entries_stay_queued_and_are_reported() {
        let ledger = TestLedger::empty();
        ledger.fail_on("A", LedgerError::Validation("category does not exist".into()));
        let h = harness(ledger, Duration::ZERO).await;
        enqueue(&h, &["A"]).await;

        let report = h.reconciler.drain().await.unwrap();
        assert_eq!(report.failed()[0].kind, ErrorKind::Validation);
        assert_eq!(h.env.outbox().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_drains_are_coalesced() {
        let ledger = TestLedger::empty().with_delay(Duration::from_millis(50));
        let h = harness(ledger, Duration::ZERO).await;
        enqueue(&h, &["A", "B"]).await;

        let (first, second) = tokio::join!(h.reconciler.drain(), h.reconciler.drain());
        let reports = [first.unwrap(), second.unwrap()];
        assert_eq!(
            reports
                .iter()
                .filter(|r| **r == DrainReport::Coalesced)
                .count(),
            1
        );
        // Each entry was sent exactly once
        assert_eq!(h.ledger.create_calls(), 2);
        assert_eq!(h.ledger.transactions().len(), 2);
        assert!(!h.reconciler.is_draining());
    }

    #[tokio::test]
    async fn test_entries_enqueued_during_a_drain_survive_it() {
        let ledger = TestLedger::empty().with_delay(Duration::from_millis(50));
        let h = harness(ledger, Duration::ZERO).await;
        enqueue(&h, &["A"]).await;

        let outbox = h.env.outbox();
        let (report, late) = tokio::join!(h.reconciler.drain(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            outbox.enqueue(payload("Late")).await.unwrap()
        });
        assert_eq!(report.unwrap().confirmed().len(), 1);
        assert_eq!(h.env.outbox().all().await.unwrap(), vec![late]);
    }

    #[tokio::test]
    async fn test_lost_response_is_not_duplicated_on_retry() {
        let ledger = TestLedger::empty();
        ledger.lose_response_on("A");
        let h = harness(ledger, Duration::ZERO).await;
        enqueue(&h, &["A"]).await;

        let report = h.reconciler.drain().await.unwrap();
        assert_eq!(report.failed()[0].kind, ErrorKind::Network);
        h.ledger.clear_faults();
        let report = h.reconciler.drain().await.unwrap();
        assert_eq!(report.confirmed().len(), 1);
        assert_eq!(h.ledger.transactions().len(), 1);
    }

    #[tokio::test]
    async fn test_on_recovered_with_empty_outbox_acknowledges() {
        let h = harness(TestLedger::empty(), Duration::ZERO).await;
        h.monitor.observe(false);
        h.monitor.observe(true);

        let report = h.reconciler.on_recovered().await.unwrap();
        assert_eq!(report, DrainReport::Empty);
        assert!(!h.monitor.was_offline());
        assert_eq!(h.ledger.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_on_recovered_respects_min_interval() {
        let ledger = TestLedger::empty();
        ledger.set_reachable(false);
        let h = harness(ledger, Duration::from_secs(60)).await;
        enqueue(&h, &["A"]).await;

        let report = h.reconciler.on_recovered().await.unwrap();
        assert_eq!(report.failed().len(), 1);

        h.ledger.set_reachable(true);
        let report = h.reconciler.on_recovered().await.unwrap();
        assert!(matches!(report, DrainReport::Throttled { .. }));
        assert_eq!(h.ledger.create_calls(), 1);

        // An explicit sync is not throttled
        let report = h.reconciler.sync_now().await.unwrap();
        assert_eq!(report.confirmed().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_probe_skips_the_pass() {
        let h = harness(TestLedger::empty(), Duration::ZERO).await;
        enqueue(&h, &["A"]).await;
        h.probe.set(false);

        assert_eq!(h.reconciler.sync_now().await.unwrap(), DrainReport::Offline);
        assert_eq!(h.reconciler.on_recovered().await.unwrap(), DrainReport::Offline);
        assert_eq!(h.ledger.create_calls(), 0);
        assert!(!h.monitor.is_online());
        assert_eq!(h.env.outbox().len().await.unwrap(), 1);
    }
}
