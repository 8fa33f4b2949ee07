//! The outbox: a durable FIFO queue of transactions that could not be delivered to the ledger.
//!
//! The outbox is the only record of an offline transaction until the ledger confirms it, so rows
//! are only ever deleted after a confirmed create. It lives in the SQLite database so that it
//! survives restarts.

use crate::db::Db;
use crate::model::{Amount, NewTransaction, PendingTransaction, TransactionType};
use crate::Result;
use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

type OutboxRow = (String, String, String, String, String, String, String, String);

const SELECT_ALL: &str = "SELECT temp_id, description, amount, category_id, type, date, user_id, \
    created_at FROM outbox ORDER BY seq ASC";

/// Handle to the persisted queue. Cloning it is cheap and every clone sees the same queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    db: Db,
}

impl Outbox {
    pub(crate) fn new(db: Db) -> Self {
        Self { db }
    }

    /// Appends `payload` to the end of the queue under a fresh temporary id.
    pub async fn enqueue(&self, payload: NewTransaction) -> Result<PendingTransaction> {
        let pending = PendingTransaction::new(payload);
        self.push(&pending).await?;
        Ok(pending)
    }

    /// Appends an entry whose temporary id was assigned by the caller, e.g. because it was
    /// already sent as an idempotency key.
    pub(crate) async fn push(&self, pending: &PendingTransaction) -> Result<()> {
        let p = &pending.payload;
        sqlx::query(
            "INSERT INTO outbox (temp_id, description, amount, category_id, type, date, user_id, \
             created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&pending.temp_id)
        .bind(&p.description)
        .bind(p.amount.value().to_string())
        .bind(&p.category_id)
        .bind(p.r#type.to_string())
        .bind(p.date.to_string())
        .bind(&p.user_id)
        .bind(pending.created_at.to_rfc3339())
        .execute(self.db.pool())
        .await
        .context("Unable to save the transaction to the outbox")?;

        info!(
            "Saved transaction '{}' offline as {}",
            p.description, pending.temp_id
        );
        Ok(())
    }

    /// A snapshot of every entry in insertion order.
    pub async fn all(&self) -> Result<Vec<PendingTransaction>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(SELECT_ALL)
            .fetch_all(self.db.pool())
            .await
            .context("Unable to read the outbox")?;
        rows.into_iter().map(from_row).collect()
    }

    pub async fn len(&self) -> Result<usize> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM outbox")
            .fetch_one(self.db.pool())
            .await
            .context("Unable to count the outbox")?;
        Ok(usize::try_from(row.0).unwrap_or_default())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Deletes the entries whose creation the ledger has confirmed. Unknown ids are ignored.
    /// Returns the number of entries removed.
    pub async fn remove_confirmed(&self, temp_ids: &[String]) -> Result<u64> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .context("Failed to begin outbox transaction")?;
        let mut removed = 0;
        for temp_id in temp_ids {
            removed += sqlx::query("DELETE FROM outbox WHERE temp_id = ?")
                .bind(temp_id)
                .execute(&mut *tx)
                .await
                .context("Unable to remove a confirmed outbox entry")?
                .rows_affected();
        }
        tx.commit()
            .await
            .context("Failed to commit outbox removal")?;
        debug!("Removed {removed} confirmed entries from the outbox");
        Ok(removed)
    }

    /// Swaps the result of a drain pass into the queue in one transaction.
    ///
    /// `drained` is the snapshot the pass worked on and `remaining` is the subset of it that is
    /// still failing. Entries of `drained` that are not in `remaining` are removed. Entries that
    /// were enqueued after the snapshot was taken are not part of `drained` and are kept, after
    /// the survivors.
    pub async fn replace_with(
        &self,
        drained: &[PendingTransaction],
        remaining: &[PendingTransaction],
    ) -> Result<()> {
        let drained_ids: HashSet<&str> = drained.iter().map(|p| p.temp_id.as_str()).collect();
        let keep: HashSet<&str> = remaining.iter().map(|p| p.temp_id.as_str()).collect();
        if let Some(stranger) = keep.iter().find(|id| !drained_ids.contains(*id)) {
            bail!("Outbox entry {stranger} is not part of the drained snapshot");
        }

        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .context("Failed to begin outbox transaction")?;
        for temp_id in drained_ids.difference(&keep) {
            sqlx::query("DELETE FROM outbox WHERE temp_id = ?")
                .bind(temp_id)
                .execute(&mut *tx)
                .await
                .context("Unable to remove a confirmed outbox entry")?;
        }
        tx.commit()
            .await
            .context("Failed to commit the outbox update")?;
        Ok(())
    }
}

/// A lease whose holder has not renewed it for this long is considered abandoned.
const LEASE_TTL_MS: i64 = 120_000;

/// The exclusive right to drain the outbox of one home. Every process that opens the same
/// database competes for the same lease, so only one pass sends a given entry at a time.
///
/// Call `release` when the pass ends. A lease that is dropped without being released is released
/// in the background.
#[derive(Debug)]
pub(crate) struct DrainLease {
    db: Db,
    holder: String,
    released: bool,
}

impl Outbox {
    /// Takes the drain lease, or returns `None` while another pass holds it.
    pub(crate) async fn try_lease(&self) -> Result<Option<DrainLease>> {
        let holder = Uuid::new_v4().simple().to_string();
        let now = Utc::now().timestamp_millis();
        let taken = sqlx::query(
            "INSERT INTO drain_lease (id, holder, heartbeat_ms) VALUES (1, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET holder = excluded.holder, \
             heartbeat_ms = excluded.heartbeat_ms WHERE drain_lease.heartbeat_ms < ?",
        )
        .bind(&holder)
        .bind(now)
        .bind(now - LEASE_TTL_MS)
        .execute(self.db.pool())
        .await
        .context("Unable to take the drain lease")?
        .rows_affected();

        if taken == 0 {
            debug!("The drain lease is held by another session");
            return Ok(None);
        }
        debug!("Took drain lease {holder}");
        Ok(Some(DrainLease {
            db: self.db.clone(),
            holder,
            released: false,
        }))
    }
}

impl DrainLease {
    /// Extends the lease. Returns false if it expired and another session has taken it.
    pub(crate) async fn renew(&self) -> Result<bool> {
        let renewed = sqlx::query(
            "UPDATE drain_lease SET heartbeat_ms = ? WHERE id = 1 AND holder = ?",
        )
        .bind(Utc::now().timestamp_millis())
        .bind(&self.holder)
        .execute(self.db.pool())
        .await
        .context("Unable to renew the drain lease")?
        .rows_affected();
        Ok(renewed == 1)
    }

    pub(crate) async fn release(mut self) -> Result<()> {
        release_lease(&self.db, &self.holder).await?;
        self.released = true;
        Ok(())
    }
}

impl Drop for DrainLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Drain lease {} left to expire", self.holder);
            return;
        };
        let db = self.db.clone();
        let holder = std::mem::take(&mut self.holder);
        runtime.spawn(async move {
            if let Err(e) = release_lease(&db, &holder).await {
                warn!("{e:#}");
            }
        });
    }
}

async fn release_lease(db: &Db, holder: &str) -> Result<()> {
    sqlx::query("DELETE FROM drain_lease WHERE id = 1 AND holder = ?")
        .bind(holder)
        .execute(db.pool())
        .await
        .context("Unable to release the drain lease")?;
    debug!("Released drain lease {holder}");
    Ok(())
}

fn from_row(row: OutboxRow) -> Result<PendingTransaction> {
    let (temp_id, description, amount, category_id, kind, date, user_id, created_at) = row;
    let payload = NewTransaction {
        amount: Amount::from_str(&amount)
            .with_context(|| format!("Invalid amount '{amount}' in outbox entry {temp_id}"))?,
        r#type: TransactionType::from_str(&kind)
            .with_context(|| format!("Invalid type '{kind}' in outbox entry {temp_id}"))?,
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{date}' in outbox entry {temp_id}"))?,
        description,
        category_id,
        user_id,
    };
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .with_context(|| format!("Invalid timestamp '{created_at}' in outbox entry {temp_id}"))?
        .with_timezone(&Utc);
    Ok(PendingTransaction {
        temp_id,
        payload,
        created_at,
    })
}
