//! The ledger client: the contract for talking to the remote transaction store, an HTTP
//! implementation, and an in-memory implementation for running the app without a server.

mod http;
mod test_ledger;

use crate::error::LedgerError;
use crate::model::{ListFilters, NewTransaction, Transaction, TransactionPage, TransactionPatch};
use crate::{Config, Result};
use std::sync::Arc;
use tracing::debug;

pub use http::HttpLedger;
pub use test_ledger::TestLedger;

/// When this environment variable is set and non-empty, the app uses `TestLedger` instead of the
/// remote API.
pub const TEST_MODE_ENV: &str = "MONEYTALK_IN_TEST_MODE";

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Which ledger implementation the app talks to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The remote API configured in `config.json`.
    #[default]
    Http,
    /// An in-memory ledger seeded with sample data.
    Test,
}

impl Mode {
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(v) if !v.is_empty() => Mode::Test,
            _ => Mode::Http,
        }
    }
}

/// The remote transaction store.
///
/// `create` is not idempotent on its own: a `Network` error may hide a create that succeeded on
/// the server. Callers only retry creates from the outbox, and pass the entry's temporary id as
/// `idempotency_key` so that a server that honors the key can drop the duplicate.
#[async_trait::async_trait]
pub trait Ledger: Send + Sync {
    async fn create(
        &self,
        payload: &NewTransaction,
        idempotency_key: Option<&str>,
    ) -> LedgerResult<Transaction>;

    async fn list(&self, filters: &ListFilters) -> LedgerResult<TransactionPage>;

    async fn update(&self, id: &str, patch: &TransactionPatch) -> LedgerResult<Transaction>;

    async fn delete(&self, id: &str) -> LedgerResult<()>;
}

/// Builds the ledger for `mode`.
pub async fn ledger(config: &Config, mode: Mode) -> Result<Arc<dyn Ledger>> {
    match mode {
        Mode::Http => {
            let token = config.token().await?;
            debug!(
                "Using the ledger at {} ({})",
                config.api_url(),
                if token.is_some() {
                    "with token"
                } else {
                    "without token"
                }
            );
            Ok(Arc::new(HttpLedger::new(
                config.api_url(),
                config.user_id(),
                token,
                config.request_timeout(),
            )?))
        }
        Mode::Test => {
            debug!("Using the in-memory test ledger");
            Ok(Arc::new(TestLedger::default()))
        }
    }
}
