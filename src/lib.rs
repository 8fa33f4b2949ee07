//! An offline-first client for the MoneyTalk transaction ledger.
//!
//! Transactions that cannot be delivered are kept in a durable local outbox and replayed in
//! order once the ledger is reachable again.

mod api;
pub mod args;
mod client;
pub mod commands;
mod config;
mod connectivity;
mod db;
mod error;
mod model;
mod outbox;
mod reconcile;
mod submit;
mod utils;

#[cfg(test)]
mod test;

pub use api::{HttpLedger, Ledger, LedgerResult, Mode, TestLedger, TEST_MODE_ENV};
pub use client::{Client, EntryList};
pub use config::Config;
pub use connectivity::{
    ConnectivityMonitor, ConnectivityState, HttpProbe, Probe, StaticProbe, Transition,
};
pub use error::{Error, ErrorKind, LedgerError, Result};
pub use model::{
    merge_entries, Amount, AmountError, AmountFormat, Category, LedgerEntry, ListFilters,
    NewTransaction, Pagination, PendingTransaction, Transaction, TransactionPage,
    TransactionPatch, TransactionType,
};
pub use outbox::Outbox;
pub use reconcile::{Confirmed, DrainReport, Failed, Reconciler};
pub use submit::{SubmitError, Submission, Submitter};
