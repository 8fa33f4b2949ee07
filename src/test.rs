//! Shared test utilities for creating test environments.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::model::{Amount, NewTransaction, TransactionType};
use crate::outbox::Outbox;
use crate::Config;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tempfile::TempDir;

pub const TEST_API_URL: &str = "http://127.0.0.1:9/api";

/// Test environment that sets up a moneytalk home directory with Config and database.
/// Holds TempDir to keep the directory alive for the duration of the test.
pub struct TestEnv {
    _temp_dir: TempDir,
    root: PathBuf,
    config: Config,
}

impl TestEnv {
    /// Creates a test environment with Config and initialized database.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("moneytalk");
        let config = Config::create(&root, TEST_API_URL, "1", None)
            .await
            .unwrap();
        Self {
            _temp_dir: temp_dir,
            root,
            config,
        }
    }

    /// Returns a clone of the Config.
    pub fn config(&self) -> Config {
        self.config.clone()
    }

    pub fn outbox(&self) -> Outbox {
        self.config.outbox()
    }

    /// Loads the Config again from disk, as a restarted app would.
    pub async fn reload(&self) -> Config {
        Config::load(&self.root).await.unwrap()
    }
}

/// A valid expense in the "Food" category.
pub fn payload(description: &str) -> NewTransaction {
    NewTransaction {
        description: description.to_string(),
        amount: Amount::new(Decimal::new(1250, 2)),
        category_id: "2".to_string(),
        r#type: TransactionType::Expense,
        date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        user_id: "1".to_string(),
    }
}
