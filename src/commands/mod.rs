//! Command handlers for the moneytalk CLI.
//!
//! This module contains implementations for all CLI subcommands.

mod add;
mod delete;
mod init;
mod list;
mod pending;
mod status;
mod sync;
mod update;
mod watch;

use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

pub use add::add;
pub use delete::delete;
pub use init::init;
pub use list::list;
pub use pending::pending;
pub use status::{status, Status};
pub use sync::sync;
pub use update::update;
pub use watch::{watch, WatchSummary};

/// The output type for a command. This allows the command to return a consistent message and,
/// optionally, structured data to the command line.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    /// Get the `message`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the structured data stored in `structure`.
    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Print the message to `info!` and the structured data (if it exists) as JSON to `debug!`.
    pub fn print(&self) {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            if let Ok(json) = serde_json::to_string_pretty(structure) {
                debug!("Command output:\n\n{json}\n\n");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Mode;
    use crate::args::{AddArgs, DeleteArgs, ListArgs};
    use crate::model::{Amount, TransactionType};
    use crate::submit::Submission;
    use crate::test::{payload, TestEnv};
    use crate::Config;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn add_args(description: &str) -> AddArgs {
        AddArgs {
            description: description.into(),
            amount: Amount::from_str("$4.50").unwrap(),
            category_id: "2".into(),
            kind: TransactionType::Expense,
            date: None,
        }
    }

    #[tokio::test]
    async fn test_init_creates_home() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("mt");
        let out = init(&home, "https://api.moneytalk.com/api", "1", None)
            .await
            .unwrap();
        assert!(out.message().contains("Successfully created"));
        assert!(home.join("config.json").is_file());
        assert!(init(&home, "https://other.example.com/api", "2", None)
            .await
            .is_err());
        let config = Config::load(&home).await.unwrap();
        assert_eq!(config.api_url(), "https://api.moneytalk.com/api");
        assert_eq!(config.user_id(), "1");
    }

    #[tokio::test]
    async fn test_add_in_test_mode_is_confirmed() {
        let env = TestEnv::new().await;
        let out = add(env.config(), Mode::Test, add_args("Coffee"))
            .await
            .unwrap();
        assert!(matches!(out.structure(), Some(Submission::Confirmed(_))));
        assert!(env.outbox().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_amount() {
        let env = TestEnv::new().await;
        let mut args = add_args("Coffee");
        args.amount = Amount::from_str("0").unwrap();
        assert!(add(env.config(), Mode::Test, args).await.is_err());
        assert!(env.outbox().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_pending_lists_outbox() {
        let env = TestEnv::new().await;
        let out = pending(env.config()).await.unwrap();
        assert_eq!(out.message(), "No transactions waiting to sync");

        env.outbox().enqueue(payload("Groceries")).await.unwrap();
        let out = pending(env.config()).await.unwrap();
        assert!(out.message().starts_with("1 transaction(s) waiting to sync"));
        assert!(out.message().contains("Groceries"));
        assert_eq!(out.structure().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_and_status_in_test_mode() {
        let env = TestEnv::new().await;
        env.outbox().enqueue(payload("Groceries")).await.unwrap();

        let out = sync(env.config(), Mode::Test).await.unwrap();
        assert_eq!(out.message(), "Synced 1 transaction(s)");
        assert!(env.outbox().is_empty().await.unwrap());

        let out = status(env.config(), Mode::Test).await.unwrap();
        assert_eq!(out.message(), "Online, nothing to sync");
    }

    #[tokio::test]
    async fn test_list_and_delete_in_test_mode() {
        let env = TestEnv::new().await;
        env.outbox().enqueue(payload("Groceries")).await.unwrap();
        let args = ListArgs {
            page: 1,
            limit: None,
            kind: None,
            category: None,
            search: None,
            from: None,
            to: None,
        };
        let out = list(env.config(), Mode::Test, args).await.unwrap();
        let entries = &out.structure().unwrap().entries;
        assert_eq!(entries.len(), 6);
        assert!(entries[0].is_pending());
        assert!(out.message().contains("1 pending"));

        let out = delete(env.config(), Mode::Test, DeleteArgs { id: "1".into() })
            .await
            .unwrap();
        assert_eq!(out.message(), "Deleted transaction 1");
    }
}
