//! These structs provide the CLI interface for the moneytalk CLI.

use crate::model::{Amount, TransactionType};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing::level_filters::LevelFilter;

/// moneytalk: record income and expenses against the MoneyTalk API, online or offline.
///
/// Transactions you add while the API is unreachable are saved to a local outbox and sent, in
/// the order you added them, once the connection is back. Use `moneytalk sync` to send them
/// right away or `moneytalk watch` to keep a session running that syncs on reconnect.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory, the configuration file and the local database.
    ///
    /// This is the first command you should run. By default the data directory is
    /// $HOME/moneytalk; pass --home to put it somewhere else.
    Init(InitArgs),
    /// Record a transaction. Saved offline if the API cannot be reached.
    Add(AddArgs),
    /// Show the transactions waiting in the outbox.
    Pending,
    /// Send the pending transactions to the API now.
    Sync,
    /// List transactions, pending ones first.
    List(ListArgs),
    /// Change a transaction that the API has already accepted.
    Update(UpdateArgs),
    /// Delete a transaction that the API has already accepted.
    Delete(DeleteArgs),
    /// Check whether the API is reachable, and sync if it is.
    Status,
    /// Watch the connection and sync pending transactions whenever it comes back.
    Watch(WatchArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where moneytalk data and configuration is held. Defaults to ~/moneytalk
    #[arg(long = "home", env = "MONEYTALK_HOME", default_value_t = default_moneytalk_home())]
    moneytalk_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, moneytalk_home: PathBuf) -> Self {
        Self {
            log_level,
            moneytalk_home: moneytalk_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn moneytalk_home(&self) -> &DisplayPath {
        &self.moneytalk_home
    }
}

/// Args for the `moneytalk init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The base URL of the MoneyTalk API, e.g. https://api.moneytalk.com/api
    #[arg(long)]
    api_url: String,

    /// Your user id in MoneyTalk.
    #[arg(long)]
    user_id: String,

    /// A file holding your API token. It will be moved into the secrets directory.
    #[arg(long)]
    token_file: Option<PathBuf>,
}

impl InitArgs {
    pub fn new(
        api_url: impl Into<String>,
        user_id: impl Into<String>,
        token_file: Option<PathBuf>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            user_id: user_id.into(),
            token_file,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn token_file(&self) -> Option<&Path> {
        self.token_file.as_deref()
    }
}

/// Args for the `moneytalk add` command.
#[derive(Debug, Parser, Clone)]
pub struct AddArgs {
    /// What the transaction was for.
    #[arg(long)]
    pub description: String,

    /// The amount, e.g. 45, 12.50 or "$1,200.00". Always positive; use --type for direction.
    #[arg(long)]
    pub amount: Amount,

    /// The id of the category.
    #[arg(long)]
    pub category_id: String,

    /// Whether this is income or an expense.
    #[arg(long = "type", value_enum)]
    pub kind: TransactionType,

    /// The date of the transaction as YYYY-MM-DD. Defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

/// Args for the `moneytalk list` command.
#[derive(Debug, Parser, Clone)]
pub struct ListArgs {
    /// The page of confirmed transactions to show, starting at 1.
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// The page size. Defaults to the page_size in config.json.
    #[arg(long)]
    pub limit: Option<u32>,

    /// Only show income or only show expenses.
    #[arg(long = "type", value_enum)]
    pub kind: Option<TransactionType>,

    /// Only show this category, by name or id.
    #[arg(long)]
    pub category: Option<String>,

    /// Only show transactions whose description contains this text.
    #[arg(long)]
    pub search: Option<String>,

    /// Only show transactions on or after this date.
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Only show transactions on or before this date.
    #[arg(long)]
    pub to: Option<NaiveDate>,
}

/// Args for the `moneytalk update` command. Only the given fields are changed.
#[derive(Debug, Parser, Clone)]
pub struct UpdateArgs {
    /// The id of the transaction.
    pub id: String,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub amount: Option<Amount>,

    /// The id of the new category.
    #[arg(long)]
    pub category_id: Option<String>,

    #[arg(long = "type", value_enum)]
    pub kind: Option<TransactionType>,

    #[arg(long)]
    pub date: Option<NaiveDate>,
}

/// Args for the `moneytalk delete` command.
#[derive(Debug, Parser, Clone)]
pub struct DeleteArgs {
    /// The id of the transaction.
    pub id: String,
}

/// Args for the `moneytalk watch` command.
#[derive(Debug, Parser, Clone)]
pub struct WatchArgs {
    /// How often to check the connection, in seconds.
    #[arg(long, default_value_t = 15)]
    pub interval_secs: u64,
}

fn default_moneytalk_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("moneytalk"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --home or MONEYTALK_HOME instead of relying on the \
                default home directory. If you continue using the program right now, you may \
                have problems!",
            );
            PathBuf::from("moneytalk")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}
