//! Types that represent the core data model, such as `Transaction` and `PendingTransaction`.
mod amount;
mod filters;
mod pending;
mod transaction;

pub use amount::{Amount, AmountError, AmountFormat};
pub use filters::ListFilters;
pub use pending::{merge_entries, LedgerEntry, PendingTransaction};
pub use transaction::{
    Category, NewTransaction, Pagination, Transaction, TransactionPage, TransactionPatch,
    TransactionType,
};
