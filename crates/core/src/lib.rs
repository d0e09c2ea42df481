//! `ledger-core`: domain model of the double-entry ledger.
//!
//! This crate contains **pure domain** types and logic (no IO): transactions
//! and postings, derived balance views, query descriptors, and the
//! continuation-token codec.

pub mod balance;
pub mod cursor;
pub mod error;
pub mod mapping;
pub mod pagination;
pub mod query;
pub mod transaction;

pub use balance::{AccountsBalances, AssetsBalances, BalanceAccumulator};
pub use cursor::Cursor;
pub use error::{LedgerError, LedgerResult, StorageError};
pub use mapping::{Contract, Mapping};
pub use pagination::{
    BalancesPaginationToken, QueryParams, TransactionsPaginationToken, decode_token, encode_token,
};
pub use query::{
    BalancesQuery, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, TransactionFilter, TransactionsQuery,
    clamp_page_size,
};
pub use transaction::{Metadata, NewTransaction, Posting, Transaction};
