//! `ledger-storage`: SQL persistence for the ledger.
//!
//! Every operation borrows an `AnyConnection` from the caller, which may be a
//! bare pooled connection or an open transaction, and a [`CancelSignal`]
//! bounding how long it may run. Dialect differences are confined to
//! [`dialect`].

pub mod balances;
pub mod cancel;
pub mod dialect;
pub mod error;
mod exec;
pub mod mapping;
pub mod schema;
pub mod store;
pub mod transactions;

#[cfg(test)]
mod integration_tests;

pub use balances::AddressMatcher;
pub use cancel::CancelSignal;
pub use dialect::{Dialect, QueryBuilder, Statement};
pub use error::map_sqlx_error;
pub use store::Store;
