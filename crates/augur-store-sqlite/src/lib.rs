//! SQLite backend for the Augur forecast store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every statement goes through that one
//! connection thread, and multi-statement writes run in a transaction, which
//! is what makes compare-and-insert operations atomic.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
