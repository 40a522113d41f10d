//! Durable counter store.
//!
//! A [`CounterStore`] owns a connection pool to a table of counter rows and
//! appends the next counter value race-free, with serialisation delegated to
//! the database engine.

pub mod adapters;
pub mod db;
pub mod entities;
pub mod error;
pub mod infra;
pub mod presentation;
pub mod repos;
pub mod store;

pub use error::{CounterError, StorageFault};
pub use repos::counter_rows::CounterRow;
pub use store::{with_store, CounterStore, Snapshot};
