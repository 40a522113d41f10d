//! Adapters for external dependencies.

pub mod counter_rows_sea;
