//! Repository functions for the counter domain.

pub mod counter_rows;
