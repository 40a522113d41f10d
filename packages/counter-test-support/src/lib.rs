//! Test support for the counter workspace
//!
//! Test logging initialisation and unique-name helpers used by the `counter`
//! crate's unit and integration tests.

pub mod logging;
pub mod unique_helpers;
