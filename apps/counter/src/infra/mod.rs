//! Infrastructure layer - storage error classification.

pub mod db_errors;
