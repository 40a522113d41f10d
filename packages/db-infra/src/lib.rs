//! Shared database configuration and migration infrastructure.
//! Used by the counter store and the migration CLI.

pub mod config;
pub mod error;
pub mod infra;

pub use config::db;
pub use config::db::{ConnSpec, DbKind, DbOwner, RuntimeEnv};
pub use error::DbInfraError;
pub use infra::db::core::{
    build_admin_pool, build_pool, orchestrate_migration, orchestrate_migration_internal,
    orchestrate_migration_with_cancel, sanitize_db_url,
};
pub use tokio_util::sync::CancellationToken;
