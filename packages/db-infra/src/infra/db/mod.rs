pub mod core;
pub mod diagnostics;
pub mod locking;

pub use core::{
    build_admin_pool, build_pool, orchestrate_migration, orchestrate_migration_internal,
    orchestrate_migration_with_cancel,
};
pub use diagnostics::migration_counters;
pub use locking::{BootstrapLock, Guard, InMemoryLock, MySqlNamedLock, PgAdvisoryLock, SqliteFileLock};
