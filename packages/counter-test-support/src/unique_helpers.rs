//! Unique names for test databases and files.

use ulid::Ulid;

/// A unique string in the format `{prefix}-{ulid}`
///
/// ```
/// use counter_test_support::unique_helpers::unique_str;
///
/// let a = unique_str("run");
/// let b = unique_str("run");
/// assert_ne!(a, b);
/// assert!(a.starts_with("run-"));
/// ```
pub fn unique_str(prefix: &str) -> String {
    format!("{}-{}", prefix, Ulid::new())
}

/// A unique SQLite file name that satisfies the `_test` suffix rule.
///
/// ```
/// use counter_test_support::unique_helpers::unique_sqlite_file;
///
/// let name = unique_sqlite_file("counter");
/// assert!(name.starts_with("counter-"));
/// assert!(name.ends_with("_test.db"));
/// ```
pub fn unique_sqlite_file(prefix: &str) -> String {
    format!("{}_test.db", unique_str(prefix).to_lowercase())
}
