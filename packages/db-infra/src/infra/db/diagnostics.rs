/// Process-wide counters describing migration orchestration outcomes.
pub mod migration_counters {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tracing::info;

    static SCHEMA_CHECKS: AtomicUsize = AtomicUsize::new(0);
    static FAST_PATH_HITS: AtomicUsize = AtomicUsize::new(0);
    static FAST_PATH_MISSES: AtomicUsize = AtomicUsize::new(0);
    static LOCK_ACQUIRED: AtomicUsize = AtomicUsize::new(0);
    static LOCK_ACQUIRE_ATTEMPTS: AtomicUsize = AtomicUsize::new(0);
    static LOCK_BACKOFFS: AtomicUsize = AtomicUsize::new(0);
    static LOCK_TIMEOUTS: AtomicUsize = AtomicUsize::new(0);
    static MIGRATOR_RUNS: AtomicUsize = AtomicUsize::new(0);
    static MIGRATION_FAILURES: AtomicUsize = AtomicUsize::new(0);
    static BODY_TIMEOUTS: AtomicUsize = AtomicUsize::new(0);
    static CANCELLATIONS: AtomicUsize = AtomicUsize::new(0);
    static POSTCHECK_MISMATCHES: AtomicUsize = AtomicUsize::new(0);
    static BUSY_EVENTS: AtomicUsize = AtomicUsize::new(0);

    /// Point-in-time copy of every counter.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct Snapshot {
        pub schema_checks: usize,
        pub fast_path_hits: usize,
        pub fast_path_misses: usize,
        pub lock_acquired: usize,
        pub lock_acquire_attempts: usize,
        pub lock_backoffs: usize,
        pub lock_timeouts: usize,
        pub migrator_runs: usize,
        pub migration_failures: usize,
        pub body_timeouts: usize,
        pub cancellations: usize,
        pub postcheck_mismatches: usize,
        pub busy_events: usize,
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn schema_check() {
        bump(&SCHEMA_CHECKS);
    }

    pub fn fast_path_hit() {
        bump(&FAST_PATH_HITS);
    }

    pub fn fast_path_miss() {
        bump(&FAST_PATH_MISSES);
    }

    pub fn lock_acquired() {
        bump(&LOCK_ACQUIRED);
    }

    pub fn add_lock_acquire_attempts(attempts: usize) {
        LOCK_ACQUIRE_ATTEMPTS.fetch_add(attempts, Ordering::Relaxed);
    }

    pub fn lock_backoff_event() {
        bump(&LOCK_BACKOFFS);
    }

    pub fn lock_acquire_timeout() {
        bump(&LOCK_TIMEOUTS);
    }

    pub fn migrator_ran() {
        bump(&MIGRATOR_RUNS);
    }

    pub fn migration_failed() {
        bump(&MIGRATION_FAILURES);
    }

    pub fn migration_body_timeout() {
        bump(&BODY_TIMEOUTS);
    }

    pub fn migration_cancelled() {
        bump(&CANCELLATIONS);
    }

    pub fn postcheck_mismatch() {
        bump(&POSTCHECK_MISMATCHES);
    }

    pub fn busy_event() {
        bump(&BUSY_EVENTS);
    }

    pub fn snapshot() -> Snapshot {
        Snapshot {
            schema_checks: SCHEMA_CHECKS.load(Ordering::Relaxed),
            fast_path_hits: FAST_PATH_HITS.load(Ordering::Relaxed),
            fast_path_misses: FAST_PATH_MISSES.load(Ordering::Relaxed),
            lock_acquired: LOCK_ACQUIRED.load(Ordering::Relaxed),
            lock_acquire_attempts: LOCK_ACQUIRE_ATTEMPTS.load(Ordering::Relaxed),
            lock_backoffs: LOCK_BACKOFFS.load(Ordering::Relaxed),
            lock_timeouts: LOCK_TIMEOUTS.load(Ordering::Relaxed),
            migrator_runs: MIGRATOR_RUNS.load(Ordering::Relaxed),
            migration_failures: MIGRATION_FAILURES.load(Ordering::Relaxed),
            body_timeouts: BODY_TIMEOUTS.load(Ordering::Relaxed),
            cancellations: CANCELLATIONS.load(Ordering::Relaxed),
            postcheck_mismatches: POSTCHECK_MISMATCHES.load(Ordering::Relaxed),
            busy_events: BUSY_EVENTS.load(Ordering::Relaxed),
        }
    }

    pub fn log_snapshot(context: &str) {
        let s = snapshot();
        info!(
            context = context,
            schema_checks = s.schema_checks,
            fast_path_hits = s.fast_path_hits,
            fast_path_misses = s.fast_path_misses,
            lock_acquired = s.lock_acquired,
            lock_acquire_attempts = s.lock_acquire_attempts,
            lock_backoffs = s.lock_backoffs,
            lock_timeouts = s.lock_timeouts,
            migrator_runs = s.migrator_runs,
            migration_failures = s.migration_failures,
            body_timeouts = s.body_timeouts,
            cancellations = s.cancellations,
            postcheck_mismatches = s.postcheck_mismatches,
            busy_events = s.busy_events,
            "migration_counters"
        );
    }

}
