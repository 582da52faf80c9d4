//! Asynchronous commit queue between the scrape pipeline and the store.
//!
//! Commits are started as soon as a course arrives and may finish in any
//! order. Commits for the same identity are serialized. The queue keeps a
//! count of commits still in flight; the caller must drain it with
//! [`CommitQueue::finish`] before closing the store.

use crate::catalog::{Course, IdentityKey};
use crate::config::{CommitConfig, RetryPolicy};
use crate::db::{CommitOutcome, CourseStore, StorageError};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinSet;
use tracing::{error, info};

/// The result of committing one course.
#[derive(Debug)]
pub struct CommitReport {
    pub key: IdentityKey,
    pub result: Result<CommitOutcome, StorageError>,
}

/// Totals over every commit a queue ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub inserted: usize,
    pub unchanged: usize,
    pub revised: usize,
    pub failed: Vec<IdentityKey>,
}

impl CommitSummary {
    fn record(&mut self, report: CommitReport) {
        match report.result {
            Ok(CommitOutcome::Inserted { version, .. }) => {
                info!(course = %report.key, version, "Inserted course");
                self.inserted += 1;
            }
            Ok(CommitOutcome::Unchanged { version, .. }) => {
                info!(course = %report.key, version, "Course unchanged");
                self.unchanged += 1;
            }
            Ok(CommitOutcome::Revised {
                version,
                archived_version,
                ..
            }) => {
                info!(
                    course = %report.key,
                    version,
                    archived_version,
                    "Revised course"
                );
                self.revised += 1;
            }
            Err(e) => {
                error!(course = %report.key, error = %e, "Failed to commit course");
                self.failed.push(report.key);
            }
        }
    }

    pub fn committed(&self) -> usize {
        self.inserted + self.unchanged + self.revised
    }
}

type IdentityLocks = DashMap<IdentityKey, Arc<tokio::sync::Mutex<()>>>;

pub struct CommitQueue {
    store: Arc<dyn CourseStore>,
    config: CommitConfig,
    retry_policy: RetryPolicy,
    /// Per-identity locks so one course's revisions never interleave
    identity_locks: Arc<IdentityLocks>,
    in_flight: JoinSet<CommitReport>,
    summary: CommitSummary,
}

impl CommitQueue {
    pub fn new(store: Arc<dyn CourseStore>, config: CommitConfig, retry_policy: RetryPolicy) -> Self {
        Self {
            store,
            config,
            retry_policy,
            identity_locks: Arc::new(DashMap::new()),
            in_flight: JoinSet::new(),
            summary: CommitSummary::default(),
        }
    }

    /// Number of commits started but not yet observed.
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// Starts committing `course` in the background.
    ///
    /// Finished commits are collected opportunistically so the pending count
    /// stays close to the real number in flight.
    pub fn submit(&mut self, course: Course) {
        let key = course.identity();
        let lock = self
            .identity_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        let retry_policy = self.retry_policy.clone();
        let locks = Arc::clone(&self.identity_locks);

        self.in_flight.spawn(async move {
            // Shared with every attempt so the identity stays locked until
            // blocking work abandoned by a timeout has really finished
            let guard = Arc::new(lock.lock_owned().await);
            let result = retry_policy
                .run(&key.to_string(), config.retries, || {
                    commit_once(
                        Arc::clone(&store),
                        course.clone(),
                        Arc::clone(&guard),
                        config.timeout(),
                    )
                })
                .await;
            drop(guard);
            release_lock(&locks, &key);
            CommitReport { key, result }
        });

        self.reap();
    }

    /// Number of identities that currently have a lock entry.
    pub fn tracked_identities(&self) -> usize {
        self.identity_locks.len()
    }

    /// Records every commit that has already finished.
    fn reap(&mut self) {
        while let Some(joined) = self.in_flight.try_join_next() {
            self.observe(joined);
        }
    }

    fn observe(&mut self, joined: Result<CommitReport, tokio::task::JoinError>) {
        match joined {
            Ok(report) => self.summary.record(report),
            // The task itself panicked; its key is lost with it
            Err(e) => error!(error = %e, "Commit task failed"),
        }
    }

    /// Waits for every outstanding commit and returns the totals.
    ///
    /// Call only after the pipeline has signalled end-of-sequence; the store
    /// may be closed once this returns.
    pub async fn finish(mut self) -> CommitSummary {
        info!(pending = self.pending(), "Waiting for outstanding commits");
        while let Some(joined) = self.in_flight.join_next().await {
            self.observe(joined);
        }
        self.summary
    }
}

/// Drops the lock entry for `key` once no task or blocking commit holds it.
fn release_lock(locks: &IdentityLocks, key: &IdentityKey) {
    locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
}

/// One commit attempt on the blocking pool, bounded by `timeout`.
///
/// The blocking closure keeps a share of the identity guard, so it outlives
/// the attempt if the timeout fires first.
async fn commit_once(
    store: Arc<dyn CourseStore>,
    course: Course,
    guard: Arc<OwnedMutexGuard<()>>,
    timeout: Duration,
) -> Result<CommitOutcome, StorageError> {
    let task = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        store.commit(course)
    });
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(StorageError::Task {
            message: e.to_string(),
        }),
        Err(_) => Err(StorageError::Timeout {
            secs: timeout.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::sample_course;
    use crate::db::{MemoryStore, StoredCourse};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_same_identity_revisions_all_land() {
        let store = Arc::new(MemoryStore::new());
        let mut queue = CommitQueue::new(store.clone(), CommitConfig::default(), fast_retry());

        for capacity in [30, 40, 50] {
            queue.submit(sample_course(capacity));
        }
        let summary = queue.finish().await;

        assert_eq!(summary.committed(), 3);
        assert!(summary.failed.is_empty());

        let key = sample_course(30).identity();
        assert_eq!(store.find_current(&key).unwrap().unwrap().version, 3);
        assert_eq!(store.archived_versions(&key).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_finish_drains_pending_commits() {
        let store = Arc::new(MemoryStore::new());
        let mut queue = CommitQueue::new(store.clone(), CommitConfig::default(), fast_retry());

        let mut other = sample_course(30);
        other.course_number = 162;
        queue.submit(sample_course(30));
        queue.submit(other);

        let summary = queue.finish().await;
        assert_eq!(summary.inserted, 2);
        assert!(store
            .find_current(&sample_course(30).identity())
            .unwrap()
            .is_some());
    }

    /// Fails with a retryable conflict a fixed number of times, then delegates.
    struct FlakyStore {
        inner: MemoryStore,
        failures_left: AtomicU32,
    }

    impl CourseStore for FlakyStore {
        fn find_current(&self, key: &IdentityKey) -> Result<Option<StoredCourse>, StorageError> {
            self.inner.find_current(key)
        }

        fn insert_current(&self, course: &Course) -> Result<i64, StorageError> {
            self.inner.insert_current(course)
        }

        fn archive(&self, record: &StoredCourse) -> Result<(), StorageError> {
            self.inner.archive(record)
        }

        fn delete_current(&self, id: i64, version: u32) -> Result<(), StorageError> {
            self.inner.delete_current(id, version)
        }

        fn commit(&self, course: Course) -> Result<CommitOutcome, StorageError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(StorageError::Conflict {
                    message: "simulated".to_string(),
                });
            }
            self.inner.commit(course)
        }

        fn archived_versions(&self, key: &IdentityKey) -> Result<Vec<StoredCourse>, StorageError> {
            self.inner.archived_versions(key)
        }

        fn close(&self) -> Result<(), StorageError> {
            self.inner.close()
        }
    }

    #[tokio::test]
    async fn test_retryable_storage_failures_are_retried() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures_left: AtomicU32::new(2),
        });
        let config = CommitConfig {
            timeout_secs: 5,
            retries: 3,
        };
        let mut queue = CommitQueue::new(store, config, fast_retry());

        queue.submit(sample_course(30));
        let summary = queue.finish().await;
        assert_eq!(summary.inserted, 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_reported_per_course() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures_left: AtomicU32::new(10),
        });
        let config = CommitConfig {
            timeout_secs: 5,
            retries: 1,
        };
        let mut queue = CommitQueue::new(store, config, fast_retry());

        queue.submit(sample_course(30));
        let summary = queue.finish().await;
        assert_eq!(summary.committed(), 0);
        assert_eq!(summary.failed, vec![sample_course(30).identity()]);
    }
    /// Delegates to a `MemoryStore`, holding each commit open for `hold` and
    /// recording how many commits overlapped per identity.
    struct SlowStore {
        inner: MemoryStore,
        hold: Duration,
        active: Mutex<HashMap<IdentityKey, usize>>,
        max_overlap: AtomicUsize,
        calls: AtomicU32,
    }

    impl SlowStore {
        fn new(hold: Duration) -> Self {
            Self {
                inner: MemoryStore::new(),
                hold,
                active: Mutex::new(HashMap::new()),
                max_overlap: AtomicUsize::new(0),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl CourseStore for SlowStore {
        fn find_current(&self, key: &IdentityKey) -> Result<Option<StoredCourse>, StorageError> {
            self.inner.find_current(key)
        }

        fn insert_current(&self, course: &Course) -> Result<i64, StorageError> {
            self.inner.insert_current(course)
        }

        fn archive(&self, record: &StoredCourse) -> Result<(), StorageError> {
            self.inner.archive(record)
        }

        fn delete_current(&self, id: i64, version: u32) -> Result<(), StorageError> {
            self.inner.delete_current(id, version)
        }

        fn commit(&self, course: Course) -> Result<CommitOutcome, StorageError> {
            let key = course.identity();
            self.calls.fetch_add(1, Ordering::SeqCst);
            {
                let mut active = self.active.lock().unwrap();
                let count = active.entry(key.clone()).or_insert(0);
                *count += 1;
                self.max_overlap.fetch_max(*count, Ordering::SeqCst);
            }

            // Read, stall, then write: overlapping commits would interleave here
            let existing = self.inner.find_current(&key);
            std::thread::sleep(self.hold);
            let result = existing.and_then(|_| self.inner.commit(course));

            *self.active.lock().unwrap().get_mut(&key).unwrap() -= 1;
            result
        }

        fn archived_versions(&self, key: &IdentityKey) -> Result<Vec<StoredCourse>, StorageError> {
            self.inner.archived_versions(key)
        }

        fn close(&self) -> Result<(), StorageError> {
            self.inner.close()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_identity_commits_never_overlap() {
        let store = Arc::new(SlowStore::new(Duration::from_millis(30)));
        let mut queue = CommitQueue::new(store.clone(), CommitConfig::default(), fast_retry());

        for capacity in [30, 40, 50, 60] {
            queue.submit(sample_course(capacity));
        }
        let summary = queue.finish().await;

        assert_eq!(summary.committed(), 4);
        assert_eq!(store.max_overlap.load(Ordering::SeqCst), 1);
        let key = sample_course(30).identity();
        assert_eq!(store.find_current(&key).unwrap().unwrap().version, 4);
    }

    #[tokio::test]
    async fn test_timed_out_commit_is_retried_then_reported() {
        let store = Arc::new(SlowStore::new(Duration::from_millis(200)));
        let config = CommitConfig {
            timeout_secs: 0,
            retries: 1,
        };
        let mut queue = CommitQueue::new(store.clone(), config, fast_retry());

        queue.submit(sample_course(30));
        assert_eq!(queue.pending(), 1);
        let summary = queue.finish().await;

        assert_eq!(summary.committed(), 0);
        assert_eq!(summary.failed, vec![sample_course(30).identity()]);

        // Abandoned attempts still run to completion on the blocking pool
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_commit_timeout_maps_to_storage_timeout() {
        let store: Arc<dyn CourseStore> = Arc::new(SlowStore::new(Duration::from_millis(200)));
        let guard = Arc::new(Arc::new(tokio::sync::Mutex::new(())).lock_owned().await);

        let err = commit_once(store, sample_course(30), guard, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Timeout { secs: 0 }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_lock_entries_are_released() {
        let store = Arc::new(MemoryStore::new());
        let mut queue = CommitQueue::new(store, CommitConfig::default(), fast_retry());

        for number in [161, 162] {
            let mut course = sample_course(30);
            course.course_number = number;
            queue.submit(course);
        }
        while let Some(joined) = queue.in_flight.join_next().await {
            queue.observe(joined);
        }
        assert_eq!(queue.tracked_identities(), 0);
        assert_eq!(queue.summary.inserted, 2);
    }
}
