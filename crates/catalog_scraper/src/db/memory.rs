//! In-process course store.

use super::error::StorageError;
use super::types::{CommitOutcome, StoredCourse};
use super::versioning::{plan_commit, CommitPlan, EncodedCourse};
use super::CourseStore;
use crate::catalog::{Course, IdentityKey};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    current: HashMap<IdentityKey, StoredCourse>,
    archive: BTreeMap<(i64, u32), StoredCourse>,
    closed: bool,
}

impl MemoryState {
    fn open(&mut self) -> Result<&mut Self, StorageError> {
        if self.closed {
            Err(StorageError::Closed)
        } else {
            Ok(self)
        }
    }

    fn insert_current(&mut self, encoded: EncodedCourse) -> Result<i64, StorageError> {
        let key = encoded.course.identity();
        if self.current.contains_key(&key) {
            return Err(StorageError::Conflict {
                message: format!("{key} already has a current record"),
            });
        }

        self.next_id += 1;
        let id = self.next_id;
        self.current.insert(
            key.clone(),
            StoredCourse {
                id,
                key,
                version: encoded.course.version,
                fingerprint: encoded.fingerprint,
                body: encoded.body,
                scraped_at: encoded.course.scraped_at,
            },
        );
        Ok(id)
    }

    fn archive(&mut self, record: &StoredCourse) -> Result<(), StorageError> {
        let slot = (record.id, record.version);
        if self.archive.contains_key(&slot) {
            return Err(StorageError::Conflict {
                message: format!("archive already holds {} v{}", record.id, record.version),
            });
        }
        self.archive.insert(slot, record.clone());
        Ok(())
    }

    fn delete_current(&mut self, id: i64, version: u32) -> Result<(), StorageError> {
        let key = self
            .current
            .iter()
            .find(|(_, r)| r.id == id && r.version == version)
            .map(|(k, _)| k.clone())
            .ok_or_else(|| StorageError::Conflict {
                message: format!("current record {id} is no longer at version {version}"),
            })?;
        self.current.remove(&key);
        Ok(())
    }
}

/// Course store kept in process memory.
///
/// Each commit runs under one lock, so it is atomic with respect to every
/// other call on the store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CourseStore for MemoryStore {
    fn find_current(&self, key: &IdentityKey) -> Result<Option<StoredCourse>, StorageError> {
        let mut state = self.state.lock()?;
        Ok(state.open()?.current.get(key).cloned())
    }

    fn insert_current(&self, course: &Course) -> Result<i64, StorageError> {
        let encoded = EncodedCourse::new(course.clone())?;
        self.state.lock()?.open()?.insert_current(encoded)
    }

    fn archive(&self, record: &StoredCourse) -> Result<(), StorageError> {
        self.state.lock()?.open()?.archive(record)
    }

    fn delete_current(&self, id: i64, version: u32) -> Result<(), StorageError> {
        self.state.lock()?.open()?.delete_current(id, version)
    }

    fn commit(&self, course: Course) -> Result<CommitOutcome, StorageError> {
        let mut guard = self.state.lock()?;
        let state = guard.open()?;

        let existing = state.current.get(&course.identity()).cloned();
        match plan_commit(existing, course)? {
            CommitPlan::Insert(next) => {
                let version = next.course.version;
                Ok(CommitOutcome::Inserted {
                    id: state.insert_current(next)?,
                    version,
                })
            }
            CommitPlan::Unchanged(current) => Ok(CommitOutcome::Unchanged {
                id: current.id,
                version: current.version,
            }),
            CommitPlan::Revise { previous, next } => {
                // Checked up front so a failure leaves both maps untouched
                if state.archive.contains_key(&(previous.id, previous.version)) {
                    return Err(StorageError::Conflict {
                        message: format!(
                            "archive already holds {} v{}",
                            previous.id, previous.version
                        ),
                    });
                }

                let version = next.course.version;
                state.archive(&previous)?;
                state.delete_current(previous.id, previous.version)?;
                Ok(CommitOutcome::Revised {
                    id: state.insert_current(next)?,
                    version,
                    archived_id: previous.id,
                    archived_version: previous.version,
                })
            }
        }
    }

    fn archived_versions(&self, key: &IdentityKey) -> Result<Vec<StoredCourse>, StorageError> {
        let mut state = self.state.lock()?;
        let mut records: Vec<StoredCourse> = state
            .open()?
            .archive
            .values()
            .filter(|r| &r.key == key)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.version);
        Ok(records)
    }

    fn close(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock()?;
        state.open()?.closed = true;
        Ok(())
    }
}
