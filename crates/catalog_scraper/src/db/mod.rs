/// Database module for versioned course storage

mod error;
mod memory;
mod types;
mod versioning;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use types::{CommitOutcome, StoredCourse};
pub use versioning::fingerprint;

use crate::catalog::{Course, IdentityKey};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;
use versioning::{plan_commit, CommitPlan, EncodedCourse};

const SCHEMA_SQL: &str = include_str!("../../../../sql/init_catalog.sql");

/// The storage boundary every backend implements.
///
/// The individual steps are exposed for inspection and repair; scraping only
/// goes through [`CourseStore::commit`], which runs them as one atomic unit.
pub trait CourseStore: Send + Sync {
    /// Looks up the current record for an identity.
    fn find_current(&self, key: &IdentityKey) -> Result<Option<StoredCourse>, StorageError>;

    /// Inserts a course, with its version already set, as current.
    fn insert_current(&self, course: &Course) -> Result<i64, StorageError>;

    /// Copies a current record into the archive under `(id, version)`.
    fn archive(&self, record: &StoredCourse) -> Result<(), StorageError>;

    /// Deletes the current record `id`, provided it is still at `version`.
    fn delete_current(&self, id: i64, version: u32) -> Result<(), StorageError>;

    /// Commits an incoming course: insert, no-op, or archive-and-replace.
    fn commit(&self, course: Course) -> Result<CommitOutcome, StorageError>;

    /// Every archived record for an identity, oldest version first.
    fn archived_versions(&self, key: &IdentityKey) -> Result<Vec<StoredCourse>, StorageError>;

    /// Releases the underlying connection. Later calls fail with `Closed`.
    fn close(&self) -> Result<(), StorageError>;
}

/// SQLite-backed course store.
pub struct CourseDbManager {
    db: Mutex<Option<Connection>>,
}

impl CourseDbManager {
    /// Opens (creating if needed) the database at `db_path` and initializes the schema
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        info!(path = %db_path.display(), "Opening course database");
        Self::with_connection(Connection::open(db_path)?)
    }

    /// Opens a private in-memory database
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            db: Mutex::new(Some(conn)),
        })
    }

    /// Runs `f` against the open connection.
    fn with_db<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut guard = self.db.lock()?;
        let conn = guard.as_mut().ok_or(StorageError::Closed)?;
        f(conn)
    }
}

impl CourseStore for CourseDbManager {
    fn find_current(&self, key: &IdentityKey) -> Result<Option<StoredCourse>, StorageError> {
        self.with_db(|db| find_current_in(db, key))
    }

    fn insert_current(&self, course: &Course) -> Result<i64, StorageError> {
        let encoded = EncodedCourse::new(course.clone())?;
        self.with_db(|db| insert_current_in(db, &encoded))
    }

    fn archive(&self, record: &StoredCourse) -> Result<(), StorageError> {
        self.with_db(|db| archive_in(db, record))
    }

    fn delete_current(&self, id: i64, version: u32) -> Result<(), StorageError> {
        self.with_db(|db| delete_current_in(db, id, version))
    }

    fn commit(&self, course: Course) -> Result<CommitOutcome, StorageError> {
        self.with_db(|db| {
            // Immediate: take the write lock before reading the current record
            let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing = find_current_in(&tx, &course.identity())?;
            let outcome = match plan_commit(existing, course)? {
                CommitPlan::Insert(next) => CommitOutcome::Inserted {
                    id: insert_current_in(&tx, &next)?,
                    version: next.course.version,
                },
                CommitPlan::Unchanged(current) => CommitOutcome::Unchanged {
                    id: current.id,
                    version: current.version,
                },
                CommitPlan::Revise { previous, next } => {
                    archive_in(&tx, &previous)?;
                    delete_current_in(&tx, previous.id, previous.version)?;
                    CommitOutcome::Revised {
                        id: insert_current_in(&tx, &next)?,
                        version: next.course.version,
                        archived_id: previous.id,
                        archived_version: previous.version,
                    }
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
    }

    fn archived_versions(&self, key: &IdentityKey) -> Result<Vec<StoredCourse>, StorageError> {
        self.with_db(|db| {
            let mut stmt = db.prepare(
                "SELECT course_id, subject_code, course_number, title, version,
                        fingerprint, body, scraped_at
                 FROM courses_archive
                 WHERE subject_code = ?1 AND course_number = ?2 AND title = ?3
                 ORDER BY version",
            )?;

            let records = stmt
                .query_map(
                    (&key.subject_code, key.course_number, &key.title),
                    stored_course_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
    }

    fn close(&self) -> Result<(), StorageError> {
        let mut guard = self.db.lock()?;
        match guard.take() {
            Some(conn) => conn.close().map_err(|(_, e)| StorageError::Sqlite(e)),
            None => Err(StorageError::Closed),
        }
    }
}

fn stored_course_from_row(row: &Row<'_>) -> rusqlite::Result<StoredCourse> {
    Ok(StoredCourse {
        id: row.get(0)?,
        key: IdentityKey {
            subject_code: row.get(1)?,
            course_number: row.get(2)?,
            title: row.get(3)?,
        },
        version: row.get(4)?,
        fingerprint: row.get(5)?,
        body: row.get(6)?,
        scraped_at: row.get(7)?,
    })
}

fn find_current_in(
    db: &Connection,
    key: &IdentityKey,
) -> Result<Option<StoredCourse>, StorageError> {
    let record = db
        .query_row(
            "SELECT id, subject_code, course_number, title, version,
                    fingerprint, body, scraped_at
             FROM courses_current
             WHERE subject_code = ?1 AND course_number = ?2 AND title = ?3",
            (&key.subject_code, key.course_number, &key.title),
            stored_course_from_row,
        )
        .optional()?;
    Ok(record)
}

fn insert_current_in(db: &Connection, encoded: &EncodedCourse) -> Result<i64, StorageError> {
    let course = &encoded.course;
    db.execute(
        "INSERT INTO courses_current (
            subject_code, course_number, title, version, fingerprint, body, scraped_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        (
            &course.subject_code,
            course.course_number,
            &course.title,
            course.version,
            &encoded.fingerprint,
            &encoded.body,
            course.scraped_at,
        ),
    )?;
    Ok(db.last_insert_rowid())
}

fn archive_in(db: &Connection, record: &StoredCourse) -> Result<(), StorageError> {
    db.execute(
        "INSERT INTO courses_archive (
            course_id, version, subject_code, course_number, title,
            fingerprint, body, scraped_at, archived_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))",
        (
            record.id,
            record.version,
            &record.key.subject_code,
            record.key.course_number,
            &record.key.title,
            &record.fingerprint,
            &record.body,
            record.scraped_at,
        ),
    )?;
    Ok(())
}

fn delete_current_in(db: &Connection, id: i64, version: u32) -> Result<(), StorageError> {
    let deleted = db.execute(
        "DELETE FROM courses_current WHERE id = ?1 AND version = ?2",
        (id, version),
    )?;
    if deleted != 1 {
        return Err(StorageError::Conflict {
            message: format!("current record {id} is no longer at version {version}"),
        });
    }
    Ok(())
}
