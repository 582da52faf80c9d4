/// Database types for versioned course records
use super::error::StorageError;
use crate::catalog::{Course, IdentityKey};
use chrono::{DateTime, Utc};

/// A course row as kept by a store, current or archived.
///
/// `body` is the JSON the course was committed with; archiving copies it
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCourse {
    pub id: i64,
    pub key: IdentityKey,
    pub version: u32,
    pub fingerprint: String,
    pub body: String,
    pub scraped_at: DateTime<Utc>,
}

impl StoredCourse {
    /// Decodes the stored body back into a course.
    pub fn course(&self) -> Result<Course, StorageError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// What a commit did with the incoming course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// First time this identity was seen
    Inserted { id: i64, version: u32 },
    /// Identical to the current record; nothing was written
    Unchanged { id: i64, version: u32 },
    /// The previous current record was archived and replaced
    Revised {
        id: i64,
        version: u32,
        archived_id: i64,
        archived_version: u32,
    },
}

impl CommitOutcome {
    /// The version that is current after the commit.
    pub fn version(&self) -> u32 {
        match self {
            CommitOutcome::Inserted { version, .. }
            | CommitOutcome::Unchanged { version, .. }
            | CommitOutcome::Revised { version, .. } => *version,
        }
    }
}
