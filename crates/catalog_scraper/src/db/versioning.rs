//! The versioning decision shared by every store backend.

use super::error::StorageError;
use super::types::StoredCourse;
use crate::catalog::{Course, Prereq, Section};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// The parts of a course that count as its content.
///
/// `version` and `scraped_at` change on every scrape and are left out, so an
/// unchanged page fingerprints the same.
#[derive(Serialize)]
struct Content<'a> {
    subject_code: &'a str,
    course_number: u16,
    title: &'a str,
    credits: &'a [u32],
    description: &'a str,
    prereqs: &'a BTreeSet<Prereq>,
    sections: &'a [Section],
}

/// Hex SHA-256 of a course's content.
pub fn fingerprint(course: &Course) -> Result<String, StorageError> {
    let content = Content {
        subject_code: &course.subject_code,
        course_number: course.course_number,
        title: &course.title,
        credits: &course.credits,
        description: &course.description,
        prereqs: &course.prereqs,
        sections: &course.sections,
    };
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(&content)?);
    Ok(hex::encode(&hasher.finalize()[..]))
}

/// An incoming course with its version assigned, ready to store.
#[derive(Debug, Clone)]
pub struct EncodedCourse {
    pub course: Course,
    pub fingerprint: String,
    pub body: String,
}

impl EncodedCourse {
    pub fn new(course: Course) -> Result<Self, StorageError> {
        Ok(Self {
            fingerprint: fingerprint(&course)?,
            body: serde_json::to_string(&course)?,
            course,
        })
    }
}

/// What a commit has to do.
#[derive(Debug)]
pub enum CommitPlan {
    /// No current record: insert at version 1
    Insert(EncodedCourse),
    /// Current record has the same content
    Unchanged(StoredCourse),
    /// Archive `previous`, delete it from current, insert `next`
    Revise {
        previous: StoredCourse,
        next: EncodedCourse,
    },
}

/// Decides how to commit `incoming` given the current record for its identity.
pub fn plan_commit(
    existing: Option<StoredCourse>,
    mut incoming: Course,
) -> Result<CommitPlan, StorageError> {
    match existing {
        None => {
            incoming.version = 1;
            Ok(CommitPlan::Insert(EncodedCourse::new(incoming)?))
        }
        Some(previous) => {
            if previous.fingerprint == fingerprint(&incoming)? {
                return Ok(CommitPlan::Unchanged(previous));
            }
            incoming.version = previous.version + 1;
            Ok(CommitPlan::Revise {
                previous,
                next: EncodedCourse::new(incoming)?,
            })
        }
    }
}

/// Helper module for hex encoding (avoiding extra dependency).
mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}
