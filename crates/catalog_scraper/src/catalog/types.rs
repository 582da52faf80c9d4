/// Types for scraped catalog data
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A course as scraped from one catalog detail page.
///
/// `version` is assigned by the store on commit; freshly assembled courses
/// carry `0` until then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub subject_code: String,
    pub course_number: u16,
    pub title: String,
    pub credits: Vec<u32>,
    pub description: String,
    pub prereqs: BTreeSet<Prereq>,
    pub sections: Vec<Section>,
    pub version: u32,
    pub scraped_at: DateTime<Utc>,
}

impl Course {
    /// Returns the key correlating versions of this course across scrapes.
    pub fn identity(&self) -> IdentityKey {
        IdentityKey {
            subject_code: self.subject_code.clone(),
            course_number: self.course_number,
            title: self.title.clone(),
        }
    }
}

/// The (subject code, course number, title) triple identifying a logical course.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct IdentityKey {
    pub subject_code: String,
    pub course_number: u16,
    pub title: String,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.subject_code, self.course_number, self.title)
    }
}

/// A prerequisite course reference, e.g. `CS 162`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Prereq {
    pub subject_code: String,
    pub course_number: u16,
}

/// One scheduled offering of a course.
///
/// Optional fields are `None` when the column was absent or empty on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub term: Option<String>,
    pub session: Option<String>,
    pub crn: u32,
    /// Section number within the term, `001` on the page
    pub section_number: Option<u16>,
    pub credits: Option<Vec<u32>>,
    pub instructor: Option<String>,
    pub meeting_times: Vec<MeetingTime>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub campus: Option<String>,
    #[serde(rename = "type")]
    pub section_type: Option<String>,
    pub status: Option<String>,
    pub capacity: Option<u32>,
    pub current_enrollment: u32,
    pub waitlist_capacity: Option<u32>,
    pub waitlist_current: u32,
    pub fees: Vec<Fee>,
    pub restrictions: Option<String>,
    pub comments: Option<String>,
    /// Bookstore link found in the comments, if any
    pub textbook_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingTime {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub days: String,
    pub building_code: Option<String>,
    pub room_number: Option<String>,
}

/// A section fee, amount in cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub amount_cents: u32,
    pub description: String,
}
