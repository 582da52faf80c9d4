//! Assembles typed courses from catalog detail pages.

use super::error::{ParseError, ScrapeError};
use super::fields::{self, normalize_whitespace};
use super::table::{extract_table, RawRow};
use super::types::{Course, Prereq, Section};
use crate::config::SelectorConfig;
use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::debug;

static HEADING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z]{1,4})\s+(\d{1,3})([A-Z])?\s*\(([^)]*)\)\s*(.*)$").unwrap()
});
static NON_WORD_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());
static COURSE_REF_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{1,4})\s+(\d{2,3})\b").unwrap());
static PREREQ_MARKER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)prereq").unwrap());

/// Column keys the assembler knows how to read.
const SCHEDULE_KEYS: &[&str] = &["daytimedate", "daystime", "daytime", "days"];
const RECOGNIZED_KEYS: &[&str] = &[
    "term",
    "session",
    "crn",
    "sec",
    "cr",
    "instructor",
    "daytimedate",
    "daystime",
    "daytime",
    "days",
    "location",
    "startdate",
    "enddate",
    "campus",
    "type",
    "status",
    "cap",
    "curr",
    "avail",
    "wlcap",
    "wlcurr",
    "wlavail",
    "fees",
    "restrictions",
    "comments",
];

/// A course parsed from one page, plus whatever had to be left out of it.
#[derive(Debug, Clone)]
pub struct ParsedPage {
    pub course: Course,
    /// Rows that were rejected by the table extractor or failed to assemble
    pub dropped: Vec<ParseError>,
}

/// Compiled selectors for a catalog detail page.
#[derive(Debug, Clone)]
pub struct CoursePageParser {
    heading: Selector,
    description: Selector,
    offerings_table: Selector,
}

impl CoursePageParser {
    /// Compiles the configured selectors.
    pub fn new(config: &SelectorConfig) -> Result<Self, ScrapeError> {
        Ok(Self {
            heading: compile(&config.heading)?,
            description: compile(&config.description)?,
            offerings_table: compile(&config.offerings_table)?,
        })
    }

    /// Parses a detail page into a course with its sections.
    ///
    /// A missing heading or offerings table fails the course. A malformed
    /// section row only drops that section; it is reported in
    /// [`ParsedPage::dropped`].
    pub fn parse_course_html(
        &self,
        html: &str,
        scraped_at: DateTime<Utc>,
    ) -> Result<ParsedPage, ParseError> {
        let document = Html::parse_document(html);

        let heading = document
            .select(&self.heading)
            .next()
            .map(|el| normalize_whitespace(&el.text().collect::<String>()))
            .ok_or_else(|| ParseError::MissingElement {
                what: "course heading".to_string(),
            })?;
        let heading = parse_heading(&heading)?;

        let description = document
            .select(&self.description)
            .next()
            .map(own_text)
            .unwrap_or_default();

        let table = document
            .select(&self.offerings_table)
            .next()
            .ok_or_else(|| ParseError::MissingElement {
                what: "offerings table".to_string(),
            })?;
        let extracted = extract_table(table)?;

        for column in &extracted.columns {
            if !RECOGNIZED_KEYS.contains(&column.as_str()) {
                debug!(column = %column, "Ignoring unrecognized offerings column");
            }
        }

        let mut dropped = extracted.rejected;
        let mut sections = Vec::with_capacity(extracted.rows.len());
        for row in &extracted.rows {
            match assemble_section(row) {
                Ok(section) => sections.push(section),
                Err(e) => dropped.push(e),
            }
        }

        Ok(ParsedPage {
            course: Course {
                subject_code: heading.subject_code,
                course_number: heading.course_number,
                title: heading.title,
                credits: heading.credits,
                prereqs: parse_prereqs(&description),
                description,
                sections,
                version: 0,
                scraped_at,
            },
            dropped,
        })
    }
}

impl Default for CoursePageParser {
    fn default() -> Self {
        Self::new(&SelectorConfig::default()).expect("default selectors are valid CSS")
    }
}

fn compile(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector).map_err(|e| ScrapeError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Course-level fields carried by the page heading.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Heading {
    subject_code: String,
    course_number: u16,
    credits: Vec<u32>,
    title: String,
}

/// Parses `"CS 161 (4) Introduction to Computer Science I"`.
fn parse_heading(text: &str) -> Result<Heading, ParseError> {
    let caps = HEADING_REGEX
        .captures(text)
        .ok_or_else(|| ParseError::Heading {
            text: text.to_string(),
        })?;

    let course_number = caps[2].parse().map_err(|_| ParseError::InvalidNumber {
        field: "course number",
        value: caps[2].to_string(),
    })?;
    let title = normalize_whitespace(&NON_WORD_REGEX.replace_all(&caps[5], " "));

    // Honors and similar variants, e.g. `MTH 251H`, share the base number
    if let Some(suffix) = caps.get(3) {
        debug!(
            heading = %text,
            suffix = suffix.as_str(),
            "Ignoring course number suffix"
        );
    }

    Ok(Heading {
        subject_code: caps[1].to_string(),
        course_number,
        credits: fields::credits(&caps[4])?,
        title,
    })
}

/// Text that belongs to the element itself, excluding its children's text.
fn own_text(element: ElementRef<'_>) -> String {
    let text: Vec<String> = element
        .children()
        .filter_map(|node| node.value().as_text().map(|t| String::from(&**t)))
        .collect();
    normalize_whitespace(&text.join(" "))
}

/// Collects `<SUBJECT> <NUMBER>` references following a prerequisite marker.
fn parse_prereqs(description: &str) -> BTreeSet<Prereq> {
    let Some(marker) = PREREQ_MARKER_REGEX.find(description) else {
        return BTreeSet::new();
    };

    COURSE_REF_REGEX
        .captures_iter(&description[marker.start()..])
        .filter_map(|caps| {
            Some(Prereq {
                subject_code: caps[1].to_string(),
                course_number: caps[2].parse().ok()?,
            })
        })
        .collect()
}

/// Converts one raw table row into a section.
///
/// Absent or empty columns become `None`; only a bad CRN or an unparseable
/// value in a present column is an error.
pub fn assemble_section(row: &RawRow) -> Result<Section, ParseError> {
    let crn_text = row.get("crn").unwrap_or_default();
    let crn = crn_text
        .parse::<u32>()
        .ok()
        .filter(|crn| *crn < 100_000)
        .ok_or_else(|| ParseError::InvalidNumber {
            field: "crn",
            value: crn_text.to_string(),
        })?;

    let schedule = row.first_of(SCHEDULE_KEYS).unwrap_or_default();
    let location = row.get("location").unwrap_or_default();

    let (start_date, end_date) = if row.get("startdate").is_some() || row.get("enddate").is_some() {
        (
            fields::date(row.get("startdate").unwrap_or_default())?,
            fields::date(row.get("enddate").unwrap_or_default())?,
        )
    } else if fields::contains_date(schedule) {
        fields::date_range(schedule)?.unzip()
    } else {
        (None, None)
    };

    Ok(Section {
        term: text(row, "term"),
        session: text(row, "session"),
        crn,
        section_number: row
            .first_of(&["sec"])
            .map(|sec| {
                sec.parse::<u16>().map_err(|_| ParseError::InvalidNumber {
                    field: "section",
                    value: sec.to_string(),
                })
            })
            .transpose()?,
        credits: row.first_of(&["cr"]).map(fields::credits).transpose()?,
        instructor: text(row, "instructor"),
        meeting_times: fields::meeting_times(schedule, location)?,
        start_date,
        end_date,
        campus: text(row, "campus"),
        section_type: text(row, "type"),
        status: text(row, "status"),
        capacity: number(row, "cap"),
        current_enrollment: fields::capacity_delta(
            row.get("cap").unwrap_or_default(),
            row.first_of(&["avail", "curr"]).unwrap_or_default(),
        ),
        waitlist_capacity: number(row, "wlcap"),
        waitlist_current: fields::capacity_delta(
            row.get("wlcap").unwrap_or_default(),
            row.first_of(&["wlavail", "wlcurr"]).unwrap_or_default(),
        ),
        fees: row
            .get("fees")
            .map(fields::fees)
            .transpose()?
            .unwrap_or_default(),
        restrictions: text(row, "restrictions"),
        comments: text(row, "comments"),
        textbook_url: row.first_of(&["comments"]).and_then(fields::textbook_url),
    })
}

fn text(row: &RawRow, key: &str) -> Option<String> {
    row.first_of(&[key]).map(str::to_string)
}

fn number(row: &RawRow, key: &str) -> Option<u32> {
    row.first_of(&[key]).and_then(|v| v.parse().ok())
}
