//! Error types for the catalog scraping subsystem.

use thiserror::Error;

/// Errors raised while turning page content into typed records.
///
/// These are never retried: fetching the same malformed page again will not
/// fix it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A field that must be numeric was not
    #[error("Field `{field}` is not numeric: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    /// A required element is missing from the page
    #[error("Missing element: {what}")]
    MissingElement { what: String },

    /// The course heading did not match `<SUBJECT> <NUMBER> (<CREDITS>) <TITLE>`
    #[error("Unrecognized course heading: {text:?}")]
    Heading { text: String },

    /// Time tokens and day groups do not pair up
    #[error("Schedule {schedule:?} has {time_tokens} time tokens for {day_groups} day groups")]
    MeetingTimeMismatch {
        schedule: String,
        time_tokens: usize,
        day_groups: usize,
    },

    /// A 4-digit token is not a valid `HHmm` wall-clock time
    #[error("Invalid time token: {token:?}")]
    InvalidTime { token: String },

    /// Date text did not hold a usable date (range)
    #[error("Invalid date text: {text:?}")]
    InvalidDate { text: String },

    /// Two header labels normalize to the same column key
    #[error("Header labels collide on column key `{key}`")]
    HeaderCollision { key: String },

    /// A body row's cell count differs from the header width
    #[error("Row {row} has {found} cells, header has {expected}")]
    RowWidthMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// A fee cell had a `$` without a parsable amount
    #[error("Invalid fee text: {text:?}")]
    InvalidFee { text: String },
}

/// Errors that can occur while scraping the catalog.
#[derive(Debug, Error, Clone)]
pub enum ScrapeError {
    /// Network/HTTP request failed
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    /// Request did not complete within the configured timeout
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// Server answered with a non-success status
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    /// URL parsing/construction failed
    #[error("URL error: {message}")]
    Url { message: String },

    /// Page content could not be parsed
    #[error("Failed to parse {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: ParseError,
    },

    /// A configured CSS selector is invalid
    #[error("Invalid selector {selector:?}: {message}")]
    Selector { selector: String, message: String },

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {message}")]
    Client { message: String },
}

impl ScrapeError {
    /// Returns true if this error is potentially transient and retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScrapeError::Network { .. } | ScrapeError::Timeout { .. } => true,
            ScrapeError::Status { status, .. } => *status == 429 || *status >= 500,
            ScrapeError::Url { .. }
            | ScrapeError::Parse { .. }
            | ScrapeError::Selector { .. }
            | ScrapeError::Client { .. } => false,
        }
    }

    /// Builds a transport error from a reqwest failure for the given URL.
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScrapeError::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = err.status() {
            ScrapeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            ScrapeError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl From<url::ParseError> for ScrapeError {
    fn from(err: url::ParseError) -> Self {
        ScrapeError::Url {
            message: err.to_string(),
        }
    }
}
