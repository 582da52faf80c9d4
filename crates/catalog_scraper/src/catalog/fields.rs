//! Parsers for individual catalog cells.
//!
//! Every function here takes one already-extracted, trimmed string and turns
//! it into a typed value. None of them see markup or keep state.

use super::error::ParseError;
use super::types::{Fee, MeetingTime};
use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use std::sync::LazyLock;

// Static patterns - compiled once
static DATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{2})\b").unwrap());
static TIME_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{4}\b").unwrap());
static DAY_GROUP_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Z]+").unwrap());
static FEE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\s*(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d{2}))?([^$]*)").unwrap()
});
static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());

const TBA: &str = "TBA";

/// Collapses every run of whitespace (newlines included) into one space and trims.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalizes a header label into a column key: alphanumerics only, lower-cased.
///
/// `"Days/Time"` becomes `"daystime"`, `"WL Cap"` becomes `"wlcap"`.
pub fn normalize_key(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Parses a credit value or range, `"4"` or `"1-16"`.
pub fn credits(text: &str) -> Result<Vec<u32>, ParseError> {
    text.split('-')
        .map(|segment| {
            let segment = segment.trim();
            segment.parse::<u32>().map_err(|_| ParseError::InvalidNumber {
                field: "credits",
                value: text.to_string(),
            })
        })
        .collect()
}

/// Computes `max - available`, clamped at zero.
///
/// Non-numeric input on either side (e.g. an "unlimited" capacity) also yields
/// zero, so a malformed cell never produces a negative enrollment count.
pub fn capacity_delta(max: &str, available: &str) -> u32 {
    match (max.trim().parse::<i64>(), available.trim().parse::<i64>()) {
        (Ok(max), Ok(available)) => u32::try_from(max - available).unwrap_or(0),
        _ => 0,
    }
}

/// Parses a schedule cell and its location cell into meeting times.
///
/// `schedule` holds one or more `<DAYS> <HHmm>-<HHmm>` blocks (optionally
/// followed by a date range, which is ignored here). `location` holds
/// alternating building codes and room numbers, matched to the blocks by
/// position.
///
/// A schedule without digits, or containing `TBA`, has no meeting times.
pub fn meeting_times(schedule: &str, location: &str) -> Result<Vec<MeetingTime>, ParseError> {
    if !schedule.chars().any(|c| c.is_ascii_digit()) || schedule.contains(TBA) {
        return Ok(Vec::new());
    }

    // Dates like 9/26/16 would otherwise leak into the time and day scans
    let without_dates = DATE_REGEX.replace_all(schedule, " ");

    let times: Vec<&str> = TIME_REGEX
        .find_iter(&without_dates)
        .map(|m| m.as_str())
        .collect();
    let day_groups: Vec<&str> = DAY_GROUP_REGEX
        .find_iter(&without_dates)
        .map(|m| m.as_str())
        .collect();

    if times.len() % 2 != 0 || times.len() / 2 != day_groups.len() {
        return Err(ParseError::MeetingTimeMismatch {
            schedule: schedule.to_string(),
            time_tokens: times.len(),
            day_groups: day_groups.len(),
        });
    }

    let location_tokens: Vec<&str> = location.split_whitespace().collect();

    day_groups
        .iter()
        .enumerate()
        .map(|(i, days)| {
            Ok(MeetingTime {
                start_time: parse_hhmm(times[2 * i])?,
                end_time: parse_hhmm(times[2 * i + 1])?,
                days: days.to_string(),
                building_code: location_tokens.get(2 * i).map(|s| s.to_string()),
                room_number: location_tokens.get(2 * i + 1).map(|s| s.to_string()),
            })
        })
        .collect()
}

/// Parses a `HHmm` token into a wall-clock time.
fn parse_hhmm(token: &str) -> Result<NaiveTime, ParseError> {
    let invalid = || ParseError::InvalidTime {
        token: token.to_string(),
    };
    let hours: u32 = token.get(0..2).and_then(|h| h.parse().ok()).ok_or_else(invalid)?;
    let minutes: u32 = token.get(2..4).and_then(|m| m.parse().ok()).ok_or_else(invalid)?;
    NaiveTime::from_hms_opt(hours, minutes, 0).ok_or_else(invalid)
}

/// Extracts a `MM/DD/YY` start and end date from text.
///
/// Returns `Ok(None)` for the `TBA` sentinel or empty text.
pub fn date_range(text: &str) -> Result<Option<(NaiveDate, NaiveDate)>, ParseError> {
    let text = text.trim();
    if text.is_empty() || text == TBA {
        return Ok(None);
    }

    let mut dates = DATE_REGEX.captures_iter(text);
    match (dates.next(), dates.next()) {
        (Some(start), Some(end)) => Ok(Some((
            date_from_captures(&start, text)?,
            date_from_captures(&end, text)?,
        ))),
        _ => Err(ParseError::InvalidDate {
            text: text.to_string(),
        }),
    }
}

/// Returns true if the text holds at least one `MM/DD/YY` token.
pub fn contains_date(text: &str) -> bool {
    DATE_REGEX.is_match(text)
}

/// Parses a single `MM/DD/YY` cell. Empty or `TBA` text yields `Ok(None)`.
pub fn date(text: &str) -> Result<Option<NaiveDate>, ParseError> {
    let text = text.trim();
    if text.is_empty() || text == TBA {
        return Ok(None);
    }

    match DATE_REGEX.captures(text) {
        Some(caps) => date_from_captures(&caps, text).map(Some),
        None => Err(ParseError::InvalidDate {
            text: text.to_string(),
        }),
    }
}

fn date_from_captures(caps: &regex::Captures<'_>, text: &str) -> Result<NaiveDate, ParseError> {
    let invalid = || ParseError::InvalidDate {
        text: text.to_string(),
    };
    let month: u32 = caps[1].parse().map_err(|_| invalid())?;
    let day: u32 = caps[2].parse().map_err(|_| invalid())?;
    let year: i32 = caps[3].parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(2000 + year, month, day).ok_or_else(invalid)
}

/// Parses a fees cell such as `"$45.00 Lab fee $10.00 Tech fee"`.
pub fn fees(text: &str) -> Result<Vec<Fee>, ParseError> {
    let text = text.trim();
    let invalid = || ParseError::InvalidFee {
        text: text.to_string(),
    };
    let parsed: Vec<Fee> = FEE_REGEX
        .captures_iter(text)
        .map(|caps| {
            let dollars: u32 = caps[1].replace(',', "").parse().map_err(|_| invalid())?;
            let cents: u32 = caps
                .get(2)
                .map_or(Ok(0), |c| c.as_str().parse())
                .map_err(|_| invalid())?;
            let amount_cents = dollars
                .checked_mul(100)
                .and_then(|d| d.checked_add(cents))
                .ok_or_else(invalid)?;
            Ok(Fee {
                amount_cents,
                description: normalize_whitespace(&caps[3]),
            })
        })
        .collect::<Result<_, ParseError>>()?;

    if parsed.len() != text.matches('$').count() {
        return Err(invalid());
    }

    Ok(parsed)
}

/// Returns the first `http(s)` link in a comments cell, trailing punctuation removed.
pub fn textbook_url(comments: &str) -> Option<String> {
    URL_REGEX
        .find(comments)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ')']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_credits_single_and_range() {
        assert_eq!(credits("4"), Ok(vec![4]));
        assert_eq!(credits("1-16"), Ok(vec![1, 16]));
        assert_eq!(credits(" 3 - 5 "), Ok(vec![3, 5]));
    }

    #[test]
    fn test_credits_rejects_non_numeric() {
        assert!(credits("").is_err());
        assert!(credits("4-").is_err());
        assert!(credits("VAR").is_err());
    }

    #[test]
    fn test_capacity_delta_never_negative() {
        assert_eq!(capacity_delta("30", "28"), 2);
        assert_eq!(capacity_delta("30", "30"), 0);
        assert_eq!(capacity_delta("10", "12"), 0);
        assert_eq!(capacity_delta("unlimited", "5"), 0);
        assert_eq!(capacity_delta("30", ""), 0);
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("Days/Time"), "daystime");
        assert_eq!(normalize_key("WL Cap"), "wlcap");
        assert_eq!(normalize_key("Day/Time/Date"), "daytimedate");
        assert_eq!(normalize_key("CRN"), "crn");
    }

    #[test]
    fn test_meeting_times_tba_is_empty() {
        assert_eq!(meeting_times("TBA", ""), Ok(vec![]));
        assert_eq!(meeting_times("", ""), Ok(vec![]));
        assert_eq!(meeting_times("MWF TBA 1000", "KEC 1001"), Ok(vec![]));
    }

    #[test]
    fn test_meeting_times_single_block() {
        let parsed = meeting_times("MWF 1000-1050", "KEC 1001").unwrap();
        assert_eq!(
            parsed,
            vec![MeetingTime {
                start_time: time(10, 0),
                end_time: time(10, 50),
                days: "MWF".to_string(),
                building_code: Some("KEC".to_string()),
                room_number: Some("1001".to_string()),
            }]
        );
    }

    #[test]
    fn test_meeting_times_multiple_blocks_with_dates() {
        let parsed = meeting_times(
            "MW 1000-1050 9/26/16-12/9/16 F 1400-1550 9/26/16-12/9/16",
            "KEC 1001 DEAR 118",
        )
        .unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].days, "MW");
        assert_eq!(parsed[1].days, "F");
        assert_eq!(parsed[1].start_time, time(14, 0));
        assert_eq!(parsed[1].end_time, time(15, 50));
        assert_eq!(parsed[1].building_code.as_deref(), Some("DEAR"));
        assert_eq!(parsed[1].room_number.as_deref(), Some("118"));
    }

    #[test]
    fn test_meeting_times_missing_location_is_unknown() {
        let parsed = meeting_times("TR 1200-1350", "").unwrap();
        assert_eq!(parsed[0].building_code, None);
        assert_eq!(parsed[0].room_number, None);
    }

    #[test]
    fn test_meeting_times_mismatch_is_reported() {
        let err = meeting_times("MW 1000-1050 F", "").unwrap_err();
        assert!(matches!(
            err,
            ParseError::MeetingTimeMismatch {
                time_tokens: 2,
                day_groups: 2,
                ..
            }
        ));

        assert!(meeting_times("MWF 1000", "").is_err());
    }

    #[test]
    fn test_meeting_times_invalid_clock() {
        assert_eq!(
            meeting_times("MWF 2500-2550", ""),
            Err(ParseError::InvalidTime {
                token: "2500".to_string()
            })
        );
    }

    #[test]
    fn test_date_range() {
        let (start, end) = date_range("9/26/16-12/9/16").unwrap().unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2016, 9, 26).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2016, 12, 9).unwrap());

        assert_eq!(date_range("TBA"), Ok(None));
        assert!(date_range("9/26/16").is_err());
        assert!(date_range("13/40/16-12/9/16").is_err());
    }

    #[test]
    fn test_single_date() {
        assert_eq!(
            date("01/09/17"),
            Ok(Some(NaiveDate::from_ymd_opt(2017, 1, 9).unwrap()))
        );
        assert_eq!(date(""), Ok(None));
        assert!(date("soon").is_err());
    }

    #[test]
    fn test_fees() {
        let parsed = fees("$45.00 Lab fee $10 Tech fee").unwrap();
        assert_eq!(
            parsed,
            vec![
                Fee {
                    amount_cents: 4500,
                    description: "Lab fee".to_string()
                },
                Fee {
                    amount_cents: 1000,
                    description: "Tech fee".to_string()
                },
            ]
        );
        assert_eq!(fees(""), Ok(vec![]));
        assert!(fees("$ TBD").is_err());
    }

    #[test]
    fn test_fees_with_thousands_separator() {
        assert_eq!(
            fees("$1,000.00 Lab fee"),
            Ok(vec![Fee {
                amount_cents: 100_000,
                description: "Lab fee".to_string()
            }])
        );
        assert_eq!(fees("$12,500 Program fee").unwrap()[0].amount_cents, 1_250_000);
    }

    #[test]
    fn test_fees_too_large_is_invalid() {
        assert_eq!(
            fees("$50000000 Program fee"),
            Err(ParseError::InvalidFee {
                text: "$50000000 Program fee".to_string()
            })
        );
        assert!(fees("$99999999999 Program fee").is_err());
    }

    #[test]
    fn test_textbook_url() {
        assert_eq!(
            textbook_url("Textbooks: http://osubeaverstore.com/textbooks?crn=14880."),
            Some("http://osubeaverstore.com/textbooks?crn=14880".to_string())
        );
        assert_eq!(textbook_url("Lab attendance is mandatory."), None);
    }
}
