//! Offerings table extraction.
//!
//! Turns the section table of a detail page into one raw string map per row,
//! keyed by normalized header labels.

use super::error::ParseError;
use super::fields::{normalize_key, normalize_whitespace};
use scraper::{ElementRef, Selector};
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

static ROW_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static HEADER_CELL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th").unwrap());
static DATA_CELL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// One body row, column key to trimmed cell text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    cells: BTreeMap<String, String>,
}

impl RawRow {
    /// Returns the cell for `key`, if the column exists.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.cells.get(key).map(String::as_str)
    }

    /// Returns the first present, non-empty cell among `keys`.
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|key| self.get(key))
            .find(|value| !value.is_empty())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            cells: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// The result of extracting one table.
#[derive(Debug, Clone, Default)]
pub struct ExtractedTable {
    /// Normalized header keys, in column order
    pub columns: Vec<String>,
    /// Rows whose width matched the header, in table order
    pub rows: Vec<RawRow>,
    /// Rows that could not be aligned with the header
    pub rejected: Vec<ParseError>,
}

/// Extracts the header keys and body rows of a table element.
///
/// Rows are matched to the header strictly: a row with a different number of
/// cells than the header is reported in [`ExtractedTable::rejected`] instead
/// of being shifted into the wrong columns.
pub fn extract_table(table: ElementRef<'_>) -> Result<ExtractedTable, ParseError> {
    let mut rows = table.select(&ROW_SELECTOR);

    let header = rows
        .by_ref()
        .find(|row| row.select(&HEADER_CELL_SELECTOR).next().is_some())
        .ok_or_else(|| ParseError::MissingElement {
            what: "offerings table header row".to_string(),
        })?;
    let columns = header_keys(header)?;

    let mut extracted = ExtractedTable {
        columns,
        ..Default::default()
    };

    for (index, row) in rows.enumerate() {
        let cells: Vec<String> = row.select(&DATA_CELL_SELECTOR).map(cell_text).collect();
        if cells.is_empty() {
            continue;
        }

        // The catalog repeats its header labels as the first body row
        if is_repeated_header(&cells, &extracted.columns) {
            continue;
        }

        if cells.len() != extracted.columns.len() {
            extracted.rejected.push(ParseError::RowWidthMismatch {
                row: index + 1,
                expected: extracted.columns.len(),
                found: cells.len(),
            });
            continue;
        }

        extracted
            .rows
            .push(extracted.columns.iter().cloned().zip(cells).collect());
    }

    Ok(extracted)
}

fn header_keys(header: ElementRef<'_>) -> Result<Vec<String>, ParseError> {
    let mut seen = HashSet::new();
    header
        .select(&HEADER_CELL_SELECTOR)
        .map(|cell| {
            let key = normalize_key(&cell.text().collect::<String>());
            if seen.insert(key.clone()) {
                Ok(key)
            } else {
                Err(ParseError::HeaderCollision { key })
            }
        })
        .collect()
}

fn is_repeated_header(cells: &[String], columns: &[String]) -> bool {
    cells.len() == columns.len()
        && cells
            .iter()
            .zip(columns)
            .all(|(cell, key)| normalize_key(cell) == *key)
}

/// Joins a cell's text nodes with single spaces so `<br>`-separated values stay apart.
fn cell_text(cell: ElementRef<'_>) -> String {
    normalize_whitespace(&cell.text().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn extract(html: &str) -> Result<ExtractedTable, ParseError> {
        let document = Html::parse_fragment(html);
        let selector = Selector::parse("table").unwrap();
        let table = document.select(&selector).next().unwrap();
        extract_table(table)
    }

    const HEADER: &str = "<tr><th>CRN</th><th>Cr</th><th>Days/Time</th><th>Location</th></tr>";

    #[test]
    fn test_full_width_row_has_every_key() {
        let table = extract(&format!(
            "<table>{HEADER}<tr><td>12345</td><td>4</td><td>MWF 1000-1050</td><td>KEC 1001</td></tr></table>"
        ))
        .unwrap();

        assert_eq!(table.columns, vec!["crn", "cr", "daystime", "location"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].len(), 4);
        assert_eq!(table.rows[0].get("crn"), Some("12345"));
        assert_eq!(table.rows[0].get("daystime"), Some("MWF 1000-1050"));
        assert!(table.rejected.is_empty());
    }

    #[test]
    fn test_short_row_is_flagged() {
        let table = extract(&format!(
            "<table>{HEADER}<tr><td>4</td><td>MWF 1000-1050</td><td>KEC 1001</td></tr>\
             <tr><td>54321</td><td>4</td><td>TR 1200-1350</td><td>LINC 100</td></tr></table>"
        ))
        .unwrap();

        assert_eq!(
            table.rejected,
            vec![ParseError::RowWidthMismatch {
                row: 1,
                expected: 4,
                found: 3
            }]
        );
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].get("crn"), Some("54321"));
    }

    #[test]
    fn test_repeated_header_row_is_skipped() {
        let table = extract(&format!(
            "<table>{HEADER}<tr><td>CRN</td><td>Cr</td><td>Days/Time</td><td>Location</td></tr>\
             <tr><td>12345</td><td>4</td><td>TBA</td><td></td></tr></table>"
        ))
        .unwrap();

        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].get("location"), Some(""));
        assert!(table.rejected.is_empty());
    }

    #[test]
    fn test_multi_value_cells_keep_separators() {
        let table = extract(&format!(
            "<table>{HEADER}<tr><td>12345</td><td>4</td>\
             <td>MW 1000-1050<br>F 1400-1550</td><td>KEC 1001<br>DEAR 118</td></tr></table>"
        ))
        .unwrap();

        assert_eq!(table.rows[0].get("daystime"), Some("MW 1000-1050 F 1400-1550"));
        assert_eq!(table.rows[0].get("location"), Some("KEC 1001 DEAR 118"));
    }

    #[test]
    fn test_colliding_headers_are_rejected() {
        let err = extract("<table><tr><th>WL Cap</th><th>WL-Cap</th></tr></table>").unwrap_err();
        assert_eq!(
            err,
            ParseError::HeaderCollision {
                key: "wlcap".to_string()
            }
        );
    }

    #[test]
    fn test_missing_header_is_an_error() {
        assert!(extract("<table><tr><td>12345</td></tr></table>").is_err());
    }

    #[test]
    fn test_first_of_skips_empty_cells() {
        let row: RawRow = [("avail", ""), ("curr", "28")].into_iter().collect();
        assert_eq!(row.first_of(&["avail", "curr"]), Some("28"));
        assert_eq!(row.first_of(&["wlavail"]), None);
    }
}
