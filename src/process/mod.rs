// src/process/mod.rs
use crate::error::SurveyError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{borrow::Cow, collections::BTreeMap, fmt};
use tracing::{debug, warn};

pub mod csv_parser;
pub mod date_parser;
pub mod header_match;
pub mod html_table;
pub mod raw_table;
pub mod utils;

use raw_table::RawTable;

/// A typed cell. Only timestamp columns ever hold `Instant`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Instant(DateTime<Utc>),
}

impl CellValue {
    /// Display text of the cell; instants render as RFC 3339.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            CellValue::Text(s) => Cow::Borrowed(s.as_str()),
            CellValue::Instant(dt) => Cow::Owned(dt.to_rfc3339()),
        }
    }

    pub fn as_instant(&self) -> Option<&DateTime<Utc>> {
        match self {
            CellValue::Instant(dt) => Some(dt),
            CellValue::Text(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.is_empty())
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<DateTime<Utc>> for CellValue {
    fn from(dt: DateTime<Utc>) -> Self {
        CellValue::Instant(dt)
    }
}

/// One survey response keyed by the *actual* source header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, CellValue>);

impl Row {
    pub fn get(&self, header: &str) -> Option<&CellValue> {
        self.0.get(header)
    }

    /// Display text under `header`, empty when the column is absent.
    pub fn text(&self, header: &str) -> Cow<'_, str> {
        self.get(header)
            .map(CellValue::as_text)
            .unwrap_or(Cow::Borrowed(""))
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Row(iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect())
    }
}

/// Logical field name → header found in this snapshot. A missing key means
/// the field could not be matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HeaderMapping(BTreeMap<String, String>);

impl HeaderMapping {
    pub fn get(&self, logical: &str) -> Option<&str> {
        self.0.get(logical).map(String::as_str)
    }

    pub fn contains(&self, logical: &str) -> bool {
        self.0.contains_key(logical)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything one parse cycle produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub header_mapping: HeaderMapping,
    pub warnings: Vec<String>,
}

impl ParseResult {
    /// Actual header for a logical field, if it was matched.
    pub fn column(&self, logical: &str) -> Option<&str> {
        self.header_mapping.get(logical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Delimited,
    HtmlTable,
}

impl SourceFormat {
    /// Extension of `name_hint` first (query string and fragment ignored),
    /// then a `<table` sniff of the content.
    pub fn detect(name_hint: Option<&str>, content: &str) -> Self {
        if let Some(hint) = name_hint {
            let path = hint.split(['?', '#']).next().unwrap_or(hint).to_lowercase();
            if path.ends_with(".csv") {
                return SourceFormat::Delimited;
            }
            if path.ends_with(".html") || path.ends_with(".htm") {
                return SourceFormat::HtmlTable;
            }
        }
        if content.contains("<table") {
            SourceFormat::HtmlTable
        } else {
            SourceFormat::Delimited
        }
    }
}

/// Parse one fetched snapshot into rows, a header mapping and warnings.
#[tracing::instrument(level = "debug", skip(content, expected_fields), fields(bytes = content.len()))]
pub fn parse_content(
    content: &str,
    name_hint: Option<&str>,
    expected_fields: &[String],
) -> Result<ParseResult, SurveyError> {
    let format = SourceFormat::detect(name_hint, content);
    let raw = match format {
        SourceFormat::Delimited => csv_parser::read_delimited(content)?,
        SourceFormat::HtmlTable => html_table::read_html_table(content)?,
    };
    let result = build_result(raw, expected_fields);
    debug!(
        ?format,
        headers = ?result.headers,
        mapping = ?result.header_mapping,
        rows = result.rows.len(),
        "parsed survey table"
    );
    Ok(result)
}

/// Type the raw cells and resolve the expected fields.
pub fn build_result(raw: RawTable, expected_fields: &[String]) -> ParseResult {
    let RawTable { headers, rows } = raw;
    let timestamp_cols: Vec<bool> = headers
        .iter()
        .map(|h| utils::is_timestamp_header(h))
        .collect();

    let rows = rows
        .into_iter()
        .map(|cells| {
            headers
                .iter()
                .zip(&timestamp_cols)
                .enumerate()
                .map(|(i, (header, &is_ts))| {
                    let cell = cells.get(i).map(String::as_str).unwrap_or("");
                    let value = if is_ts {
                        date_parser::normalize_timestamp(cell)
                    } else {
                        CellValue::Text(cell.to_string())
                    };
                    (header.clone(), value)
                })
                .collect::<Row>()
        })
        .collect();

    let (header_mapping, warnings) = resolve_fields(&headers, expected_fields);

    ParseResult {
        headers,
        rows,
        header_mapping,
        warnings,
    }
}

/// Match every expected field, in declaration order, against `headers`.
pub fn resolve_fields(headers: &[String], expected_fields: &[String]) -> (HeaderMapping, Vec<String>) {
    let mut mapping = BTreeMap::new();
    let mut warnings = Vec::new();

    for field in expected_fields {
        match header_match::match_header(field, headers) {
            Some(actual) => {
                mapping.insert(field.clone(), actual.to_string());
            }
            None => {
                warn!(field = %field, "expected field not found in headers");
                warnings.push(format!("Missing expected field: {}", field));
            }
        }
    }

    (HeaderMapping(mapping), warnings)
}
