// src/aggregate.rs
//! Pure summaries over a row collection. Nothing here keeps state, so the
//! same rows always give the same answer.

use crate::process::{date_parser::NOT_AVAILABLE, Row};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One slice of a category chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub value: usize,
}

/// Responses recorded on one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateCount {
    pub date: String,
    pub count: usize,
}

/// Distinct non-empty values of `field` with counts, in first-seen order.
pub fn distribution(rows: &[Row], field: &str) -> Vec<NamedCount> {
    let mut order: Vec<NamedCount> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let value = row.text(field);
        if value.is_empty() {
            continue;
        }
        match index.get(&*value) {
            Some(&i) => order[i].value += 1,
            None => {
                index.insert(value.to_string(), order.len());
                order.push(NamedCount {
                    name: value.into_owned(),
                    value: 1,
                });
            }
        }
    }
    order
}

/// Most frequent non-empty value of `field`; ties go to whichever was seen
/// first. `"N/A"` when there is nothing to count.
pub fn mode_value(rows: &[Row], field: &str) -> String {
    let mut best: Option<NamedCount> = None;
    for entry in distribution(rows, field) {
        if best.as_ref().map_or(true, |b| entry.value > b.value) {
            best = Some(entry);
        }
    }
    best.map(|b| b.name)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Rows per UTC day for a timestamp column, ascending by date. Cells that
/// never parsed as a date-time are skipped.
pub fn responses_over_time(rows: &[Row], field: &str) -> Vec<DateCount> {
    let mut days: BTreeMap<String, usize> = BTreeMap::new();
    for dt in rows.iter().filter_map(|r| r.get(field)?.as_instant()) {
        *days.entry(dt.format("%Y-%m-%d").to_string()).or_default() += 1;
    }
    days.into_iter()
        .map(|(date, count)| DateCount { date, count })
        .collect()
}

/// Percentage of positive answers across a yes-leaning and a no-leaning
/// question.
///
/// "yes"/"y" in `yes_field` and "no"/"n" in `no_field` are positive. Each
/// non-empty checked cell adds one to the total, so a row answering both
/// questions counts twice.
pub fn satisfaction(rows: &[Row], yes_field: Option<&str>, no_field: Option<&str>) -> u32 {
    let mut positive = 0u64;
    let mut total = 0u64;

    for row in rows {
        if let Some(field) = yes_field {
            let v = row.text(field);
            if !v.is_empty() {
                let v = v.to_lowercase();
                if v == "yes" || v == "y" {
                    positive += 1;
                }
                total += 1;
            }
        }
        if let Some(field) = no_field {
            let v = row.text(field);
            if !v.is_empty() {
                let v = v.to_lowercase();
                if v == "no" || v == "n" {
                    positive += 1;
                }
                total += 1;
            }
        }
    }

    if total == 0 {
        return 0;
    }
    // round half up without going through floats
    ((positive * 200 + total) / (total * 2)) as u32
}

/// Sorted distinct non-empty values, e.g. the choices for a filter.
pub fn distinct_values(rows: &[Row], field: &str) -> Vec<String> {
    rows.iter()
        .map(|r| r.text(field))
        .filter(|v| !v.is_empty())
        .map(|v| v.into_owned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// User-driven narrowing of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    /// Accepted values of the category column; empty accepts everything.
    pub values: Vec<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl RowFilter {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.start.is_none() && self.end.is_none()
    }

    fn accepts(&self, row: &Row, category_field: &str, timestamp_field: &str) -> bool {
        if !self.values.is_empty() {
            let v = row.text(category_field);
            if !self.values.iter().any(|want| *want == v) {
                return false;
            }
        }
        // rows without a real date-time are not date-filtered
        if let Some(ts) = row.get(timestamp_field).and_then(|c| c.as_instant()) {
            if self.start.is_some_and(|start| *ts < start) {
                return false;
            }
            if self.end.is_some_and(|end| *ts > end) {
                return false;
            }
        }
        true
    }
}

/// A new collection holding the rows `filter` accepts; the input is untouched.
pub fn filter_rows(
    rows: &[Row],
    category_field: &str,
    timestamp_field: &str,
    filter: &RowFilter,
) -> Vec<Row> {
    rows.iter()
        .filter(|r| filter.accepts(r, category_field, timestamp_field))
        .cloned()
        .collect()
}
