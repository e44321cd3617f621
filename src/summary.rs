// src/summary.rs

use crate::aggregate::{self, DateCount, NamedCount};
use crate::process::{date_parser::NOT_AVAILABLE, ParseResult, Row};
use serde::Serialize;

/// Chart- and card-ready numbers for one (possibly filtered) row set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_responses: usize,
    pub top_profession: String,
    pub satisfaction_percent: u32,
    pub profession_distribution: Vec<NamedCount>,
    pub q4_distribution: Vec<NamedCount>,
    pub responses_over_time: Vec<DateCount>,
    pub warnings: Vec<String>,
}

impl DashboardSummary {
    /// Summarise `rows` using the column mapping from `result`. Pass
    /// `&result.rows` for the unfiltered view.
    pub fn build(result: &ParseResult, rows: &[Row]) -> Self {
        let profession = result.column("Profession");
        let q4 = result.column("Q4");
        let timestamp = result.column("Timestamp");

        Self {
            total_responses: rows.len(),
            top_profession: profession
                .map(|col| aggregate::mode_value(rows, col))
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            satisfaction_percent: aggregate::satisfaction(
                rows,
                result.column("Q10"),
                result.column("Q11"),
            ),
            profession_distribution: profession
                .map(|col| aggregate::distribution(rows, col))
                .unwrap_or_default(),
            q4_distribution: q4
                .map(|col| aggregate::distribution(rows, col))
                .unwrap_or_default(),
            responses_over_time: timestamp
                .map(|col| aggregate::responses_over_time(rows, col))
                .unwrap_or_default(),
            warnings: result.warnings.clone(),
        }
    }
}
