use crate::error::SurveyError;
use crate::process::raw_table::RawTable;
use crate::process::utils::clean_str;

/// Split delimited text into a header list and tokenized rows.
///
/// The first line (after trimming the whole content) is the header; every
/// later non-blank line is tokenized with `tokenize_line`. Rows whose cells
/// are all empty are dropped.
pub fn read_delimited(content: &str) -> Result<RawTable, SurveyError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(SurveyError::malformed("CSV file is empty"));
    }

    let mut lines = trimmed.lines();
    let headers: Vec<String> = lines
        .next()
        .map(|line| line.split(',').map(clean_str).collect())
        .unwrap_or_default();

    let rows = lines
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(tokenize_line)
        .filter(|cells| cells.iter().any(|c| !c.is_empty()))
        .collect();

    Ok(RawTable { headers, rows })
}

/// Comma-separated cells with double-quote escaping.
///
/// `"` toggles quoted state, except a `""` pair inside quotes which emits a
/// single literal quote. Commas only split outside quotes. Cells are trimmed.
pub fn tokenize_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => cells.push(finish_cell(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(finish_cell(&mut current));
    cells
}

fn finish_cell(current: &mut String) -> String {
    std::mem::take(current).trim().to_string()
}
