/// Trim whitespace, then drop one leading and one trailing quote. Each end
/// is handled on its own, so `"Name` and `Email"` both come out bare.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = trimmed.strip_prefix('"').unwrap_or(trimmed);
    unquoted.strip_suffix('"').unwrap_or(unquoted).to_string()
}

/// Canonical form used for every header comparison: trimmed, lower-cased,
/// internal whitespace runs collapsed to a single space.
pub fn normalize_header(header: &str) -> String {
    header
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Columns whose cells go through the timestamp normalizer.
pub fn is_timestamp_header(header: &str) -> bool {
    normalize_header(header).contains("timestamp")
}
