use crate::process::utils::normalize_header;

/// Resolve a logical field name against the headers a source actually has.
///
/// Exact match on normalized forms wins; otherwise the first header where
/// either normalized form contains the other. Iteration order decides
/// between several partial candidates.
pub fn match_header<'a>(logical: &str, available: &'a [String]) -> Option<&'a str> {
    let wanted = normalize_header(logical);
    let normalized: Vec<String> = available.iter().map(|h| normalize_header(h)).collect();

    if let Some(i) = normalized.iter().position(|h| *h == wanted) {
        return Some(available[i].as_str());
    }

    normalized
        .iter()
        .position(|h| wanted.contains(h.as_str()) || h.contains(wanted.as_str()))
        .map(|i| available[i].as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ignores_case_and_padding() {
        let h = headers(&["Name", "  Profession "]);
        assert_eq!(match_header("Profession", &h), Some("  Profession "));

        let h = headers(&["PROFESSION"]);
        assert_eq!(match_header("Profession", &h), Some("PROFESSION"));
    }

    #[test]
    fn exact_beats_earlier_partial() {
        let h = headers(&["Q10 Would you recommend us?", "Q1"]);
        assert_eq!(match_header("Q1", &h), Some("Q1"));
    }

    #[test]
    fn partial_match_either_direction() {
        let h = headers(&["Email Address"]);
        assert_eq!(match_header("Email", &h), Some("Email Address"));

        let h = headers(&["Time"]);
        assert_eq!(match_header("Timestamp", &h), Some("Time"));
    }

    #[test]
    fn first_partial_candidate_wins() {
        let h = headers(&["Q10 Satisfied?", "Q11 Issues?", "Q1"]);
        assert_eq!(match_header("Q1", &h), Some("Q1"));
        assert_eq!(match_header("Q", &h), Some("Q10 Satisfied?"));
    }

    #[test]
    fn no_match_is_none() {
        let h = headers(&["Name", "Email"]);
        assert_eq!(match_header("Profession", &h), None);
    }
}
