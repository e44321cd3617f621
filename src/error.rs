// src/error.rs

use thiserror::Error;

/// Failures that end a fetch/parse cycle. None of these are fatal to the
/// feed; the next scheduled or manual refresh simply tries again.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SurveyError {
    /// Network failure or a non-success HTTP status.
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Content that cannot be turned into a table at all.
    #[error("malformed input: {0}")]
    MalformedInput(String),
}

impl SurveyError {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        SurveyError::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        SurveyError::MalformedInput(msg.into())
    }
}
