//! Candidate-query extraction from free-form generator text
//!
//! Contract: locate the first `SELECT` statement that follows the
//! end-of-reasoning marker and end it at the next blank line (or the end of
//! the response). Everything else about the response is ignored.

use crate::error::{EvalError, EvalResult};
use regex::Regex;

/// Pulls one query out of a generator response
pub trait QueryExtractor: Send + Sync {
    /// Return the candidate query, or `None` if the response holds none
    fn extract(&self, response: &str) -> Option<String>;
}

/// Extracts the `SELECT` block after an end-of-reasoning marker
///
/// Matching is case-insensitive. When the marker occurs several times the
/// last occurrence wins, so reasoning that quotes the marker does not
/// confuse it. An optional Markdown fence around the statement is dropped.
#[derive(Debug, Clone)]
pub struct MarkerExtractor {
    pattern: Regex,
}

impl MarkerExtractor {
    /// Build an extractor for `marker` (e.g. `</think>`)
    pub fn new(marker: &str) -> EvalResult<Self> {
        let pattern = format!(
            r"(?is).*{}\s*(?:```(?:sql)?\s*)?(SELECT\s+.*?)(?:\s*```)?(?:\n\s*\n|$)",
            regex::escape(marker)
        );
        let pattern = Regex::new(&pattern).map_err(|e| EvalError::Extractor(e.to_string()))?;
        Ok(Self { pattern })
    }
}

impl QueryExtractor for MarkerExtractor {
    fn extract(&self, response: &str) -> Option<String> {
        self.pattern
            .captures(response)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|sql| !sql.is_empty())
    }
}

/// Reduce an engine error to the part worth feeding back.
///
/// Syntax errors that carry a `LINE n:` locator are cut down to the locator
/// and what follows it; any other message is returned whole.
pub fn condense_error(message: &str) -> String {
    use std::sync::OnceLock;

    static LOCATOR: OnceLock<Regex> = OnceLock::new();
    let locator = LOCATOR.get_or_init(|| {
        Regex::new(r"(?is)syntax\s*error.*?(LINE \d+:.*)").expect("valid regex literal")
    });

    locator
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end().to_string())
        .unwrap_or_else(|| message.to_string())
}
