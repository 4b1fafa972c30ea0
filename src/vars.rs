//! Caller-supplied input variables.
//!
//! Values the user is expected to provide at call time (an account number,
//! a year) must not be chased through the capture. Fragments matching one of
//! these are bound to the variable and the search for a producer is skipped
//! entirely.

use crate::{RetraceError, RetraceResult};

/// Named values supplied by the caller, checked before any matcher work.
#[derive(Debug, Clone, Default)]
pub struct InputVariables {
    entries: Vec<(String, String)>,
}

impl InputVariables {
    /// Parses `KEY=VALUE` pairs as they arrive from the command line.
    ///
    /// # Errors
    ///
    /// Returns an error for a pair without `=` or with an empty key.
    pub fn parse_pairs<S: AsRef<str>>(pairs: &[S]) -> RetraceResult<Self> {
        let mut vars = Self::default();
        for pair in pairs {
            let pair = pair.as_ref();
            let Some((key, value)) = pair.split_once('=') else {
                return Err(RetraceError::invalid_input(format!(
                    "variable {pair:?} is not KEY=VALUE"
                )));
            };
            if key.is_empty() {
                return Err(RetraceError::invalid_input(format!(
                    "variable {pair:?} has an empty name"
                )));
            }
            vars.insert(key, value);
        }
        Ok(vars)
    }

    /// Adds one variable. Later insertions do not shadow earlier ones during
    /// lookup; the first matching variable wins.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Finds the variable covering a fragment value, if any.
    ///
    /// Exact value equality is checked across all variables first, then a
    /// trimmed case-insensitive pass. Returns the variable name.
    #[must_use]
    pub fn lookup(&self, fragment_value: &str) -> Option<&str> {
        if let Some((key, _)) = self
            .entries
            .iter()
            .find(|(_, value)| value == fragment_value)
        {
            return Some(key);
        }
        let wanted = fragment_value.trim();
        self.entries
            .iter()
            .find(|(_, value)| value.trim().eq_ignore_ascii_case(wanted))
            .map(|(key, _)| key.as_str())
    }

    /// True when no variables were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates variables in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_pairs() {
        let vars = InputVariables::parse_pairs(&["YEAR=2023", "ACCOUNT=a-1"]).expect("parse");
        assert_eq!(vars.lookup("2023"), Some("YEAR"));
        assert_eq!(vars.lookup("a-1"), Some("ACCOUNT"));
        assert_eq!(vars.lookup("2024"), None);
    }

    #[test]
    fn value_may_contain_equals() {
        let vars = InputVariables::parse_pairs(&["FILTER=a=b"]).expect("parse");
        assert_eq!(vars.lookup("a=b"), Some("FILTER"));
    }

    #[test]
    fn rejects_malformed_pairs() {
        assert!(InputVariables::parse_pairs(&["NOEQUALS"]).is_err());
        assert!(InputVariables::parse_pairs(&["=value"]).is_err());
    }

    #[test]
    fn exact_match_beats_normalized_match() {
        let mut vars = InputVariables::default();
        vars.insert("LOOSE", " ABC ");
        vars.insert("EXACT", "abc");
        assert_eq!(vars.lookup("abc"), Some("EXACT"));
        assert_eq!(vars.lookup("ABC"), Some("LOOSE"));
    }

    #[test]
    fn first_insertion_wins_on_ties() {
        let mut vars = InputVariables::default();
        vars.insert("FIRST", "7x");
        vars.insert("SECOND", "7x");
        assert_eq!(vars.lookup("7x"), Some("FIRST"));
    }
}
