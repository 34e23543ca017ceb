//! Helpers shared across executors.

use regex::RegexBuilder;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::NodeError;

/// Case-insensitive glob match supporting `*` and `?`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let escaped = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    match RegexBuilder::new(&format!("^{escaped}$"))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}

/// Parse a node's raw config into its typed struct; `null`/absent becomes
/// the default.
pub fn parse_config<T>(config: &Value) -> Result<T, NodeError>
where
    T: DeserializeOwned + Default,
{
    if config.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(config.clone()).map_err(|e| NodeError::ConfigError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_star() {
        assert!(glob_match("Urg*", "Urgent"));
        assert!(glob_match("urg*", "URGENT"));
        assert!(glob_match("*.pdf", "invoice_2026.PDF"));
        assert!(!glob_match("Urg*", "Important"));
    }

    #[test]
    fn test_glob_question_mark() {
        assert!(glob_match("inv-?.pdf", "inv-1.pdf"));
        assert!(!glob_match("inv-?.pdf", "inv-12.pdf"));
    }

    #[test]
    fn test_glob_literal_with_regex_chars() {
        assert!(glob_match("a+b (final).pdf", "A+B (FINAL).pdf"));
        assert!(!glob_match("a+b", "aab"));
    }
}
