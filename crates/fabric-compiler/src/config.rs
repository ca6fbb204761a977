//! Analysis options.

use serde::Deserialize;

use crate::error::ConfigError;

/// Settings for one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Whether the analysed unit is a file's top-level scope.
    pub top_level: bool,
    /// Number of type-specialised branches in one scope above which a
    /// dispatch warning is issued.
    pub dispatch_path_limit: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            top_level: true,
            dispatch_path_limit: 200,
        }
    }
}

impl AnalysisOptions {
    /// Parse options from JSON. Missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = AnalysisOptions::default();
        assert!(options.top_level);
        assert_eq!(options.dispatch_path_limit, 200);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options = AnalysisOptions::from_json(r#"{ "dispatch_path_limit": 8 }"#).unwrap();
        assert_eq!(options.dispatch_path_limit, 8);
        assert!(options.top_level);
    }

    #[test]
    fn test_invalid_json() {
        assert!(AnalysisOptions::from_json("{ top_level: ").is_err());
    }
}
