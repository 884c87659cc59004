//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// How a placeholder appears in the statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderStyle {
    /// `?` (JDBC, MySQL, SQLite).
    #[default]
    Question,
    /// `$1`, `$2`, ... (PostgreSQL).
    Numbered,
}

impl FromStr for PlaceholderStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "question" | "?" => Ok(Self::Question),
            "numbered" | "$" => Ok(Self::Numbered),
            other => Err(format!("unknown placeholder style `{other}`")),
        }
    }
}

/// Render-time settings shared by every template an engine renders.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub placeholder_style: PlaceholderStyle,
    /// Treat a null loop source as empty for loops that do not say
    /// otherwise.
    pub nullable_on_foreach: bool,
    /// Collapse every whitespace run of the final statement to one space.
    pub shrink_whitespaces: bool,
    /// Bound as `_databaseId` for vendor-specific branches.
    pub database_id: Option<String>,
}

impl EngineConfig {
    /// Load configuration from `DYNSQL_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`; unset or unparsable values fall
    /// back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            placeholder_style: lookup("DYNSQL_PLACEHOLDER_STYLE")
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            nullable_on_foreach: lookup("DYNSQL_NULLABLE_ON_FOREACH")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(false),
            shrink_whitespaces: lookup("DYNSQL_SHRINK_WHITESPACES")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(false),
            database_id: lookup("DYNSQL_DATABASE_ID").filter(|s| !s.trim().is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        assert_eq!(EngineConfig::from_lookup(lookup(&[])), EngineConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("DYNSQL_PLACEHOLDER_STYLE", "Numbered"),
            ("DYNSQL_NULLABLE_ON_FOREACH", "true"),
            ("DYNSQL_SHRINK_WHITESPACES", " true "),
            ("DYNSQL_DATABASE_ID", "postgres"),
        ]));
        assert_eq!(config.placeholder_style, PlaceholderStyle::Numbered);
        assert!(config.nullable_on_foreach);
        assert!(config.shrink_whitespaces);
        assert_eq!(config.database_id.as_deref(), Some("postgres"));
    }

    #[test]
    fn unparsable_values_fall_back() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("DYNSQL_PLACEHOLDER_STYLE", "colon"),
            ("DYNSQL_NULLABLE_ON_FOREACH", "yes"),
            ("DYNSQL_DATABASE_ID", "  "),
        ]));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"placeholder_style": "numbered"}"#).unwrap();
        assert_eq!(config.placeholder_style, PlaceholderStyle::Numbered);
        assert!(!config.shrink_whitespaces);
        assert_eq!(config.database_id, None);
    }
}
