use serde::{Deserialize, Serialize};

/// Name of the settings section the editor sends the configuration under.
pub const SETTINGS_SECTION: &str = "doiuse";

/// Diagnostic severity, ordered from most to least urgent.
///
/// The ordering matches the protocol's numeric severities (Error = 1,
/// Warning = 2, Information = 3), so `severity <= threshold` keeps
/// everything at least as urgent as the threshold.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    #[serde(alias = "error")]
    Error,
    #[default]
    #[serde(alias = "warning", alias = "warn")]
    Warning,
    #[serde(alias = "information", alias = "info")]
    Information,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warning => "Warning",
            Self::Information => "Information",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When documents are revalidated after an edit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerMode {
    /// Revalidate on every content change.
    #[default]
    OnType,
    /// Revalidate only when the document is saved.
    OnSave,
}

/// Workspace validation settings.
///
/// Deserialized from the editor configuration:
/// ```json
/// {
///   "enable": true,
///   "messageLevel": "Warning",
///   "browsers": ["ie >= 9"],
///   "ignore": ["rem"],
///   "ignoreFiles": ["**/*.min.css"],
///   "run": "onType"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidationSettings {
    #[serde(rename = "enable")]
    pub enabled: bool,

    /// Least urgent severity that is still published.
    pub message_level: Severity,

    /// Explicit browserslist queries. When non-empty they override any
    /// declaration discovered on disk.
    pub browsers: Vec<String>,

    /// Feature identifiers the engine should not report.
    #[serde(rename = "ignore")]
    pub ignore_features: Vec<String>,

    /// Globs, relative to the workspace root, of files that are never validated.
    #[serde(rename = "ignoreFiles")]
    pub ignore_file_globs: Vec<String>,

    #[serde(rename = "run")]
    pub trigger: TriggerMode,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            message_level: Severity::Warning,
            browsers: Vec::new(),
            ignore_features: Vec::new(),
            ignore_file_globs: Vec::new(),
            trigger: TriggerMode::OnType,
        }
    }
}

impl ValidationSettings {
    /// Parse settings from an editor configuration payload.
    ///
    /// Accepts either the settings object itself or an object wrapping it
    /// under the `doiuse` section. `null` yields the defaults.
    pub fn from_json(value: serde_json::Value) -> crate::Result<Self> {
        let value = match value {
            serde_json::Value::Null => return Ok(Self::default()),
            serde_json::Value::Object(mut map) => match map.remove(SETTINGS_SECTION) {
                Some(section) => section,
                None => serde_json::Value::Object(map),
            },
            other => other,
        };

        if value.is_null() {
            return Ok(Self::default());
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Whether the browser targets come from the settings rather than from disk.
    #[must_use]
    pub fn has_explicit_browsers(&self) -> bool {
        !self.browsers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let settings = ValidationSettings::default();
        assert!(!settings.enabled);
        assert_eq!(settings.message_level, Severity::Warning);
        assert!(settings.browsers.is_empty());
        assert_eq!(settings.trigger, TriggerMode::OnType);
    }

    #[test]
    fn test_parse_full_settings() {
        let settings = ValidationSettings::from_json(json!({
            "enable": true,
            "messageLevel": "Error",
            "browsers": ["ie >= 9", "last 2 versions"],
            "ignore": ["rem", "css-gradients"],
            "ignoreFiles": ["**/*.min.css"],
            "run": "onSave"
        }))
        .unwrap();

        assert!(settings.enabled);
        assert_eq!(settings.message_level, Severity::Error);
        assert_eq!(settings.browsers, vec!["ie >= 9", "last 2 versions"]);
        assert_eq!(settings.ignore_features, vec!["rem", "css-gradients"]);
        assert_eq!(settings.ignore_file_globs, vec!["**/*.min.css"]);
        assert_eq!(settings.trigger, TriggerMode::OnSave);
        assert!(settings.has_explicit_browsers());
    }

    #[test]
    fn test_parse_wrapped_section() {
        let settings = ValidationSettings::from_json(json!({
            "doiuse": { "enable": true, "run": "onType" }
        }))
        .unwrap();

        assert!(settings.enabled);
        assert_eq!(settings.trigger, TriggerMode::OnType);
    }

    #[test]
    fn test_parse_partial_settings_fills_defaults() {
        let settings = ValidationSettings::from_json(json!({ "enable": true })).unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.message_level, Severity::Warning);
        assert!(!settings.has_explicit_browsers());
    }

    #[test]
    fn test_parse_null_is_default() {
        let settings = ValidationSettings::from_json(serde_json::Value::Null).unwrap();
        assert_eq!(settings, ValidationSettings::default());

        let settings = ValidationSettings::from_json(json!({ "doiuse": null })).unwrap();
        assert_eq!(settings, ValidationSettings::default());
    }

    #[test]
    fn test_lowercase_severity_alias() {
        let settings =
            ValidationSettings::from_json(json!({ "messageLevel": "information" })).unwrap();
        assert_eq!(settings.message_level, Severity::Information);
    }

    #[test]
    fn test_invalid_settings() {
        let result = ValidationSettings::from_json(json!({ "messageLevel": "Loud" }));
        assert!(matches!(result, Err(crate::ConfigError::Settings(_))));

        let result = ValidationSettings::from_json(json!({ "browsers": "ie >= 9" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error < Severity::Warning);
        assert!(Severity::Warning < Severity::Information);
    }
}
