//! Control file loading
//!
//! The control file is a flat list of `key value` lines; `#` starts a comment
//! line. A `.yml`/`.yaml` file holding a flat mapping of the same keys is also
//! accepted.

use crate::core::config::ConfigError;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Raw key/value settings, before typing and validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    /// Load settings from a control file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        );
        let settings = if is_yaml {
            Self::from_yaml(&content)?
        } else {
            Self::parse(&content)
        };

        if settings.is_empty() {
            return Err(ConfigError::Empty(path.to_path_buf()));
        }
        Ok(settings)
    }

    /// Parse the `key value` control file format
    pub fn parse(text: &str) -> Self {
        let mut values = BTreeMap::new();
        for line in text.lines() {
            let mut tokens = line.split_whitespace();
            let Some(key) = tokens.next() else {
                continue;
            };
            if key.starts_with('#') {
                continue;
            }
            let value = tokens.next().unwrap_or_default();
            debug!("Applying setting ({}): {}", key, value);
            values.insert(key.to_string(), value.to_string());
        }
        Self { values }
    }

    /// Parse a flat YAML mapping of the same keys
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let mapping: BTreeMap<String, Value> = serde_yaml::from_str(yaml)?;
        let mut values = BTreeMap::new();
        for (key, value) in mapping {
            let rendered = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(true) => "1".to_string(),
                Value::Bool(false) => "0".to_string(),
                Value::Null => String::new(),
                other => {
                    return Err(ConfigError::Invalid {
                        key,
                        value: format!("{:?}", other),
                        reason: "expected a scalar value".to_string(),
                    })
                }
            };
            values.insert(key, rendered);
        }
        Ok(Self { values })
    }

    /// Look up a setting
    pub fn fetch(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Set or override a setting
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_file() {
        let text = "\
# Run settings
starttime 2018060100

rundays   1
runhours 6 trailing words are ignored
modeldata CFSv2
";
        let settings = Settings::parse(text);
        assert_eq!(settings.len(), 4);
        assert_eq!(settings.fetch("starttime"), Some("2018060100"));
        assert_eq!(settings.fetch("runhours"), Some("6"));
        assert_eq!(settings.fetch("missing"), None);
    }

    #[test]
    fn test_later_keys_override() {
        let settings = Settings::parse("debugmode 0\ndebugmode 1\n");
        assert_eq!(settings.fetch("debugmode"), Some("1"));
    }

    #[test]
    fn test_parse_yaml_mapping() {
        let yaml = r#"
starttime: "2018060100"
rundays: 1
debugmode: true
geogrid_walltime: "00:30:00"
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.fetch("starttime"), Some("2018060100"));
        assert_eq!(settings.fetch("rundays"), Some("1"));
        assert_eq!(settings.fetch("debugmode"), Some("1"));
        assert_eq!(settings.fetch("geogrid_walltime"), Some("00:30:00"));
    }

    #[test]
    fn test_yaml_rejects_nested_values() {
        let yaml = "wrfdir:\n  nested: true\n";
        assert!(Settings::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_empty_control_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.txt");
        std::fs::write(&path, "# only comments\n\n").unwrap();

        let err = Settings::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Empty(_)));
    }

    #[test]
    fn test_missing_control_file() {
        let err = Settings::from_file("/nonexistent/control.txt").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/control.txt"));
    }
}
