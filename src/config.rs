//! INI-style configuration loader
//!
//! Sections in brackets, `key = value` entries, `#` comments, surrounding
//! whitespace trimmed. The loader is lenient: lines that are neither a
//! section header nor a key/value pair are skipped, as are entries before
//! the first section. Values are plain strings; [`Config::get_parsed`]
//! converts on demand.
//!
//! ```text
//! [ssl]
//! host = localhost
//! port = 8443
//! cert = server.crt
//! key = server.key
//!
//! [log]
//! level = debug
//! ```

use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing key [{section}] {key}")]
    MissingKey { section: String, key: String },

    #[error("invalid value for [{section}] {key}: {value}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

#[derive(Debug, Clone)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

/// Parsed configuration file
#[derive(Debug, Clone, Default)]
pub struct Config {
    sections: Vec<Section>,
}

impl Config {
    /// Load and parse a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Parse configuration text
    pub fn parse(text: &str) -> Self {
        let mut config = Config::default();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                config.sections.push(Section {
                    name: name.trim().to_string(),
                    entries: Vec::new(),
                });
                continue;
            }

            let Some(section) = config.sections.last_mut() else {
                continue;
            };
            if let Some((key, value)) = line.split_once('=') {
                section
                    .entries
                    .push((key.trim().to_string(), value.trim().to_string()));
            }
        }

        config
    }

    /// Look up a value by section and key
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .filter(|s| s.name == section)
            .flat_map(|s| s.entries.iter())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Look up a mandatory value
    pub fn require(&self, section: &str, key: &str) -> Result<&str, ConfigError> {
        self.get(section, key).ok_or_else(|| ConfigError::MissingKey {
            section: section.to_string(),
            key: key.to_string(),
        })
    }

    /// Look up and convert a mandatory value
    pub fn get_parsed<T: FromStr>(&self, section: &str, key: &str) -> Result<T, ConfigError> {
        let value = self.require(section, key)?;
        value.parse().map_err(|_| ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}
