//! Scan profiles loaded from TOML and `name=value` assignments.
//!
//! ```toml
//! device = "flatbed"
//! output = "scan.png"
//! show_options = true
//!
//! [[options]]
//! name = "resolution"
//! value = 300
//!
//! [[options]]
//! name = "brightness"
//! auto = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::negotiator::{ConfigurationRequest, OptionRequest, Setting};
use crate::traits::{Result, ScanError, Value};

/// Destination used when neither the profile nor the command line names one.
pub const DEFAULT_OUTPUT: &str = "1.jpg";

/// A literal option value as written in TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ProfileValue {
    /// `true` / `false`.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Real(f64),
    /// String, coerced to the option's type when applied.
    Text(String),
}

/// One `[[options]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileOption {
    /// Option name.
    pub name: String,
    /// Explicit value.
    #[serde(default)]
    pub value: Option<ProfileValue>,
    /// Request the automatic value instead.
    #[serde(default)]
    pub auto: bool,
}

impl ProfileOption {
    fn to_request(&self) -> Result<OptionRequest> {
        let setting = match (&self.value, self.auto) {
            (None, true) => Setting::Auto,
            (Some(value), false) => match value {
                ProfileValue::Bool(v) => Setting::Value(Value::Bool(*v)),
                ProfileValue::Int(v) => Setting::Value(Value::Int(*v)),
                ProfileValue::Real(v) => Setting::Value(Value::Real(*v)),
                ProfileValue::Text(v) => Setting::Text(v.clone()),
            },
            (Some(_), true) => {
                return Err(ScanError::Config(format!(
                    "option {} sets both value and auto",
                    self.name
                )))
            }
            (None, false) => {
                return Err(ScanError::Config(format!(
                    "option {} needs a value or auto = true",
                    self.name
                )))
            }
        };
        Ok(OptionRequest::new(&self.name, setting))
    }
}

/// Saved scan settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanProfile {
    /// Device identifier, exact or partial.
    #[serde(default)]
    pub device: Option<String>,
    /// Destination file.
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Print the option catalog before scanning.
    #[serde(default)]
    pub show_options: bool,
    /// Option requests, applied in order.
    #[serde(default)]
    pub options: Vec<ProfileOption>,
}

impl ScanProfile {
    /// Load a profile from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
            .map_err(|err| ScanError::Config(format!("{}: {err}", path.display())))
    }

    /// Parse a profile from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| ScanError::Config(err.to_string()))
    }

    /// The profile's option entries as a request.
    pub fn request(&self) -> Result<ConfigurationRequest> {
        self.options.iter().map(ProfileOption::to_request).collect()
    }
}

/// Parse a `name=value` assignment. The value is coerced when applied.
pub fn parse_assignment(text: &str) -> Result<OptionRequest> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| ScanError::Config(format!("expected name=value, got {text:?}")))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ScanError::Config(format!("missing option name in {text:?}")));
    }
    Ok(OptionRequest::new(name, Setting::Text(value.to_owned())))
}
