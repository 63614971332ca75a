//! Sectioned key/value configuration.
//!
//! Components that are configured by name (the voter reads `RECEIVERS` and
//! `VOTING_DELAY` from its own section) go through [`ConfigLookup`], so an
//! assembling application can back it with whatever store it likes.
//! [`Config`] is the bundled implementation over a TOML document:
//!
//! ```toml
//! [Voter]
//! RECEIVERS = ["Rx1", "Rx2", "Rx3"]
//! VOTING_DELAY = 200
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Read access to `section` / `key` string values.
pub trait ConfigLookup {
    fn get_value(&self, section: &str, key: &str) -> Option<String>;
}

/// An in-memory sectioned configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document.  Every top-level table is a section; scalar
    /// values are stored as strings and arrays are joined with `,`.
    pub fn parse(text: &str) -> Result<Self> {
        let table: toml::Table = text.parse()?;
        let mut config = Self::new();
        for (section, value) in table {
            let toml::Value::Table(entries) = value else {
                bail!("top-level key `{section}` is not inside a section");
            };
            for (key, value) in entries {
                match render(&value) {
                    Some(text) => config.set_value(&section, &key, text),
                    None => log::warn!("config: ignoring nested table {section}/{key}"),
                }
            }
        }
        Ok(config)
    }

    /// Load from a file.  A missing file yields an empty configuration.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn set_value(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_owned())
            .or_default()
            .insert(key.to_owned(), value.into());
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }
}

impl ConfigLookup for Config {
    fn get_value(&self, section: &str, key: &str) -> Option<String> {
        self.sections.get(section)?.get(key).cloned()
    }
}

fn render(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(items) => {
            let parts: Option<Vec<String>> = items.iter().map(render).collect();
            parts.map(|p| p.join(","))
        }
        toml::Value::Table(_) => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
