//! User settings: lane display symbols, the backend convenience variables
//! the snapshot reads, and the anonymous-child recursion bound.

use lanescope_protocol::LaneSymbols;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::SnapshotExpressions;

pub const DEFAULT_MAX_ANONYMOUS_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("symbol setting `{key}` must be at most one character, got {value:?}")]
    Symbol { key: &'static str, value: String },
    #[error("invalid settings file: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    pub symbols: SymbolSettings,
    pub expressions: SnapshotExpressions,
    pub max_anonymous_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            symbols: SymbolSettings::default(),
            expressions: SnapshotExpressions::default(),
            max_anonymous_depth: DEFAULT_MAX_ANONYMOUS_DEPTH,
        }
    }
}

impl Settings {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Validated display symbols. Rejects any entry longer than one
    /// character so nothing unchecked reaches the renderers.
    pub fn lane_symbols(&self) -> Result<LaneSymbols, ConfigError> {
        Ok(LaneSymbols {
            active: symbol("active", &self.symbols.active)?,
            inactive: symbol("inactive", &self.symbols.inactive)?,
            hit: symbol("hit", &self.symbols.hit)?,
        })
    }
}

/// Raw symbol strings as entered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolSettings {
    pub active: String,
    pub inactive: String,
    pub hit: String,
}

impl Default for SymbolSettings {
    fn default() -> Self {
        let symbols = LaneSymbols::default();
        let text = |c: Option<char>| c.map(String::from).unwrap_or_default();
        Self {
            active: text(symbols.active),
            inactive: text(symbols.inactive),
            hit: text(symbols.hit),
        }
    }
}

fn symbol(key: &'static str, value: &str) -> Result<Option<char>, ConfigError> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Ok(None),
        (Some(c), None) => Ok(Some(c)),
        (Some(_), Some(_)) => Err(ConfigError::Symbol {
            key,
            value: value.to_string(),
        }),
    }
}
