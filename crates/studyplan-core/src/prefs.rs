use std::fmt;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::keyvalue::{KeyValueStore, THEME_KEY};

pub const PREFS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggle(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => f.write_str("light"),
            Theme::Dark => f.write_str("dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_matches('"').to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(anyhow!("invalid theme: {other}")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PrefsDocument {
    version: u32,
    #[serde(default)]
    theme: Theme,
}

/// Missing or unreadable preferences fall back to the light theme.
#[tracing::instrument(skip(kv))]
pub fn load_theme<K: KeyValueStore>(kv: &K) -> Theme {
    let raw = match kv.get(THEME_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Theme::default(),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "failed reading theme; using default");
            return Theme::default();
        }
    };

    if let Ok(doc) = serde_json::from_str::<PrefsDocument>(&raw) {
        return doc.theme;
    }
    // Legacy form is the bare word.
    raw.parse().unwrap_or_else(|_| {
        warn!("malformed theme preference; using default");
        Theme::default()
    })
}

#[tracing::instrument(skip(kv))]
pub fn save_theme<K: KeyValueStore>(kv: &K, theme: Theme) -> anyhow::Result<()> {
    let doc = PrefsDocument {
        version: PREFS_SCHEMA_VERSION,
        theme,
    };
    let payload = serde_json::to_string(&doc)?;
    kv.set(THEME_KEY, &payload).context("failed to save theme")
}

pub fn toggle_theme<K: KeyValueStore>(kv: &K) -> anyhow::Result<Theme> {
    let next = load_theme(kv).toggle();
    save_theme(kv, next)?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyvalue::MemoryKeyValueStore;

    #[test]
    fn defaults_to_light_and_toggles() {
        let kv = MemoryKeyValueStore::new();
        assert_eq!(load_theme(&kv), Theme::Light);
        assert_eq!(toggle_theme(&kv).expect("toggle"), Theme::Dark);
        assert_eq!(load_theme(&kv), Theme::Dark);
        assert_eq!(kv.raw(THEME_KEY).as_deref(), Some(r#"{"version":1,"theme":"dark"}"#));
    }

    #[test]
    fn reads_legacy_and_malformed_values() {
        let legacy = MemoryKeyValueStore::with_entry(THEME_KEY, "dark");
        assert_eq!(load_theme(&legacy), Theme::Dark);

        let garbage = MemoryKeyValueStore::with_entry(THEME_KEY, "{\"theme\": 7}");
        assert_eq!(load_theme(&garbage), Theme::Light);
    }
}
