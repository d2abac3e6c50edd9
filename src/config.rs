//! # Configuration Module
//!
//! Handles settings persistence, the app directory layout, and the auto-changer
//! interval presets.
//!
//! ## Storage
//! Everything lives in one app directory, `~/.framechanger/` by default
//! (override with `FRAMECHANGER_APP_DIR`):
//!
//! ```text
//! ~/.framechanger/
//! ├── settings.json                  # API key, last title, auto-changer settings
//! ├── titles.db                      # favorites list
//! ├── framechanger.log
//! └── MovieStillsWallpaperChanger/   # one cached image per title
//! ```
//!
//! ## API Key
//! `TMDB_API_KEY` in the environment wins over the stored key and is never
//! written back to disk.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ChangeError;

/// Environment variable that overrides the stored TMDB API key
pub const API_KEY_ENV_VAR: &str = "TMDB_API_KEY";

/// Environment variable that relocates the whole app directory
pub const APP_DIR_ENV_VAR: &str = "FRAMECHANGER_APP_DIR";

/// Returns the app directory (not created here).
pub fn app_dir() -> PathBuf {
    match std::env::var_os(APP_DIR_ENV_VAR) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".framechanger"),
    }
}

pub fn database_path() -> PathBuf {
    app_dir().join("titles.db")
}

pub fn settings_path() -> PathBuf {
    app_dir().join("settings.json")
}

pub fn image_dir() -> PathBuf {
    app_dir().join("MovieStillsWallpaperChanger")
}

pub fn log_path() -> PathBuf {
    app_dir().join("framechanger.log")
}

/// How often the auto-changer switches wallpapers.
///
/// Stored in settings by preset index (0..=8), the same order they are listed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoChangeInterval {
    pub label: &'static str,
    pub period: Duration,
}

const fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

/// All interval presets, shortest first.
pub const INTERVALS: &[AutoChangeInterval] = &[
    AutoChangeInterval { label: "1 Minute", period: minutes(1) },
    AutoChangeInterval { label: "5 Minutes", period: minutes(5) },
    AutoChangeInterval { label: "15 Minutes", period: minutes(15) },
    AutoChangeInterval { label: "30 Minutes", period: minutes(30) },
    AutoChangeInterval { label: "1 Hour", period: minutes(60) },
    AutoChangeInterval { label: "3 Hours", period: minutes(180) },
    AutoChangeInterval { label: "6 Hours", period: minutes(360) },
    AutoChangeInterval { label: "12 Hours", period: minutes(720) },
    AutoChangeInterval { label: "24 Hours", period: minutes(1440) },
];

/// Preset used when nothing (or something invalid) is stored: 3 hours
pub const DEFAULT_INTERVAL_INDEX: usize = 5;

impl AutoChangeInterval {
    /// Looks up a preset by index, falling back to the default for out-of-range values.
    pub fn from_index(index: usize) -> Self {
        INTERVALS
            .get(index)
            .copied()
            .unwrap_or(INTERVALS[DEFAULT_INTERVAL_INDEX])
    }
}

/// User settings.
///
/// Persisted to `settings.json` in the app directory. Every field has a
/// default so older or hand-edited files still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Stored TMDB API key (empty = none)
    pub api_key: String,
    /// Title of the wallpaper shown last, used to avoid immediate repeats
    pub last_title: String,
    /// Whether the daemon changes the wallpaper on a timer
    pub auto_changer_enabled: bool,
    /// Index into [`INTERVALS`]
    pub auto_changer_interval: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            last_title: String::new(),
            auto_changer_enabled: false,
            auto_changer_interval: DEFAULT_INTERVAL_INDEX,
        }
    }
}

impl Settings {
    /// Loads settings from `path`.
    ///
    /// A missing or unparseable file yields defaults, so the app always starts.
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    /// Writes settings to `path` as pretty JSON, creating the directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ChangeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ChangeError::Io(format!("failed to serialize settings: {e}")))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn interval(&self) -> AutoChangeInterval {
        AutoChangeInterval::from_index(self.auto_changer_interval)
    }
}

/// Settings as seen by the wallpaper pipeline.
///
/// A run reads one [`snapshot`](SettingsStore::snapshot) up front and works
/// from it; only the last shown title is written back.
pub trait SettingsStore: Send + Sync {
    /// The current settings, with `api_key` already resolved (environment
    /// first, then stored; empty when neither is set)
    fn snapshot(&self) -> Settings;
    /// Records the title shown last
    fn set_last_shown(&self, title: &str) -> Result<(), ChangeError>;
}

/// [`SettingsStore`] backed by `settings.json`.
///
/// Re-reads the file for every snapshot, so changes made by another process
/// (the CLI while the daemon runs) are picked up by the next run.
#[derive(Debug, Clone)]
pub struct JsonSettings {
    path: PathBuf,
}

impl JsonSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Settings {
        Settings::load_from(&self.path)
    }

    /// Loads, modifies and saves the settings file in one go.
    pub fn update(&self, change: impl FnOnce(&mut Settings)) -> Result<Settings, ChangeError> {
        let mut settings = self.load();
        change(&mut settings);
        settings.save_to(&self.path)?;
        Ok(settings)
    }

    /// The configured API key, if any (environment first, then stored)
    pub fn api_key(&self) -> Option<String> {
        let from_env = std::env::var(API_KEY_ENV_VAR).ok();
        pick_api_key(from_env, self.load().api_key)
    }
}

impl SettingsStore for JsonSettings {
    fn snapshot(&self) -> Settings {
        let mut settings = self.load();
        let from_env = std::env::var(API_KEY_ENV_VAR).ok();
        settings.api_key = pick_api_key(from_env, std::mem::take(&mut settings.api_key)).unwrap_or_default();
        settings
    }

    fn set_last_shown(&self, title: &str) -> Result<(), ChangeError> {
        self.update(|s| s.last_title = title.to_string()).map(|_| ())
    }
}

/// Environment key first, then the stored one; blank keys count as missing.
fn pick_api_key(from_env: Option<String>, stored: String) -> Option<String> {
    from_env
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .or_else(|| Some(stored.trim().to_string()).filter(|k| !k.is_empty()))
}

/// Supplies an API key when none is configured.
pub trait KeyProvider: Send + Sync {
    fn provide_key(&self) -> Option<String>;
}

/// Never supplies a key. Used by the daemon, which has nobody to ask.
pub struct NoKeyProvider;

impl KeyProvider for NoKeyProvider {
    fn provide_key(&self) -> Option<String> {
        None
    }
}

/// Asks for the key on the terminal and stores it in the settings file.
pub struct PromptKeyProvider {
    settings: JsonSettings,
}

impl PromptKeyProvider {
    pub fn new(settings: JsonSettings) -> Self {
        Self { settings }
    }
}

impl KeyProvider for PromptKeyProvider {
    fn provide_key(&self) -> Option<String> {
        use std::io::IsTerminal;

        if !std::io::stdin().is_terminal() {
            return None;
        }

        let key: String = dialoguer::Input::new()
            .with_prompt("Enter your TMDB API Key")
            .allow_empty(true)
            .interact_text()
            .ok()?;
        let key = key.trim().to_string();
        if key.is_empty() {
            return None;
        }

        if let Err(e) = self.settings.update(|s| s.api_key = key.clone()) {
            tracing::warn!("could not store API key: {e}");
        }
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.interval().label, "3 Hours");
    }

    #[test]
    fn corrupt_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn partial_file_keeps_known_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"api_key": "abc", "theme": "Dark"}"#).unwrap();
        let settings = Settings::load_from(&path);
        assert_eq!(settings.api_key, "abc");
        assert_eq!(settings.auto_changer_interval, DEFAULT_INTERVAL_INDEX);
    }

    #[test]
    fn last_shown_round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettings::new(dir.path().join("nested/settings.json"));
        assert_eq!(store.snapshot().last_title, "");
        store.set_last_shown("Fleabag").unwrap();
        assert_eq!(store.snapshot().last_title, "Fleabag");
        assert_eq!(JsonSettings::new(store.path()).load().last_title, "Fleabag");
    }

    #[test]
    fn environment_key_takes_precedence() {
        assert_eq!(pick_api_key(Some("env".into()), "stored".into()).as_deref(), Some("env"));
        assert_eq!(pick_api_key(Some("  ".into()), "stored".into()).as_deref(), Some("stored"));
        assert_eq!(pick_api_key(None, "".into()), None);
    }

    #[test]
    fn interval_presets() {
        assert_eq!(AutoChangeInterval::from_index(0).period, Duration::from_secs(60));
        assert_eq!(AutoChangeInterval::from_index(8).period, Duration::from_secs(86_400));
        assert_eq!(AutoChangeInterval::from_index(42), INTERVALS[DEFAULT_INTERVAL_INDEX]);
    }
}
