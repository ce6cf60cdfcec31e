//! Configuration loading for namelock.
//!
//! ```toml
//! [lock]
//! admins = ["1000000000001"]
//! debounce_window_ms = 8000
//! apply_delay_ms = 1000
//! correction_delay_ms = 1500
//! join_settle_delay_ms = 3000
//! admin_override = "cascade"
//!
//! [store]
//! path = "~/.namelock/nicknames.json"
//! ```
//!
//! Every field is optional. Raw structs stay here; callers get resolved
//! [`ReconcileSettings`] and a concrete store path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use namelock_types::settings::{
    DEFAULT_APPLY_DELAY, DEFAULT_CORRECTION_DELAY, DEFAULT_DEBOUNCE_WINDOW,
    DEFAULT_JOIN_SETTLE_DELAY,
};
use namelock_types::{AdminOverride, MemberId, ReconcileSettings};

/// Environment variable that points at an alternate config file.
pub const CONFIG_ENV_VAR: &str = "NAMELOCK_CONFIG";

const CONFIG_DIR: &str = ".namelock";
const CONFIG_FILE: &str = "config.toml";
const STORE_FILE: &str = "nicknames.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NamelockConfig {
    pub lock: Option<LockConfig>,
    pub store: Option<StoreConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LockConfig {
    /// Member ids whose nickname changes redefine the lock.
    #[serde(default)]
    pub admins: Vec<String>,
    pub debounce_window_ms: Option<u64>,
    pub apply_delay_ms: Option<u64>,
    pub correction_delay_ms: Option<u64>,
    pub join_settle_delay_ms: Option<u64>,
    /// "cascade" (default) or "record_only".
    pub admin_override: Option<AdminOverride>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StoreConfig {
    /// Location of the JSON policy document. `~/` is expanded.
    pub path: Option<String>,
}

impl NamelockConfig {
    /// Load from [`config_path`]. `Ok(None)` when no config file exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Resolve lock tuning, falling back to defaults for anything unset.
    #[must_use]
    pub fn reconcile_settings(&self) -> ReconcileSettings {
        let Some(lock) = self.lock.as_ref() else {
            return ReconcileSettings::default();
        };

        let millis_or = |value: Option<u64>, default: Duration| {
            value.map_or(default, Duration::from_millis)
        };

        ReconcileSettings {
            admins: lock
                .admins
                .iter()
                .map(|id| id.trim())
                .filter(|id| !id.is_empty())
                .map(MemberId::new)
                .collect(),
            debounce_window: millis_or(lock.debounce_window_ms, DEFAULT_DEBOUNCE_WINDOW),
            apply_delay: millis_or(lock.apply_delay_ms, DEFAULT_APPLY_DELAY),
            correction_delay: millis_or(lock.correction_delay_ms, DEFAULT_CORRECTION_DELAY),
            join_settle_delay: millis_or(lock.join_settle_delay_ms, DEFAULT_JOIN_SETTLE_DELAY),
            admin_override: lock.admin_override.unwrap_or_default(),
        }
    }

    /// Where the policy document lives: `[store] path` or
    /// `~/.namelock/nicknames.json`.
    #[must_use]
    pub fn store_path(&self) -> Option<PathBuf> {
        let configured = self
            .store
            .as_ref()
            .and_then(|store| store.path.as_deref())
            .map(str::trim)
            .filter(|path| !path.is_empty());

        match configured {
            Some(raw) => Some(expand_home(raw)),
            None => default_store_path(),
        }
    }
}

/// `$NAMELOCK_CONFIG` if set, else `~/.namelock/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(explicit));
    }
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
}

#[must_use]
pub fn default_store_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(STORE_FILE))
}

/// Directory holding config, store and logs (`~/.namelock`).
#[must_use]
pub fn data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR))
}

fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let config: NamelockConfig = toml::from_str("").unwrap();
        assert!(config.lock.is_none());
        assert!(config.store.is_none());
        assert_eq!(config.reconcile_settings(), ReconcileSettings::default());
    }

    #[test]
    fn parse_lock_config() {
        let toml_str = r#"
[lock]
admins = ["1000a", " 1000b ", ""]
debounce_window_ms = 5000
apply_delay_ms = 250
correction_delay_ms = 0
join_settle_delay_ms = 4000
admin_override = "record_only"
"#;
        let config: NamelockConfig = toml::from_str(toml_str).unwrap();
        let settings = config.reconcile_settings();
        assert_eq!(settings.admins.len(), 2);
        assert!(settings.admins.contains(&MemberId::new("1000b")));
        assert_eq!(settings.debounce_window, Duration::from_millis(5000));
        assert_eq!(settings.apply_delay, Duration::from_millis(250));
        assert_eq!(settings.correction_delay, Duration::ZERO);
        assert_eq!(settings.join_settle_delay, Duration::from_millis(4000));
        assert_eq!(settings.admin_override, AdminOverride::RecordOnly);
    }

    #[test]
    fn partial_lock_config_keeps_defaults() {
        let config: NamelockConfig = toml::from_str("[lock]\napply_delay_ms = 10\n").unwrap();
        let settings = config.reconcile_settings();
        assert_eq!(settings.apply_delay, Duration::from_millis(10));
        assert_eq!(settings.debounce_window, DEFAULT_DEBOUNCE_WINDOW);
        assert_eq!(settings.admin_override, AdminOverride::Cascade);
        assert!(settings.admins.is_empty());
    }

    #[test]
    fn unknown_admin_override_is_a_parse_error() {
        let result: Result<NamelockConfig, _> =
            toml::from_str("[lock]\nadmin_override = \"everyone\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn store_path_prefers_configured_value() {
        let config: NamelockConfig =
            toml::from_str("[store]\npath = \"/var/lib/namelock/state.json\"\n").unwrap();
        assert_eq!(
            config.store_path(),
            Some(PathBuf::from("/var/lib/namelock/state.json"))
        );
    }

    #[test]
    fn store_path_expands_home() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let config: NamelockConfig =
            toml::from_str("[store]\npath = \"~/locks/state.json\"\n").unwrap();
        assert_eq!(config.store_path(), Some(home.join("locks").join("state.json")));
    }

    #[test]
    fn load_from_missing_file_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = NamelockConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn load_from_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[lock\nadmins = ").expect("write");

        let err = NamelockConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.path(), path.as_path());
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn load_from_reads_valid_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[lock]\nadmins = [\"boss\"]\n").expect("write");

        let config = NamelockConfig::load_from(&path).unwrap().expect("present");
        assert!(
            config
                .reconcile_settings()
                .admins
                .contains(&MemberId::new("boss"))
        );
    }
}
