//! Configuration loading and validation.
//!
//! Settings are layered, later sources overriding earlier ones:
//!
//! 1. built-in defaults (platform data/cache directories),
//! 2. a TOML file (`longbox.toml` in the platform config directory, or an
//!    explicit path),
//! 3. environment variables prefixed `LONGBOX_` (nested keys separated by
//!    `__`, e.g. `LONGBOX_LIBRARY__SOURCE_ROOT`).
//!
//! Only the library source root has no default; everything else can be left
//! alone.

pub mod error;

use crate::error::{ErrorKind, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "longbox.toml";
const ENV_PREFIX: &str = "LONGBOX_";

/// Top-level application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub library: LibrarySettings,
    pub indexing: IndexingSettings,
}

/// Where the library lives on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibrarySettings {
    /// Root folder holding the comic archives. Required.
    pub source_root: PathBuf,
    /// Where catalog snapshots are written.
    pub index_root: PathBuf,
    /// Where extracted pages are cached.
    pub cache_root: PathBuf,
    /// Where rendered covers go. `None` disables cover extraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub covers_root: Option<PathBuf>,
    /// Where finished books are moved. `None` leaves them in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingSettings {
    /// Seconds between automatic reindexing runs.
    pub period_seconds: u64,
}

impl Settings {
    fn defaults() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "longbox").ok_or(ErrorKind::NoHome)?;
        Ok(Self {
            library: LibrarySettings {
                source_root: PathBuf::new(),
                index_root: dirs.data_dir().to_path_buf(),
                cache_root: dirs.cache_dir().join("pages"),
                covers_root: None,
                completed_root: None,
            },
            indexing: IndexingSettings { period_seconds: 3600 },
        })
    }

    fn default_file() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "longbox").ok_or(ErrorKind::NoHome)?;
        Ok(dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load settings from the default config file location and environment.
    ///
    /// # Errors
    /// [`ErrorKind::Load`] on unreadable or malformed sources,
    /// [`ErrorKind::Invalid`] when a semantic check fails.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_file()?)
    }

    /// Load settings from an explicit TOML file path and environment. The
    /// file is optional; defaults and environment alone can be enough.
    pub fn load_from(file: impl AsRef<Path>) -> Result<Self> {
        let file = file.as_ref();
        tracing::debug!(file = %file.display(), "Loading configuration");
        let settings: Settings = Figment::new()
            .merge(Serialized::defaults(Self::defaults()?))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ErrorKind::Load)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.library.source_root.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("library.source_root must be set".to_string()));
        }
        if self.indexing.period_seconds == 0 {
            exn::bail!(ErrorKind::Invalid("indexing.period_seconds must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rstest::rstest;

    fn load_isolated(toml: &str) -> Result<Settings> {
        // Jail confines Env/Toml lookups so the host environment and any real
        // config file never leak into the assertion.
        let mut result = None;
        figment::Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE, toml)?;
            result = Some(Settings::load_from(CONFIG_FILE));
            Ok(())
        });
        result.unwrap()
    }

    #[test]
    fn file_values_override_defaults() {
        let settings = load_isolated(
            r#"
            [library]
            source_root = "/srv/comics"
            index_root = "/var/lib/longbox"
            "#,
        )
        .unwrap();
        assert_eq!(settings.library.source_root, PathBuf::from("/srv/comics"));
        assert_eq!(settings.library.index_root, PathBuf::from("/var/lib/longbox"));
        assert_eq!(settings.indexing.period_seconds, 3600);
        assert!(settings.library.covers_root.is_none());
    }

    #[test]
    fn environment_overrides_the_file() {
        let mut result = None;
        figment::Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE, "[library]\nsource_root = \"/from/file\"")?;
            jail.set_env("LONGBOX_LIBRARY__SOURCE_ROOT", "/from/env");
            jail.set_env("LONGBOX_INDEXING__PERIOD_SECONDS", "60");
            result = Some(Settings::load_from(CONFIG_FILE));
            Ok(())
        });
        let settings = result.unwrap().unwrap();
        assert_eq!(settings.library.source_root, PathBuf::from("/from/env"));
        assert_eq!(settings.indexing.period_seconds, 60);
    }

    #[test]
    fn a_missing_file_is_fine_when_env_completes_the_picture() {
        let mut result = None;
        figment::Jail::expect_with(|jail| {
            jail.set_env("LONGBOX_LIBRARY__SOURCE_ROOT", "/srv/comics");
            result = Some(Settings::load_from("does-not-exist.toml"));
            Ok(())
        });
        assert!(result.unwrap().is_ok());
    }

    #[rstest]
    #[case::no_source_root("[indexing]\nperiod_seconds = 60")]
    #[case::zero_period("[library]\nsource_root = \"/srv\"\n[indexing]\nperiod_seconds = 0")]
    fn semantic_checks_reject_bad_settings(#[case] toml: &str) {
        let err = load_isolated(toml).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }
}
