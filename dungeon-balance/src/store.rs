//! Shared, copy-on-read configuration store.
//!
//! Simulations take an [`Arc`] snapshot at call start and never observe a
//! later write. Writers clone the current configuration, mutate the clone,
//! validate it and only then swap it in, so a rejected change is never
//! visible.

use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, TuningConfig};
use crate::error::{EngineError, EngineResult};

/// Old and new value of a single written leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterChange {
    pub parameter: String,
    pub old_value: f64,
    pub new_value: f64,
}

#[derive(Debug)]
struct Versioned {
    config: Arc<TuningConfig>,
    revision: u64,
}

#[derive(Debug)]
pub struct ConfigStore {
    inner: RwLock<Versioned>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::from_valid(TuningConfig::default())
    }
}

impl ConfigStore {
    /// Wrap a configuration after validating it.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the configuration is out of range.
    pub fn new(config: TuningConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: TuningConfig) -> Self {
        Self {
            inner: RwLock::new(Versioned {
                config: Arc::new(config),
                revision: 0,
            }),
        }
    }

    /// Load the canonical document at `path`, writing defaults there when it
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read or created, and a
    /// validation error when the document is malformed or out of range.
    pub fn load_or_default(path: &Path) -> EngineResult<Self> {
        if !path.exists() {
            log::info!("no configuration at {}, writing defaults", path.display());
            let store = Self::default();
            store.save_to(path)?;
            return Ok(store);
        }
        let raw = fs::read_to_string(path).map_err(|err| EngineError::io(path, err))?;
        let config = TuningConfig::from_json_str(&raw)?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(Self::from_valid(config))
    }

    /// Overwrite the canonical document at `path` with the live configuration.
    ///
    /// # Errors
    ///
    /// Returns an I/O or serialization error; the previous file is left in
    /// place when writing fails.
    pub fn save_to(&self, path: &Path) -> EngineResult<()> {
        let raw = self.snapshot().to_json_string()?;
        write_atomically(path, raw.as_bytes())
    }

    /// Immutable view of the configuration as of this call.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TuningConfig> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard.config)
    }

    /// Number of successful writes since the store was created.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .revision
    }

    /// Apply `mutate` to a copy and swap it in if the result validates.
    ///
    /// # Errors
    ///
    /// Returns the closure's error or the validation error; the live
    /// configuration is unchanged in both cases.
    pub fn update<T>(
        &self,
        mutate: impl FnOnce(&mut TuningConfig) -> Result<T, ConfigError>,
    ) -> EngineResult<T> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut candidate = TuningConfig::clone(&guard.config);
        let value = mutate(&mut candidate)?;
        candidate.validate()?;
        guard.config = Arc::new(candidate);
        guard.revision += 1;
        Ok(value)
    }

    /// Write a single leaf.
    ///
    /// # Errors
    ///
    /// Returns an unknown-path or validation error without changing state.
    pub fn set_parameter(&self, path: &str, value: f64) -> EngineResult<ParameterChange> {
        let old_value = self.update(|config| config.set(path, value))?;
        log::debug!("{path}: {old_value} -> {value}");
        Ok(ParameterChange {
            parameter: path.to_string(),
            old_value,
            new_value: value,
        })
    }

    /// Swap in a whole configuration, e.g. from a patch.
    ///
    /// # Errors
    ///
    /// Returns a validation error and keeps the current configuration when
    /// `config` is invalid.
    pub fn replace(&self, config: TuningConfig) -> EngineResult<()> {
        self.update(move |current| {
            *current = config;
            Ok(())
        })
    }
}

/// Write `contents` next to `path` and rename it into place.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> EngineResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| EngineError::io(parent, err))?;
    }
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            EngineError::validation("path", format!("{} has no file name", path.display()))
        })?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&temp, contents).map_err(|err| EngineError::io(&temp, err))?;
    fs::rename(&temp, path).map_err(|err| {
        let _ = fs::remove_file(&temp);
        EngineError::io(path, err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn temp_path(label: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "dungeon-balance-store-{label}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    #[test]
    fn snapshots_do_not_see_later_writes() {
        let store = ConfigStore::default();
        let before = store.snapshot();
        store
            .set_parameter("enemy.globalMultipliers.health", 1.4)
            .expect("valid write");
        assert!((before.enemy.global_multipliers.health - 1.0).abs() < f64::EPSILON);
        assert!((store.snapshot().enemy.global_multipliers.health - 1.4).abs() < f64::EPSILON);
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn rejected_update_keeps_state_and_revision() {
        let store = ConfigStore::default();
        let err = store
            .set_parameter("loot.dropChance", 2.0)
            .expect_err("probability above one");
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!((store.snapshot().loot.drop_chance - 0.6).abs() < f64::EPSILON);
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn replace_validates_whole_config() {
        let store = ConfigStore::default();
        let mut broken = TuningConfig::default();
        broken.weapons.types.clear();
        assert!(store.replace(broken).is_err());
        assert_eq!(*store.snapshot(), TuningConfig::default());
    }

    #[test]
    fn load_or_default_creates_and_reloads_document() {
        let path = temp_path("canonical").join("tuning.json");
        let store = ConfigStore::load_or_default(&path).expect("create defaults");
        assert!(path.exists());
        store
            .set_parameter("weapons.Mace.damage", 1.2)
            .expect("valid write");
        store.save_to(&path).expect("save");

        let reloaded = ConfigStore::load_or_default(&path).expect("reload");
        let mace = reloaded.snapshot().get("weapons.Mace.damage").expect("path");
        assert!((mace - 1.2).abs() < 1e-12);
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }
}
