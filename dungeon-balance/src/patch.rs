//! Durable, named configuration patches.
//!
//! A patch is one JSON document `{ "metadata": {...}, "config": {...} }`
//! stored as `<patch id>.json` in the patch directory.
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::analysis::Snapshot;
use crate::config::TuningConfig;
use crate::constants::{GAME_VERSION, PATCH_EXTENSION};
use crate::error::{EngineError, EngineResult};
use crate::store::write_atomically;

/// Summary of the last simulation run before the patch was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultSummary {
    pub average_win_rate: f64,
    pub average_turns: f64,
    pub quality_score: f64,
    pub battles_tested: u64,
    pub test_date: DateTime<Utc>,
}

impl TestResultSummary {
    #[must_use]
    pub fn from_snapshot(snapshot: &Snapshot, test_date: DateTime<Utc>) -> Self {
        Self {
            average_win_rate: snapshot.report.overall.win_rate,
            average_turns: snapshot.report.overall.average_turns,
            quality_score: snapshot.score.overall,
            battles_tested: snapshot.report.overall.total_battles,
            test_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchMetadata {
    pub patch_id: String,
    pub name: String,
    pub author: String,
    pub description: String,
    pub version: String,
    pub created_date: DateTime<Utc>,
    #[serde(default = "PatchMetadata::default_game_version")]
    pub compatible_game_version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub test_results: Option<TestResultSummary>,
}

impl PatchMetadata {
    fn default_game_version() -> String {
        GAME_VERSION.to_string()
    }
}

/// Fields a caller supplies when saving a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchDraft {
    pub name: String,
    pub author: String,
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub metadata: PatchMetadata,
    pub config: TuningConfig,
}

/// Filesystem-safe id derived from name and version.
#[must_use]
pub fn patch_id(name: &str, version: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_matches('-');
    let key = format!("{}|{version}", name.trim().to_lowercase());
    let hash = XxHash64::oneshot(0, key.as_bytes());
    format!("{slug}-{:08x}", hash >> 32)
}

impl Patch {
    /// Build a patch from a draft, stamping id, date and game version.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the name or version is blank or the
    /// configuration is out of range.
    pub fn create(
        draft: PatchDraft,
        config: TuningConfig,
        test_results: Option<TestResultSummary>,
        created_date: DateTime<Utc>,
    ) -> EngineResult<Self> {
        if draft.name.trim().is_empty() {
            return Err(EngineError::validation("name", "patch name must not be empty"));
        }
        if draft.version.trim().is_empty() {
            return Err(EngineError::validation("version", "patch version must not be empty"));
        }
        config.validate()?;
        Ok(Self {
            metadata: PatchMetadata {
                patch_id: patch_id(&draft.name, &draft.version),
                name: draft.name.trim().to_string(),
                author: draft.author,
                description: draft.description,
                version: draft.version,
                created_date,
                compatible_game_version: GAME_VERSION.to_string(),
                tags: draft.tags,
                test_results,
            },
            config,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PatchStore {
    dir: PathBuf,
}

impl PatchStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{PATCH_EXTENSION}"))
    }

    fn read(path: &Path) -> EngineResult<Patch> {
        let raw = fs::read_to_string(path).map_err(|err| EngineError::io(path, err))?;
        let patch: Patch = serde_json::from_str(&raw)?;
        Ok(patch)
    }

    fn all(&self) -> EngineResult<Vec<Patch>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|err| EngineError::io(&self.dir, err))?;
        let mut patches = Vec::new();
        for entry in entries {
            let path = entry.map_err(|err| EngineError::io(&self.dir, err))?.path();
            let is_patch = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(PATCH_EXTENSION));
            let hidden = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with('.'));
            if !is_patch || hidden {
                continue;
            }
            match Self::read(&path) {
                Ok(patch) => patches.push(patch),
                Err(err) => log::warn!("skipping unreadable patch {}: {err}", path.display()),
            }
        }
        patches.sort_by(|a, b| {
            b.metadata
                .created_date
                .cmp(&a.metadata.created_date)
                .then_with(|| a.metadata.name.cmp(&b.metadata.name))
        });
        Ok(patches)
    }

    /// Write `patch`, replacing an earlier save with the same id.
    ///
    /// # Errors
    ///
    /// Returns a validation error when another patch already uses the same
    /// name, and an I/O error if the file cannot be written.
    pub fn save(&self, patch: &Patch) -> EngineResult<PathBuf> {
        let clash = self.all()?.into_iter().find(|existing| {
            existing.metadata.name.eq_ignore_ascii_case(&patch.metadata.name)
                && existing.metadata.patch_id != patch.metadata.patch_id
        });
        if let Some(existing) = clash {
            return Err(EngineError::validation(
                "name",
                format!(
                    "patch name '{}' is already used by {}",
                    patch.metadata.name, existing.metadata.patch_id
                ),
            ));
        }
        let path = self.path_for(&patch.metadata.patch_id);
        let body = serde_json::to_string_pretty(patch)?;
        write_atomically(&path, body.as_bytes())?;
        log::info!(
            "saved patch {} ({}) to {}",
            patch.metadata.name,
            patch.metadata.patch_id,
            path.display()
        );
        Ok(path)
    }

    /// Metadata of every readable patch, newest first.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be read.
    pub fn list(&self) -> EngineResult<Vec<PatchMetadata>> {
        Ok(self.all()?.into_iter().map(|patch| patch.metadata).collect())
    }

    /// Look a patch up by id, or by name ignoring case.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when nothing matches.
    pub fn get(&self, key: &str) -> EngineResult<Patch> {
        let direct = self.path_for(key);
        if direct.is_file() {
            return Self::read(&direct);
        }
        self.all()?
            .into_iter()
            .find(|patch| {
                patch.metadata.patch_id == key || patch.metadata.name.eq_ignore_ascii_case(key)
            })
            .ok_or_else(|| EngineError::not_found("patch", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::TimeZone;

    fn temp_dir(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "dungeon-balance-patches-{label}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    fn draft(name: &str, version: &str) -> PatchDraft {
        PatchDraft {
            name: name.to_string(),
            author: "tester".to_string(),
            description: "unit test patch".to_string(),
            version: version.to_string(),
            tags: vec!["test".to_string()],
        }
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0)
            .single()
            .expect("valid date")
    }

    #[test]
    fn ids_are_stable_and_file_safe() {
        let id = patch_id("Harder Brutes!", "1.2");
        assert_eq!(id, patch_id("Harder Brutes!", "1.2"));
        assert_ne!(id, patch_id("Harder Brutes!", "1.3"));
        assert!(id.starts_with("harder-brutes-"));
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn save_list_and_get_round_trip() {
        let store = PatchStore::new(temp_dir("roundtrip"));
        let mut config = TuningConfig::default();
        config.enemy.global_multipliers.health = 1.2;
        let older = Patch::create(draft("Older", "1.0"), TuningConfig::default(), None, at(1))
            .expect("older");
        let newer = Patch::create(draft("Newer", "1.0"), config.clone(), None, at(2))
            .expect("newer");
        store.save(&older).expect("save older");
        let path = store.save(&newer).expect("save newer");
        assert!(path.ends_with(format!("{}.json", newer.metadata.patch_id)));

        let listed = store.list().expect("list");
        let names: Vec<&str> = listed.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Newer", "Older"]);

        let by_name = store.get("newer").expect("case-insensitive name");
        assert_eq!(by_name.config, config);
        let by_id = store.get(&older.metadata.patch_id).expect("id");
        assert_eq!(by_id.metadata.name, "Older");
    }

    #[test]
    fn document_layout_has_metadata_and_config_blocks() {
        let patch = Patch::create(draft("Layout", "2.0"), TuningConfig::default(), None, at(3))
            .expect("patch");
        let value = serde_json::to_value(&patch).expect("json");
        assert!(value.get("metadata").is_some());
        assert!(value["config"]["enemy"]["globalMultipliers"].is_object());
        assert_eq!(value["metadata"]["compatibleGameVersion"], GAME_VERSION);
    }

    #[test]
    fn duplicate_names_with_new_versions_are_rejected() {
        let store = PatchStore::new(temp_dir("dupe"));
        let first = Patch::create(draft("Same", "1.0"), TuningConfig::default(), None, at(1))
            .expect("first");
        store.save(&first).expect("save");
        store.save(&first).expect("re-saving the same id overwrites");
        let second = Patch::create(draft("same", "2.0"), TuningConfig::default(), None, at(2))
            .expect("second");
        let err = store.save(&second).expect_err("name clash");
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn missing_patch_is_not_found() {
        let store = PatchStore::new(temp_dir("missing"));
        let err = store.get("nope").expect_err("empty dir");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn blank_names_are_invalid() {
        let err = Patch::create(draft("  ", "1.0"), TuningConfig::default(), None, at(1))
            .expect_err("blank");
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }
}
