use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_CACHE_CAPACITY: usize = 5;
pub const DEFAULT_ENRICH_WORKERS: usize = 4;

/// The two roots the manager works against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mods_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images_root: Option<PathBuf>,
}

/// Location of `settings.json` on disk.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn default_location() -> Result<Self> {
        Ok(Self {
            path: base_data_dir()?.join("settings.json"),
        })
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable settings fall back to empty roots.
    pub fn load(&self) -> Settings {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return Settings::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!("ignoring corrupt settings at {:?}: {err}", self.path);
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        let parent = self.path.parent().context("settings parent")?;
        fs::create_dir_all(parent).context("create settings dir")?;
        let raw = serde_json::to_string_pretty(settings).context("serialize settings")?;
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, raw).context("write settings temp")?;
        if self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
        fs::rename(&temp, &self.path).context("finalize settings")?;
        Ok(())
    }
}

/// Tunables for the controller.
#[derive(Debug, Clone, Copy)]
pub struct ManagerOptions {
    pub cache_capacity: usize,
    pub workers: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            workers: DEFAULT_ENRICH_WORKERS,
        }
    }
}

fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("syleaf"))
}
