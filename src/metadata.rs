use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fs, path::Path};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

pub const META_FILE: &str = "mod.json";

/// Sidecar metadata stored as `mod.json` inside each mod folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_url: Option<String>,
    /// File name of the preview image, relative to the mod folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Keys written by other tools, carried through every rewrite.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModMeta {
    pub fn for_folder(folder: &str) -> Self {
        Self {
            name: folder.to_string(),
            enabled: Some(true),
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }
}

/// Fields a caller wants to change; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModMetaPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub update_url: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl ModMetaPatch {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    fn apply(self, meta: &mut ModMeta) {
        if let Some(name) = self.name {
            meta.name = name;
        }
        overwrite(&mut meta.version, self.version);
        overwrite(&mut meta.author, self.author);
        overwrite(&mut meta.description, self.description);
        overwrite(&mut meta.page_url, self.page_url);
        overwrite(&mut meta.update_url, self.update_url);
        overwrite(&mut meta.image, self.image);
        if self.enabled.is_some() {
            meta.enabled = self.enabled;
        }
    }
}

fn overwrite(slot: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value {
        *slot = Some(value);
    }
}

/// Reads `mod.json`, falling back to a default named after the folder.
pub fn read_mod_meta(dir: &Path) -> ModMeta {
    let folder = dir
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    match try_read_mod_meta(dir) {
        Some(mut meta) => {
            if meta.name.trim().is_empty() {
                meta.name = folder;
            }
            meta
        }
        None => ModMeta::for_folder(&folder),
    }
}

/// The sidecar as stored; `None` when it is missing or not a JSON object.
pub fn try_read_mod_meta(dir: &Path) -> Option<ModMeta> {
    let raw = fs::read_to_string(dir.join(META_FILE)).ok()?;
    match serde_json::from_str(&raw) {
        Ok(meta) => Some(meta),
        Err(err) => {
            tracing::debug!("ignoring unreadable {META_FILE} in {dir:?}: {err}");
            None
        }
    }
}

/// Merges `patch` over the stored metadata and writes the result.
///
/// `createdAt` is kept once set, `updatedAt` is always bumped and a missing
/// `enabled` flag defaults to true.
pub fn write_mod_meta(dir: &Path, patch: ModMetaPatch) -> Result<ModMeta> {
    let now = now_rfc3339();
    let mut merged = read_mod_meta(dir);
    patch.apply(&mut merged);
    if merged.created_at.is_none() {
        merged.created_at = Some(now.clone());
    }
    merged.updated_at = Some(now);
    if merged.enabled.is_none() {
        merged.enabled = Some(true);
    }

    fs::create_dir_all(dir).context("create mod dir")?;
    let raw = serde_json::to_string_pretty(&merged).context("serialize mod.json")?;
    fs::write(dir.join(META_FILE), raw).context("write mod.json")?;
    Ok(merged)
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_sidecar_defaults_to_folder_name() {
        let dir = TempDir::new().unwrap();
        let mod_dir = dir.path().join("Cool Outfit");
        fs::create_dir_all(&mod_dir).unwrap();
        let meta = read_mod_meta(&mod_dir);
        assert_eq!(meta.name, "Cool Outfit");
        assert_eq!(meta.enabled, Some(true));
        assert!(meta.created_at.is_none());
    }

    #[test]
    fn write_merges_and_keeps_created_at() {
        let dir = TempDir::new().unwrap();
        let mod_dir = dir.path().join("m");

        let first = write_mod_meta(
            &mod_dir,
            ModMetaPatch {
                name: Some("m".to_string()),
                author: Some("Ann".to_string()),
                ..ModMetaPatch::default()
            },
        )
        .unwrap();
        assert_eq!(first.enabled, Some(true));
        let created = first.created_at.clone().unwrap();

        let second = write_mod_meta(
            &mod_dir,
            ModMetaPatch {
                version: Some("1.2".to_string()),
                enabled: Some(false),
                ..ModMetaPatch::default()
            },
        )
        .unwrap();
        assert_eq!(second.author.as_deref(), Some("Ann"));
        assert_eq!(second.version.as_deref(), Some("1.2"));
        assert_eq!(second.enabled, Some(false));
        assert_eq!(second.created_at.as_deref(), Some(created.as_str()));
        assert!(second.updated_at.is_some());
        assert_eq!(try_read_mod_meta(&mod_dir), Some(second));
    }

    #[test]
    fn sidecar_uses_camel_case_keys() {
        let dir = TempDir::new().unwrap();
        let meta = write_mod_meta(
            dir.path(),
            ModMetaPatch {
                name: Some("x".to_string()),
                page_url: Some("https://example.com".to_string()),
                ..ModMetaPatch::default()
            },
        )
        .unwrap();
        let raw = fs::read_to_string(dir.path().join(META_FILE)).unwrap();
        assert!(raw.contains("\"pageUrl\""));
        assert!(raw.contains("\"createdAt\""));
        assert_eq!(meta.page_url.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn nameless_sidecar_keeps_stored_fields_and_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let mod_dir = dir.path().join("Swimsuit");
        fs::create_dir_all(&mod_dir).unwrap();
        fs::write(
            mod_dir.join(META_FILE),
            r#"{"enabled":false,"pageUrl":"https://x.test","createdAt":"2020-01-01T00:00:00Z","custom":1}"#,
        )
        .unwrap();

        let meta = read_mod_meta(&mod_dir);
        assert_eq!(meta.name, "Swimsuit");
        assert_eq!(meta.enabled, Some(false));
        assert_eq!(meta.page_url.as_deref(), Some("https://x.test"));

        let written = write_mod_meta(
            &mod_dir,
            ModMetaPatch {
                version: Some("2".to_string()),
                ..ModMetaPatch::default()
            },
        )
        .unwrap();
        assert_eq!(written.enabled, Some(false));
        assert_eq!(written.created_at.as_deref(), Some("2020-01-01T00:00:00Z"));

        let raw: Value =
            serde_json::from_str(&fs::read_to_string(mod_dir.join(META_FILE)).unwrap()).unwrap();
        assert_eq!(raw["pageUrl"], "https://x.test");
        assert_eq!(raw["createdAt"], "2020-01-01T00:00:00Z");
        assert_eq!(raw["custom"], 1);
        assert_eq!(raw["version"], "2");
        assert_eq!(raw["enabled"], false);
    }
}
