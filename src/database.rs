//! Per-character notes kept next to the character artwork.
//!
//! Each character owns `<images_root>/<character>/<character>.txt`, a JSON
//! document with the source URL of the artwork and a `mods` list carrying
//! page links and image origins per mod. Older files hold a bare URL instead
//! of JSON; those are read as `{ "url": <text> }`.

use crate::{
    download,
    error::ManagerError,
    images::{self, PreviewImage},
};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_file: Option<String>,
}

/// `Some("")` clears a field, `None` leaves it alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModEntryPatch {
    pub page_url: Option<String>,
    pub image_url: Option<String>,
}

/// A new `mods[]` entry; the image comes from `data_url` first, then `image_url`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewModEntry {
    pub page_url: Option<String>,
    pub image_url: Option<String>,
    pub data_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedModEntry {
    pub index: usize,
    pub image_file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterInfo {
    pub image_path: Option<PathBuf>,
    pub url: Option<String>,
}

/// The raw document; unknown keys (such as crop data) survive a rewrite.
#[derive(Debug, Clone, Default)]
pub struct CharacterRecord {
    doc: Map<String, Value>,
}

impl CharacterRecord {
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(doc)) => Self { doc },
            Ok(_) => Self::default(),
            Err(_) => {
                let mut doc = Map::new();
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    doc.insert("url".to_string(), Value::String(trimmed.to_string()));
                }
                Self { doc }
            }
        }
    }

    pub fn url(&self) -> Option<String> {
        non_empty_str(self.doc.get("url"))
    }

    pub fn set_url(&mut self, url: &str) {
        self.doc
            .insert("url".to_string(), Value::String(url.to_string()));
    }

    pub fn mods(&self) -> Vec<ModEntry> {
        self.doc
            .get("mods")
            .and_then(|v| v.as_array())
            .map(|entries| entries.iter().filter_map(parse_mod_entry).collect())
            .unwrap_or_default()
    }

    pub fn find_mod(&self, name: &str) -> Option<ModEntry> {
        self.mods().into_iter().find(|entry| entry.name == name)
    }

    pub fn upsert_mod(&mut self, name: &str, patch: ModEntryPatch) {
        let mods = self
            .doc
            .entry("mods".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !mods.is_array() {
            *mods = Value::Array(Vec::new());
        }
        let Some(list) = mods.as_array_mut() else {
            return;
        };

        let index = list.iter().position(|entry| {
            entry.get("name").and_then(|v| v.as_str()) == Some(name)
        });
        let index = match index {
            Some(index) => index,
            None => {
                let mut fresh = Map::new();
                fresh.insert("name".to_string(), Value::String(name.to_string()));
                list.push(Value::Object(fresh));
                list.len() - 1
            }
        };
        let Some(entry) = list[index].as_object_mut() else {
            return;
        };
        set_or_clear(entry, "pageUrl", patch.page_url);
        set_or_clear(entry, "imageUrl", patch.image_url);
    }

    /// Appends an entry without looking for an existing one of the same name.
    pub fn push_mod(&mut self, entry: &ModEntry) {
        let mut fresh = Map::new();
        fresh.insert("name".to_string(), Value::String(entry.name.clone()));
        let optional = [
            ("pageUrl", &entry.page_url),
            ("imageUrl", &entry.image_url),
            ("imageFile", &entry.image_file),
        ];
        for (key, value) in optional {
            if let Some(value) = value.as_ref().filter(|v| !v.trim().is_empty()) {
                fresh.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        let mods = self
            .doc
            .entry("mods".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !mods.is_array() {
            *mods = Value::Array(Vec::new());
        }
        if let Some(list) = mods.as_array_mut() {
            list.push(Value::Object(fresh));
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.doc).context("serialize character record")
    }
}

fn set_or_clear(entry: &mut Map<String, Value>, key: &str, value: Option<String>) {
    match value {
        Some(value) if value.trim().is_empty() => {
            entry.remove(key);
        }
        Some(value) => {
            entry.insert(key.to_string(), Value::String(value));
        }
        None => {}
    }
}

fn parse_mod_entry(value: &Value) -> Option<ModEntry> {
    let obj = value.as_object()?;
    let name = obj.get("name").and_then(|v| v.as_str())?.to_string();
    Some(ModEntry {
        name,
        page_url: non_empty_str(obj.get("pageUrl")),
        image_url: non_empty_str(obj.get("imageUrl")),
        image_file: non_empty_str(obj.get("imageFile")),
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn character_dir(images_root: &Path, character: &str) -> PathBuf {
    images_root.join(character)
}

pub fn record_path(images_root: &Path, character: &str) -> PathBuf {
    character_dir(images_root, character).join(format!("{character}.txt"))
}

pub fn load_record(images_root: &Path, character: &str) -> CharacterRecord {
    fs::read_to_string(record_path(images_root, character))
        .map(|raw| CharacterRecord::parse(&raw))
        .unwrap_or_default()
}

pub fn save_record(images_root: &Path, character: &str, record: &CharacterRecord) -> Result<()> {
    let dir = character_dir(images_root, character);
    fs::create_dir_all(&dir).context("create character image dir")?;
    fs::write(record_path(images_root, character), record.to_json()?)
        .context("write character record")?;
    Ok(())
}

pub fn character_info(images_root: &Path, character: &str) -> CharacterInfo {
    let dir = character_dir(images_root, character);
    CharacterInfo {
        image_path: images::pick_first_image_file(&dir, Some(character)),
        url: load_record(images_root, character).url(),
    }
}

pub fn get_mod_entry(images_root: &Path, character: &str, mod_name: &str) -> Option<ModEntry> {
    if character.trim().is_empty() || mod_name.trim().is_empty() {
        return None;
    }
    load_record(images_root, character).find_mod(mod_name)
}

pub fn update_mod_entry(
    images_root: &Path,
    character: &str,
    mod_name: &str,
    patch: ModEntryPatch,
) -> Result<()> {
    let mut record = load_record(images_root, character);
    record.upsert_mod(mod_name, patch);
    save_record(images_root, character, &record)
}

/// Next free `N` for `<character>MOD<N>.<ext>`: past both the listed entries
/// and the highest numbered image already on disk.
pub fn next_mod_image_index(images_root: &Path, character: &str, listed: usize) -> usize {
    let prefix = format!("{}mod", character.to_lowercase());
    let highest = fs::read_dir(character_dir(images_root, character))
        .map(|entries| {
            entries
                .flatten()
                .filter_map(|entry| {
                    let name = entry.file_name().to_string_lossy().to_lowercase();
                    let rest = name.strip_prefix(&prefix)?;
                    let (digits, ext) = rest.split_once('.')?;
                    if !matches!(ext, "png" | "jpg" | "jpeg" | "webp" | "gif") {
                        return None;
                    }
                    digits.parse::<usize>().ok()
                })
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0);
    (listed + 1).max(highest + 1)
}

/// Appends a `mods[]` entry, storing its image as `<character>MOD<N>.<ext>`
/// next to the character artwork.
pub fn add_mod_entry(
    images_root: &Path,
    character: &str,
    mod_name: &str,
    entry: NewModEntry,
) -> Result<AddedModEntry> {
    let character = character.trim();
    if character.is_empty() {
        return Err(ManagerError::CharacterRequired.into());
    }
    let dir = character_dir(images_root, character);
    fs::create_dir_all(&dir).context("create character image dir")?;
    let mut record = load_record(images_root, character);
    let index = next_mod_image_index(images_root, character, record.mods().len());

    let image = match (entry.data_url.as_deref(), entry.image_url.as_deref()) {
        (Some(data_url), _) if !data_url.trim().is_empty() => {
            let image = PreviewImage::from_data_url(data_url)?;
            let extension = image.file_extension().to_string();
            Some((image.bytes, extension))
        }
        (_, Some(url)) if !url.trim().is_empty() => {
            let image = download::fetch_bytes(url)?;
            Some((image.bytes, images::extension_for_url(url)))
        }
        _ => None,
    };
    let image_file = match image {
        Some((bytes, extension)) => {
            let file_name = format!("{character}MOD{index}{extension}");
            fs::write(dir.join(&file_name), bytes).context("write mod image")?;
            Some(file_name)
        }
        None => None,
    };

    record.push_mod(&ModEntry {
        name: mod_name.to_string(),
        page_url: entry.page_url,
        image_url: entry.image_url,
        image_file: image_file.clone(),
    });
    save_record(images_root, character, &record)?;
    tracing::info!("added database entry {index} for {character}/{mod_name}");
    Ok(AddedModEntry { index, image_file })
}

/// Writes `<character>.<ext>` into the character image folder and remembers
/// where it came from.
pub fn save_character_image(
    images_root: &Path,
    character: &str,
    image: &PreviewImage,
    extension: &str,
    source_url: Option<&str>,
) -> Result<PathBuf> {
    let dir = character_dir(images_root, character);
    fs::create_dir_all(&dir).context("create character image dir")?;
    let final_path = dir.join(format!("{character}{extension}"));
    fs::write(&final_path, &image.bytes).context("write character image")?;

    if let Some(url) = source_url.filter(|url| !url.trim().is_empty()) {
        let mut record = load_record(images_root, character);
        record.set_url(url);
        if let Err(err) = save_record(images_root, character, &record) {
            tracing::warn!("could not remember image source for {character}: {err:#}");
        }
    }
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn plain_text_record_is_a_url() {
        let record = CharacterRecord::parse("  https://example.com/ellen.png \n");
        assert_eq!(record.url().as_deref(), Some("https://example.com/ellen.png"));
        assert!(record.mods().is_empty());
    }

    #[test]
    fn upsert_inserts_then_updates_and_clears() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        update_mod_entry(
            root,
            "Ellen",
            "Maid",
            ModEntryPatch {
                page_url: Some("https://mods.test/1".to_string()),
                image_url: Some("https://img.test/1.png".to_string()),
            },
        )
        .unwrap();
        let entry = get_mod_entry(root, "Ellen", "Maid").unwrap();
        assert_eq!(entry.page_url.as_deref(), Some("https://mods.test/1"));

        update_mod_entry(
            root,
            "Ellen",
            "Maid",
            ModEntryPatch {
                page_url: Some(String::new()),
                image_url: None,
            },
        )
        .unwrap();
        let entry = get_mod_entry(root, "Ellen", "Maid").unwrap();
        assert!(entry.page_url.is_none());
        assert_eq!(entry.image_url.as_deref(), Some("https://img.test/1.png"));
        assert_eq!(load_record(root, "Ellen").mods().len(), 1);
    }

    #[test]
    fn unknown_keys_survive_rewrite() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("Lycaon")).unwrap();
        fs::write(
            record_path(root, "Lycaon"),
            r#"{"url":"https://a.test","crop":{"x":1,"y":2}}"#,
        )
        .unwrap();
        update_mod_entry(root, "Lycaon", "Suit", ModEntryPatch::default()).unwrap();
        let raw = fs::read_to_string(record_path(root, "Lycaon")).unwrap();
        assert!(raw.contains("\"crop\""));
        assert!(raw.contains("\"Suit\""));
    }

    #[test]
    fn added_entries_number_past_existing_images() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("Ellen")).unwrap();
        fs::write(root.join("Ellen").join("EllenMOD4.png"), b"x").unwrap();
        fs::write(root.join("Ellen").join("EllenMOD9.txt"), b"x").unwrap();
        update_mod_entry(root, "Ellen", "Old", ModEntryPatch::default()).unwrap();

        let image = PreviewImage {
            mime: "image/jpeg".to_string(),
            bytes: vec![7, 7],
        };
        let added = add_mod_entry(
            root,
            "Ellen",
            "Maid",
            NewModEntry {
                page_url: Some("https://mods.test/maid".to_string()),
                data_url: Some(image.to_data_url()),
                ..NewModEntry::default()
            },
        )
        .unwrap();
        assert_eq!(added.index, 5);
        assert_eq!(added.image_file.as_deref(), Some("EllenMOD5.jpg"));
        assert_eq!(fs::read(root.join("Ellen").join("EllenMOD5.jpg")).unwrap(), vec![7, 7]);

        let entry = get_mod_entry(root, "Ellen", "Maid").unwrap();
        assert_eq!(entry.image_file.as_deref(), Some("EllenMOD5.jpg"));
        assert_eq!(entry.page_url.as_deref(), Some("https://mods.test/maid"));

        let plain = add_mod_entry(root, "Ellen", "Coat", NewModEntry::default()).unwrap();
        assert_eq!(plain.index, 6);
        assert!(plain.image_file.is_none());
        assert_eq!(load_record(root, "Ellen").mods().len(), 3);
    }

    #[test]
    fn listed_entries_set_the_floor_for_the_index() {
        let dir = TempDir::new().unwrap();
        assert_eq!(next_mod_image_index(dir.path(), "Ellen", 0), 1);
        assert_eq!(next_mod_image_index(dir.path(), "Ellen", 3), 4);
        assert!(add_mod_entry(dir.path(), " ", "x", NewModEntry::default()).is_err());
        let bad = NewModEntry {
            data_url: Some("data:nope".to_string()),
            ..NewModEntry::default()
        };
        assert!(add_mod_entry(dir.path(), "Ellen", "x", bad).is_err());
    }

    #[test]
    fn blank_names_have_no_entry() {
        let dir = TempDir::new().unwrap();
        assert!(get_mod_entry(dir.path(), " ", "x").is_none());
    }

    #[test]
    fn character_image_and_source_are_saved() {
        let dir = TempDir::new().unwrap();
        let image = PreviewImage {
            mime: "image/png".to_string(),
            bytes: vec![9, 9],
        };
        let path =
            save_character_image(dir.path(), "Nicole", &image, ".png", Some("https://s.test/n.png"))
                .unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![9, 9]);
        let info = character_info(dir.path(), "Nicole");
        assert_eq!(info.image_path, Some(path));
        assert_eq!(info.url.as_deref(), Some("https://s.test/n.png"));
    }
}
