//! Folder-backed library: characters are sub-directories of the mods root,
//! mods are sub-directories of a character.

use crate::{
    archive, database, download,
    error::ManagerError,
    images::{self, PreviewImage},
    metadata::{self, ModMeta, ModMetaPatch},
};
use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    cmp::Ordering,
    fmt, fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

pub const DISABLED_PREFIX: &str = "DISABLED_";

/// Stable identity of a mod within the enrichment maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    pub fn new(dir: &Path, folder: &str) -> Self {
        Self(format!("{}::{folder}", dir.display()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModItem {
    pub key: ItemKey,
    pub folder: String,
    pub dir: PathBuf,
    pub meta: ModMeta,
}

impl ModItem {
    pub fn display_name(&self) -> &str {
        if self.meta.name.trim().is_empty() {
            &self.folder
        } else {
            &self.meta.name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterItem {
    pub name: String,
    pub image_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopiedArchive {
    pub mod_name: String,
    pub file_name: String,
    pub dir: PathBuf,
}

/// Rejects names that are empty or would escape their parent folder.
pub fn validate_name(name: &str, missing: ManagerError) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(missing.into());
    }
    if trimmed == "." || trimmed == ".." || trimmed.contains(['/', '\\']) {
        return Err(ManagerError::InvalidName(name.to_string()).into());
    }
    Ok(trimmed)
}

pub fn character_dir(root: &Path, character: &str) -> PathBuf {
    root.join(character)
}

pub fn mod_dir(root: &Path, character: &str, mod_name: &str) -> PathBuf {
    character_dir(root, character).join(mod_name)
}

fn sub_directories(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {dir:?}"))? {
        let entry = entry.context("read dir entry")?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort_by(|a, b| compare_folder_names(a, b));
    Ok(names)
}

fn compare_folder_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

pub fn list_characters(root: &Path) -> Vec<String> {
    match sub_directories(root) {
        Ok(names) => names,
        Err(err) => {
            tracing::debug!("listing characters failed: {err:#}");
            Vec::new()
        }
    }
}

pub fn list_characters_with_images(
    mods_root: &Path,
    images_root: Option<&Path>,
) -> Vec<CharacterItem> {
    list_characters(mods_root)
        .into_iter()
        .map(|name| {
            let image_path = images_root.and_then(|root| {
                images::pick_first_image_file(&database::character_dir(root, &name), Some(&name))
            });
            CharacterItem { name, image_path }
        })
        .collect()
}

pub fn add_character(root: &Path, name: &str) -> Result<String> {
    let name = validate_name(name, ManagerError::CharacterRequired)?;
    fs::create_dir_all(character_dir(root, name)).context("create character dir")?;
    tracing::info!("added character {name}");
    Ok(name.to_string())
}

/// Removes the character's mods and artwork. Missing folders are not an error.
pub fn delete_character(mods_root: &Path, images_root: Option<&Path>, name: &str) -> Result<()> {
    let name = validate_name(name, ManagerError::CharacterRequired)?;
    remove_tree(&character_dir(mods_root, name));
    if let Some(images_root) = images_root {
        remove_tree(&database::character_dir(images_root, name));
    }
    tracing::info!("deleted character {name}");
    Ok(())
}

fn remove_tree(path: &Path) {
    if let Err(err) = fs::remove_dir_all(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("could not remove {path:?}: {err}");
        }
    }
}

/// Every mod of `character`, enabled ones first, then by folder name.
pub fn try_list_mods(root: &Path, character: &str) -> Result<Vec<ModItem>> {
    let cdir = character_dir(root, character);
    let mut mods = Vec::new();
    for folder in sub_directories(&cdir)? {
        let dir = cdir.join(&folder);
        let mut meta = metadata::read_mod_meta(&dir);
        meta.image = resolve_listed_image(&dir, meta.image.as_deref());
        mods.push(ModItem {
            key: ItemKey::new(&dir, &folder),
            folder,
            dir,
            meta,
        });
    }
    sort_mods(&mut mods);
    Ok(mods)
}

pub fn list_mods(root: &Path, character: &str) -> Vec<ModItem> {
    match try_list_mods(root, character) {
        Ok(mods) => mods,
        Err(err) => {
            tracing::debug!("listing mods of {character} failed: {err:#}");
            Vec::new()
        }
    }
}

fn resolve_listed_image(dir: &Path, explicit: Option<&str>) -> Option<String> {
    if let Some(name) = explicit {
        if dir.join(name).exists() {
            return Some(name.to_string());
        }
    }
    images::PREVIEW_CANDIDATES
        .iter()
        .find(|name| dir.join(name).exists())
        .map(|name| name.to_string())
}

pub fn sort_mods(mods: &mut [ModItem]) {
    mods.sort_by(|a, b| {
        b.meta
            .is_enabled()
            .cmp(&a.meta.is_enabled())
            .then_with(|| compare_folder_names(&a.folder, &b.folder))
    });
}

fn existing_mod_dir(root: &Path, character: &str, mod_name: &str) -> Result<PathBuf> {
    let character = validate_name(character, ManagerError::CharacterRequired)?;
    let mod_name = validate_name(mod_name, ManagerError::ModNameRequired)?;
    let dir = mod_dir(root, character, mod_name);
    if !dir.is_dir() {
        return Err(ManagerError::ModNotFound {
            character: character.to_string(),
            name: mod_name.to_string(),
        }
        .into());
    }
    Ok(dir)
}

pub fn add_mod_from_archive(
    root: &Path,
    character: &str,
    archive_path: &Path,
    mod_name: &str,
    patch: ModMetaPatch,
) -> Result<ModMeta> {
    let character = validate_name(character, ManagerError::CharacterRequired)?;
    let mod_name = validate_name(mod_name, ManagerError::ModNameRequired)?;
    let dir = mod_dir(root, character, mod_name);
    fs::create_dir_all(&dir).context("create mod dir")?;
    archive::extract_archive(archive_path, &dir)
        .with_context(|| format!("extract {archive_path:?}"))?;
    let patch = ModMetaPatch {
        name: patch.name.or_else(|| Some(mod_name.to_string())),
        ..patch
    };
    let meta = metadata::write_mod_meta(&dir, patch)?;
    tracing::info!("added mod {character}/{mod_name} from {archive_path:?}");
    Ok(meta)
}

/// First free folder name: `base`, then `base (2)`, `base (3)`, ...
pub fn unique_mod_name(root: &Path, character: &str, base: &str) -> String {
    let mut name = base.to_string();
    let mut index = 2;
    while mod_dir(root, character, &name).exists() {
        name = format!("{base} ({index})");
        index += 1;
    }
    name
}

/// Creates a new mod folder named after the archive and copies the archive in.
pub fn copy_archive_to_mod_folder(
    root: &Path,
    character: &str,
    archive_path: &Path,
) -> Result<CopiedArchive> {
    let character = validate_name(character, ManagerError::CharacterRequired)?;
    let file_name = archive_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .context("archive file name")?;
    let base = archive::strip_archive_extension(&file_name).to_string();
    let mod_name = unique_mod_name(root, character, &base);
    let dir = mod_dir(root, character, &mod_name);
    fs::create_dir_all(&dir).context("create mod dir")?;
    fs::copy(archive_path, dir.join(&file_name)).context("copy archive")?;
    Ok(CopiedArchive {
        mod_name,
        file_name,
        dir,
    })
}

pub fn save_metadata(
    root: &Path,
    character: &str,
    mod_name: &str,
    patch: ModMetaPatch,
) -> Result<ModMeta> {
    let dir = existing_mod_dir(root, character, mod_name)?;
    let patch = ModMetaPatch {
        name: patch.name.or_else(|| Some(mod_name.trim().to_string())),
        ..patch
    };
    metadata::write_mod_meta(&dir, patch)
}

pub fn delete_mod(root: &Path, character: &str, mod_name: &str) -> Result<()> {
    let character = validate_name(character, ManagerError::CharacterRequired)?;
    let mod_name = validate_name(mod_name, ManagerError::ModNameRequired)?;
    let dir = mod_dir(root, character, mod_name);
    match fs::remove_dir_all(&dir) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err).with_context(|| format!("remove {dir:?}")),
    }
    tracing::info!("deleted mod {character}/{mod_name}");
    Ok(())
}

fn is_ini(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("ini"))
        .unwrap_or(false)
}

fn strip_disabled_prefix(name: &str) -> &str {
    let upper = name.to_ascii_uppercase();
    if upper.starts_with(DISABLED_PREFIX) {
        &name[DISABLED_PREFIX.len()..]
    } else if upper.starts_with("DISABLED") {
        &name["DISABLED".len()..]
    } else {
        name
    }
}

fn is_disabled_name(name: &str) -> bool {
    name.to_ascii_uppercase().starts_with("DISABLED")
}

/// Renames the mod's `.ini` files so the game loader picks them up or skips them.
fn toggle_ini_files(dir: &Path, enabled: bool) -> Result<usize> {
    let files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_ini(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    let mut renamed = 0;
    for path in files {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        let target = match (enabled, is_disabled_name(&name)) {
            (true, true) => strip_disabled_prefix(&name).to_string(),
            (false, false) => format!("{DISABLED_PREFIX}{name}"),
            _ => continue,
        };
        if target.is_empty() {
            continue;
        }
        let to = path.with_file_name(&target);
        if to.exists() {
            tracing::warn!("skip renaming {path:?}: {to:?} already exists");
            continue;
        }
        fs::rename(&path, &to).with_context(|| format!("rename {path:?}"))?;
        renamed += 1;
    }
    Ok(renamed)
}

pub fn set_enabled(root: &Path, character: &str, mod_name: &str, enabled: bool) -> Result<ModMeta> {
    let dir = existing_mod_dir(root, character, mod_name)?;
    let renamed = toggle_ini_files(&dir, enabled)?;
    let meta = metadata::write_mod_meta(
        &dir,
        ModMetaPatch {
            enabled: Some(enabled),
            ..ModMetaPatch::default()
        },
    )?;
    tracing::info!(
        "{} {character}/{mod_name} ({renamed} ini files renamed)",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(meta)
}

/// Enables `mod_name` and disables every other mod of the character.
pub fn activate_exclusive(root: &Path, character: &str, mod_name: &str) -> Result<()> {
    existing_mod_dir(root, character, mod_name)?;
    for item in try_list_mods(root, character)? {
        let enable = item.folder == mod_name.trim();
        if enable || item.meta.is_enabled() || has_enabled_ini(&item.dir) {
            set_enabled(root, character, &item.folder, enable)?;
        }
    }
    Ok(())
}

fn has_enabled_ini(dir: &Path) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .any(|entry| {
            entry.file_type().is_file()
                && is_ini(entry.path())
                && !is_disabled_name(&entry.file_name().to_string_lossy())
        })
}

/// Stores `image` as `preview.<ext>` and points the sidecar at it.
pub fn save_mod_image(
    root: &Path,
    character: &str,
    mod_name: &str,
    image: &PreviewImage,
    extension: &str,
) -> Result<String> {
    let character = validate_name(character, ManagerError::CharacterRequired)?;
    let mod_name = validate_name(mod_name, ManagerError::ModNameRequired)?;
    let dir = mod_dir(root, character, mod_name);
    fs::create_dir_all(&dir).context("create mod dir")?;
    let file_name = format!("preview{extension}");
    fs::write(dir.join(&file_name), &image.bytes).context("write preview image")?;
    metadata::write_mod_meta(
        &dir,
        ModMetaPatch {
            image: Some(file_name.clone()),
            ..ModMetaPatch::default()
        },
    )?;
    Ok(file_name)
}

pub fn save_mod_image_from_data_url(
    root: &Path,
    character: &str,
    mod_name: &str,
    data_url: &str,
) -> Result<String> {
    let image = PreviewImage::from_data_url(data_url)?;
    let extension = image.file_extension();
    save_mod_image(root, character, mod_name, &image, extension)
}

pub fn save_mod_image_from_url(
    root: &Path,
    character: &str,
    mod_name: &str,
    url: &str,
) -> Result<String> {
    let temp = download::download_to_temp(url)?;
    let bytes = fs::read(&temp).context("read downloaded image");
    let _ = fs::remove_file(&temp);
    let extension = images::extension_for_url(url);
    let image = PreviewImage {
        mime: images::guess_mime(Path::new(&format!("preview{extension}"))).to_string(),
        bytes: bytes?,
    };
    save_mod_image(root, character, mod_name, &image, &extension)
}

/// Downloads the mod's `updateUrl` and extracts it over the mod folder.
pub fn update_from_url(root: &Path, character: &str, mod_name: &str) -> Result<ModMeta> {
    let dir = existing_mod_dir(root, character, mod_name)?;
    let meta = metadata::read_mod_meta(&dir);
    let url = meta
        .update_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or(ManagerError::MissingUpdateUrl)?
        .to_string();

    let temp = download::download_to_temp(&url)?;
    let extracted = archive::extract_archive(&temp, &dir);
    let _ = fs::remove_file(&temp);
    extracted.with_context(|| format!("extract update from {url}"))?;

    let meta = metadata::write_mod_meta(&dir, ModMetaPatch::named(mod_name.trim()))?;
    tracing::info!("updated {character}/{mod_name} from {url}");
    Ok(meta)
}

/// The mod's main folder name inside its directory, used as a display name.
pub fn primary_internal_name(dir: &Path) -> Option<String> {
    if let Ok(subdirs) = sub_directories(dir) {
        if let Some(first) = subdirs.first() {
            let name = strip_disabled_prefix(first).trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }

    let mut inis: Vec<String> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_ini(path))
        .filter_map(|path| {
            path.file_stem()
                .map(|stem| strip_disabled_prefix(&stem.to_string_lossy()).to_string())
        })
        .filter(|stem| !stem.trim().is_empty())
        .collect();
    inis.sort_by(|a, b| compare_folder_names(a, b));
    inis.into_iter().next()
}
