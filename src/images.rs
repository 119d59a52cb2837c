use crate::error::ManagerError;
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::{
    fs,
    path::{Path, PathBuf},
};
use url::Url;
use walkdir::WalkDir;

/// File names checked, in order, when a mod has no explicit `image`.
pub const PREVIEW_CANDIDATES: &[&str] = &[
    "preview.png",
    "preview.jpg",
    "preview.jpeg",
    "preview.webp",
    "cover.png",
    "cover.jpg",
];

const SAVED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif"];
const PREVIEW_SCAN_DEPTH: usize = 3;

/// Image bytes plus the MIME type they should be served as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl PreviewImage {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("read image {path:?}"))?;
        Ok(Self {
            mime: guess_mime(path).to_string(),
            bytes,
        })
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    pub fn from_data_url(data_url: &str) -> Result<Self> {
        let rest = data_url
            .strip_prefix("data:")
            .ok_or(ManagerError::UnsupportedDataUrl)?;
        let (mime, payload) = rest
            .split_once(";base64,")
            .ok_or(ManagerError::UnsupportedDataUrl)?;
        if mime.is_empty() {
            return Err(ManagerError::UnsupportedDataUrl.into());
        }
        let bytes = STANDARD
            .decode(payload.trim())
            .context("decode data URL payload")?;
        Ok(Self {
            mime: mime.to_string(),
            bytes,
        })
    }

    /// Extension (with dot) a file holding this image is saved under.
    pub fn file_extension(&self) -> &'static str {
        extension_for_mime(&self.mime)
    }
}

pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    if mime.contains("jpeg") {
        ".jpg"
    } else if mime.contains("webp") {
        ".webp"
    } else if mime.contains("gif") {
        ".gif"
    } else {
        ".png"
    }
}

/// Extension taken from a URL path when it names a known image type, `.png` otherwise.
pub fn extension_for_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            Path::new(parsed.path())
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_ascii_lowercase())
        })
        .filter(|ext| SAVED_IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .map(|ext| format!(".{ext}"))
        .unwrap_or_else(|| ".png".to_string())
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SAVED_IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_listed_image(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".png")
        || lower.ends_with(".jpg")
        || lower.ends_with(".jpeg")
        || lower.ends_with(".webp")
}

/// First png/jpg/webp directly inside `dir`, preferring `<preferred>.<ext>`.
pub fn pick_first_image_file(dir: &Path, preferred: Option<&str>) -> Option<PathBuf> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| is_listed_image(name))
        .collect();
    names.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));

    if let Some(base) = preferred {
        let found = names.iter().find(|name| {
            Path::new(name.as_str())
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(|stem| stem.eq_ignore_ascii_case(base))
                .unwrap_or(false)
        });
        if let Some(name) = found {
            return Some(dir.join(name));
        }
    }
    names.first().map(|name| dir.join(name))
}

/// Preview for a mod folder: the explicit `image`, a well-known preview name,
/// then any image found in the folder tree.
pub fn find_mod_preview(mod_dir: &Path, explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(name) = explicit.filter(|name| !name.trim().is_empty()) {
        let path = mod_dir.join(name);
        if path.is_file() {
            return Some(path);
        }
    }
    for name in PREVIEW_CANDIDATES {
        let path = mod_dir.join(name);
        if path.is_file() {
            return Some(path);
        }
    }

    let mut candidates: Vec<(usize, PathBuf)> = WalkDir::new(mod_dir)
        .max_depth(PREVIEW_SCAN_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_image_file(entry.path()))
        .map(|entry| (entry.depth(), entry.path().to_path_buf()))
        .collect();
    candidates.sort_by_key(|(depth, _)| *depth);
    candidates.into_iter().next().map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn data_url_round_trip_keeps_mime_and_bytes() {
        let image = PreviewImage {
            mime: "image/webp".to_string(),
            bytes: vec![1, 2, 3, 250],
        };
        let parsed = PreviewImage::from_data_url(&image.to_data_url()).unwrap();
        assert_eq!(parsed, image);
        assert_eq!(parsed.file_extension(), ".webp");
    }

    #[test]
    fn rejects_non_data_urls() {
        assert!(PreviewImage::from_data_url("https://example.com/a.png").is_err());
        assert!(PreviewImage::from_data_url("data:image/png,abc").is_err());
    }

    #[test]
    fn url_extension_falls_back_to_png() {
        assert_eq!(extension_for_url("https://x.test/a/b.JPG?size=2"), ".jpg");
        assert_eq!(extension_for_url("https://x.test/a/b.bmp"), ".png");
        assert_eq!(extension_for_url("not a url"), ".png");
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(guess_mime(Path::new("a.JPEG")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("a.txt")), "application/octet-stream");
    }

    #[test]
    fn preferred_image_wins() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("aaa.png"), b"x").unwrap();
        fs::write(dir.path().join("Ellen.jpg"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let picked = pick_first_image_file(dir.path(), Some("ellen")).unwrap();
        assert_eq!(picked.file_name().unwrap(), "Ellen.jpg");
        let any = pick_first_image_file(dir.path(), None).unwrap();
        assert_eq!(any.file_name().unwrap(), "aaa.png");
    }

    #[test]
    fn first_image_ignores_letter_case() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Zed.png"), b"x").unwrap();
        fs::write(dir.path().join("beta.jpg"), b"x").unwrap();
        fs::write(dir.path().join("Alpha.webp"), b"x").unwrap();
        let any = pick_first_image_file(dir.path(), None).unwrap();
        assert_eq!(any.file_name().unwrap(), "Alpha.webp");
        let missing = pick_first_image_file(dir.path(), Some("nobody")).unwrap();
        assert_eq!(missing.file_name().unwrap(), "Alpha.webp");
    }

    #[test]
    fn mod_preview_scans_nested_folders() {
        let dir = TempDir::new().unwrap();
        assert!(find_mod_preview(dir.path(), None).is_none());

        let nested = dir.path().join("Inner").join("tex");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("shot.gif"), b"x").unwrap();
        assert_eq!(
            find_mod_preview(dir.path(), None).unwrap(),
            nested.join("shot.gif")
        );

        fs::write(dir.path().join("cover.png"), b"x").unwrap();
        assert_eq!(
            find_mod_preview(dir.path(), Some("missing.png")).unwrap(),
            dir.path().join("cover.png")
        );
    }
}
