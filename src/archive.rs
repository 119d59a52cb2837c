use crate::error::ManagerError;
use anyhow::{Context, Result};
use filetime::{set_file_mtime, FileTime};
use std::{
    fs,
    io::{self, Read},
    path::Path,
    process::{Command, Stdio},
};
use time::PrimitiveDateTime;

pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "7z", "rar"];

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const SEVEN_ZIP_MAGIC: [u8; 6] = [b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    SevenZip,
    Other,
}

impl ArchiveKind {
    /// Kind by extension, falling back to the file signature for names
    /// without a known extension (downloads land in extensionless temp files).
    pub fn detect(path: &Path) -> Self {
        match Self::from_path(path) {
            ArchiveKind::Other => Self::sniff(path).unwrap_or(ArchiveKind::Other),
            kind => kind,
        }
    }

    fn sniff(path: &Path) -> Option<Self> {
        let mut magic = [0u8; 6];
        let mut file = fs::File::open(path).ok()?;
        file.read_exact(&mut magic).ok()?;
        if magic.starts_with(ZIP_MAGIC) {
            Some(ArchiveKind::Zip)
        } else if magic == SEVEN_ZIP_MAGIC {
            Some(ArchiveKind::SevenZip)
        } else {
            None
        }
    }

    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("zip") => ArchiveKind::Zip,
            Some("7z") => ArchiveKind::SevenZip,
            _ => ArchiveKind::Other,
        }
    }
}

pub fn is_archive_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ARCHIVE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// File name with a trailing `.zip`, `.7z` or `.rar` removed.
pub fn strip_archive_extension(file_name: &str) -> &str {
    let lower = file_name.to_ascii_lowercase();
    for ext in ARCHIVE_EXTENSIONS {
        let suffix = format!(".{ext}");
        if lower.ends_with(&suffix) && lower.len() > suffix.len() {
            return &file_name[..file_name.len() - suffix.len()];
        }
    }
    file_name
}

/// One way of unpacking an archive into a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    ZipCrate,
    System7z,
    SevenzCrate,
}

enum Outcome {
    Extracted,
    Unavailable,
}

impl ArchiveKind {
    /// Backends in the order they are tried.
    fn backends(self) -> &'static [Backend] {
        match self {
            ArchiveKind::Zip => &[Backend::ZipCrate],
            ArchiveKind::SevenZip => &[Backend::System7z, Backend::SevenzCrate],
            ArchiveKind::Other => &[Backend::System7z],
        }
    }
}

impl Backend {
    fn run(self, archive: &Path, dest: &Path) -> Result<Outcome> {
        match self {
            Backend::ZipCrate => unzip(archive, dest).map(|()| Outcome::Extracted),
            Backend::System7z => run_system_7z(archive, dest),
            Backend::SevenzCrate => sevenz_rust::decompress_file(archive, dest)
                .map(|()| Outcome::Extracted)
                .with_context(|| format!("extract 7z archive {archive:?}")),
        }
    }
}

/// Extracts every entry of `archive` into `dest`, picking the backend by
/// extension or signature.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).context("create extraction dir")?;
    let kind = ArchiveKind::detect(archive);
    tracing::debug!("extracting {kind:?} archive {archive:?} into {dest:?}");
    for backend in kind.backends() {
        match backend.run(archive, dest)? {
            Outcome::Extracted => return Ok(()),
            Outcome::Unavailable => tracing::debug!("{backend:?} unavailable"),
        }
    }
    let label = archive
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_else(|| archive.display().to_string());
    Err(ManagerError::UnsupportedArchive(label).into())
}

/// Unpacks with the zip crate, then stamps each file with its stored mtime.
fn unzip(path: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("open {path:?}"))?;
    let mut zip = zip::ZipArchive::new(file).with_context(|| format!("read zip {path:?}"))?;
    zip.extract(dest)
        .with_context(|| format!("extract zip {path:?}"))?;

    for index in 0..zip.len() {
        let entry = zip.by_index_raw(index).context("zip entry")?;
        if entry.is_dir() {
            continue;
        }
        let stamp = entry.last_modified().and_then(stored_mtime);
        if let (Some(relative), Some(stamp)) = (entry.enclosed_name(), stamp) {
            if let Err(err) = set_file_mtime(dest.join(&relative), stamp) {
                tracing::debug!("keep extraction time for {relative:?}: {err}");
            }
        }
    }
    Ok(())
}

/// Zip timestamps carry no zone; they are read as UTC.
fn stored_mtime(stamp: zip::DateTime) -> Option<FileTime> {
    let datetime = PrimitiveDateTime::try_from(stamp).ok()?;
    Some(FileTime::from_unix_time(datetime.assume_utc().unix_timestamp(), 0))
}

fn run_system_7z(path: &Path, dest: &Path) -> Result<Outcome> {
    let launched = Command::new("7z")
        .arg("x")
        .arg("-y")
        .arg(format!("-o{}", dest.display()))
        .arg(path)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output();
    let output = match launched {
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Outcome::Unavailable),
        other => other.context("launch 7z")?,
    };
    if output.status.success() {
        Ok(Outcome::Extracted)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(anyhow::anyhow!("7z could not extract {path:?}: {}", stderr.trim()))
    }
}
