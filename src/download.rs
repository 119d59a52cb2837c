use crate::images::PreviewImage;
use anyhow::{bail, Context, Result};
use std::{
    env,
    fs::{self, File},
    io::{self, Read},
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Syleaf";
const MAX_REDIRECTS: u32 = 3;
const FALLBACK_MIME: &str = "application/octet-stream";

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5))
        .timeout_read(Duration::from_secs(60))
        .timeout_write(Duration::from_secs(60))
        .redirects(MAX_REDIRECTS)
        .user_agent(USER_AGENT)
        .build()
}

fn get(url: &str) -> Result<ureq::Response> {
    let response = agent()
        .get(url)
        .call()
        .with_context(|| format!("request {url}"))?;
    let status = response.status();
    if !(200..300).contains(&status) {
        bail!("HTTP {status} for {url}");
    }
    Ok(response)
}

/// Streams `url` into a fresh file under the system temp dir.
///
/// The caller owns the returned file and removes it when done.
pub fn download_to_temp(url: &str) -> Result<PathBuf> {
    let response = get(url)?;
    let path = temp_download_path();
    let mut reader = response.into_reader();
    let mut file = File::create(&path).context("create download file")?;
    if let Err(err) = io::copy(&mut reader, &mut file) {
        drop(file);
        let _ = fs::remove_file(&path);
        return Err(err).context("write download file");
    }
    tracing::debug!("downloaded {url} to {path:?}");
    Ok(path)
}

/// Fetches `url` into memory together with its MIME type.
pub fn fetch_bytes(url: &str) -> Result<PreviewImage> {
    let response = get(url)?;
    let mime = normalize_mime(response.header("Content-Type"));
    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .context("read response body")?;
    Ok(PreviewImage { mime, bytes })
}

/// Like [`fetch_bytes`], but anything not labelled `image/*` is served as PNG.
pub fn fetch_image(url: &str) -> Result<PreviewImage> {
    let mut image = fetch_bytes(url)?;
    if !image.mime.starts_with("image/") {
        image.mime = "image/png".to_string();
    }
    Ok(image)
}

fn normalize_mime(header: Option<&str>) -> String {
    header
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

fn temp_download_path() -> PathBuf {
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    env::temp_dir().join(format!("syleaf_{nanos}_{counter}"))
}
