use anyhow::{bail, Result};
use std::{
    ffi::OsStr,
    path::Path,
    process::{Command, Stdio},
};

#[cfg(target_os = "windows")]
const OPENERS: &[(&str, &[&str])] = &[("cmd", &["/C", "start", ""])];

#[cfg(target_os = "macos")]
const OPENERS: &[(&str, &[&str])] = &[("open", &[])];

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const OPENERS: &[(&str, &[&str])] = &[
    ("xdg-open", &[]),
    ("gio", &["open"]),
    ("kde-open5", &[]),
    ("kioclient5", &["exec"]),
];

pub fn open_path(path: &Path) -> Result<()> {
    open_with_default(path.as_os_str())
}

pub fn open_url(url: &str) -> Result<()> {
    open_with_default(OsStr::new(url))
}

/// Hands `target` to the first desktop opener that accepts it.
fn open_with_default(target: &OsStr) -> Result<()> {
    let mut errors = Vec::new();
    for (command, args) in OPENERS {
        match Command::new(command)
            .args(*args)
            .arg(target)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => {
                tracing::info!("opened {}", target.to_string_lossy());
                return Ok(());
            }
            Ok(status) => errors.push(format!("{command} exited {status}")),
            Err(err) => errors.push(format!("{command} failed: {err}")),
        }
    }
    bail!(
        "failed to open {}: {}",
        target.to_string_lossy(),
        errors.join("; ")
    )
}
