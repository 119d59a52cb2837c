use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::{
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
    thread,
    time::Duration,
};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootChanged {
    pub root: PathBuf,
}

/// Recursive watch over the mods root that reports one change per quiet period.
pub struct RootWatcher {
    root: PathBuf,
    rx: Receiver<RootChanged>,
    _watcher: RecommendedWatcher,
}

impl RootWatcher {
    pub fn start(root: &Path, debounce: Duration) -> Result<Self> {
        let (raw_tx, raw_rx) = mpsc::channel::<()>();
        let (tx, rx) = mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if res.is_ok() {
                let _ = raw_tx.send(());
            }
        })
        .context("create filesystem watcher")?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("watch {root:?}"))?;

        let watched = root.to_path_buf();
        thread::spawn(move || debounce_events(raw_rx, tx, watched, debounce));
        tracing::info!("watching {root:?}");

        Ok(Self {
            root: root.to_path_buf(),
            rx,
            _watcher: watcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drains pending notifications; true if anything changed since the last call.
    pub fn poll_changed(&self) -> bool {
        let mut changed = false;
        loop {
            match self.rx.try_recv() {
                Ok(_) => changed = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        changed
    }
}

fn debounce_events(
    raw_rx: Receiver<()>,
    tx: Sender<RootChanged>,
    root: PathBuf,
    quiet: Duration,
) {
    while raw_rx.recv().is_ok() {
        loop {
            match raw_rx.recv_timeout(quiet) {
                Ok(()) => continue,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
        if tx.send(RootChanged { root: root.clone() }).is_err() {
            return;
        }
    }
}
