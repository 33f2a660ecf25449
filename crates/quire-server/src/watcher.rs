//! File watching for the watch loop.

use std::path::PathBuf;
use std::sync::mpsc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

/// Forwards changed paths from `notify` into an async channel.
///
/// Every path is forwarded; coalescing bursts is left to the receiver.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `paths` recursively.
    ///
    /// Returns the watcher and a channel of changed paths. Dropping the
    /// watcher closes the channel.
    pub fn new(paths: &[PathBuf]) -> Result<(Self, async_mpsc::Receiver<PathBuf>), std::io::Error> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            match res {
                Ok(event) => {
                    let _ = sync_tx.send(event);
                }
                Err(e) => tracing::warn!("watch error: {}", e),
            }
        })
        .map_err(std::io::Error::other)?;

        for path in paths {
            if path.exists() {
                watcher
                    .watch(path, RecursiveMode::Recursive)
                    .map_err(std::io::Error::other)?;
            } else {
                tracing::debug!(path = %path.display(), "not watching missing path");
            }
        }

        std::thread::spawn(move || {
            while let Ok(event) = sync_rx.recv() {
                if !is_change(&event.kind) {
                    continue;
                }
                for path in event.paths {
                    if async_tx.blocking_send(path).is_err() {
                        return;
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
