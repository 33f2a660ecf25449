//! Shared plumbing for the compilers: source discovery, destination trees
//! and compile reports.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Errors that stop a compiler run as a whole.
///
/// Problems with a single source file never surface here; they are logged
/// and recorded in [`CompileReport::skipped`].
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid browser target {browser} = {version:?}")]
    InvalidTarget { browser: String, version: String },
}

/// A source file left out of a run, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one compiler run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompileReport {
    /// Artifacts whose bytes changed in at least one destination
    pub written: usize,

    /// Artifacts already up to date everywhere
    pub unchanged: usize,

    /// Sources that were skipped
    pub skipped: Vec<Skipped>,
}

impl CompileReport {
    pub(crate) fn record(&mut self, changed: bool) {
        if changed {
            self.written += 1;
        } else {
            self.unchanged += 1;
        }
    }

    /// Log and remember a skipped source.
    pub(crate) fn skip(&mut self, task: &str, path: &Path, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(task, path = %path.display(), "skipping: {}", reason);
        self.skipped.push(Skipped {
            path: path.to_path_buf(),
            reason,
        });
    }
}

/// Destination roots a compiler writes every artifact to.
///
/// Typically the dev build tree (`_site/assets`) and the committed
/// `assets` tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destinations {
    roots: Vec<PathBuf>,
}

impl Destinations {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Write an artifact at `relative` under every root.
    ///
    /// Returns whether any copy changed. Identical files are left alone.
    pub fn write(&self, relative: &Path, bytes: &[u8]) -> Result<bool, AssetError> {
        let mut changed = false;
        for root in &self.roots {
            changed |= write_if_changed(&root.join(relative), bytes)?;
        }
        Ok(changed)
    }
}

/// Write `bytes` to `path` unless it already holds exactly those bytes.
pub fn write_if_changed(path: &Path, bytes: &[u8]) -> Result<bool, AssetError> {
    if fs::read(path).is_ok_and(|existing| existing == bytes) {
        return Ok(false);
    }

    let io_err = |source| AssetError::Write {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, bytes).map_err(io_err)?;
    Ok(true)
}

/// List regular files under `dir` in a stable order, skipping dotfiles.
///
/// A missing directory has no sources.
pub(crate) fn collect_sources(
    dir: &Path,
    recursive: bool,
    mut keep: impl FnMut(&Path) -> bool,
) -> Vec<PathBuf> {
    if !dir.is_dir() {
        tracing::debug!(path = %dir.display(), "no source directory");
        return Vec::new();
    }

    let mut walker = WalkDir::new(dir).follow_links(true).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("cannot read entry under {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        let hidden = entry.file_name().to_str().is_some_and(|n| n.starts_with('.'));
        if entry.file_type().is_file() && !hidden && keep(path) {
            files.push(path.to_path_buf());
        }
    }

    files
}

/// Lowercased extension of a path.
pub(crate) fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_to_every_root() {
        let temp = tempdir().unwrap();
        let dest = Destinations::new([temp.path().join("a"), temp.path().join("b")]);

        let changed = dest.write(Path::new("css/main.css"), b"body{}").unwrap();

        assert!(changed);
        assert_eq!(fs::read(temp.path().join("a/css/main.css")).unwrap(), b"body{}");
        assert_eq!(fs::read(temp.path().join("b/css/main.css")).unwrap(), b"body{}");
    }

    #[test]
    fn leaves_identical_files_alone() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("x.txt");

        assert!(write_if_changed(&path, b"same").unwrap());
        assert!(!write_if_changed(&path, b"same").unwrap());
        assert!(write_if_changed(&path, b"different").unwrap());
    }

    #[test]
    fn collects_sorted_and_skips_dotfiles() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("sub")).unwrap();
        fs::write(temp.path().join("b.css"), "").unwrap();
        fs::write(temp.path().join("a.css"), "").unwrap();
        fs::write(temp.path().join(".hidden.css"), "").unwrap();
        fs::write(temp.path().join("sub/c.css"), "").unwrap();

        let flat = collect_sources(temp.path(), false, |_| true);
        let deep = collect_sources(temp.path(), true, |_| true);

        let names = |files: &[PathBuf]| {
            files
                .iter()
                .map(|p| p.strip_prefix(temp.path()).unwrap().display().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&flat), vec!["a.css", "b.css"]);
        assert_eq!(names(&deep), vec!["a.css", "b.css", "sub/c.css"]);
    }

    #[test]
    fn missing_directory_has_no_sources() {
        let files = collect_sources(Path::new("/nonexistent/styles"), true, |_| true);

        assert!(files.is_empty());
    }
}
