//! Checkpoint discovery and model directory diagnostics.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Maximum number of entries listed per directory by [`log_directory_tree`].
pub const TREE_MAX_ITEMS: usize = 20;

const MB: f64 = 1024.0 * 1024.0;
const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// A weights file found for a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointCandidate {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// The pattern that matched.
    pub pattern: String,
}

impl CheckpointCandidate {
    pub fn size_gb(&self) -> f64 {
        self.size_bytes as f64 / GB
    }
}

/// Finds the checkpoint for a model under `dir`.
///
/// Patterns are filename globs tried in order against every file below
/// `dir`; the first pattern with any match wins and its largest match is
/// returned (the main weights file is the biggest). Wildcards do not match
/// hidden files and hidden directories are not searched.
pub fn find_checkpoint<S: AsRef<str>>(dir: &Path, patterns: &[S]) -> Option<CheckpointCandidate> {
    let files = list_files(dir);
    if files.is_empty() {
        return None;
    }

    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    for raw in patterns {
        let raw = raw.as_ref();
        let pattern = match Pattern::new(raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(pattern = raw, error = %e, "skipping invalid checkpoint pattern");
                continue;
            }
        };

        // Files are sorted by path, so among equal sizes the first path wins.
        let best = files
            .iter()
            .filter(|(_, name, _)| pattern.matches_with(name, options))
            .fold(None::<&(PathBuf, String, u64)>, |best, file| match best {
                Some(b) if b.2 >= file.2 => Some(b),
                _ => Some(file),
            });

        if let Some((path, _, size)) = best {
            let found = CheckpointCandidate {
                path: path.clone(),
                size_bytes: *size,
                pattern: raw.to_string(),
            };
            info!(
                pattern = raw,
                path = %found.path.display(),
                size_gb = %format!("{:.2}", found.size_gb()),
                "found checkpoint"
            );
            return Some(found);
        }
    }
    None
}

/// Lists `(path, file name, size)` for every regular file below `dir`, sorted by path.
fn list_files(dir: &Path) -> Vec<(PathBuf, String, u64)> {
    let mut files: Vec<(PathBuf, String, u64)> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden_dir(entry))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let size = entry.metadata().ok()?.len();
            let name = entry.file_name().to_str()?.to_string();
            Some((entry.into_path(), name, size))
        })
        .collect();
    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}

fn is_hidden_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Logs the layout of `path` down to `max_depth` levels, at most
/// [`TREE_MAX_ITEMS`] entries per directory, with file sizes in MB.
pub fn log_directory_tree(path: &Path, max_depth: usize) {
    if !path.exists() {
        warn!(path = %path.display(), "path does not exist");
        return;
    }
    log_tree_level(path, max_depth, 0);
}

fn log_tree_level(path: &Path, max_depth: usize, depth: usize) {
    let indent = "  ".repeat(depth);
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("{indent}error listing {}: {e}", path.display());
            return;
        }
    };

    let mut items: Vec<PathBuf> = entries.filter_map(Result::ok).map(|e| e.path()).collect();
    items.sort();

    let dir_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    info!("{indent}{dir_name}/ ({} items)", items.len());

    if depth >= max_depth {
        return;
    }

    for item in items.iter().take(TREE_MAX_ITEMS) {
        if item.is_dir() {
            log_tree_level(item, max_depth, depth + 1);
        } else {
            let size_mb = std::fs::metadata(item)
                .map(|m| m.len() as f64 / MB)
                .unwrap_or(0.0);
            let name = item
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            info!("{indent}  {name} ({size_mb:.2} MB)");
        }
    }
    if items.len() > TREE_MAX_ITEMS {
        info!("{indent}  ... {} more", items.len() - TREE_MAX_ITEMS);
    }
}
