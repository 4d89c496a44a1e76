use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::{IndexError, Result};

/// Directories never worth indexing, even when no ignore file mentions them.
const SKIPPED_DIRS: &[&str] = &["__pycache__", "node_modules", "venv", "build", "dist", "target"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Repository-relative path with `/` separators.
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub is_dir: bool,
}

pub struct RepoWalker {
    root: PathBuf,
    ignore_file: String,
}

impl RepoWalker {
    pub fn new(root: &Path, ignore_file: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            ignore_file: ignore_file.to_string(),
        }
    }

    /// Every non-ignored directory and file under the root, sorted by path.
    pub fn walk(&self) -> Result<Vec<WalkEntry>> {
        let mut entries = Vec::new();

        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .require_git(false)
            .add_custom_ignore_filename(&self.ignore_file)
            .filter_entry(|entry| {
                let skipped = entry.file_type().is_some_and(|ft| ft.is_dir())
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| SKIPPED_DIRS.contains(&name));
                !skipped
            })
            .build();

        for result in walker {
            let entry = match result {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }
            let Some(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_dir() && !file_type.is_file() {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|e| IndexError::Walk(e.to_string()))?;
            entries.push(WalkEntry {
                rel_path: to_slash_path(rel),
                abs_path: entry.path().to_path_buf(),
                is_dir: file_type.is_dir(),
            });
        }

        entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        Ok(entries)
    }
}

fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
