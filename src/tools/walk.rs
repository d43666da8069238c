//! Working-tree traversal shared by the search and project tools.

use std::path::Path;

use globset::{Glob, GlobMatcher};
use walkdir::{DirEntry, WalkDir};

/// Directories never descended into.
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "target"];

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| SKIP_DIRS.contains(&name))
            .unwrap_or(false)
}

/// Files under `root` as sorted `/`-separated relative paths.
pub(crate) fn project_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path().strip_prefix(root).ok().map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/")
            })
        })
        .collect();
    files.sort();
    files
}

/// A glob that matches the relative path when it contains `/`, else the file name.
pub(crate) struct FileGlob {
    matcher: GlobMatcher,
    whole_path: bool,
}

impl FileGlob {
    pub(crate) fn new(pattern: &str) -> anyhow::Result<Self> {
        let matcher = Glob::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid glob pattern: {}", e))?
            .compile_matcher();
        Ok(Self {
            matcher,
            whole_path: pattern.contains('/'),
        })
    }

    pub(crate) fn is_match(&self, rel_path: &str) -> bool {
        if self.whole_path {
            return self.matcher.is_match(rel_path);
        }
        let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        self.matcher.is_match(name)
    }
}
