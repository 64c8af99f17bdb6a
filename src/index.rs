//! Single-pass tree indexing — walk once, serve every scorer
//!
//! Each category scorer needs a handful of name-pattern lookups against the
//! same decompiled tree. Instead of repeated recursive walks, TreeIndex walks
//! once and answers lookups from memory. Lookups are read-only and never fail
//! for absent paths: absence is simply an empty result.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One indexed entry with pre-computed lowercase name parts
#[derive(Debug, Clone)]
pub struct IndexedEntry {
    /// Path relative to the index root, original casing
    pub rel_path: PathBuf,
    /// Final path component, lowercase
    pub name: String,
    /// Extension with leading dot, lowercase (empty if none)
    pub extension: String,
    pub is_dir: bool,
}

/// Pre-built index of a decompiled tree — built once, shared by all scorers
#[derive(Debug, Clone, Default)]
pub struct TreeIndex {
    pub root: PathBuf,
    entries: Vec<IndexedEntry>,
}

impl TreeIndex {
    /// Walk the directory tree once and build the index. A missing root
    /// produces an empty index, not an error.
    pub fn build(root: &Path) -> Self {
        let mut entries = Vec::new();

        for entry in WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();
            let name = entry
                .path()
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .to_lowercase();
            let extension = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{}", e.to_lowercase()))
                .unwrap_or_default();

            entries.push(IndexedEntry {
                rel_path: rel,
                name,
                extension,
                is_dir: entry.file_type().is_dir(),
            });
        }

        tracing::debug!(
            "TreeIndex: {} entries under {}",
            entries.len(),
            root.display()
        );

        Self {
            root: root.to_path_buf(),
            entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexedEntry] {
        &self.entries
    }

    /// All entries whose name contains every given fragment, in order of
    /// appearance (matches `*frag1*frag2*` shell patterns)
    pub fn names_containing(&self, fragments: &[&str]) -> Vec<&IndexedEntry> {
        self.entries
            .iter()
            .filter(|e| {
                let mut pos = 0;
                fragments.iter().all(|f| match e.name[pos..].find(f) {
                    Some(i) => {
                        pos += i + f.len();
                        true
                    }
                    None => false,
                })
            })
            .collect()
    }

    /// Count files with the given extension (`.java`, `.html`, ...)
    pub fn count_extension(&self, ext: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| !e.is_dir && e.extension == ext)
            .count()
    }

    /// Files with the given extension under a relative prefix
    pub fn count_extension_under(&self, prefix: &str, ext: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| !e.is_dir && e.extension == ext && e.rel_path.starts_with(prefix))
            .count()
    }

    /// First directory anywhere in the tree with exactly this name
    pub fn find_dir(&self, name: &str) -> Option<&IndexedEntry> {
        self.entries.iter().find(|e| e.is_dir && e.name == name)
    }

    /// Top-level directories whose name starts with the given prefix
    /// (`smali`, `smali_classes2`, ...)
    pub fn top_level_dirs_with_prefix(&self, prefix: &str) -> Vec<&IndexedEntry> {
        self.entries
            .iter()
            .filter(|e| {
                e.is_dir && e.rel_path.components().count() == 1 && e.name.starts_with(prefix)
            })
            .collect()
    }

    /// Whether a file or directory exists at this exact relative path
    /// (matched case-insensitively on components)
    pub fn exists(&self, rel: &str) -> bool {
        let want: Vec<String> = rel.split('/').map(|c| c.to_lowercase()).collect();
        self.entries.iter().any(|e| {
            let have: Vec<String> = e
                .rel_path
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
                .collect();
            have == want
        })
    }

    /// Whether a file with this name exists directly under the given directory
    /// entry (any directory in the tree with that name)
    pub fn file_under_dir(&self, dir_name: &str, file_name: &str) -> bool {
        let file_name = file_name.to_lowercase();
        self.entries.iter().any(|e| {
            !e.is_dir
                && e.name == file_name
                && e.rel_path
                    .parent()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().to_lowercase() == dir_name)
                    .unwrap_or(false)
        })
    }

    /// Immediate subdirectories of any directory in the tree with this name
    pub fn subdirs_of(&self, dir_name: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| {
                e.is_dir
                    && e.rel_path
                        .parent()
                        .and_then(|p| p.file_name())
                        .map(|n| n.to_string_lossy().to_lowercase() == dir_name)
                        .unwrap_or(false)
            })
            .map(|e| e.name.clone())
            .collect()
    }

    /// Absolute path for a relative path inside this tree
    pub fn abs(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }
}
