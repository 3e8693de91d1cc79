//! Directory traversal for manifest scans.
//!
//! Every entry under the root is admitted (the root itself, directories,
//! files and symlinks) unless it matches an exclusion. Excluded directories
//! are pruned, so nothing below them is enumerated either.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Path fragments that identify the tool's own backup and manifest
/// directories under its install root.
const SELF_REFERENTIAL_PATTERNS: &[&str] = &[
    "/go/backups/",
    "/go/manifests",
    ":\\go\\backups",
    ":\\go\\manifests",
];

/// Options for directory walking. Symbolic links are recorded, never followed.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Skip any entry whose path contains one of these substrings
    pub exclude_patterns: Vec<String>,

    /// Skip these directories and everything below them
    pub exclude_dirs: Vec<PathBuf>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            exclude_patterns: default_exclude_patterns(dirs::home_dir().as_deref()),
            exclude_dirs: Vec::new(),
        }
    }
}

impl WalkOptions {
    /// Default options that also skip `manifest_dir`.
    pub fn for_manifest_dir(manifest_dir: &Path) -> Self {
        let mut options = Self::default();
        options.exclude_dirs.push(manifest_dir.to_path_buf());
        options
    }

    /// Check whether a path falls under any exclusion
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.exclude_dirs.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }

        let path_str = path.to_string_lossy();
        self.exclude_patterns
            .iter()
            .any(|pattern| path_str.contains(pattern.as_str()))
    }
}

/// Built-in exclusions, including the home-directory variants when a home
/// directory is known.
pub fn default_exclude_patterns(home: Option<&Path>) -> Vec<String> {
    let mut patterns: Vec<String> = SELF_REFERENTIAL_PATTERNS
        .iter()
        .map(|p| p.to_string())
        .collect();

    if let Some(home) = home.filter(|h| !h.as_os_str().is_empty()) {
        for sub in ["backups", "manifests"] {
            patterns.push(home.join("go").join(sub).to_string_lossy().into_owned());
        }
    }

    patterns
}

/// Walk a directory tree and hand every admitted path to `callback`.
///
/// The callback returns `false` to stop the walk early (e.g. on
/// cancellation). The first traversal error aborts the walk and is returned;
/// paths already handed out stay handed out.
///
/// # Returns
/// * `Ok(count)` - Number of paths handed to the callback
/// * `Err(walkdir::Error)` - The traversal error that stopped the walk
pub fn walk_paths<F>(
    root: &Path,
    options: &WalkOptions,
    mut callback: F,
) -> Result<usize, walkdir::Error>
where
    F: FnMut(PathBuf) -> bool,
{
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| !should_exclude(entry, options));

    let mut admitted = 0;
    for entry in walker {
        let entry = entry?;
        admitted += 1;
        if !callback(entry.into_path()) {
            break;
        }
    }

    Ok(admitted)
}

fn should_exclude(entry: &DirEntry, options: &WalkOptions) -> bool {
    options.is_excluded(entry.path())
}
