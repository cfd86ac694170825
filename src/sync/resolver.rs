//! Path resolver: rendered tree + manifest -> managed files with targets.
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::ManagedFile;
use crate::config::{Manifest, PathMapping};
use crate::error::SyncError;
use crate::platform::{Category, Platform};

/// Output of [`resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Managed files ordered by relative path, then category.
    pub files: Vec<ManagedFile>,
    /// Mapping keys that selected no file on this host.
    pub unmatched: Vec<String>,
}

/// Compute the managed files of the rendered tree at `root`.
///
/// Walks `common/` and the host's platform folder, then resolves each file's
/// target through the manifest, defaulting to `home/<relative_path>`.
///
/// # Errors
///
/// - [`SyncError::Structure`] when `common/` is missing, both `unix/` and
///   `windows/` exist, or two categories provide the same relative path.
/// - [`SyncError::Config`] when a mapping key is repeated, two mappings
///   select the same file, two files resolve to the same target, or a
///   target lies inside the tree.
/// - [`SyncError::Io`] when the tree cannot be walked.
pub fn resolve(
    root: &Path,
    manifest: &Manifest,
    platform: &Platform,
    home: &Path,
) -> Result<Resolution, SyncError> {
    check_structure(root)?;
    check_duplicate_keys(&manifest.mappings)?;

    let discovered = discover(root, platform)?;

    let mut used: HashSet<&str> = HashSet::new();
    let mut targets: HashMap<PathBuf, String> = HashMap::new();
    let mut files = Vec::with_capacity(discovered.len());

    for (category, relative_path, source) in discovered {
        let name = format!("{category}/{relative_path}");
        let mut selecting = manifest
            .mappings
            .iter()
            .filter(|m| m.selects(category, &relative_path));
        let mapping = selecting.next();
        if let Some(second) = selecting.next()
            && let Some(first) = mapping
        {
            return Err(SyncError::config(format!(
                "{name} is selected by both {:?} and {:?}",
                first.key, second.key
            )));
        }

        let target_path = match mapping {
            Some(m) => {
                used.insert(m.key.as_str());
                expand_target(&m.target, home)
            }
            None => join_relative(home, &relative_path),
        };

        if dunce::simplified(&target_path).starts_with(dunce::simplified(root)) {
            return Err(SyncError::config(format!(
                "{name} would be linked from {}, inside the tree",
                target_path.display()
            )));
        }

        if let Some(previous) = targets.insert(target_path.clone(), name.clone()) {
            return Err(SyncError::config(format!(
                "{previous} and {name} both resolve to {}",
                target_path.display()
            )));
        }

        files.push(ManagedFile {
            category,
            relative_path,
            source,
            target_path,
        });
    }

    files.sort_by(|a, b| {
        a.relative_path
            .cmp(&b.relative_path)
            .then(a.category.cmp(&b.category))
    });

    let unmatched = manifest
        .mappings
        .iter()
        .filter(|m| !used.contains(m.key.as_str()))
        .filter(|m| m.category().is_none_or(|c| platform.includes(c)))
        .map(|m| m.key.clone())
        .collect();

    Ok(Resolution { files, unmatched })
}

fn check_structure(root: &Path) -> Result<(), SyncError> {
    let common = root.join(Category::Common.dir_name());
    if !common.is_dir() {
        return Err(SyncError::structure(format!(
            "{} has no common/ folder",
            root.display()
        )));
    }
    if root.join(Category::Unix.dir_name()).exists()
        && root.join(Category::Windows.dir_name()).exists()
    {
        return Err(SyncError::structure(format!(
            "{} contains both unix/ and windows/ folders",
            root.display()
        )));
    }
    Ok(())
}

fn check_duplicate_keys(mappings: &[PathMapping]) -> Result<(), SyncError> {
    let mut seen = HashSet::new();
    for mapping in mappings {
        if !seen.insert(mapping.key.as_str()) {
            return Err(SyncError::config(format!(
                "duplicate mapping for {:?}",
                mapping.key
            )));
        }
    }
    Ok(())
}

/// Walk the active category folders, returning `(category, relative, source)`.
fn discover(
    root: &Path,
    platform: &Platform,
) -> Result<Vec<(Category, String, PathBuf)>, SyncError> {
    let mut providers: BTreeMap<String, Category> = BTreeMap::new();
    let mut discovered = Vec::new();

    for category in platform.active_categories() {
        let dir = root.join(category.dir_name());
        if !dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map_or_else(|| dir.clone(), Path::to_path_buf);
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("filesystem loop"));
                SyncError::io(path, source)
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let relative_path = relative_key(&dir, entry.path());
            if let Some(other) = providers.insert(relative_path.clone(), category) {
                return Err(SyncError::structure(format!(
                    "{relative_path} is provided by both {other}/ and {category}/"
                )));
            }
            discovered.push((category, relative_path, entry.into_path()));
        }
    }

    Ok(discovered)
}

/// `/`-separated path of `path` below `base`.
fn relative_key(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn join_relative(base: &Path, relative: &str) -> PathBuf {
    relative
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .fold(base.to_path_buf(), |acc, segment| acc.join(segment))
}

/// Expand a leading `~`, `$HOME` or `${HOME}`; relative targets are taken
/// relative to `home`.
fn expand_target(target: &str, home: &Path) -> PathBuf {
    let target = target.trim();
    for prefix in ["~", "${HOME}", "$HOME"] {
        if let Some(rest) = target.strip_prefix(prefix)
            && (rest.is_empty() || rest.starts_with(['/', '\\']))
        {
            return join_relative(home, rest);
        }
    }
    let path = Path::new(target);
    if path.is_absolute() || path.has_root() {
        path.to_path_buf()
    } else {
        join_relative(home, target)
    }
}
