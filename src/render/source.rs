//! Template sources: a local directory or a git remote cloned into the cache.
use anyhow::{Context as _, Result};
use sha2::{Digest as _, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Cache folder for a remote template: `<cache>/templates/<sha256 of url>`.
#[must_use]
pub fn cache_path(cache_dir: &Path, template: &str) -> PathBuf {
    let digest = Sha256::digest(template.as_bytes());
    cache_dir.join("templates").join(hex::encode(digest))
}

/// Whether `template` names a local directory rather than a remote.
#[must_use]
pub fn is_local(template: &str) -> bool {
    Path::new(template).is_dir()
}

/// Normalize a template argument for recording: local directories become
/// absolute paths, remotes are kept verbatim.
///
/// # Errors
///
/// Returns an error if a local directory cannot be canonicalized.
pub fn normalize(template: &str) -> Result<String> {
    if is_local(template) {
        let path = dunce::canonicalize(template)
            .with_context(|| format!("resolving template directory {template}"))?;
        Ok(path.to_string_lossy().into_owned())
    } else {
        Ok(template.to_string())
    }
}

/// Make the template available on disk and return its directory.
///
/// Local directories are used in place. Remotes are cloned fresh into the
/// cache so every render sees the current upstream state. The clone stops
/// once `cancelled` is set.
///
/// # Errors
///
/// Returns an error if the stale cache cannot be removed, or the clone fails
/// or is cancelled.
pub fn fetch(template: &str, cache_dir: &Path, cancelled: &AtomicBool) -> Result<PathBuf> {
    if is_local(template) {
        return dunce::canonicalize(template)
            .with_context(|| format!("resolving template directory {template}"));
    }

    let dest = cache_path(cache_dir, template);
    if dest.exists() {
        std::fs::remove_dir_all(&dest)
            .with_context(|| format!("removing stale template cache {}", dest.display()))?;
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let mut callbacks = git2::RemoteCallbacks::new();
    callbacks.transfer_progress(|_| !cancelled.load(Ordering::SeqCst));
    let mut fetch_options = git2::FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);
    git2::build::RepoBuilder::new()
        .fetch_options(fetch_options)
        .clone(template, &dest)
        .with_context(|| format!("cloning template {template}"))?;
    Ok(dest)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cache_path_is_stable_and_distinct() {
        let cache = Path::new("/cache");
        let a = cache_path(cache, "https://example.com/a.git");
        assert_eq!(a, cache_path(cache, "https://example.com/a.git"));
        assert_ne!(a, cache_path(cache, "https://example.com/b.git"));
        assert!(a.starts_with("/cache/templates"));
        assert_eq!(a.file_name().unwrap().len(), 64);
    }

    #[test]
    fn local_directory_is_used_in_place() {
        let template = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let dir = fetch(
            template.path().to_str().unwrap(),
            cache.path(),
            &AtomicBool::new(false),
        ).unwrap();
        assert_eq!(dir, dunce::canonicalize(template.path()).unwrap());
        assert!(!cache.path().join("templates").exists());
    }

    #[test]
    fn normalize_keeps_remote_urls() {
        assert_eq!(
            normalize("https://example.com/t.git").unwrap(),
            "https://example.com/t.git"
        );
    }

    #[cfg(unix)]
    #[test]
    fn remote_is_cloned_into_cache() {
        let upstream = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(upstream.path()).unwrap();
        std::fs::create_dir_all(upstream.path().join("common")).unwrap();
        std::fs::write(upstream.path().join("common/.gitconfig"), "[core]\n").unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("t", "t@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "template", &tree, &[])
            .unwrap();

        let url = format!("file://{}", upstream.path().display());
        let cache = tempfile::tempdir().unwrap();
        let dir = fetch(&url, cache.path(), &AtomicBool::new(false)).unwrap();
        assert_eq!(dir, cache_path(cache.path(), &url));
        assert_eq!(
            std::fs::read_to_string(dir.join("common/.gitconfig")).unwrap(),
            "[core]\n"
        );

        // A second fetch replaces the previous clone.
        let again = fetch(&url, cache.path(), &AtomicBool::new(false)).unwrap();
        assert_eq!(again, dir);
    }

    #[cfg(unix)]
    #[test]
    fn cancelled_clone_fails() {
        let upstream = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(upstream.path()).unwrap();
        std::fs::write(upstream.path().join("README"), "dotfiles\n").unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("t", "t@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "template", &tree, &[])
            .unwrap();

        let url = format!("file://{}", upstream.path().display());
        let cache = tempfile::tempdir().unwrap();
        let err = fetch(&url, cache.path(), &AtomicBool::new(true)).unwrap_err();
        assert!(err.to_string().contains("cloning template"));
    }
}
