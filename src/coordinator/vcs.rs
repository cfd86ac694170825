//! Git plumbing for the managed tree.
use git2::{ErrorCode, IndexAddOption, Oid, Repository, Signature, StatusOptions};
use std::path::Path;

use crate::config::LOCK_FILE;
use crate::config::settings::CommitSettings;
use crate::error::CoordinatorError;

/// Open the repository at `root`, initialising one if there is none.
///
/// # Errors
///
/// Returns an error if the repository cannot be opened or created.
pub fn open_or_init(root: &Path) -> Result<Repository, git2::Error> {
    match Repository::open(root) {
        Ok(repo) => Ok(repo),
        Err(e) if e.code() == ErrorCode::NotFound => Repository::init(root),
        Err(e) => Err(e),
    }
}

/// Add `/<entry>` to `.git/info/exclude` unless it is already listed.
///
/// # Errors
///
/// Returns [`CoordinatorError::Io`] if the exclude file cannot be read or
/// written.
pub fn ensure_excluded(repo: &Repository, entry: &str) -> Result<(), CoordinatorError> {
    let path = repo.path().join("info").join("exclude");
    let current = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(CoordinatorError::io(&path, e)),
    };
    let line = format!("/{entry}");
    if current.lines().any(|l| l.trim() == line) {
        return Ok(());
    }

    let mut updated = current;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&line);
    updated.push('\n');

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CoordinatorError::io(parent, e))?;
    }
    std::fs::write(&path, updated).map_err(|e| CoordinatorError::io(&path, e))
}

/// Paths with uncommitted changes, untracked files included, ignoring the
/// lock file.
///
/// # Errors
///
/// Returns an error if git status cannot be computed.
pub fn dirty_paths(repo: &Repository) -> Result<Vec<String>, git2::Error> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);
    let statuses = repo.statuses(Some(&mut opts))?;
    Ok(statuses
        .iter()
        .filter(|s| !s.status().is_ignored())
        .filter_map(|s| s.path().map(str::to_string))
        .filter(|p| p != LOCK_FILE)
        .collect())
}

/// Stage every change and commit it on `HEAD`.
///
/// Returns `Ok(None)` when the tree matches `HEAD` already. The author is
/// git's configured identity, falling back to the one in `settings`.
///
/// # Errors
///
/// Returns an error if staging or committing fails.
pub fn commit_all(
    repo: &Repository,
    message: &str,
    settings: &CommitSettings,
) -> Result<Option<Oid>, git2::Error> {
    let mut index = repo.index()?;
    let mut skip_lock =
        |path: &Path, _: &[u8]| -> i32 { i32::from(path == Path::new(LOCK_FILE)) };
    index.add_all(
        ["*"],
        IndexAddOption::DEFAULT,
        Some(&mut skip_lock as &mut git2::IndexMatchedPath<'_>),
    )?;
    index.update_all(["*"], None)?;
    index.write()?;
    let tree_id = index.write_tree()?;

    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit()?),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
        Err(e) => return Err(e),
    };
    if let Some(parent) = &parent
        && parent.tree_id() == tree_id
    {
        return Ok(None);
    }

    let signature = repo
        .signature()
        .or_else(|_| Signature::now(&settings.author_name, &settings.author_email))?;
    let tree = repo.find_tree(tree_id)?;
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        message,
        &tree,
        &parents,
    )
    .map(Some)
}
