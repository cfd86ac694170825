//! Small filesystem operations shared by the backup and link resources.
use std::io;
use std::path::Path;

/// Create every missing ancestor of `path`.
///
/// # Errors
///
/// Returns an error if a directory cannot be created, e.g. because an
/// ancestor is a regular file.
pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    path.parent().map_or(Ok(()), std::fs::create_dir_all)
}

/// Metadata of `path` itself (a final symlink is not followed), or `None`
/// when nothing is there. A regular file in place of an ancestor directory
/// also counts as nothing.
///
/// # Errors
///
/// Returns any other error raised while inspecting the path.
pub fn entry_metadata(path: &Path) -> io::Result<Option<std::fs::Metadata>> {
    std::fs::symlink_metadata(path).map(Some).or_else(|e| {
        if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) {
            Ok(None)
        } else {
            Err(e)
        }
    })
}

/// Byte-for-byte equality of two files; sizes are compared first.
///
/// # Errors
///
/// Returns an error if either file cannot be read.
pub fn files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    if std::fs::metadata(a)?.len() != std::fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(std::fs::read(a)? == std::fs::read(b)?)
}

/// Rename `from` to `to`, copying and deleting instead when they sit on
/// different file systems. An existing entry at `to` is never replaced.
///
/// # Errors
///
/// Returns [`io::ErrorKind::AlreadyExists`] if `to` exists, or the error
/// raised while moving.
pub fn move_entry(from: &Path, to: &Path) -> io::Result<()> {
    if entry_metadata(to)?.is_some() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", to.display()),
        ));
    }
    match std::fs::rename(from, to) {
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            copy_entry(from, to)?;
            remove_entry(from)
        }
        other => other,
    }
}

/// Copy a file, symlink, or whole directory. Links are recreated as links
/// on Unix and copied as files elsewhere.
fn copy_entry(from: &Path, to: &Path) -> io::Result<()> {
    let file_type = std::fs::symlink_metadata(from)?.file_type();
    if file_type.is_dir() {
        std::fs::create_dir_all(to)?;
        for child in std::fs::read_dir(from)? {
            let child = child?;
            copy_entry(&child.path(), &to.join(child.file_name()))?;
        }
        return Ok(());
    }
    #[cfg(unix)]
    if file_type.is_symlink() {
        return std::os::unix::fs::symlink(std::fs::read_link(from)?, to);
    }
    std::fs::copy(from, to).map(drop)
}

fn remove_entry(path: &Path) -> io::Result<()> {
    if std::fs::symlink_metadata(path)?.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Path equality that ignores the Windows `\\?\` verbatim prefix.
#[must_use]
pub fn paths_equal(a: &Path, b: &Path) -> bool {
    dunce::simplified(a) == dunce::simplified(b)
}
