//! Cache directory lookup and colour-code stripping for the run log.
use std::fs;
use std::path::PathBuf;

/// Remove terminal escape sequences from `s`.
///
/// A CSI sequence (`ESC [` parameters, final byte in `@`..=`~`) is dropped
/// whole. A lone `ESC` swallows only the character after it.
pub(super) fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some((head, after)) = rest.split_once('\x1b') {
        out.push_str(head);
        let mut tail = after.chars();
        if tail.next() == Some('[') {
            tail.by_ref().find(|c| ('@'..='~').contains(c));
        }
        rest = tail.as_str();
    }
    out.push_str(rest);
    out
}

/// `dotsync` directory under the user cache, created on first use.
///
/// Uses `XDG_CACHE_HOME` when set, otherwise `~/.cache`. Returns `None` if
/// the directory cannot be created.
pub(crate) fn dotsync_cache_dir() -> Option<PathBuf> {
    let base = match std::env::var_os("XDG_CACHE_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
            .join(".cache"),
    };
    let dir = base.join("dotsync");
    fs::create_dir_all(&dir).ok().map(|()| dir)
}

/// Run log for `command`, e.g. `~/.cache/dotsync/sync.log`.
pub(super) fn log_file_path(command: &str) -> Option<PathBuf> {
    dotsync_cache_dir().map(|dir| dir.join(command).with_extension("log"))
}
