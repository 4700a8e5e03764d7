//! String path helpers.
//!
//! Scanner paths are absolute strings with `/` separators on every platform,
//! including inside archives, so that archive member paths compose with their
//! host path.

use std::path::Path;

/// Joins a directory path and an entry name.
pub fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Parent directory of `path`, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    if idx == 0 {
        if trimmed.len() > 1 {
            Some("/")
        } else {
            None
        }
    } else {
        Some(&trimmed[..idx])
    }
}

/// Final component of `path`.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Extension of `path` without the dot, if any.
pub fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    let idx = name.rfind('.')?;
    if idx == 0 || idx + 1 == name.len() {
        return None;
    }
    Some(&name[idx + 1..])
}

/// Renders an OS path with forward slashes.
pub fn normalize(path: &Path) -> String {
    let rendered = path.to_string_lossy();
    if cfg!(windows) {
        rendered.replace('\\', "/")
    } else {
        rendered.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_handles_root() {
        assert_eq!(join("/", "lib"), "/lib");
        assert_eq!(join("/lib", "a"), "/lib/a");
    }

    #[test]
    fn parent_walks_to_root() {
        assert_eq!(parent("/lib/a/x.mp4"), Some("/lib/a"));
        assert_eq!(parent("/lib"), Some("/"));
        assert_eq!(parent("/"), None);
    }

    #[test]
    fn file_name_is_final_component() {
        assert_eq!(file_name("/lib/a/x.mp4"), "x.mp4");
        assert_eq!(file_name("/lib/a/"), "a");
        assert_eq!(file_name("plain"), "plain");
    }

    #[test]
    fn extension_skips_dotfiles_and_trailing_dots() {
        assert_eq!(extension("/lib/x.MP4"), Some("MP4"));
        assert_eq!(extension("/lib/.hidden"), None);
        assert_eq!(extension("/lib/noext"), None);
        assert_eq!(extension("/lib/trailing."), None);
    }
}
