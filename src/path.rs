//! Destination path derivation.
//!
//! Maps an object key to a local path under the download root: the listing
//! prefix is stripped down to its directory portion, the remainder is split
//! into subdirectories and a filename on the delimiter, and the candidate is
//! normalized lexically. A candidate that does not stay a descendant of the
//! root is rejected, so crafted keys like `../../etc/passwd` cannot escape
//! the download directory.

use std::path::{Component, Path, PathBuf};

/// Why a key could not be mapped to a destination path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeriveError {
    /// The key reduces to nothing after prefix stripping (directory marker).
    EmptyRelativeKey,
    /// The candidate path would escape the download root.
    PathEscape,
}

/// A derived local destination: the containing directory and the full path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub directory: PathBuf,
    pub path: PathBuf,
}

/// Strip the listing prefix's directory portion from a key.
///
/// The prefix is normalized to everything up to and including its last
/// delimiter; a trailing fragment after the last delimiter is a name-prefix,
/// not a directory, so it stays part of the local path. A key that does not
/// begin with the normalized prefix is returned unchanged.
///
/// ```
/// use s3fetch_rs::path::rollup_key_by_prefix;
///
/// assert_eq!(rollup_key_by_prefix("a/b/", '/', "a/b/c/d.txt"), "c/d.txt");
/// assert_eq!(rollup_key_by_prefix("a/b/c", '/', "a/b/cxy.txt"), "cxy.txt");
/// assert_eq!(rollup_key_by_prefix("", '/', "a.txt"), "a.txt");
/// ```
pub fn rollup_key_by_prefix<'a>(prefix: &str, delimiter: char, key: &'a str) -> &'a str {
    if prefix.is_empty() {
        return key;
    }
    let dir_prefix = match prefix.rfind(delimiter) {
        Some(idx) => &prefix[..=idx],
        // The whole prefix is a name fragment; nothing to strip.
        None => return key,
    };
    key.strip_prefix(dir_prefix).unwrap_or(key)
}

/// Split a relative key into its directory part and filename on the last
/// delimiter. Keys without a delimiter have an empty directory part.
pub fn split_key_into_dir_and_file(key: &str, delimiter: char) -> (&str, &str) {
    match key.rfind(delimiter) {
        Some(idx) => (&key[..idx], &key[idx + delimiter.len_utf8()..]),
        None => ("", key),
    }
}

/// Derive the destination for `key` under `root`.
///
/// `root` must be an absolute, canonicalized directory; the returned path is
/// guaranteed to be a strict descendant of it. Keys whose `.`/`..` components
/// or absolute fragments would resolve outside the root are rejected with
/// [`DeriveError::PathEscape`].
pub fn derive_destination(
    root: &Path,
    key: &str,
    prefix: &str,
    delimiter: char,
) -> Result<Destination, DeriveError> {
    let rel = rollup_key_by_prefix(prefix, delimiter, key);
    if rel.is_empty() {
        return Err(DeriveError::EmptyRelativeKey);
    }

    let (subdir, filename) = split_key_into_dir_and_file(rel, delimiter);
    if filename.is_empty() {
        return Err(DeriveError::EmptyRelativeKey);
    }

    let mut candidate = root.to_path_buf();
    let parts = subdir
        .split(delimiter)
        .filter(|part| !part.is_empty())
        .chain(std::iter::once(filename));
    for part in parts {
        // A part containing an absolute path would replace the whole
        // candidate on push.
        if Path::new(part).is_absolute() {
            return Err(DeriveError::PathEscape);
        }
        candidate.push(part);
    }

    let normalized = lexically_normalize(&candidate);
    if !normalized.starts_with(root) || normalized == *root {
        return Err(DeriveError::PathEscape);
    }

    let directory = normalized
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());

    Ok(Destination {
        directory,
        path: normalized,
    })
}

/// Resolve `.` and `..` components without touching the filesystem.
///
/// Symlinks inside already-existing directories are resolved later by the
/// download worker, which canonicalizes the destination's parent after
/// creating it and re-checks descent.
fn lexically_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/tmp/download-root")
    }

    // --- rollup_key_by_prefix ---

    #[test]
    fn rollup_empty_prefix_returns_key() {
        assert_eq!(rollup_key_by_prefix("", '/', "a/b/c.txt"), "a/b/c.txt");
    }

    #[test]
    fn rollup_prefix_ending_with_delimiter_strips_whole_prefix() {
        assert_eq!(rollup_key_by_prefix("a/b/", '/', "a/b/c/d.txt"), "c/d.txt");
        assert_eq!(
            rollup_key_by_prefix("my/test/objects/", '/', "my/test/objects/one/two/three"),
            "one/two/three"
        );
    }

    #[test]
    fn rollup_prefix_with_trailing_fragment_preserves_fragment() {
        // "a/b" is a name-prefix on "b...", so only "a/" is stripped and the
        // fragment's directory stays part of the local path.
        assert_eq!(rollup_key_by_prefix("a/b", '/', "a/b/c/d.txt"), "b/c/d.txt");
        assert_eq!(rollup_key_by_prefix("a/b/c", '/', "a/b/cxy.txt"), "cxy.txt");
    }

    #[test]
    fn rollup_prefix_without_delimiter_strips_nothing() {
        assert_eq!(rollup_key_by_prefix("abc", '/', "abcdef.txt"), "abcdef.txt");
    }

    #[test]
    fn rollup_key_not_starting_with_prefix_is_unchanged() {
        assert_eq!(rollup_key_by_prefix("x/y/", '/', "a/b/c.txt"), "a/b/c.txt");
    }

    #[test]
    fn rollup_custom_delimiter() {
        assert_eq!(rollup_key_by_prefix("a|b|", '|', "a|b|c.txt"), "c.txt");
    }

    // --- split_key_into_dir_and_file ---

    #[test]
    fn split_key_with_directories() {
        assert_eq!(split_key_into_dir_and_file("a/b/c.txt", '/'), ("a/b", "c.txt"));
    }

    #[test]
    fn split_key_without_delimiter() {
        assert_eq!(split_key_into_dir_and_file("c.txt", '/'), ("", "c.txt"));
    }

    #[test]
    fn split_key_with_custom_delimiter() {
        assert_eq!(split_key_into_dir_and_file("a|b|c.txt", '|'), ("a|b", "c.txt"));
    }

    // --- derive_destination ---

    #[test]
    fn derive_simple_key_lands_under_root() {
        let dest = derive_destination(&root(), "a.txt", "", '/').unwrap();
        assert_eq!(dest.path, root().join("a.txt"));
        assert_eq!(dest.directory, root());
    }

    #[test]
    fn derive_nested_key_creates_subdirectory_path() {
        let dest = derive_destination(&root(), "c/d/e.txt", "", '/').unwrap();
        assert_eq!(dest.path, root().join("c/d/e.txt"));
        assert_eq!(dest.directory, root().join("c/d"));
    }

    #[test]
    fn derive_strips_directory_prefix() {
        let dest = derive_destination(&root(), "a/b/c/d.txt", "a/b/", '/').unwrap();
        assert_eq!(dest.path, root().join("c/d.txt"));
    }

    #[test]
    fn derive_preserves_name_prefix_fragment() {
        let dest = derive_destination(&root(), "a/b/cxy.txt", "a/b/c", '/').unwrap();
        assert_eq!(dest.path, root().join("cxy.txt"));
    }

    #[test]
    fn derive_rejects_parent_traversal() {
        assert_eq!(
            derive_destination(&root(), "../evil.txt", "", '/'),
            Err(DeriveError::PathEscape)
        );
        assert_eq!(
            derive_destination(&root(), "a/../../evil.txt", "", '/'),
            Err(DeriveError::PathEscape)
        );
        assert_eq!(
            derive_destination(&root(), "../../../../etc/passwd", "", '/'),
            Err(DeriveError::PathEscape)
        );
    }

    #[test]
    fn derive_allows_traversal_that_stays_inside_root() {
        let dest = derive_destination(&root(), "a/b/../c.txt", "", '/').unwrap();
        assert_eq!(dest.path, root().join("a/c.txt"));
    }

    #[test]
    fn derive_rejects_key_resolving_to_root_itself() {
        assert_eq!(
            derive_destination(&root(), "a/..", "", '/'),
            Err(DeriveError::PathEscape)
        );
    }

    #[test]
    fn derive_rejects_empty_relative_key() {
        assert_eq!(
            derive_destination(&root(), "a/b/", "a/b/", '/'),
            Err(DeriveError::EmptyRelativeKey)
        );
    }

    #[test]
    fn derive_rejects_absolute_fragment_with_custom_delimiter() {
        // With a non-'/' delimiter a single part can carry an absolute path.
        assert_eq!(
            derive_destination(&root(), "a|/etc/passwd", "", '|'),
            Err(DeriveError::PathEscape)
        );
    }

    #[test]
    fn derive_ignores_empty_and_dot_components() {
        let dest = derive_destination(&root(), "a//b/./c.txt", "", '/').unwrap();
        assert_eq!(dest.path, root().join("a/b/c.txt"));
    }

    #[test]
    fn derive_keeps_shell_unsafe_names_verbatim() {
        let dest = derive_destination(&root(), "dir with space/it's \"quoted\" ünïcödé.txt", "", '/')
            .unwrap();
        assert_eq!(
            dest.path,
            root().join("dir with space").join("it's \"quoted\" ünïcödé.txt")
        );
    }
}
