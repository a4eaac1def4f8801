//! OCI/Docker whiteout markers inside a single layer

use crate::paths::{base_name, split_path};

const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

/// What a whiteout marker deletes from the layers below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deletion {
    /// A single path is removed.
    Path(String),
    /// Everything inherited inside this directory is hidden.
    Opaque(String),
}

/// Check if a path is a whiteout marker (its basename starts with `.wh.`)
pub fn is_whiteout(path: &str) -> bool {
    base_name(path).starts_with(WHITEOUT_PREFIX)
}

/// Check if a path is an opaque whiteout marker
pub fn is_opaque(path: &str) -> bool {
    base_name(path) == OPAQUE_WHITEOUT
}

/// Extract the target path from a whiteout marker path
/// Example: "dir/.wh.file" -> "dir/file"
pub fn whiteout_target(path: &str) -> String {
    let (dir_path, basename) = split_path(path);
    let target = basename.strip_prefix(WHITEOUT_PREFIX).unwrap_or(basename);

    if dir_path.is_empty() {
        target.to_string()
    } else {
        format!("{}/{}", dir_path, target)
    }
}

/// Get the directory path from an opaque whiteout marker
/// Example: "foo/bar/.wh..wh..opq" -> "foo/bar"
pub fn opaque_dir(path: &str) -> &str {
    split_path(path).0
}

/// Interpret a (normalized) whiteout marker path.
pub fn deletion(path: &str) -> Option<Deletion> {
    if !is_whiteout(path) {
        None
    } else if is_opaque(path) {
        Some(Deletion::Opaque(opaque_dir(path).to_string()))
    } else {
        Some(Deletion::Path(whiteout_target(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_whiteout() {
        assert!(is_whiteout(".wh.file"));
        assert!(is_whiteout("dir/.wh.file"));
        assert!(is_whiteout(".wh..wh..opq"));
        assert!(!is_whiteout("normal_file"));
        assert!(!is_whiteout("dir/normal_file"));
        // only the basename counts
        assert!(!is_whiteout(".wh.dir/file"));
    }

    #[test]
    fn test_is_opaque() {
        assert!(is_opaque(".wh..wh..opq"));
        assert!(is_opaque("dir/.wh..wh..opq"));
        assert!(!is_opaque(".wh.file"));
        assert!(!is_opaque("normal_file"));
    }

    #[test]
    fn test_whiteout_target() {
        assert_eq!(whiteout_target(".wh.file"), "file");
        assert_eq!(whiteout_target("dir/.wh.file"), "dir/file");
        assert_eq!(whiteout_target("a/b/c/.wh.test"), "a/b/c/test");
    }

    #[test]
    fn test_deletion() {
        assert_eq!(deletion("etc/.wh.motd"), Some(Deletion::Path("etc/motd".into())));
        assert_eq!(deletion("var/cache/.wh..wh..opq"), Some(Deletion::Opaque("var/cache".into())));
        assert_eq!(deletion(".wh..wh..opq"), Some(Deletion::Opaque(String::new())));
        assert_eq!(deletion("etc/motd"), None);
    }
}
