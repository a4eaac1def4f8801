//! Path helpers for comparing archive entries against user-supplied paths

/// Normalize a raw archive path for comparison.
/// Examples:
///   "./etc/hosts" -> "etc/hosts"
///   "usr/lib/" -> "usr/lib"
///   "./" -> ""
///
/// Repeated `./` prefixes and trailing slashes are stripped as well, so
/// normalizing an already-normalized path returns it unchanged.
pub fn normalize(raw: &str) -> &str {
    raw.trim_start_matches("./").trim_end_matches('/')
}

/// Normalize a path given on the command line (which is usually absolute).
pub fn normalize_target(target: &str) -> &str {
    normalize(target.trim_start_matches('/'))
}

/// Split a path into (directory, basename)
/// Examples:
///   "foo/bar" -> ("foo", "bar")
///   "file" -> ("", "file")
///   "foo/bar/" -> ("foo", "bar")
pub fn split_path(path: &str) -> (&str, &str) {
    let path = path.trim_end_matches('/');
    if let Some(pos) = path.rfind('/') {
        (&path[..pos], &path[pos + 1..])
    } else {
        ("", path)
    }
}

/// Last component of a path.
pub fn base_name(path: &str) -> &str {
    split_path(path).1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("./a.txt"), "a.txt");
        assert_eq!(normalize("b/"), "b");
        assert_eq!(normalize("./usr/bin/"), "usr/bin");
        assert_eq!(normalize("etc/os-release"), "etc/os-release");
        assert_eq!(normalize("./"), "");
        assert_eq!(normalize("././x//"), "x");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["./a", "a/", "././a/b//", "", "./", "plain", ".hidden", "../up"] {
            let once = normalize(raw);
            assert_eq!(normalize(once), once, "normalize not idempotent for {raw:?}");
        }
    }

    #[test]
    fn test_normalize_keeps_dot_files() {
        assert_eq!(normalize(".profile"), ".profile");
        assert_eq!(normalize("./.wh.c.txt"), ".wh.c.txt");
    }

    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target("/etc/os-release"), "etc/os-release");
        assert_eq!(normalize_target("etc/os-release"), "etc/os-release");
        assert_eq!(normalize_target("/usr/share/"), "usr/share");
        assert_eq!(normalize_target("./a.txt"), "a.txt");
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("foo/bar"), ("foo", "bar"));
        assert_eq!(split_path("foo/bar/baz"), ("foo/bar", "baz"));
        assert_eq!(split_path("file"), ("", "file"));
        assert_eq!(split_path("foo/bar/"), ("foo", "bar"));
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("dir/.wh.file"), ".wh.file");
        assert_eq!(base_name("top"), "top");
    }
}
