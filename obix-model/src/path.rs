//! Path-safety checks shared by every input surface (spec §4.1).
//!
//! A href is valid iff it is non-empty, not exactly `"/"`, contains no
//! leading whitespace, no `.`/`..` segment, and no repeated slash.

/// Validates an absolute href as accepted from a client or config file.
pub fn is_valid_href(href: &str) -> bool {
    if href.is_empty() || href == "/" {
        return false;
    }
    if href.starts_with(char::is_whitespace) {
        return false;
    }
    if href.contains("//") {
        return false;
    }
    href.split('/')
        .filter(|seg| !seg.is_empty())
        .all(|seg| seg != "." && seg != "..")
}

/// Validates a single stored-node `href` segment: non-empty, no slashes,
/// not `.`/`..`. The tree root is the sole exception, carrying the literal
/// segment `"/"`.
pub fn is_valid_segment(segment: &str) -> bool {
    if segment == "/" {
        return true;
    }
    !segment.is_empty()
        && !segment.contains('/')
        && segment != "."
        && segment != ".."
        && !segment.starts_with(char::is_whitespace)
}

/// Splits an absolute href into its ordered, non-empty segments.
pub fn segments(href: &str) -> Vec<&str> {
    href.split('/').filter(|s| !s.is_empty()).collect()
}

/// Joins an ancestor href with a child segment, producing an absolute href.
pub fn join(parent: &str, segment: &str) -> String {
    if parent == "/" {
        format!("/{segment}")
    } else {
        format!("{}/{segment}", parent.trim_end_matches('/'))
    }
}

/// Returns the parent href of an absolute path, or `None` for the root.
pub fn parent_of(href: &str) -> Option<String> {
    let segs = segments(href);
    if segs.len() <= 1 {
        return if href == "/" { None } else { Some("/".to_string()) };
    }
    let mut out = String::new();
    for seg in &segs[..segs.len() - 1] {
        out.push('/');
        out.push_str(seg);
    }
    Some(out)
}

/// Returns the last segment of an absolute path.
pub fn last_segment(href: &str) -> &str {
    segments(href).last().copied().unwrap_or("/")
}

/// True iff `ancestor` is equal to or a path-ancestor of `descendant`.
pub fn is_ancestor_or_eq(ancestor: &str, descendant: &str) -> bool {
    if ancestor == descendant {
        return true;
    }
    if ancestor == "/" {
        return true;
    }
    descendant.starts_with(ancestor)
        && descendant.as_bytes().get(ancestor.len()) == Some(&b'/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_dot_segments() {
        assert!(!is_valid_href("/obix/./x"));
        assert!(!is_valid_href("/obix/../x"));
        assert!(!is_valid_href("/obix//x"));
        assert!(!is_valid_href(""));
        assert!(!is_valid_href("/"));
        assert!(!is_valid_href(" /obix/x"));
    }

    #[test]
    fn accepts_ordinary_paths() {
        assert!(is_valid_href("/obix/deviceRoot/A/n"));
    }

    #[test]
    fn join_and_parent_roundtrip() {
        assert_eq!(join("/obix/deviceRoot", "A"), "/obix/deviceRoot/A");
        assert_eq!(
            parent_of("/obix/deviceRoot/A").as_deref(),
            Some("/obix/deviceRoot")
        );
        assert_eq!(parent_of("/obix").as_deref(), Some("/"));
        assert_eq!(parent_of("/"), None);
    }

    #[test]
    fn ancestor_check() {
        assert!(is_ancestor_or_eq("/obix/deviceRoot/A", "/obix/deviceRoot/A/n"));
        assert!(is_ancestor_or_eq("/obix/deviceRoot/A", "/obix/deviceRoot/A"));
        assert!(!is_ancestor_or_eq("/obix/deviceRoot/A", "/obix/deviceRoot/AB"));
    }
}
