/// The canonical stored-file path format: relative to the storage root, with
/// forward slashes, no leading separator, and no parent traversal. Written
/// once at intake time and relied on everywhere at read time, so there is
/// exactly one format to resolve and nothing to guess.
#[must_use]
pub fn is_storage_relative(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return false;
    }
    // Windows drive prefixes and URL-ish schemes are both caught by ':'.
    if path.contains(':') {
        return false;
    }
    !path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
}

/// Reduces arbitrary user input (field names, filename stems) to a token safe
/// for use inside a generated filename.
#[must_use]
pub fn sanitize_token(input: &str, max_len: usize) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed: String = cleaned.chars().take(max_len).collect();
    if trimmed.chars().all(|c| c == '_') {
        "field".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_relative_accepts_canonical_form_only() {
        assert!(is_storage_relative("images/front_123_ab.jpg"));
        assert!(is_storage_relative("drafts/draft_x.json"));
        assert!(!is_storage_relative("/etc/passwd"));
        assert!(!is_storage_relative("images/../secrets"));
        assert!(!is_storage_relative("images//double.jpg"));
        assert!(!is_storage_relative("C:\\windows\\x.jpg"));
        assert!(!is_storage_relative(""));
    }

    #[test]
    fn sanitize_strips_hostile_characters() {
        assert_eq!(sanitize_token("front bumper!", 64), "front_bumper_");
        assert_eq!(sanitize_token("../../x", 64), "______x");
        assert_eq!(sanitize_token("???", 64), "field");
        assert_eq!(sanitize_token("abcdef", 3), "abc");
    }
}
