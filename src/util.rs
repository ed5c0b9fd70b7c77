//! Small shared helpers for filenames and title normalization.

/// Maximum length of a sanitized filename stem.
const MAX_FILENAME_LEN: usize = 200;

/// Produces a filesystem-safe filename stem from a paper title.
///
/// Characters that are illegal or troublesome in filenames are replaced
/// with spaces, whitespace runs collapse to one space, and the result is
/// trimmed and length-capped.
#[must_use]
pub fn sanitize_filename(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut prev_space = true;
    for ch in title.chars() {
        let mapped = match ch {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => ' ',
            c if c.is_control() => ' ',
            c => c,
        };
        if mapped.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(mapped);
            prev_space = false;
        }
    }
    let trimmed = out.trim();
    trimmed.chars().take(MAX_FILENAME_LEN).collect()
}

/// Normalizes a title for use as a dedup key: casefold, drop punctuation,
/// collapse whitespace.
///
/// Superficially different renderings of the same title collapse to one
/// key: `"Foo: A Study"` and `"foo a study"` both normalize to
/// `"foo a study"`.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut prev_space = true;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            prev_space = false;
        } else if ch.is_whitespace() && !prev_space {
            out.push(' ');
            prev_space = true;
        }
        // Punctuation and symbols are dropped entirely.
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_removes_illegal_characters() {
        assert_eq!(sanitize_filename("Foo: A/Study?"), "Foo A Study");
        assert_eq!(sanitize_filename("a\\b|c*d"), "a b c d");
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize_filename("  spaced\t\nout  "), "spaced out");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_filename(&long).len(), 200);
    }

    #[test]
    fn test_normalize_casefolds_and_strips_punctuation() {
        assert_eq!(normalize_title("Foo: A Study"), "foo a study");
        assert_eq!(normalize_title("foo a study"), "foo a study");
        assert_eq!(normalize_title("Foo, a (Study)!"), "foo a study");
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_title("  Foo \t A\n Study  "), "foo a study");
    }

    #[test]
    fn test_normalize_strips_trailing_punctuation() {
        assert_eq!(normalize_title("A Study..."), "a study");
    }
}
