//! URL slugs for topic titles.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Lowercase, accent-stripped, `-`-separated slug containing only `[a-z0-9-]`.
///
/// Returns an empty string when the title has no usable characters; callers
/// pick their own fallback.
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_dash = false;

    for ch in title.nfkd().filter(|c| !is_combining_mark(*c)) {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() || ch == '-' || ch == '_' {
            pending_dash = true;
        }
        // anything else is dropped (strict mode)
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_titles() {
        assert_eq!(slugify("Learning Rust"), "learning-rust");
        assert_eq!(slugify("  Async   I/O  "), "async-io");
        assert_eq!(slugify("snake_case-and-kebab"), "snake-case-and-kebab");
    }

    #[test]
    fn accents_are_folded() {
        assert_eq!(slugify("Café Crème"), "cafe-creme");
        assert_eq!(slugify("Ångström"), "angstrom");
    }

    #[test]
    fn punctuation_is_dropped() {
        assert_eq!(slugify("C++ & Rust!"), "c-rust");
        assert_eq!(slugify("what's new?"), "whats-new");
        assert_eq!(slugify("!!!"), "");
    }
}
