//! URL-percent escaping for freeform key/value tokens.
//!
//! Row keys and values join their parts with `|`, so every freeform token
//! (attribute names, values, filenames, MIME types, path suffixes) is
//! escaped to keep the separator unambiguous. Everything outside the URL
//! "unreserved" set is escaped, which covers `|`, `%`, and whitespace.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

const TOKEN_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Escape one freeform token.
#[must_use]
pub fn escape(token: &str) -> String {
    utf8_percent_encode(token, TOKEN_ESCAPE).to_string()
}

/// Decode one escaped token. `None` when the escaped form is not valid
/// UTF-8 after decoding; callers treat that row as malformed.
#[must_use]
pub fn unescape(token: &str) -> Option<String> {
    percent_decode_str(token)
        .decode_utf8()
        .ok()
        .map(|cow| cow.into_owned())
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_separator_and_space() {
        assert_eq!(escape("text/html"), "text%2Fhtml");
        assert_eq!(escape("a|b"), "a%7Cb");
        assert_eq!(escape("two words"), "two%20words");
        assert_eq!(escape("foo.html"), "foo.html");
    }

    #[test]
    fn round_trips() {
        for token in ["", "plain", "a|b%c d", "ünïcode/✓", "100%"] {
            assert_eq!(unescape(&escape(token)).as_deref(), Some(token));
        }
    }

    #[test]
    fn unescape_rejects_invalid_utf8() {
        assert_eq!(unescape("%ff%fe"), None);
    }
}
