//! Content-Disposition Header Codec
//!
//! Objects are stored with `attachment; filename*=UTF-8''<percent-encoded-name>`
//! (RFC 5987). Objects written by older releases carry the legacy
//! `attachment; filename="<name>"` or `attachment; filename=<name>` forms,
//! and some carry the RFC 5987 marker with reserved characters left
//! unescaped. The functions here build the canonical header and classify and
//! decode existing ones; they do no I/O.

use std::sync::LazyLock;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;

/// Parameter prefix of an RFC 5987 encoded filename.
pub const ENCODED_FILENAME_MARKER: &str = "filename*=UTF-8''";

/// Characters that may appear in an RFC 5987 value without escaping
/// (`attr-char`); everything else is percent-encoded.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Characters that must never appear unescaped after the marker.
const RESERVED: [char; 5] = [',', ';', '*', '"', '\''];

static QUOTED_FILENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"filename="([^"]+)""#).expect("valid regex"));

static BARE_FILENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"filename=([^;]+)").expect("valid regex"));

/// Percent-encode a filename as an RFC 5987 value.
#[must_use]
pub fn encode_filename(file_name: &str) -> String {
    utf8_percent_encode(file_name, ATTR_CHAR).to_string()
}

/// Build the canonical content-disposition header for a filename.
///
/// ```
/// use lupa_common::disposition::content_disposition_for;
///
/// assert_eq!(
///     content_disposition_for("a, b.pdf"),
///     "attachment; filename*=UTF-8''a%2C%20b.pdf"
/// );
/// ```
#[must_use]
pub fn content_disposition_for(file_name: &str) -> String {
    format!(
        "attachment; {ENCODED_FILENAME_MARKER}{}",
        encode_filename(file_name)
    )
}

/// Byte offset just past the RFC 5987 marker, matched case-insensitively.
fn encoded_value_start(header: &str) -> Option<usize> {
    header
        .to_ascii_lowercase()
        .find(&ENCODED_FILENAME_MARKER.to_ascii_lowercase())
        .map(|pos| pos + ENCODED_FILENAME_MARKER.len())
}

/// Whether a stored content-disposition header must be rewritten.
///
/// Legacy headers always need fixing. RFC 5987 headers need fixing only
/// when a reserved character (`,` `;` `*` `"` `'`) appears unescaped after
/// the marker.
#[must_use]
pub fn needs_fixing(header: &str) -> bool {
    match encoded_value_start(header) {
        Some(start) => header[start..].trim().contains(&RESERVED[..]),
        None => true,
    }
}

/// Best-effort recovery of the original filename from a stored header.
///
/// RFC 5987 values are percent-decoded; legacy values have surrounding
/// quotes stripped. Returns `None` when no filename parameter is present or
/// the encoded value is not valid UTF-8.
#[must_use]
pub fn extract_original_filename(header: &str) -> Option<String> {
    if let Some(start) = encoded_value_start(header) {
        let encoded = header[start..].split(';').next().unwrap_or_default().trim();
        if encoded.is_empty() {
            return None;
        }
        return percent_decode_str(encoded)
            .decode_utf8()
            .ok()
            .map(|name| name.into_owned());
    }

    QUOTED_FILENAME
        .captures(header)
        .or_else(|| BARE_FILENAME.captures(header))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().trim().trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_header_is_compliant() {
        for name in ["test.pdf", "a,b.pdf", "x;y*z.txt", "q\"uo'te.png", "åäö.pdf"] {
            assert!(
                !needs_fixing(&content_disposition_for(name)),
                "canonical header for {name} should not need fixing"
            );
        }
    }

    #[test]
    fn properly_encoded_header_needs_no_fix() {
        assert!(!needs_fixing("attachment; filename*=UTF-8''test%2Cfile.pdf"));
        assert!(!needs_fixing("attachment; filename*=utf-8''test.pdf"));
    }

    #[test]
    fn unescaped_reserved_characters_need_fix() {
        for header in [
            "attachment; filename*=UTF-8''test,file.pdf",
            "attachment; filename*=UTF-8''test;file.pdf",
            "attachment; filename*=UTF-8''test*file.pdf",
            "attachment; filename*=UTF-8''test\"file.pdf",
            "attachment; filename*=UTF-8''test'file.pdf",
        ] {
            assert!(needs_fixing(header), "{header} should need fixing");
        }
    }

    #[test]
    fn legacy_headers_need_fix() {
        assert!(needs_fixing("attachment; filename=\"test.pdf\""));
        assert!(needs_fixing("attachment; filename=test.pdf"));
        assert!(needs_fixing("inline; filename=\"document.txt\""));
    }

    #[test]
    fn extracts_and_decodes_rfc5987() {
        let cases = [
            ("attachment; filename*=UTF-8''test.pdf", "test.pdf"),
            ("attachment; filename*=UTF-8''test%2Cfile.pdf", "test,file.pdf"),
            ("attachment; filename*=UTF-8''test%20file.pdf", "test file.pdf"),
            ("attachment; filename*=UTF-8''%C3%A5%C3%A4%C3%B6.pdf", "åäö.pdf"),
        ];
        for (header, expected) in cases {
            assert_eq!(extract_original_filename(header).as_deref(), Some(expected));
        }
    }

    #[test]
    fn extracts_legacy_forms() {
        assert_eq!(
            extract_original_filename("attachment; filename=\"test.pdf\"").as_deref(),
            Some("test.pdf")
        );
        assert_eq!(
            extract_original_filename("attachment; filename=test.pdf").as_deref(),
            Some("test.pdf")
        );
        assert_eq!(
            extract_original_filename("inline; filename=\"document, final.txt\"").as_deref(),
            Some("document, final.txt")
        );
    }

    #[test]
    fn stops_at_parameter_separator() {
        assert_eq!(
            extract_original_filename("attachment; filename*=UTF-8''test.pdf; size=1234")
                .as_deref(),
            Some("test.pdf")
        );
    }

    #[test]
    fn no_filename_yields_none() {
        assert_eq!(extract_original_filename("attachment"), None);
        assert_eq!(extract_original_filename("attachment; filename*=UTF-8''"), None);
        assert_eq!(extract_original_filename("attachment; filename=\"\""), None);
    }

    #[test]
    fn invalid_utf8_escape_yields_none() {
        assert_eq!(
            extract_original_filename("attachment; filename*=UTF-8''%FF%FE.pdf"),
            None
        );
    }

    #[test]
    fn reserved_characters_round_trip() {
        for name in [
            "a,b.pdf",
            "a;b.pdf",
            "a*b.pdf",
            "a\"b.pdf",
            "a'b.pdf",
            ",;*\"'.txt",
            "report; final, v2 \"draft\" 'x'*.docx",
            "päätös 1/2.pdf",
        ] {
            let header = content_disposition_for(name);
            assert_eq!(
                extract_original_filename(&header).as_deref(),
                Some(name),
                "round trip failed for {name} via {header}"
            );
        }
    }

    #[test]
    fn encoding_keeps_attr_chars() {
        assert_eq!(encode_filename("a-b_c.d~e"), "a-b_c.d~e");
        assert_eq!(encode_filename("a b"), "a%20b");
        assert_eq!(encode_filename("ä"), "%C3%A4");
    }
}
