//! Pre-parse repair for decompiled AndroidManifest.xml text.
//!
//! Manifests coming back from the daemon frequently contain bytes a strict
//! XML parser rejects, and `<meta-data .../>` entries carry arbitrary
//! app-supplied attribute values that are a common source of parse
//! failures. Both are stripped here, before the document ever reaches the
//! XML reader.

use regex::Regex;
use std::sync::OnceLock;

/// Matches a self-closing `<meta-data ... />` tag, case-insensitively,
/// with the attribute span allowed to cross newlines. The quantifier must
/// stay non-greedy so two adjacent tags are removed independently instead
/// of one deletion swallowing everything between them.
///
/// The open/close `<meta-data>...</meta-data>` form is left untouched;
/// self-closing is the form decompilers emit in practice.
fn meta_data_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<meta-data.*?/>").unwrap())
}

/// XML 1.0 `Char` production.
fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Repair raw manifest text into a string safe to hand to an XML parser.
///
/// Total transform, never fails: drops every code point outside the XML
/// 1.0 `Char` production, then deletes all self-closing `meta-data` tags.
pub fn sanitize(raw: &str) -> String {
    let legal: String = raw.chars().filter(|c| is_xml_char(*c)).collect();
    meta_data_re().replace_all(&legal, "").into_owned()
}

/// Byte-input variant: decodes as UTF-8 with replacement on invalid
/// sequences (U+FFFD is XML-legal), then sanitizes.
pub fn sanitize_bytes(raw: &[u8]) -> String {
    sanitize(&String::from_utf8_lossy(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_illegal_control_characters() {
        let out = sanitize("<a>\u{0}\u{1}\u{B}\u{1F}ok\u{FFFE}</a>");
        assert_eq!(out, "<a>ok</a>");
    }

    #[test]
    fn keeps_whitespace_and_legal_planes() {
        let input = "<a>\t\r\n text \u{E000}\u{FFFD}\u{10000}</a>";
        assert_eq!(sanitize(input), input);
    }

    #[test]
    fn output_contains_only_xml_chars() {
        let input: String = (0u32..0x120)
            .filter_map(char::from_u32)
            .chain("<x/>".chars())
            .collect();
        assert!(sanitize(&input).chars().all(is_xml_char));
    }

    #[test]
    fn removes_self_closing_meta_data() {
        let out = sanitize(r#"<application><meta-data android:name="k" android:value="v" /><activity/></application>"#);
        assert_eq!(out, "<application><activity/></application>");
    }

    #[test]
    fn meta_data_removal_is_case_insensitive_and_multiline() {
        let out = sanitize("<a><META-DATA\n  android:name=\"k\"\n  android:value=\"v\"/></a>");
        assert_eq!(out, "<a></a>");
    }

    #[test]
    fn adjacent_meta_data_tags_removed_independently() {
        let out = sanitize("<a><meta-data x=\"1\"/>KEEP<meta-data y=\"2\"/></a>");
        assert_eq!(out, "<a>KEEP</a>");
    }

    #[test]
    fn open_close_meta_data_passes_through() {
        // Documented limitation: only the self-closing form is stripped.
        let input = "<a><meta-data android:name=\"k\">v</meta-data></a>";
        assert_eq!(sanitize(input), input);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = [
            "<a>\u{0}x<meta-data k=\"v\"/>y</a>",
            "plain text",
            "<meta-data/><meta-data\n/>",
            "",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn invalid_utf8_decodes_with_replacement() {
        let out = sanitize_bytes(b"<a>\xff\xfeok</a>");
        assert_eq!(out, "<a>\u{FFFD}\u{FFFD}ok</a>");
    }
}
