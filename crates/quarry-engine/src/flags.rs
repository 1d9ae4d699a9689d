//! Flag pattern matching over candidate data.

use regex::bytes::{Regex, RegexBuilder};

use crate::error::Result;

/// Tags stripped by the XML re-search pass.
const XML_TAG: &str = r"<[^<]+>";

/// The compiled flag pattern plus the policies applied to raw matches.
///
/// Compiled once at manager start: case-insensitive, dot-matches-newline,
/// multi-line, over raw bytes.
pub(crate) struct FlagMatcher {
    pattern: Regex,
    xml: Regex,
}

impl FlagMatcher {
    /// Compile the configured flag format.
    pub(crate) fn compile(format: &str) -> Result<Self> {
        let pattern = RegexBuilder::new(format)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .multi_line(true)
            .build()?;
        let xml = RegexBuilder::new(XML_TAG).build()?;
        Ok(Self { pattern, xml })
    }

    /// Search `data` for a qualifying flag.
    ///
    /// A raw regex match qualifies when it decodes as UTF-8 and is printable;
    /// under `strict` it must additionally span the entire candidate data.
    pub(crate) fn search(&self, data: &[u8], strict: bool) -> Option<String> {
        let m = self.pattern.find(data)?;
        let found = std::str::from_utf8(m.as_bytes()).ok()?;
        if !is_printable(found) {
            return None;
        }
        if strict && m.as_bytes().len() != data.len() {
            return None;
        }
        Some(found.to_string())
    }

    /// Remove XML-ish tags from `data`. Returns `None` when nothing changed.
    ///
    /// Some challenges wrap flags in markup; the stripped form is searched in
    /// addition to the original.
    pub(crate) fn strip_xml(&self, data: &[u8]) -> Option<Vec<u8>> {
        let stripped = self.xml.replace_all(data, b"".as_slice());
        if stripped.as_ref() == data {
            None
        } else {
            Some(stripped.into_owned())
        }
    }
}

/// Printable ASCII plus common whitespace.
fn is_printable(s: &str) -> bool {
    s.bytes()
        .all(|b| (0x20..=0x7e).contains(&b) || b == b'\n' || b == b'\r' || b == b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> FlagMatcher {
        FlagMatcher::compile(r"FLAG\{[^}]+\}").expect("compile")
    }

    #[test]
    fn finds_embedded_flag() {
        let m = matcher();
        assert_eq!(
            m.search(b"noise FLAG{abc} noise", false).as_deref(),
            Some("FLAG{abc}")
        );
    }

    #[test]
    fn match_is_case_insensitive() {
        let m = matcher();
        assert_eq!(m.search(b"flag{abc}", false).as_deref(), Some("flag{abc}"));
    }

    #[test]
    fn strict_requires_whole_span() {
        let m = matcher();
        assert!(m.search(b"prefix FLAG{abc}", true).is_none());
        assert_eq!(m.search(b"FLAG{abc}", true).as_deref(), Some("FLAG{abc}"));
    }

    #[test]
    fn unprintable_matches_are_rejected() {
        let m = FlagMatcher::compile(r"FLAG\{.+\}").expect("compile");
        assert!(m.search(b"FLAG{\x01\x02}", false).is_none());
    }

    #[test]
    fn invalid_utf8_never_panics() {
        let m = matcher();
        assert!(m.search(b"\xff\xfe not a flag \xff", false).is_none());
    }

    #[test]
    fn xml_stripping_detects_change() {
        let m = matcher();
        assert_eq!(
            m.strip_xml(b"<x>FLAG{abc}</x>").as_deref(),
            Some(b"FLAG{abc}".as_slice())
        );
        assert!(m.strip_xml(b"FLAG{abc}").is_none());
    }

    #[test]
    fn dot_spans_newlines() {
        let m = FlagMatcher::compile(r"FLAG\{.+\}").expect("compile");
        assert_eq!(
            m.search(b"FLAG{ab\ncd}", false).as_deref(),
            Some("FLAG{ab\ncd}")
        );
    }

    #[test]
    fn bad_pattern_is_an_error() {
        assert!(FlagMatcher::compile("FLAG{[").is_err());
    }
}
