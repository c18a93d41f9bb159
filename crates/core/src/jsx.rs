//! JSX escaping helpers shared by the processors.
//!
//! Generated component invocations embed raw diagram/math source inside
//! template literals, so backslash, backtick, `$`, and braces have to be
//! escaped (in that order — backslash first). The inverse is provided for
//! consumers that need the original source back.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Diagnostic;

/// Escape text for embedding inside a JSX template literal.
pub fn escape_template_literal(content: &str) -> String {
    content
        .replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace('$', "\\$")
        .replace('{', "\\{")
        .replace('}', "\\}")
}

/// Inverse of [`escape_template_literal`].
pub fn unescape_template_literal(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('\\' | '`' | '$' | '{' | '}')) => out.push(next),
                Some(next) => {
                    out.push(c);
                    out.push(next);
                }
                None => out.push(c),
            }
        } else {
            out.push(c);
        }
    }
    out
}

static OPEN_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(\w+)(?:\s[^>]*)?>").unwrap_or_else(|e| panic!("open tag pattern: {e}"))
});
static CLOSE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"</(\w+)>").unwrap_or_else(|e| panic!("close tag pattern: {e}"))
});

/// Best-effort check for gross JSX problems in transformed output.
///
/// This is simple open/close tag counting plus an unclosed-fragment check,
/// not a JSX parser; findings are warnings only.
pub fn validate_output(content: &str) -> Vec<Diagnostic> {
    let mut warnings = Vec::new();

    let open_count = OPEN_TAG
        .find_iter(content)
        .filter(|m| !m.as_str().ends_with("/>"))
        .count();
    let close_count = CLOSE_TAG.find_iter(content).count();

    if open_count != close_count {
        warnings.push(Diagnostic::new("mismatched JSX tags detected"));
    }

    if content.contains("<>") && !content.contains("</>") {
        warnings.push(Diagnostic::new("unclosed JSX fragment detected"));
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_in_backslash_first_order() {
        assert_eq!(escape_template_literal("\\"), "\\\\");
        assert_eq!(escape_template_literal("`"), "\\`");
        assert_eq!(escape_template_literal("$x{y}"), "\\$x\\{y\\}");
        // A pre-escaped dollar doubles the backslash, then escapes the dollar.
        assert_eq!(escape_template_literal("\\$"), "\\\\\\$");
    }

    #[test]
    fn escape_unescape_round_trips() {
        let samples = [
            "graph TD\nA-->B",
            "price is `$4` or \\$5",
            "body { margin: 0; }",
            "\\\\double and \\`tick",
        ];
        for sample in samples {
            let escaped = escape_template_literal(sample);
            assert_eq!(unescape_template_literal(&escaped), sample, "{sample:?}");
        }
    }

    #[test]
    fn balanced_output_passes_validation() {
        let warnings = validate_output("<div>text</div> <Widget x=\"1\" />");
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn mismatched_tags_are_flagged() {
        let warnings = validate_output("<div><span>text</div>");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("mismatched"));
    }

    #[test]
    fn unclosed_fragment_is_flagged() {
        let warnings = validate_output("<>fragment body");
        assert!(warnings.iter().any(|w| w.message.contains("fragment")));
    }
}
