//! Frontmatter codec for the restricted YAML subset used by content files.
//!
//! The decoder recognizes a leading `---` fence, a block of `key: value`
//! lines, and a closing `---`. It never fails: a missing or malformed header
//! yields an empty mapping and the original text as body. The encoder
//! re-serializes values in insertion order; round-trips are semantically
//! stable but not guaranteed byte-identical.

use indexmap::IndexMap;

/// An insertion-ordered frontmatter mapping.
pub type Frontmatter = IndexMap<String, Value>;

/// A frontmatter value in the supported YAML subset.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Plain or quoted string.
    String(String),
    /// `true` / `false` literal.
    Bool(bool),
    /// Integer literal (`^\d+$`).
    Int(i64),
    /// Float literal (`^\d+\.\d+$`).
    Float(f64),
    /// Bracketed array, elements parsed recursively.
    Array(Vec<Value>),
    /// Calendar date, serialized as `YYYY-MM-DD`.
    ///
    /// The decoder never produces this variant; it exists so
    /// programmatically-built frontmatter can carry dates.
    Date {
        /// Four digit year.
        year: u16,
        /// Month (1-12).
        month: u8,
        /// Day of month (1-31).
        day: u8,
    },
    /// `null` / `~` literal.
    Null,
    /// `undefined` literal.
    Undefined,
}

impl Value {
    /// The string payload, when this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The array payload, when this is an array value.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// Result of splitting a document into frontmatter and body.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Parsed key/value mapping, empty when no header was found.
    pub frontmatter: Frontmatter,
    /// Document content with the header removed.
    pub body: String,
}

/// Split a document into its frontmatter mapping and body.
///
/// This never fails. Documents without a leading `---` fence, or with an
/// unterminated header, come back with an empty mapping and the full input
/// as body.
pub fn decode(raw: &str) -> Decoded {
    let input = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let mut rest = input;
    let Some(first_line) = next_line(&mut rest) else {
        return Decoded {
            frontmatter: Frontmatter::new(),
            body: input.to_string(),
        };
    };
    if first_line.trim_end() != "---" {
        return Decoded {
            frontmatter: Frontmatter::new(),
            body: input.to_string(),
        };
    }

    let mut header_lines = Vec::new();
    let mut closed = false;
    while let Some(line) = next_line(&mut rest) {
        if line.trim_end() == "---" {
            closed = true;
            break;
        }
        header_lines.push(line);
    }

    if !closed {
        // Unterminated header: fall back to treating the whole input as body.
        return Decoded {
            frontmatter: Frontmatter::new(),
            body: input.to_string(),
        };
    }

    // Blank lines between the closing fence and the body are part of the
    // header separator, not the body.
    while let Some(pos) = rest.find('\n') {
        if !rest[..pos].trim().is_empty() {
            break;
        }
        rest = &rest[pos + 1..];
    }

    Decoded {
        frontmatter: parse_header(&header_lines),
        body: rest.to_string(),
    }
}

/// Serialize a frontmatter mapping and body back into a document.
///
/// An empty mapping produces the body alone, with no fences.
pub fn encode(frontmatter: &Frontmatter, body: &str) -> String {
    if frontmatter.is_empty() {
        return body.to_string();
    }

    let mut out = String::from("---\n");
    for (key, value) in frontmatter {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&encode_value(value));
        out.push('\n');
    }
    out.push_str("---\n\n");
    out.push_str(body);
    out
}

fn next_line<'a>(rest: &mut &'a str) -> Option<&'a str> {
    if rest.is_empty() {
        return None;
    }
    match rest.find('\n') {
        Some(pos) => {
            let line = &rest[..pos];
            *rest = &rest[pos + 1..];
            Some(line)
        }
        None => {
            let line = *rest;
            *rest = "";
            Some(line)
        }
    }
}

fn parse_header(lines: &[&str]) -> Frontmatter {
    let mut frontmatter = Frontmatter::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some(colon) = trimmed.find(':') else {
            continue;
        };
        if colon == 0 {
            continue;
        }
        let key = trimmed[..colon].trim();
        let raw_value = trimmed[colon + 1..].trim();
        frontmatter.insert(key.to_string(), parse_value(raw_value));
    }
    frontmatter
}

/// Parse a raw scalar using the subset's precedence rules: quoted string,
/// bracketed array, boolean, integer, float, null, undefined, raw string.
fn parse_value(raw: &str) -> Value {
    if let Some(unquoted) = strip_quotes(raw) {
        return Value::String(unquoted);
    }

    if raw.len() >= 2 && raw.starts_with('[') && raw.ends_with(']') {
        let inner = raw[1..raw.len() - 1].trim();
        if inner.is_empty() {
            return Value::Array(Vec::new());
        }
        let items = split_top_level(inner)
            .into_iter()
            .map(|item| parse_value(item.trim()))
            .collect();
        return Value::Array(items);
    }

    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = raw.parse::<i64>() {
            return Value::Int(n);
        }
    }

    if is_simple_float(raw) {
        if let Ok(n) = raw.parse::<f64>() {
            return Value::Float(n);
        }
    }

    match raw {
        "null" | "~" => Value::Null,
        "undefined" => Value::Undefined,
        _ => Value::String(raw.to_string()),
    }
}

/// Strip a matching pair of single or double quotes, unescaping embedded
/// quotes of the same kind.
fn strip_quotes(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    if bytes.len() < 2 {
        return None;
    }
    let quote = match (bytes[0], bytes[bytes.len() - 1]) {
        (b'"', b'"') => '"',
        (b'\'', b'\'') => '\'',
        _ => return None,
    };
    let inner = &raw[1..raw.len() - 1];
    let escaped = format!("\\{quote}");
    Some(inner.replace(&escaped, &quote.to_string()))
}

/// `^\d+\.\d+$`
fn is_simple_float(raw: &str) -> bool {
    let Some((whole, frac)) = raw.split_once('.') else {
        return false;
    };
    !whole.is_empty()
        && !frac.is_empty()
        && whole.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b.is_ascii_digit())
}

/// Split on commas that sit outside brackets and quotes.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quote: Option<char> = None;
    let mut start = 0usize;

    for (i, c) in s.char_indices() {
        match c {
            '"' | '\'' => {
                if in_quote == Some(c) {
                    in_quote = None;
                } else if in_quote.is_none() {
                    in_quote = Some(c);
                }
            }
            '[' if in_quote.is_none() => depth += 1,
            ']' if in_quote.is_none() => depth = depth.saturating_sub(1),
            ',' if in_quote.is_none() && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn encode_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Undefined => "undefined".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(n) => n.to_string(),
        Value::Date { year, month, day } => format!("{year:04}-{month:02}-{day:02}"),
        Value::Array(items) => {
            let rendered: Vec<String> = items
                .iter()
                .map(|item| {
                    let serialized = encode_value(item);
                    // Elements whose raw text would be ambiguous inside the
                    // bracket syntax get an extra layer of quotes.
                    if let Value::String(s) = item
                        && (s.contains(',') || s.contains('[') || s.contains(']'))
                    {
                        format!("\"{serialized}\"")
                    } else {
                        serialized
                    }
                })
                .collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::String(s) => {
            if s.contains(':')
                || s.contains('#')
                || s.contains('\n')
                || s.contains('"')
                || s.contains('\'')
            {
                format!("\"{}\"", s.replace('"', "\\\""))
            } else {
                s.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_input_unchanged_without_header() {
        let decoded = decode("# Title\nBody");
        assert!(decoded.frontmatter.is_empty());
        assert_eq!(decoded.body, "# Title\nBody");
    }

    #[test]
    fn parses_typed_values() {
        let input = "---\ntitle: \"Hello: World\"\ntags: [a, b, c]\ndraft: false\nviews: 42\nrating: 4.5\nsubtitle: null\nlegacy: undefined\n---\nBody";
        let decoded = decode(input);
        assert_eq!(
            decoded.frontmatter.get("title"),
            Some(&Value::String("Hello: World".to_string()))
        );
        assert_eq!(
            decoded.frontmatter.get("tags"),
            Some(&Value::Array(vec![
                Value::String("a".to_string()),
                Value::String("b".to_string()),
                Value::String("c".to_string()),
            ]))
        );
        assert_eq!(decoded.frontmatter.get("draft"), Some(&Value::Bool(false)));
        assert_eq!(decoded.frontmatter.get("views"), Some(&Value::Int(42)));
        assert_eq!(decoded.frontmatter.get("rating"), Some(&Value::Float(4.5)));
        assert_eq!(decoded.frontmatter.get("subtitle"), Some(&Value::Null));
        assert_eq!(decoded.frontmatter.get("legacy"), Some(&Value::Undefined));
        assert_eq!(decoded.body, "Body");
    }

    #[test]
    fn skips_comments_and_invalid_lines() {
        let input = "---\n# build metadata\ntitle: Post\nnot a mapping line\n---\nBody";
        let decoded = decode(input);
        assert_eq!(decoded.frontmatter.len(), 1);
        assert_eq!(
            decoded.frontmatter.get("title"),
            Some(&Value::String("Post".to_string()))
        );
    }

    #[test]
    fn unterminated_header_falls_back_to_body() {
        let input = "---\ntitle: Post\nBody continues";
        let decoded = decode(input);
        assert!(decoded.frontmatter.is_empty());
        assert_eq!(decoded.body, input);
    }

    #[test]
    fn strips_bom_before_detection() {
        let input = "\u{feff}---\ntitle: Post\n---\nBody";
        let decoded = decode(input);
        assert_eq!(
            decoded.frontmatter.get("title"),
            Some(&Value::String("Post".to_string()))
        );
    }

    #[test]
    fn nested_arrays_split_at_top_level_only() {
        let decoded = decode("---\nmatrix: [[1, 2], [3, 4]]\n---\n");
        let Some(Value::Array(rows)) = decoded.frontmatter.get("matrix") else {
            panic!("expected array");
        };
        assert_eq!(
            rows[0],
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            rows[1],
            Value::Array(vec![Value::Int(3), Value::Int(4)])
        );
    }

    #[test]
    fn encode_preserves_insertion_order_and_quotes() {
        let mut frontmatter = Frontmatter::new();
        frontmatter.insert(
            "title".to_string(),
            Value::String("Hello: World".to_string()),
        );
        frontmatter.insert(
            "tags".to_string(),
            Value::Array(vec![
                Value::String("a".to_string()),
                Value::String("b".to_string()),
            ]),
        );
        frontmatter.insert(
            "published".to_string(),
            Value::Date {
                year: 2024,
                month: 3,
                day: 7,
            },
        );
        let encoded = encode(&frontmatter, "Body");
        assert_eq!(
            encoded,
            "---\ntitle: \"Hello: World\"\ntags: [a, b]\npublished: 2024-03-07\n---\n\nBody"
        );
    }

    #[test]
    fn encode_without_frontmatter_is_body_only() {
        assert_eq!(encode(&Frontmatter::new(), "Body"), "Body");
    }

    #[test]
    fn decode_encode_decode_is_a_fixpoint() {
        let input = "---\ntitle: \"Hello: World\"\ntags: [a, b, c]\ndraft: true\nviews: 10\n---\nBody text\n";
        let first = decode(input);
        let encoded = encode(&first.frontmatter, &first.body);
        let second = decode(&encoded);
        assert_eq!(first.frontmatter, second.frontmatter);
        assert_eq!(first.body, second.body);
    }
}
