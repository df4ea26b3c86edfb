//! Template expressions over the shared store.
//!
//! The surface syntax is `${path}` where `path` is a dotted segment chain
//! with optional bracket indexing: `node.files[0].name`, `items[first]`,
//! `get-data.stdout`. This module owns parsing and classification; runtime
//! resolution lives in [`resolve`], static checking in [`validate`].

pub mod resolve;
pub mod validate;

pub use resolve::{resolve_output_source, resolve_params, resolve_single_expression};
pub use validate::validate_workflow_templates;

/// One parsed step of a template path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object key, e.g. `stdout`.
    Key(String),
    /// Zero-based array index, e.g. `[2]`.
    Index(usize),
    /// Convenience alias for index 0.
    First,
    /// Convenience alias for the last element.
    Last,
}

/// How a string parameter value relates to template syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateString {
    /// No `${...}` present; the string is used verbatim.
    Literal,
    /// The whole string is exactly one `${path}`; resolves to the native
    /// typed value.
    Single(String),
    /// Literal text and one or more references; every piece is coerced to
    /// a string and concatenated.
    Interpolation(Vec<InterpolationPart>),
}

/// A piece of an interpolated string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpolationPart {
    /// Literal text copied through.
    Text(String),
    /// A `${...}` expression body.
    Expression(String),
}

/// Extracts the bodies of all `${...}` expressions in a string, in order.
/// Delimiters are not included; unterminated references are ignored.
pub fn extract_expressions(value: &str) -> Vec<String> {
    let mut expressions = Vec::new();
    let mut remainder = value;

    while let Some(start) = remainder.find("${") {
        let after_start = &remainder[start + 2..];
        let Some(end) = after_start.find('}') else {
            break;
        };
        let expression = after_start[..end].trim();
        if !expression.is_empty() {
            expressions.push(expression.to_string());
        }
        remainder = &after_start[end + 1..];
    }

    expressions
}

/// Classifies a string parameter value.
pub fn classify(value: &str) -> TemplateString {
    if !value.contains("${") {
        return TemplateString::Literal;
    }

    let mut parts = Vec::new();
    let mut remainder = value;
    while let Some(start) = remainder.find("${") {
        let (before, rest) = remainder.split_at(start);
        let Some(end) = rest[2..].find('}') else {
            // Unterminated reference; keep the tail literal.
            parts.push(InterpolationPart::Text(format!("{before}{rest}")));
            remainder = "";
            break;
        };
        if !before.is_empty() {
            parts.push(InterpolationPart::Text(before.to_string()));
        }
        let expression = rest[2..2 + end].trim().to_string();
        parts.push(InterpolationPart::Expression(expression));
        remainder = &rest[2 + end + 1..];
    }
    if !remainder.is_empty() {
        parts.push(InterpolationPart::Text(remainder.to_string()));
    }

    match parts.as_slice() {
        [InterpolationPart::Expression(expression)] => TemplateString::Single(expression.clone()),
        [InterpolationPart::Text(_)] => TemplateString::Literal,
        _ => TemplateString::Interpolation(parts),
    }
}

/// Parses an expression body into path segments.
///
/// Grammar: `segment ( '.' segment | '[' index ']' )*` with
/// `segment = [A-Za-z_][A-Za-z0-9_-]*` and `index` a non-negative integer
/// or the aliases `first`/`last`.
pub fn parse_path(expression: &str) -> Result<Vec<PathSegment>, String> {
    let mut segments = Vec::new();
    let mut chars = expression.trim().chars().peekable();
    let mut current = String::new();
    let mut expect_segment = true;

    while let Some(character) = chars.next() {
        match character {
            '.' => {
                if current.is_empty() {
                    return Err(format!("empty segment in '{expression}'"));
                }
                segments.push(PathSegment::Key(std::mem::take(&mut current)));
                expect_segment = true;
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current)));
                } else if segments.is_empty() {
                    return Err(format!("'{expression}' cannot start with an index"));
                }
                let mut index = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(inner) => index.push(inner),
                        None => return Err(format!("unterminated index in '{expression}'")),
                    }
                }
                let segment = match index.trim() {
                    "first" => PathSegment::First,
                    "last" => PathSegment::Last,
                    number => PathSegment::Index(
                        number
                            .parse::<usize>()
                            .map_err(|_| format!("invalid index '{number}' in '{expression}'"))?,
                    ),
                };
                segments.push(segment);
                expect_segment = false;
            }
            other if other.is_ascii_alphanumeric() || other == '_' || other == '-' => {
                if current.is_empty()
                    && expect_segment
                    && !(other.is_ascii_alphabetic() || other == '_')
                {
                    return Err(format!(
                        "segment must start with a letter or underscore in '{expression}'"
                    ));
                }
                current.push(other);
            }
            other => {
                return Err(format!("invalid character '{other}' in '{expression}'"));
            }
        }
    }

    if !current.is_empty() {
        segments.push(PathSegment::Key(current));
    }
    if segments.is_empty() {
        return Err("empty template expression".to_string());
    }
    Ok(segments)
}

/// Splits an expression into its root segment and the remaining tail.
/// Returns `None` when the expression does not parse.
pub fn root_and_tail(expression: &str) -> Option<(String, Vec<PathSegment>)> {
    let mut segments = parse_path(expression).ok()?;
    match segments.first()? {
        PathSegment::Key(root) => {
            let root = root.clone();
            segments.remove(0);
            Some((root, segments))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_expressions_in_order() {
        let found = extract_expressions("a ${x.y} b ${z[0]} c");
        assert_eq!(found, vec!["x.y", "z[0]"]);
    }

    #[test]
    fn ignores_unterminated_reference() {
        assert!(extract_expressions("broken ${x.y").is_empty());
    }

    #[test]
    fn classifies_literal_single_and_interpolation() {
        assert_eq!(classify("plain text"), TemplateString::Literal);
        assert_eq!(
            classify("${get-data.stdout}"),
            TemplateString::Single("get-data.stdout".into())
        );
        match classify("count: ${data.count}!") {
            TemplateString::Interpolation(parts) => {
                assert_eq!(parts.len(), 3);
                assert_eq!(parts[0], InterpolationPart::Text("count: ".into()));
                assert_eq!(parts[1], InterpolationPart::Expression("data.count".into()));
            }
            other => panic!("expected interpolation, got {other:?}"),
        }
    }

    #[test]
    fn two_references_are_interpolation() {
        match classify("${a}${b}") {
            TemplateString::Interpolation(parts) => assert_eq!(parts.len(), 2),
            other => panic!("expected interpolation, got {other:?}"),
        }
    }

    #[test]
    fn parses_dotted_and_indexed_paths() {
        let segments = parse_path("node.files[0].name").expect("parse");
        assert_eq!(
            segments,
            vec![
                PathSegment::Key("node".into()),
                PathSegment::Key("files".into()),
                PathSegment::Index(0),
                PathSegment::Key("name".into()),
            ]
        );
    }

    #[test]
    fn parses_first_and_last_aliases() {
        let segments = parse_path("items[first]").expect("parse");
        assert_eq!(
            segments,
            vec![PathSegment::Key("items".into()), PathSegment::First]
        );
        let segments = parse_path("items[last]").expect("parse");
        assert_eq!(segments[1], PathSegment::Last);
    }

    #[test]
    fn hyphenated_node_ids_parse() {
        let (root, tail) = root_and_tail("get-data.stdout").expect("root");
        assert_eq!(root, "get-data");
        assert_eq!(tail, vec![PathSegment::Key("stdout".into())]);
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(parse_path("a..b").is_err());
        assert!(parse_path("a[b]").is_err());
        assert!(parse_path("a[1").is_err());
        assert!(parse_path("").is_err());
        assert!(parse_path("a b").is_err());
        assert!(parse_path("1abc").is_err());
    }
}
