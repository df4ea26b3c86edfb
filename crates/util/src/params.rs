//! CLI parameter parsing.
//!
//! Run parameters arrive as `key=value` strings. Values that look like JSON
//! literals (objects, arrays, booleans, numbers, `null`) are parsed into
//! their typed form; everything else stays a string. Parameter names are
//! rejected when they contain shell special characters or `$`, which would
//! collide with template syntax.

use anyhow::{Result, bail};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static PARAM_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("valid parameter name pattern"));

/// Returns true when a parameter name is safe to use as an input name.
pub fn is_valid_parameter_name(name: &str) -> bool {
    PARAM_NAME_RE.is_match(name)
}

/// Parses a single CLI value with JSON-literal detection.
pub fn parse_param_value(raw: &str) -> Value {
    let trimmed = raw.trim_start();
    let looks_like_json = trimmed.starts_with('{')
        || trimmed.starts_with('[')
        || raw == "true"
        || raw == "false"
        || raw == "null"
        || raw.parse::<f64>().is_ok();
    if looks_like_json
        && let Ok(parsed) = serde_json::from_str::<Value>(raw)
    {
        return parsed;
    }
    Value::String(raw.to_string())
}

/// Parses `key=value` pairs into an ordered parameter map.
///
/// The first `=` splits key from value, so values may contain `=` freely.
/// Empty values are preserved as empty strings.
pub fn parse_param_pairs<'a, I>(pairs: I) -> Result<Vec<(String, Value)>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut parsed = Vec::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("invalid parameter '{pair}': expected key=value");
        };
        if key.is_empty() {
            bail!("invalid parameter '{pair}': empty parameter name");
        }
        parsed.push((key.to_string(), parse_param_value(value)));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_typed_literals() {
        assert_eq!(parse_param_value("true"), json!(true));
        assert_eq!(parse_param_value("42"), json!(42));
        assert_eq!(parse_param_value("3.5"), json!(3.5));
        assert_eq!(parse_param_value(r#"{"a": 1}"#), json!({"a": 1}));
        assert_eq!(parse_param_value("[1, 2]"), json!([1, 2]));
    }

    #[test]
    fn keeps_plain_strings() {
        assert_eq!(parse_param_value("hello"), json!("hello"));
        assert_eq!(parse_param_value("{not json"), json!("{not json"));
        assert_eq!(parse_param_value(""), json!(""));
    }

    #[test]
    fn splits_on_first_equals() {
        let parsed = parse_param_pairs(["query=a=b", "empty="]).expect("parse pairs");
        assert_eq!(parsed[0], ("query".to_string(), json!("a=b")));
        assert_eq!(parsed[1], ("empty".to_string(), json!("")));
    }

    #[test]
    fn rejects_malformed_pairs() {
        assert!(parse_param_pairs(["no-equals"]).is_err());
        assert!(parse_param_pairs(["=value"]).is_err());
    }

    #[test]
    fn validates_parameter_names() {
        assert!(is_valid_parameter_name("file_path"));
        assert!(is_valid_parameter_name("api-key"));
        assert!(is_valid_parameter_name("_private"));
        assert!(!is_valid_parameter_name("foo$bar"));
        assert!(!is_valid_parameter_name("a;b"));
        assert!(!is_valid_parameter_name("1leading"));
        assert!(!is_valid_parameter_name(""));
    }
}
