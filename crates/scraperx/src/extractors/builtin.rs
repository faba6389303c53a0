// ABOUTME: Built-in value filters (trim, collapse, case, replace, regex, number, split, default).
// ABOUTME: builtin_filters() returns a registry suitable as a scraper's default filter scope.

//! Built-in filters.
//!
//! Every builtin except `default` passes a `null` value through untouched, so a
//! missing attribute stays missing. Non-string values other than `null` are
//! converted to their JSON text before string filters run.

use regex::Regex;
use serde_json::{Number, Value};

use crate::extractors::filters::FilterRegistry;

/// Returns a registry holding every built-in filter.
pub fn builtin_filters() -> FilterRegistry {
    FilterRegistry::new()
        .with("trim", |v, _| map_str(v, |s| s.trim().to_string()))
        .with("collapse", |v, _| map_str(v, |s| normalize_whitespace(&s)))
        .with("lower", |v, _| map_str(v, |s| s.to_lowercase()))
        .with("upper", |v, _| map_str(v, |s| s.to_uppercase()))
        .with("replace", |v, args| {
            let from = args.first().map(String::as_str).unwrap_or_default();
            let to = args.get(1).map(String::as_str).unwrap_or_default();
            if from.is_empty() {
                return v;
            }
            map_str(v, |s| s.replace(from, to))
        })
        .with("regex", regex_filter)
        .with("number", |v, _| match into_string(v) {
            Some(s) => parse_number(&s),
            None => Value::Null,
        })
        .with("split", |v, args| {
            let sep = args.first().map(String::as_str).unwrap_or(",");
            match into_string(v) {
                Some(s) => Value::Array(
                    s.split(sep)
                        .map(str::trim)
                        .filter(|part| !part.is_empty())
                        .map(|part| Value::String(part.to_string()))
                        .collect(),
                ),
                None => Value::Null,
            }
        })
        .with("default", |v, args| {
            let fallback = args.join(",");
            match v {
                Value::Null => Value::String(fallback),
                Value::String(s) if s.trim().is_empty() => Value::String(fallback),
                other => other,
            }
        })
}

/// Normalizes whitespace in a string by collapsing runs of whitespace into single spaces.
fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn into_string(v: Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn map_str(v: Value, f: impl FnOnce(String) -> String) -> Value {
    into_string(v).map_or(Value::Null, |s| Value::String(f(s)))
}

/// `regex:pattern[,group...]`
///
/// Runs the pattern once and keeps the non-empty, trimmed capture groups. When
/// group indexes are given (0-based, counting only capture groups) only those are
/// kept. One surviving group yields a string, several yield an array, none yields
/// `null`. An invalid pattern passes the value through.
fn regex_filter(v: Value, args: &[String]) -> Value {
    let Some(pattern) = args.first() else {
        return v;
    };
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "invalid regex filter pattern");
            return v;
        }
    };
    let keep: Vec<usize> = args[1..]
        .iter()
        .filter_map(|a| a.trim().parse().ok())
        .collect();

    let Some(text) = into_string(v) else {
        return Value::Null;
    };
    let Some(caps) = re.captures(&text) else {
        return Value::Null;
    };

    let mut groups: Vec<Value> = caps
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(i, _)| keep.is_empty() || keep.contains(&(i - 1)))
        .filter_map(|(_, m)| m)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(|s| Value::String(s.to_string()))
        .collect();

    match groups.len() {
        0 => Value::Null,
        1 => groups.remove(0),
        _ => Value::Array(groups),
    }
}

/// Parses the first number-looking run of the text, ignoring thousands separators.
fn parse_number(s: &str) -> Value {
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    let start = cleaned.find(|c: char| c.is_ascii_digit() || c == '-' || c == '.');
    let Some(start) = start else {
        return Value::Null;
    };
    let run: String = cleaned[start..]
        .chars()
        .enumerate()
        .take_while(|(i, c)| c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-'))
        .map(|(_, c)| c)
        .collect();

    if let Ok(n) = run.parse::<i64>() {
        return Value::Number(n.into());
    }
    run.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or(Value::Null, Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(name: &str, v: Value, args: &[&str]) -> Value {
        let registry = builtin_filters();
        let filter = registry.get(name).expect("builtin exists");
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        filter(v, &args)
    }

    #[test]
    fn test_string_filters() {
        assert_eq!(run("trim", json!("  a b  "), &[]), json!("a b"));
        assert_eq!(run("collapse", json!(" a \n\t b "), &[]), json!("a b"));
        assert_eq!(run("lower", json!("AbC"), &[]), json!("abc"));
        assert_eq!(run("upper", json!("AbC"), &[]), json!("ABC"));
        assert_eq!(run("replace", json!("a-b-c"), &["-", "+"]), json!("a+b+c"));
        assert_eq!(run("replace", json!("a-b"), &["-"]), json!("ab"));
    }

    #[test]
    fn test_null_passes_through() {
        for name in ["trim", "collapse", "lower", "upper", "number", "split", "regex"] {
            assert_eq!(run(name, Value::Null, &["x"]), Value::Null, "{name}");
        }
    }

    #[test]
    fn test_regex_single_group() {
        assert_eq!(
            run("regex", json!("Price: 12.50 USD"), &[r"([\d.]+)"]),
            json!("12.50")
        );
    }

    #[test]
    fn test_regex_multiple_groups_and_selection() {
        let v = json!("2024-05-06");
        assert_eq!(
            run("regex", v.clone(), &[r"(\d+)-(\d+)-(\d+)"]),
            json!(["2024", "05", "06"])
        );
        assert_eq!(
            run("regex", v.clone(), &[r"(\d+)-(\d+)-(\d+)", "0", "2"]),
            json!(["2024", "06"])
        );
        assert_eq!(run("regex", v, &[r"([a-z]+)"]), Value::Null);
    }

    #[test]
    fn test_regex_invalid_pattern_passes_through() {
        assert_eq!(run("regex", json!("abc"), &["(unclosed"]), json!("abc"));
    }

    #[test]
    fn test_number() {
        assert_eq!(run("number", json!("1,234 items"), &[]), json!(1234));
        assert_eq!(run("number", json!("$12.50"), &[]), json!(12.5));
        assert_eq!(run("number", json!("-3"), &[]), json!(-3));
        assert_eq!(run("number", json!("n/a"), &[]), Value::Null);
    }

    #[test]
    fn test_split() {
        assert_eq!(run("split", json!("a, b,,c"), &[]), json!(["a", "b", "c"]));
        assert_eq!(run("split", json!("a / b"), &["/"]), json!(["a", "b"]));
    }

    #[test]
    fn test_default() {
        assert_eq!(run("default", Value::Null, &["none"]), json!("none"));
        assert_eq!(run("default", json!("  "), &["none"]), json!("none"));
        assert_eq!(run("default", json!("set"), &["none"]), json!("set"));
    }
}
