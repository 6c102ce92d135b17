use regex::Regex;
use serde_json::Value;

use crate::dsl::ComparisonOperator;
use crate::error::NodeError;

/// Apply a static operator. `actual` is `None` when the reference did not
/// resolve. `JsExpression` is handled by the caller.
pub fn compare(op: &ComparisonOperator, actual: Option<&Value>, expected: &Value) -> Result<bool, NodeError> {
    let result = match op {
        ComparisonOperator::Contains => contains(actual, expected),
        ComparisonOperator::NotContains => !contains(actual, expected),
        ComparisonOperator::Equals => equals(actual, expected),
        ComparisonOperator::NotEquals => !equals(actual, expected),
        ComparisonOperator::StartWith => actual.is_some_and(|a| to_text(a).starts_with(&to_text(expected))),
        ComparisonOperator::EndWith => actual.is_some_and(|a| to_text(a).ends_with(&to_text(expected))),
        ComparisonOperator::IsEmpty => is_empty(actual),
        ComparisonOperator::NotEmpty => !is_empty(actual),
        ComparisonOperator::IsNull => matches!(actual, None | Some(Value::Null)),
        ComparisonOperator::NotNull => !matches!(actual, None | Some(Value::Null)),
        ComparisonOperator::Regex => matches_regex(actual, expected)?,
        ComparisonOperator::Gt => numeric(actual, expected, |a, b| a > b),
        ComparisonOperator::Gte => numeric(actual, expected, |a, b| a >= b),
        ComparisonOperator::Lt => numeric(actual, expected, |a, b| a < b),
        ComparisonOperator::Lte => numeric(actual, expected, |a, b| a <= b),
        ComparisonOperator::JsExpression => {
            return Err(NodeError::ExecutionError(
                "js_expression must be evaluated by the expression sandbox".into(),
            ))
        }
    };
    Ok(result)
}

/// Strings contain substrings, arrays contain elements, objects contain keys.
pub fn contains(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(Value::String(s)) => s.contains(&to_text(expected)),
        Some(Value::Array(items)) => items.iter().any(|item| equals(Some(item), expected)),
        Some(Value::Object(map)) => map.contains_key(&to_text(expected)),
        Some(Value::Number(n)) => n.to_string().contains(&to_text(expected)),
        _ => false,
    }
}

/// Loose equality: numbers compare numerically, numeric strings and
/// `"true"`/`"false"` compare against their typed counterparts.
pub fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return expected.is_null();
    };
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            match s.trim().to_ascii_lowercase().as_str() {
                "true" => *b,
                "false" => !*b,
                _ => false,
            }
        }
        _ => false,
    }
}

/// `null`, missing, `""`, `[]` and `{}` are empty.
pub fn is_empty(actual: Option<&Value>) -> bool {
    match actual {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        _ => false,
    }
}

fn matches_regex(actual: Option<&Value>, expected: &Value) -> Result<bool, NodeError> {
    let pattern = to_text(expected);
    let re = Regex::new(&pattern)
        .map_err(|e| NodeError::ConfigError(format!("invalid regex '{}': {}", pattern, e)))?;
    Ok(actual.is_some_and(|a| re.is_match(&to_text(a))))
}

fn numeric(actual: Option<&Value>, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(to_number), to_number(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(op: ComparisonOperator, actual: Value, expected: Value) -> bool {
        compare(&op, Some(&actual), &expected).unwrap()
    }

    #[test]
    fn test_is_empty_truth_table() {
        for v in [json!(""), json!([]), json!({}), Value::Null] {
            assert!(check(ComparisonOperator::IsEmpty, v.clone(), Value::Null), "{}", v);
            assert!(!check(ComparisonOperator::NotEmpty, v, Value::Null));
        }
        for v in [json!("x"), json!([1]), json!({"a": 1}), json!(0), json!(false)] {
            assert!(!check(ComparisonOperator::IsEmpty, v.clone(), Value::Null), "{}", v);
            assert!(check(ComparisonOperator::NotEmpty, v, Value::Null));
        }
        assert!(compare(&ComparisonOperator::IsEmpty, None, &Value::Null).unwrap());
    }

    #[test]
    fn test_equality_is_loose() {
        assert!(check(ComparisonOperator::Equals, json!(5), json!(5.0)));
        assert!(check(ComparisonOperator::Equals, json!("5"), json!(5)));
        assert!(check(ComparisonOperator::Equals, json!(true), json!("true")));
        assert!(check(ComparisonOperator::NotEquals, json!("a"), json!("b")));
        assert!(!check(ComparisonOperator::Equals, json!({"a": 1}), json!({"a": 2})));
    }

    #[test]
    fn test_regex_errors_on_bad_pattern() {
        assert!(check(ComparisonOperator::Regex, json!("order-123"), json!(r"^order-\d+$")));
        let err = compare(&ComparisonOperator::Regex, Some(&json!("x")), &json!("(")).unwrap_err();
        assert!(matches!(err, NodeError::ConfigError(_)));
    }

    #[test]
    fn test_numeric_requires_numbers() {
        assert!(check(ComparisonOperator::Gt, json!("10"), json!(5)));
        assert!(!check(ComparisonOperator::Gt, json!("ten"), json!(5)));
        assert!(!compare(&ComparisonOperator::Lt, None, &json!(5)).unwrap());
    }
}
