use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unary test applied to one input value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// Matches anything, null included
    Any,
    Equals { value: Value },
    NotEquals { value: Value },
    LessThan { value: f64 },
    LessOrEqual { value: f64 },
    GreaterThan { value: f64 },
    GreaterOrEqual { value: f64 },
    /// Inclusive range
    Between { min: f64, max: f64 },
    OneOf { values: Vec<Value> },
    IsNull,
    IsNotNull,
}

impl Condition {
    pub fn equals(value: impl Into<Value>) -> Self {
        Self::Equals {
            value: value.into(),
        }
    }

    pub fn not_equals(value: impl Into<Value>) -> Self {
        Self::NotEquals {
            value: value.into(),
        }
    }

    pub fn less_than(value: f64) -> Self {
        Self::LessThan { value }
    }

    pub fn less_or_equal(value: f64) -> Self {
        Self::LessOrEqual { value }
    }

    pub fn greater_than(value: f64) -> Self {
        Self::GreaterThan { value }
    }

    pub fn greater_or_equal(value: f64) -> Self {
        Self::GreaterOrEqual { value }
    }

    pub fn between(min: f64, max: f64) -> Self {
        Self::Between { min, max }
    }

    pub fn one_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::OneOf {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Test `input`. Null never satisfies a numeric comparison; any other
    /// non-numeric input to one is an error.
    pub fn evaluate(&self, input: &Value) -> Result<bool, String> {
        match self {
            Self::Any => Ok(true),
            Self::Equals { value } => Ok(values_equal(input, value)),
            Self::NotEquals { value } => Ok(!values_equal(input, value)),
            Self::LessThan { value } => compare(input, "<", |n| n < *value),
            Self::LessOrEqual { value } => compare(input, "<=", |n| n <= *value),
            Self::GreaterThan { value } => compare(input, ">", |n| n > *value),
            Self::GreaterOrEqual { value } => compare(input, ">=", |n| n >= *value),
            Self::Between { min, max } => compare(input, "between", |n| n >= *min && n <= *max),
            Self::OneOf { values } => Ok(values.iter().any(|v| values_equal(input, v))),
            Self::IsNull => Ok(input.is_null()),
            Self::IsNotNull => Ok(!input.is_null()),
        }
    }
}

/// Numbers compare by value so 10 equals 10.0
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) if left.is_number() && right.is_number() => l == r,
        _ => left == right,
    }
}

fn compare(input: &Value, op: &str, test: impl Fn(f64) -> bool) -> Result<bool, String> {
    match input {
        Value::Null => Ok(false),
        Value::Number(n) => n
            .as_f64()
            .map(test)
            .ok_or_else(|| format!("number {n} cannot be compared with '{op}'")),
        other => Err(format!(
            "cannot apply '{op}' to non-numeric input {other}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_comparisons() {
        assert!(Condition::less_than(10.0).evaluate(&json!(5)).unwrap());
        assert!(!Condition::greater_or_equal(10.0).evaluate(&json!(5)).unwrap());
        assert!(Condition::between(1.0, 10.0).evaluate(&json!(10)).unwrap());
        assert!(!Condition::less_than(10.0).evaluate(&Value::Null).unwrap());
        assert!(Condition::less_than(10.0).evaluate(&json!("abc")).is_err());
    }

    #[test]
    fn test_equality_treats_integers_and_floats_alike() {
        assert!(Condition::equals(10).evaluate(&json!(10.0)).unwrap());
        assert!(Condition::equals("test").evaluate(&json!("test")).unwrap());
        assert!(Condition::not_equals("a").evaluate(&json!("b")).unwrap());
        assert!(Condition::one_of(["a", "b"]).evaluate(&json!("b")).unwrap());
        assert!(!Condition::equals("1").evaluate(&json!(1)).unwrap());
    }

    #[test]
    fn test_null_checks() {
        assert!(Condition::IsNull.evaluate(&Value::Null).unwrap());
        assert!(Condition::IsNotNull.evaluate(&json!(false)).unwrap());
        assert!(Condition::Any.evaluate(&Value::Null).unwrap());
    }
}
