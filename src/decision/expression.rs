use crate::models::Variables;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
        };
        write!(f, "{symbol}")
    }
}

/// Expression computing one output cell of a matched rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputExpression {
    Literal { value: Value },
    /// Reference to an input variable; missing variables are a failure
    Variable { name: String },
    Arithmetic {
        op: ArithmeticOp,
        left: Box<OutputExpression>,
        right: Box<OutputExpression>,
    },
    Concat { parts: Vec<OutputExpression> },
    Function {
        name: String,
        args: Vec<OutputExpression>,
    },
}

impl OutputExpression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable { name: name.into() }
    }

    pub fn arithmetic(op: ArithmeticOp, left: OutputExpression, right: OutputExpression) -> Self {
        Self::Arithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn concat(parts: Vec<OutputExpression>) -> Self {
        Self::Concat { parts }
    }

    pub fn function(name: impl Into<String>, args: Vec<OutputExpression>) -> Self {
        Self::Function {
            name: name.into(),
            args,
        }
    }

    pub fn evaluate(&self, variables: &Variables) -> Result<Value, String> {
        match self {
            Self::Literal { value } => Ok(value.clone()),
            Self::Variable { name } => variables
                .get(name)
                .cloned()
                .ok_or_else(|| format!("unknown variable '{name}'")),
            Self::Arithmetic { op, left, right } => {
                let l = numeric_operand(&left.evaluate(variables)?, *op)?;
                let r = numeric_operand(&right.evaluate(variables)?, *op)?;
                let result = match op {
                    ArithmeticOp::Add => l + r,
                    ArithmeticOp::Subtract => l - r,
                    ArithmeticOp::Multiply => l * r,
                    ArithmeticOp::Divide if r == 0.0 => return Err("division by zero".to_string()),
                    ArithmeticOp::Divide => l / r,
                };
                float_value(result)
            }
            Self::Concat { parts } => {
                let mut out = String::new();
                for part in parts {
                    out.push_str(&render(&part.evaluate(variables)?)?);
                }
                Ok(Value::String(out))
            }
            Self::Function { name, args } => {
                let values = args
                    .iter()
                    .map(|a| a.evaluate(variables))
                    .collect::<Result<Vec<_>, _>>()?;
                call_function(name, &values)
            }
        }
    }
}

fn numeric_operand(value: &Value, op: ArithmeticOp) -> Result<f64, String> {
    value
        .as_f64()
        .ok_or_else(|| format!("operand {value} of '{op}' is not a number"))
}

fn float_value(value: f64) -> Result<Value, String> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| format!("{value} is not a finite number"))
}

fn render(value: &Value) -> Result<String, String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("cannot concatenate {other}")),
    }
}

fn call_function(name: &str, args: &[Value]) -> Result<Value, String> {
    let single = || match args {
        [only] => Ok(only),
        _ => Err(format!(
            "function '{name}' takes one argument, {} given",
            args.len()
        )),
    };

    match name {
        "upper" => match single()? {
            Value::String(s) => Ok(Value::String(s.to_uppercase())),
            other => Err(format!("upper expects a string, got {other}")),
        },
        "lower" => match single()? {
            Value::String(s) => Ok(Value::String(s.to_lowercase())),
            other => Err(format!("lower expects a string, got {other}")),
        },
        "length" => match single()? {
            Value::String(s) => Ok(Value::from(s.chars().count())),
            Value::Array(items) => Ok(Value::from(items.len())),
            other => Err(format!("length expects a string or list, got {other}")),
        },
        "to_number" => match single()? {
            Value::Number(n) => Ok(Value::Number(n.clone())),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("'{s}' is not a number"))
                .and_then(float_value),
            other => Err(format!("to_number cannot convert {other}")),
        },
        unknown => Err(format!("unknown function '{unknown}'")),
    }
}

/// Declared type of an output column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    String,
    /// Always produced as a floating point number
    Number,
    Boolean,
    Any,
}

impl OutputType {
    /// Convert a computed value to this type; null passes through
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (Self::Any, value) => Ok(value),
            (Self::String, Value::String(s)) => Ok(Value::String(s)),
            (Self::String, Value::Number(n)) => Ok(Value::String(n.to_string())),
            (Self::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),
            (Self::Number, Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| format!("{n} is not representable as a number"))
                .and_then(float_value),
            (Self::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("cannot convert '{s}' to number"))
                .and_then(float_value),
            (Self::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
            (Self::Boolean, Value::String(s)) => match s.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(format!("cannot convert '{s}' to boolean")),
            },
            (ty, value) => Err(format!("cannot convert {value} to {ty:?}")),
        }
    }
}
