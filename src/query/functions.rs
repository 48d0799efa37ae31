//! Built-in functions callable from search expressions.

use serde_json::Value;

use super::QueryError;
use super::eval::values_equal;

pub(crate) fn call(name: &str, args: Vec<Value>) -> Result<Value, QueryError> {
    match name {
        "length" => {
            let [subject] = exactly::<1>(name, args)?;
            match subject {
                Value::String(s) => Ok(Value::from(s.chars().count())),
                Value::Array(items) => Ok(Value::from(items.len())),
                Value::Object(object) => Ok(Value::from(object.len())),
                other => Err(invalid_type(name, &other)),
            }
        }
        "to_number" => {
            let [subject] = exactly::<1>(name, args)?;
            Ok(match subject {
                Value::Number(n) => Value::Number(n),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number),
                _ => Value::Null,
            })
        }
        "to_string" => {
            let [subject] = exactly::<1>(name, args)?;
            Ok(match subject {
                Value::String(s) => Value::String(s),
                other => Value::String(other.to_string()),
            })
        }
        "contains" => {
            let [subject, search] = exactly::<2>(name, args)?;
            match (subject, search) {
                (Value::Array(items), search) => {
                    Ok(Value::Bool(items.iter().any(|item| values_equal(item, &search))))
                }
                (Value::String(s), Value::String(needle)) => Ok(Value::Bool(s.contains(&needle))),
                (Value::String(_), _) => Ok(Value::Bool(false)),
                (other, _) => Err(invalid_type(name, &other)),
            }
        }
        "starts_with" => {
            let [subject, prefix] = exactly::<2>(name, args)?;
            match (subject, prefix) {
                (Value::String(s), Value::String(p)) => Ok(Value::Bool(s.starts_with(&p))),
                (other, _) => Err(invalid_type(name, &other)),
            }
        }
        "keys" => {
            let [subject] = exactly::<1>(name, args)?;
            match subject {
                Value::Object(object) => Ok(Value::Array(
                    object.into_iter().map(|(k, _)| Value::String(k)).collect(),
                )),
                other => Err(invalid_type(name, &other)),
            }
        }
        "values" => {
            let [subject] = exactly::<1>(name, args)?;
            match subject {
                Value::Object(object) => Ok(Value::Array(object.into_iter().map(|(_, v)| v).collect())),
                other => Err(invalid_type(name, &other)),
            }
        }
        "not_null" => {
            if args.is_empty() {
                return Err(QueryError::eval(format!(
                    "function {name}() expects at least 1 argument"
                )));
            }
            Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null))
        }
        other => Err(QueryError::eval(format!("unknown function {other}()"))),
    }
}

fn exactly<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], QueryError> {
    let count = args.len();
    args.try_into().map_err(|_| {
        QueryError::eval(format!(
            "function {name}() expects {N} argument(s), got {count}"
        ))
    })
}

fn invalid_type(name: &str, value: &Value) -> QueryError {
    let kind = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    QueryError::eval(format!("function {name}() does not accept a {kind}"))
}
