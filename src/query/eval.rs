//! Tree-walking interpreter for [`Ast`] over `serde_json::Value`.

use serde_json::{Map, Value};

use super::QueryError;
use super::functions;
use super::parser::{Ast, Comparator};

pub(crate) fn evaluate(ast: &Ast, data: &Value) -> Result<Value, QueryError> {
    match ast {
        Ast::Identity => Ok(data.clone()),
        Ast::Field(name) => Ok(data
            .as_object()
            .and_then(|object| object.get(name))
            .cloned()
            .unwrap_or(Value::Null)),
        Ast::Literal(value) => Ok(value.clone()),
        Ast::Subexpression(left, right) | Ast::Pipe(left, right) => {
            let base = evaluate(left, data)?;
            evaluate(right, &base)
        }
        Ast::Index(index) => Ok(data
            .as_array()
            .and_then(|items| resolve_index(items.len(), *index).map(|i| items[i].clone()))
            .unwrap_or(Value::Null)),
        Ast::Slice { start, stop, step } => Ok(match data.as_array() {
            Some(items) => Value::Array(slice(items, *start, *stop, step.unwrap_or(1))),
            None => Value::Null,
        }),
        Ast::Projection(left, right) => match evaluate(left, data)? {
            Value::Array(items) => project(items.iter(), right),
            _ => Ok(Value::Null),
        },
        Ast::ObjectProjection(left, right) => match evaluate(left, data)? {
            Value::Object(object) => project(object.values(), right),
            _ => Ok(Value::Null),
        },
        Ast::Filter {
            left,
            right,
            condition,
        } => {
            let Value::Array(items) = evaluate(left, data)? else {
                return Ok(Value::Null);
            };
            let mut out = Vec::new();
            for item in &items {
                if is_truthy(&evaluate(condition, item)?) {
                    let value = evaluate(right, item)?;
                    if !value.is_null() {
                        out.push(value);
                    }
                }
            }
            Ok(Value::Array(out))
        }
        Ast::Flatten(inner) => {
            let Value::Array(items) = evaluate(inner, data)? else {
                return Ok(Value::Null);
            };
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Array(nested) => out.extend(nested),
                    other => out.push(other),
                }
            }
            Ok(Value::Array(out))
        }
        Ast::MultiSelectList(items) => {
            if data.is_null() {
                return Ok(Value::Null);
            }
            items
                .iter()
                .map(|item| evaluate(item, data))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        Ast::MultiSelectHash(pairs) => {
            if data.is_null() {
                return Ok(Value::Null);
            }
            let mut object = Map::with_capacity(pairs.len());
            for (key, expr) in pairs {
                object.insert(key.clone(), evaluate(expr, data)?);
            }
            Ok(Value::Object(object))
        }
        Ast::Or(left, right) => {
            let value = evaluate(left, data)?;
            if is_truthy(&value) {
                Ok(value)
            } else {
                evaluate(right, data)
            }
        }
        Ast::And(left, right) => {
            let value = evaluate(left, data)?;
            if is_truthy(&value) {
                evaluate(right, data)
            } else {
                Ok(value)
            }
        }
        Ast::Not(inner) => Ok(Value::Bool(!is_truthy(&evaluate(inner, data)?))),
        Ast::Comparison { op, left, right } => {
            let left = evaluate(left, data)?;
            let right = evaluate(right, data)?;
            Ok(compare(*op, &left, &right))
        }
        Ast::Function { name, args } => {
            let args = args
                .iter()
                .map(|arg| evaluate(arg, data))
                .collect::<Result<Vec<_>, _>>()?;
            functions::call(name, args)
        }
    }
}

fn project<'a>(items: impl Iterator<Item = &'a Value>, right: &Ast) -> Result<Value, QueryError> {
    let mut out = Vec::new();
    for item in items {
        let value = evaluate(right, item)?;
        if !value.is_null() {
            out.push(value);
        }
    }
    Ok(Value::Array(out))
}

/// JMESPath truthiness: empty containers, empty strings, `false` and `null` are false.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(object) => !object.is_empty(),
        Value::Number(_) => true,
    }
}

/// Equality with numbers compared by value (`1 == 1.0`).
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64() == r.as_f64(),
        (Value::Array(l), Value::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(l), Value::Object(r)) => {
            l.len() == r.len()
                && l.iter()
                    .all(|(k, v)| r.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => left == right,
    }
}

fn compare(op: Comparator, left: &Value, right: &Value) -> Value {
    match op {
        Comparator::Eq => Value::Bool(values_equal(left, right)),
        Comparator::Ne => Value::Bool(!values_equal(left, right)),
        _ => {
            let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) else {
                return Value::Null;
            };
            Value::Bool(match op {
                Comparator::Lt => l < r,
                Comparator::Lte => l <= r,
                Comparator::Gt => l > r,
                _ => l >= r,
            })
        }
    }
}

fn resolve_index(len: usize, index: i64) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { len + index } else { index };
    (0..len).contains(&resolved).then_some(resolved as usize)
}

fn slice(items: &[Value], start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<Value> {
    let len = items.len() as i64;
    let clamp = |bound: i64, low: i64, high: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(low, high)
    };

    let mut out = Vec::new();
    if step > 0 {
        let mut i = start.map_or(0, |s| clamp(s, 0, len));
        let end = stop.map_or(len, |s| clamp(s, 0, len));
        while i < end {
            out.push(items[i as usize].clone());
            i += step;
        }
    } else {
        let mut i = start.map_or(len - 1, |s| clamp(s, -1, len - 1));
        let end = stop.map_or(-1, |s| clamp(s, -1, len - 1));
        while i > end {
            out.push(items[i as usize].clone());
            i += step;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(!is_truthy(&json!({})));
        assert!(is_truthy(&json!(0)));
        assert!(is_truthy(&json!("x")));
    }

    #[test]
    fn numbers_compare_by_value() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!({"a": [1]}), &json!({"a": [1.0]})));
        assert!(!values_equal(&json!("1"), &json!(1)));
    }

    #[test]
    fn negative_index_wraps() {
        assert_eq!(resolve_index(3, -1), Some(2));
        assert_eq!(resolve_index(3, -4), None);
        assert_eq!(resolve_index(3, 3), None);
    }

    #[test]
    fn slices_follow_python_rules() {
        let items: Vec<Value> = (0..5).map(Value::from).collect();
        assert_eq!(slice(&items, Some(1), Some(3), 1), vec![json!(1), json!(2)]);
        assert_eq!(slice(&items, None, None, 2), vec![json!(0), json!(2), json!(4)]);
        assert_eq!(
            slice(&items, None, None, -1),
            vec![json!(4), json!(3), json!(2), json!(1), json!(0)]
        );
        assert_eq!(slice(&items, Some(-2), None, 1), vec![json!(3), json!(4)]);
    }
}
