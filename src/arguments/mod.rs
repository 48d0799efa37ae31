//! Call arguments, either literal or evaluated at collection time.
//!
//! Arguments given as a mapping are passed through unchanged. Arguments given
//! as a string are a deferred expression: an object literal whose values may
//! use a small time vocabulary (`now()`, `datetime(...)`, `timedelta(...)`
//! and `+`/`-` between them). The expression is parsed once at load time and
//! evaluated at the start of every cycle against that cycle's clock.
//!
//! Instants render as RFC 3339 UTC strings with second precision; durations
//! that reach the output unconsumed render as a number of seconds.

mod parser;

use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeDelta, TimeZone, Utc};
use serde_json::{Map, Number, Value};

use crate::{HuginnError, Result};
use parser::{ArgExpr, BinaryOp, TIMEDELTA_UNITS};

/// Arguments for a remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentSpec {
    Literal(Map<String, Value>),
    Deferred(Expression),
}

/// A parsed deferred-argument expression.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: ArgExpr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim().to_string();
        let root = parser::parse(&source)?;
        Ok(Self { source, root })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate with `now` standing in for the current instant.
    pub fn evaluate(&self, now: DateTime<Utc>) -> Result<Map<String, Value>> {
        let evaluator = Evaluator { now };
        match evaluator.eval(&self.root)?.into_json() {
            Value::Object(map) => Ok(map),
            _ => Err(HuginnError::ArgumentResolution(
                "arguments must evaluate to a mapping".into(),
            )),
        }
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Default for ArgumentSpec {
    fn default() -> Self {
        Self::Literal(Map::new())
    }
}

impl ArgumentSpec {
    /// Classify a raw configured value. `null` means no arguments.
    pub fn from_raw(raw: Value) -> Result<Self> {
        match raw {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Ok(Self::Literal(map)),
            Value::String(source) => Ok(Self::Deferred(Expression::parse(&source)?)),
            other => Err(HuginnError::ArgumentResolution(format!(
                "arguments must be a mapping or an expression string, got {other}"
            ))),
        }
    }

    /// Produce the concrete arguments for one cycle.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<Map<String, Value>> {
        match self {
            Self::Literal(map) => Ok(map.clone()),
            Self::Deferred(expression) => expression.evaluate(now),
        }
    }
}

/// Resolve a raw configured value in one step.
pub fn resolve(raw: &Value, now: DateTime<Utc>) -> Result<Map<String, Value>> {
    ArgumentSpec::from_raw(raw.clone())?.resolve(now)
}

/// Render an instant the way remote APIs expect it.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Clone, PartialEq)]
enum Evaluated {
    Json(Value),
    Instant(DateTime<Utc>),
    Duration(TimeDelta),
}

impl Evaluated {
    fn into_json(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Instant(instant) => Value::String(format_instant(instant)),
            Self::Duration(delta) => {
                if delta.subsec_nanos() == 0 {
                    Value::from(delta.num_seconds())
                } else {
                    Number::from_f64(delta.num_milliseconds() as f64 / 1000.0)
                        .map_or(Value::Null, Value::Number)
                }
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Json(Value::Number(_)) => "number",
            Self::Json(_) => "value",
            Self::Instant(_) => "datetime",
            Self::Duration(_) => "timedelta",
        }
    }
}

fn error(message: impl Into<String>) -> HuginnError {
    HuginnError::ArgumentResolution(message.into())
}

struct Evaluator {
    now: DateTime<Utc>,
}

impl Evaluator {
    fn eval(&self, expr: &ArgExpr) -> Result<Evaluated> {
        Ok(match expr {
            ArgExpr::Null => Evaluated::Json(Value::Null),
            ArgExpr::Bool(b) => Evaluated::Json(Value::Bool(*b)),
            ArgExpr::Number(n) => Evaluated::Json(Value::Number(n.clone())),
            ArgExpr::String(s) => Evaluated::Json(Value::String(s.clone())),
            ArgExpr::Array(items) => Evaluated::Json(Value::Array(
                items
                    .iter()
                    .map(|item| self.eval(item).map(Evaluated::into_json))
                    .collect::<Result<_>>()?,
            )),
            ArgExpr::Object(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval(value)?.into_json());
                }
                Evaluated::Json(Value::Object(map))
            }
            ArgExpr::Now => Evaluated::Instant(self.now),
            ArgExpr::DateTime(args) => Evaluated::Instant(self.datetime(args)?),
            ArgExpr::TimeDelta(parts) => Evaluated::Duration(self.timedelta(parts)?),
            ArgExpr::Negate(inner) => match self.eval(inner)? {
                Evaluated::Duration(delta) => Evaluated::Duration(-delta),
                Evaluated::Json(Value::Number(n)) => Evaluated::Json(negate(&n)?),
                other => return Err(error(format!("cannot negate a {}", other.kind()))),
            },
            ArgExpr::Binary { op, left, right } => {
                self.binary(*op, self.eval(left)?, self.eval(right)?)?
            }
        })
    }

    fn binary(&self, op: BinaryOp, left: Evaluated, right: Evaluated) -> Result<Evaluated> {
        use Evaluated::{Duration, Instant, Json};

        let overflow = || error("datetime arithmetic out of range");
        Ok(match (op, left, right) {
            (BinaryOp::Add, Instant(t), Duration(d)) | (BinaryOp::Add, Duration(d), Instant(t)) => {
                Instant(t.checked_add_signed(d).ok_or_else(overflow)?)
            }
            (BinaryOp::Sub, Instant(t), Duration(d)) => {
                Instant(t.checked_sub_signed(d).ok_or_else(overflow)?)
            }
            (BinaryOp::Sub, Instant(a), Instant(b)) => Duration(a - b),
            (BinaryOp::Add, Duration(a), Duration(b)) => {
                Duration(a.checked_add(&b).ok_or_else(overflow)?)
            }
            (BinaryOp::Sub, Duration(a), Duration(b)) => {
                Duration(a.checked_sub(&b).ok_or_else(overflow)?)
            }
            (op, Json(Value::Number(a)), Json(Value::Number(b))) => Json(arithmetic(op, &a, &b)?),
            (op, left, right) => {
                let symbol = if op == BinaryOp::Add { '+' } else { '-' };
                return Err(error(format!(
                    "unsupported operand types for {symbol}: {} and {}",
                    left.kind(),
                    right.kind()
                )));
            }
        })
    }

    fn datetime(&self, args: &[ArgExpr]) -> Result<DateTime<Utc>> {
        let mut fields = [0_i64, 1, 1, 0, 0, 0];
        for (slot, arg) in fields.iter_mut().zip(args) {
            *slot = match self.eval(arg)? {
                Evaluated::Json(Value::Number(n)) => n
                    .as_i64()
                    .ok_or_else(|| error(format!("datetime() requires integers, got {n}")))?,
                other => {
                    return Err(error(format!(
                        "datetime() requires integers, got {}",
                        other.kind()
                    )));
                }
            };
        }
        let [year, month, day, hour, minute, second] = fields;
        let as_u32 = |v: i64| u32::try_from(v).ok();
        let year = i32::try_from(year).ok();
        let instant = match (year, as_u32(month), as_u32(day), as_u32(hour), as_u32(minute), as_u32(second)) {
            (Some(y), Some(mo), Some(d), Some(h), Some(mi), Some(s)) => {
                Utc.with_ymd_and_hms(y, mo, d, h, mi, s).single()
            }
            _ => None,
        };
        instant.ok_or_else(|| {
            error(format!(
                "invalid datetime({})",
                fields.map(|f| f.to_string()).join(", ")
            ))
        })
    }

    fn timedelta(&self, parts: &[(&'static str, ArgExpr)]) -> Result<TimeDelta> {
        let mut millis = 0.0;
        for (unit, expr) in parts {
            let amount = match self.eval(expr)? {
                Evaluated::Json(Value::Number(n)) => n.as_f64().unwrap_or_default(),
                other => {
                    return Err(error(format!(
                        "timedelta() {unit} must be a number, got {}",
                        other.kind()
                    )));
                }
            };
            let scale = TIMEDELTA_UNITS
                .iter()
                .find(|(name, _)| name == unit)
                .map_or(1.0, |(_, scale)| *scale);
            millis += amount * scale;
        }
        if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
            return Err(error("timedelta() out of range"));
        }
        TimeDelta::try_milliseconds(millis.round() as i64).ok_or_else(|| error("timedelta() out of range"))
    }
}

fn negate(n: &Number) -> Result<Value> {
    if let Some(i) = n.as_i64() {
        return i
            .checked_neg()
            .map(Value::from)
            .ok_or_else(|| error("integer overflow"));
    }
    n.as_f64()
        .and_then(|f| Number::from_f64(-f))
        .map(Value::Number)
        .ok_or_else(|| error(format!("cannot negate {n}")))
}

fn arithmetic(op: BinaryOp, a: &Number, b: &Number) -> Result<Value> {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
        };
        return result.map(Value::from).ok_or_else(|| error("integer overflow"));
    }
    let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
    };
    Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| error("arithmetic result is not a finite number"))
}
