//! Filter evaluation.
//!
//! Every filter maps one input to a stream of outputs. Outputs are pushed into
//! a callback as they are produced, so pipes never materialize the left side.

use super::parser::{BinOp, Expr, ObjKey};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use thiserror::Error;

/// Runtime error raised by a filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EvalError(pub String);

type Emit<'a> = &'a mut dyn FnMut(Value) -> Result<(), EvalError>;

/// Largest string `"s" * n` may build, in bytes.
const MAX_REPEAT_BYTES: usize = 64 * 1024 * 1024;

/// Builtins and the arities they accept.
const BUILTINS: &[(&str, &[usize])] = &[
    ("empty", &[0]),
    ("not", &[0]),
    ("length", &[0]),
    ("keys", &[0]),
    ("keys_unsorted", &[0]),
    ("values", &[0]),
    ("type", &[0]),
    ("add", &[0]),
    ("map", &[1]),
    ("select", &[1]),
    ("has", &[1]),
    ("sort", &[0]),
    ("sort_by", &[1]),
    ("group_by", &[1]),
    ("unique", &[0]),
    ("min", &[0]),
    ("max", &[0]),
    ("reverse", &[0]),
    ("first", &[0, 1]),
    ("last", &[0, 1]),
    ("tostring", &[0]),
    ("tonumber", &[0]),
    ("tojson", &[0]),
    ("fromjson", &[0]),
    ("join", &[1]),
    ("split", &[1]),
    ("to_entries", &[0]),
    ("from_entries", &[0]),
    ("with_entries", &[1]),
    ("range", &[1, 2]),
    ("floor", &[0]),
    ("sqrt", &[0]),
    ("any", &[0]),
    ("all", &[0]),
    ("flatten", &[0, 1]),
    ("contains", &[1]),
    ("startswith", &[1]),
    ("endswith", &[1]),
    ("ltrimstr", &[1]),
    ("rtrimstr", &[1]),
    ("ascii_downcase", &[0]),
    ("ascii_upcase", &[0]),
    ("recurse", &[0]),
    ("error", &[0, 1]),
];

/// Reject calls to unknown functions before anything runs.
///
/// Returns the `name/arity` of the first undefined call.
pub fn check(expr: &Expr) -> Result<(), String> {
    match expr {
        Expr::Identity | Expr::RecurseAll | Expr::Literal(_) | Expr::Array(None) => Ok(()),
        Expr::Field(inner, _) | Expr::Iterate(inner) | Expr::Try(inner) | Expr::Neg(inner) => {
            check(inner)
        }
        Expr::Array(Some(inner)) => check(inner),
        Expr::Index(a, b)
        | Expr::Pipe(a, b)
        | Expr::Comma(a, b)
        | Expr::Alt(a, b)
        | Expr::And(a, b)
        | Expr::Or(a, b)
        | Expr::Binary(_, a, b) => {
            check(a)?;
            check(b)
        }
        Expr::Slice(target, from, to) => {
            check(target)?;
            from.iter().chain(to.iter()).try_for_each(|e| check(e))
        }
        Expr::Object(entries) => entries.iter().try_for_each(|(key, value)| {
            if let ObjKey::Computed(key) = key {
                check(key)?;
            }
            value.iter().try_for_each(check)
        }),
        Expr::If(branches, otherwise) => {
            for (cond, body) in branches {
                check(cond)?;
                check(body)?;
            }
            otherwise.iter().try_for_each(|e| check(e))
        }
        Expr::Call(name, args) => {
            let known = BUILTINS
                .iter()
                .any(|(builtin, arities)| builtin == name && arities.contains(&args.len()));
            if !known {
                return Err(format!("{name}/{}", args.len()));
            }
            args.iter().try_for_each(check)
        }
    }
}

/// Run `expr` against `input`, pushing each output into `out`.
pub fn eval(expr: &Expr, input: &Value, out: Emit<'_>) -> Result<(), EvalError> {
    match expr {
        Expr::Identity => out(input.clone()),
        Expr::RecurseAll => recurse(input, out),
        Expr::Literal(value) => out(value.clone()),
        Expr::Field(target, name) => eval(target, input, &mut |v| out(field(&v, name)?)),
        Expr::Index(target, index) => {
            let indices = collect(index, input)?;
            eval(target, input, &mut |v| {
                indices
                    .iter()
                    .try_for_each(|i| out(index_value(&v, i)?))
            })
        }
        Expr::Slice(target, from, to) => {
            let froms = match from {
                Some(e) => collect(e, input)?,
                None => vec![Value::Null],
            };
            let tos = match to {
                Some(e) => collect(e, input)?,
                None => vec![Value::Null],
            };
            eval(target, input, &mut |v| {
                for to in &tos {
                    for from in &froms {
                        out(slice(&v, from, to)?)?;
                    }
                }
                Ok(())
            })
        }
        Expr::Iterate(target) => eval(target, input, &mut |v| {
            iterate(&v)?.into_iter().try_for_each(&mut *out)
        }),
        Expr::Try(inner) => {
            // keep whatever was produced before the error
            let mut produced = Vec::new();
            let _ = eval(inner, input, &mut |v| {
                produced.push(v);
                Ok(())
            });
            produced.into_iter().try_for_each(out)
        }
        Expr::Array(None) => out(Value::Array(Vec::new())),
        Expr::Array(Some(inner)) => out(Value::Array(collect(inner, input)?)),
        Expr::Object(entries) => build_object(entries, input, Map::new(), out),
        Expr::Neg(inner) => eval(inner, input, &mut |v| match v.as_f64() {
            Some(n) => out(number(-n)),
            None => Err(EvalError(format!("{} cannot be negated", describe(&v)))),
        }),
        Expr::Pipe(lhs, rhs) => eval(lhs, input, &mut |v| eval(rhs, &v, out)),
        Expr::Comma(lhs, rhs) => {
            eval(lhs, input, out)?;
            eval(rhs, input, out)
        }
        Expr::Alt(lhs, rhs) => {
            let mut truthy = Vec::new();
            let _ = eval(lhs, input, &mut |v| {
                if is_truthy(&v) {
                    truthy.push(v);
                }
                Ok(())
            });
            if truthy.is_empty() {
                eval(rhs, input, out)
            } else {
                truthy.into_iter().try_for_each(out)
            }
        }
        Expr::And(lhs, rhs) => eval(lhs, input, &mut |l| {
            if !is_truthy(&l) {
                return out(Value::Bool(false));
            }
            eval(rhs, input, &mut |r| out(Value::Bool(is_truthy(&r))))
        }),
        Expr::Or(lhs, rhs) => eval(lhs, input, &mut |l| {
            if is_truthy(&l) {
                return out(Value::Bool(true));
            }
            eval(rhs, input, &mut |r| out(Value::Bool(is_truthy(&r))))
        }),
        Expr::Binary(op, lhs, rhs) => {
            let rights = collect(rhs, input)?;
            let lefts = collect(lhs, input)?;
            for r in &rights {
                for l in &lefts {
                    out(binary(*op, l, r)?)?;
                }
            }
            Ok(())
        }
        Expr::If(branches, otherwise) => eval_if(branches, otherwise.as_deref(), input, out),
        Expr::Call(name, args) => call(name, args, input, out),
    }
}

/// All outputs of `expr` for `input`.
pub fn collect(expr: &Expr, input: &Value) -> Result<Vec<Value>, EvalError> {
    let mut values = Vec::new();
    eval(expr, input, &mut |v| {
        values.push(v);
        Ok(())
    })?;
    Ok(values)
}

fn eval_if(
    branches: &[(Expr, Expr)],
    otherwise: Option<&Expr>,
    input: &Value,
    out: Emit<'_>,
) -> Result<(), EvalError> {
    let Some(((cond, body), rest)) = branches.split_first() else {
        return match otherwise {
            Some(e) => eval(e, input, out),
            None => out(input.clone()),
        };
    };
    eval(cond, input, &mut |c| {
        if is_truthy(&c) {
            eval(body, input, out)
        } else {
            eval_if(rest, otherwise, input, out)
        }
    })
}

fn build_object(
    entries: &[(ObjKey, Option<Expr>)],
    input: &Value,
    acc: Map<String, Value>,
    out: Emit<'_>,
) -> Result<(), EvalError> {
    let Some(((key, value), rest)) = entries.split_first() else {
        return out(Value::Object(acc));
    };

    let keys = match key {
        ObjKey::Name(name) => vec![Value::String(name.clone())],
        ObjKey::Computed(e) => collect(e, input)?,
    };

    for key in keys {
        let Value::String(key) = key else {
            return Err(EvalError(format!(
                "Object keys must be strings, got {}",
                type_name(&key)
            )));
        };
        let values = match value {
            Some(e) => collect(e, input)?,
            None => vec![field(input, &key)?],
        };
        for v in values {
            let mut next = acc.clone();
            next.insert(key.clone(), v);
            build_object(rest, input, next, out)?;
        }
    }
    Ok(())
}

// ============================================================================
// Value helpers
// ============================================================================

/// Build a number, collapsing integral floats to integers.
pub fn number(n: f64) -> Value {
    if n.is_nan() {
        return Value::Null;
    }
    let n = n.clamp(f64::MIN, f64::MAX);
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

/// `type (value)` with the value shortened for messages.
fn describe(value: &Value) -> String {
    const MAX: usize = 11;
    let text = value.to_string();
    if text.chars().count() > MAX {
        let short: String = text.chars().take(MAX - 1).collect();
        format!("{} ({short}...)", type_name(value))
    } else {
        format!("{} ({text})", type_name(value))
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

/// Total order: null < false < true < numbers < strings < arrays < objects.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ord = compare(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            let mut xk: Vec<&String> = x.keys().collect();
            let mut yk: Vec<&String> = y.keys().collect();
            xk.sort();
            yk.sort();
            match xk.cmp(&yk) {
                Ordering::Equal => {}
                ord => return ord,
            }
            for key in xk {
                let ord = compare(&x[key.as_str()], &y[key.as_str()]);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

fn field(value: &Value, name: &str) -> Result<Value, EvalError> {
    match value {
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
        Value::Null => Ok(Value::Null),
        other => Err(EvalError(format!(
            "Cannot index {} with \"{name}\"",
            type_name(other)
        ))),
    }
}

fn index_value(value: &Value, index: &Value) -> Result<Value, EvalError> {
    match (value, index) {
        (Value::Null, Value::String(_) | Value::Number(_) | Value::Null) => Ok(Value::Null),
        (Value::Object(_), Value::String(name)) => field(value, name),
        (Value::Array(items), Value::Number(n)) => {
            let n = n.as_f64().unwrap_or(0.0).floor();
            let idx = if n < 0.0 { items.len() as f64 + n } else { n };
            if idx < 0.0 {
                return Ok(Value::Null);
            }
            Ok(items.get(idx as usize).cloned().unwrap_or(Value::Null))
        }
        (_, Value::String(name)) => Err(EvalError(format!(
            "Cannot index {} with \"{name}\"",
            type_name(value)
        ))),
        _ => Err(EvalError(format!(
            "Cannot index {} with {}",
            type_name(value),
            type_name(index)
        ))),
    }
}

fn slice_bounds(len: usize, from: &Value, to: &Value) -> Result<(usize, usize), EvalError> {
    let resolve = |bound: &Value, default: f64, round: fn(f64) -> f64| match bound {
        Value::Null => Ok(default),
        Value::Number(n) => {
            let n = round(n.as_f64().unwrap_or(0.0));
            let n = if n < 0.0 { len as f64 + n } else { n };
            Ok(n.clamp(0.0, len as f64))
        }
        other => Err(EvalError(format!(
            "Start and end indices of an array slice must be numbers, got {}",
            type_name(other)
        ))),
    };
    let start = resolve(from, 0.0, f64::floor)? as usize;
    let end = resolve(to, len as f64, f64::ceil)? as usize;
    Ok((start, end.max(start)))
}

fn slice(value: &Value, from: &Value, to: &Value) -> Result<Value, EvalError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Array(items) => {
            let (start, end) = slice_bounds(items.len(), from, to)?;
            Ok(Value::Array(items[start..end].to_vec()))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(chars.len(), from, to)?;
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        other => Err(EvalError(format!(
            "Cannot index {} with object",
            type_name(other)
        ))),
    }
}

fn iterate(value: &Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(map) => Ok(map.values().cloned().collect()),
        Value::Null => Err(EvalError("Cannot iterate over null".into())),
        other => Err(EvalError(format!("Cannot iterate over {}", describe(other)))),
    }
}

fn recurse(value: &Value, out: Emit<'_>) -> Result<(), EvalError> {
    out(value.clone())?;
    match value {
        Value::Array(items) => items.iter().try_for_each(|v| recurse(v, out)),
        Value::Object(map) => map.values().try_for_each(|v| recurse(v, out)),
        _ => Ok(()),
    }
}

// ============================================================================
// Operators
// ============================================================================

fn binary(op: BinOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    match op {
        BinOp::Add => add(l, r),
        BinOp::Sub => subtract(l, r),
        BinOp::Mul => multiply(l, r),
        BinOp::Div => divide(l, r),
        BinOp::Mod => modulo(l, r),
        BinOp::Eq => Ok(Value::Bool(compare(l, r) == Ordering::Equal)),
        BinOp::Ne => Ok(Value::Bool(compare(l, r) != Ordering::Equal)),
        BinOp::Lt => Ok(Value::Bool(compare(l, r) == Ordering::Less)),
        BinOp::Le => Ok(Value::Bool(compare(l, r) != Ordering::Greater)),
        BinOp::Gt => Ok(Value::Bool(compare(l, r) == Ordering::Greater)),
        BinOp::Ge => Ok(Value::Bool(compare(l, r) != Ordering::Less)),
    }
}

fn operand_error(l: &Value, r: &Value, verb: &str) -> EvalError {
    EvalError(format!("{} and {} cannot be {verb}", describe(l), describe(r)))
}

fn add(l: &Value, r: &Value) -> Result<Value, EvalError> {
    match (l, r) {
        (Value::Null, other) | (other, Value::Null) => Ok(other.clone()),
        (Value::Number(x), Value::Number(y)) => Ok(number(
            x.as_f64().unwrap_or(0.0) + y.as_f64().unwrap_or(0.0),
        )),
        (Value::String(x), Value::String(y)) => Ok(Value::String(format!("{x}{y}"))),
        (Value::Array(x), Value::Array(y)) => {
            Ok(Value::Array(x.iter().chain(y).cloned().collect()))
        }
        (Value::Object(x), Value::Object(y)) => {
            let mut merged = x.clone();
            for (k, v) in y {
                merged.insert(k.clone(), v.clone());
            }
            Ok(Value::Object(merged))
        }
        _ => Err(operand_error(l, r, "added")),
    }
}

fn subtract(l: &Value, r: &Value) -> Result<Value, EvalError> {
    match (l, r) {
        (Value::Number(x), Value::Number(y)) => Ok(number(
            x.as_f64().unwrap_or(0.0) - y.as_f64().unwrap_or(0.0),
        )),
        (Value::Array(x), Value::Array(y)) => Ok(Value::Array(
            x.iter()
                .filter(|item| !y.iter().any(|other| compare(item, other) == Ordering::Equal))
                .cloned()
                .collect(),
        )),
        _ => Err(operand_error(l, r, "subtracted")),
    }
}

fn deep_merge(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (k, v) in overlay {
        let next = match (merged.get(k), v) {
            (Some(Value::Object(a)), Value::Object(b)) => Value::Object(deep_merge(a, b)),
            _ => v.clone(),
        };
        merged.insert(k.clone(), next);
    }
    merged
}

fn multiply(l: &Value, r: &Value) -> Result<Value, EvalError> {
    match (l, r) {
        (Value::Number(x), Value::Number(y)) => Ok(number(
            x.as_f64().unwrap_or(0.0) * y.as_f64().unwrap_or(0.0),
        )),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            let n = n.as_f64().unwrap_or(0.0);
            if n <= 0.0 {
                return Ok(Value::Null);
            }
            // saturates for huge or infinite counts
            let count = n.ceil() as usize;
            match s.len().checked_mul(count) {
                Some(len) if len <= MAX_REPEAT_BYTES => Ok(Value::String(s.repeat(count))),
                _ => Err(EvalError("Repeat string result too long".into())),
            }
        }
        (Value::Object(x), Value::Object(y)) => Ok(Value::Object(deep_merge(x, y))),
        _ => Err(operand_error(l, r, "multiplied")),
    }
}

fn divide(l: &Value, r: &Value) -> Result<Value, EvalError> {
    match (l, r) {
        (Value::Number(x), Value::Number(y)) => {
            let divisor = y.as_f64().unwrap_or(0.0);
            if divisor == 0.0 {
                return Err(EvalError(format!(
                    "{} and {} cannot be divided because the divisor is zero",
                    describe(l),
                    describe(r)
                )));
            }
            Ok(number(x.as_f64().unwrap_or(0.0) / divisor))
        }
        (Value::String(x), Value::String(y)) => Ok(split(x, y)),
        _ => Err(operand_error(l, r, "divided")),
    }
}

fn modulo(l: &Value, r: &Value) -> Result<Value, EvalError> {
    match (l, r) {
        (Value::Number(x), Value::Number(y)) => {
            let divisor = y.as_f64().unwrap_or(0.0) as i64;
            if divisor == 0 {
                return Err(EvalError(format!(
                    "{} and {} cannot be divided because the divisor is zero",
                    describe(l),
                    describe(r)
                )));
            }
            let dividend = x.as_f64().unwrap_or(0.0) as i64;
            Ok(Value::from(dividend.wrapping_rem(divisor)))
        }
        _ => Err(operand_error(l, r, "divided")),
    }
}

fn split(s: &str, sep: &str) -> Value {
    if s.is_empty() {
        return Value::Array(Vec::new());
    }
    if sep.is_empty() {
        return Value::Array(s.chars().map(|c| Value::String(c.to_string())).collect());
    }
    Value::Array(s.split(sep).map(|p| Value::String(p.to_string())).collect())
}

// ============================================================================
// Builtins
// ============================================================================

fn call(name: &str, args: &[Expr], input: &Value, out: Emit<'_>) -> Result<(), EvalError> {
    match (name, args) {
        ("empty", []) => Ok(()),
        ("not", []) => out(Value::Bool(!is_truthy(input))),
        ("length", []) => out(length(input)?),
        ("keys", []) | ("keys_unsorted", []) => {
            let keys = match input {
                Value::Object(map) => {
                    let mut keys: Vec<&String> = map.keys().collect();
                    if name == "keys" {
                        keys.sort();
                    }
                    keys.into_iter().map(|k| Value::String(k.clone())).collect()
                }
                Value::Array(items) => (0..items.len()).map(Value::from).collect(),
                other => {
                    return Err(EvalError(format!("{} has no keys", describe(other))));
                }
            };
            out(Value::Array(keys))
        }
        ("values", []) => match input {
            Value::Null => Ok(()),
            other => out(other.clone()),
        },
        ("type", []) => out(Value::String(type_name(input).into())),
        ("add", []) => {
            let mut acc = Value::Null;
            for item in iterate(input)? {
                acc = add(&acc, &item)?;
            }
            out(acc)
        }
        ("map", [f]) => {
            let mut mapped = Vec::new();
            for item in iterate(input)? {
                mapped.extend(collect(f, &item)?);
            }
            out(Value::Array(mapped))
        }
        ("select", [f]) => eval(f, input, &mut |v| {
            if is_truthy(&v) {
                out(input.clone())
            } else {
                Ok(())
            }
        }),
        ("has", [f]) => eval(f, input, &mut |key| out(Value::Bool(has(input, &key)?))),
        ("sort", []) => {
            let mut items = sortable(input)?;
            items.sort_by(compare);
            out(Value::Array(items))
        }
        ("sort_by", [f]) => {
            let mut keyed = keyed(input, f)?;
            keyed.sort_by(|a, b| compare(&a.0, &b.0));
            out(Value::Array(keyed.into_iter().map(|(_, v)| v).collect()))
        }
        ("group_by", [f]) => {
            let mut keyed = keyed(input, f)?;
            keyed.sort_by(|a, b| compare(&a.0, &b.0));
            let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
            for (key, item) in keyed {
                match groups.last_mut() {
                    Some((last, group)) if compare(last, &key) == Ordering::Equal => {
                        group.push(item)
                    }
                    _ => groups.push((key, vec![item])),
                }
            }
            out(Value::Array(
                groups.into_iter().map(|(_, g)| Value::Array(g)).collect(),
            ))
        }
        ("unique", []) => {
            let mut items = sortable(input)?;
            items.sort_by(compare);
            items.dedup_by(|a, b| compare(a, b) == Ordering::Equal);
            out(Value::Array(items))
        }
        ("min", []) => {
            let items = sortable(input)?;
            out(items
                .into_iter()
                .min_by(compare)
                .unwrap_or(Value::Null))
        }
        ("max", []) => {
            let items = sortable(input)?;
            // last of equal maxima, as a stable sort would give
            out(items
                .into_iter()
                .max_by(compare)
                .unwrap_or(Value::Null))
        }
        ("reverse", []) => match input {
            Value::Array(items) => out(Value::Array(items.iter().rev().cloned().collect())),
            Value::String(s) => out(Value::String(s.chars().rev().collect())),
            Value::Null => out(Value::Array(Vec::new())),
            other => Err(EvalError(format!("Cannot reverse {}", describe(other)))),
        },
        ("first", []) => out(index_value(input, &Value::from(0))?),
        ("last", []) => out(index_value(input, &Value::from(-1))?),
        ("first", [f]) => match collect(f, input)?.into_iter().next() {
            Some(v) => out(v),
            None => Ok(()),
        },
        ("last", [f]) => match collect(f, input)?.pop() {
            Some(v) => out(v),
            None => Ok(()),
        },
        ("tostring", []) => match input {
            Value::String(_) => out(input.clone()),
            other => out(Value::String(other.to_string())),
        },
        ("tojson", []) => out(Value::String(input.to_string())),
        ("tonumber", []) => match input {
            Value::Number(_) => out(input.clone()),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(n) => out(number(n)),
                Err(_) => Err(EvalError(format!("Cannot parse '{s}' as JSON"))),
            },
            other => Err(EvalError(format!(
                "{} cannot be parsed as a number",
                describe(other)
            ))),
        },
        ("fromjson", []) => match input {
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(v) => out(v),
                Err(err) => Err(EvalError(format!("{s} (while parsing '{s}'): {err}"))),
            },
            other => Err(EvalError(format!(
                "{} only strings can be parsed",
                describe(other)
            ))),
        },
        ("join", [f]) => eval(f, input, &mut |sep| out(join(input, &sep)?)),
        ("split", [f]) => eval(f, input, &mut |sep| match (input, &sep) {
            (Value::String(s), Value::String(sep)) => out(split(s, sep)),
            _ => Err(EvalError("split input and separator must be strings".into())),
        }),
        ("to_entries", []) => match input {
            Value::Object(map) => out(Value::Array(
                map.iter()
                    .map(|(k, v)| {
                        let mut entry = Map::new();
                        entry.insert("key".into(), Value::String(k.clone()));
                        entry.insert("value".into(), v.clone());
                        Value::Object(entry)
                    })
                    .collect(),
            )),
            other => Err(EvalError(format!("{} has no keys", describe(other)))),
        },
        ("from_entries", []) => out(from_entries(input)?),
        ("with_entries", [f]) => {
            let mut entries = Vec::new();
            call("to_entries", &[], input, &mut |v| {
                entries = iterate(&v)?;
                Ok(())
            })?;
            let mut mapped = Vec::new();
            for entry in &entries {
                mapped.extend(collect(f, entry)?);
            }
            out(from_entries(&Value::Array(mapped))?)
        }
        ("range", [upto]) => {
            for end in collect(upto, input)? {
                let end = end.as_f64().ok_or_else(|| {
                    EvalError("Range bounds must be numeric".into())
                })?;
                count_up(0.0, end, &mut *out)?;
            }
            Ok(())
        }
        ("range", [from, upto]) => {
            let starts = collect(from, input)?;
            let ends = collect(upto, input)?;
            for start in &starts {
                for end in &ends {
                    let (Some(start), Some(end)) = (start.as_f64(), end.as_f64()) else {
                        return Err(EvalError("Range bounds must be numeric".into()));
                    };
                    count_up(start, end, &mut *out)?;
                }
            }
            Ok(())
        }
        ("floor", []) | ("sqrt", []) => match input.as_f64() {
            Some(n) if name == "floor" => out(number(n.floor())),
            Some(n) => out(number(n.sqrt())),
            None => Err(EvalError(format!("{} number required", describe(input)))),
        },
        ("any", []) => out(Value::Bool(iterate(input)?.iter().any(is_truthy))),
        ("all", []) => out(Value::Bool(iterate(input)?.iter().all(is_truthy))),
        ("flatten", []) => out(flatten(input, f64::INFINITY)?),
        ("flatten", [depth]) => eval(depth, input, &mut |d| match d.as_f64() {
            Some(d) if d >= 0.0 => out(flatten(input, d)?),
            _ => Err(EvalError("flatten depth must not be negative".into())),
        }),
        ("contains", [f]) => eval(f, input, &mut |b| {
            if type_name(input) != type_name(&b) {
                return Err(EvalError(format!(
                    "{} and {} cannot have their containment checked",
                    describe(input),
                    describe(&b)
                )));
            }
            out(Value::Bool(contains(input, &b)))
        }),
        ("startswith", [f]) | ("endswith", [f]) => eval(f, input, &mut |affix| {
            match (input, &affix) {
                (Value::String(s), Value::String(a)) => out(Value::Bool(if name == "startswith" {
                    s.starts_with(a.as_str())
                } else {
                    s.ends_with(a.as_str())
                })),
                _ => Err(EvalError(format!("{name}() requires string inputs"))),
            }
        }),
        ("ltrimstr", [f]) | ("rtrimstr", [f]) => eval(f, input, &mut |affix| {
            let trimmed = match (input, &affix) {
                (Value::String(s), Value::String(a)) if name == "ltrimstr" => {
                    s.strip_prefix(a.as_str()).map(str::to_string)
                }
                (Value::String(s), Value::String(a)) => {
                    s.strip_suffix(a.as_str()).map(str::to_string)
                }
                _ => None,
            };
            out(trimmed.map_or_else(|| input.clone(), Value::String))
        }),
        ("ascii_downcase", []) | ("ascii_upcase", []) => match input {
            Value::String(s) if name == "ascii_downcase" => {
                out(Value::String(s.to_ascii_lowercase()))
            }
            Value::String(s) => out(Value::String(s.to_ascii_uppercase())),
            other => Err(EvalError(format!(
                "{} cannot be case-converted, as it is not a string",
                describe(other)
            ))),
        },
        ("recurse", []) => recurse(input, out),
        ("error", []) => Err(error_value(input)),
        ("error", [f]) => eval(f, input, &mut |msg| Err(error_value(&msg))),
        _ => Err(EvalError(format!("{name}/{} is not defined", args.len()))),
    }
}

/// Emit `start`, `start + 1`, ... below `end`. Stops where adding one no
/// longer changes the float.
fn count_up(start: f64, end: f64, out: Emit<'_>) -> Result<(), EvalError> {
    let mut i = start;
    while i < end {
        out(number(i))?;
        let next = i + 1.0;
        if next == i {
            break;
        }
        i = next;
    }
    Ok(())
}

fn error_value(value: &Value) -> EvalError {
    match value {
        Value::String(s) => EvalError(s.clone()),
        other => EvalError(format!("{other} (not a string)")),
    }
}

fn length(value: &Value) -> Result<Value, EvalError> {
    match value {
        Value::Null => Ok(Value::from(0)),
        Value::Bool(_) => Err(EvalError(format!("{} has no length", describe(value)))),
        Value::Number(n) => Ok(number(n.as_f64().unwrap_or(0.0).abs())),
        Value::String(s) => Ok(Value::from(s.chars().count())),
        Value::Array(items) => Ok(Value::from(items.len())),
        Value::Object(map) => Ok(Value::from(map.len())),
    }
}

fn has(value: &Value, key: &Value) -> Result<bool, EvalError> {
    match (value, key) {
        (Value::Object(map), Value::String(k)) => Ok(map.contains_key(k)),
        (Value::Array(items), Value::Number(n)) => {
            let n = n.as_f64().unwrap_or(-1.0);
            Ok(n >= 0.0 && (n as usize) < items.len())
        }
        _ => Err(EvalError(format!(
            "Cannot check whether {} has a {} key",
            type_name(value),
            type_name(key)
        ))),
    }
}

fn sortable(value: &Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        other => Err(EvalError(format!(
            "{} cannot be sorted, as it is not an array",
            describe(other)
        ))),
    }
}

/// Pair each element with the array of `f`'s outputs for it.
fn keyed(value: &Value, f: &Expr) -> Result<Vec<(Value, Value)>, EvalError> {
    sortable(value)?
        .into_iter()
        .map(|item| Ok((Value::Array(collect(f, &item)?), item)))
        .collect()
}

fn join(value: &Value, sep: &Value) -> Result<Value, EvalError> {
    let Value::String(sep) = sep else {
        return Err(EvalError(format!("{} is not a valid separator", describe(sep))));
    };
    let mut joined = String::new();
    for (i, item) in iterate(value)?.iter().enumerate() {
        if i > 0 {
            joined.push_str(sep);
        }
        match item {
            Value::Null => {}
            Value::String(s) => joined.push_str(s),
            Value::Number(_) | Value::Bool(_) => joined.push_str(&item.to_string()),
            other => {
                return Err(EvalError(format!(
                    "Cannot join with {}",
                    type_name(other)
                )));
            }
        }
    }
    Ok(Value::String(joined))
}

fn from_entries(value: &Value) -> Result<Value, EvalError> {
    let mut map = Map::new();
    for entry in iterate(value)? {
        let Value::Object(entry) = &entry else {
            return Err(EvalError(format!(
                "Cannot index {} with \"key\"",
                type_name(&entry)
            )));
        };
        let key = ["key", "k", "name", "Name", "Key", "K"]
            .iter()
            .find_map(|k| entry.get(*k).filter(|v| is_truthy(v)));
        let key = match key {
            Some(Value::String(s)) => s.clone(),
            Some(other @ (Value::Number(_) | Value::Bool(_))) => other.to_string(),
            _ => {
                return Err(EvalError(
                    "Cannot use null (null) as object key".into(),
                ));
            }
        };
        let value = ["value", "v", "Value", "V"]
            .iter()
            .find_map(|k| entry.get(*k))
            .cloned()
            .unwrap_or(Value::Null);
        map.insert(key, value);
    }
    Ok(Value::Object(map))
}

fn flatten(value: &Value, depth: f64) -> Result<Value, EvalError> {
    fn walk(items: &[Value], depth: f64, acc: &mut Vec<Value>) {
        for item in items {
            match item {
                Value::Array(inner) if depth > 0.0 => walk(inner, depth - 1.0, acc),
                other => acc.push(other.clone()),
            }
        }
    }

    let Value::Array(items) = value else {
        return Err(EvalError(format!("Cannot flatten {}", describe(value))));
    };
    let mut acc = Vec::new();
    walk(items, depth, &mut acc);
    Ok(Value::Array(acc))
}

fn contains(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(a), Value::String(b)) => a.contains(b.as_str()),
        (Value::Array(a), Value::Array(b)) => b
            .iter()
            .all(|needle| a.iter().any(|item| type_name(item) == type_name(needle) && contains(item, needle))),
        (Value::Object(a), Value::Object(b)) => b.iter().all(|(k, needle)| {
            a.get(k)
                .is_some_and(|item| type_name(item) == type_name(needle) && contains(item, needle))
        }),
        _ => compare(a, b) == Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;
    use serde_json::json;

    fn run(filter: &str, input: Value) -> Result<Vec<Value>, EvalError> {
        let expr = parse(filter).unwrap();
        check(&expr).unwrap();
        collect(&expr, &input)
    }

    fn ok(filter: &str, input: Value) -> Vec<Value> {
        run(filter, input).unwrap()
    }

    #[test]
    fn test_paths() {
        assert_eq!(ok(".[1]", json!([1, 2, 3])), vec![json!(2)]);
        assert_eq!(ok(".[-1]", json!([1, 2, 3])), vec![json!(3)]);
        assert_eq!(ok(".a.b", json!({"a": {"b": 7}})), vec![json!(7)]);
        assert_eq!(ok(".missing.path", json!({})), vec![Value::Null]);
        assert_eq!(ok(".[1:]", json!([1, 2, 3])), vec![json!([2, 3])]);
        assert_eq!(ok(".[:-1]", json!("abc")), vec![json!("ab")]);
        assert_eq!(ok(".[]", json!({"a": 1, "b": 2})), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_recurse_all_preorder() {
        assert_eq!(
            ok("..", json!([1, [2]])),
            vec![json!([1, [2]]), json!(1), json!([2]), json!(2)]
        );
    }

    #[test]
    fn test_index_errors() {
        let err = run(".a", json!(5)).unwrap_err();
        assert_eq!(err.0, "Cannot index number with \"a\"");

        let err = run(".[]", json!(true)).unwrap_err();
        assert_eq!(err.0, "Cannot iterate over boolean (true)");

        assert_eq!(ok(".a?", json!(5)), Vec::<Value>::new());
        assert_eq!(ok("(1, error(\"x\"), 3)?", Value::Null), vec![json!(1)]);
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(ok("1 + 2 * 3", Value::Null), vec![json!(7)]);
        assert_eq!(ok("7 / 2", Value::Null), vec![json!(3.5)]);
        assert_eq!(ok("7 % 3", Value::Null), vec![json!(1)]);
        assert_eq!(ok("(1,2) + (10,20)", Value::Null), vec![
            json!(11),
            json!(12),
            json!(21),
            json!(22)
        ]);
        assert_eq!(ok("\"a,b\" / \",\"", Value::Null), vec![json!(["a", "b"])]);
        assert_eq!(ok("{a:1} + {b:2}", Value::Null), vec![json!({"a": 1, "b": 2})]);
        assert_eq!(ok("[1,2,3] - [2]", Value::Null), vec![json!([1, 3])]);
        assert_eq!(ok("-(.)", json!(4)), vec![json!(-4)]);

        let err = run("1 / 0", Value::Null).unwrap_err();
        assert!(err.0.contains("divisor is zero"));
        let err = run("{} + 1", Value::Null).unwrap_err();
        assert_eq!(err.0, "object ({}) and number (1) cannot be added");
    }

    #[test]
    fn test_string_repeat() {
        assert_eq!(ok("\"ab\" * 3", Value::Null), vec![json!("ababab")]);
        assert_eq!(ok("2.5 * \"x\"", Value::Null), vec![json!("xxx")]);
        assert_eq!(ok("\"x\" * 0", Value::Null), vec![Value::Null]);

        let err = run("\"x\" * 1e300", Value::Null).unwrap_err();
        assert_eq!(err.0, "Repeat string result too long");
        let err = run("\"abc\" * 1e18", Value::Null).unwrap_err();
        assert_eq!(err.0, "Repeat string result too long");
    }

    #[test]
    fn test_range_past_float_precision() {
        assert_eq!(
            ok("[range(9007199254740992; 9007199254740994)] | length", Value::Null),
            vec![json!(1)]
        );
        assert_eq!(ok("[range(3)]", Value::Null), vec![json!([0, 1, 2])]);
        assert_eq!(ok("[range(1; 3)]", Value::Null), vec![json!([1, 2])]);
    }

    #[test]
    fn test_comparison_order() {
        assert_eq!(
            ok("[null, true, false, 1, \"a\", [], {}] | sort", Value::Null),
            vec![json!([null, false, true, 1, "a", [], {}])]
        );
        assert_eq!(ok("1 == 1.0", Value::Null), vec![json!(true)]);
        assert_eq!(ok("{a:1,b:2} == {b:2,a:1}", Value::Null), vec![json!(true)]);
    }

    #[test]
    fn test_alternative_and_logic() {
        assert_eq!(ok(".a // \"d\"", json!({})), vec![json!("d")]);
        assert_eq!(ok("(false, 1, null, 2) // 3", Value::Null), vec![
            json!(1),
            json!(2)
        ]);
        assert_eq!(ok("true and (true, false)", Value::Null), vec![
            json!(true),
            json!(false)
        ]);
        assert_eq!(ok("false or false", Value::Null), vec![json!(false)]);
    }

    #[test]
    fn test_if() {
        let filter = "if . > 2 then \"big\" elif . > 0 then \"small\" else \"none\" end";
        assert_eq!(ok(filter, json!(3)), vec![json!("big")]);
        assert_eq!(ok(filter, json!(1)), vec![json!("small")]);
        assert_eq!(ok(filter, json!(0)), vec![json!("none")]);
        assert_eq!(ok("if . then 1 end", json!(false)), vec![json!(false)]);
    }

    #[test]
    fn test_object_construction() {
        assert_eq!(
            ok("{a, \"b\": .x}", json!({"a": 1, "x": 2})),
            vec![json!({"a": 1, "b": 2})]
        );
        assert_eq!(
            ok("{(.k): 1}", json!({"k": "dyn"})),
            vec![json!({"dyn": 1})]
        );
        assert_eq!(ok("{a: (1,2)}", Value::Null).len(), 2);
    }

    #[test]
    fn test_builtins() {
        assert_eq!(ok("length", json!("héllo")), vec![json!(5)]);
        assert_eq!(ok("keys", json!({"b": 1, "a": 2})), vec![json!(["a", "b"])]);
        assert_eq!(ok("map(. * 2)", json!([1, 2])), vec![json!([2, 4])]);
        assert_eq!(ok(".[] | select(. > 1)", json!([1, 2, 3])), vec![
            json!(2),
            json!(3)
        ]);
        assert_eq!(ok("add", json!(["a", "b"])), vec![json!("ab")]);
        assert_eq!(ok("add", json!([])), vec![Value::Null]);
        assert_eq!(ok("has(\"a\")", json!({"a": null})), vec![json!(true)]);
        assert_eq!(ok("join(\", \")", json!(["a", 1, null])), vec![json!("a, 1, ")]);
        assert_eq!(
            ok("to_entries", json!({"a": 1})),
            vec![json!([{"key": "a", "value": 1}])]
        );
        assert_eq!(
            ok("with_entries({key: .value, value: .key})", json!({"a": "x"})),
            vec![json!({"x": "a"})]
        );
    }

    #[test]
    fn test_more_builtins() {
        assert_eq!(ok("[.[] | tostring]", json!([1, "a"])), vec![json!(["1", "a"])]);
        assert_eq!(ok("tonumber", json!("42")), vec![json!(42)]);
        assert_eq!(ok("first, last", json!([1, 2, 3])), vec![json!(1), json!(3)]);
        assert_eq!(ok("[range(3)]", Value::Null), vec![json!([0, 1, 2])]);
        assert_eq!(ok("unique", json!([2, 1, 2])), vec![json!([1, 2])]);
        assert_eq!(
            ok("group_by(.a) | length", json!([{"a": 1}, {"a": 2}, {"a": 1}])),
            vec![json!(2)]
        );
        assert_eq!(ok("[.[] | values]", json!([1, null])), vec![json!([1])]);
        assert_eq!(ok("empty", json!(1)), Vec::<Value>::new());
    }

    #[test]
    fn test_check_rejects_unknown_functions() {
        let expr = parse("map(foo)").unwrap();
        assert_eq!(check(&expr).unwrap_err(), "foo/0");

        let expr = parse("length(1)").unwrap();
        assert_eq!(check(&expr).unwrap_err(), "length/1");
    }

    #[test]
    fn test_number_normalization() {
        assert_eq!(number(2.0), json!(2));
        assert_eq!(number(2.5), json!(2.5));
        assert_eq!(number(f64::NAN), Value::Null);
    }
}
