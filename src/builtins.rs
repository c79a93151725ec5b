use crate::error::Span;
use crate::evaluator::Evaluator;
use crate::value::{Builtin, HashKey, RuntimeError, Value};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

fn err(span: &Span, message: String) -> Value {
    Value::Error(RuntimeError {
        message,
        span: span.clone(),
    })
}

fn arity_err(span: &Span, name: &str, expected: &str, got: usize) -> Value {
    err(
        span,
        format!("{}() takes {} argument(s), got {}", name, expected, got),
    )
}

/// Installs the global builtins into a root scope.
pub fn install(env: &mut crate::env::Environment) {
    for builtin in GLOBALS {
        env.define(builtin.name, Value::Builtin(*builtin));
    }
}

const GLOBALS: &[Builtin] = &[
    Builtin {
        name: "print",
        func: builtin_print,
    },
    Builtin {
        name: "len",
        func: builtin_len,
    },
    Builtin {
        name: "type",
        func: builtin_type,
    },
    Builtin {
        name: "str",
        func: builtin_str,
    },
    Builtin {
        name: "int",
        func: builtin_int,
    },
    Builtin {
        name: "push",
        func: builtin_push,
    },
    Builtin {
        name: "first",
        func: builtin_first,
    },
    Builtin {
        name: "last",
        func: builtin_last,
    },
    Builtin {
        name: "rest",
        func: builtin_rest,
    },
    Builtin {
        name: "keys",
        func: builtin_keys,
    },
    Builtin {
        name: "values",
        func: builtin_values,
    },
    Builtin {
        name: "contains",
        func: builtin_contains,
    },
    Builtin {
        name: "map",
        func: builtin_map,
    },
    Builtin {
        name: "filter",
        func: builtin_filter,
    },
    Builtin {
        name: "reduce",
        func: builtin_reduce,
    },
];

/// Registered builtin modules reachable through `include "name"`. Each is a
/// map of builtins, so members are read with dot access.
pub fn module(name: &str) -> Option<Value> {
    let members: &[Builtin] = match name {
        "math" => &[
            Builtin {
                name: "abs",
                func: math_abs,
            },
            Builtin {
                name: "sqrt",
                func: math_sqrt,
            },
            Builtin {
                name: "pow",
                func: math_pow,
            },
            Builtin {
                name: "floor",
                func: math_floor,
            },
            Builtin {
                name: "ceil",
                func: math_ceil,
            },
            Builtin {
                name: "min",
                func: math_min,
            },
            Builtin {
                name: "max",
                func: math_max,
            },
        ],
        "json" => &[
            Builtin {
                name: "parse",
                func: json_parse,
            },
            Builtin {
                name: "stringify",
                func: json_stringify,
            },
        ],
        "time" => &[Builtin {
            name: "now",
            func: time_now,
        }],
        _ => return None,
    };

    let mut map = HashMap::new();
    for builtin in members {
        map.insert(
            HashKey::String(builtin.name.to_string()),
            Value::Builtin(*builtin),
        );
    }
    Some(Value::Map(map))
}

// ---- globals ----

fn builtin_print(_: &mut Evaluator, args: &[Value], _: &Span) -> Value {
    let parts: Vec<String> = args.iter().map(|v| v.to_string()).collect();
    println!("{}", parts.join(" "));
    Value::Null
}

fn builtin_len(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 1 {
        return arity_err(span, "len", "1", args.len());
    }
    match &args[0] {
        Value::String(s) => Value::Integer(s.chars().count() as i64),
        Value::Array(items) => Value::Integer(items.len() as i64),
        Value::Map(pairs) => Value::Integer(pairs.len() as i64),
        Value::Range(start, end) => Value::Integer((end - start).max(0)),
        other => err(
            span,
            format!("len() not supported for type {}", other.type_name()),
        ),
    }
}

fn builtin_type(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 1 {
        return arity_err(span, "type", "1", args.len());
    }
    Value::String(args[0].type_name())
}

fn builtin_str(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 1 {
        return arity_err(span, "str", "1", args.len());
    }
    Value::String(args[0].to_string())
}

fn builtin_int(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 1 {
        return arity_err(span, "int", "1", args.len());
    }
    match &args[0] {
        Value::Integer(n) => Value::Integer(*n),
        Value::Float(f) => Value::Integer(*f as i64),
        Value::Bool(b) => Value::Integer(*b as i64),
        Value::Char(c) => Value::Integer(*c as i64),
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(n) => Value::Integer(n),
            Err(_) => err(span, format!("int() cannot parse \"{}\"", s)),
        },
        other => err(
            span,
            format!("int() not supported for type {}", other.type_name()),
        ),
    }
}

fn builtin_push(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 2 {
        return arity_err(span, "push", "2", args.len());
    }
    match &args[0] {
        Value::Array(items) => {
            let mut next = items.clone();
            next.push(args[1].clone());
            Value::Array(next)
        }
        other => err(
            span,
            format!("push() expects an array, got {}", other.type_name()),
        ),
    }
}

fn builtin_first(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 1 {
        return arity_err(span, "first", "1", args.len());
    }
    match &args[0] {
        Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
        other => err(
            span,
            format!("first() expects an array, got {}", other.type_name()),
        ),
    }
}

fn builtin_last(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 1 {
        return arity_err(span, "last", "1", args.len());
    }
    match &args[0] {
        Value::Array(items) => items.last().cloned().unwrap_or(Value::Null),
        other => err(
            span,
            format!("last() expects an array, got {}", other.type_name()),
        ),
    }
}

fn builtin_rest(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 1 {
        return arity_err(span, "rest", "1", args.len());
    }
    match &args[0] {
        Value::Array(items) => {
            if items.is_empty() {
                Value::Array(Vec::new())
            } else {
                Value::Array(items[1..].to_vec())
            }
        }
        other => err(
            span,
            format!("rest() expects an array, got {}", other.type_name()),
        ),
    }
}

fn builtin_keys(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 1 {
        return arity_err(span, "keys", "1", args.len());
    }
    match &args[0] {
        Value::Map(pairs) => Value::Array(pairs.keys().map(|k| k.to_value()).collect()),
        other => err(
            span,
            format!("keys() expects a map, got {}", other.type_name()),
        ),
    }
}

fn builtin_values(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 1 {
        return arity_err(span, "values", "1", args.len());
    }
    match &args[0] {
        Value::Map(pairs) => Value::Array(pairs.values().cloned().collect()),
        other => err(
            span,
            format!("values() expects a map, got {}", other.type_name()),
        ),
    }
}

fn builtin_contains(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 2 {
        return arity_err(span, "contains", "2", args.len());
    }
    match &args[0] {
        Value::Array(items) => Value::Bool(items.iter().any(|item| item == &args[1])),
        Value::String(s) => match &args[1] {
            Value::String(sub) => Value::Bool(s.contains(sub.as_str())),
            Value::Char(c) => Value::Bool(s.contains(*c)),
            other => err(
                span,
                format!(
                    "contains() on a string expects a string or char, got {}",
                    other.type_name()
                ),
            ),
        },
        Value::Map(pairs) => match HashKey::from_value(&args[1]) {
            Some(key) => Value::Bool(pairs.contains_key(&key)),
            None => err(
                span,
                format!("unusable as map key: {}", args[1].type_name()),
            ),
        },
        other => err(
            span,
            format!(
                "contains() expects an array, string, or map, got {}",
                other.type_name()
            ),
        ),
    }
}

// ---- higher-order builtins ----

/// Argument list for a callback: two-parameter callbacks (three for reduce)
/// also receive the element index.
fn callback_args(callee: &Value, base: Vec<Value>, index: usize) -> Vec<Value> {
    let wants_index = match callee {
        Value::Function(f) | Value::ArrowFunction(f) => f.params.len() == base.len() + 1,
        _ => false,
    };

    let mut args = base;
    if wants_index {
        args.push(Value::Integer(index as i64));
    }
    args
}

fn builtin_map(ev: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 2 {
        return arity_err(span, "map", "2", args.len());
    }
    let items = match &args[0] {
        Value::Array(items) => items.clone(),
        other => {
            return err(
                span,
                format!("map() expects an array, got {}", other.type_name()),
            )
        }
    };

    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let call_args = callback_args(&args[1], vec![item], i);
        let result = ev.apply(&args[1], call_args, span);
        if result.is_aborting() {
            return result;
        }
        out.push(result);
    }
    Value::Array(out)
}

fn builtin_filter(ev: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 2 {
        return arity_err(span, "filter", "2", args.len());
    }
    let items = match &args[0] {
        Value::Array(items) => items.clone(),
        other => {
            return err(
                span,
                format!("filter() expects an array, got {}", other.type_name()),
            )
        }
    };

    let mut out = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        let call_args = callback_args(&args[1], vec![item.clone()], i);
        let keep = ev.apply(&args[1], call_args, span);
        if keep.is_aborting() {
            return keep;
        }
        if keep.is_truthy() {
            out.push(item);
        }
    }
    Value::Array(out)
}

fn builtin_reduce(ev: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 3 {
        return arity_err(span, "reduce", "3", args.len());
    }
    let items = match &args[0] {
        Value::Array(items) => items.clone(),
        other => {
            return err(
                span,
                format!("reduce() expects an array, got {}", other.type_name()),
            )
        }
    };

    let mut acc = args[1].clone();
    for (i, item) in items.into_iter().enumerate() {
        let call_args = callback_args(&args[2], vec![acc, item], i);
        acc = ev.apply(&args[2], call_args, span);
        if acc.is_aborting() {
            return acc;
        }
    }
    acc
}

// ---- math module ----

fn numeric(span: &Span, name: &str, value: &Value) -> Result<f64, Value> {
    match value {
        Value::Integer(n) => Ok(*n as f64),
        Value::Float(f) => Ok(*f),
        other => Err(err(
            span,
            format!("{}() expects a number, got {}", name, other.type_name()),
        )),
    }
}

fn math_abs(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 1 {
        return arity_err(span, "abs", "1", args.len());
    }
    match &args[0] {
        Value::Integer(n) => Value::Integer(n.abs()),
        Value::Float(f) => Value::Float(f.abs()),
        other => err(
            span,
            format!("abs() expects a number, got {}", other.type_name()),
        ),
    }
}

fn math_sqrt(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 1 {
        return arity_err(span, "sqrt", "1", args.len());
    }
    match numeric(span, "sqrt", &args[0]) {
        Ok(n) => Value::Float(n.sqrt()),
        Err(e) => e,
    }
}

fn math_pow(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 2 {
        return arity_err(span, "pow", "2", args.len());
    }
    match (&args[0], &args[1]) {
        // Integer result only while it fits; otherwise the float path below
        (Value::Integer(base), Value::Integer(exp)) if *exp >= 0 => {
            match u32::try_from(*exp).ok().and_then(|e| base.checked_pow(e)) {
                Some(n) => Value::Integer(n),
                None => Value::Float((*base as f64).powf(*exp as f64)),
            }
        }
        _ => {
            let base = match numeric(span, "pow", &args[0]) {
                Ok(n) => n,
                Err(e) => return e,
            };
            let exp = match numeric(span, "pow", &args[1]) {
                Ok(n) => n,
                Err(e) => return e,
            };
            Value::Float(base.powf(exp))
        }
    }
}

fn math_floor(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 1 {
        return arity_err(span, "floor", "1", args.len());
    }
    match numeric(span, "floor", &args[0]) {
        Ok(n) => Value::Integer(n.floor() as i64),
        Err(e) => e,
    }
}

fn math_ceil(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 1 {
        return arity_err(span, "ceil", "1", args.len());
    }
    match numeric(span, "ceil", &args[0]) {
        Ok(n) => Value::Integer(n.ceil() as i64),
        Err(e) => e,
    }
}

fn math_min(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 2 {
        return arity_err(span, "min", "2", args.len());
    }
    match (numeric(span, "min", &args[0]), numeric(span, "min", &args[1])) {
        (Ok(a), Ok(b)) => {
            if a <= b {
                args[0].clone()
            } else {
                args[1].clone()
            }
        }
        (Err(e), _) | (_, Err(e)) => e,
    }
}

fn math_max(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 2 {
        return arity_err(span, "max", "2", args.len());
    }
    match (numeric(span, "max", &args[0]), numeric(span, "max", &args[1])) {
        (Ok(a), Ok(b)) => {
            if a >= b {
                args[0].clone()
            } else {
                args[1].clone()
            }
        }
        (Err(e), _) | (_, Err(e)) => e,
    }
}

// ---- json module ----

fn value_to_json(value: &Value) -> Result<serde_json::Value, String> {
    match value {
        Value::Null => Ok(serde_json::Value::Null),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Integer(n) => Ok(serde_json::Value::from(*n)),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| format!("float {} has no JSON representation", f)),
        Value::String(s) => Ok(serde_json::Value::String(s.clone())),
        Value::Char(c) => Ok(serde_json::Value::String(c.to_string())),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(value_to_json(item)?);
            }
            Ok(serde_json::Value::Array(out))
        }
        Value::Map(pairs) => {
            let mut out = serde_json::Map::new();
            for (key, val) in pairs {
                let key = match key {
                    HashKey::String(s) => s.clone(),
                    HashKey::Integer(n) => n.to_string(),
                    HashKey::Bool(b) => b.to_string(),
                };
                out.insert(key, value_to_json(val)?);
            }
            Ok(serde_json::Value::Object(out))
        }
        other => Err(format!("cannot serialize {} to JSON", other.type_name())),
    }
}

fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => Value::Array(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            let mut map = HashMap::new();
            for (key, val) in obj {
                map.insert(HashKey::String(key.clone()), json_to_value(val));
            }
            Value::Map(map)
        }
    }
}

fn json_parse(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 1 {
        return arity_err(span, "parse", "1", args.len());
    }
    match &args[0] {
        Value::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(json) => json_to_value(&json),
            Err(e) => err(span, format!("invalid JSON: {}", e)),
        },
        other => err(
            span,
            format!("parse() expects a string, got {}", other.type_name()),
        ),
    }
}

fn json_stringify(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if args.len() != 1 {
        return arity_err(span, "stringify", "1", args.len());
    }
    match value_to_json(&args[0]) {
        Ok(json) => Value::String(json.to_string()),
        Err(message) => err(span, message),
    }
}

// ---- time module ----

fn time_now(_: &mut Evaluator, args: &[Value], span: &Span) -> Value {
    if !args.is_empty() {
        return arity_err(span, "now", "0", args.len());
    }
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => Value::Float(elapsed.as_secs_f64()),
        Err(_) => err(span, "system clock is before the epoch".to_string()),
    }
}
