use crate::ast::{Param, Stmt};
use crate::env::Environment;
use crate::error::Span;
use crate::evaluator::Evaluator;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Host-native callable. Builtins receive the evaluator so higher-order ones
/// (map/filter/reduce) can re-enter function application, and the call-site
/// span for error attribution. Failures come back as `Value::Error`, never a
/// panic.
pub type BuiltinFn = fn(&mut Evaluator, &[Value], &Span) -> Value;

#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<builtin {}>", self.name)
    }
}

/// User function: parameters (with optional type annotations), optional
/// return type, body, and the scope captured at the definition site.
#[derive(Debug)]
pub struct Function {
    pub params: Vec<Param>,
    pub ret: Option<String>,
    pub body: Stmt,
    pub env: Rc<RefCell<Environment>>,
}

#[derive(Debug)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<String>,
}

#[derive(Debug)]
pub struct Instance {
    pub struct_type: Rc<StructType>,
    pub fields: HashMap<String, Value>,
}

#[derive(Debug)]
pub struct EnumType {
    pub name: String,
    pub variants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub message: String,
    pub span: Span,
}

/// Map keys are restricted to the hashable subset of values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Integer(i64),
    String(String),
    Bool(bool),
}

impl HashKey {
    pub fn from_value(value: &Value) -> Option<HashKey> {
        match value {
            Value::Integer(n) => Some(HashKey::Integer(*n)),
            Value::String(s) => Some(HashKey::String(s.clone())),
            Value::Bool(b) => Some(HashKey::Bool(*b)),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            HashKey::Integer(n) => Value::Integer(*n),
            HashKey::String(s) => Value::String(s.clone()),
            HashKey::Bool(b) => Value::Bool(*b),
        }
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HashKey::Integer(n) => write!(f, "{}", n),
            HashKey::String(s) => write!(f, "\"{}\"", s),
            HashKey::Bool(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Char(char),
    Array(Vec<Value>),
    Map(HashMap<HashKey, Value>),
    /// Half-open integer range.
    Range(i64, i64),
    Function(Rc<Function>),
    ArrowFunction(Rc<Function>),
    Builtin(Builtin),
    Struct(Rc<StructType>),
    Instance(Rc<RefCell<Instance>>),
    Enum(Rc<EnumType>),
    EnumValue {
        enum_name: Rc<str>,
        variant: String,
    },
    Error(RuntimeError),

    // Control-flow sentinels, propagated as ordinary values
    Return(Box<Value>),
    Break,
    Continue,
}

impl Value {
    /// Null and false are falsy; everything else, zero included, is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    /// Whether this value should short-circuit the surrounding evaluation.
    pub fn is_aborting(&self) -> bool {
        matches!(
            self,
            Value::Error(_) | Value::Return(_) | Value::Break | Value::Continue
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Integer(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Char(_) => "char".to_string(),
            Value::Array(_) => "array".to_string(),
            Value::Map(_) => "map".to_string(),
            Value::Range(_, _) => "range".to_string(),
            Value::Function(_) | Value::ArrowFunction(_) => "function".to_string(),
            Value::Builtin(_) => "builtin".to_string(),
            Value::Struct(s) => s.name.clone(),
            Value::Instance(i) => i.borrow().struct_type.name.clone(),
            Value::Enum(e) => e.name.clone(),
            Value::EnumValue { enum_name, .. } => enum_name.to_string(),
            Value::Error(_) => "error".to_string(),
            Value::Return(_) => "return".to_string(),
            Value::Break => "break".to_string(),
            Value::Continue => "continue".to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(l), Value::Bool(r)) => l == r,
            (Value::Integer(l), Value::Integer(r)) => l == r,
            (Value::Float(l), Value::Float(r)) => l == r,
            (Value::Integer(l), Value::Float(r)) => (*l as f64) == *r,
            (Value::Float(l), Value::Integer(r)) => *l == (*r as f64),
            (Value::String(l), Value::String(r)) => l == r,
            (Value::Char(l), Value::Char(r)) => l == r,
            (Value::Array(l), Value::Array(r)) => l == r,
            (Value::Map(l), Value::Map(r)) => l == r,
            (Value::Range(ls, le), Value::Range(rs, re)) => ls == rs && le == re,
            (Value::Function(l), Value::Function(r)) => Rc::ptr_eq(l, r),
            (Value::ArrowFunction(l), Value::ArrowFunction(r)) => Rc::ptr_eq(l, r),
            (Value::Builtin(l), Value::Builtin(r)) => l.name == r.name,
            (Value::Struct(l), Value::Struct(r)) => Rc::ptr_eq(l, r),
            (Value::Instance(l), Value::Instance(r)) => Rc::ptr_eq(l, r),
            (Value::Enum(l), Value::Enum(r)) => Rc::ptr_eq(l, r),
            (
                Value::EnumValue {
                    enum_name: ln,
                    variant: lv,
                },
                Value::EnumValue {
                    enum_name: rn,
                    variant: rv,
                },
            ) => ln == rn && lv == rv,
            (Value::Error(l), Value::Error(r)) => l == r,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(n) => {
                // Always keep a decimal point so floats read as floats
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{}", s),
            Value::Char(c) => write!(f, "{}", c),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(pairs) => {
                write!(f, "{{")?;
                let mut first = true;
                for (key, value) in pairs.iter() {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                    first = false;
                }
                write!(f, "}}")
            }
            Value::Range(start, end) => write!(f, "{}..{}", start, end),
            Value::Function(func) => {
                let names: Vec<&str> = func.params.iter().map(|p| p.name.as_str()).collect();
                write!(f, "<function({})>", names.join(", "))
            }
            Value::ArrowFunction(func) => {
                let names: Vec<&str> = func.params.iter().map(|p| p.name.as_str()).collect();
                write!(f, "<arrow({})>", names.join(", "))
            }
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name),
            Value::Struct(s) => write!(f, "<struct {}>", s.name),
            Value::Instance(instance) => {
                let instance = instance.borrow();
                write!(f, "{} {{", instance.struct_type.name)?;
                for (i, field) in instance.struct_type.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    let value = instance.fields.get(field).cloned().unwrap_or(Value::Null);
                    write!(f, " {}: {}", field, value)?;
                }
                write!(f, " }}")
            }
            Value::Enum(e) => write!(f, "<enum {}>", e.name),
            Value::EnumValue { enum_name, variant } => write!(f, "{}.{}", enum_name, variant),
            Value::Error(err) => write!(f, "error: {}", err.message),
            Value::Return(inner) => write!(f, "{}", inner),
            Value::Break => write!(f, "<break>"),
            Value::Continue => write!(f, "<continue>"),
        }
    }
}
