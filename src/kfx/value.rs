//! The Ion value model.
//!
//! Symbols carry their resolved text. Symbols the reader could not resolve
//! are kept as `$<id>` placeholders, which the symbol table maps straight
//! back to their numeric id.

use std::fmt;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::error::{Error, Result};

use super::decimal::Decimal;
use super::timestamp::Timestamp;

/// An interned symbolic atom, stored by text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The placeholder form `$<id>` for a symbol known only by id.
    pub fn from_id(id: u32) -> Self {
        Self(format!("${id}"))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// If the text is `$<digits>`, the id it names.
    pub fn placeholder_id(&self) -> Option<u32> {
        let digits = self.0.strip_prefix('$')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Symbol {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl PartialEq<str> for Symbol {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Symbol {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// One or more annotations on a single non-annotated value.
#[derive(Debug, Clone)]
pub struct Annotated {
    annotations: Vec<Symbol>,
    value: Box<Value>,
}

impl Annotated {
    /// Fails if `annotations` is empty or `value` is itself annotated.
    pub fn new(annotations: Vec<Symbol>, value: Value) -> Result<Self> {
        if annotations.is_empty() {
            return Err(Error::invalid("annotation list cannot be empty"));
        }
        if matches!(value, Value::Annotated(_)) {
            return Err(Error::invalid("annotated value cannot be annotated again"));
        }
        Ok(Self {
            annotations,
            value: Box::new(value),
        })
    }

    #[inline]
    pub fn annotations(&self) -> &[Symbol] {
        &self.annotations
    }

    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    pub fn into_parts(self) -> (Vec<Symbol>, Value) {
        (self.annotations, *self.value)
    }

    pub fn is_single(&self) -> bool {
        self.annotations.len() == 1
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations.iter().any(|a| a == name)
    }
}

/// Any value the binary format can carry.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(BigInt),
    Float(f64),
    Decimal(Decimal),
    Timestamp(Timestamp),
    Symbol(Symbol),
    String(String),
    Clob(Vec<u8>),
    Blob(Vec<u8>),
    List(Vec<Value>),
    SExp(Vec<Value>),
    /// Fields in stream order.
    Struct(Vec<(Symbol, Value)>),
    Annotated(Annotated),
}

impl Value {
    pub fn int(n: impl Into<BigInt>) -> Self {
        Value::Int(n.into())
    }

    pub fn symbol(text: impl Into<String>) -> Self {
        Value::Symbol(Symbol::new(text))
    }

    pub fn string(text: impl Into<String>) -> Self {
        Value::String(text.into())
    }

    pub fn annotated(annotations: Vec<Symbol>, value: Value) -> Result<Self> {
        Annotated::new(annotations, value).map(Value::Annotated)
    }

    /// Build a struct from `[key, value, key, value, ...]`.
    ///
    /// Keys must be symbols or strings. Odd-length input is an error.
    pub fn struct_from_flat(items: Vec<Value>) -> Result<Self> {
        if items.len() % 2 != 0 {
            return Err(Error::invalid(format!(
                "struct created with {} arguments",
                items.len()
            )));
        }

        let mut fields = Vec::with_capacity(items.len() / 2);
        let mut iter = items.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            let key = match key {
                Value::Symbol(s) => s,
                Value::String(s) => Symbol::from(s),
                other => {
                    return Err(Error::invalid(format!(
                        "struct key must be a symbol, found {}",
                        other.type_name()
                    )));
                }
            };
            fields.push((key, value));
        }
        Ok(Value::Struct(fields))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::Timestamp(_) => "timestamp",
            Value::Symbol(_) => "symbol",
            Value::String(_) => "string",
            Value::Clob(_) => "clob",
            Value::Blob(_) => "blob",
            Value::List(_) => "list",
            Value::SExp(_) => "sexp",
            Value::Struct(_) => "struct",
            Value::Annotated(_) => "annotation",
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => n.to_i64(),
            _ => None,
        }
    }

    #[inline]
    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    #[inline]
    pub fn as_struct(&self) -> Option<&[(Symbol, Value)]> {
        match self {
            Value::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    #[inline]
    pub fn as_annotated(&self) -> Option<&Annotated> {
        match self {
            Value::Annotated(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// First field named `key`. O(n) scan, fine for the small structs KFX uses.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_struct()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Value::Struct(fields) => fields.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Remove and return the field named `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        match self {
            Value::Struct(fields) => {
                let pos = fields.iter().position(|(k, _)| k == key)?;
                Some(fields.remove(pos).1)
            }
            _ => None,
        }
    }

    /// The value with any annotation wrapper removed.
    pub fn unannotated(&self) -> &Value {
        match self {
            Value::Annotated(a) => a.value(),
            other => other,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        value_eq(self, other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Value::Symbol(s)
    }
}

/// Structural equality.
///
/// NaN equals NaN, `-0.0` differs from `0.0`, struct comparison is keyed by
/// field name and ignores field order.
pub fn value_eq(a: &Value, b: &Value) -> bool {
    value_diff(a, b).is_none()
}

/// Where two values first differ, innermost context first reversed into a
/// readable path. `None` if they are equal under [`value_eq`].
pub fn value_diff(a: &Value, b: &Value) -> Option<String> {
    let mut ctx = Vec::new();
    if diff_into(a, b, &mut ctx) {
        None
    } else {
        ctx.reverse();
        Some(ctx.join(", "))
    }
}

fn diff_into(a: &Value, b: &Value, ctx: &mut Vec<String>) -> bool {
    match (a, b) {
        (Value::Annotated(x), Value::Annotated(y)) => {
            if x.annotations() != y.annotations() {
                ctx.push(format!(
                    "annotations {:?} != {:?}",
                    x.annotations(),
                    y.annotations()
                ));
                return false;
            }
            if !diff_into(x.value(), y.value(), ctx) {
                ctx.push(format!("in annotation {}", x.annotations()[0]));
                return false;
            }
            true
        }
        (Value::List(x), Value::List(y)) | (Value::SExp(x), Value::SExp(y)) => {
            if x.len() != y.len() {
                ctx.push(format!("{} length {} != {}", a.type_name(), x.len(), y.len()));
                return false;
            }
            for (i, (xv, yv)) in x.iter().zip(y).enumerate() {
                if !diff_into(xv, yv, ctx) {
                    ctx.push(format!("at {} index {i}", a.type_name()));
                    return false;
                }
            }
            true
        }
        (Value::Struct(x), Value::Struct(y)) => {
            if x.len() != y.len() {
                ctx.push(format!("struct length {} != {}", x.len(), y.len()));
                return false;
            }
            for (key, xv) in x {
                let Some((_, yv)) = y.iter().find(|(k, _)| k == key) else {
                    ctx.push(format!("struct key {key} missing"));
                    return false;
                };
                if !diff_into(xv, yv, ctx) {
                    ctx.push(format!("at struct key {key}"));
                    return false;
                }
            }
            true
        }
        (Value::Float(x), Value::Float(y)) => {
            let equal = (x.is_nan() && y.is_nan()) || x.to_bits() == y.to_bits();
            if !equal {
                ctx.push(format!("value {x:?} != {y:?}"));
            }
            equal
        }
        _ => {
            let equal = match (a, b) {
                (Value::Null, Value::Null) => true,
                (Value::Bool(x), Value::Bool(y)) => x == y,
                (Value::Int(x), Value::Int(y)) => x == y,
                (Value::Decimal(x), Value::Decimal(y)) => x == y,
                (Value::Timestamp(x), Value::Timestamp(y)) => x == y,
                (Value::Symbol(x), Value::Symbol(y)) => x == y,
                (Value::String(x), Value::String(y)) => x == y,
                (Value::Clob(x), Value::Clob(y)) => x == y,
                (Value::Blob(x), Value::Blob(y)) => x == y,
                _ if std::mem::discriminant(a) != std::mem::discriminant(b) => {
                    ctx.push(format!("type mismatch: {} != {}", a.type_name(), b.type_name()));
                    return false;
                }
                _ => false,
            };
            if !equal {
                ctx.push(format!("value {a:?} != {b:?}"));
            }
            equal
        }
    }
}
