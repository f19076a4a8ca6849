use std::fmt;
use std::hash::{Hash, Hasher};

use crate::port::TypeTag;

/// Target language of an externally implemented component.
///
/// The literal rendering of parameter values is the only place the synthesis
/// pipeline depends on the target language; everything downstream of the
/// component list is handled by the template assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum Language {
    #[default]
    Rust,
    Go,
}

/// A literal parameter value resolved at compile time.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
}

impl Value {
    /// Builtin tag for the value's type.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Bool(_) => TypeTag::new("bool"),
            Value::Integer(_) => TypeTag::new("int"),
            Value::Decimal(_) => TypeTag::new("double"),
            Value::String(_) => TypeTag::new("string"),
        }
    }

    /// Render this value as a source literal for the given target language.
    ///
    /// Booleans render as `true`/`false`, strings are double-quoted with
    /// escapes, and numbers use the default numeric-to-text conversion. This
    /// is a documented seam: targets with diverging literal syntax get their
    /// own arm here.
    pub fn literal(&self, language: Language) -> String {
        match (self, language) {
            (Value::Bool(b), _) => b.to_string(),
            (Value::Integer(n), _) => n.to_string(),
            (Value::Decimal(d), _) => d.to_string(),
            (Value::String(s), _) => format!("{s:?}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Bool(b) => (0u8, b).hash(state),
            Value::Integer(n) => (1u8, n).hash(state),
            Value::Decimal(d) => (2u8, d.to_bits()).hash(state),
            Value::String(s) => (3u8, s).hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// Outcome of binding one declared parameter of an external component.
///
/// A parameter without a compile-time value is deferred to runtime as an
/// explicit variant, so the code generator can type-check its handling
/// instead of sniffing a sentinel string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum Binding {
    Bound(Value),
    Deferred(String),
}
