//! Tagged configuration values.

use std::fmt;

/// A configuration scalar with its type decided once at write time.
///
/// The coercion ladder (integer, then float, then boolean literal, else
/// string) runs in [`ConfigValue::parse`]; after that the tag travels with
/// the value instead of being re-derived on every read.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl ConfigValue {
    /// Coerce a stored string into a tagged value.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if let Ok(n) = raw.parse::<i64>() {
            return ConfigValue::Int(n);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return ConfigValue::Float(f);
        }
        if raw.eq_ignore_ascii_case("true") {
            return ConfigValue::Bool(true);
        }
        if raw.eq_ignore_ascii_case("false") {
            return ConfigValue::Bool(false);
        }
        ConfigValue::Str(raw.to_string())
    }

    /// Integer view. `Int` only; no cross-type coercion on read.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Float view; integers widen.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Boolean view.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String view (only for `Str`; use `to_string()` to re-stringify any
    /// variant for persistence).
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Int(n) => write!(f, "{n}"),
            ConfigValue::Float(x) => write!(f, "{x}"),
            ConfigValue::Bool(b) => write!(f, "{b}"),
            ConfigValue::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for ConfigValue {
    fn from(n: i64) -> Self {
        ConfigValue::Int(n)
    }
}

impl From<f64> for ConfigValue {
    fn from(x: f64) -> Self {
        ConfigValue::Float(x)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Str(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::Str(s)
    }
}
