//! Runtime values and type descriptors.
//!
//! Values follow the configuration language's loose semantics: only `Undef`
//! and `false` are falsy, bare words are strings, and string conversion of
//! `Undef` is the empty string.

use indexmap::IndexMap;
use std::fmt;

/// A resolved value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Absence of a value.
    Undef,
    /// The `default` keyword.
    Default,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    /// Insertion-ordered hash with stringified keys.
    Hash(IndexMap<String, Value>),
    /// A type descriptor used as a value (`String`, `Optional[Integer]`).
    Type(TypeRef),
    Regex(String),
    /// Reference to a declared resource (`File['/tmp/x']`).
    Resource {
        type_name: String,
        title: String,
    },
}

impl Value {
    /// Shorthand for a string value.
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Returns `true` unless the value is `Undef` or `false`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Undef | Value::Bool(false))
    }

    #[inline]
    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Undef)
    }

    /// Name of the runtime type, as used in diagnostics and hints.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undef => "Undef",
            Value::Default => "Default",
            Value::Bool(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Array(_) => "Array",
            Value::Hash(_) => "Hash",
            Value::Type(_) => "Type",
            Value::Regex(_) => "Regexp",
            Value::Resource { .. } => "Resource",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Matching used by `case` options and selector entries.
    ///
    /// `default` matches anything, strings compare case-insensitively, and
    /// everything else falls back to structural equality.
    pub fn matches_option(&self, option: &Value) -> bool {
        match (self, option) {
            (_, Value::Default) => true,
            (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                #[expect(clippy::cast_precision_loss, reason = "numeric comparison")]
                let a = *a as f64;
                (a - b).abs() < f64::EPSILON
            }
            (Value::Type(t), Value::Type(o)) => t == o,
            (value, Value::Type(t)) => t.accepts(value),
            _ => self == option,
        }
    }

    /// Convert a JSON value into a runtime value.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Undef,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::Array(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Hash(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert into JSON. Non-data values (types, regexes, resource
    /// references) become their string form.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undef => serde_json::Value::Null,
            Value::Default => serde_json::Value::String("default".to_string()),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Hash(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Type(_) | Value::Regex(_) | Value::Resource { .. } => {
                serde_json::Value::String(self.to_string())
            }
        }
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "'{s}'"),
            Value::Undef => write!(f, "undef"),
            other => write!(f, "{other}"),
        }
    }
}

/// Capitalize each `::` segment of a resource type name (`foo::bar` -> `Foo::Bar`).
pub(crate) fn capitalize_segments(name: &str) -> String {
    name.split("::")
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("::")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undef => Ok(()),
            Value::Default => write!(f, "default"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => {
                if x.fract() == 0.0 && x.is_finite() {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
            Value::String(s) => write!(f, "{s}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.fmt_nested(f)?;
                }
                write!(f, "]")
            }
            Value::Hash(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{k}' => ")?;
                    v.fmt_nested(f)?;
                }
                write!(f, "}}")
            }
            Value::Type(t) => write!(f, "{t}"),
            Value::Regex(r) => write!(f, "/{r}/"),
            Value::Resource { type_name, title } => {
                write!(f, "{}['{title}']", capitalize_segments(type_name))
            }
        }
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

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// A type descriptor: a name plus optional parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeRef {
    pub name: String,
    pub params: Vec<Value>,
}

impl TypeRef {
    pub fn new(name: impl Into<String>) -> Self {
        TypeRef {
            name: name.into(),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    /// Conservative instance check for the core types.
    ///
    /// Types this engine does not model (module-defined aliases, resource
    /// types) accept everything so that they never produce false mismatches.
    pub fn accepts(&self, value: &Value) -> bool {
        match self.name.as_str() {
            "Undef" => value.is_undef(),
            "NotUndef" => !value.is_undef(),
            "String" | "Pattern" => matches!(value, Value::String(_)),
            "Enum" => match value {
                Value::String(s) => {
                    self.params.is_empty()
                        || self.params.iter().any(|p| p.as_str() == Some(s.as_str()))
                }
                _ => false,
            },
            "Integer" => match value {
                Value::Integer(i) => self.integer_in_range(*i),
                _ => false,
            },
            "Float" => matches!(value, Value::Float(_)),
            "Numeric" => matches!(value, Value::Integer(_) | Value::Float(_)),
            "Boolean" => matches!(value, Value::Bool(_)),
            "Array" | "Tuple" => match value {
                Value::Array(items) => match self.params.first() {
                    Some(Value::Type(element)) => items.iter().all(|item| element.accepts(item)),
                    _ => true,
                },
                _ => false,
            },
            "Hash" | "Struct" => matches!(value, Value::Hash(_)),
            "Optional" => {
                value.is_undef()
                    || match self.params.first() {
                        Some(Value::Type(inner)) => inner.accepts(value),
                        Some(Value::String(_)) => matches!(value, Value::String(_)),
                        _ => true,
                    }
            }
            "Variant" => self.params.iter().any(|p| match p {
                Value::Type(t) => t.accepts(value),
                _ => false,
            }),
            "Regexp" => matches!(value, Value::Regex(_)),
            "Type" => matches!(value, Value::Type(_)),
            _ => true,
        }
    }

    fn integer_in_range(&self, i: i64) -> bool {
        let bound = |idx: usize| match self.params.get(idx) {
            Some(Value::Integer(b)) => Some(*b),
            _ => None,
        };
        bound(0).map_or(true, |min| i >= min) && bound(1).map_or(true, |max| i <= max)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.params.is_empty() {
            write!(f, "[")?;
            for (i, p) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                p.fmt_nested(f)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}
