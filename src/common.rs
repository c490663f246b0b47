//! Common attribute types shared across the tracing API.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// The key part of attribute [`KeyValue`] pairs.
///
/// See the [attribute naming] recommendations for conventions.
///
/// [attribute naming]: https://opentelemetry.io/docs/specs/semconv/general/attribute-naming/
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Cow<'static, str>);

impl Key {
    /// Create a new `Key`.
    pub fn new(value: impl Into<Cow<'static, str>>) -> Self {
        Key(value.into())
    }

    /// Create a new const `Key`.
    pub const fn from_static_str(value: &'static str) -> Self {
        Key(Cow::Borrowed(value))
    }

    /// Returns a reference to the underlying key name.
    pub fn as_str(&self) -> &str {
        self.0.as_ref()
    }
}

impl From<&'static str> for Key {
    fn from(key_str: &'static str) -> Self {
        Key(Cow::Borrowed(key_str))
    }
}

impl From<String> for Key {
    fn from(string: String) -> Self {
        Key(Cow::Owned(string))
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0.into_owned()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

/// A [`Value::Array`] of homogeneous values.
///
/// Mixed-type arrays cannot be constructed; each variant carries values of a
/// single primitive type.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Array {
    /// Array of bools
    Bool(Vec<bool>),
    /// Array of integers
    I64(Vec<i64>),
    /// Array of floats
    F64(Vec<f64>),
    /// Array of strings
    String(Vec<Cow<'static, str>>),
}

impl fmt::Display for Array {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Array::Bool(values) => display_comma_delimited(values, fmt),
            Array::I64(values) => display_comma_delimited(values, fmt),
            Array::F64(values) => display_comma_delimited(values, fmt),
            Array::String(values) => {
                write!(fmt, "[")?;
                for (i, t) in values.iter().enumerate() {
                    if i > 0 {
                        write!(fmt, ",")?;
                    }
                    write!(fmt, "\"{t}\"")?;
                }
                write!(fmt, "]")
            }
        }
    }
}

fn display_comma_delimited<T: fmt::Display>(
    values: &[T],
    fmt: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    write!(fmt, "[")?;
    for (i, t) in values.iter().enumerate() {
        if i > 0 {
            write!(fmt, ",")?;
        }
        write!(fmt, "{t}")?;
    }
    write!(fmt, "]")
}

macro_rules! from_values {
    ($(($t:ty, $val:expr),)+) => {
        $(
            impl From<Vec<$t>> for Array {
                fn from(t: Vec<$t>) -> Self {
                    $val(t)
                }
            }
        )+
    };
}

from_values!(
    (bool, Array::Bool),
    (i64, Array::I64),
    (f64, Array::F64),
);

impl From<Vec<&'static str>> for Array {
    fn from(t: Vec<&'static str>) -> Self {
        Array::String(t.into_iter().map(Cow::Borrowed).collect())
    }
}

impl From<Vec<String>> for Array {
    fn from(t: Vec<String>) -> Self {
        Array::String(t.into_iter().map(Cow::Owned).collect())
    }
}

/// The value part of attribute [`KeyValue`] pairs.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Value {
    /// bool values
    Bool(bool),
    /// i64 values
    I64(i64),
    /// f64 values
    F64(f64),
    /// String values
    String(Cow<'static, str>),
    /// Array of homogeneous values
    Array(Array),
}

impl Value {
    /// String representation of the `Value`.
    ///
    /// This will allocate if the underlying value is not a `String`.
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            Value::Bool(v) => format!("{v}").into(),
            Value::I64(v) => format!("{v}").into(),
            Value::F64(v) => format!("{v}").into(),
            Value::String(v) => Cow::Borrowed(v.as_ref()),
            Value::Array(v) => format!("{v}").into(),
        }
    }
}

macro_rules! from_value {
    ($(($t:ty, $val:expr)),+) => {
        $(
            impl From<$t> for Value {
                fn from(t: $t) -> Self {
                    $val(t)
                }
            }
        )+
    };
}

from_value!((bool, Value::Bool), (i64, Value::I64), (f64, Value::F64));

impl From<&'static str> for Value {
    fn from(s: &'static str) -> Self {
        Value::String(Cow::Borrowed(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Cow::Owned(s))
    }
}

impl From<Cow<'static, str>> for Value {
    fn from(s: Cow<'static, str>) -> Self {
        Value::String(s)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::I64(i as i64)
    }
}

impl<T: Into<Array>> From<T> for Value {
    fn from(array: T) -> Self {
        Value::Array(array.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => v.fmt(fmt),
            Value::I64(v) => v.fmt(fmt),
            Value::F64(v) => v.fmt(fmt),
            Value::String(v) => fmt.write_str(v.as_ref()),
            Value::Array(v) => v.fmt(fmt),
        }
    }
}

/// A key-value pair describing an attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValue {
    /// The attribute name
    pub key: Key,
    /// The attribute value
    pub value: Value,
}

impl KeyValue {
    /// Create a new `KeyValue` pair.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Information about a library or module that produces telemetry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstrumentationScope {
    /// The library name, usually the crate or module path.
    name: Cow<'static, str>,
    /// The library version.
    version: Option<Cow<'static, str>>,
}

impl Default for InstrumentationScope {
    fn default() -> Self {
        InstrumentationScope {
            name: Cow::Borrowed(""),
            version: None,
        }
    }
}

impl InstrumentationScope {
    /// Create a new builder for the given instrumentation name.
    pub fn builder<T: Into<Cow<'static, str>>>(name: T) -> InstrumentationScopeBuilder {
        InstrumentationScopeBuilder {
            name: name.into(),
            version: None,
        }
    }

    /// Returns the instrumentation library name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the instrumentation library version.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

/// Configuration options for an [`InstrumentationScope`].
#[derive(Debug)]
pub struct InstrumentationScopeBuilder {
    name: Cow<'static, str>,
    version: Option<Cow<'static, str>>,
}

impl InstrumentationScopeBuilder {
    /// Sets the instrumentation version.
    pub fn with_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Builds the [`InstrumentationScope`].
    pub fn build(self) -> InstrumentationScope {
        InstrumentationScope {
            name: self.name,
            version: self.version,
        }
    }
}

impl From<Arc<InstrumentationScope>> for InstrumentationScope {
    fn from(scope: Arc<InstrumentationScope>) -> Self {
        (*scope).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_from_primitives() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42i64), Value::I64(42));
        assert_eq!(Value::from(7i32), Value::I64(7));
        assert_eq!(Value::from("static"), Value::String(Cow::Borrowed("static")));
        assert_eq!(
            Value::from(vec![1i64, 2, 3]),
            Value::Array(Array::I64(vec![1, 2, 3]))
        );
    }

    #[test]
    fn array_display() {
        let array: Array = vec!["a", "b"].into();
        assert_eq!(array.to_string(), "[\"a\",\"b\"]");
        let array: Array = vec![1i64, 2].into();
        assert_eq!(array.to_string(), "[1,2]");
    }

    #[test]
    fn key_value_construction() {
        let kv = KeyValue::new("http.method", "GET");
        assert_eq!(kv.key.as_str(), "http.method");
        assert_eq!(kv.value.as_str(), "GET");
    }

    #[test]
    fn scope_builder() {
        let scope = InstrumentationScope::builder("my-lib")
            .with_version("0.3.1")
            .build();
        assert_eq!(scope.name(), "my-lib");
        assert_eq!(scope.version(), Some("0.3.1"));
    }
}
