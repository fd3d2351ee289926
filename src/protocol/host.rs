//! Object model of the package hosted inside a sibling.
//!
//! Member access on a relocated package is shape-agnostic, so the hosted side
//! is deliberately dynamic: every value is a [`HostValue`], class instances
//! implement [`HostObject`] and callables implement [`HostFunction`].

use super::ProtocolError;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type HostResult = Result<HostValue, ProtocolError>;
pub type HostFuture = Pin<Box<dyn Future<Output = HostResult> + Send>>;

#[derive(Clone)]
pub enum HostValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Bytes(Vec<u8>),
    Stream(Vec<Vec<u8>>),
    Date(DateTime<Utc>),
    Regex { source: String, flags: String },
    Array(Vec<HostValue>),
    Map(Vec<(HostValue, HostValue)>),
    Set(Vec<HostValue>),
    /// Plain key-value data with no behaviour of its own.
    Record(BTreeMap<String, HostValue>),
    Function(Arc<dyn HostFunction>),
    /// Anything with identity or behaviour, typically a class instance.
    Object(Arc<dyn HostObject>),
}

/// A non-plain value living in the sibling.
pub trait HostObject: Send + Sync + 'static {
    fn type_name(&self) -> &str;

    /// Reads a member. `None` means the member does not exist.
    fn get(&self, key: &str) -> Option<HostValue>;

    fn as_any(&self) -> &dyn Any;
}

/// Something callable. `this` is the value the callee was read from.
pub trait HostFunction: Send + Sync {
    fn call(&self, this: HostValue, args: Vec<HostValue>) -> HostFuture;
}

struct NativeFunction<F>(F);

impl<F> HostFunction for NativeFunction<F>
where
    F: Fn(HostValue, Vec<HostValue>) -> HostFuture + Send + Sync,
{
    fn call(&self, this: HostValue, args: Vec<HostValue>) -> HostFuture {
        (self.0)(this, args)
    }
}

/// Wraps a free async function that ignores its receiver.
pub fn function<F, Fut>(f: F) -> HostValue
where
    F: Fn(Vec<HostValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HostResult> + Send + 'static,
{
    HostValue::Function(Arc::new(NativeFunction(
        move |_this: HostValue, args: Vec<HostValue>| -> HostFuture { Box::pin(f(args)) },
    )))
}

fn receiver<T: HostObject>(this: &HostValue) -> Result<&T, ProtocolError> {
    match this {
        HostValue::Object(object) => object.as_any().downcast_ref::<T>().ok_or_else(|| {
            ProtocolError::host(format!(
                "method called on {} instead of {}",
                object.type_name(),
                std::any::type_name::<T>()
            ))
        }),
        other => Err(ProtocolError::host(format!(
            "method called without an object receiver ({})",
            other.kind()
        ))),
    }
}

/// Wraps a method of `T`. The call fails unless the receiver is a `T`.
pub fn method<T, F>(f: F) -> HostValue
where
    T: HostObject,
    F: Fn(&T, Vec<HostValue>) -> HostResult + Send + Sync + 'static,
{
    HostValue::Function(Arc::new(NativeFunction(
        move |this: HostValue, args: Vec<HostValue>| -> HostFuture {
            let result = receiver::<T>(&this).and_then(|r| f(r, args));
            Box::pin(std::future::ready(result))
        },
    )))
}

/// Async counterpart of [`method`].
///
/// The returned future cannot borrow the receiver, so `f` takes what it needs
/// from `&T` (usually a cloned `Arc`) before the first await.
pub fn async_method<T, F, Fut>(f: F) -> HostValue
where
    T: HostObject,
    F: Fn(&T, Vec<HostValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HostResult> + Send + 'static,
{
    HostValue::Function(Arc::new(NativeFunction(
        move |this: HostValue, args: Vec<HostValue>| -> HostFuture {
            match receiver::<T>(&this) {
                Ok(r) => Box::pin(f(r, args)),
                Err(e) => Box::pin(std::future::ready(Err(e))),
            }
        },
    )))
}

impl HostValue {
    pub fn record<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, HostValue)>,
    {
        HostValue::Record(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn object<T: HostObject>(object: T) -> Self {
        HostValue::Object(Arc::new(object))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, HostValue::Function(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Reads a member for path walking. A member holding null counts as missing.
    pub fn member(&self, key: &str) -> Option<HostValue> {
        let found = match self {
            HostValue::Object(object) => object.get(key),
            HostValue::Record(fields) => fields.get(key).cloned(),
            _ => None,
        };
        found.filter(|value| !matches!(value, HostValue::Null))
    }

    pub fn kind(&self) -> &str {
        match self {
            HostValue::Null => "null",
            HostValue::Bool(_) => "bool",
            HostValue::Number(_) => "number",
            HostValue::String(_) => "string",
            HostValue::Bytes(_) => "bytes",
            HostValue::Stream(_) => "stream",
            HostValue::Date(_) => "date",
            HostValue::Regex { .. } => "regex",
            HostValue::Array(_) => "array",
            HostValue::Map(_) => "map",
            HostValue::Set(_) => "set",
            HostValue::Record(_) => "record",
            HostValue::Function(_) => "function",
            HostValue::Object(object) => object.type_name(),
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => write!(f, "Null"),
            HostValue::Bool(b) => write!(f, "Bool({b})"),
            HostValue::Number(n) => write!(f, "Number({n})"),
            HostValue::String(s) => write!(f, "String({s:?})"),
            HostValue::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            HostValue::Stream(chunks) => write!(f, "Stream({} chunks)", chunks.len()),
            HostValue::Date(d) => write!(f, "Date({d})"),
            HostValue::Regex { source, flags } => write!(f, "Regex(/{source}/{flags})"),
            HostValue::Array(items) => f.debug_tuple("Array").field(items).finish(),
            HostValue::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            HostValue::Set(items) => f.debug_tuple("Set").field(items).finish(),
            HostValue::Record(fields) => f.debug_tuple("Record").field(fields).finish(),
            HostValue::Function(_) => write!(f, "Function"),
            HostValue::Object(object) => write!(f, "Object({})", object.type_name()),
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Number(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::String(value)
    }
}

/// How a result crosses the boundary. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    Absent,
    Primitive,
    Binary,
    Container,
    PlainRecord,
    /// Never serialized; kept in the store and returned by reference.
    Opaque,
}

impl ValueClass {
    pub fn of(value: &HostValue) -> Self {
        match value {
            HostValue::Null => ValueClass::Absent,
            HostValue::Bool(_) | HostValue::Number(_) | HostValue::String(_) => {
                ValueClass::Primitive
            }
            HostValue::Bytes(_) | HostValue::Stream(_) => ValueClass::Binary,
            HostValue::Date(_)
            | HostValue::Regex { .. }
            | HostValue::Map(_)
            | HostValue::Set(_)
            | HostValue::Array(_) => ValueClass::Container,
            HostValue::Record(_) => ValueClass::PlainRecord,
            HostValue::Function(_) | HostValue::Object(_) => ValueClass::Opaque,
        }
    }

    pub fn is_by_value(self) -> bool {
        self != ValueClass::Opaque
    }
}

/// Module namespace of the hosted package: named exports plus an optional default export.
#[derive(Clone, Default)]
pub struct Namespace {
    package: String,
    default_export: Option<HostValue>,
    exports: BTreeMap<String, HostValue>,
}

impl Namespace {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            default_export: None,
            exports: BTreeMap::new(),
        }
    }

    pub fn export(mut self, name: impl Into<String>, value: HostValue) -> Self {
        self.exports.insert(name.into(), value);
        self
    }

    pub fn with_default(mut self, value: HostValue) -> Self {
        self.default_export = Some(value);
        self
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn default_export(&self) -> Option<&HostValue> {
        self.default_export.as_ref()
    }

    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.exports.keys().map(String::as_str)
    }
}

impl HostObject for Namespace {
    fn type_name(&self) -> &str {
        "Namespace"
    }

    fn get(&self, key: &str) -> Option<HostValue> {
        match self.exports.get(key) {
            Some(value) => Some(value.clone()),
            None if key == "default" => self.default_export.clone(),
            None => None,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
