//! Runtime value model.
//!
//! The engine evaluates rules against *runtime-typed* caller values. Instead
//! of language reflection, values are carried as a tagged variant ([`Value`])
//! and user types opt in through a small capability trait ([`Reflect`]) that
//! exposes a package path, a type name, field access, and a method table.
//!
//! ## How values flow
//!
//! ```text
//! caller values ── Value::from / Shared::new ──▶ execute(&[Value])
//!                                                   │
//!                                                   ▼
//!                                        binder (engine/binder.rs)
//!                                                   │
//!                                                   ▼
//!                                 template dict { dataKey: { … } }
//!                                                   │
//!                      field access / method dispatch during render
//! ```
//!
//! Struct-like values are held behind [`StructRef`] (a shared, lockable cell)
//! so that rule expressions can mutate them in place (`.T2.SetA 5`) while the
//! caller keeps a handle for inspection afterwards: that handle is
//! [`Shared`].
//!
//! ## Method convention
//!
//! Mutating methods follow the previous-result convention used throughout
//! the engine: an optional trailing `Bool` argument carries the outcome of
//! the previous pipeline stage, and a falsy value short-circuits the method
//! to `false` without touching the receiver. [`prev_ok`] implements the
//! check.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::error::EvalError;
use crate::sink::ResultSink;

/// String-keyed dictionary of values; the shape of every template data map.
pub type Dict = BTreeMap<String, Value>;

/// Capability trait for struct-like user values.
///
/// Implement it by hand or through the [`reflect!`](crate::reflect) macro.
/// `get` resolves template field access (`.T2.A`); `call` resolves template
/// method dispatch (`.T2.SetA 5`). Both default to "not found" so a type can
/// expose only what its rules need.
pub trait Reflect: Send {
    /// Namespace the type lives under in the template dict (first path
    /// segment after the data key).
    fn package_path(&self) -> &'static str;

    /// Simple type name; also the name matched against `filterTypes`.
    fn type_name(&self) -> &'static str;

    /// Resolve a field by name.
    fn get(&self, field: &str) -> Option<Value> {
        let _ = field;
        None
    }

    /// Invoke a named method. Arguments arrive in template order, with the
    /// piped previous result (if any) appended last.
    fn call(&mut self, method: &str, args: &[Value]) -> Result<Value, EvalError> {
        let _ = args;
        Err(EvalError::NoSuchMethod { type_name: self.type_name().to_string(), method: method.to_string() })
    }
}

/// Previous-result guard for value methods and user functions.
///
/// Returns false iff the trailing argument is `Bool(false)`.
pub fn prev_ok(args: &[Value]) -> bool {
    !matches!(args.last(), Some(Value::Bool(false)))
}

/// Shared, lockable cell holding a struct-like value, with its names cached
/// so they can be read without taking the lock.
#[derive(Clone)]
pub struct StructRef {
    pkg: &'static str,
    name: &'static str,
    cell: Arc<Mutex<dyn Reflect>>,
}

impl StructRef {
    pub fn package_path(&self) -> &'static str {
        self.pkg
    }

    pub fn type_name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        self.lock().get(field)
    }

    pub fn call(&self, method: &str, args: &[Value]) -> Result<Value, EvalError> {
        self.lock().call(method, args)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, dyn Reflect + 'static> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ptr_eq(&self, other: &StructRef) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

/// Caller-side handle to a value passed into the engine.
///
/// Keep a clone to observe mutations performed by rules:
///
/// ```
/// use rondel::{Reflect, Shared, Value};
///
/// struct Flag(bool);
/// impl Reflect for Flag {
///     fn package_path(&self) -> &'static str { "demo" }
///     fn type_name(&self) -> &'static str { "Flag" }
/// }
///
/// let flag = Shared::new(Flag(false));
/// let val: Value = flag.value();
/// flag.with_mut(|f| f.0 = true);
/// assert!(flag.with(|f| f.0));
/// ```
pub struct Shared<T: Reflect> {
    inner: Arc<Mutex<T>>,
    pkg: &'static str,
    name: &'static str,
}

impl<T: Reflect + 'static> Shared<T> {
    pub fn new(v: T) -> Self {
        let pkg = v.package_path();
        let name = v.type_name();
        Shared { inner: Arc::new(Mutex::new(v)), pkg, name }
    }

    /// The engine-facing value for this handle.
    pub fn value(&self) -> Value {
        Value::Struct(StructRef { pkg: self.pkg, name: self.name, cell: self.inner.clone() })
    }

    /// Read the underlying value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Mutate the underlying value.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl<T: Reflect> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared { inner: self.inner.clone(), pkg: self.pkg, name: self.name }
    }
}

/// Concurrent scratch dictionary injected under the `"R"` key.
///
/// Rules use it for cross-rule state: `.D.R.Set "seen" 1`, `.D.R.Get "seen"`.
/// Reads take the read lock, writes the write lock.
pub struct Scratch {
    inner: RwLock<Dict>,
}

impl Scratch {
    pub(crate) fn new() -> Self {
        Scratch { inner: RwLock::new(Dict::new()) }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, val: Value) {
        self.inner.write().unwrap_or_else(PoisonError::into_inner).insert(key.into(), val);
    }
}

/// A runtime-typed value.
///
/// The primitive kinds mirror the comparison classes of the function
/// registry (`bool | int | uint | float | string`); `Slice` and `Map` are
/// containers; `Struct` is a shared user value; `Sink` and `Scratch` are the
/// two engine-injected handles (never supplied by callers).
#[derive(Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    Slice(Vec<Value>),
    Map(Dict),
    Struct(StructRef),
    Sink(Arc<dyn ResultSink>),
    Scratch(Arc<Scratch>),
}

impl Value {
    /// Kind name used for binder keys and observed-type matching.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Slice(_) => "slice",
            Value::Map(_) => "map",
            Value::Struct(_) => "struct",
            Value::Sink(_) => "sink",
            Value::Scratch(_) => "scratch",
        }
    }

    /// Observed simple type name: the declared type name for structs, the
    /// kind name for everything else.
    pub fn observed_type(&self) -> &'static str {
        match self {
            Value::Struct(s) => s.type_name(),
            other => other.kind_name(),
        }
    }

    /// Truth table used by `if`, the logical functions, and the
    /// previous-result guard: zero/empty values are false, structs are
    /// always true.
    pub fn is_true(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Uint(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Slice(v) => !v.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Struct(_) | Value::Sink(_) | Value::Scratch(_) => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::Uint(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructRef> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Append the template rendering of this value to `buf`.
    ///
    /// Booleans render as `true`/`false` (the shape rule output is parsed
    /// back from); containers render in a compact diagnostic form.
    pub(crate) fn write_to(&self, buf: &mut String) {
        match self {
            Value::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
            Value::Int(n) => {
                let _ = write!(buf, "{n}");
            }
            Value::Uint(n) => {
                let _ = write!(buf, "{n}");
            }
            Value::Float(f) => {
                let _ = write!(buf, "{f}");
            }
            Value::Str(s) => buf.push_str(s),
            Value::Slice(vals) => {
                buf.push('[');
                for (i, v) in vals.iter().enumerate() {
                    if i > 0 {
                        buf.push(' ');
                    }
                    v.write_to(buf);
                }
                buf.push(']');
            }
            Value::Map(m) => {
                buf.push_str("map[");
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        buf.push(' ');
                    }
                    buf.push_str(k);
                    buf.push(':');
                    v.write_to(buf);
                }
                buf.push(']');
            }
            Value::Struct(s) => {
                let _ = write!(buf, "{{{}}}", s.type_name());
            }
            Value::Sink(_) => buf.push_str("<result>"),
            Value::Scratch(_) => buf.push_str("<scratch>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Uint(n) => write!(f, "Uint({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Slice(v) => f.debug_tuple("Slice").field(v).finish(),
            Value::Map(m) => f.debug_tuple("Map").field(m).finish(),
            Value::Struct(s) => write!(f, "Struct({}.{})", s.package_path(), s.type_name()),
            Value::Sink(_) => write!(f, "Sink"),
            Value::Scratch(_) => write!(f, "Scratch"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Uint(a), Value::Uint(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Slice(a), Value::Slice(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => a.ptr_eq(b),
            (Value::Sink(a), Value::Sink(b)) => Arc::ptr_eq(a, b),
            (Value::Scratch(a), Value::Scratch(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Value {
        Value::Uint(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Value {
        Value::Uint(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Value {
        Value::Float(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Value {
        Value::Slice(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(m: BTreeMap<String, T>) -> Value {
        Value::Map(m.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}
