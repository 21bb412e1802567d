#![forbid(unsafe_code)]

//! Keys and values exchanged between the engine and observable containers.
//!
//! [`Value`] comparison follows identity semantics: primitives compare by
//! value (with `NaN` equal to itself and `0.0` distinct from `-0.0`), owners
//! compare by [`OwnerId`](crate::OwnerId). Structural equality is never used.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::owner::OwnerRef;

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(1);

/// A unique, non-string key. Two symbols are equal only if one is a clone of
/// the other, regardless of description.
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    description: Option<Rc<str>>,
}

impl Symbol {
    /// Create a fresh symbol.
    #[must_use]
    pub fn new(description: impl Into<Rc<str>>) -> Self {
        Self {
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
            description: Some(description.into()),
        }
    }

    /// Create a fresh symbol without a description.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
            description: None,
        }
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "Symbol({desc})"),
            None => write!(f, "Symbol(#{})", self.id),
        }
    }
}

/// A property key on an owner.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Named property.
    Name(Rc<str>),
    /// Positional element of a sequence.
    Index(usize),
    /// Symbolic property.
    Symbol(Symbol),
}

impl Key {
    /// Conventional key under which sequences report their length.
    #[must_use]
    pub fn length() -> Self {
        Self::Name(Rc::from("length"))
    }

    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name:?}"),
            Self::Index(idx) => write!(f, "[{idx}]"),
            Self::Symbol(sym) => sym.fmt(f),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Name(Rc::from(name))
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Name(Rc::from(name))
    }
}

impl From<usize> for Key {
    fn from(idx: usize) -> Self {
        Self::Index(idx)
    }
}

impl From<Symbol> for Key {
    fn from(sym: Symbol) -> Self {
        Self::Symbol(sym)
    }
}

/// A value stored under a key.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent key.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    /// A nested observable container.
    Owner(OwnerRef),
}

impl Value {
    /// Identity comparison used for change detection.
    #[must_use]
    pub fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => {
                a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
            }
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Owner(a), Self::Owner(b)) => a.owner_id() == b.owner_id(),
            _ => false,
        }
    }

    /// Version of the referenced owner, if this value is a versioned owner.
    #[must_use]
    pub fn version(&self) -> Option<u64> {
        match self {
            Self::Owner(owner) => owner.version(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(n) => Some(*n),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_owner(&self) -> Option<&OwnerRef> {
        match self {
            Self::Owner(owner) => Some(owner),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(n) => write!(f, "Int({n})"),
            Self::Float(n) => write!(f, "Float({n})"),
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::Owner(owner) => write!(f, "Owner({:?})", owner.owner_id()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<OwnerRef> for Value {
    fn from(owner: OwnerRef) -> Self {
        Self::Owner(owner)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Undefined, Into::into)
    }
}
