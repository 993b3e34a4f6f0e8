//! Host values
//!
//! The encoder works on a closed sum type describing the object graphs it
//! can serialize.  `Value` covers everything; `HashableValue` is the
//! subset that Python accepts as a dict key or set element, which lets
//! dictionaries and sets be represented as ordered Rust collections.
//!
//! Lists and dicts are held behind `Rc<RefCell<_>>` so that shared and
//! cyclic graphs can be expressed; the memo table uses the allocation
//! address as their identity.  Tuples model host arrays of references and
//! are shared (and mutable) for the same reason.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use chrono::{NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;

use crate::record::Reflect;

#[derive(Clone)]
pub enum Value {
    /// None
    None,
    /// Boolean
    Bool(bool),
    /// Signed integer
    I64(i64),
    /// Unsigned integer; only values above `i64::MAX` are "big"
    U64(u64),
    /// Float
    F64(f64),
    /// Single character, encoded as a 1-codepoint string
    Char(char),
    /// Unicode string
    String(String),
    /// Byte array, reconstructed as a Python `bytearray`
    Bytes(Rc<Vec<u8>>),
    /// Native numeric array, reconstructed as `array.array`
    Array(Rc<ArrayData>),
    /// Array of references, reconstructed as a tuple
    Tuple(Rc<RefCell<Vec<Value>>>),
    /// List
    List(Rc<RefCell<Vec<Value>>>),
    /// Dictionary
    Dict(Rc<RefCell<BTreeMap<HashableValue, Value>>>),
    /// Set
    Set(Rc<BTreeSet<HashableValue>>),
    /// Wall-clock timestamp, reconstructed as `datetime.datetime`
    DateTime(NaiveDateTime),
    /// Time interval, reconstructed as `datetime.timedelta`
    TimeDelta(TimeDelta),
    /// Fixed-point decimal, reconstructed as `decimal.Decimal`
    Decimal(Decimal),
    /// Named enumeration value, encoded as its textual label
    Enum(String),
    /// Record-like host value with a reflected field snapshot
    Object(Rc<dyn Reflect>),
}

/// Backing storage of a native numeric array, one variant per
/// `array.array` typecode the encoder produces.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayData {
    I8(Vec<i8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl ArrayData {
    /// The `array.array` typecode for this element type.
    pub fn typecode(&self) -> u8 {
        match *self {
            ArrayData::I8(_)  => b'b',
            ArrayData::I16(_) => b'h',
            ArrayData::U16(_) => b'H',
            ArrayData::I32(_) => b'i',
            ArrayData::U32(_) => b'I',
            ArrayData::I64(_) => b'l',
            ArrayData::U64(_) => b'L',
            ArrayData::F32(_) => b'f',
            ArrayData::F64(_) => b'd',
        }
    }

    pub fn len(&self) -> usize {
        match *self {
            ArrayData::I8(ref v)  => v.len(),
            ArrayData::I16(ref v) => v.len(),
            ArrayData::U16(ref v) => v.len(),
            ArrayData::I32(ref v) => v.len(),
            ArrayData::U32(ref v) => v.len(),
            ArrayData::I64(ref v) => v.len(),
            ArrayData::U64(ref v) => v.len(),
            ArrayData::F32(ref v) => v.len(),
            ArrayData::F64(ref v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug)]
pub enum HashableValue {
    /// None
    None,
    /// Boolean
    Bool(bool),
    /// Signed integer
    I64(i64),
    /// Unsigned integer above `i64::MAX`
    U64(u64),
    /// Float
    F64(f64),
    /// Single character
    Char(char),
    /// Unicode string
    String(String),
    /// Wall-clock timestamp
    DateTime(NaiveDateTime),
    /// Time interval
    TimeDelta(TimeDelta),
    /// Fixed-point decimal
    Decimal(Decimal),
    /// Named enumeration value
    Enum(String),
    /// Tuple of hashable values
    Tuple(Box<[HashableValue]>),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(RefCell::new(items)))
    }

    pub fn dict(map: BTreeMap<HashableValue, Value>) -> Value {
        Value::Dict(Rc::new(RefCell::new(map)))
    }

    pub fn set(items: BTreeSet<HashableValue>) -> Value {
        Value::Set(Rc::new(items))
    }

    pub fn bytes(data: Vec<u8>) -> Value {
        Value::Bytes(Rc::new(data))
    }

    pub fn array(data: ArrayData) -> Value {
        Value::Array(Rc::new(data))
    }

    pub fn object<T: Reflect>(object: T) -> Value {
        Value::Object(Rc::new(object))
    }

    /// Convert to a hashable value, if the variant supports it.
    pub fn to_hashable(self) -> Option<HashableValue> {
        match self {
            Value::None         => Some(HashableValue::None),
            Value::Bool(b)      => Some(HashableValue::Bool(b)),
            Value::I64(i)       => Some(HashableValue::I64(i)),
            Value::U64(i)       => Some(HashableValue::U64(i)),
            Value::F64(f)       => Some(HashableValue::F64(f)),
            Value::Char(c)      => Some(HashableValue::Char(c)),
            Value::String(s)    => Some(HashableValue::String(s)),
            Value::DateTime(d)  => Some(HashableValue::DateTime(d)),
            Value::TimeDelta(d) => Some(HashableValue::TimeDelta(d)),
            Value::Decimal(d)   => Some(HashableValue::Decimal(d)),
            Value::Enum(s)      => Some(HashableValue::Enum(s)),
            Value::Tuple(t)     => {
                let items = t.borrow().clone();
                items.into_iter()
                     .map(Value::to_hashable)
                     .collect::<Option<Vec<_>>>()
                     .map(|v| HashableValue::Tuple(v.into_boxed_slice()))
            }
            _                   => None,
        }
    }
}

impl HashableValue {
    pub fn to_value(self) -> Value {
        match self {
            HashableValue::None         => Value::None,
            HashableValue::Bool(b)      => Value::Bool(b),
            HashableValue::I64(i)       => Value::I64(i),
            HashableValue::U64(i)       => Value::U64(i),
            HashableValue::F64(f)       => Value::F64(f),
            HashableValue::Char(c)      => Value::Char(c),
            HashableValue::String(s)    => Value::String(s),
            HashableValue::DateTime(d)  => Value::DateTime(d),
            HashableValue::TimeDelta(d) => Value::TimeDelta(d),
            HashableValue::Decimal(d)   => Value::Decimal(d),
            HashableValue::Enum(s)      => Value::Enum(s),
            HashableValue::Tuple(t)     => Value::tuple(
                t.into_vec().into_iter().map(HashableValue::to_value).collect()),
        }
    }
}

impl PartialEq for HashableValue {
    fn eq(&self, other: &HashableValue) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HashableValue {}

impl PartialOrd for HashableValue {
    fn partial_cmp(&self, other: &HashableValue) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Implement a (more or less) consistent ordering for HashableValues so
/// that they can be added to dictionaries and sets.
///
/// Values of the same kind compare naturally; the numeric kinds compare
/// with each other, as do characters and strings (a character orders like
/// its 1-codepoint string, which also matches how both are encoded).
/// Everything else is ordered by kind, similar to Python 2's ordering of
/// different types.
impl Ord for HashableValue {
    fn cmp(&self, other: &HashableValue) -> Ordering {
        use self::HashableValue::*;
        match (self, other) {
            (None, None) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (I64(a), I64(b)) => a.cmp(b),
            (U64(a), U64(b)) => a.cmp(b),
            (I64(a), U64(b)) => cmp_i64_u64(*a, *b),
            (U64(a), I64(b)) => cmp_i64_u64(*b, *a).reverse(),
            (F64(a), F64(b)) => float_ord(*a, *b),
            (I64(a), F64(b)) => float_ord(*a as f64, *b),
            (F64(a), I64(b)) => float_ord(*a, *b as f64),
            (U64(a), F64(b)) => float_ord(*a as f64, *b),
            (F64(a), U64(b)) => float_ord(*a, *b as f64),
            (Char(a), Char(b)) => a.cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Char(a), String(b)) => cmp_char_str(*a, b),
            (String(a), Char(b)) => cmp_char_str(*b, a).reverse(),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (TimeDelta(a), TimeDelta(b)) => a.cmp(b),
            (Decimal(a), Decimal(b)) => a.cmp(b),
            (Enum(a), Enum(b)) => a.cmp(b),
            (Tuple(a), Tuple(b)) => a.cmp(b),
            _ => kind_order(self).cmp(&kind_order(other)),
        }
    }
}

fn kind_order(value: &HashableValue) -> u8 {
    match *value {
        HashableValue::None => 0,
        HashableValue::Bool(_) => 1,
        HashableValue::I64(_) | HashableValue::U64(_) | HashableValue::F64(_) => 2,
        HashableValue::Decimal(_) => 3,
        HashableValue::DateTime(_) => 4,
        HashableValue::TimeDelta(_) => 5,
        HashableValue::Char(_) | HashableValue::String(_) => 6,
        HashableValue::Enum(_) => 7,
        HashableValue::Tuple(_) => 8,
    }
}

/// A reasonable total ordering for floats.
fn float_ord(f: f64, g: f64) -> Ordering {
    match f.partial_cmp(&g) {
        Some(o) => o,
        None    => Ordering::Less,
    }
}

fn cmp_i64_u64(a: i64, b: u64) -> Ordering {
    if a < 0 {
        Ordering::Less
    } else {
        (a as u64).cmp(&b)
    }
}

fn cmp_char_str(c: char, s: &str) -> Ordering {
    let mut buf = [0u8; 4];
    (*c.encode_utf8(&mut buf)).cmp(s)
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) =>
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::List(a), Value::List(b)) =>
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Dict(a), Value::Dict(b)) =>
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::TimeDelta(a), Value::TimeDelta(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Value::None => fmt.write_str("None"),
            Value::Bool(b) => write!(fmt, "Bool({:?})", b),
            Value::I64(i) => write!(fmt, "I64({})", i),
            Value::U64(i) => write!(fmt, "U64({})", i),
            Value::F64(f) => write!(fmt, "F64({})", f),
            Value::Char(c) => write!(fmt, "Char({:?})", c),
            Value::String(ref s) => write!(fmt, "String({:?})", s),
            Value::Bytes(ref b) => write!(fmt, "Bytes({:?})", b),
            Value::Array(ref a) => write!(fmt, "Array({:?})", a),
            Value::Tuple(ref t) => write!(fmt, "Tuple({:?})", t.borrow()),
            Value::List(ref l) => write!(fmt, "List({:?})", l.borrow()),
            Value::Dict(ref d) => write!(fmt, "Dict({:?})", d.borrow()),
            Value::Set(ref s) => write!(fmt, "Set({:?})", s),
            Value::DateTime(ref d) => write!(fmt, "DateTime({})", d),
            Value::TimeDelta(ref d) => write!(fmt, "TimeDelta({})", d),
            Value::Decimal(ref d) => write!(fmt, "Decimal({})", d),
            Value::Enum(ref s) => write!(fmt, "Enum({:?})", s),
            Value::Object(ref o) => write!(
                fmt, "Object({})", o.class_name().as_deref().unwrap_or("<anonymous>")),
        }
    }
}

macro_rules! value_from_signed {
    ($($ty:ty)*) => {
        $(impl From<$ty> for Value {
            fn from(value: $ty) -> Value { Value::I64(value as i64) }
        }
        impl From<$ty> for HashableValue {
            fn from(value: $ty) -> HashableValue { HashableValue::I64(value as i64) }
        })*
    }
}

value_from_signed!(i8 i16 i32 i64 u8 u16 u32);

impl From<u64> for Value {
    fn from(value: u64) -> Value {
        if value <= i64::MAX as u64 {
            Value::I64(value as i64)
        } else {
            Value::U64(value)
        }
    }
}

impl From<u64> for HashableValue {
    fn from(value: u64) -> HashableValue {
        if value <= i64::MAX as u64 {
            HashableValue::I64(value as i64)
        } else {
            HashableValue::U64(value)
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident ($conv:expr),)*) => {
        $(impl From<$ty> for Value {
            fn from(value: $ty) -> Value { Value::$variant($conv(value)) }
        })*
    }
}

value_from! {
    bool => Bool(std::convert::identity),
    f32 => F64(f64::from),
    f64 => F64(std::convert::identity),
    char => Char(std::convert::identity),
    String => String(std::convert::identity),
    NaiveDateTime => DateTime(std::convert::identity),
    TimeDelta => TimeDelta(std::convert::identity),
    Decimal => Decimal(std::convert::identity),
}

impl From<&str> for Value {
    fn from(value: &str) -> Value {
        Value::String(value.to_owned())
    }
}

impl From<&str> for HashableValue {
    fn from(value: &str) -> HashableValue {
        HashableValue::String(value.to_owned())
    }
}

impl From<String> for HashableValue {
    fn from(value: String) -> HashableValue {
        HashableValue::String(value)
    }
}

impl From<bool> for HashableValue {
    fn from(value: bool) -> HashableValue {
        HashableValue::Bool(value)
    }
}

impl From<char> for HashableValue {
    fn from(value: char) -> HashableValue {
        HashableValue::Char(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Value {
        match value {
            Some(inner) => inner.into(),
            None => Value::None,
        }
    }
}

/// Byte vectors become Python bytearrays; there is no `array.array`
/// typecode for unsigned 8-bit elements.
impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Value {
        Value::bytes(value)
    }
}

macro_rules! array_from {
    ($($ty:ty => $variant:ident,)*) => {
        $(impl From<Vec<$ty>> for Value {
            fn from(value: Vec<$ty>) -> Value {
                Value::Array(Rc::new(ArrayData::$variant(value)))
            }
        })*
    }
}

array_from! {
    i8 => I8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

/// Boolean arrays have no typecode and are redirected to a tuple.
impl From<Vec<bool>> for Value {
    fn from(value: Vec<bool>) -> Value {
        Value::tuple(value.into_iter().map(Value::Bool).collect())
    }
}

/// Character arrays are redirected to a string.
impl From<Vec<char>> for Value {
    fn from(value: Vec<char>) -> Value {
        Value::String(value.into_iter().collect())
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Value {
        Value::list(value.into_iter().map(Value::String).collect())
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Value {
        Value::list(value)
    }
}

impl From<BTreeMap<HashableValue, Value>> for Value {
    fn from(value: BTreeMap<HashableValue, Value>) -> Value {
        Value::dict(value)
    }
}

impl From<BTreeSet<HashableValue>> for Value {
    fn from(value: BTreeSet<HashableValue>) -> Value {
        Value::set(value)
    }
}
