//! Dispatch categories and the classification chain.
//!
//! Every value maps to exactly one category, and every category maps
//! statically to one encoder routine.  The chain has a load-bearing
//! precedence: native arrays come before the generic sequence rules (so
//! byte arrays become bytearrays and numeric arrays become `array.array`
//! rather than lists), and a registry hit dominates record reflection, so
//! a user override always beats the built-in strategies.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;

use crate::record::{FieldStrategy, Reflect};
use crate::registry::{CustomPickler, Registry};
use crate::value::{ArrayData, HashableValue, Value};

pub(crate) enum Category<'a> {
    None,
    Bool(bool),
    /// Integer within 64 bits; the encoder picks the narrowest opcode.
    IntSmall(i128),
    /// Unsigned value above the signed 64-bit range.
    IntBig(u64),
    Float(f64),
    Char(char),
    Str(&'a str),
    Bytes(&'a Rc<Vec<u8>>),
    PrimitiveArray(u8, &'a Rc<ArrayData>),
    ObjectTuple(&'a Rc<RefCell<Vec<Value>>>),
    List(&'a Rc<RefCell<Vec<Value>>>),
    Dict(&'a Rc<RefCell<BTreeMap<HashableValue, Value>>>),
    Set(&'a Rc<BTreeSet<HashableValue>>),
    DateTime(NaiveDateTime),
    TimeDelta(TimeDelta),
    Decimal(Decimal),
    EnumLabel(&'a str),
    RecordLike(&'a Rc<dyn Reflect>, FieldStrategy),
    CustomOverride(&'a Rc<dyn Reflect>, Arc<dyn CustomPickler>),
}

/// Classify a value; the first matching rule wins.
pub(crate) fn classify<'a>(value: &'a Value, registry: &Registry) -> Category<'a> {
    match *value {
        // Native arrays, before anything sequence-shaped.
        Value::Array(ref data) => Category::PrimitiveArray(data.typecode(), data),
        Value::Bytes(ref data) => Category::Bytes(data),
        Value::Tuple(ref items) => Category::ObjectTuple(items),
        // Primitives.
        Value::None => Category::None,
        Value::Bool(b) => Category::Bool(b),
        Value::I64(v) => Category::IntSmall(v as i128),
        Value::U64(v) if v > i64::MAX as u64 => Category::IntBig(v),
        Value::U64(v) => Category::IntSmall(v as i128),
        Value::F64(v) => Category::Float(v),
        Value::Char(c) => Category::Char(c),
        // A registered custom pickler dominates record reflection.
        Value::Object(ref obj) => match registry.lookup(obj.as_ref()) {
            Some(handler) => Category::CustomOverride(obj, handler),
            None => Category::RecordLike(obj, obj.strategy()),
        },
        Value::String(ref s) => Category::Str(s),
        Value::Decimal(d) => Category::Decimal(d),
        Value::DateTime(dt) => Category::DateTime(dt),
        Value::TimeDelta(td) => Category::TimeDelta(td),
        Value::Set(ref items) => Category::Set(items),
        Value::Dict(ref map) => Category::Dict(map),
        Value::List(ref items) => Category::List(items),
        Value::Enum(ref label) => Category::EnumLabel(label),
    }
}
