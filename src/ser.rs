// Copyright (c) 2015-2024 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Pickle serialization
//!
//! The saver is the single entry point for writing a value: it guards the
//! recursion budget, probes the memo before classification so repeated
//! references short-circuit identically for every category, and then
//! dispatches to the encoder routine of the classified category.  Every
//! encoder writes a self-contained protocol 2 fragment.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::rc::Rc;
use std::sync::Arc;

use chrono::{Datelike, NaiveDateTime, TimeDelta, Timelike};
use rust_decimal::Decimal;
use serde::ser::Serialize;

use crate::classify::{classify, Category};
use crate::consts::*;
use crate::emit::Emitter;
use crate::error::{Error, ErrorCode, Result};
use crate::memo::{memo_key, memo_key_hashable, MemoKey, MemoTable};
use crate::record::{FieldStrategy, Reflect};
use crate::registry::{CustomPickler, Registry};
use crate::value::{ArrayData, HashableValue, Value};
use crate::value_impls::to_value;

/// How deep `save` may recurse before the session is failed.
const MAX_DEPTH: usize = 200;

/// Items per `MARK`..`APPENDS`/`SETITEMS` batch, as in Python's pickle.
const BATCH_SIZE: usize = 1000;

/// Options for encoding; the default enables memoization and uses the
/// process-wide custom pickler registry.
#[derive(Clone, Default)]
pub struct DumpOptions {
    without_memo: bool,
    registry: Option<Arc<Registry>>,
}

impl DumpOptions {
    pub fn new() -> DumpOptions {
        DumpOptions::default()
    }

    /// Disable the memo table.  Repeated references are re-encoded in
    /// full, shared identity is lost on the Python side, and cyclic
    /// graphs run into the recursion budget.
    pub fn without_memo(mut self) -> DumpOptions {
        self.without_memo = true;
        self
    }

    /// Consult `registry` for custom picklers instead of the
    /// process-wide one.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> DumpOptions {
        self.registry = Some(registry);
        self
    }
}

/// Capabilities handed to a custom pickler: recursive saving plus raw
/// emission.
pub trait SaveContext {
    /// Save a child value as a self-contained fragment.
    fn save(&mut self, value: &Value) -> Result<()>;
    /// Write a single opcode byte.
    fn write_opcode(&mut self, opcode: u8) -> Result<()>;
    /// Write raw payload bytes.
    fn write_raw(&mut self, data: &[u8]) -> Result<()>;
}

/// A structure for serializing host values into a pickle stream.
///
/// One `dump` call is one session: it owns the sink, a fresh memo table
/// and the recursion counter.  The pickler is strictly single-threaded
/// and not reentrant.
pub struct Pickler<W: io::Write> {
    emitter: Emitter<W>,
    memo: MemoTable,
    depth: usize,
    registry: Option<Arc<Registry>>,
}

impl<W: io::Write> Pickler<W> {
    pub fn new(writer: W, options: DumpOptions) -> Pickler<W> {
        Pickler {
            emitter: Emitter::new(writer),
            memo: MemoTable::new(!options.without_memo),
            depth: 0,
            registry: options.registry,
        }
    }

    /// Unwrap the writer from the pickler.
    pub fn into_inner(self) -> W {
        self.emitter.into_inner()
    }

    /// Write one complete pickle: protocol header, the value, `STOP`.
    ///
    /// On failure the sink may contain a partial fragment, which the
    /// caller must discard.
    pub fn dump(&mut self, value: &Value) -> Result<()> {
        self.memo.clear();
        self.depth = 0;
        self.emitter.write_opcode(PROTO)?;
        self.emitter.write_u8(2)?;
        self.save(value)?;
        if self.depth != 0 {
            return Err(Error::Encoding(ErrorCode::InvariantViolation(
                "recursion counter nonzero at session end")));
        }
        self.emitter.write_opcode(STOP)
    }

    /// Append a self-contained fragment that reconstructs `value`.
    fn save(&mut self, value: &Value) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::Encoding(ErrorCode::RecursionTooDeep));
        }
        if let Some(key) = memo_key(value) {
            if self.memo.try_get(&key, &mut self.emitter)? {
                self.depth -= 1;
                return Ok(());
            }
        }
        let registry: &Registry = match self.registry.as_deref() {
            Some(r) => r,
            None => Registry::global(),
        };
        match classify(value, registry) {
            Category::None => self.emitter.write_opcode(NONE)?,
            Category::Bool(b) => {
                self.emitter.write_opcode(if b { NEWTRUE } else { NEWFALSE })?
            }
            Category::IntSmall(v) => self.put_long(v)?,
            Category::IntBig(v) => self.put_long(v as i128)?,
            Category::Float(v) => self.put_float(v)?,
            Category::Char(c) => {
                let mut buf = [0u8; 4];
                self.put_str(c.encode_utf8(&mut buf))?
            }
            Category::Str(s) => self.put_str(s)?,
            Category::EnumLabel(label) => self.put_str(label)?,
            Category::Bytes(data) => self.put_bytes(data)?,
            Category::PrimitiveArray(typecode, data) => self.put_array(typecode, data)?,
            Category::ObjectTuple(items) => self.put_tuple(items)?,
            Category::List(items) => self.put_list(items)?,
            Category::Dict(map) => self.put_dict(map)?,
            Category::Set(items) => self.put_set(items)?,
            Category::DateTime(dt) => self.put_datetime(dt)?,
            Category::TimeDelta(td) => self.put_timedelta(td)?,
            Category::Decimal(d) => self.put_decimal(d)?,
            Category::RecordLike(obj, strategy) => self.put_record(obj, strategy)?,
            Category::CustomOverride(obj, handler) => self.put_custom(obj, handler)?,
        }
        self.depth -= 1;
        Ok(())
    }

    /// Like `save`, for dict keys and set elements.
    fn save_hashable(&mut self, value: &HashableValue) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::Encoding(ErrorCode::RecursionTooDeep));
        }
        if let Some(key) = memo_key_hashable(value) {
            if self.memo.try_get(&key, &mut self.emitter)? {
                self.depth -= 1;
                return Ok(());
            }
        }
        match *value {
            HashableValue::None => self.emitter.write_opcode(NONE)?,
            HashableValue::Bool(b) => {
                self.emitter.write_opcode(if b { NEWTRUE } else { NEWFALSE })?
            }
            HashableValue::I64(v) => self.put_long(v as i128)?,
            HashableValue::U64(v) => self.put_long(v as i128)?,
            HashableValue::F64(v) => self.put_float(v)?,
            HashableValue::Char(c) => {
                let mut buf = [0u8; 4];
                self.put_str(c.encode_utf8(&mut buf))?
            }
            HashableValue::String(ref s) | HashableValue::Enum(ref s) => self.put_str(s)?,
            HashableValue::DateTime(dt) => self.put_datetime(dt)?,
            HashableValue::TimeDelta(td) => self.put_timedelta(td)?,
            HashableValue::Decimal(d) => self.put_decimal(d)?,
            HashableValue::Tuple(ref items) => {
                self.put_tuple_body(items, |slf, item| slf.save_hashable(item))?
            }
        }
        self.depth -= 1;
        Ok(())
    }

    /// Emit the narrowest integer opcode for `v`.
    fn put_long(&mut self, v: i128) -> Result<()> {
        if (0..=0xff).contains(&v) {
            self.emitter.write_opcode(BININT1)?;
            self.emitter.write_u8(v as u8)
        } else if (0..=0xffff).contains(&v) {
            self.emitter.write_opcode(BININT2)?;
            self.emitter.write_u16_le(v as u16)
        } else if (-0x8000_0000..0x8000_0000).contains(&v) {
            self.emitter.write_opcode(BININT)?;
            self.emitter.write_i32_le(v as i32)
        } else {
            // Everything outside the signed 32-bit range goes through the
            // text opcode, whose parser accepts arbitrary magnitudes.
            self.emitter.write_opcode(INT)?;
            self.emitter.write_raw(v.to_string().as_bytes())?;
            self.emitter.write_raw(b"\n")
        }
    }

    fn put_float(&mut self, v: f64) -> Result<()> {
        self.emitter.write_opcode(BINFLOAT)?;
        self.emitter.write_f64_be(v)
    }

    fn put_str(&mut self, s: &str) -> Result<()> {
        self.emitter.write_opcode(BINUNICODE)?;
        self.emitter.write_u32_le(s.len() as u32)?;
        self.emitter.write_raw(s.as_bytes())?;
        self.memo.insert(MemoKey::Str(s.to_owned()), &mut self.emitter)
    }

    /// `GLOBAL` with its two newline-terminated name parts; both are
    /// ASCII by construction.
    fn put_global(&mut self, module: &[u8], name: &[u8]) -> Result<()> {
        self.emitter.write_opcode(GLOBAL)?;
        self.emitter.write_raw(module)?;
        self.emitter.write_raw(b"\n")?;
        self.emitter.write_raw(name)?;
        self.emitter.write_raw(b"\n")
    }

    /// `bytearray(<raw string>, "latin-1")`.  The raw string maps each
    /// byte to the codepoint of the same value, which latin-1 decoding
    /// reverses on the Python side.
    fn put_bytes(&mut self, data: &Rc<Vec<u8>>) -> Result<()> {
        self.put_global(b"__builtin__", b"bytearray")?;
        let raw: String = data.iter().map(|&b| b as char).collect();
        self.put_str(&raw)?;
        self.put_str("latin-1")?;
        self.emitter.write_opcode(TUPLE2)?;
        self.emitter.write_opcode(REDUCE)?;
        self.memo.insert_ref(&Value::Bytes(data.clone()), &mut self.emitter)
    }

    /// `array.array(typecode, [items])`.
    fn put_array(&mut self, typecode: u8, data: &Rc<ArrayData>) -> Result<()> {
        self.put_global(b"array", b"array")?;
        // The typecode is a Python 2 byte string, not unicode.
        self.emitter.write_opcode(SHORT_BINSTRING)?;
        self.emitter.write_u8(1)?;
        self.emitter.write_u8(typecode)?;
        match **data {
            ArrayData::I8(ref v) => self.put_int_items(v, |x| x as i128)?,
            ArrayData::I16(ref v) => self.put_int_items(v, |x| x as i128)?,
            ArrayData::U16(ref v) => self.put_int_items(v, |x| x as i128)?,
            ArrayData::I32(ref v) => self.put_int_items(v, |x| x as i128)?,
            ArrayData::U32(ref v) => self.put_int_items(v, |x| x as i128)?,
            ArrayData::I64(ref v) => self.put_int_items(v, |x| x as i128)?,
            ArrayData::U64(ref v) => self.put_int_items(v, |x| x as i128)?,
            ArrayData::F32(ref v) => self.put_float_items(v, f64::from)?,
            ArrayData::F64(ref v) => self.put_float_items(v, |x| x)?,
        }
        self.emitter.write_opcode(TUPLE2)?;
        self.emitter.write_opcode(REDUCE)?;
        self.memo.insert_ref(&Value::Array(data.clone()), &mut self.emitter)
    }

    fn put_int_items<T: Copy, F: Fn(T) -> i128>(&mut self, items: &[T], f: F) -> Result<()> {
        self.emitter.write_opcode(EMPTY_LIST)?;
        for chunk in items.chunks(BATCH_SIZE) {
            self.emitter.write_opcode(MARK)?;
            for &item in chunk {
                self.put_long(f(item))?;
            }
            self.emitter.write_opcode(APPENDS)?;
        }
        Ok(())
    }

    fn put_float_items<T: Copy, F: Fn(T) -> f64>(&mut self, items: &[T], f: F) -> Result<()> {
        self.emitter.write_opcode(EMPTY_LIST)?;
        for chunk in items.chunks(BATCH_SIZE) {
            self.emitter.write_opcode(MARK)?;
            for &item in chunk {
                self.put_float(f(item))?;
            }
            self.emitter.write_opcode(APPENDS)?;
        }
        Ok(())
    }

    /// Length-dispatched tuple.  Memoized after emission: a tuple cannot
    /// contain itself, which the per-element check enforces.
    fn put_tuple(&mut self, items: &Rc<RefCell<Vec<Value>>>) -> Result<()> {
        {
            let borrowed = items.borrow();
            self.put_tuple_body(&borrowed, |slf, item| {
                if let Value::Tuple(ref inner) = *item {
                    if Rc::ptr_eq(inner, items) {
                        return Err(Error::Encoding(ErrorCode::RecursiveArray));
                    }
                }
                slf.save(item)
            })?;
        }
        self.memo.insert_ref(&Value::Tuple(items.clone()), &mut self.emitter)
    }

    fn put_tuple_body<T, F>(&mut self, t: &[T], f: F) -> Result<()>
        where F: Fn(&mut Self, &T) -> Result<()>
    {
        if t.is_empty() {
            self.emitter.write_opcode(EMPTY_TUPLE)
        } else if t.len() == 1 {
            f(self, &t[0])?;
            self.emitter.write_opcode(TUPLE1)
        } else if t.len() == 2 {
            f(self, &t[0])?;
            f(self, &t[1])?;
            self.emitter.write_opcode(TUPLE2)
        } else if t.len() == 3 {
            f(self, &t[0])?;
            f(self, &t[1])?;
            f(self, &t[2])?;
            self.emitter.write_opcode(TUPLE3)
        } else {
            self.emitter.write_opcode(MARK)?;
            for item in t {
                f(self, item)?;
            }
            self.emitter.write_opcode(TUPLE)
        }
    }

    fn put_list(&mut self, items: &Rc<RefCell<Vec<Value>>>) -> Result<()> {
        self.emitter.write_opcode(EMPTY_LIST)?;
        // The slot is recorded before the items are drained so that a
        // list reaching itself terminates through a memo hit.
        self.memo.insert_ref(&Value::List(items.clone()), &mut self.emitter)?;
        let items = items.borrow();
        for chunk in items.chunks(BATCH_SIZE) {
            self.emitter.write_opcode(MARK)?;
            for item in chunk {
                self.save(item)?;
            }
            self.emitter.write_opcode(APPENDS)?;
        }
        Ok(())
    }

    fn put_dict(&mut self, map: &Rc<RefCell<BTreeMap<HashableValue, Value>>>) -> Result<()> {
        self.emitter.write_opcode(EMPTY_DICT)?;
        self.memo.insert_ref(&Value::Dict(map.clone()), &mut self.emitter)?;
        let map = map.borrow();
        let mut written = 0;
        for (key, value) in map.iter() {
            if written % BATCH_SIZE == 0 {
                if written > 0 {
                    self.emitter.write_opcode(SETITEMS)?;
                }
                self.emitter.write_opcode(MARK)?;
            }
            self.save_hashable(key)?;
            self.save(value)?;
            written += 1;
        }
        if written > 0 {
            self.emitter.write_opcode(SETITEMS)?;
        }
        Ok(())
    }

    /// `set([items])`.  Memoized after emission: set elements are
    /// hashable, so the set cannot contain itself.
    fn put_set(&mut self, items: &Rc<BTreeSet<HashableValue>>) -> Result<()> {
        self.put_global(b"__builtin__", b"set")?;
        self.emitter.write_opcode(EMPTY_LIST)?;
        let mut written = 0;
        for item in items.iter() {
            if written % BATCH_SIZE == 0 {
                if written > 0 {
                    self.emitter.write_opcode(APPENDS)?;
                }
                self.emitter.write_opcode(MARK)?;
            }
            self.save_hashable(item)?;
            written += 1;
        }
        if written > 0 {
            self.emitter.write_opcode(APPENDS)?;
        }
        self.emitter.write_opcode(TUPLE1)?;
        self.emitter.write_opcode(REDUCE)?;
        self.memo.insert_ref(&Value::Set(items.clone()), &mut self.emitter)
    }

    /// `datetime.datetime(Y, M, D, h, m, s, us)`.
    fn put_datetime(&mut self, dt: NaiveDateTime) -> Result<()> {
        self.put_global(b"datetime", b"datetime")?;
        self.emitter.write_opcode(MARK)?;
        self.put_long(dt.year() as i128)?;
        self.put_long(dt.month() as i128)?;
        self.put_long(dt.day() as i128)?;
        self.put_long(dt.hour() as i128)?;
        self.put_long(dt.minute() as i128)?;
        self.put_long(dt.second() as i128)?;
        // A chrono leap second clamps into the final microsecond.
        self.put_long((dt.nanosecond() / 1000).min(999_999) as i128)?;
        self.emitter.write_opcode(TUPLE)?;
        self.emitter.write_opcode(REDUCE)?;
        self.memo.insert(MemoKey::DateTime(dt), &mut self.emitter)
    }

    /// `datetime.timedelta(days, seconds, microseconds)`.  No `MARK`
    /// precedes the fields because `TUPLE3` consumes exactly three stack
    /// items.
    fn put_timedelta(&mut self, td: TimeDelta) -> Result<()> {
        self.put_global(b"datetime", b"timedelta")?;
        let days = td.num_days();
        let rem = td - TimeDelta::days(days);
        let seconds = rem.num_seconds();
        let micros = (rem - TimeDelta::seconds(seconds)).num_microseconds().unwrap_or(0);
        self.put_long(days as i128)?;
        self.put_long(seconds as i128)?;
        self.put_long(micros as i128)?;
        self.emitter.write_opcode(TUPLE3)?;
        self.emitter.write_opcode(REDUCE)?;
        self.memo.insert(
            MemoKey::TimeDelta(td.num_seconds(), td.subsec_nanos()),
            &mut self.emitter)
    }

    /// `decimal.Decimal("<canonical string>")`.
    fn put_decimal(&mut self, d: Decimal) -> Result<()> {
        self.put_global(b"decimal", b"Decimal")?;
        self.put_str(&d.to_string())?;
        self.emitter.write_opcode(TUPLE1)?;
        self.emitter.write_opcode(REDUCE)?;
        self.memo.insert(MemoKey::Decimal(d), &mut self.emitter)
    }

    /// A record becomes a dict of its reflected fields, with `__class__`
    /// first unless the record is anonymous.
    fn put_record(&mut self, obj: &Rc<dyn Reflect>, strategy: FieldStrategy) -> Result<()> {
        let fields = obj.fields()?;
        if fields.is_empty() && strategy == FieldStrategy::PublicProperties {
            // No readable state at all; no rule matches such a value.
            let name = obj.class_name()
                          .map(|c| c.into_owned())
                          .unwrap_or_else(|| "<anonymous>".into());
            return Err(Error::Encoding(ErrorCode::Unpicklable(name)));
        }
        let class = obj.class_name();
        self.emitter.write_opcode(EMPTY_DICT)?;
        // Pre-memoized under the record's own identity so that
        // self-referential records terminate.
        self.memo.insert_ref(&Value::Object(obj.clone()), &mut self.emitter)?;
        if class.is_none() && fields.is_empty() {
            return Ok(());
        }
        self.emitter.write_opcode(MARK)?;
        if let Some(class) = class {
            self.put_str("__class__")?;
            self.put_str(&class)?;
        }
        for (name, value) in &fields {
            self.put_str(name)?;
            self.save(value)?;
        }
        self.emitter.write_opcode(SETITEMS)
    }

    /// Delegate to a registered handler, then memoize its result under
    /// the object's identity.
    fn put_custom(&mut self, obj: &Rc<dyn Reflect>, handler: Arc<dyn CustomPickler>) -> Result<()> {
        match handler.pickle(obj.as_ref(), self) {
            Ok(()) => {}
            Err(Error::Io(err)) => return Err(Error::Io(err)),
            Err(err) => {
                let name = obj.class_name()
                              .map(|c| c.into_owned())
                              .unwrap_or_else(|| "<anonymous>".into());
                return Err(Error::Encoding(ErrorCode::Custom(
                    format!("custom pickler for {} failed: {}", name, err))));
            }
        }
        self.memo.insert_ref(&Value::Object(obj.clone()), &mut self.emitter)
    }
}

impl<W: io::Write> SaveContext for Pickler<W> {
    fn save(&mut self, value: &Value) -> Result<()> {
        Pickler::save(self, value)
    }

    fn write_opcode(&mut self, opcode: u8) -> Result<()> {
        self.emitter.write_opcode(opcode)
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.emitter.write_raw(data)
    }
}

/// Encode the value into a pickle stream.
pub fn value_to_writer<W: io::Write>(writer: &mut W, value: &Value, options: DumpOptions)
                                     -> Result<()> {
    Pickler::new(writer, options).dump(value)
}

/// Encode the value into a `Vec<u8>` buffer.
#[inline]
pub fn value_to_vec(value: &Value, options: DumpOptions) -> Result<Vec<u8>> {
    let mut writer = Vec::with_capacity(128);
    value_to_writer(&mut writer, value, options)?;
    Ok(writer)
}

/// Encode any serializable data into a pickle stream.
#[inline]
pub fn to_writer<W: io::Write, T: Serialize>(writer: &mut W, value: &T, options: DumpOptions)
                                             -> Result<()> {
    let value = to_value(value)?;
    value_to_writer(writer, &value, options)
}

/// Encode any serializable data into a `Vec<u8>` buffer.
#[inline]
pub fn to_vec<T: Serialize>(value: &T, options: DumpOptions) -> Result<Vec<u8>> {
    let mut writer = Vec::with_capacity(128);
    to_writer(&mut writer, value, options)?;
    Ok(writer)
}
