//! The memo table.
//!
//! Every reference-capable value that has been written gets a densely
//! assigned slot; writing the same identity again emits a `*GET` instead
//! of a second encoding.  Strings (and everything encoded as a string)
//! plus the immutable scalar constructors are keyed by content, which
//! makes equal values share a slot.  Containers and records are keyed by
//! their allocation address, since their Python counterparts are mutable
//! and must not be merged by content.

use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::consts::*;
use crate::emit::Emitter;
use crate::error::Result;
use crate::value::{HashableValue, Value};

/// Memo identity of an already-written value.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) enum MemoKey {
    /// Allocation address of a shared container or record.
    Addr(usize),
    /// Text content; strings, chars and enum labels share slots.
    Str(String),
    DateTime(NaiveDateTime),
    /// Whole seconds and subsecond nanoseconds of an interval.
    TimeDelta(i64, i32),
    Decimal(Decimal),
}

pub(crate) fn rc_addr<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

/// Memo identity of a value, `None` for primitives that are never
/// memoized.
pub(crate) fn memo_key(value: &Value) -> Option<MemoKey> {
    match *value {
        Value::String(ref s) | Value::Enum(ref s) => Some(MemoKey::Str(s.clone())),
        Value::Char(c) => Some(MemoKey::Str(c.to_string())),
        Value::Bytes(ref b) => Some(MemoKey::Addr(rc_addr(b))),
        Value::Array(ref a) => Some(MemoKey::Addr(rc_addr(a))),
        Value::Tuple(ref t) => Some(MemoKey::Addr(rc_addr(t))),
        Value::List(ref l) => Some(MemoKey::Addr(rc_addr(l))),
        Value::Dict(ref d) => Some(MemoKey::Addr(rc_addr(d))),
        Value::Set(ref s) => Some(MemoKey::Addr(rc_addr(s))),
        Value::DateTime(dt) => Some(MemoKey::DateTime(dt)),
        Value::TimeDelta(td) => Some(MemoKey::TimeDelta(td.num_seconds(), td.subsec_nanos())),
        Value::Decimal(d) => Some(MemoKey::Decimal(d)),
        Value::Object(ref o) => Some(MemoKey::Addr(rc_addr(o))),
        _ => None,
    }
}

/// Memo identity of a hashable value.  Tuple keys have no stable
/// allocation and are re-encoded each time.
pub(crate) fn memo_key_hashable(value: &HashableValue) -> Option<MemoKey> {
    match *value {
        HashableValue::String(ref s) | HashableValue::Enum(ref s) => {
            Some(MemoKey::Str(s.clone()))
        }
        HashableValue::Char(c) => Some(MemoKey::Str(c.to_string())),
        HashableValue::DateTime(dt) => Some(MemoKey::DateTime(dt)),
        HashableValue::TimeDelta(td) => {
            Some(MemoKey::TimeDelta(td.num_seconds(), td.subsec_nanos()))
        }
        HashableValue::Decimal(d) => Some(MemoKey::Decimal(d)),
        _ => None,
    }
}

pub(crate) struct MemoTable {
    slots: HashMap<MemoKey, u32>,
    next: u32,
    enabled: bool,
    // Handles of address-keyed entries; cloning them pins the allocation
    // so an address cannot be reused within the session.
    keep: Vec<Value>,
}

impl MemoTable {
    pub fn new(enabled: bool) -> MemoTable {
        MemoTable {
            slots: HashMap::new(),
            next: 0,
            enabled,
            keep: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.next = 0;
        self.keep.clear();
    }

    /// On a hit, emit `BINGET`/`LONG_BINGET` for the slot and report
    /// success.
    pub fn try_get<W: io::Write>(&self, key: &MemoKey, emitter: &mut Emitter<W>) -> Result<bool> {
        if !self.enabled {
            return Ok(false);
        }
        match self.slots.get(key) {
            Some(&slot) if slot <= 0xff => {
                emitter.write_opcode(BINGET)?;
                emitter.write_u8(slot as u8)?;
                Ok(true)
            }
            Some(&slot) => {
                emitter.write_opcode(LONG_BINGET)?;
                emitter.write_u32_le(slot)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Assign the next slot to `key` and emit `BINPUT`/`LONG_BINPUT`.
    pub fn insert<W: io::Write>(&mut self, key: MemoKey, emitter: &mut Emitter<W>) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let slot = self.next;
        self.next += 1;
        self.slots.insert(key, slot);
        if slot <= 0xff {
            emitter.write_opcode(BINPUT)?;
            emitter.write_u8(slot as u8)
        } else {
            emitter.write_opcode(LONG_BINPUT)?;
            emitter.write_u32_le(slot)
        }
    }

    /// Record a shared reference under its address identity.
    pub fn insert_ref<W: io::Write>(&mut self, value: &Value, emitter: &mut Emitter<W>) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if let Some(key) = memo_key(value) {
            self.keep.push(value.clone());
            self.insert(key, emitter)?;
        }
        Ok(())
    }
}
