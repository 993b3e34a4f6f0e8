// Copyright (c) 2015-2024 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Encoding Rust values in Python's pickle format
//!
//! # Pickle format
//!
//! Please see the [Python docs](http://docs.python.org/library/pickle) for
//! details on the Pickle format.
//!
//! This crate writes pickle protocol 2, which every Python from 2.3 on can
//! read with a plain `pickle.loads`.  It is an encoder only.
//!
//! # Supported types
//!
//! The encoder works on the [`Value`] sum type, which covers the object
//! graphs this library can serialize:
//!
//! * None
//! * Booleans (Rust `bool`)
//! * Integers (Rust `i64`/`u64`; values above the signed range are
//!   written in a form Python reads as a long)
//! * Floats (Rust `f64`)
//! * Strings and chars (Rust `String`/`char`, as unicode strings)
//! * Byte arrays (Rust `Vec<u8>`, as Python `bytearray`)
//! * Native numeric arrays (as `array.array` with the matching typecode)
//! * Tuples, lists, sets and dictionaries
//! * Timestamps and intervals (`chrono`, as `datetime.datetime` and
//!   `datetime.timedelta`)
//! * Fixed-point decimals (`rust_decimal`, as `decimal.Decimal`)
//! * Enumeration values, written as their textual label
//! * Record-like values, written as a dict of their fields with a
//!   `__class__` tag (see below)
//!
//! Repeated and cyclic references to lists, dicts, tuples and records are
//! preserved through the pickle memo, so shared identity survives a round
//! trip through `pickle.loads`.
//!
//! # Records and custom picklers
//!
//! Types opt into encoding by implementing [`Reflect`] — usually through
//! `#[derive(Pickle)]`, which selects fields the way the attribute says
//! (`contract`, `serializable`, or the default of all public fields).  A
//! [`CustomPickler`] registered for a type takes precedence over its
//! reflected form and writes the stream fragment itself.
//!
//! *Note on enums:* unit enum variants are serialized as their plain
//! label; downstream consumers that need the enum type name must wrap the
//! value with a custom pickler.
//!
//! # Exported API
//!
//! The library exports `value_to_*` functions taking the [`Value`] graph,
//! and generic serde counterparts `to_*` that lower any `T: Serialize`
//! through [`to_value`] first (structs become plain dicts without a class
//! tag on that path).

pub use self::error::{Error, ErrorCode, Result};

pub use self::record::{FieldStrategy, Reflect};

pub use self::registry::{register, CustomPickler, Registry};

pub use self::ser::{
    to_vec, to_writer, value_to_vec, value_to_writer, DumpOptions, Pickler, SaveContext,
};

pub use self::value::{ArrayData, HashableValue, Value};

pub use self::value_impls::to_value;

pub use pickler_derive::Pickle;

mod classify;
mod consts;
mod emit;
pub mod error;
mod memo;
pub mod record;
pub mod registry;
pub mod ser;
pub mod value;
mod value_impls;

#[cfg(test)]
#[path = "../test/mod.rs"]
mod test;
