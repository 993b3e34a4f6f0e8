// Copyright (c) 2015-2024 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Error objects and codes

use std::error;
use std::fmt;
use std::io;
use std::result;
use serde::ser;

#[derive(Clone, PartialEq, Debug)]
pub enum ErrorCode {
    /// No encoding rule matches the value and no custom pickler claims it
    Unpicklable(String),
    /// Nesting exceeded the recursion budget
    RecursionTooDeep,
    /// A tuple directly contains itself
    RecursiveArray,
    /// Reading a record field failed
    FieldRead(String, String),
    /// A custom pickler failed
    Custom(String),
    /// Value not hashable, but used as dict key or set item
    ValueNotHashable,
    /// Internal bookkeeping broke an encoder invariant
    InvariantViolation(&'static str),
    /// Structure serialization error
    Structure(String),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ErrorCode::Unpicklable(ref ty) =>
                write!(fmt, "cannot pickle values of type {}", ty),
            ErrorCode::RecursionTooDeep => write!(fmt, "maximum recursion depth exceeded"),
            ErrorCode::RecursiveArray => write!(fmt, "tuple contains itself"),
            ErrorCode::FieldRead(ref field, ref cause) =>
                write!(fmt, "reading field {} failed: {}", field, cause),
            ErrorCode::Custom(ref msg) => fmt.write_str(msg),
            ErrorCode::ValueNotHashable => write!(fmt, "dict key or set item not hashable"),
            ErrorCode::InvariantViolation(what) =>
                write!(fmt, "encoder invariant violated: {}", what),
            ErrorCode::Structure(ref s) => fmt.write_str(s),
        }
    }
}

/// This type represents all possible errors that can occur when encoding a
/// value into a pickle stream.
#[derive(Debug)]
pub enum Error {
    /// Some IO error occurred when writing to the sink.
    Io(io::Error),
    /// The value graph could not be encoded.
    Encoding(ErrorCode),
}

impl Error {
    /// Failure while snapshotting a record field; for use by `Reflect`
    /// implementations whose accessors can fail.
    pub fn field_read<C: fmt::Display>(field: &str, cause: C) -> Error {
        Error::Encoding(ErrorCode::FieldRead(field.into(), cause.to_string()))
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        Error::Io(error)
    }
}

pub type Result<T> = result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref error) => error.fmt(fmt),
            Error::Encoding(ref code) => write!(fmt, "encoding error: {}", code),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref error) => Some(error),
            Error::Encoding(_) => None,
        }
    }
}

impl ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Error {
        Error::Encoding(ErrorCode::Structure(msg.to_string()))
    }
}
