//! Opcode emission.
//!
//! A thin adapter over the byte sink: single opcodes, raw slices and the
//! fixed-width numeric payloads of the binary opcodes.  No policy lives
//! here; opcode selection is the saver's business.

use std::io;
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use crate::error::Result;

pub(crate) struct Emitter<W> {
    sink: W,
}

impl<W: io::Write> Emitter<W> {
    pub fn new(sink: W) -> Emitter<W> {
        Emitter { sink }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    #[inline]
    pub fn write_opcode(&mut self, opcode: u8) -> Result<()> {
        self.sink.write_all(&[opcode]).map_err(From::from)
    }

    #[inline]
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.sink.write_all(data).map_err(From::from)
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.sink.write_u8(value).map_err(From::from)
    }

    #[inline]
    pub fn write_u16_le(&mut self, value: u16) -> Result<()> {
        self.sink.write_u16::<LittleEndian>(value).map_err(From::from)
    }

    #[inline]
    pub fn write_i32_le(&mut self, value: i32) -> Result<()> {
        self.sink.write_i32::<LittleEndian>(value).map_err(From::from)
    }

    #[inline]
    pub fn write_u32_le(&mut self, value: u32) -> Result<()> {
        self.sink.write_u32::<LittleEndian>(value).map_err(From::from)
    }

    #[inline]
    pub fn write_f64_be(&mut self, value: f64) -> Result<()> {
        // Yes, this one is big endian.
        self.sink.write_f64::<BigEndian>(value).map_err(From::from)
    }
}
