//! Lowering serde-serializable data into host values.
//!
//! Any `T: Serialize` can be encoded by first lowering it into a `Value`
//! graph.  Structs become dicts keyed by field name (without a class
//! tag), sequences become lists, serde tuples become tuples.  Enum
//! variants follow the usual convention: a unit variant is its plain
//! label, other variants become `('Variant', data)` tuples.

use std::collections::BTreeMap;

use serde::ser::{self, Serialize};

use crate::error::{Error, ErrorCode, Result};
use crate::value::{HashableValue, Value};

/// Lower any serializable data into a `Value` graph.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    value.serialize(ValueSerializer)
}

fn hashable(value: Value) -> Result<HashableValue> {
    value.to_hashable()
         .ok_or(Error::Encoding(ErrorCode::ValueNotHashable))
}

struct ValueSerializer;

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = Error;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = TupleBuilder;
    type SerializeTupleStruct = TupleBuilder;
    type SerializeTupleVariant = VariantSeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantMapBuilder;

    #[inline]
    fn serialize_bool(self, value: bool) -> Result<Value> {
        Ok(Value::Bool(value))
    }

    #[inline]
    fn serialize_i8(self, value: i8) -> Result<Value> {
        self.serialize_i64(value as i64)
    }

    #[inline]
    fn serialize_i16(self, value: i16) -> Result<Value> {
        self.serialize_i64(value as i64)
    }

    #[inline]
    fn serialize_i32(self, value: i32) -> Result<Value> {
        self.serialize_i64(value as i64)
    }

    #[inline]
    fn serialize_i64(self, value: i64) -> Result<Value> {
        Ok(Value::I64(value))
    }

    #[inline]
    fn serialize_u8(self, value: u8) -> Result<Value> {
        self.serialize_u64(value as u64)
    }

    #[inline]
    fn serialize_u16(self, value: u16) -> Result<Value> {
        self.serialize_u64(value as u64)
    }

    #[inline]
    fn serialize_u32(self, value: u32) -> Result<Value> {
        self.serialize_u64(value as u64)
    }

    #[inline]
    fn serialize_u64(self, value: u64) -> Result<Value> {
        Ok(Value::from(value))
    }

    #[inline]
    fn serialize_f32(self, value: f32) -> Result<Value> {
        Ok(Value::F64(value as f64))
    }

    #[inline]
    fn serialize_f64(self, value: f64) -> Result<Value> {
        Ok(Value::F64(value))
    }

    #[inline]
    fn serialize_char(self, value: char) -> Result<Value> {
        Ok(Value::Char(value))
    }

    #[inline]
    fn serialize_str(self, value: &str) -> Result<Value> {
        Ok(Value::String(value.to_owned()))
    }

    #[inline]
    fn serialize_bytes(self, value: &[u8]) -> Result<Value> {
        Ok(Value::bytes(value.to_vec()))
    }

    #[inline]
    fn serialize_none(self) -> Result<Value> {
        self.serialize_unit()
    }

    #[inline]
    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value> {
        value.serialize(self)
    }

    #[inline]
    fn serialize_unit(self) -> Result<Value> {
        Ok(Value::None)
    }

    #[inline]
    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value> {
        Ok(Value::tuple(vec![]))
    }

    #[inline]
    fn serialize_unit_variant(self, _name: &'static str, _variant_index: u32,
                              variant: &'static str) -> Result<Value> {
        Ok(Value::Enum(variant.to_owned()))
    }

    #[inline]
    fn serialize_newtype_struct<T: Serialize + ?Sized>(self, _name: &'static str,
                                                       value: &T) -> Result<Value> {
        value.serialize(self)
    }

    #[inline]
    fn serialize_newtype_variant<T: Serialize + ?Sized>(self, _name: &'static str,
                                                        _variant_index: u32,
                                                        variant: &'static str,
                                                        value: &T) -> Result<Value> {
        Ok(Value::tuple(vec![Value::String(variant.to_owned()), to_value(value)?]))
    }

    #[inline]
    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder> {
        Ok(SeqBuilder { items: Vec::with_capacity(len.unwrap_or(0)) })
    }

    #[inline]
    fn serialize_tuple(self, len: usize) -> Result<TupleBuilder> {
        Ok(TupleBuilder { items: Vec::with_capacity(len) })
    }

    #[inline]
    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<TupleBuilder> {
        self.serialize_tuple(len)
    }

    #[inline]
    fn serialize_tuple_variant(self, _name: &'static str, _variant_index: u32,
                               variant: &'static str, len: usize) -> Result<VariantSeqBuilder> {
        Ok(VariantSeqBuilder { variant, items: Vec::with_capacity(len) })
    }

    #[inline]
    fn serialize_map(self, _len: Option<usize>) -> Result<MapBuilder> {
        Ok(MapBuilder { map: BTreeMap::new(), key: None })
    }

    #[inline]
    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<MapBuilder> {
        Ok(MapBuilder { map: BTreeMap::new(), key: None })
    }

    #[inline]
    fn serialize_struct_variant(self, _name: &'static str, _variant_index: u32,
                                variant: &'static str, _len: usize) -> Result<VariantMapBuilder> {
        Ok(VariantMapBuilder { variant, map: BTreeMap::new() })
    }
}

struct SeqBuilder {
    items: Vec<Value>,
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.items.push(to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::list(self.items))
    }
}

struct TupleBuilder {
    items: Vec<Value>,
}

impl ser::SerializeTuple for TupleBuilder {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.items.push(to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::tuple(self.items))
    }
}

impl ser::SerializeTupleStruct for TupleBuilder {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.items.push(to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::tuple(self.items))
    }
}

struct VariantSeqBuilder {
    variant: &'static str,
    items: Vec<Value>,
}

impl ser::SerializeTupleVariant for VariantSeqBuilder {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.items.push(to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::tuple(vec![Value::String(self.variant.to_owned()),
                             Value::list(self.items)]))
    }
}

struct MapBuilder {
    map: BTreeMap<HashableValue, Value>,
    key: Option<HashableValue>,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        self.key = Some(hashable(to_value(key)?)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let key = self.key.take().ok_or(Error::Encoding(
            ErrorCode::InvariantViolation("map value without key")))?;
        self.map.insert(key, to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::dict(self.map))
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str,
                                              value: &T) -> Result<()> {
        self.map.insert(HashableValue::String(key.to_owned()), to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::dict(self.map))
    }
}

struct VariantMapBuilder {
    variant: &'static str,
    map: BTreeMap<HashableValue, Value>,
}

impl ser::SerializeStructVariant for VariantMapBuilder {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str,
                                              value: &T) -> Result<()> {
        self.map.insert(HashableValue::String(key.to_owned()), to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::tuple(vec![Value::String(self.variant.to_owned()),
                             Value::dict(self.map)]))
    }
}
