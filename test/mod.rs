// Copyright (c) 2015-2024 Georg Brandl.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

extern crate rand;

use crate::{value_to_vec, DumpOptions, Value};

fn dumps(value: &Value) -> Vec<u8> {
    value_to_vec(value, DumpOptions::new()).unwrap()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

mod stream_tests {
    use std::collections::{BTreeMap, BTreeSet};
    use chrono::{NaiveDate, TimeDelta};
    use rust_decimal::Decimal;
    use super::{contains, dumps};
    use crate::{value_to_vec, DumpOptions, HashableValue, Value};

    #[test]
    fn none() {
        assert_eq!(dumps(&Value::None), b"\x80\x02N.");
    }

    #[test]
    fn booleans() {
        assert_eq!(dumps(&Value::Bool(true)), b"\x80\x02\x88.");
        assert_eq!(dumps(&Value::Bool(false)), b"\x80\x02\x89.");
    }

    #[test]
    fn integers_choose_the_narrowest_opcode() {
        assert_eq!(dumps(&Value::I64(0)), b"\x80\x02K\x00.");
        assert_eq!(dumps(&Value::I64(127)), b"\x80\x02K\x7f.");
        assert_eq!(dumps(&Value::I64(255)), b"\x80\x02K\xff.");
        assert_eq!(dumps(&Value::I64(256)), b"\x80\x02M\x00\x01.");
        assert_eq!(dumps(&Value::I64(65535)), b"\x80\x02M\xff\xff.");
        assert_eq!(dumps(&Value::I64(65536)), b"\x80\x02J\x00\x00\x01\x00.");
        assert_eq!(dumps(&Value::I64(-1)), b"\x80\x02J\xff\xff\xff\xff.");
        assert_eq!(dumps(&Value::I64(2147483647)), b"\x80\x02J\xff\xff\xff\x7f.");
    }

    #[test]
    fn integers_outside_32_bits_use_the_text_opcode() {
        assert_eq!(dumps(&Value::I64(2147483648)), b"\x80\x02I2147483648\n.");
        assert_eq!(dumps(&Value::I64(-2147483649)), b"\x80\x02I-2147483649\n.");
        assert_eq!(dumps(&Value::I64(i64::MIN)), b"\x80\x02I-9223372036854775808\n.");
        assert_eq!(dumps(&Value::U64(u64::MAX)), b"\x80\x02I18446744073709551615\n.");
    }

    #[test]
    fn floats() {
        assert_eq!(dumps(&Value::F64(1.0)),
                   b"\x80\x02G\x3f\xf0\x00\x00\x00\x00\x00\x00.");
        assert_eq!(dumps(&Value::F64(-0.5)),
                   b"\x80\x02G\xbf\xe0\x00\x00\x00\x00\x00\x00.");
    }

    #[test]
    fn strings_are_memoized() {
        assert_eq!(dumps(&Value::from("AB")),
                   b"\x80\x02X\x02\x00\x00\x00ABq\x00.");
        // Non-ASCII content counts UTF-8 bytes, not codepoints.
        assert_eq!(dumps(&Value::from("\u{e5}")),
                   b"\x80\x02X\x02\x00\x00\x00\xc3\xa5q\x00.");
    }

    #[test]
    fn chars_encode_as_one_codepoint_strings() {
        assert_eq!(dumps(&Value::Char('A')), b"\x80\x02X\x01\x00\x00\x00Aq\x00.");
        // A char and the equal string share a memo slot.
        let value = Value::list(vec![Value::Char('A'), Value::from("A")]);
        assert_eq!(dumps(&value),
                   b"\x80\x02]q\x00(X\x01\x00\x00\x00Aq\x01h\x01e.");
    }

    #[test]
    fn lists() {
        let value = Value::list(vec![Value::I64(1), Value::I64(2), Value::I64(3)]);
        assert_eq!(dumps(&value), b"\x80\x02]q\x00(K\x01K\x02K\x03e.");
        assert_eq!(dumps(&Value::list(vec![])), b"\x80\x02]q\x00.");
    }

    #[test]
    fn tuples_are_length_dispatched() {
        assert_eq!(dumps(&Value::tuple(vec![])), b"\x80\x02)q\x00.");
        assert_eq!(dumps(&Value::tuple(vec![Value::I64(42)])),
                   b"\x80\x02K\x2a\x85q\x00.");
        assert_eq!(dumps(&Value::tuple(vec![Value::I64(1), Value::I64(2)])),
                   b"\x80\x02K\x01K\x02\x86q\x00.");
        assert_eq!(dumps(&Value::tuple(vec![Value::I64(1), Value::I64(2), Value::I64(3)])),
                   b"\x80\x02K\x01K\x02K\x03\x87q\x00.");
        let four = Value::tuple(vec![Value::I64(1), Value::I64(2),
                                     Value::I64(3), Value::I64(4)]);
        assert_eq!(dumps(&four), b"\x80\x02(K\x01K\x02K\x03K\x04tq\x00.");
    }

    #[test]
    fn dicts() {
        let mut map = BTreeMap::new();
        map.insert(HashableValue::I64(1), Value::from("a"));
        assert_eq!(dumps(&Value::dict(map)),
                   b"\x80\x02}q\x00(K\x01X\x01\x00\x00\x00aq\x01u.");
        assert_eq!(dumps(&Value::dict(BTreeMap::new())), b"\x80\x02}q\x00.");
    }

    #[test]
    fn sets_reduce_through_builtin_set() {
        let mut items = BTreeSet::new();
        items.insert(HashableValue::I64(1));
        items.insert(HashableValue::I64(2));
        assert_eq!(dumps(&Value::set(items)),
                   b"\x80\x02c__builtin__\nset\n](K\x01K\x02e\x85Rq\x00.");
        assert_eq!(dumps(&Value::set(BTreeSet::new())),
                   b"\x80\x02c__builtin__\nset\n]\x85Rq\x00.");
    }

    #[test]
    fn byte_arrays_reduce_through_bytearray_and_latin_1() {
        let value = Value::bytes(vec![0x00, 0xff]);
        assert_eq!(dumps(&value),
                   &b"\x80\x02c__builtin__\nbytearray\n\
                      X\x03\x00\x00\x00\x00\xc3\xbfq\x00\
                      X\x07\x00\x00\x00latin-1q\x01\x86Rq\x02."[..]);
    }

    #[test]
    fn numeric_arrays_reduce_through_array_array() {
        let value = Value::from(vec![1i32, 2, 3]);
        assert_eq!(dumps(&value),
                   b"\x80\x02carray\narray\nU\x01i](K\x01K\x02K\x03e\x86Rq\x00.");
        let value = Value::from(vec![0.5f64]);
        assert_eq!(dumps(&value),
                   &b"\x80\x02carray\narray\nU\x01d]\
                      (G\x3f\xe0\x00\x00\x00\x00\x00\x00e\x86Rq\x00."[..]);
        // Typecode table.
        for (value, typecode) in [
            (Value::from(vec![1i8]), b'b'),
            (Value::from(vec![1i16]), b'h'),
            (Value::from(vec![1u16]), b'H'),
            (Value::from(vec![1i32]), b'i'),
            (Value::from(vec![1u32]), b'I'),
            (Value::from(vec![1i64]), b'l'),
            (Value::from(vec![1u64]), b'L'),
            (Value::from(vec![1.0f32]), b'f'),
            (Value::from(vec![1.0f64]), b'd'),
        ] {
            let stream = dumps(&value);
            assert_eq!(stream[16], 1, "length prefix for {:?}", value);
            assert_eq!(stream[17], typecode, "typecode for {:?}", value);
        }
    }

    #[test]
    fn boolean_and_char_arrays_are_redirected() {
        assert_eq!(dumps(&Value::from(vec![true, false])),
                   b"\x80\x02\x88\x89\x86q\x00.");
        assert_eq!(dumps(&Value::from(vec!['h', 'i'])),
                   b"\x80\x02X\x02\x00\x00\x00hiq\x00.");
    }

    #[test]
    fn datetimes_reduce_through_the_constructor() {
        let dt = NaiveDate::from_ymd_opt(2014, 7, 8).unwrap()
                           .and_hms_micro_opt(10, 10, 42, 123456).unwrap();
        assert_eq!(dumps(&Value::DateTime(dt)),
                   &b"\x80\x02cdatetime\ndatetime\n\
                      (M\xde\x07K\x07K\x08K\x0aK\x0aK\x2aJ\x40\xe2\x01\x00tRq\x00."[..]);
    }

    #[test]
    fn timedeltas_use_tuple3() {
        let td = TimeDelta::days(2) + TimeDelta::seconds(3661)
               + TimeDelta::microseconds(2500);
        assert_eq!(dumps(&Value::TimeDelta(td)),
                   &b"\x80\x02cdatetime\ntimedelta\n\
                      K\x02M\x4d\x0eM\xc4\x09\x87Rq\x00."[..]);
        // Negative intervals pass negative components; the decoder
        // normalizes them.
        assert_eq!(dumps(&Value::TimeDelta(TimeDelta::seconds(-1))),
                   &b"\x80\x02cdatetime\ntimedelta\n\
                      K\x00J\xff\xff\xff\xffK\x00\x87Rq\x00."[..]);
    }

    #[test]
    fn decimals_reduce_through_their_text_form() {
        let value = Value::Decimal(Decimal::new(12345, 2));
        assert_eq!(dumps(&value),
                   &b"\x80\x02cdecimal\nDecimal\n\
                      X\x06\x00\x00\x00123.45q\x00\x85Rq\x01."[..]);
    }

    #[test]
    fn enums_encode_as_their_label() {
        assert_eq!(dumps(&Value::Enum("GREEN".into())),
                   b"\x80\x02X\x05\x00\x00\x00GREENq\x00.");
    }

    #[test]
    fn streams_are_framed_by_proto_and_stop() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let stream = dumps(&super::gen_value(&mut rng, 2));
            assert_eq!(&stream[..2], b"\x80\x02");
            assert_eq!(*stream.last().unwrap(), b'.');
        }
    }

    #[test]
    fn memo_can_be_disabled() {
        let options = DumpOptions::new().without_memo();
        let stream = value_to_vec(&Value::from("AB"), options.clone()).unwrap();
        assert_eq!(stream, b"\x80\x02X\x02\x00\x00\x00AB.");
        let value = Value::list(vec![Value::from("x"), Value::from("x")]);
        let stream = value_to_vec(&value, options).unwrap();
        assert_eq!(stream,
                   &b"\x80\x02](X\x01\x00\x00\x00xX\x01\x00\x00\x00xe."[..]);
        assert!(!contains(&stream, b"q"));
    }
}

mod memo_tests {
    use super::{contains, dumps};
    use crate::error::{Error, ErrorCode};
    use crate::{value_to_vec, DumpOptions, Value};

    #[test]
    fn repeated_strings_share_a_slot() {
        let value = Value::list(vec![Value::from("x"), Value::from("x"), Value::from("x")]);
        // One full encoding, two BINGETs.
        assert_eq!(dumps(&value),
                   b"\x80\x02]q\x00(X\x01\x00\x00\x00xq\x01h\x01h\x01e.");
    }

    #[test]
    fn shared_lists_keep_their_identity() {
        let inner = Value::list(vec![Value::I64(1)]);
        let outer = Value::list(vec![inner.clone(), inner]);
        assert_eq!(dumps(&outer),
                   b"\x80\x02]q\x00(]q\x01(K\x01eh\x01e.");
    }

    #[test]
    fn equal_but_distinct_lists_are_not_merged() {
        let outer = Value::list(vec![Value::list(vec![]), Value::list(vec![])]);
        assert_eq!(dumps(&outer), b"\x80\x02]q\x00(]q\x01]q\x02e.");
    }

    #[test]
    fn self_referential_lists_terminate() {
        let value = Value::list(vec![]);
        if let Value::List(ref items) = value {
            items.borrow_mut().push(value.clone());
        }
        assert_eq!(dumps(&value), b"\x80\x02]q\x00(h\x00e.");
    }

    #[test]
    fn self_referential_lists_need_the_memo() {
        let value = Value::list(vec![]);
        if let Value::List(ref items) = value {
            items.borrow_mut().push(value.clone());
        }
        match value_to_vec(&value, DumpOptions::new().without_memo()) {
            Err(Error::Encoding(ErrorCode::RecursionTooDeep)) => {}
            _ => assert!(false, "wrong/no error returned for unmemoized cycle"),
        }
    }

    #[test]
    fn deep_nesting_is_bounded() {
        fn nested(depth: usize) -> Value {
            let mut value = Value::list(vec![]);
            for _ in 1..depth {
                value = Value::list(vec![value]);
            }
            value
        }
        assert!(value_to_vec(&nested(200), DumpOptions::new()).is_ok());
        match value_to_vec(&nested(201), DumpOptions::new()) {
            Err(Error::Encoding(ErrorCode::RecursionTooDeep)) => {}
            _ => assert!(false, "wrong/no error returned for deep nesting"),
        }
    }

    #[test]
    fn tuples_containing_themselves_are_rejected() {
        let value = Value::tuple(vec![]);
        if let Value::Tuple(ref items) = value {
            items.borrow_mut().push(value.clone());
        }
        match value_to_vec(&value, DumpOptions::new()) {
            Err(Error::Encoding(ErrorCode::RecursiveArray)) => {}
            _ => assert!(false, "wrong/no error returned for recursive tuple"),
        }
    }

    #[test]
    fn indirect_tuple_cycles_hit_the_recursion_budget() {
        // Tuples are memoized after emission, so a cycle through a list
        // cannot terminate through the memo.
        let tuple = Value::tuple(vec![]);
        let list = Value::list(vec![tuple.clone()]);
        if let Value::Tuple(ref items) = tuple {
            items.borrow_mut().push(list);
        }
        match value_to_vec(&tuple, DumpOptions::new()) {
            Err(Error::Encoding(ErrorCode::RecursionTooDeep)) => {}
            _ => assert!(false, "wrong/no error returned for indirect cycle"),
        }
    }

    #[test]
    fn shallow_graphs_never_need_long_binput() {
        fn nested(depth: usize) -> Value {
            let mut value = Value::list(vec![]);
            for _ in 1..depth {
                value = Value::list(vec![value]);
            }
            value
        }
        let stream = dumps(&nested(8));
        assert!(!stream.contains(&b'r'));
    }

    #[test]
    fn slot_256_switches_to_the_long_opcodes() {
        let mut items: Vec<Value> = (0..256).map(|i| Value::from(format!("s{}", i))).collect();
        items.push(Value::from("s255".to_owned()));
        let stream = dumps(&Value::list(items));
        // Slot 255 (string "s254") still fits the short form.
        assert!(contains(&stream, b"q\xff"));
        // String "s255" takes slot 256: LONG_BINPUT, then LONG_BINGET for
        // its second occurrence.
        assert!(contains(&stream, b"r\x00\x01\x00\x00"));
        assert!(contains(&stream, b"j\x00\x01\x00\x00"));
    }
}

mod record_tests {
    use std::any::Any;
    use std::borrow::Cow;
    use std::cell::RefCell;
    use std::rc::Rc;
    use super::{contains, dumps};
    use crate::error::{Error, ErrorCode};
    use crate::{value_to_vec, DumpOptions, FieldStrategy, Reflect, Result, Value};

    struct Point {
        x: i64,
        y: i64,
    }

    impl Reflect for Point {
        fn class_name(&self) -> Option<Cow<'static, str>> {
            Some(Cow::Borrowed("geo.Point"))
        }

        fn fields(&self) -> Result<Vec<(Cow<'static, str>, Value)>> {
            Ok(vec![(Cow::Borrowed("x"), Value::I64(self.x)),
                    (Cow::Borrowed("y"), Value::I64(self.y))])
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn records_become_class_tagged_dicts() {
        let stream = dumps(&Value::object(Point { x: 1, y: 2 }));
        assert_eq!(stream,
                   &b"\x80\x02}q\x00(\
                      X\x09\x00\x00\x00__class__q\x01\
                      X\x09\x00\x00\x00geo.Pointq\x02\
                      X\x01\x00\x00\x00xq\x03K\x01\
                      X\x01\x00\x00\x00yq\x04K\x02u."[..]);
    }

    #[test]
    fn repeated_records_share_a_slot() {
        let point = Value::object(Point { x: 1, y: 2 });
        let stream = dumps(&Value::list(vec![point.clone(), point]));
        // The record dict takes slot 1; the second occurrence is a get.
        assert!(contains(&stream, b"h\x01e."));
    }

    struct Session {
        token: String,
    }

    impl Reflect for Session {
        fn class_name(&self) -> Option<Cow<'static, str>> {
            // A synthetic record; the dict carries no __class__ tag.
            None
        }

        fn fields(&self) -> Result<Vec<(Cow<'static, str>, Value)>> {
            Ok(vec![(Cow::Borrowed("token"), Value::from(self.token.clone()))])
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn anonymous_records_omit_the_class_tag() {
        let stream = dumps(&Value::object(Session { token: "t".into() }));
        assert!(!contains(&stream, b"__class__"));
        assert_eq!(stream,
                   &b"\x80\x02}q\x00(X\x05\x00\x00\x00tokenq\x01\
                      X\x01\x00\x00\x00tq\x02u."[..]);
    }

    struct Opaque;

    impl Reflect for Opaque {
        fn class_name(&self) -> Option<Cow<'static, str>> {
            Some(Cow::Borrowed("tests.Opaque"))
        }

        fn fields(&self) -> Result<Vec<(Cow<'static, str>, Value)>> {
            Ok(vec![])
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn records_without_readable_state_are_unpicklable() {
        match value_to_vec(&Value::object(Opaque), DumpOptions::new()) {
            Err(Error::Encoding(ErrorCode::Unpicklable(ref name))) => {
                assert_eq!(name, "tests.Opaque");
            }
            _ => assert!(false, "wrong/no error returned for stateless record"),
        }
    }

    struct Broken;

    impl Reflect for Broken {
        fn class_name(&self) -> Option<Cow<'static, str>> {
            Some(Cow::Borrowed("tests.Broken"))
        }

        fn strategy(&self) -> FieldStrategy {
            FieldStrategy::Serializable
        }

        fn fields(&self) -> Result<Vec<(Cow<'static, str>, Value)>> {
            Err(Error::field_read("payload", "backing store gone"))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn field_read_failures_propagate() {
        match value_to_vec(&Value::object(Broken), DumpOptions::new()) {
            Err(Error::Encoding(ErrorCode::FieldRead(ref field, ref cause))) => {
                assert_eq!(field, "payload");
                assert_eq!(cause, "backing store gone");
            }
            _ => assert!(false, "wrong/no error returned for failing accessor"),
        }
    }

    struct Node {
        next: RefCell<Option<Value>>,
    }

    impl Reflect for Node {
        fn class_name(&self) -> Option<Cow<'static, str>> {
            Some(Cow::Borrowed("tests.Node"))
        }

        fn fields(&self) -> Result<Vec<(Cow<'static, str>, Value)>> {
            let next = self.next.borrow().clone().unwrap_or(Value::None);
            Ok(vec![(Cow::Borrowed("next"), next)])
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn self_referential_records_terminate() {
        let node = Rc::new(Node { next: RefCell::new(None) });
        let value = Value::Object(node.clone());
        *node.next.borrow_mut() = Some(value.clone());
        let stream = dumps(&value);
        // The record dict holds slot 0; the cycle closes with a get.
        assert!(contains(&stream, b"h\x00u."));
    }
}

mod registry_tests {
    use std::any::Any;
    use std::borrow::Cow;
    use std::sync::Arc;
    use super::contains;
    use crate::error::{Error, ErrorCode};
    use crate::{
        value_to_vec, CustomPickler, DumpOptions, Reflect, Registry, Result, SaveContext, Value,
    };

    struct Celsius {
        degrees: f64,
    }

    impl Reflect for Celsius {
        fn class_name(&self) -> Option<Cow<'static, str>> {
            Some(Cow::Borrowed("temp.Celsius"))
        }

        fn fields(&self) -> Result<Vec<(Cow<'static, str>, Value)>> {
            Ok(vec![(Cow::Borrowed("degrees"), Value::F64(self.degrees))])
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct AsPlainFloat;

    impl CustomPickler for AsPlainFloat {
        fn pickle(&self, value: &dyn Reflect, ctx: &mut dyn SaveContext) -> Result<()> {
            match value.as_any().downcast_ref::<Celsius>() {
                Some(celsius) => ctx.save(&Value::F64(celsius.degrees)),
                None => Err(Error::Encoding(ErrorCode::Custom("not a Celsius".into()))),
            }
        }
    }

    fn options(registry: Registry) -> DumpOptions {
        DumpOptions::new().with_registry(Arc::new(registry))
    }

    #[test]
    fn overrides_beat_record_reflection() {
        let registry = Registry::new();
        registry.register::<Celsius, _>(AsPlainFloat);
        let value = Value::object(Celsius { degrees: 21.5 });
        let stream = value_to_vec(&value, options(registry)).unwrap();
        assert_eq!(stream, b"\x80\x02G\x40\x35\x80\x00\x00\x00\x00\x00q\x00.");
    }

    #[test]
    fn custom_picked_objects_are_memoized() {
        let registry = Registry::new();
        registry.register::<Celsius, _>(AsPlainFloat);
        let value = Value::object(Celsius { degrees: 21.5 });
        let list = Value::list(vec![value.clone(), value]);
        let stream = value_to_vec(&list, options(registry)).unwrap();
        assert_eq!(stream,
                   &b"\x80\x02]q\x00(\
                      G\x40\x35\x80\x00\x00\x00\x00\x00q\x01h\x01e."[..]);
    }

    struct Fahrenheit;

    impl Reflect for Fahrenheit {
        fn class_name(&self) -> Option<Cow<'static, str>> {
            Some(Cow::Borrowed("temp.Fahrenheit"))
        }

        fn fields(&self) -> Result<Vec<(Cow<'static, str>, Value)>> {
            Ok(vec![(Cow::Borrowed("degrees"), Value::F64(70.0))])
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct AnyTemperature;

    impl CustomPickler for AnyTemperature {
        fn accepts(&self, value: &dyn Reflect) -> bool {
            value.class_name().map_or(false, |name| name.starts_with("temp."))
        }

        fn pickle(&self, _value: &dyn Reflect, ctx: &mut dyn SaveContext) -> Result<()> {
            ctx.save(&Value::from("temperature"))
        }
    }

    #[test]
    fn the_accepts_walk_catches_unregistered_types() {
        let registry = Registry::new();
        registry.register::<Celsius, _>(AnyTemperature);
        // Fahrenheit was never registered; the walk claims it.
        let value = Value::object(Fahrenheit);
        let stream = value_to_vec(&value, options(registry)).unwrap();
        // The label string takes slot 0, the object itself slot 1.
        assert_eq!(stream, b"\x80\x02X\x0b\x00\x00\x00temperatureq\x00q\x01.");
    }

    #[test]
    fn later_registrations_supersede_earlier_ones() {
        let registry = Registry::new();
        registry.register::<Celsius, _>(AsPlainFloat);
        registry.register::<Celsius, _>(AnyTemperature);
        let value = Value::object(Celsius { degrees: 21.5 });
        let stream = value_to_vec(&value, options(registry)).unwrap();
        assert!(contains(&stream, b"temperature"));
    }

    struct Failing;

    impl CustomPickler for Failing {
        fn pickle(&self, _value: &dyn Reflect, _ctx: &mut dyn SaveContext) -> Result<()> {
            Err(Error::Encoding(ErrorCode::Structure("scratch buffer too small".into())))
        }
    }

    #[test]
    fn handler_failures_carry_the_type_name() {
        let registry = Registry::new();
        registry.register::<Celsius, _>(Failing);
        let value = Value::object(Celsius { degrees: 21.5 });
        match value_to_vec(&value, options(registry)) {
            Err(Error::Encoding(ErrorCode::Custom(ref msg))) => {
                assert!(msg.contains("temp.Celsius"));
                assert!(msg.contains("scratch buffer too small"));
            }
            _ => assert!(false, "wrong/no error returned for failing handler"),
        }
    }

    #[test]
    fn unregistered_records_fall_back_to_reflection() {
        let value = Value::object(Celsius { degrees: 21.5 });
        let stream = value_to_vec(&value, options(Registry::new())).unwrap();
        assert!(contains(&stream, b"__class__"));
        assert!(contains(&stream, b"temp.Celsius"));
    }
}

mod serde_tests {
    use std::collections::BTreeMap;
    use serde::Serialize;
    use crate::{to_value, to_vec, value_to_vec, DumpOptions, HashableValue, Value};
    use crate::error::{Error, ErrorCode};

    #[test]
    fn scalars() {
        assert_eq!(to_value(&true).unwrap(), Value::Bool(true));
        assert_eq!(to_value(&-3i32).unwrap(), Value::I64(-3));
        assert_eq!(to_value(&u64::MAX).unwrap(), Value::U64(u64::MAX));
        assert_eq!(to_value(&1.5f32).unwrap(), Value::F64(1.5));
        assert_eq!(to_value(&'x').unwrap(), Value::Char('x'));
        assert_eq!(to_value("abc").unwrap(), Value::from("abc"));
        assert_eq!(to_value(&Option::<i32>::None).unwrap(), Value::None);
    }

    #[test]
    fn sequences_and_tuples() {
        assert_eq!(to_value(&vec![1i64, 2]).unwrap(),
                   Value::list(vec![Value::I64(1), Value::I64(2)]));
        assert_eq!(to_value(&(1i64, "a")).unwrap(),
                   Value::tuple(vec![Value::I64(1), Value::from("a")]));
        // Byte vectors go through the serde data model as sequences; use
        // Value::bytes for a bytearray.
        assert_eq!(to_value(&vec![1u8, 2]).unwrap(),
                   Value::list(vec![Value::I64(1), Value::I64(2)]));
    }

    #[derive(Serialize)]
    struct Config {
        name: String,
        size: i32,
    }

    #[test]
    fn structs_become_plain_dicts() {
        let value = to_value(&Config { name: "tiny".into(), size: 2 }).unwrap();
        let mut expected = BTreeMap::new();
        expected.insert(HashableValue::from("name"), Value::from("tiny"));
        expected.insert(HashableValue::from("size"), Value::I64(2));
        assert_eq!(value, Value::dict(expected));
    }

    #[derive(Serialize)]
    enum Shape {
        Circle,
        Square(u32),
    }

    #[test]
    fn enum_variants_follow_the_label_convention() {
        assert_eq!(to_value(&Shape::Circle).unwrap(), Value::Enum("Circle".into()));
        assert_eq!(to_value(&Shape::Square(3)).unwrap(),
                   Value::tuple(vec![Value::from("Square"), Value::I64(3)]));
        // A unit variant encodes as its bare label.
        assert_eq!(to_vec(&Shape::Circle, DumpOptions::new()).unwrap(),
                   b"\x80\x02X\x06\x00\x00\x00Circleq\x00.");
    }

    #[test]
    fn unhashable_map_keys_are_refused() {
        let mut map = BTreeMap::new();
        map.insert(vec![1i32], 2i32);
        match to_value(&map) {
            Err(Error::Encoding(ErrorCode::ValueNotHashable)) => {}
            _ => assert!(false, "wrong/no error returned for unhashable key"),
        }
    }

    #[test]
    fn generic_and_value_entry_points_agree() {
        let generic = to_vec(&vec![1i64, 2, 3], DumpOptions::new()).unwrap();
        let value = Value::list(vec![Value::I64(1), Value::I64(2), Value::I64(3)]);
        let direct = value_to_vec(&value, DumpOptions::new()).unwrap();
        assert_eq!(generic, direct);
    }
}

mod law_tests {
    use super::rand::{thread_rng, Rng};
    use super::dumps;
    use crate::Value;

    #[test]
    fn narrowest_opcode_law() {
        let mut rng = thread_rng();
        for _ in 0..2000 {
            let value: i64 = match rng.gen_range(0..4) {
                0 => rng.gen_range(0..=255),
                1 => rng.gen_range(256..=65535),
                2 => rng.gen_range(-0x8000_0000..0x8000_0000),
                _ => rng.gen(),
            };
            let stream = dumps(&Value::I64(value));
            let expected = if (0..=255).contains(&value) {
                b'K'
            } else if (256..=65535).contains(&value) {
                b'M'
            } else if (-0x8000_0000..0x8000_0000).contains(&value) {
                b'J'
            } else {
                b'I'
            };
            assert_eq!(stream[2], expected, "opcode for {}", value);
        }
    }
}

fn gen_value(rng: &mut rand::rngs::ThreadRng, depth: u32) -> Value {
    use rand::Rng;
    let upper = if depth > 0 { 9 } else { 6 };
    match rng.gen_range(0..upper) {
        // leaves
        0 => Value::None,
        1 => Value::Bool(rng.gen()),
        2 => Value::I64(rng.gen()),
        3 => Value::F64(rng.gen()),
        4 => Value::bytes((0..rng.gen_range(0..16)).map(|_| rng.gen()).collect()),
        5 => Value::from(
            (0..rng.gen_range(0..12)).map(|_| rng.gen_range('a'..='z')).collect::<String>()),
        // recursive variants
        6 => Value::list(gen_vec(rng, depth - 1)),
        7 => Value::tuple(gen_vec(rng, depth - 1)),
        8 => {
            let keys = (0..rng.gen_range(0..6)).map(|i| crate::HashableValue::I64(i));
            Value::dict(keys.map(|k| (k, gen_value(rng, depth - 1))).collect())
        }
        _ => unreachable!(),
    }
}

fn gen_vec(rng: &mut rand::rngs::ThreadRng, depth: u32) -> Vec<Value> {
    use rand::Rng;
    (0..rng.gen_range(0..8)).map(|_| gen_value(rng, depth)).collect()
}
