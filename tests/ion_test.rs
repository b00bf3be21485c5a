//! Ion codec tests through the public API.

use kfx_codec::kfx::ion::varint::{
    decode_sint, decode_vlsint, decode_vluint, encode_sint, encode_vlsint, encode_vluint,
    VLUINT_MAX,
};
use kfx_codec::kfx::ion::{decode_stream, encode_stream};
use kfx_codec::{
    Decimal, DiagnosticKind, Diagnostics, Error, Symbol, SymbolTable, TimestampPrecision, Value,
};
use num_bigint::BigInt;
use proptest::prelude::*;

const BVM: [u8; 4] = [0xe0, 0x01, 0x00, 0xea];

fn decode(bytes: &[u8]) -> (Vec<Value>, Diagnostics) {
    let mut diag = Diagnostics::new();
    let mut symtab = SymbolTable::for_kfx(&mut diag);
    let values = decode_stream(bytes, &mut symtab, &mut diag).unwrap();
    (values, diag)
}

fn stream(body: &[u8]) -> Vec<u8> {
    let mut bytes = BVM.to_vec();
    bytes.extend_from_slice(body);
    bytes
}

#[test]
fn test_duplicate_key_last_value_wins() {
    // {$10: 1, $11: 3, $10: 2}
    let (values, diag) = decode(&stream(&[
        0xd9, 0x8a, 0x21, 0x01, 0x8b, 0x21, 0x03, 0x8a, 0x21, 0x02,
    ]));
    assert_eq!(
        values,
        [Value::Struct(vec![
            (Symbol::new("$10"), Value::from(2)),
            (Symbol::new("$11"), Value::from(3)),
        ])]
    );
    assert_eq!(diag.of_kind(DiagnosticKind::SchemaViolation).count(), 1);
}

#[test]
fn test_year_month_timestamp() {
    // unknown offset, 2024, month 5
    let (values, diag) = decode(&stream(&[0x64, 0xc0, 0x0f, 0xe8, 0x85]));
    assert!(diag.is_empty(), "{diag:?}");
    let Value::Timestamp(ts) = &values[0] else {
        panic!("expected timestamp, got {:?}", values[0]);
    };
    assert_eq!(ts.precision(), TimestampPrecision::Month);
    assert_eq!(ts.year_value(), 2024);
    assert_eq!(ts.month_value(), Some(5));
    assert_eq!(ts.day_value(), None);
    assert_eq!(ts.offset_minutes(), None);
}

#[test]
fn test_local_symbol_table_with_truncated_import() {
    let table = Value::annotated(
        vec![Symbol::new("$ion_symbol_table")],
        Value::Struct(vec![
            (
                Symbol::new("imports"),
                Value::List(vec![Value::Struct(vec![
                    (Symbol::new("name"), Value::from("YJ_symbols")),
                    (Symbol::new("version"), Value::from(10)),
                    (Symbol::new("max_id"), Value::from(5)),
                ])]),
            ),
            (Symbol::new("symbols"), Value::List(vec![Value::from("local")])),
        ]),
    )
    .unwrap();

    let mut writer_table = SymbolTable::new();
    let bytes = encode_stream(
        &[
            table,
            Value::Symbol(Symbol::from_id(12)),
            Value::Symbol(Symbol::from_id(15)),
            Value::Symbol(Symbol::from_id(20)),
        ],
        &mut writer_table,
    )
    .unwrap();

    let mut diag = Diagnostics::new();
    let mut symtab = SymbolTable::new();
    let values = decode_stream(&bytes, &mut symtab, &mut diag).unwrap();

    assert_eq!(values.len(), 4);
    assert_eq!(values[1], Value::symbol("$12"));
    assert_eq!(values[2], Value::symbol("local"));
    assert_eq!(values[3], Value::symbol("$20"));
    assert_eq!(symtab.max_id(), 15);
    assert!(symtab.undefined_ids().contains(&20));
}

#[test]
fn test_oversized_import_max_id_is_rejected() {
    let table = Value::annotated(
        vec![Symbol::new("$ion_symbol_table")],
        Value::Struct(vec![(
            Symbol::new("imports"),
            Value::List(vec![Value::Struct(vec![
                (Symbol::new("name"), Value::from("YJ_symbols")),
                (Symbol::new("version"), Value::from(10)),
                (Symbol::new("max_id"), Value::from(4_000_000_000)),
            ])]),
        )]),
    )
    .unwrap();
    let bytes = encode_stream(&[table], &mut SymbolTable::new()).unwrap();

    let mut diag = Diagnostics::new();
    let mut symtab = SymbolTable::new();
    let result = decode_stream(&bytes, &mut symtab, &mut diag);
    assert!(matches!(result, Err(Error::MalformedStream(_))));
}

#[test]
fn test_nop_padding_between_values() {
    // 1, NOP (2 bytes of padding), 2
    let (values, diag) = decode(&stream(&[0x21, 0x01, 0x02, 0x00, 0x00, 0x21, 0x02]));
    assert!(diag.is_empty());
    assert_eq!(values, [Value::from(1), Value::from(2)]);
}

#[test]
fn test_unterminated_vluint_in_stream() {
    let mut diag = Diagnostics::new();
    let mut symtab = SymbolTable::new();
    // Variable-length string whose length never terminates.
    let result = decode_stream(&stream(&[0x8e, 0x01, 0x02]), &mut symtab, &mut diag);
    assert!(result.is_err());
}

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<i128>().prop_map(Value::int),
        (-1e300..1e300f64).prop_map(Value::Float),
        (any::<i64>(), -40i32..40).prop_map(|(c, e)| Value::Decimal(Decimal::new(c, e))),
        (10u32..=851).prop_map(|id| Value::Symbol(Symbol::from_id(id))),
        any::<String>().prop_map(Value::String),
        prop::collection::vec(any::<u8>(), 0..300).prop_map(Value::Blob),
        prop::collection::vec(any::<u8>(), 0..20).prop_map(Value::Clob),
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    arb_scalar().prop_recursive(3, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::List),
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::SExp),
            prop::collection::btree_map(10u32..=851, inner.clone(), 0..8).prop_map(|fields| {
                Value::Struct(
                    fields
                        .into_iter()
                        .map(|(id, v)| (Symbol::from_id(id), v))
                        .collect(),
                )
            }),
            (10u32..=851, inner).prop_map(|(id, v)| match v {
                Value::Annotated(_) => v,
                v => Value::annotated(vec![Symbol::from_id(id)], v).unwrap(),
            }),
        ]
    })
}

proptest! {
    #[test]
    fn prop_vluint_roundtrip_minimal(value in 0..=VLUINT_MAX) {
        let mut bytes = Vec::new();
        encode_vluint(value, &mut bytes);

        let bits = 64 - value.leading_zeros() as usize;
        prop_assert_eq!(bytes.len(), bits.div_ceil(7).max(1));

        let mut diag = Diagnostics::new();
        prop_assert_eq!(decode_vluint(&bytes, &mut diag).unwrap(), (value, bytes.len()));
        prop_assert!(diag.is_empty());
    }

    #[test]
    fn prop_vlsint_roundtrip(value in -(1i64 << 53)..(1i64 << 53)) {
        let mut bytes = Vec::new();
        encode_vlsint(Some(value), &mut bytes);

        let mut diag = Diagnostics::new();
        prop_assert_eq!(
            decode_vlsint(&bytes, false, &mut diag).unwrap(),
            (Some(value), bytes.len())
        );
    }

    #[test]
    fn prop_sint_roundtrip(value in any::<i128>()) {
        let value = BigInt::from(value);
        let mut bytes = Vec::new();
        encode_sint(&value, &mut bytes);
        prop_assert_eq!(decode_sint(&bytes), value);
    }

    #[test]
    fn prop_value_roundtrip(values in prop::collection::vec(arb_value(), 1..4)) {
        let mut symtab = SymbolTable::for_kfx(&mut Diagnostics::new());
        let bytes = encode_stream(&values, &mut symtab).unwrap();

        let (decoded, diag) = decode(&bytes);
        prop_assert!(diag.is_empty(), "{:?}", diag);
        prop_assert_eq!(decoded, values);
    }
}
