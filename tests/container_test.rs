//! Container round-trip tests.
//!
//! These build small books in memory, encode them, and check the decoded
//! fragments and the byte layout of the result.

use kfx_codec::{
    ContainerFormat, DecodeOptions, DiagnosticKind, EncodeOptions, Error, Fragment, FragmentList,
    Symbol, Value, decode, decode_with, encode, encode_with, read_kfx, write_kfx,
};
use tempfile::TempDir;

const CONTAINER_ID: &str = "CR!0123456789ABCDEFGHIJKLMNOPQR";

fn description() -> Fragment {
    Fragment::singleton(
        "$270",
        Value::Struct(vec![
            (Symbol::new("$409"), Value::from(CONTAINER_ID)),
            (Symbol::new("$587"), Value::from("kfxgen-test")),
            (Symbol::new("$588"), Value::from("1.0")),
        ]),
    )
}

fn attachable_book() -> FragmentList {
    vec![description(), Fragment::raw("$417", "resource/hello", b"hello".to_vec())].into()
}

fn main_book() -> FragmentList {
    vec![
        description(),
        Fragment::singleton("$593", Value::List(vec![Value::from("kfxgen.textBlock")])),
        Fragment::singleton(
            "$538",
            Value::Struct(vec![(Symbol::new("$169"), Value::List(vec![]))]),
        ),
        Fragment::new(
            "$260",
            "section-1",
            Value::Struct(vec![
                (Symbol::new("$174"), Value::symbol("section-1")),
                (Symbol::new("$176"), Value::symbol("story-1")),
            ]),
        ),
        Fragment::new(
            "$259",
            "story-1",
            Value::Struct(vec![(
                Symbol::new("$146"),
                Value::List(vec![Value::from("Call me Ishmael.")]),
            )]),
        ),
        Fragment::singleton("$419", Value::List(vec![])),
        Fragment::raw("$417", "resource/hello", b"hello".to_vec()),
    ]
    .into()
}

#[test]
fn test_raw_resource_roundtrip() {
    let encoded = encode_with(&attachable_book(), &EncodeOptions::default()).unwrap();
    let bytes = encoded.bytes;
    assert_eq!(&bytes[0..4], b"CONT");
    assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), 2);

    let decoded = decode_with(&bytes, &DecodeOptions::default()).unwrap();
    assert!(
        !decoded.diagnostics.has_errors(),
        "{:?}",
        decoded.diagnostics
    );
    assert_eq!(decoded.container_id, CONTAINER_ID);
    assert_eq!(decoded.format, ContainerFormat::Metadata);

    let types: Vec<_> = decoded.fragments.iter().map(|f| f.ftype.as_str()).collect();
    assert_eq!(types, ["$ion_symbol_table", "$270", "$417"]);

    let hello = decoded
        .fragments
        .get_by_id("$417", "resource/hello")
        .unwrap();
    assert_eq!(hello.as_raw(), Some(b"hello".as_slice()));

    let description = &decoded.fragments[1].value;
    assert_eq!(description.get("$409").and_then(Value::as_str), Some(CONTAINER_ID));
    assert_eq!(description.get("$587").and_then(Value::as_str), Some("kfxgen-test"));
    assert_eq!(description.get("$588").and_then(Value::as_str), Some("1.0"));
    assert_eq!(description.get("$412").and_then(Value::as_i64), Some(4096));
    assert_eq!(description.get("version").and_then(Value::as_i64), Some(2));
}

#[test]
fn test_main_book_roundtrip() {
    let book = main_book();
    let bytes = encode(&book).unwrap();
    let decoded = decode_with(&bytes, &DecodeOptions::default()).unwrap();

    assert!(decoded.diagnostics.is_empty(), "{:?}", decoded.diagnostics);
    assert_eq!(decoded.format, ContainerFormat::Main);

    let types: Vec<_> = decoded.fragments.iter().map(|f| f.ftype.as_str()).collect();
    assert_eq!(
        types,
        ["$ion_symbol_table", "$270", "$593", "$538", "$260", "$259", "$419", "$417"]
    );

    // Every content fragment comes back unchanged.
    for original in book.iter().filter(|f| f.ftype != "$270") {
        let found = decoded
            .fragments
            .iter()
            .find(|f| f.ftype == original.ftype && f.fid == original.fid)
            .unwrap_or_else(|| panic!("missing {} {:?}", original.ftype, original.fid));
        assert_eq!(found, original);
    }

    // Local symbols are the used non-shared symbols, in natural order.
    let table = decoded.fragments.get("$ion_symbol_table").unwrap();
    let symbols: Vec<_> = table
        .value
        .get("symbols")
        .and_then(Value::as_list)
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(symbols, ["resource/hello", "section-1", "story-1"]);
}

#[test]
fn test_reencode_is_byte_identical() {
    let first = encode(&main_book()).unwrap();
    let decoded = decode(&first).unwrap();
    let second = encode(&decoded).unwrap();
    assert_eq!(first, second);

    let pure = decode_with(&first, &DecodeOptions::new().with_pure(true)).unwrap();
    let third = encode(&pure.fragments).unwrap();
    assert_eq!(first.len(), third.len());
}

/// `ENTY` header info: BVM then `{$410: 0, $411: 0}`.
const ENTITY_INFO: [u8; 11] = [0xe0, 0x01, 0x00, 0xea, 0xd6, 0x03, 0x9a, 0x20, 0x03, 0x9b, 0x20];

/// A `CONT` v2 container laid out by hand: one `$417` entity holding
/// "hello" under id `$10`, no document symbols, empty format capabilities.
fn minimal_container() -> Vec<u8> {
    let mut entity = b"ENTY".to_vec();
    entity.extend_from_slice(&1u16.to_le_bytes());
    entity.extend_from_slice(&(10 + ENTITY_INFO.len() as u32).to_le_bytes());
    entity.extend_from_slice(&ENTITY_INFO);
    entity.extend_from_slice(b"hello");

    let mut index = Vec::new();
    index.extend_from_slice(&10u32.to_le_bytes());
    index.extend_from_slice(&417u32.to_le_bytes());
    index.extend_from_slice(&0u64.to_le_bytes());
    index.extend_from_slice(&(entity.len() as u64).to_le_bytes());

    // {$409: id, $410: 0, $411: 0, $413: 18, $414: 24, $415: 42, $416: 0,
    //  $412: 4096, $594: 42, $595: 0}
    let mut fields = vec![0x03, 0x99, 0x8e, 0x80 | CONTAINER_ID.len() as u8];
    fields.extend_from_slice(CONTAINER_ID.as_bytes());
    fields.extend_from_slice(&[
        0x03, 0x9a, 0x20, //
        0x03, 0x9b, 0x20, //
        0x03, 0x9d, 0x21, 0x12, //
        0x03, 0x9e, 0x21, 0x18, //
        0x03, 0x9f, 0x21, 0x2a, //
        0x03, 0xa0, 0x20, //
        0x03, 0x9c, 0x22, 0x10, 0x00, //
        0x04, 0xd2, 0x21, 0x2a, //
        0x04, 0xd3, 0x20,
    ]);
    let mut info = vec![0xe0, 0x01, 0x00, 0xea, 0xde, 0x80 | fields.len() as u8];
    info.extend_from_slice(&fields);

    let sha1 = sha1_smol::Sha1::from(&entity).digest().to_string();
    let generator = format!(
        "[{{key:\"kfxgen_package_version\",value:\"1.0\"}},\
         {{key:\"kfxgen_application_version\",value:\"kfxgen-test\"}},\
         {{key:\"kfxgen_payload_sha1\",value:\"{sha1}\"}},\
         {{key:\"kfxgen_acr\",value:\"{CONTAINER_ID}\"}}]"
    );

    let ci_offset = 18 + index.len();
    let header_len = ci_offset + info.len() + generator.len();
    let mut bytes = b"CONT".to_vec();
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&(header_len as u32).to_le_bytes());
    bytes.extend_from_slice(&(ci_offset as u32).to_le_bytes());
    bytes.extend_from_slice(&(info.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&index);
    bytes.extend_from_slice(&info);
    bytes.extend_from_slice(generator.as_bytes());
    bytes.extend_from_slice(&entity);
    bytes
}

#[test]
fn test_minimal_container_reencodes_identically() {
    let original = minimal_container();
    let decoded = decode_with(&original, &DecodeOptions::default()).unwrap();
    assert!(
        !decoded
            .diagnostics
            .iter()
            .any(|d| d.message.contains("kfxgen_payload_sha1")),
        "{:?}",
        decoded.diagnostics
    );

    let types: Vec<_> = decoded.fragments.iter().map(|f| f.ftype.as_str()).collect();
    assert_eq!(types, ["$270", "$417"]);
    let hello = decoded.fragments.get_by_id("$417", "$10").unwrap();
    assert_eq!(hello.as_raw(), Some(b"hello".as_slice()));

    let reencoded = encode(&decoded.fragments).unwrap();
    let generator_start = 18 + 24 + 74;
    assert_eq!(original.len(), reencoded.len());
    assert_eq!(&original[..6], &reencoded[..6]);
    assert_eq!(
        &original[10..generator_start],
        &reencoded[10..generator_start]
    );
    let header_len = u32::from_le_bytes([original[6], original[7], original[8], original[9]]);
    assert_eq!(
        &original[header_len as usize..],
        &reencoded[header_len as usize..]
    );
    assert_eq!(original, reencoded);
}

#[test]
fn test_missing_container_fragments_are_reported() {
    let fragments: FragmentList =
        vec![Fragment::raw("$417", "resource/hello", b"hello".to_vec())].into();
    let encoded = encode_with(&fragments, &EncodeOptions::default()).unwrap();
    assert!(
        encoded
            .diagnostics
            .of_kind(DiagnosticKind::SchemaViolation)
            .any(|d| d.message.contains("$270"))
    );

    // A fresh container id is generated.
    let decoded = decode_with(&encoded.bytes, &DecodeOptions::default()).unwrap();
    assert!(decoded.container_id.starts_with("CR!"));
    assert_eq!(decoded.container_id.len(), 31);
}

#[test]
fn test_too_short_is_malformed() {
    assert!(matches!(
        decode(b"CONT\x02\x00"),
        Err(Error::MalformedStream(_))
    ));
    assert!(matches!(decode(&[]), Err(Error::MalformedStream(_))));
}

#[test]
fn test_bad_signature_is_malformed() {
    let mut bytes = encode(&attachable_book()).unwrap();
    bytes[0] = b'X';
    assert!(matches!(decode(&bytes), Err(Error::MalformedStream(_))));
}

#[test]
fn test_size_limit() {
    let bytes = encode(&attachable_book()).unwrap();
    let options = DecodeOptions::new().with_max_container_size(16);
    assert!(matches!(
        decode_with(&bytes, &options),
        Err(Error::TooLarge { limit: 16, .. })
    ));
}

#[test]
fn test_payload_digest_mismatch_is_reported() {
    let mut bytes = encode(&attachable_book()).unwrap();
    let last = bytes.len() - 1;
    bytes[last] = b'p';

    let decoded = decode_with(&bytes, &DecodeOptions::default()).unwrap();
    assert!(
        decoded
            .diagnostics
            .iter()
            .any(|d| d.message.contains("kfxgen_payload_sha1"))
    );
    let hello = decoded.fragments.get("$417").unwrap();
    assert_eq!(hello.as_raw(), Some(b"hellp".as_slice()));
}

#[test]
fn test_truncated_entity_data_is_fatal() {
    let bytes = encode(&attachable_book()).unwrap();
    let truncated = &bytes[..bytes.len() - 2];
    assert!(matches!(decode(truncated), Err(Error::MalformedStream(_))));
}

#[test]
fn test_undefined_entity_id() {
    let mut bytes = encode(&attachable_book()).unwrap();
    // First index table entry starts right after the 18-byte header.
    bytes[18..22].copy_from_slice(&5000u32.to_le_bytes());

    let decoded = decode_with(&bytes, &DecodeOptions::default()).unwrap();
    let resource = decoded.fragments.get("$417").unwrap();
    assert_eq!(resource.fid.as_ref().map(Symbol::as_str), Some("$5000"));
    assert!(
        decoded
            .diagnostics
            .of_kind(DiagnosticKind::SymbolResolution)
            .any(|d| d.message.contains("$5000"))
    );

    let strict = DecodeOptions::new().with_strict(true);
    assert!(matches!(
        decode_with(&bytes, &strict),
        Err(Error::UnresolvedSymbols { .. })
    ));
}

#[test]
fn test_rebuild_symbols_on_request() {
    let decoded = decode(&encode(&main_book()).unwrap()).unwrap();

    let mut fragments: FragmentList = decoded
        .into_iter()
        .filter(|f| f.ftype != "$259")
        .collect();
    fragments.push(Fragment::new("$259", "story-2", Value::Null));

    let options = EncodeOptions::new().with_rebuild_symbols(true);
    let encoded = encode_with(&fragments, &options).unwrap();
    let decoded = decode(&encoded.bytes).unwrap();
    let table = decoded.get("$ion_symbol_table").unwrap();
    let symbols: Vec<_> = table
        .value
        .get("symbols")
        .and_then(Value::as_list)
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(symbols, ["resource/hello", "section-1", "story-1", "story-2"]);
}

#[test]
fn test_file_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("book.kfx");

    let diagnostics = write_kfx(&path, &main_book()).unwrap();
    assert!(diagnostics.is_empty(), "{diagnostics:?}");

    let decoded = read_kfx(&path).unwrap();
    assert_eq!(decoded.container_id, CONTAINER_ID);
    assert_eq!(decoded.fragments.len(), 8);
}
