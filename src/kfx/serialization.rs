//! KFX container serialization.
//!
//! Handles the binary format for KFX containers and entities: the inverse
//! of [`container`](super::container).

use tracing::debug;

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{Error, Result};
use crate::options::EncodeOptions;

use super::container::{
    CONTAINER_HEADER_LEN, CONTAINER_MAGIC, CONTAINER_VERSION, DEFAULT_CHUNK_SIZE,
    DEFAULT_COMPRESSION_TYPE, DEFAULT_DRM_SCHEME, ENTITY_HEADER_LEN, ENTITY_MAGIC, ENTITY_VERSION,
    adjust_import_max_ids, description_key, info_key,
};
use super::fragment::{CONTAINER_FRAGMENT_TYPES, Fragment, FragmentList, NULL_ID, is_container_type};
use super::generator::GeneratorInfo;
use super::ion::encode_stream;
use super::symbols::{SYSTEM_SYMBOL_COUNT, sym};
use super::symtab::SymbolTable;
use super::value::{Annotated, Symbol, Value};

/// Format capabilities are only written when the symbol table reaches past
/// their container-info keys.
const FC_MIN_LOCAL_ID: u32 = 595;

const DEFAULT_APPLICATION_VERSION: &str = env!("CARGO_PKG_NAME");
const DEFAULT_PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Serialized entity ready for container output.
pub struct SerializedEntity {
    /// Entity ID (fragment ID symbol)
    pub id: u32,
    /// Entity type (fragment type symbol)
    pub entity_type: u32,
    /// Serialized data (ENTY-wrapped)
    pub data: Vec<u8>,
}

/// Serialize a fragment list into a complete container.
///
/// Every symbol the fragments use must already be defined in `symtab`.
/// Missing or duplicated container fragments are reported and the
/// container is written anyway.
pub fn serialize_fragments(
    fragments: &FragmentList,
    symtab: &mut SymbolTable,
    options: &EncodeOptions,
    diag: &mut Diagnostics,
) -> Result<Vec<u8>> {
    let counts = CONTAINER_FRAGMENT_TYPES.map(|ftype| fragments.of_type(ftype).count());
    let [symbol_tables, descriptions, capabilities, entity_maps] = counts;
    if descriptions != 1 || capabilities > 1 || symbol_tables != 1 || entity_maps != 1 {
        diag.error(
            DiagnosticKind::SchemaViolation,
            format!(
                "container fragments: {symbol_tables} $ion_symbol_table, {descriptions} $270, \
                 {capabilities} $593, {entity_maps} $419"
            ),
        );
    }

    let description = fragments.get("$270").map(|f| f.value.unannotated());
    let text_field = |key: &str| {
        description
            .and_then(|d| d.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let generator = GeneratorInfo {
        application_version: text_field(description_key::APPLICATION_VERSION)
            .or_else(|| options.application_version.clone())
            .unwrap_or_else(|| DEFAULT_APPLICATION_VERSION.to_string()),
        package_version: text_field(description_key::PACKAGE_VERSION)
            .or_else(|| options.package_version.clone())
            .unwrap_or_else(|| DEFAULT_PACKAGE_VERSION.to_string()),
        ..Default::default()
    };

    let doc_symbols = match fragments.get(sym::ION_SYMBOL_TABLE) {
        Some(fragment) => {
            let mut table = fragment.value.unannotated().clone();
            adjust_import_max_ids(&mut table, i64::from(SYSTEM_SYMBOL_COUNT));
            annotated_ion(symtab, sym::ION_SYMBOL_TABLE, table)?
        }
        None => Vec::new(),
    };
    let format_capabilities = match fragments.get("$593") {
        Some(fragment) => annotated_ion(symtab, "$593", fragment.value.unannotated().clone())?,
        None => Vec::new(),
    };

    let mut entities = Vec::new();
    for fragment in fragments {
        if is_container_type(fragment.ftype.as_str()) && fragment.ftype != "$419" {
            continue;
        }
        let fid = fragment.fid.clone().unwrap_or_else(|| Symbol::new(NULL_ID));
        entities.push(SerializedEntity {
            id: defined_id(symtab, &fid)?,
            entity_type: defined_id(symtab, &fragment.ftype)?,
            data: serialize_entity(symtab, fragment)?,
        });
    }

    let container_id = match text_field(info_key::CONTAINER_ID).filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => {
            let payload = entities.iter().map(|e| e.data.as_slice()).collect::<Vec<_>>().concat();
            let id = generate_container_id(&payload);
            debug!(id = %id, "generated container id");
            id
        }
    };

    serialize_container(
        symtab,
        &container_id,
        &generator,
        &entities,
        &doc_symbols,
        &format_capabilities,
    )
}

fn defined_id(symtab: &mut SymbolTable, symbol: &Symbol) -> Result<u32> {
    match symtab.get_id(symbol, true) {
        0 => Err(Error::precondition(format!(
            "fragment symbol {symbol} is not in the symbol table"
        ))),
        id => Ok(id),
    }
}

/// Serialize a complete KFX container.
///
/// Container layout:
/// - Header: CONT magic + version + header_len + ci_offset + ci_len
/// - Entity table (indexed by $413/$414)
/// - Doc symbols ION (indexed by $415/$416)
/// - Format capabilities ION (indexed by $594/$595)
/// - Container info ION
/// - kfxgen_info JSON
/// - Entity payloads (after header_len)
pub fn serialize_container(
    symtab: &mut SymbolTable,
    container_id: &str,
    generator: &GeneratorInfo,
    entities: &[SerializedEntity],
    symtab_ion: &[u8],
    format_caps_ion: &[u8],
) -> Result<Vec<u8>> {
    // Build entity table and calculate payload offsets
    let mut entity_table = Vec::with_capacity(entities.len() * 24);
    let mut current_offset = 0u64;
    for entity in entities {
        entity_table.extend_from_slice(&entity.id.to_le_bytes());
        entity_table.extend_from_slice(&entity.entity_type.to_le_bytes());
        entity_table.extend_from_slice(&current_offset.to_le_bytes());
        entity_table.extend_from_slice(&(entity.data.len() as u64).to_le_bytes());
        current_offset += entity.data.len() as u64;
    }

    let mut entity_data = Vec::with_capacity(current_offset as usize);
    for entity in entities {
        entity_data.extend_from_slice(&entity.data);
    }
    let payload_sha1 = sha1_smol::Sha1::from(&entity_data).digest().to_string();

    let entity_table_offset = CONTAINER_HEADER_LEN;
    let symtab_offset = entity_table_offset + entity_table.len();
    let format_caps_offset = symtab_offset + symtab_ion.len();

    let int = |n: usize| Value::from(n as i64);
    let mut info = vec![
        (Symbol::new(info_key::CONTAINER_ID), Value::string(container_id)),
        (Symbol::new(info_key::COMPRESSION_TYPE), Value::from(DEFAULT_COMPRESSION_TYPE)),
        (Symbol::new(info_key::DRM_SCHEME), Value::from(DEFAULT_DRM_SCHEME)),
        (Symbol::new(info_key::INDEX_TABLE_OFFSET), int(entity_table_offset)),
        (Symbol::new(info_key::INDEX_TABLE_LENGTH), int(entity_table.len())),
        (Symbol::new(info_key::SYMBOL_TABLE_OFFSET), int(symtab_offset)),
        (Symbol::new(info_key::SYMBOL_TABLE_LENGTH), int(symtab_ion.len())),
        (Symbol::new(info_key::CHUNK_SIZE), Value::from(DEFAULT_CHUNK_SIZE)),
    ];

    let mut container_info_offset = format_caps_offset;
    let write_format_caps = symtab.local_min_id() > FC_MIN_LOCAL_ID;
    if write_format_caps {
        info.push((Symbol::new(info_key::FC_OFFSET), int(format_caps_offset)));
        info.push((Symbol::new(info_key::FC_LENGTH), int(format_caps_ion.len())));
        container_info_offset += format_caps_ion.len();
    }

    let container_info_data = encode_stream(&[Value::Struct(info)], symtab)?;
    let kfxgen_info = generator.render(&payload_sha1, container_id);
    let header_len = container_info_offset + container_info_data.len() + kfxgen_info.len();

    let mut output = Vec::with_capacity(header_len + entity_data.len());

    // Fixed header (18 bytes)
    output.extend_from_slice(CONTAINER_MAGIC);
    output.extend_from_slice(&CONTAINER_VERSION.to_le_bytes());
    output.extend_from_slice(&header_u32(header_len)?.to_le_bytes());
    output.extend_from_slice(&header_u32(container_info_offset)?.to_le_bytes());
    output.extend_from_slice(&header_u32(container_info_data.len())?.to_le_bytes());

    output.extend_from_slice(&entity_table);
    output.extend_from_slice(symtab_ion);
    if write_format_caps {
        output.extend_from_slice(format_caps_ion);
    }
    output.extend_from_slice(&container_info_data);
    output.extend_from_slice(kfxgen_info.as_bytes());
    output.extend_from_slice(&entity_data);

    debug!(
        id = container_id,
        entities = entities.len(),
        header_len,
        size = output.len(),
        "serialized container"
    );
    Ok(output)
}

fn header_u32(n: usize) -> Result<u32> {
    u32::try_from(n)
        .map_err(|_| Error::precondition(format!("container header offset {n} exceeds 32 bits")))
}

/// Create entity data: ENTY header, info value, then the payload.
///
/// Raw media fragments store their bytes directly; everything else is a
/// complete Ion stream.
pub fn serialize_entity(symtab: &mut SymbolTable, fragment: &Fragment) -> Result<Vec<u8>> {
    let info = Value::Struct(vec![
        (Symbol::new(info_key::COMPRESSION_TYPE), Value::from(DEFAULT_COMPRESSION_TYPE)),
        (Symbol::new(info_key::DRM_SCHEME), Value::from(DEFAULT_DRM_SCHEME)),
    ]);
    let header_ion = encode_stream(&[info], symtab)?;

    let payload = if fragment.is_raw() {
        fragment.as_raw().map(<[u8]>::to_vec).ok_or_else(|| {
            Error::precondition(format!(
                "raw fragment {} must hold a blob, found {}",
                fragment.ftype,
                fragment.value.type_name()
            ))
        })?
    } else {
        encode_stream(std::slice::from_ref(&fragment.value), symtab)?
    };

    let header_len = ENTITY_HEADER_LEN + header_ion.len();
    let mut data = Vec::with_capacity(header_len + payload.len());
    data.extend_from_slice(ENTITY_MAGIC);
    data.extend_from_slice(&ENTITY_VERSION.to_le_bytes());
    data.extend_from_slice(&header_u32(header_len)?.to_le_bytes());
    data.extend_from_slice(&header_ion);
    data.extend_from_slice(&payload);
    Ok(data)
}

/// Serialize an annotated Ion value (for $ion_symbol_table and $593).
fn annotated_ion(symtab: &mut SymbolTable, annotation: &str, value: Value) -> Result<Vec<u8>> {
    let annotated = Annotated::new(vec![Symbol::new(annotation)], value)?;
    encode_stream(&[Value::Annotated(annotated)], symtab)
}

/// Container id for a book that has none: `CR!` and 28 characters from
/// `[0-9A-Z]`, derived from the entity payload so that encoding the same
/// fragments twice yields the same id.
pub fn generate_container_id(payload: &[u8]) -> String {
    const CHARS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    let first = sha1_smol::Sha1::from(payload).digest().bytes();
    let second = sha1_smol::Sha1::from(first).digest().bytes();
    let suffix: String = first
        .iter()
        .chain(&second)
        .take(28)
        .map(|&b| char::from(CHARS[usize::from(b) % CHARS.len()]))
        .collect();
    format!("CR!{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kfx::container::{Container, read_u32_le};

    fn kfx_symtab() -> SymbolTable {
        SymbolTable::for_kfx(&mut Diagnostics::new())
    }

    #[test]
    fn test_container_id_format() {
        let id = generate_container_id(b"ENTY payload");
        assert!(id.starts_with("CR!"));
        assert_eq!(id.len(), 31); // CR! + 28 chars

        let suffix = &id[3..];
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()),
            "Container ID should only contain uppercase alphanumeric: {}",
            id
        );
    }

    #[test]
    fn test_container_id_follows_payload() {
        assert_eq!(generate_container_id(b"one"), generate_container_id(b"one"));
        assert_ne!(generate_container_id(b"one"), generate_container_id(b"two"));
    }

    #[test]
    fn test_serialize_entity() {
        let mut symtab = kfx_symtab();
        let fragment = Fragment::singleton("$258", Value::from(5));
        let data = serialize_entity(&mut symtab, &fragment).unwrap();

        assert_eq!(&data[..4], b"ENTY");
        assert_eq!(u16::from_le_bytes([data[4], data[5]]), 1);
        let header_len = read_u32_le(&data, 6).unwrap() as usize;
        assert_eq!(header_len, 10 + 11);
        assert_eq!(&data[header_len..], &[0xe0, 0x01, 0x00, 0xea, 0x21, 0x05]);
    }

    #[test]
    fn test_serialize_raw_entity() {
        let mut symtab = kfx_symtab();
        let raw = vec![0xFF, 0xD8, 0xFF, 0xE0]; // JPEG header
        let data = serialize_entity(&mut symtab, &Fragment::raw("$417", "$417", raw.clone())).unwrap();
        assert_eq!(&data[..4], b"ENTY");
        assert!(data.ends_with(&raw));

        let bad = Fragment::new("$417", "$417", Value::from("not a blob"));
        assert!(matches!(
            serialize_entity(&mut symtab, &bad),
            Err(Error::EncodingPrecondition(_))
        ));
    }

    #[test]
    fn test_serialize_fragments_parses_back() {
        let mut diag = Diagnostics::new();
        let mut symtab = kfx_symtab();
        let fragments: FragmentList = vec![
            Fragment::singleton(
                "$270",
                Value::Struct(vec![
                    (Symbol::new("$409"), Value::from("CR!TEST")),
                    (Symbol::new("$587"), Value::from("app")),
                    (Symbol::new("$588"), Value::from("pkg")),
                ]),
            ),
            Fragment::raw("$417", "$417", b"hello".to_vec()),
        ]
        .into();

        let bytes =
            serialize_fragments(&fragments, &mut symtab, &EncodeOptions::default(), &mut diag)
                .unwrap();
        // No symbol table or entity map fragment.
        assert!(diag.has_errors());

        let mut diag = Diagnostics::new();
        let mut symtab = kfx_symtab();
        let container = Container::parse(&bytes, &mut symtab, &mut diag).unwrap();
        assert!(diag.is_empty(), "{diag:?}");
        assert_eq!(container.info.container_id, "CR!TEST");
        assert_eq!(container.generator.application_version, "app");
        assert_eq!(container.generator.package_version, "pkg");
        assert_eq!(container.entities.len(), 1);
        assert_eq!(container.entities[0].payload().unwrap(), b"hello");
    }

    #[test]
    fn test_undefined_fragment_id_fails() {
        let mut symtab = kfx_symtab();
        let fragments: FragmentList = vec![Fragment::new("$260", "nowhere", Value::Null)].into();
        let result = serialize_fragments(
            &fragments,
            &mut symtab,
            &EncodeOptions::default(),
            &mut Diagnostics::new(),
        );
        assert!(matches!(result, Err(Error::EncodingPrecondition(_))));
    }
}
