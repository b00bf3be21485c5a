//! KFX container format parsing.
//!
//! A container is an 18-byte header, a header region holding the entity
//! index table, the document symbol table, the format capabilities, the
//! container-info Ion value and the kfxgen block, followed by the entity
//! data. Entities are borrowed from the input buffer until decoded.

use std::fmt;

use tracing::{debug, warn};

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{Error, Result};

use super::fragment::{Fragment, FragmentList, NULL_ID, is_raw_type, is_root_type};
use super::generator::GeneratorInfo;
use super::ion::{DRMION_MAGIC, IonReader};
use super::symbols::{SYSTEM_SYMBOL_COUNT, sym};
use super::symtab::SymbolTable;
use super::value::{Symbol, Value};

pub const CONTAINER_MAGIC: &[u8; 4] = b"CONT";
pub const ENTITY_MAGIC: &[u8; 4] = b"ENTY";

/// Version written by the encoder.
pub const CONTAINER_VERSION: u16 = 2;
pub const ALLOWED_CONTAINER_VERSIONS: [u16; 2] = [1, 2];
pub const ENTITY_VERSION: u16 = 1;

/// Fixed container header: magic(4) + version(2) + header_len(4) + ci_offset(4) + ci_len(4).
pub const CONTAINER_HEADER_LEN: usize = 18;
/// Fixed entity header: magic(4) + version(2) + header_len(4).
pub const ENTITY_HEADER_LEN: usize = 10;
/// id(4) + type_id(4) + offset(8) + length(8).
pub const INDEX_ENTRY_LEN: usize = 24;

pub const DEFAULT_CHUNK_SIZE: i64 = 4096;
pub const DEFAULT_COMPRESSION_TYPE: i64 = 0;
pub const DEFAULT_DRM_SCHEME: i64 = 0;

/// Container-info keys.
pub(crate) mod info_key {
    pub const CONTAINER_ID: &str = "$409";
    pub const COMPRESSION_TYPE: &str = "$410";
    pub const DRM_SCHEME: &str = "$411";
    pub const CHUNK_SIZE: &str = "$412";
    pub const INDEX_TABLE_OFFSET: &str = "$413";
    pub const INDEX_TABLE_LENGTH: &str = "$414";
    pub const SYMBOL_TABLE_OFFSET: &str = "$415";
    pub const SYMBOL_TABLE_LENGTH: &str = "$416";
    pub const FC_OFFSET: &str = "$594";
    pub const FC_LENGTH: &str = "$595";
}

/// Keys of the synthetic `$270` container fragment.
pub(crate) mod description_key {
    pub const APPLICATION_VERSION: &str = "$587";
    pub const PACKAGE_VERSION: &str = "$588";
    pub const FORMAT: &str = "$161";
    pub const ENTITY_LIST: &str = "$181";
}

// --- Byte reading helpers ---

/// Read a little-endian u16 from a byte slice at the given offset.
#[inline]
pub fn read_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    let bytes = field_bytes::<2>(data, offset)?;
    Ok(u16::from_le_bytes(bytes))
}

/// Read a little-endian u32 from a byte slice at the given offset.
#[inline]
pub fn read_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    let bytes = field_bytes::<4>(data, offset)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Read a little-endian u64 from a byte slice at the given offset.
#[inline]
pub fn read_u64_le(data: &[u8], offset: usize) -> Result<u64> {
    let bytes = field_bytes::<8>(data, offset)?;
    Ok(u64::from_le_bytes(bytes))
}

fn field_bytes<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N]> {
    data.get(offset..offset + N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            Error::malformed(format!(
                "unexpected end of data reading {N} bytes at offset {offset}"
            ))
        })
}

/// Bounds-checked `data[offset..offset + len]`.
fn slice_at<'a>(data: &'a [u8], offset: usize, len: usize, what: &str) -> Result<&'a [u8]> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| {
            Error::malformed(format!(
                "container ({} bytes) is not large enough for {what} end (offset {})",
                data.len(),
                offset.saturating_add(len)
            ))
        })
}

// --- Container header parsing ---

/// KFX container header (first 18 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: u16,
    /// Header length (offset to entity data).
    pub header_len: usize,
    /// Absolute offset of the container-info value.
    pub container_info_offset: usize,
    pub container_info_length: usize,
}

/// Parse and validate the fixed container header.
pub fn parse_container_header(data: &[u8], diag: &mut Diagnostics) -> Result<ContainerHeader> {
    if data.starts_with(DRMION_MAGIC) {
        return Err(Error::DrmProtected);
    }
    if data.len() < CONTAINER_HEADER_LEN {
        return Err(Error::malformed(format!(
            "container is too short ({} bytes)",
            data.len()
        )));
    }

    if &data[0..4] != CONTAINER_MAGIC {
        if let Some(creator) = data.get(60..68)
            && matches!(&creator[4..], b"MOBI" | b"CONT")
        {
            return Err(Error::malformed(format!(
                "found a PDB {} container, not KFX",
                String::from_utf8_lossy(creator)
            )));
        }
        return Err(Error::malformed(format!(
            "container signature is incorrect ({:02x?})",
            &data[0..4]
        )));
    }

    let version = read_u16_le(data, 4)?;
    if !ALLOWED_CONTAINER_VERSIONS.contains(&version) {
        diag.warn(
            DiagnosticKind::SchemaViolation,
            format!("container version is incorrect ({version})"),
        );
    }

    let header_len = read_u32_le(data, 6)? as usize;
    if header_len < CONTAINER_HEADER_LEN {
        return Err(Error::malformed(format!(
            "container header is too short ({header_len})"
        )));
    }

    Ok(ContainerHeader {
        version,
        header_len,
        container_info_offset: read_u32_le(data, 10)? as usize,
        container_info_length: read_u32_le(data, 14)? as usize,
    })
}

// --- Index table parsing ---

/// Location of an entity within the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLoc {
    /// Entity ID (symbol ID).
    pub id: u32,
    /// Entity type ID (symbol ID).
    pub type_id: u32,
    /// Absolute byte offset within the container.
    pub offset: usize,
    /// Length in bytes.
    pub length: usize,
}

/// Parse the entity index table.
///
/// Each entry is 24 bytes: id(4) + type_id(4) + offset(8) + length(8).
/// The `header_len` is added to offsets to get absolute positions, which
/// must fall inside a container of `container_len` bytes.
pub fn parse_index_table(
    data: &[u8],
    header_len: usize,
    container_len: usize,
) -> Result<Vec<EntityLoc>> {
    if data.len() % INDEX_ENTRY_LEN != 0 {
        return Err(Error::malformed(format!(
            "entity index table length {} is not a multiple of {INDEX_ENTRY_LEN}",
            data.len()
        )));
    }

    let mut entities = Vec::with_capacity(data.len() / INDEX_ENTRY_LEN);
    for entry in data.chunks_exact(INDEX_ENTRY_LEN) {
        let offset = usize::try_from(read_u64_le(entry, 8)?)
            .ok()
            .and_then(|o| o.checked_add(header_len));
        let length = usize::try_from(read_u64_le(entry, 16)?).ok();
        let end = offset.zip(length).and_then(|(o, l)| o.checked_add(l));

        let (Some(offset), Some(length), Some(end)) = (offset, length, end) else {
            return Err(Error::malformed("entity index entry overflows"));
        };
        if end > container_len {
            return Err(Error::malformed(format!(
                "container ({container_len} bytes) is not large enough for entity end (offset {end})"
            )));
        }

        entities.push(EntityLoc {
            id: read_u32_le(entry, 0)?,
            type_id: read_u32_le(entry, 4)?,
            offset,
            length,
        });
    }
    Ok(entities)
}

// --- Container classification ---

/// What kind of container this is, judged by the entity types it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerFormat {
    Main,
    Metadata,
    Attachable,
    #[default]
    Unknown,
}

impl ContainerFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerFormat::Main => "KFX main",
            ContainerFormat::Metadata => "KFX metadata",
            ContainerFormat::Attachable => "KFX attachable",
            ContainerFormat::Unknown => "KFX unknown",
        }
    }

    /// Classify by entity type ids and whether document symbols exist.
    pub fn classify(type_ids: impl IntoIterator<Item = u32>, has_doc_symbols: bool) -> Self {
        let mut main = false;
        let mut metadata = has_doc_symbols;
        let mut attachable = false;
        for type_id in type_ids {
            match type_id {
                sym::STORYLINE | sym::SECTION | sym::DOCUMENT_DATA => main = true,
                sym::METADATA
                | sym::CONTAINER_ENTITY_MAP
                | sym::BOOK_METADATA
                | sym::FORMAT_CAPABILITIES_OLD => metadata = true,
                sym::RAW_MEDIA => attachable = true,
                _ => {}
            }
        }
        if main {
            ContainerFormat::Main
        } else if metadata {
            ContainerFormat::Metadata
        } else if attachable {
            ContainerFormat::Attachable
        } else {
            ContainerFormat::Unknown
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Container info ---

/// Parsed container-info fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub container_id: String,
    pub compression_type: i64,
    pub drm_scheme: i64,
    pub chunk_size: i64,
    /// Index table offset and length.
    pub index: Option<(usize, usize)>,
    /// Document symbols offset and length.
    pub doc_symbols: Option<(usize, usize)>,
    /// Format capabilities offset and length.
    pub format_capabilities: Option<(usize, usize)>,
}

impl Default for ContainerInfo {
    fn default() -> Self {
        Self {
            container_id: String::new(),
            compression_type: DEFAULT_COMPRESSION_TYPE,
            drm_scheme: DEFAULT_DRM_SCHEME,
            chunk_size: DEFAULT_CHUNK_SIZE,
            index: None,
            doc_symbols: None,
            format_capabilities: None,
        }
    }
}

fn take_int(fields: &mut Value, key: &str) -> Result<Option<i64>> {
    match fields.remove(key) {
        None => Ok(None),
        Some(value) => value.as_i64().map(Some).ok_or_else(|| {
            Error::malformed(format!(
                "container info {key} is a {}, expected int",
                value.type_name()
            ))
        }),
    }
}

fn take_region(fields: &mut Value, offset_key: &str, length_key: &str) -> Result<Option<(usize, usize)>> {
    let offset = take_int(fields, offset_key)?;
    let length = take_int(fields, length_key)?.unwrap_or(0);
    let Some(offset) = offset else {
        return Ok(None);
    };
    match (usize::try_from(offset), usize::try_from(length)) {
        (Ok(offset), Ok(length)) => Ok(Some((offset, length))),
        _ => Err(Error::malformed(format!(
            "container info region {offset_key}={offset} {length_key}={length} is negative"
        ))),
    }
}

/// Add `delta` to every import's `max_id`.
///
/// Containers count the nine system symbols in import sizes; fragments do not.
pub(crate) fn adjust_import_max_ids(table: &mut Value, delta: i64) {
    let Some(Value::List(imports)) = table.get_mut(sym::IMPORTS) else {
        return;
    };
    for import in imports {
        if let Some(max_id) = import.get_mut(sym::MAX_ID)
            && let Some(n) = max_id.as_i64()
        {
            *max_id = Value::from(n.saturating_add(delta));
        }
    }
}

// --- Entities ---

/// An entity borrowed from the container buffer.
#[derive(Debug, Clone, Copy)]
pub struct Entity<'a> {
    pub id: u32,
    pub type_id: u32,
    /// Complete entity bytes, `ENTY` header included.
    pub data: &'a [u8],
}

impl<'a> Entity<'a> {
    /// The entity payload after its `ENTY` header, without validating the
    /// header's info value.
    pub fn payload(&self) -> Result<&'a [u8]> {
        let header_len = self.header_len()?;
        Ok(&self.data[header_len..])
    }

    fn header_len(&self) -> Result<usize> {
        if self.data.len() < ENTITY_HEADER_LEN {
            return Err(Error::malformed(format!(
                "entity {} is too short ({} bytes)",
                self.id,
                self.data.len()
            )));
        }
        if &self.data[0..4] != ENTITY_MAGIC {
            return Err(Error::malformed(format!(
                "entity {} signature is incorrect ({:02x?})",
                self.id,
                &self.data[0..4]
            )));
        }
        let header_len = read_u32_le(self.data, 6)? as usize;
        if header_len < ENTITY_HEADER_LEN || header_len > self.data.len() {
            return Err(Error::malformed(format!(
                "entity {} header length {header_len} is invalid",
                self.id
            )));
        }
        Ok(header_len)
    }

    /// Decode into a fragment.
    ///
    /// Raw media types become blobs; anything else must be a single Ion
    /// value. With `pure` unset, root fragments whose id equals their type
    /// become singletons.
    pub fn decode(
        &self,
        symtab: &mut SymbolTable,
        diag: &mut Diagnostics,
        pure: bool,
    ) -> Result<Fragment> {
        let header_len = self.header_len()?;

        let version = read_u16_le(self.data, 4)?;
        if version != ENTITY_VERSION {
            diag.warn(
                DiagnosticKind::SchemaViolation,
                format!("entity {} version is incorrect ({version})", self.id),
            );
        }

        let mut info =
            IonReader::new(symtab, diag).read_single(&self.data[ENTITY_HEADER_LEN..header_len])?;
        if !matches!(info, Value::Struct(_)) {
            return Err(Error::malformed(format!(
                "entity {} info is a {}",
                self.id,
                info.type_name()
            )));
        }
        let compression = take_int(&mut info, info_key::COMPRESSION_TYPE)?.unwrap_or(DEFAULT_COMPRESSION_TYPE);
        if compression != DEFAULT_COMPRESSION_TYPE {
            diag.error(
                DiagnosticKind::Unsupported,
                format!("entity {} has unexpected compression type {compression}", self.id),
            );
        }
        let drm = take_int(&mut info, info_key::DRM_SCHEME)?.unwrap_or(DEFAULT_DRM_SCHEME);
        if drm != DEFAULT_DRM_SCHEME {
            diag.error(
                DiagnosticKind::Unsupported,
                format!("entity {} has unexpected DRM scheme {drm}", self.id),
            );
        }
        if info.as_struct().is_some_and(|fields| !fields.is_empty()) {
            return Err(Error::malformed(format!(
                "entity {} info has extra data: {info:?}",
                self.id
            )));
        }

        let payload = &self.data[header_len..];
        let mut fid = symtab.get_symbol(self.id);
        let ftype = symtab.get_symbol(self.type_id);

        let mut value = if is_raw_type(ftype.as_str()) {
            Value::Blob(payload.to_vec())
        } else {
            IonReader::new(symtab, diag).read_single(payload)?
        };

        if let Value::Annotated(annotated) = value {
            if annotated.is_single() && annotated.annotations()[0] == ftype && fid == NULL_ID {
                fid = ftype.clone();
                value = annotated.into_parts().1;
            } else {
                diag.error(
                    DiagnosticKind::SchemaViolation,
                    format!(
                        "entity {fid} ({ftype}) has unexpected annotations {:?}",
                        annotated.annotations()
                    ),
                );
                value = Value::Annotated(annotated);
            }
        }

        if !pure && fid == ftype && is_root_type(ftype.as_str()) {
            fid = Symbol::new(NULL_ID);
        }

        Ok(Fragment {
            ftype,
            fid: if fid == NULL_ID { None } else { Some(fid) },
            value,
        })
    }
}

// --- Container ---

/// A parsed container. Entities still borrow the input buffer.
#[derive(Debug, Clone)]
pub struct Container<'a> {
    pub header: ContainerHeader,
    pub info: ContainerInfo,
    /// `$ion_symbol_table` value with import sizes in fragment form.
    pub doc_symbols: Option<Value>,
    /// `$593` format capabilities value.
    pub format_capabilities: Option<Value>,
    pub generator: GeneratorInfo,
    pub format: ContainerFormat,
    pub entities: Vec<Entity<'a>>,
}

impl<'a> Container<'a> {
    /// Parse the container framing and apply its document symbol table to
    /// `symtab`. Entity payloads are not decoded.
    pub fn parse(data: &'a [u8], symtab: &mut SymbolTable, diag: &mut Diagnostics) -> Result<Self> {
        let header = parse_container_header(data, diag)?;
        debug!(
            version = header.version,
            header_len = header.header_len,
            "parsed container header"
        );

        let info_data = slice_at(
            data,
            header.container_info_offset,
            header.container_info_length,
            "container info",
        )?;
        let mut fields = IonReader::new(symtab, diag).read_single(info_data)?;
        if !matches!(fields, Value::Struct(_)) {
            return Err(Error::malformed(format!(
                "container info is a {}",
                fields.type_name()
            )));
        }

        let mut info = ContainerInfo::default();
        match fields.remove(info_key::CONTAINER_ID) {
            Some(Value::String(id)) => info.container_id = id,
            Some(other) => diag.error(
                DiagnosticKind::SchemaViolation,
                format!("container id is a {}", other.type_name()),
            ),
            None => diag.error(DiagnosticKind::SchemaViolation, "container id is missing"),
        }

        info.compression_type =
            take_int(&mut fields, info_key::COMPRESSION_TYPE)?.unwrap_or(DEFAULT_COMPRESSION_TYPE);
        if info.compression_type != DEFAULT_COMPRESSION_TYPE {
            diag.error(
                DiagnosticKind::Unsupported,
                format!("unexpected bcComprType {}", info.compression_type),
            );
        }
        info.drm_scheme = take_int(&mut fields, info_key::DRM_SCHEME)?.unwrap_or(DEFAULT_DRM_SCHEME);
        if info.drm_scheme != DEFAULT_DRM_SCHEME {
            diag.error(
                DiagnosticKind::Unsupported,
                format!("unexpected bcDRMScheme {}", info.drm_scheme),
            );
        }

        info.doc_symbols = take_region(
            &mut fields,
            info_key::SYMBOL_TABLE_OFFSET,
            info_key::SYMBOL_TABLE_LENGTH,
        )?;
        let mut doc_symbols = None;
        if let Some((offset, length)) = info.doc_symbols
            && length > 0
        {
            let bytes = slice_at(data, offset, length, "document symbols")?;
            let annotated =
                IonReader::new(symtab, diag).read_annotated(bytes, sym::ION_SYMBOL_TABLE)?;
            let mut table = annotated.into_parts().1;
            adjust_import_max_ids(&mut table, -i64::from(SYSTEM_SYMBOL_COUNT));
            symtab.create_symbol_table(&Symbol::new(sym::ION_SYMBOL_TABLE), &table, diag)?;
            doc_symbols = Some(table);
        }

        info.chunk_size = take_int(&mut fields, info_key::CHUNK_SIZE)?.unwrap_or(0);
        if info.chunk_size != DEFAULT_CHUNK_SIZE {
            diag.warn(
                DiagnosticKind::SchemaViolation,
                format!("unexpected bcChunkSize in container info: {}", info.chunk_size),
            );
        }

        let mut format_capabilities = None;
        if header.version > 1 {
            info.format_capabilities =
                take_region(&mut fields, info_key::FC_OFFSET, info_key::FC_LENGTH)?;
            if let Some((offset, length)) = info.format_capabilities
                && length > 0
            {
                let bytes = slice_at(data, offset, length, "format capabilities")?;
                let annotated = IonReader::new(symtab, diag).read_annotated(bytes, "$593")?;
                format_capabilities = Some(annotated.into_parts().1);
            }
        }

        info.index = take_region(
            &mut fields,
            info_key::INDEX_TABLE_OFFSET,
            info_key::INDEX_TABLE_LENGTH,
        )?;
        let mut entities = Vec::new();
        if let Some((offset, length)) = info.index {
            let table = slice_at(data, offset, length, "entity index table")?;
            for loc in parse_index_table(table, header.header_len, data.len())? {
                entities.push(Entity {
                    id: loc.id,
                    type_id: loc.type_id,
                    data: &data[loc.offset..loc.offset + loc.length],
                });
            }
        }

        if fields.as_struct().is_some_and(|f| !f.is_empty()) {
            diag.error(
                DiagnosticKind::SchemaViolation,
                format!("container info has extra data: {fields:?}"),
            );
        }

        let generator = Self::check_generator(data, &header, &info, diag)?;

        let format = ContainerFormat::classify(
            entities.iter().map(|e| e.type_id),
            info.doc_symbols.is_some_and(|(_, len)| len > 0),
        );
        if format == ContainerFormat::Unknown {
            diag.error(
                DiagnosticKind::SchemaViolation,
                format!(
                    "cannot determine KFX format of container with entity types {:?}",
                    entities.iter().map(|e| e.type_id).collect::<Vec<_>>()
                ),
            );
        }

        debug!(
            id = %info.container_id,
            entities = entities.len(),
            %format,
            "parsed container"
        );
        Ok(Container {
            header,
            info,
            doc_symbols,
            format_capabilities,
            generator,
            format,
            entities,
        })
    }

    fn check_generator(
        data: &[u8],
        header: &ContainerHeader,
        info: &ContainerInfo,
        diag: &mut Diagnostics,
    ) -> Result<GeneratorInfo> {
        let start = header
            .container_info_offset
            .saturating_add(header.container_info_length);
        let block = data.get(start..header.header_len).unwrap_or_default();
        let generator = GeneratorInfo::parse(block, diag);

        if let Some(expected) = &generator.payload_sha1 {
            let payload = data.get(header.header_len..).unwrap_or_default();
            let actual = sha1_smol::Sha1::from(payload).digest().to_string();
            if !expected.eq_ignore_ascii_case(&actual) {
                warn!(%expected, %actual, "payload digest mismatch");
                diag.error(
                    DiagnosticKind::SchemaViolation,
                    format!("incorrect kfxgen_payload_sha1: expected {expected}, found {actual}"),
                );
            }
        }
        if let Some(acr) = &generator.acr
            && *acr != info.container_id
        {
            diag.error(
                DiagnosticKind::SchemaViolation,
                format!("unexpected kfxgen_acr {acr}, container id is {}", info.container_id),
            );
        }
        Ok(generator)
    }

    /// The synthetic `$270` fragment value describing this container.
    pub fn description(&self) -> Value {
        let entity_list = self
            .entities
            .iter()
            .map(|e| {
                Value::List(vec![
                    Value::from(i64::from(e.type_id)),
                    Value::from(i64::from(e.id)),
                ])
            })
            .collect();

        Value::Struct(vec![
            (Symbol::new(info_key::CONTAINER_ID), Value::string(self.info.container_id.as_str())),
            (Symbol::new(info_key::CHUNK_SIZE), Value::from(self.info.chunk_size)),
            (Symbol::new(info_key::COMPRESSION_TYPE), Value::from(self.info.compression_type)),
            (Symbol::new(info_key::DRM_SCHEME), Value::from(self.info.drm_scheme)),
            (
                Symbol::new(description_key::APPLICATION_VERSION),
                Value::string(self.generator.application_version.as_str()),
            ),
            (
                Symbol::new(description_key::PACKAGE_VERSION),
                Value::string(self.generator.package_version.as_str()),
            ),
            (Symbol::new(description_key::FORMAT), Value::string(self.format.as_str())),
            (Symbol::new(sym::VERSION), Value::from(i64::from(self.header.version))),
            (Symbol::new(description_key::ENTITY_LIST), Value::List(entity_list)),
        ])
    }

    /// Decode everything into fragments, in order: document symbol table,
    /// container description, format capabilities, then entities.
    pub fn fragments(
        &self,
        symtab: &mut SymbolTable,
        diag: &mut Diagnostics,
        pure: bool,
    ) -> Result<FragmentList> {
        let mut fragments = FragmentList::new();
        if let Some(table) = &self.doc_symbols {
            fragments.push(Fragment::singleton(sym::ION_SYMBOL_TABLE, table.clone()));
        }
        fragments.push(Fragment::singleton("$270", self.description()));
        if let Some(caps) = &self.format_capabilities {
            fragments.push(Fragment::singleton("$593", caps.clone()));
        }
        for entity in &self.entities {
            fragments.push(entity.decode(symtab, diag, pure)?);
        }
        Ok(fragments)
    }
}
