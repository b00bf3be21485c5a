//! Amazon Ion binary format.
//!
//! Ion is the serialization format inside every KFX entity. Values are
//! self-describing: a one-byte descriptor carries the type in the high nibble
//! and a length (or flag) in the low nibble.
//!
//! Reference: <https://amazon-ion.github.io/ion-docs/docs/binary.html>

mod reader;
pub mod varint;
mod writer;

pub use reader::IonReader;
pub use writer::IonWriter;

use crate::diagnostics::Diagnostics;
use crate::error::Result;

use super::symtab::SymbolTable;
use super::value::Value;

/// Ion binary version marker (BVM) for Ion 1.0.
pub const ION_MAGIC: [u8; 4] = [0xe0, 0x01, 0x00, 0xea];

/// Streams starting with this are gzip-compressed Ion.
pub const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Streams starting with this are DRM-wrapped.
pub const DRMION_MAGIC: &[u8; 8] = b"\xeaDRMION\xee";

/// Low-nibble flags with special meaning.
pub(crate) const SORTED_STRUCT_FLAG: u8 = 1;
pub(crate) const VARIABLE_LEN_FLAG: u8 = 14;
pub(crate) const NULL_FLAG: u8 = 15;

/// Ion type codes (descriptor high nibble).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum IonType {
    Null = 0,
    Bool = 1,
    PosInt = 2,
    NegInt = 3,
    Float = 4,
    Decimal = 5,
    Timestamp = 6,
    Symbol = 7,
    String = 8,
    Clob = 9,
    Blob = 10,
    List = 11,
    Sexp = 12,
    Struct = 13,
    Annotation = 14,
    Reserved = 15,
}

impl IonType {
    pub(crate) fn from_nibble(n: u8) -> Self {
        match n & 0x0f {
            0 => IonType::Null,
            1 => IonType::Bool,
            2 => IonType::PosInt,
            3 => IonType::NegInt,
            4 => IonType::Float,
            5 => IonType::Decimal,
            6 => IonType::Timestamp,
            7 => IonType::Symbol,
            8 => IonType::String,
            9 => IonType::Clob,
            10 => IonType::Blob,
            11 => IonType::List,
            12 => IonType::Sexp,
            13 => IonType::Struct,
            14 => IonType::Annotation,
            _ => IonType::Reserved,
        }
    }

    #[inline]
    pub(crate) fn descriptor(self, flag: u8) -> u8 {
        ((self as u8) << 4) | (flag & 0x0f)
    }
}

/// Decode a whole Ion stream into its top-level values.
///
/// Symbol-table definitions in the stream are applied to `symtab` as they
/// are met, so later values resolve against them.
pub fn decode_stream(
    data: &[u8],
    symtab: &mut SymbolTable,
    diag: &mut Diagnostics,
) -> Result<Vec<Value>> {
    IonReader::new(symtab, diag)
        .with_symbol_import(true)
        .read_all(data)
}

/// Encode values as one Ion stream, BVM first.
pub fn encode_stream(values: &[Value], symtab: &mut SymbolTable) -> Result<Vec<u8>> {
    let mut writer = IonWriter::new(symtab);
    writer.write_bvm();
    for value in values {
        writer.write_value(value)?;
    }
    Ok(writer.into_bytes())
}
