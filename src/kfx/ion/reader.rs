//! Ion binary reader.

use std::io::Read;

use flate2::read::GzDecoder;
use num_bigint::{BigInt, Sign};
use tracing::{debug, trace};

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{Error, Result};
use crate::kfx::decimal::Decimal;
use crate::kfx::symbols::sym;
use crate::kfx::symtab::SymbolTable;
use crate::kfx::timestamp::Timestamp;
use crate::kfx::value::{Annotated, Symbol, Value};

use super::varint::{decode_sint, decode_uint, decode_vlsint, decode_vluint};
use super::{
    DRMION_MAGIC, GZIP_MAGIC, ION_MAGIC, IonType, NULL_FLAG, SORTED_STRUCT_FLAG, VARIABLE_LEN_FLAG,
};

/// Bounds-checked position in a byte slice.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    #[inline]
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    #[inline]
    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }

    #[inline]
    fn read_u8(&mut self) -> Result<u8> {
        let byte = self
            .peek()
            .ok_or_else(|| Error::malformed("unexpected end of Ion data"))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let available = self.data.len() - self.pos;
        if len > available {
            return Err(Error::malformed(format!(
                "insufficient Ion data (need {len} bytes, have {available})"
            )));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_vluint(&mut self, diag: &mut Diagnostics) -> Result<u64> {
        let (value, len) = decode_vluint(&self.data[self.pos..], diag)?;
        self.pos += len;
        Ok(value)
    }

    fn read_vlsint(&mut self, allow_minus_zero: bool, diag: &mut Diagnostics) -> Result<Option<i64>> {
        let (value, len) = decode_vlsint(&self.data[self.pos..], allow_minus_zero, diag)?;
        self.pos += len;
        Ok(value)
    }
}

/// Decodes Ion binary streams, resolving symbol ids through a [`SymbolTable`].
///
/// Recoverable problems go to the diagnostics sink; only structural damage
/// (bad signature, truncation, unterminated varints) is returned as an error.
pub struct IonReader<'t> {
    symtab: &'t mut SymbolTable,
    diag: &'t mut Diagnostics,
    import_symbols: bool,
}

impl<'t> IonReader<'t> {
    pub fn new(symtab: &'t mut SymbolTable, diag: &'t mut Diagnostics) -> Self {
        Self {
            symtab,
            diag,
            import_symbols: false,
        }
    }

    /// Apply top-level `$ion_symbol_table` values to the symbol table as
    /// they are read.
    pub fn with_symbol_import(mut self, import_symbols: bool) -> Self {
        self.import_symbols = import_symbols;
        self
    }

    /// Read every top-level value of a stream. NOP padding is dropped.
    pub fn read_all(&mut self, data: &[u8]) -> Result<Vec<Value>> {
        if data.starts_with(DRMION_MAGIC) {
            return Err(Error::DrmProtected);
        }
        if data.starts_with(&GZIP_MAGIC) {
            let mut inflated = Vec::new();
            GzDecoder::new(data)
                .read_to_end(&mut inflated)
                .map_err(|e| Error::malformed(format!("gzip Ion stream: {e}")))?;
            debug!(
                compressed = data.len(),
                inflated = inflated.len(),
                "inflated gzip Ion stream"
            );
            return self.read_stream(&inflated);
        }
        self.read_stream(data)
    }

    /// Read a stream that must hold exactly one value.
    pub fn read_single(&mut self, data: &[u8]) -> Result<Value> {
        let mut values = self.read_all(data)?;
        if values.len() != 1 {
            return Err(Error::malformed(format!(
                "expected single Ion value, found {}",
                values.len()
            )));
        }
        Ok(values.remove(0))
    }

    /// Read a single value that must carry `expected` among its annotations.
    pub fn read_annotated(&mut self, data: &[u8], expected: &str) -> Result<Annotated> {
        match self.read_single(data)? {
            Value::Annotated(annotated) if annotated.has_annotation(expected) => Ok(annotated),
            Value::Annotated(annotated) => Err(Error::malformed(format!(
                "expected annotation {expected}, found {:?}",
                annotated.annotations()
            ))),
            other => Err(Error::malformed(format!(
                "expected annotated value, found {}",
                other.type_name()
            ))),
        }
    }

    fn read_stream(&mut self, data: &[u8]) -> Result<Vec<Value>> {
        if !data.starts_with(&ION_MAGIC) {
            return Err(Error::malformed(format!(
                "Ion signature is incorrect ({})",
                hex_prefix(data, 4)
            )));
        }

        let mut cursor = Cursor::new(&data[ION_MAGIC.len()..]);
        let mut values = Vec::new();
        while !cursor.is_empty() {
            if cursor.peek() == Some(ION_MAGIC[0]) {
                let marker = cursor.read_bytes(ION_MAGIC.len())?;
                if marker != ION_MAGIC {
                    return Err(Error::malformed(format!(
                        "embedded Ion signature is incorrect ({})",
                        hex_prefix(marker, 4)
                    )));
                }
                continue;
            }

            let Some(value) = self.read_value(&mut cursor)? else {
                continue;
            };

            if self.import_symbols
                && let Value::Annotated(annotated) = &value
            {
                let first = &annotated.annotations()[0];
                if first == sym::ION_SYMBOL_TABLE || first == sym::ION_SHARED_SYMBOL_TABLE {
                    self.symtab
                        .create_symbol_table(first, annotated.value(), self.diag)?;
                }
            }
            values.push(value);
        }
        Ok(values)
    }

    /// Read one value. `None` means NOP padding was skipped.
    fn read_value(&mut self, cursor: &mut Cursor<'_>) -> Result<Option<Value>> {
        let descriptor = cursor.read_u8()?;
        if descriptor == ION_MAGIC[0] {
            return Err(Error::malformed(
                "unexpected Ion version marker within value",
            ));
        }

        let ion_type = IonType::from_nibble(descriptor >> 4);
        let mut flag = descriptor & 0x0f;
        trace!(descriptor, ?ion_type, flag, "Ion value");

        match ion_type {
            IonType::Null if flag == NULL_FLAG => return Ok(Some(Value::Null)),
            _ if flag == NULL_FLAG => {
                self.diag.error(
                    DiagnosticKind::SchemaViolation,
                    format!("decoded typed null of type {ion_type:?}"),
                );
                return Ok(Some(Value::Null));
            }
            IonType::Bool => {
                if flag > 1 {
                    return Err(Error::malformed(format!("unknown bool flag value {flag}")));
                }
                return Ok(Some(Value::Bool(flag == 1)));
            }
            IonType::Struct if flag == SORTED_STRUCT_FLAG => {
                self.diag
                    .error(DiagnosticKind::Unsupported, "sorted struct encountered");
                flag = VARIABLE_LEN_FLAG;
            }
            _ => {}
        }

        let body = self.read_body(cursor, flag)?;

        let value = match ion_type {
            // Bool never has a body and returned above.
            IonType::Bool => Value::Bool(flag == 1),
            IonType::Null => return Ok(None),
            IonType::PosInt => {
                if body.first() == Some(&0) {
                    self.diag
                        .warn(DiagnosticKind::Notice, "positive int padded with 0x00");
                }
                Value::Int(BigInt::from_biguint(Sign::Plus, decode_uint(body)))
            }
            IonType::NegInt => {
                if body.is_empty() {
                    self.diag
                        .error(DiagnosticKind::SchemaViolation, "negative int has no data");
                } else if body[0] == 0 {
                    self.diag.error(
                        DiagnosticKind::SchemaViolation,
                        format!("negative int data starts with 0x00 ({})", hex_prefix(body, 8)),
                    );
                }
                Value::Int(-BigInt::from_biguint(Sign::Plus, decode_uint(body)))
            }
            IonType::Float => Value::Float(read_float(body)?),
            IonType::Decimal => Value::Decimal(self.read_decimal(body)?),
            IonType::Timestamp => Value::Timestamp(self.read_timestamp(body)?),
            IonType::Symbol => {
                let id = symbol_id(decode_uint_u64(body)?)?;
                Value::Symbol(self.symtab.get_symbol(id))
            }
            IonType::String => Value::String(
                String::from_utf8(body.to_vec())
                    .map_err(|e| Error::malformed(format!("Ion string is not UTF-8: {e}")))?,
            ),
            IonType::Clob => Value::Clob(body.to_vec()),
            IonType::Blob => Value::Blob(body.to_vec()),
            IonType::List => Value::List(self.read_sequence(body)?),
            IonType::Sexp => Value::SExp(self.read_sequence(body)?),
            IonType::Struct => self.read_struct(body)?,
            IonType::Annotation => self.read_annotation(body)?,
            IonType::Reserved => {
                self.diag.error(
                    DiagnosticKind::Unsupported,
                    format!("reserved Ion type code 15 ({} bytes skipped)", body.len()),
                );
                return Ok(None);
            }
        };
        Ok(Some(value))
    }

    fn read_body<'a>(&mut self, cursor: &mut Cursor<'a>, flag: u8) -> Result<&'a [u8]> {
        let len = if flag == VARIABLE_LEN_FLAG {
            let len = cursor.read_vluint(self.diag)?;
            usize::try_from(len)
                .map_err(|_| Error::malformed(format!("Ion length {len} exceeds address space")))?
        } else {
            usize::from(flag)
        };
        cursor.read_bytes(len)
    }

    fn read_sequence(&mut self, body: &[u8]) -> Result<Vec<Value>> {
        let mut cursor = Cursor::new(body);
        let mut items = Vec::new();
        while !cursor.is_empty() {
            if let Some(value) = self.read_value(&mut cursor)? {
                items.push(value);
            }
        }
        Ok(items)
    }

    fn read_struct(&mut self, body: &[u8]) -> Result<Value> {
        let mut cursor = Cursor::new(body);
        let mut fields: Vec<(Symbol, Value)> = Vec::new();
        while !cursor.is_empty() {
            let id = symbol_id(cursor.read_vluint(self.diag)?)?;
            let key = self.symtab.get_symbol(id);
            let Some(value) = self.read_value(&mut cursor)? else {
                continue;
            };

            match fields.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => {
                    self.diag.error(
                        DiagnosticKind::SchemaViolation,
                        format!("duplicate struct field name {key}"),
                    );
                    *existing = value;
                }
                None => fields.push((key, value)),
            }
        }
        Ok(Value::Struct(fields))
    }

    fn read_annotation(&mut self, body: &[u8]) -> Result<Value> {
        let mut cursor = Cursor::new(body);
        let annotation_len = cursor.read_vluint(self.diag)?;
        let annotation_len = usize::try_from(annotation_len)
            .map_err(|_| Error::malformed("annotation length exceeds address space"))?;
        let annotation_data = cursor.read_bytes(annotation_len)?;

        let Some(inner) = self.read_value(&mut cursor)? else {
            return Err(Error::malformed("annotation wraps NOP padding"));
        };
        if !cursor.is_empty() {
            return Err(Error::malformed(format!(
                "annotation has excess data ({})",
                hex_prefix(cursor.rest(), 16)
            )));
        }

        let mut ids = Cursor::new(annotation_data);
        let mut annotations = Vec::new();
        while !ids.is_empty() {
            let id = symbol_id(ids.read_vluint(self.diag)?)?;
            annotations.push(self.symtab.get_symbol(id));
        }

        if annotations.is_empty() {
            self.diag.error(
                DiagnosticKind::SchemaViolation,
                "annotation wrapper has no annotations",
            );
            return Ok(inner);
        }
        if annotations.len() != 1 {
            self.diag.warn(
                DiagnosticKind::SchemaViolation,
                format!("value has {} annotations", annotations.len()),
            );
        }

        let inner = match inner {
            Value::Annotated(nested) => {
                self.diag.error(
                    DiagnosticKind::SchemaViolation,
                    "annotated value nested inside annotation",
                );
                let (more, value) = nested.into_parts();
                annotations.extend(more);
                value
            }
            other => other,
        };
        Ok(Value::Annotated(Annotated::new(annotations, inner)?))
    }

    fn read_decimal(&mut self, body: &[u8]) -> Result<Decimal> {
        if body.is_empty() {
            return Ok(Decimal::zero());
        }
        let mut cursor = Cursor::new(body);
        let exponent = cursor.read_vlsint(false, self.diag)?.unwrap_or(0);
        let exponent = i32::try_from(exponent)
            .map_err(|_| Error::malformed(format!("decimal exponent {exponent} out of range")))?;
        Ok(Decimal::new(decode_sint(cursor.rest()), exponent))
    }

    fn read_timestamp(&mut self, body: &[u8]) -> Result<Timestamp> {
        let mut cursor = Cursor::new(body);
        let offset = cursor.read_vlsint(true, self.diag)?;
        let year = cursor.read_vluint(self.diag)?;
        let year = u32::try_from(year)
            .map_err(|_| Error::malformed(format!("timestamp year {year} out of range")))?;

        let mut fields = [None; 5];
        for slot in fields.iter_mut() {
            if cursor.is_empty() {
                break;
            }
            let value = cursor.read_vluint(self.diag)?;
            *slot = Some(
                u8::try_from(value)
                    .map_err(|_| Error::malformed(format!("timestamp field {value} out of range")))?,
            );
        }
        let [month, day, hour, minute, second] = fields;

        let mut ts = Timestamp::new(year);
        if let Some(month) = month {
            self.check_range("month", month, 1, 12);
            ts = ts.month(month);
        }
        if let Some(day) = day {
            self.check_range("day", day, 1, 31);
            ts = ts.day(day);
        }
        if let Some(hour) = hour {
            let Some(minute) = minute else {
                return Err(Error::malformed("timestamp has hour without minute"));
            };
            self.check_range("hour", hour, 0, 23);
            self.check_range("minute", minute, 0, 59);
            ts = ts.time(hour, minute);
        }
        if let Some(second) = second {
            self.check_range("second", second, 0, 59);
            ts = ts.second(second);
        }

        if !cursor.is_empty() {
            let exponent = cursor.read_vlsint(false, self.diag)?.unwrap_or(0);
            let coefficient = decode_sint(cursor.rest());
            let has_fraction = !(coefficient == BigInt::from(0) && exponent > -1);
            if has_fraction {
                match i32::try_from(exponent) {
                    Ok(exponent) => {
                        let fraction = Decimal::new(coefficient, exponent);
                        if fraction.is_unit_fraction() {
                            ts = ts.fraction(fraction);
                        } else {
                            self.diag.error(
                                DiagnosticKind::SchemaViolation,
                                format!("timestamp fraction {fraction} is outside [0, 1)"),
                            );
                        }
                    }
                    Err(_) => self.diag.error(
                        DiagnosticKind::SchemaViolation,
                        format!("timestamp fraction exponent {exponent} out of range"),
                    ),
                }
            }
        }

        let offset = match offset.map(i32::try_from) {
            Some(Ok(minutes)) => Some(minutes),
            Some(Err(_)) => {
                self.diag.error(
                    DiagnosticKind::SchemaViolation,
                    format!("timestamp offset {} out of range", offset.unwrap_or_default()),
                );
                None
            }
            None => None,
        };
        Ok(ts.offset(offset))
    }

    fn check_range(&mut self, field: &str, value: u8, min: u8, max: u8) {
        if !(min..=max).contains(&value) {
            self.diag.error(
                DiagnosticKind::SchemaViolation,
                format!("timestamp {field} {value} out of range"),
            );
        }
    }
}

fn read_float(body: &[u8]) -> Result<f64> {
    match body.len() {
        0 => Ok(0.0),
        4 => {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(body);
            Ok(f64::from(f32::from_be_bytes(bytes)))
        }
        8 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(body);
            Ok(f64::from_be_bytes(bytes))
        }
        n => Err(Error::malformed(format!("invalid float length {n}"))),
    }
}

fn decode_uint_u64(body: &[u8]) -> Result<u64> {
    let significant = body.iter().position(|&b| b != 0).map_or(&[][..], |i| &body[i..]);
    if significant.len() > 8 {
        return Err(Error::malformed("symbol id too large"));
    }
    Ok(significant
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

fn symbol_id(id: u64) -> Result<u32> {
    u32::try_from(id).map_err(|_| Error::malformed(format!("symbol id {id} too large")))
}

fn hex_prefix(data: &[u8], max: usize) -> String {
    data.iter()
        .take(max)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
