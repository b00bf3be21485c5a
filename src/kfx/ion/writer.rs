//! Ion binary writer.

use num_bigint::{BigUint, Sign};
use num_traits::Zero;

use crate::error::{Error, Result};
use crate::kfx::symtab::SymbolTable;
use crate::kfx::timestamp::Timestamp;
use crate::kfx::value::{Symbol, Value};

use super::varint::{encode_sint, encode_uint, encode_vlsint, encode_vluint};
use super::{ION_MAGIC, IonType, NULL_FLAG, VARIABLE_LEN_FLAG};

/// Encodes values to Ion binary, translating symbols to ids through a
/// [`SymbolTable`].
///
/// Every symbol written must already be defined in the table; an undefined
/// symbol is a caller error and fails the write.
pub struct IonWriter<'t> {
    symtab: &'t mut SymbolTable,
    buf: Vec<u8>,
}

impl<'t> IonWriter<'t> {
    pub fn new(symtab: &'t mut SymbolTable) -> Self {
        Self {
            symtab,
            buf: Vec::new(),
        }
    }

    pub fn write_bvm(&mut self) {
        self.buf.extend_from_slice(&ION_MAGIC);
    }

    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        let mut out = std::mem::take(&mut self.buf);
        let result = self.encode_value(value, &mut out);
        self.buf = out;
        result
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn encode_value(&mut self, value: &Value, out: &mut Vec<u8>) -> Result<()> {
        match value {
            Value::Null => out.push(IonType::Null.descriptor(NULL_FLAG)),
            Value::Bool(b) => out.push(IonType::Bool.descriptor(u8::from(*b))),
            Value::Int(n) => {
                let ion_type = if n.sign() == Sign::Minus {
                    IonType::NegInt
                } else {
                    IonType::PosInt
                };
                let mut body = Vec::new();
                encode_uint(n.magnitude(), &mut body);
                push_typed(out, ion_type, &body);
            }
            Value::Float(f) => {
                // Only +0.0 gets the empty encoding; -0.0 keeps its sign bit.
                if f.to_bits() == 0 {
                    push_typed(out, IonType::Float, &[]);
                } else {
                    push_typed(out, IonType::Float, &f.to_be_bytes());
                }
            }
            Value::Decimal(d) => {
                let mut body = Vec::new();
                if !(d.is_zero() && d.exponent() == 0) {
                    encode_vlsint(Some(i64::from(d.exponent())), &mut body);
                    encode_sint(d.coefficient(), &mut body);
                }
                push_typed(out, IonType::Decimal, &body);
            }
            Value::Timestamp(ts) => {
                let body = encode_timestamp(ts)?;
                push_typed(out, IonType::Timestamp, &body);
            }
            Value::Symbol(symbol) => {
                let id = self.symbol_id(symbol)?;
                let mut body = Vec::new();
                encode_uint(&BigUint::from(id), &mut body);
                push_typed(out, IonType::Symbol, &body);
            }
            Value::String(s) => push_typed(out, IonType::String, s.as_bytes()),
            Value::Clob(bytes) => push_typed(out, IonType::Clob, bytes),
            Value::Blob(bytes) => push_typed(out, IonType::Blob, bytes),
            Value::List(items) | Value::SExp(items) => {
                let mut body = Vec::new();
                for item in items {
                    self.encode_value(item, &mut body)?;
                }
                let ion_type = if matches!(value, Value::List(_)) {
                    IonType::List
                } else {
                    IonType::Sexp
                };
                push_typed(out, ion_type, &body);
            }
            Value::Struct(fields) => {
                let mut body = Vec::new();
                for (key, field) in fields {
                    let id = self.symbol_id(key)?;
                    encode_vluint(u64::from(id), &mut body);
                    self.encode_value(field, &mut body)?;
                }
                push_typed(out, IonType::Struct, &body);
            }
            Value::Annotated(annotated) => {
                let mut ids = Vec::new();
                for annotation in annotated.annotations() {
                    let id = self.symbol_id(annotation)?;
                    encode_vluint(u64::from(id), &mut ids);
                }
                let mut body = Vec::new();
                encode_vluint(ids.len() as u64, &mut body);
                body.extend_from_slice(&ids);
                self.encode_value(annotated.value(), &mut body)?;
                push_typed(out, IonType::Annotation, &body);
            }
        }
        Ok(())
    }

    fn symbol_id(&mut self, symbol: &Symbol) -> Result<u32> {
        match self.symtab.get_id(symbol, true) {
            0 => Err(Error::precondition(format!(
                "attempt to serialize undefined symbol {symbol}"
            ))),
            id => Ok(id),
        }
    }
}

/// Descriptor (with inline or VLUInt length) followed by the body.
fn push_typed(out: &mut Vec<u8>, ion_type: IonType, body: &[u8]) {
    let len = body.len();
    if len < usize::from(VARIABLE_LEN_FLAG) {
        out.push(ion_type.descriptor(len as u8));
    } else {
        out.push(ion_type.descriptor(VARIABLE_LEN_FLAG));
        encode_vluint(len as u64, out);
    }
    out.extend_from_slice(body);
}

fn encode_timestamp(ts: &Timestamp) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    encode_vlsint(ts.offset_minutes().map(i64::from), &mut body);
    encode_vluint(u64::from(ts.year_value()), &mut body);

    let fields = [
        ts.month_value(),
        ts.day_value(),
        ts.hour_value(),
        ts.minute_value(),
        ts.second_value(),
    ];
    for field in fields.into_iter().flatten() {
        encode_vluint(u64::from(field), &mut body);
    }

    if let Some(fraction) = ts.fraction_value() {
        if !fraction.is_unit_fraction() {
            return Err(Error::precondition(format!(
                "timestamp fraction {fraction} is outside [0, 1)"
            )));
        }
        // A zero fraction needs fractional digits to be told apart from none.
        if !(fraction.is_zero() && fraction.exponent() >= 0) {
            encode_vlsint(Some(i64::from(fraction.exponent())), &mut body);
            if !fraction.coefficient().is_zero() {
                encode_sint(fraction.coefficient(), &mut body);
            }
        }
    }
    Ok(body)
}
