//! # kfx-codec
//!
//! Lossless decoder and encoder for KFX containers (`CONT`) and the Ion
//! binary values inside them.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kfx_codec::{read_kfx, write_kfx};
//!
//! let decoded = read_kfx("book.kfx").unwrap();
//! for diagnostic in decoded.diagnostics.iter() {
//!     eprintln!("{diagnostic}");
//! }
//! write_kfx("copy.kfx", &decoded.fragments).unwrap();
//! ```
//!
//! ## Working with fragments
//!
//! A container decodes to an ordered [`FragmentList`]. Each [`Fragment`] has
//! a type symbol, an optional id and one [`Value`]:
//!
//! ```
//! use kfx_codec::{Fragment, FragmentList, Value, decode, encode};
//!
//! let mut fragments = FragmentList::new();
//! fragments.push(Fragment::raw("$417", "cover.jpg", vec![0xff, 0xd8]));
//!
//! let bytes = encode(&fragments).unwrap();
//! let decoded = decode(&bytes).unwrap();
//! let cover = decoded.get_by_id("$417", "cover.jpg").unwrap();
//! assert_eq!(cover.as_raw(), Some([0xff, 0xd8].as_slice()));
//! ```
//!
//! Recoverable problems never abort a decode. They are collected as
//! [`Diagnostics`]; use [`decode_with`] to see them.

pub mod diagnostics;
pub mod error;
pub mod kfx;
pub mod options;

use std::path::Path;

use tracing::{debug, info};

pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use error::{Error, Result};
pub use kfx::container::{Container, ContainerFormat, ContainerHeader};
pub use kfx::decimal::Decimal;
pub use kfx::fragment::{Fragment, FragmentList};
pub use kfx::symtab::SymbolTable;
pub use kfx::timestamp::{Timestamp, TimestampPrecision};
pub use kfx::value::{Annotated, Symbol, Value};
pub use options::{DecodeOptions, EncodeOptions, MAX_CONTAINER_SIZE};

use kfx::symbols::sym;

/// Result of [`decode_with`].
#[derive(Debug, Clone)]
pub struct Decoded {
    pub fragments: FragmentList,
    pub diagnostics: Diagnostics,
    /// Symbol table as it stood after the last entity was decoded.
    pub symbols: SymbolTable,
    pub header: ContainerHeader,
    pub container_id: String,
    pub format: ContainerFormat,
}

/// Result of [`encode_with`].
#[derive(Debug, Clone)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub diagnostics: Diagnostics,
}

/// Decode a container into its fragments, discarding diagnostics.
pub fn decode(data: &[u8]) -> Result<FragmentList> {
    decode_with(data, &DecodeOptions::default()).map(|d| d.fragments)
}

/// Decode a container into its fragments.
///
/// Fragments come out in container order: the document symbol table, the
/// synthetic `$270` container description, format capabilities, then one
/// fragment per entity.
pub fn decode_with(data: &[u8], options: &DecodeOptions) -> Result<Decoded> {
    if let Some(limit) = options.max_container_size
        && data.len() > limit
    {
        return Err(Error::TooLarge {
            size: data.len(),
            limit,
        });
    }

    let mut diagnostics = Diagnostics::new();
    let mut symbols = SymbolTable::for_kfx(&mut diagnostics);
    symbols.set_ignore_undefined(options.ignore_undefined_symbols);

    let container = Container::parse(data, &mut symbols, &mut diagnostics)?;
    let fragments = container.fragments(&mut symbols, &mut diagnostics, options.pure)?;
    symbols.report(&mut diagnostics);

    if options.strict {
        let unresolved: Vec<&Diagnostic> = diagnostics
            .of_kind(DiagnosticKind::SymbolResolution)
            .filter(|d| d.severity == Severity::Error)
            .collect();
        if let Some(first) = unresolved.first() {
            return Err(Error::UnresolvedSymbols {
                count: unresolved.len(),
                summary: first.message.clone(),
            });
        }
    }

    info!(
        id = %container.info.container_id,
        fragments = fragments.len(),
        diagnostics = diagnostics.len(),
        "decoded {}",
        container.format
    );
    Ok(Decoded {
        fragments,
        diagnostics,
        symbols,
        header: container.header,
        container_id: container.info.container_id,
        format: container.format,
    })
}

/// Encode fragments as a container, discarding diagnostics.
pub fn encode(fragments: &FragmentList) -> Result<Vec<u8>> {
    encode_with(fragments, &EncodeOptions::default()).map(|e| e.bytes)
}

/// Encode fragments as a container.
///
/// An `$ion_symbol_table` fragment, if present, defines the local symbols;
/// otherwise (or with [`EncodeOptions::rebuild_symbols`]) the table is
/// rebuilt from the symbols the fragments use. Missing container fragments
/// are filled in and reported.
pub fn encode_with(fragments: &FragmentList, options: &EncodeOptions) -> Result<Encoded> {
    let mut diagnostics = Diagnostics::new();
    let mut symbols = SymbolTable::for_kfx(&mut diagnostics);
    let mut fragments = fragments.clone();

    let rebuild = match fragments.get(sym::ION_SYMBOL_TABLE) {
        Some(table) if !options.rebuild_symbols => {
            symbols.create_symbol_table(
                &Symbol::new(sym::ION_SYMBOL_TABLE),
                table.value.unannotated(),
                &mut diagnostics,
            )?;
            false
        }
        _ => true,
    };
    debug!(rebuild, "preparing symbol table for encode");
    fragments.check_symbol_table(&mut symbols, rebuild, &mut diagnostics)?;

    let bytes =
        kfx::serialization::serialize_fragments(&fragments, &mut symbols, options, &mut diagnostics)?;
    Ok(Encoded { bytes, diagnostics })
}

/// Read and decode a KFX container file.
pub fn read_kfx<P: AsRef<Path>>(path: P) -> Result<Decoded> {
    let data = std::fs::read(path)?;
    decode_with(&data, &DecodeOptions::default())
}

/// Encode fragments and write them to a file.
pub fn write_kfx<P: AsRef<Path>>(path: P, fragments: &FragmentList) -> Result<Diagnostics> {
    let encoded = encode_with(fragments, &EncodeOptions::default())?;
    std::fs::write(path, &encoded.bytes)?;
    Ok(encoded.diagnostics)
}
