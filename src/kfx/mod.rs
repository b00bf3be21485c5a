//! KFX (KF10) container and Ion codec.
//!
//! KFX is Amazon's latest Kindle format, successor to KF8/AZW3.
//! It uses Amazon's Ion binary format for structured data.
//!
//! ## Module structure
//!
//! - `value` - Ion value model, with `decimal` and `timestamp`
//! - `symbols` - shared symbol tables (`YJ_symbols`) and the catalog
//! - `symtab` - per-document symbol table
//! - `ion` - Ion binary reader and writer
//! - `fragment` - KFX fragment representation
//! - `container` - `CONT`/`ENTY` framing (parse)
//! - `serialization` - `CONT`/`ENTY` framing (write)
//! - `generator` - kfxgen generator-info block

pub mod container;
pub mod decimal;
pub mod fragment;
pub mod generator;
pub mod ion;
pub mod serialization;
pub mod symbols;
pub mod symtab;
pub mod timestamp;
pub mod value;
