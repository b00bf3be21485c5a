//! KFX fragment representation.
//!
//! A fragment is the fundamental unit of KFX content: a type symbol, an
//! optional id symbol and one Ion value. Raw media fragments (`$417`, `$418`)
//! carry their bytes as a blob.

use std::collections::BTreeSet;
use std::ops::Index;

use tracing::debug;

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::Result;

use super::symbols::{natural_sort_key, sym};
use super::symtab::SymbolTable;
use super::value::{Annotated, Symbol, Value};

/// Fragment types that describe the container rather than book content.
pub const CONTAINER_FRAGMENT_TYPES: [&str; 4] = [
    sym::ION_SYMBOL_TABLE,
    "$270",
    "$593",
    "$419",
];

/// Fragment types stored as raw bytes instead of Ion.
pub const RAW_FRAGMENT_TYPES: [&str; 2] = ["$417", "$418"];

/// Fragment types that exist once per book. Their id is conventionally the
/// type itself.
pub const ROOT_FRAGMENT_TYPES: [&str; 16] = [
    sym::ION_SYMBOL_TABLE,
    "$270",
    "$490",
    "$389",
    "$419",
    "$585",
    "$538",
    "$262",
    "$265",
    "$264",
    "$395",
    "$550",
    "$258",
    "$593",
    "$611",
    "$621",
];

/// The reserved "no id" symbol.
pub const NULL_ID: &str = "$348";

pub fn is_container_type(ftype: &str) -> bool {
    CONTAINER_FRAGMENT_TYPES.contains(&ftype)
}

pub fn is_raw_type(ftype: &str) -> bool {
    RAW_FRAGMENT_TYPES.contains(&ftype)
}

pub fn is_root_type(ftype: &str) -> bool {
    ROOT_FRAGMENT_TYPES.contains(&ftype)
}

/// A KFX fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Fragment type, e.g. `$260` for a section.
    pub ftype: Symbol,
    /// Fragment id. `None` for singletons.
    pub fid: Option<Symbol>,
    pub value: Value,
}

impl Fragment {
    pub fn new(ftype: impl Into<Symbol>, fid: impl Into<Symbol>, value: Value) -> Self {
        Self {
            ftype: ftype.into(),
            fid: Some(fid.into()),
            value,
        }
    }

    /// A fragment with no id.
    pub fn singleton(ftype: impl Into<Symbol>, value: Value) -> Self {
        Self {
            ftype: ftype.into(),
            fid: None,
            value,
        }
    }

    /// A raw media fragment.
    pub fn raw(ftype: impl Into<Symbol>, fid: impl Into<Symbol>, bytes: Vec<u8>) -> Self {
        Self::new(ftype, fid, Value::Blob(bytes))
    }

    pub fn is_singleton(&self) -> bool {
        self.fid.is_none()
    }

    pub fn is_raw(&self) -> bool {
        is_raw_type(self.ftype.as_str())
    }

    pub fn as_raw(&self) -> Option<&[u8]> {
        self.value.as_blob()
    }

    /// Fragment as an annotated value: `fid::ftype::value`, or `ftype::value`
    /// for singletons.
    pub fn to_annotated(&self) -> Result<Value> {
        let mut annotations = Vec::with_capacity(2);
        if let Some(fid) = &self.fid {
            annotations.push(fid.clone());
        }
        annotations.push(self.ftype.clone());
        Ok(Value::Annotated(Annotated::new(
            annotations,
            self.value.unannotated().clone(),
        )?))
    }

    /// Collect every symbol this fragment references: its type and id, struct
    /// keys, annotations, symbol values, and strings that name a defined
    /// symbol.
    pub fn symbol_references(&self, symtab: &mut SymbolTable, out: &mut BTreeSet<Symbol>) {
        out.insert(self.ftype.clone());
        if let Some(fid) = &self.fid {
            out.insert(fid.clone());
        }
        collect_symbols(&self.value, symtab, out);
    }
}

fn collect_symbols(value: &Value, symtab: &mut SymbolTable, out: &mut BTreeSet<Symbol>) {
    match value {
        Value::Annotated(annotated) => {
            out.extend(annotated.annotations().iter().cloned());
            collect_symbols(annotated.value(), symtab, out);
        }
        Value::List(items) | Value::SExp(items) => {
            for item in items {
                collect_symbols(item, symtab, out);
            }
        }
        Value::Struct(fields) => {
            for (key, field) in fields {
                out.insert(key.clone());
                collect_symbols(field, symtab, out);
            }
        }
        Value::Symbol(symbol) => {
            out.insert(symbol.clone());
        }
        Value::String(s) => {
            let symbol = Symbol::new(s.as_str());
            if symtab.get_id(&symbol, false) != 0 {
                out.insert(symbol);
            }
        }
        _ => {}
    }
}

/// Fragments in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentList {
    fragments: Vec<Fragment>,
}

impl FragmentList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    pub fn insert(&mut self, index: usize, fragment: Fragment) {
        self.fragments.insert(index, fragment);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Fragment> {
        self.fragments.iter()
    }

    /// First fragment of type `ftype`.
    pub fn get(&self, ftype: &str) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.ftype == ftype)
    }

    /// Fragment with the given type and id.
    pub fn get_by_id(&self, ftype: &str, fid: &str) -> Option<&Fragment> {
        self.fragments
            .iter()
            .find(|f| f.ftype == ftype && f.fid.as_ref().is_some_and(|id| id == fid))
    }

    /// All fragments of type `ftype`.
    pub fn of_type<'a>(&'a self, ftype: &'a str) -> impl Iterator<Item = &'a Fragment> + 'a {
        self.fragments.iter().filter(move |f| f.ftype == ftype)
    }

    /// Remove every fragment of type `ftype`, returning how many were removed.
    pub fn remove_type(&mut self, ftype: &str) -> usize {
        let before = self.fragments.len();
        self.fragments.retain(|f| f.ftype != ftype);
        before - self.fragments.len()
    }

    pub fn into_vec(self) -> Vec<Fragment> {
        self.fragments
    }

    /// Close the local symbol table over the symbols the content fragments
    /// actually use.
    ///
    /// Symbols missing from the document's `$ion_symbol_table` and symbols it
    /// lists without using are reported. With `rebuild`, the local symbols
    /// are replaced by the used set in natural order and the
    /// `$ion_symbol_table` fragment is regenerated to match. A list without
    /// that fragment only gains one when it uses local symbols.
    pub fn check_symbol_table(
        &mut self,
        symtab: &mut SymbolTable,
        rebuild: bool,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        let mut used = BTreeSet::new();
        let mut original: BTreeSet<String> = BTreeSet::new();
        for fragment in &self.fragments {
            if !is_container_type(fragment.ftype.as_str()) {
                fragment.symbol_references(symtab, &mut used);
            }
            if fragment.ftype == sym::ION_SYMBOL_TABLE
                && let Some(symbols) = fragment.value.get(sym::SYMBOLS).and_then(Value::as_list)
            {
                original.extend(symbols.iter().filter_map(Value::as_str).map(str::to_string));
            }
        }

        let mut book_symbols: Vec<String> = Vec::new();
        for symbol in &used {
            if symbol.placeholder_id().is_some() || symtab.is_shared_symbol(symbol) {
                continue;
            }
            book_symbols.push(symbol.as_str().to_string());
        }

        let mut missing: Vec<&str> = book_symbols
            .iter()
            .map(String::as_str)
            .filter(|s| !original.contains(*s))
            .collect();
        if rebuild {
            missing.clear();
        }
        if !missing.is_empty() {
            diag.error(
                DiagnosticKind::SymbolResolution,
                format!("symbol table is missing symbols: {}", truncated(&missing, 20)),
            );
        }

        let unused: Vec<&str> = original
            .iter()
            .map(String::as_str)
            .filter(|s| !book_symbols.iter().any(|b| b.as_str() == *s))
            .collect();
        if !unused.is_empty() {
            diag.warn(
                DiagnosticKind::SymbolResolution,
                format!(
                    "symbol table contains {} unused symbols: {}",
                    unused.len(),
                    truncated(&unused, 5)
                ),
            );
        }

        if rebuild {
            let keep_table =
                !book_symbols.is_empty() || self.get(sym::ION_SYMBOL_TABLE).is_some();
            book_symbols.sort_by_cached_key(|s| natural_sort_key(s));
            debug!(count = book_symbols.len(), "rebuilding local symbol table");
            symtab.replace_local_symbols(book_symbols, diag);
            if keep_table {
                self.replace_symbol_table_import(symtab);
            }
        }
        Ok(())
    }

    /// Replace the `$ion_symbol_table` fragment with the table's current import.
    pub fn replace_symbol_table_import(&mut self, symtab: &SymbolTable) {
        let Some(import) = symtab.create_import() else {
            return;
        };
        self.remove_type(sym::ION_SYMBOL_TABLE);
        self.insert(
            0,
            Fragment::singleton(sym::ION_SYMBOL_TABLE, import.unannotated().clone()),
        );
    }
}

fn truncated(items: &[&str], max: usize) -> String {
    let mut shown = items
        .iter()
        .take(max)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    if items.len() > max {
        shown.push_str(&format!(", ... ({} total)", items.len()));
    }
    shown
}

impl Index<usize> for FragmentList {
    type Output = Fragment;

    fn index(&self, index: usize) -> &Fragment {
        &self.fragments[index]
    }
}

impl FromIterator<Fragment> for FragmentList {
    fn from_iter<I: IntoIterator<Item = Fragment>>(iter: I) -> Self {
        Self {
            fragments: iter.into_iter().collect(),
        }
    }
}

impl Extend<Fragment> for FragmentList {
    fn extend<I: IntoIterator<Item = Fragment>>(&mut self, iter: I) {
        self.fragments.extend(iter);
    }
}

impl IntoIterator for FragmentList {
    type Item = Fragment;
    type IntoIter = std::vec::IntoIter<Fragment>;

    fn into_iter(self) -> Self::IntoIter {
        self.fragments.into_iter()
    }
}

impl<'a> IntoIterator for &'a FragmentList {
    type Item = &'a Fragment;
    type IntoIter = std::slice::Iter<'a, Fragment>;

    fn into_iter(self) -> Self::IntoIter {
        self.fragments.iter()
    }
}

impl From<Vec<Fragment>> for FragmentList {
    fn from(fragments: Vec<Fragment>) -> Self {
        Self { fragments }
    }
}
