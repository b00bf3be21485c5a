//! Per-document symbol table.
//!
//! Ids run from 1. The system table occupies `$1`-`$9`, imported shared
//! tables follow in import order, and local symbols start at
//! [`SymbolTable::local_min_id`]. Symbol text maps to the first id that
//! defined it; later duplicates keep their slot but get no mapping.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{Error, Result};

use super::symbols::{Catalog, SharedSymbolTable, YJ_SYMBOLS_NAME, sym, system_table};
use super::value::{Annotated, Symbol, Value};

/// Highest id an import may extend the table to.
///
/// `YJ_symbols` ends at 851. Imports that would pad the table past this
/// are rejected instead of allocating placeholder slots.
pub const MAX_SYMBOL_ID: u32 = 1 << 20;

/// One `imports` entry of a symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableImport {
    pub name: String,
    pub version: u32,
    pub max_id: u32,
}

#[derive(Debug, Clone)]
pub struct SymbolTable {
    catalog: &'static Catalog,
    imports: Vec<TableImport>,
    /// Slot `i` holds id `i + 1`.
    symbols: Vec<Option<String>>,
    id_of_symbol: HashMap<String, u32>,
    symbol_of_id: HashMap<u32, String>,
    unexpected_ids: HashSet<u32>,
    creating_local_symbols: bool,
    local_min_id: u32,

    undefined_ids: BTreeSet<u32>,
    undefined_symbols: BTreeSet<String>,
    unexpected_used_symbols: BTreeSet<String>,
    ignore_undefined: bool,
    reported: bool,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// A table holding only the system symbols.
    pub fn new() -> Self {
        Self::with_catalog(Catalog::builtin())
    }

    pub fn with_catalog(catalog: &'static Catalog) -> Self {
        let mut table = Self {
            catalog,
            imports: Vec::new(),
            symbols: Vec::new(),
            id_of_symbol: HashMap::new(),
            symbol_of_id: HashMap::new(),
            unexpected_ids: HashSet::new(),
            creating_local_symbols: false,
            local_min_id: 1,
            undefined_ids: BTreeSet::new(),
            undefined_symbols: BTreeSet::new(),
            unexpected_used_symbols: BTreeSet::new(),
            ignore_undefined: false,
            reported: false,
        };
        table.clear();
        table
    }

    /// A table with `YJ_symbols` imported, the baseline for KFX documents.
    pub fn for_kfx(diag: &mut Diagnostics) -> Self {
        let mut table = Self::new();
        // Cannot fail: no local symbols exist yet.
        let _ = table.import_shared_table(YJ_SYMBOLS_NAME, None, None, diag);
        table
    }

    /// Suppress the end-of-document report of undefined symbols.
    pub fn set_ignore_undefined(&mut self, ignore: bool) {
        self.ignore_undefined = ignore;
    }

    /// Reset to the system-table-only baseline.
    pub fn clear(&mut self) {
        self.imports.clear();
        self.symbols.clear();
        self.id_of_symbol.clear();
        self.symbol_of_id.clear();
        self.unexpected_ids.clear();
        self.creating_local_symbols = false;

        let mut quiet = Diagnostics::new();
        self.import_symbols(system_table().symbols.iter().cloned(), &mut quiet);
        self.local_min_id = self.symbols.len() as u32 + 1;
    }

    #[inline]
    pub fn local_min_id(&self) -> u32 {
        self.local_min_id
    }

    /// Highest id currently defined.
    #[inline]
    pub fn max_id(&self) -> u32 {
        self.symbols.len() as u32
    }

    pub fn imports(&self) -> &[TableImport] {
        &self.imports
    }

    /// Extend the id space with (a prefix of, or padding beyond) a shared table.
    pub fn import_shared_table(
        &mut self,
        name: &str,
        version: Option<u32>,
        max_id: Option<u32>,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        debug!(name, ?version, ?max_id, "importing shared symbol table");

        if self.creating_local_symbols {
            return Err(Error::malformed(format!(
                "shared symbol table {name} imported after local symbols were created"
            )));
        }

        if name == system_table().name {
            return Ok(());
        }

        let known = self.catalog.get(name, version);
        let synthesized;
        let table: &SharedSymbolTable = match known {
            Some(t) => t,
            None => {
                diag.error(
                    DiagnosticKind::SymbolResolution,
                    format!("imported shared symbol table {name} is unknown"),
                );
                synthesized = SharedSymbolTable::new(name, version.unwrap_or(1), Vec::new());
                &synthesized
            }
        };

        let version = match version {
            None => table.version,
            Some(v) if v != table.version => {
                if max_id.is_none() {
                    diag.error(
                        DiagnosticKind::SymbolResolution,
                        format!(
                            "import version {v} of shared symbol table {name} without max_id, but have version {}",
                            table.version
                        ),
                    );
                } else {
                    diag.warn(
                        DiagnosticKind::SymbolResolution,
                        format!(
                            "import version {v} of shared symbol table {name}, but have version {}",
                            table.version
                        ),
                    );
                }
                v
            }
            Some(v) => v,
        };

        let table_len = table.len() as u32;
        let max_id = max_id.unwrap_or(table_len);
        if u64::from(self.max_id()) + u64::from(max_id) > u64::from(MAX_SYMBOL_ID) {
            return Err(Error::malformed(format!(
                "import symbol table {name} max_id {max_id} exceeds the limit of {MAX_SYMBOL_ID} ids"
            )));
        }

        let imported: Vec<Option<String>> = if max_id <= table_len {
            table.symbols[..max_id as usize].to_vec()
        } else {
            if table_len > 0 {
                diag.warn(
                    DiagnosticKind::SymbolResolution,
                    format!(
                        "import symbol table {name} version {version} max_id {max_id} exceeds known table size {table_len}"
                    ),
                );
            }
            let mut padded = table.symbols.clone();
            padded.resize(max_id as usize, None);
            padded
        };

        self.imports.push(TableImport {
            name: name.to_string(),
            version,
            max_id,
        });
        self.import_symbols(imported, diag);
        self.local_min_id = self.symbols.len() as u32 + 1;
        Ok(())
    }

    fn import_symbols<I>(&mut self, symbols: I, diag: &mut Diagnostics)
    where
        I: IntoIterator<Item = Option<String>>,
    {
        for symbol in symbols {
            self.add_symbol(symbol, diag);
        }
    }

    /// Append one slot, returning its id if it received a fresh mapping.
    fn add_symbol(&mut self, symbol: Option<String>, diag: &mut Diagnostics) -> Option<u32> {
        let Some(mut text) = symbol.filter(|s| !s.is_empty()) else {
            self.symbols.push(None);
            return None;
        };

        let mut expected = true;
        if !self.creating_local_symbols && text.ends_with('?') {
            text.pop();
            expected = false;
        }

        self.symbols.push(Some(text.clone()));
        let slot_id = self.symbols.len() as u32;

        let symbol_id = match self.id_of_symbol.get(&text) {
            Some(&existing) => {
                diag.error(
                    DiagnosticKind::SymbolResolution,
                    format!("symbol {text} already exists with id {existing}"),
                );
                existing
            }
            None => {
                self.id_of_symbol.insert(text.clone(), slot_id);
                self.symbol_of_id.insert(slot_id, text);
                slot_id
            }
        };

        if !expected {
            self.unexpected_ids.insert(symbol_id);
        }
        Some(symbol_id)
    }

    /// Return the symbol for `text`, appending it as a local symbol if new.
    pub fn create_local_symbol(&mut self, text: &str) -> Result<Symbol> {
        if text.is_empty() {
            return Err(Error::invalid("symbol has zero length"));
        }
        self.creating_local_symbols = true;
        if !self.id_of_symbol.contains_key(text) {
            // A fresh text cannot collide, so the sink stays empty.
            let mut quiet = Diagnostics::new();
            self.add_symbol(Some(text.to_string()), &mut quiet);
        }
        Ok(Symbol::new(text))
    }

    /// Resolve an id. Unbound ids come back as `$<id>` and are recorded.
    pub fn get_symbol(&mut self, id: u32) -> Symbol {
        let symbol = match self.symbol_of_id.get(&id) {
            Some(text) => Symbol::new(text.as_str()),
            None => {
                self.undefined_ids.insert(id);
                Symbol::from_id(id)
            }
        };
        if self.unexpected_ids.contains(&id) {
            self.unexpected_used_symbols.insert(symbol.as_str().to_string());
        }
        symbol
    }

    /// Resolve a symbol to its id, or `0` if it is not defined.
    ///
    /// `$<digits>` is taken as a direct id reference. With `used`, misses
    /// are recorded for the end-of-document report.
    pub fn get_id(&mut self, symbol: &Symbol, used: bool) -> u32 {
        let id = if let Some(id) = symbol.placeholder_id() {
            if !self.symbol_of_id.contains_key(&id) {
                self.undefined_ids.insert(id);
            }
            id
        } else {
            match self.id_of_symbol.get(symbol.as_str()) {
                Some(&id) => id,
                None => {
                    if used {
                        self.undefined_symbols.insert(symbol.as_str().to_string());
                    }
                    0
                }
            }
        };

        if used && self.unexpected_ids.contains(&id) {
            self.unexpected_used_symbols.insert(symbol.as_str().to_string());
        }
        id
    }

    /// Id lookup with no side effects.
    pub fn lookup_id(&self, symbol: &Symbol) -> Option<u32> {
        match symbol.placeholder_id() {
            Some(id) => Some(id),
            None => self.id_of_symbol.get(symbol.as_str()).copied(),
        }
    }

    pub fn is_shared_symbol(&mut self, symbol: &Symbol) -> bool {
        let id = self.get_id(symbol, false);
        id > 0 && id < self.local_min_id
    }

    pub fn is_local_symbol(&mut self, symbol: &Symbol) -> bool {
        self.get_id(symbol, false) >= self.local_min_id
    }

    /// Local slots, in id order.
    pub fn local_symbols(&self) -> &[Option<String>] {
        &self.symbols[(self.local_min_id - 1) as usize..]
    }

    fn discard_local_symbols(&mut self) {
        let first = self.local_min_id as usize - 1;
        for (offset, symbol) in self.symbols[first..].iter().enumerate() {
            let id = self.local_min_id + offset as u32;
            if let Some(text) = symbol
                && self.id_of_symbol.get(text) == Some(&id)
            {
                self.id_of_symbol.remove(text);
            }
            self.symbol_of_id.remove(&id);
            self.unexpected_ids.remove(&id);
        }
        self.symbols.truncate(first);
    }

    /// Drop every local symbol and append `new_symbols` in their place.
    pub fn replace_local_symbols<I, S>(&mut self, new_symbols: I, diag: &mut Diagnostics)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.discard_local_symbols();
        self.creating_local_symbols = true;
        self.import_symbols(new_symbols.into_iter().map(|s| Some(s.into())), diag);
    }

    /// Apply a `$ion_symbol_table` (or `$ion_shared_symbol_table`) definition.
    pub fn create_symbol_table(
        &mut self,
        annotation: &Symbol,
        data: &Value,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        if annotation == sym::ION_SHARED_SYMBOL_TABLE {
            diag.error(
                DiagnosticKind::Unsupported,
                "creating shared symbol tables is not implemented",
            );
            return Ok(());
        }

        match data.get(sym::IMPORTS) {
            Some(Value::Symbol(s)) => {
                if s != sym::ION_SYMBOL_TABLE {
                    return Err(Error::malformed(format!("unexpected imports value: {s}")));
                }
            }
            Some(Value::List(imports)) => {
                self.clear();
                for import in imports {
                    let Some(name) = import.get(sym::NAME).and_then(Value::as_str) else {
                        diag.error(
                            DiagnosticKind::SchemaViolation,
                            "symbol table import has no name",
                        );
                        continue;
                    };
                    let version = import
                        .get(sym::VERSION)
                        .and_then(Value::as_i64)
                        .and_then(|v| u32::try_from(v).ok())
                        .filter(|&v| v > 0)
                        .unwrap_or(1);
                    let max_id = import
                        .get(sym::MAX_ID)
                        .and_then(Value::as_i64)
                        .map(|n| {
                            u32::try_from(n).map_err(|_| {
                                Error::malformed(format!(
                                    "import symbol table {name} max_id {n} is invalid"
                                ))
                            })
                        })
                        .transpose()?;
                    self.import_shared_table(name, Some(version), max_id, diag)?;
                }
            }
            Some(other) => {
                return Err(Error::malformed(format!(
                    "symbol table imports is a {}",
                    other.type_name()
                )));
            }
            None => self.clear(),
        }

        self.creating_local_symbols = true;
        if let Some(list) = data.get(sym::SYMBOLS).and_then(Value::as_list) {
            for item in list {
                let text = match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => {
                        diag.error(
                            DiagnosticKind::SchemaViolation,
                            format!("imported symbol is type {}, treating as null", other.type_name()),
                        );
                        None
                    }
                };
                self.add_symbol(text, diag);
            }
        }

        if let Some(expected) = data.get(sym::MAX_ID).and_then(Value::as_i64)
            && expected != i64::from(self.max_id())
        {
            diag.error(
                DiagnosticKind::SymbolResolution,
                format!(
                    "symbol table max_id after import expected {expected}, found {}",
                    self.max_id()
                ),
            );
        }

        debug!(
            max_id = self.max_id(),
            local = self.local_symbols().len(),
            "applied symbol table"
        );
        Ok(())
    }

    /// The current table as `$ion_symbol_table::{max_id, imports, symbols}`.
    pub fn create_import(&self) -> Option<Value> {
        if self.symbols.is_empty() {
            return None;
        }

        let imports = self
            .imports
            .iter()
            .map(|import| {
                Value::Struct(vec![
                    (Symbol::new(sym::NAME), Value::string(import.name.as_str())),
                    (Symbol::new(sym::VERSION), Value::from(i64::from(import.version))),
                    (Symbol::new(sym::MAX_ID), Value::from(i64::from(import.max_id))),
                ])
            })
            .collect();

        let symbols = self
            .local_symbols()
            .iter()
            .map(|s| s.as_ref().map_or(Value::Null, |t| Value::string(t.as_str())))
            .collect();

        let data = Value::Struct(vec![
            (Symbol::new(sym::MAX_ID), Value::from(i64::from(self.max_id()))),
            (Symbol::new(sym::IMPORTS), Value::List(imports)),
            (Symbol::new(sym::SYMBOLS), Value::List(symbols)),
        ]);

        Annotated::new(vec![Symbol::new(sym::ION_SYMBOL_TABLE)], data)
            .ok()
            .map(Value::Annotated)
    }

    /// Undefined ids recorded so far.
    pub fn undefined_ids(&self) -> &BTreeSet<u32> {
        &self.undefined_ids
    }

    /// Undefined symbol texts recorded so far.
    pub fn undefined_symbols(&self) -> &BTreeSet<String> {
        &self.undefined_symbols
    }

    /// Emit the end-of-document summary once.
    pub fn report(&mut self, diag: &mut Diagnostics) {
        if self.reported {
            return;
        }

        if !self.unexpected_used_symbols.is_empty() {
            diag.warn(
                DiagnosticKind::SymbolResolution,
                format!(
                    "unexpected symbols used: {}",
                    join(self.unexpected_used_symbols.iter())
                ),
            );
        }
        if !self.undefined_symbols.is_empty() && !self.ignore_undefined {
            diag.error(
                DiagnosticKind::SymbolResolution,
                format!("undefined symbols found: {}", join(self.undefined_symbols.iter())),
            );
        }
        if !self.undefined_ids.is_empty() {
            diag.error(
                DiagnosticKind::SymbolResolution,
                format!(
                    "undefined symbol ids found: {}",
                    join(self.undefined_ids.iter().map(|id| format!("${id}")))
                ),
            );
        }
        self.reported = true;
    }
}

fn join<I, T>(items: I) -> String
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kfx::symbols::{SYSTEM_SYMBOL_COUNT, YJ_SYMBOLS_MAX_ID, YJ_SYMBOLS_VERSION};

    fn kfx_table() -> (SymbolTable, Diagnostics) {
        let mut diag = Diagnostics::new();
        let table = SymbolTable::for_kfx(&mut diag);
        (table, diag)
    }

    #[test]
    fn test_system_baseline() {
        let mut table = SymbolTable::new();
        assert_eq!(table.local_min_id(), SYSTEM_SYMBOL_COUNT + 1);
        assert_eq!(table.get_symbol(3), sym::ION_SYMBOL_TABLE);
        assert_eq!(table.get_id(&Symbol::new("imports"), true), 6);
    }

    #[test]
    fn test_yj_import() {
        let (mut table, diag) = kfx_table();
        assert!(diag.is_empty());
        assert_eq!(table.local_min_id(), YJ_SYMBOLS_MAX_ID + 1);
        assert_eq!(table.get_symbol(409), "$409");
        assert!(table.is_shared_symbol(&Symbol::new("$409")));
        assert_eq!(
            table.imports(),
            &[TableImport {
                name: YJ_SYMBOLS_NAME.into(),
                version: YJ_SYMBOLS_VERSION,
                max_id: YJ_SYMBOLS_MAX_ID - SYSTEM_SYMBOL_COUNT,
            }]
        );
    }

    #[test]
    fn test_import_truncates_to_max_id() {
        let mut table = SymbolTable::new();
        let mut diag = Diagnostics::new();
        table
            .import_shared_table(YJ_SYMBOLS_NAME, Some(10), Some(5), &mut diag)
            .unwrap();

        assert!(diag.is_empty());
        assert_eq!(table.max_id(), SYSTEM_SYMBOL_COUNT + 5);
        assert_eq!(table.get_symbol(14), "$14");
        assert_eq!(table.local_min_id(), 15);
        // $15 names an id past the import, so it is recorded undefined.
        table.get_symbol(15);
        assert!(table.undefined_ids().contains(&15));
    }

    #[test]
    fn test_import_pads_past_table_length() {
        let mut table = SymbolTable::new();
        let mut diag = Diagnostics::new();
        let extra = 20;
        let len = YJ_SYMBOLS_MAX_ID - SYSTEM_SYMBOL_COUNT;
        table
            .import_shared_table(YJ_SYMBOLS_NAME, None, Some(len + extra), &mut diag)
            .unwrap();

        assert_eq!(diag.len(), 1);
        assert_eq!(table.max_id(), YJ_SYMBOLS_MAX_ID + extra);
        assert_eq!(table.local_min_id(), YJ_SYMBOLS_MAX_ID + extra + 1);
        // Padded slots have no text.
        assert_eq!(
            table.get_symbol(YJ_SYMBOLS_MAX_ID + 1),
            Symbol::from_id(YJ_SYMBOLS_MAX_ID + 1)
        );
        assert!(table.undefined_ids().contains(&(YJ_SYMBOLS_MAX_ID + 1)));
    }

    #[test]
    fn test_import_rejects_oversized_max_id() {
        let mut table = SymbolTable::new();
        let mut diag = Diagnostics::new();
        let result =
            table.import_shared_table(YJ_SYMBOLS_NAME, Some(10), Some(4_000_000_000), &mut diag);
        assert!(matches!(result, Err(Error::MalformedStream(_))));
        assert_eq!(table.max_id(), SYSTEM_SYMBOL_COUNT);
        assert!(table.imports().is_empty());
    }

    #[test]
    fn test_import_max_id_out_of_u32_range() {
        let mut table = SymbolTable::new();
        let mut diag = Diagnostics::new();
        let data = Value::Struct(vec![(
            Symbol::new(sym::IMPORTS),
            Value::List(vec![Value::Struct(vec![
                (Symbol::new(sym::NAME), Value::from(YJ_SYMBOLS_NAME)),
                (Symbol::new(sym::VERSION), Value::from(10)),
                (Symbol::new(sym::MAX_ID), Value::from(1i64 << 40)),
            ])]),
        )]);
        let result =
            table.create_symbol_table(&Symbol::new(sym::ION_SYMBOL_TABLE), &data, &mut diag);
        assert!(matches!(result, Err(Error::MalformedStream(_))));
    }

    #[test]
    fn test_unknown_table_is_synthesized() {
        let mut table = SymbolTable::new();
        let mut diag = Diagnostics::new();
        table
            .import_shared_table("mystery", Some(2), Some(4), &mut diag)
            .unwrap();

        assert!(diag.has_errors());
        assert_eq!(table.local_min_id(), SYSTEM_SYMBOL_COUNT + 5);
        assert_eq!(table.imports()[0].max_id, 4);
    }

    #[test]
    fn test_stale_version_warns() {
        let mut table = SymbolTable::new();
        let mut diag = Diagnostics::new();
        table
            .import_shared_table(YJ_SYMBOLS_NAME, Some(8), Some(100), &mut diag)
            .unwrap();
        assert_eq!(diag.len(), 1);
        assert!(!diag.has_errors());

        let mut table = SymbolTable::new();
        let mut diag = Diagnostics::new();
        table
            .import_shared_table(YJ_SYMBOLS_NAME, Some(8), None, &mut diag)
            .unwrap();
        assert!(diag.has_errors());
    }

    #[test]
    fn test_create_local_symbol_is_idempotent() {
        let (mut table, _) = kfx_table();
        let a = table.create_local_symbol("chapter-1").unwrap();
        let id = table.get_id(&a, true);
        assert_eq!(id, YJ_SYMBOLS_MAX_ID + 1);

        table.create_local_symbol("chapter-1").unwrap();
        assert_eq!(table.max_id(), YJ_SYMBOLS_MAX_ID + 1);
        assert!(table.is_local_symbol(&a));
        assert!(!table.is_shared_symbol(&a));

        assert!(table.create_local_symbol("").is_err());
    }

    #[test]
    fn test_import_after_local_symbols_fails() {
        let (mut table, mut diag) = kfx_table();
        table.create_local_symbol("x").unwrap();
        assert!(
            table
                .import_shared_table(YJ_SYMBOLS_NAME, None, None, &mut diag)
                .is_err()
        );
    }

    #[test]
    fn test_get_id_records_undefined() {
        let (mut table, mut diag) = kfx_table();
        assert_eq!(table.get_id(&Symbol::new("nowhere"), true), 0);
        assert_eq!(table.get_id(&Symbol::new("silent"), false), 0);
        assert_eq!(table.get_id(&Symbol::new("$5000"), true), 5000);

        table.report(&mut diag);
        let messages: Vec<_> = diag.iter().map(|d| d.message.clone()).collect();
        assert!(messages.iter().any(|m| m.contains("nowhere")));
        assert!(!messages.iter().any(|m| m.contains("silent")));
        assert!(messages.iter().any(|m| m.contains("$5000")));

        // Reported once only.
        let count = diag.len();
        table.report(&mut diag);
        assert_eq!(diag.len(), count);
    }

    #[test]
    fn test_ignore_undefined() {
        let (mut table, mut diag) = kfx_table();
        table.set_ignore_undefined(true);
        table.get_id(&Symbol::new("nowhere"), true);
        table.report(&mut diag);
        assert!(diag.is_empty());
    }

    #[test]
    fn test_duplicate_definition_keeps_first_id() {
        let (mut table, mut diag) = kfx_table();
        let data = Value::Struct(vec![
            (Symbol::new(sym::IMPORTS), Value::symbol(sym::ION_SYMBOL_TABLE)),
            (
                Symbol::new(sym::SYMBOLS),
                Value::List(vec![Value::string("dup"), Value::string("dup")]),
            ),
        ]);
        table
            .create_symbol_table(&Symbol::new(sym::ION_SYMBOL_TABLE), &data, &mut diag)
            .unwrap();

        assert_eq!(diag.of_kind(DiagnosticKind::SymbolResolution).count(), 1);
        assert_eq!(table.get_id(&Symbol::new("dup"), true), YJ_SYMBOLS_MAX_ID + 1);
        assert_eq!(table.max_id(), YJ_SYMBOLS_MAX_ID + 2);
    }

    #[test]
    fn test_create_symbol_table_with_imports() {
        let mut table = SymbolTable::new();
        let mut diag = Diagnostics::new();
        let data = Value::Struct(vec![
            (
                Symbol::new(sym::IMPORTS),
                Value::List(vec![Value::Struct(vec![
                    (Symbol::new(sym::NAME), Value::string(YJ_SYMBOLS_NAME)),
                    (Symbol::new(sym::VERSION), Value::from(10)),
                    (Symbol::new(sym::MAX_ID), Value::from(842)),
                ])]),
            ),
            (
                Symbol::new(sym::SYMBOLS),
                Value::List(vec![Value::string("custom_sym")]),
            ),
            (Symbol::new(sym::MAX_ID), Value::from(852)),
        ]);
        table
            .create_symbol_table(&Symbol::new(sym::ION_SYMBOL_TABLE), &data, &mut diag)
            .unwrap();

        assert!(diag.is_empty(), "{:?}", diag);
        assert_eq!(table.get_symbol(852), "custom_sym");
        assert_eq!(table.local_symbols(), &[Some("custom_sym".to_string())]);
    }

    #[test]
    fn test_replace_local_symbols() {
        let (mut table, mut diag) = kfx_table();
        table.create_local_symbol("old").unwrap();
        table.replace_local_symbols(["b", "a"], &mut diag);

        assert_eq!(table.get_id(&Symbol::new("old"), false), 0);
        assert_eq!(table.get_id(&Symbol::new("b"), false), YJ_SYMBOLS_MAX_ID + 1);
        assert_eq!(table.get_id(&Symbol::new("a"), false), YJ_SYMBOLS_MAX_ID + 2);
    }

    #[test]
    fn test_create_import_roundtrip() {
        let (mut table, mut diag) = kfx_table();
        table.create_local_symbol("alpha").unwrap();
        let import = table.create_import().unwrap();
        let annotated = import.as_annotated().unwrap();
        assert!(annotated.has_annotation(sym::ION_SYMBOL_TABLE));

        let mut rebuilt = SymbolTable::new();
        rebuilt
            .create_symbol_table(&annotated.annotations()[0], annotated.value(), &mut diag)
            .unwrap();
        assert!(diag.is_empty(), "{:?}", diag);
        assert_eq!(rebuilt.get_symbol(YJ_SYMBOLS_MAX_ID + 1), "alpha");
    }

    #[test]
    fn test_clear_resets() {
        let (mut table, _) = kfx_table();
        table.create_local_symbol("x").unwrap();
        table.clear();
        assert_eq!(table.max_id(), SYSTEM_SYMBOL_COUNT);
        assert!(table.imports().is_empty());
    }
}
