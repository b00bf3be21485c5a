//! Shared symbol tables known to the codec.
//!
//! The catalog is built once per process and never mutated afterwards, so
//! it is safe to share between documents decoded on different threads. Each
//! document still gets its own [`SymbolTable`](super::symtab::SymbolTable).
//!
//! `YJ_symbols` names are not published, so its entries use the `$<id>`
//! form. A symbol's text and its id therefore always agree.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Name of the Ion system symbol table.
pub const SYSTEM_TABLE_NAME: &str = "$ion";

/// Name of the KFX shared symbol table.
pub const YJ_SYMBOLS_NAME: &str = "YJ_symbols";

/// Current version of `YJ_symbols`.
pub const YJ_SYMBOLS_VERSION: u32 = 10;

/// Highest id defined by `YJ_symbols` version 10 (including system symbols).
pub const YJ_SYMBOLS_MAX_ID: u32 = 851;

const SYSTEM_SYMBOLS: [&str; 9] = [
    "$ion",
    "$ion_1_0",
    "$ion_symbol_table",
    "name",
    "version",
    "imports",
    "symbols",
    "max_id",
    "$ion_shared_symbol_table",
];

/// Number of symbols in the system table; local ids start after it.
pub const SYSTEM_SYMBOL_COUNT: u32 = SYSTEM_SYMBOLS.len() as u32;

/// Well-known symbol texts and ids.
pub mod sym {
    // Ion system symbols ($1-$9)
    pub const ION_SYMBOL_TABLE: &str = "$ion_symbol_table";
    pub const ION_SHARED_SYMBOL_TABLE: &str = "$ion_shared_symbol_table";
    pub const NAME: &str = "name";
    pub const VERSION: &str = "version";
    pub const IMPORTS: &str = "imports";
    pub const SYMBOLS: &str = "symbols";
    pub const MAX_ID: &str = "max_id";

    // Fragment types that decide the container format
    pub const METADATA: u32 = 258;
    pub const STORYLINE: u32 = 259;
    pub const SECTION: u32 = 260;
    pub const RAW_MEDIA: u32 = 417;
    pub const CONTAINER_ENTITY_MAP: u32 = 419;
    pub const BOOK_METADATA: u32 = 490;
    pub const DOCUMENT_DATA: u32 = 538;
    pub const FORMAT_CAPABILITIES_OLD: u32 = 585;
}

/// A named, versioned list of symbols.
///
/// `None` entries are slots with no text. A trailing `?` marks a symbol that
/// is defined but not expected to be used.
#[derive(Debug, Clone)]
pub struct SharedSymbolTable {
    pub name: String,
    pub version: u32,
    pub symbols: Vec<Option<String>>,
}

impl SharedSymbolTable {
    pub fn new(name: impl Into<String>, version: u32, symbols: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            version,
            symbols,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Read-only registry of shared tables, keyed by name and version.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: HashMap<(String, u32), SharedSymbolTable>,
    latest: HashMap<String, u32>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table. The highest version per name answers unversioned lookups.
    pub fn add(&mut self, table: SharedSymbolTable) {
        let latest = self.latest.entry(table.name.clone()).or_insert(table.version);
        if table.version > *latest {
            *latest = table.version;
        }
        self.tables
            .insert((table.name.clone(), table.version), table);
    }

    /// Exact version if known, otherwise the latest version of `name`.
    pub fn get(&self, name: &str, version: Option<u32>) -> Option<&SharedSymbolTable> {
        if let Some(v) = version
            && let Some(table) = self.tables.get(&(name.to_string(), v))
        {
            return Some(table);
        }
        let latest = *self.latest.get(name)?;
        self.tables.get(&(name.to_string(), latest))
    }

    /// The process-wide catalog holding `YJ_symbols`.
    pub fn builtin() -> &'static Catalog {
        static BUILTIN: OnceLock<Catalog> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            let mut catalog = Catalog::new();
            catalog.add(yj_symbols());
            catalog
        })
    }
}

/// The Ion system table (`$1`-`$9`).
pub fn system_table() -> &'static SharedSymbolTable {
    static SYSTEM: OnceLock<SharedSymbolTable> = OnceLock::new();
    SYSTEM.get_or_init(|| {
        SharedSymbolTable::new(
            SYSTEM_TABLE_NAME,
            1,
            SYSTEM_SYMBOLS.iter().map(|s| Some(s.to_string())).collect(),
        )
    })
}

fn yj_symbols() -> SharedSymbolTable {
    let symbols = (SYSTEM_SYMBOL_COUNT + 1..=YJ_SYMBOLS_MAX_ID)
        .map(|id| Some(format!("${id}")))
        .collect();
    SharedSymbolTable::new(YJ_SYMBOLS_NAME, YJ_SYMBOLS_VERSION, symbols)
}

/// Sort key that orders embedded numbers by value: case-folded, with every
/// digit run left-padded to eight digits.
pub fn natural_sort_key(s: &str) -> String {
    let lower = s.to_lowercase();
    let mut key = String::with_capacity(lower.len() + 8);
    let mut digits = String::new();

    for c in lower.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        flush_digits(&mut key, &mut digits);
        key.push(c);
    }
    flush_digits(&mut key, &mut digits);
    key
}

fn flush_digits(key: &mut String, digits: &mut String) {
    if !digits.is_empty() {
        for _ in digits.len()..8 {
            key.push('0');
        }
        key.push_str(digits);
        digits.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yj_symbols_range() {
        let table = Catalog::builtin().get(YJ_SYMBOLS_NAME, None).unwrap();
        assert_eq!(table.version, YJ_SYMBOLS_VERSION);
        assert_eq!(table.len(), (YJ_SYMBOLS_MAX_ID - SYSTEM_SYMBOL_COUNT) as usize);
        assert_eq!(table.symbols[0].as_deref(), Some("$10"));
        assert_eq!(table.symbols.last().unwrap().as_deref(), Some("$851"));
    }

    #[test]
    fn test_catalog_versions() {
        let mut catalog = Catalog::new();
        catalog.add(SharedSymbolTable::new("t", 1, vec![Some("a".into())]));
        catalog.add(SharedSymbolTable::new("t", 3, vec![Some("b".into())]));
        catalog.add(SharedSymbolTable::new("t", 2, vec![Some("c".into())]));

        assert_eq!(catalog.get("t", Some(2)).unwrap().version, 2);
        assert_eq!(catalog.get("t", None).unwrap().version, 3);
        assert_eq!(catalog.get("t", Some(9)).unwrap().version, 3);
        assert!(catalog.get("u", None).is_none());
    }

    #[test]
    fn test_system_table() {
        let table = system_table();
        assert_eq!(table.len(), SYSTEM_SYMBOL_COUNT as usize);
        assert_eq!(table.symbols[2].as_deref(), Some(sym::ION_SYMBOL_TABLE));
    }

    #[test]
    fn test_natural_sort_key() {
        let mut names = vec!["c10", "C2", "c1", "b"];
        names.sort_by_key(|s| natural_sort_key(s));
        assert_eq!(names, vec!["b", "c1", "C2", "c10"]);
        assert_eq!(natural_sort_key("x7"), "x00000007");
    }
}
