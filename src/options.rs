//! Decode and encode options.

/// A documented ceiling for container inputs. Not applied unless set with
/// [`DecodeOptions::with_max_container_size`].
pub const MAX_CONTAINER_SIZE: usize = 16 * 1024 * 1024;

/// Options for [`decode_with`](crate::decode_with).
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Fail with [`Error::UnresolvedSymbols`](crate::Error::UnresolvedSymbols)
    /// when symbol-resolution errors were reported.
    pub strict: bool,
    /// Do not report symbols that could not be resolved.
    pub ignore_undefined_symbols: bool,
    /// Keep every fragment id as stored, even for root fragments whose id
    /// equals their type.
    pub pure: bool,
    /// Reject inputs larger than this many bytes.
    pub max_container_size: Option<usize>,
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_ignore_undefined_symbols(mut self, ignore: bool) -> Self {
        self.ignore_undefined_symbols = ignore;
        self
    }

    pub fn with_pure(mut self, pure: bool) -> Self {
        self.pure = pure;
        self
    }

    pub fn with_max_container_size(mut self, limit: usize) -> Self {
        self.max_container_size = Some(limit);
        self
    }
}

/// Options for [`encode_with`](crate::encode_with).
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    /// Regenerate the local symbol table from the symbols the fragments use,
    /// even when an `$ion_symbol_table` fragment is present.
    pub rebuild_symbols: bool,
    /// kfxgen package version used when the `$270` fragment has none.
    pub package_version: Option<String>,
    /// kfxgen application version used when the `$270` fragment has none.
    pub application_version: Option<String>,
}

impl EncodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rebuild_symbols(mut self, rebuild: bool) -> Self {
        self.rebuild_symbols = rebuild;
        self
    }

    pub fn with_package_version(mut self, version: impl Into<String>) -> Self {
        self.package_version = Some(version.into());
        self
    }

    pub fn with_application_version(mut self, version: impl Into<String>) -> Self {
        self.application_version = Some(version.into());
        self
    }
}
