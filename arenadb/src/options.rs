//! Builder for opening a [`crate::Database`], mirroring the standard
//! library's own `OpenOptions` idiom (`std::fs::OpenOptions`,
//! `memmap2::MmapOptions`).

/// Default arena size selected when `initial_size` is left at `0`: 2 GiB.
pub const DEFAULT_INITIAL_SIZE: u64 = 1 << 31;

/// Options controlling how a database file is opened or created.
///
/// ```
/// use arenadb::OpenOptions;
///
/// let options = OpenOptions::new().initial_size(1 << 20);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    pub(crate) initial_size: u64,
    pub(crate) read_only: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            initial_size: 0,
            read_only: false,
        }
    }
}

impl OpenOptions {
    /// Start from the defaults: `initial_size` unset (selects
    /// [`DEFAULT_INITIAL_SIZE`] when a new file is created), not read-only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Size, in bytes, of the arena to create if the file does not already
    /// exist or is empty. `0` (the default) selects [`DEFAULT_INITIAL_SIZE`].
    /// Ignored when reopening an existing, non-empty database: its length
    /// on disk is authoritative.
    #[must_use]
    pub const fn initial_size(mut self, bytes: u64) -> Self {
        self.initial_size = bytes;
        self
    }

    /// Open an existing database without allowing mutation. The file is
    /// still mapped read-write internally (the allocator's bootstrap-free
    /// discipline assumes a writable arena), but every mutating
    /// [`crate::Database`] method refuses to run against a handle opened
    /// with this set. Has no effect on a new file — creation always
    /// requires write access.
    #[must_use]
    pub const fn read_only(mut self, yes: bool) -> Self {
        self.read_only = yes;
        self
    }
}
