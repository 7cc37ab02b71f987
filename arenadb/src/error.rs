//! Error type for the database's public surface.

/// Failure modes a caller of [`crate::Database`] can observe.
///
/// Matches the three kinds the allocator and graph layers can raise:
/// arena exhaustion, caller misuse, and I/O failure at session start.
/// None of these are retried internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The allocator has no free block large enough for the request.
    #[error("arena exhausted: no free block large enough for the request")]
    OutOfArena,
    /// The caller passed something outside an operation's contract: a null
    /// handle, a directory where a leaf was expected (or vice versa), a
    /// non-empty directory on deletion, or the root on deletion.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Opening, mapping, or resizing the backing file failed.
    #[error("I/O failure opening the database: {0}")]
    Io(#[from] std::io::Error),
}

impl From<arenadb_alloc::Error> for Error {
    fn from(value: arenadb_alloc::Error) -> Self {
        match value {
            arenadb_alloc::Error::OutOfArena => Self::OutOfArena,
            arenadb_alloc::Error::InvalidArgument(msg) => Self::InvalidArgument(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
