//! Error type for the buddy allocator.

/// Failure modes the allocator can surface to a caller.
///
/// There is no retry path for either variant: an [`Error::OutOfArena`] means
/// the arena genuinely has no block large enough, and an
/// [`Error::InvalidArgument`] means the caller passed something the
/// allocator's contract forbids. Corrupted on-disk metadata is not
/// represented here — it is a programmer/data-corruption bug and is caught
/// with `debug_assert!`, matching the original C implementation's use of
/// `assert`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No free block of sufficient size exists anywhere in `[fk, nsizes)`.
    #[error("arena exhausted: no free block large enough for the request")]
    OutOfArena,
    /// The caller passed an argument outside the allocator's contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

pub type Result<T> = core::result::Result<T, Error>;
