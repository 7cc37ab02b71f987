//! Persistent, hierarchical key-value store whose entire address space
//! lives in a single memory-mapped file.
//!
//! A [`Database`] is a thin session object: it owns the mapped file and a
//! [`arenadb_alloc::Arena`] carved out of it, and exposes a small tree API
//! — named directories and typed leaves (`Int`, `Str`, `Float`, `Bool`)
//! under a root, navigable via [`DirIterator`]. Every cross-reference in
//! the tree (`next`, `prev`, `child`, `name`) is an arena-relative byte
//! offset rather than a native pointer, so the file contains the same
//! data after a reopen: offsets are stable, pointers into process memory
//! are not.
//!
//! ```no_run
//! use arenadb::{Database, OpenOptions, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut db = Database::open("example.db", OpenOptions::new().initial_size(1 << 20))?;
//! let root = db.root();
//! let leaf = db.create_leaf(root, "answer", Value::Int(42))?;
//! assert_eq!(db.get_leaf_value(leaf), Some(arenadb::LeafValue::Int(42)));
//! db.close()?;
//! # Ok(())
//! # }
//! ```

mod database;
mod error;
mod iterator;
mod node;
mod options;
mod value;

pub use database::Database;
pub use error::{Error, Result};
pub use iterator::{DirIterator, Entry};
pub use node::{NodeRef, NodeType};
pub use options::{DEFAULT_INITIAL_SIZE, OpenOptions};
pub use value::{LeafValue, Value};
