//! Cursor over a directory's children.
//!
//! A single current node pointer with a small set of accessors on top.
//! An empty cursor (an empty directory's iterator, or one run past its
//! last child) simply holds a null [`NodeRef`] forever — there is no
//! separate "invalid" state to track.
//!
//! Not invalidated automatically if the node it points at is deleted by
//! someone else; see [`crate::Database::iterate`] for the documented
//! caveat.

use std::fmt;

use crate::node::NodeRef;
use crate::value::LeafValue;
use crate::{Database, NodeType};

/// A cursor over one directory's children, yielding them in reverse
/// creation order (children are prepended, not appended).
#[derive(Debug, Clone, Copy)]
pub struct DirIterator {
    current: NodeRef,
}

impl DirIterator {
    pub(crate) const fn new(current: NodeRef) -> Self {
        Self { current }
    }

    /// The node currently under the cursor, or `None` if the cursor is
    /// past the last child (or the directory was empty).
    #[must_use]
    pub fn current(self) -> Option<NodeRef> {
        if self.current.is_null() {
            None
        } else {
            Some(self.current)
        }
    }

    /// `true` unless the cursor is past the last child.
    #[must_use]
    pub const fn valid(self) -> bool {
        !self.current.is_null()
    }

    /// The current node's type, if valid.
    #[must_use]
    pub fn node_type(self, db: &Database) -> Option<NodeType> {
        self.valid().then(|| unsafe { self.current.node_type(db.base()) })
    }

    /// The current node's value, if valid and not a directory.
    #[must_use]
    pub fn value(self, db: &Database) -> Option<LeafValue<'_>> {
        if !self.valid() {
            return None;
        }
        db.get_leaf_value(self.current)
    }

    /// The current node's name, if valid. `None` only if the cursor has
    /// run off the end; every real node but the root has a name.
    #[must_use]
    pub fn name(self, db: &Database) -> Option<&str> {
        self.valid().then(|| db.node_name(self.current))
    }

    /// `true` if there is a next sibling to advance to.
    #[must_use]
    pub fn has_next(self, db: &Database) -> bool {
        self.valid() && !unsafe { self.current.next(db.base()) }.is_null()
    }

    /// Advance to the next sibling, returning whether the cursor moved.
    pub fn next(&mut self, db: &Database) -> bool {
        if !self.has_next(db) {
            return false;
        }
        self.current = unsafe { self.current.next(db.base()) };
        true
    }

    /// A `{:?}`-formattable view of the current entry as `(name, type)`,
    /// without recursing into a directory's children. `db` is borrowed only
    /// for the lifetime of the formatted value, not stored on `self` — a
    /// [`DirIterator`] otherwise carries no reference back to its database,
    /// which is what lets a cursor stay alive across mutating calls (see
    /// `Database::iterate`).
    #[must_use]
    pub fn debug<'a>(self, db: &'a Database) -> Entry<'a> {
        Entry { current: self.current, db }
    }
}

/// Borrowed, one-shot `Debug` view of a single node: `(name, type)`, with
/// no recursion into a directory's own children.
pub struct Entry<'a> {
    current: NodeRef,
    db: &'a Database,
}

impl fmt::Debug for Entry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.current.is_null() {
            return f.write_str("<end>");
        }
        let ty = unsafe { self.current.node_type(self.db.base()) };
        let name = self.db.node_name(self.current);
        write!(f, "({name:?}, {ty:?})")
    }
}
