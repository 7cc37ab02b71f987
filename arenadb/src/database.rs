//! The public session object: owns the mapped file and exposes the nine
//! graph operations plus lifecycle management.

use std::fs::File;
use std::path::Path;

use arenadb_alloc::Arena;
use memmap2::MmapMut;

use crate::error::{Error, Result};
use crate::iterator::DirIterator;
use crate::node::{self, NodeRef, NodeType};
use crate::options::{DEFAULT_INITIAL_SIZE, OpenOptions};
use crate::value::{LeafValue, Value};

/// A database session: one mapped file, one arena, one tree.
///
/// Deliberately not [`Sync`] — the underlying arena has no internal
/// synchronization, so sharing one `&Database` across threads would let
/// two threads run mutating methods concurrently through separate
/// `&mut` borrows obtained via interior raw-pointer access, which this
/// type does not guard against at runtime. The borrow checker already
/// forces single-writer access within one thread; `!Sync` (automatically
/// inferred from the raw pointer arithmetic inside [`Arena`]) extends that
/// to forbid cross-thread sharing entirely, matching the "exclusive
/// access for the lifetime of a handle" contract.
pub struct Database {
    // Held for its lifetime effect only: dropping it releases the fd.
    _file: File,
    mmap: MmapMut,
    arena: Arena,
    root: NodeRef,
    read_only: bool,
}

impl Database {
    /// Open (or create) a database at `path`.
    ///
    /// A file that does not exist, or exists with zero length, is treated
    /// as new: it is truncated to `options.initial_size()` (or
    /// [`DEFAULT_INITIAL_SIZE`] if unset) and bootstrapped with a fresh
    /// arena and an empty root directory. Otherwise the file's existing
    /// length is authoritative and its metadata is trusted as-is.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the file cannot be opened, sized, or
    /// mapped, and [`Error::InvalidArgument`] if `options.read_only()` is
    /// set while creating a new file.
    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let existed = path.exists();
        log::debug!("opening database at {}", path.display());

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let existing_len = file.metadata()?.len();
        let is_new = !existed || existing_len == 0;

        let len = if is_new {
            if options.read_only {
                return Err(Error::InvalidArgument(
                    "cannot create a new database with read_only set",
                ));
            }
            let requested = if options.initial_size == 0 {
                DEFAULT_INITIAL_SIZE
            } else {
                options.initial_size
            };
            file.set_len(requested)?;
            requested
        } else {
            existing_len
        };

        let mut mmap = unsafe { MmapMut::map_mut(&file)? };
        debug_assert_eq!(mmap.len() as u64, len);
        let base = mmap.as_mut_ptr();

        // The root node's slot (exactly `node::NODE_SIZE` bytes) is
        // reserved immediately after the allocator's own metadata, never
        // entered into any free list — see `Arena::create`'s `reserved`
        // parameter. That makes `heap_start()` the root's offset by
        // construction, not by an assumption about which free block a
        // fresh arena's first `allocate` call happens to return.
        let mut arena = if is_new {
            log::trace!("bootstrapping a fresh {len}-byte arena");
            unsafe { Arena::create(base, len, node::NODE_SIZE)? }
        } else {
            log::trace!("attaching to an existing {len}-byte arena");
            unsafe { Arena::attach(base, len)? }
        };

        let root = NodeRef::new(arena.heap_start());
        if is_new {
            unsafe { root.init(base, NodeType::Dir, node::NULL) };
        }

        Ok(Self {
            _file: file,
            mmap,
            arena,
            root,
            read_only: options.read_only,
        })
    }

    pub(crate) fn base(&self) -> *mut u8 {
        self.mmap.as_ptr().cast_mut()
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            Err(Error::InvalidArgument("database was opened read_only"))
        } else {
            Ok(())
        }
    }

    /// The single root directory. Has no name and no `prev`.
    #[must_use]
    pub const fn root(&self) -> NodeRef {
        self.root
    }

    /// Flush pending writes to the backing file and close it, preserving
    /// all data.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the final flush fails.
    pub fn close(self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    /// Remove every node reachable from the root, then [`Self::close`].
    /// The root directory record itself is never freed — it lives in a
    /// permanently reserved slot, not a regular allocation — so reopening
    /// the file afterward finds the same, now-empty root, not a
    /// corrupted one.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the database was opened
    /// read-only, and [`Error::Io`] if the final flush fails.
    pub fn destroy(mut self) -> Result<()> {
        self.check_writable()?;
        log::debug!("destroying database contents before close");
        let root = self.root;
        self.clear_directory(root);
        self.close()
    }

    fn resolve_parent(&self, parent: NodeRef) -> NodeRef {
        if parent.is_null() {
            self.root
        } else {
            parent
        }
    }

    fn alloc_bytes_nul_terminated(&mut self, bytes: &[u8]) -> Result<u64> {
        let off = unsafe { self.arena.allocate(bytes.len() as u64 + 1)? };
        let base = self.base();
        unsafe {
            let dst = base.add(off as usize);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
            *dst.add(bytes.len()) = 0;
        }
        Ok(off)
    }

    fn alloc_node(&mut self, ty: NodeType, name: &str) -> Result<NodeRef> {
        let off = unsafe { self.arena.allocate(node::NODE_SIZE)? };
        let node = NodeRef::new(off);
        unsafe { node.init(self.base(), ty, node::NULL) };
        match self.alloc_bytes_nul_terminated(name.as_bytes()) {
            Ok(name_off) => {
                unsafe { node.set_name(self.base(), name_off) };
                Ok(node)
            }
            Err(e) => {
                unsafe { self.arena.free(off) };
                Err(e)
            }
        }
    }

    /// Free a node record that has not (yet) been linked into the tree:
    /// its own name buffer, but no sibling/parent links to repair.
    fn free_unlinked_node(&mut self, node: NodeRef) {
        let base = self.base();
        let name_off = unsafe { node.name_offset(base) };
        unsafe {
            if name_off != node::NULL {
                self.arena.free(name_off);
            }
            self.arena.free(node.offset());
        }
    }

    fn prepend_child(&mut self, parent: NodeRef, child: NodeRef) {
        let base = self.base();
        unsafe {
            let old_head = parent.child(base);
            if !old_head.is_null() {
                old_head.set_prev(base, child);
            }
            child.set_next(base, old_head);
            parent.set_child(base, child);
            child.set_prev(base, parent);
        }
    }

    /// Create a directory under `parent` (the root, if `parent` is null).
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `parent` is not a directory, or
    /// [`Error::OutOfArena`] if the arena has no room for the node and its
    /// name.
    pub fn create_directory(&mut self, parent: NodeRef, name: &str) -> Result<NodeRef> {
        self.check_writable()?;
        let parent = self.resolve_parent(parent);
        if unsafe { parent.node_type(self.base()) } != NodeType::Dir {
            log::trace!("create_directory: parent {parent:?} is not a directory");
            return Err(Error::InvalidArgument("parent is not a directory"));
        }
        let node = self.alloc_node(NodeType::Dir, name)?;
        self.prepend_child(parent, node);
        log::trace!("create_directory: {name:?} -> {node:?} under {parent:?}");
        Ok(node)
    }

    /// Create a leaf under `parent` (the root, if `parent` is null),
    /// carrying `value`. The leaf's type is whichever [`Value`] variant is
    /// supplied.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `parent` is not a directory, or
    /// [`Error::OutOfArena`] if the arena has no room for the node, its
    /// name, and (for `Value::Str`) its string payload.
    pub fn create_leaf(&mut self, parent: NodeRef, name: &str, value: Value) -> Result<NodeRef> {
        self.check_writable()?;
        let parent = self.resolve_parent(parent);
        if unsafe { parent.node_type(self.base()) } != NodeType::Dir {
            log::trace!("create_leaf: parent {parent:?} is not a directory");
            return Err(Error::InvalidArgument("parent is not a directory"));
        }
        let node = self.alloc_node(value_type(&value), name)?;
        if let Err(e) = self.write_leaf_value(node, &value) {
            self.free_unlinked_node(node);
            return Err(e);
        }
        self.prepend_child(parent, node);
        log::trace!("create_leaf: {name:?} -> {node:?} under {parent:?}");
        Ok(node)
    }

    fn write_leaf_value(&mut self, node: NodeRef, value: &Value) -> Result<()> {
        match value {
            Value::Int(v) => unsafe { node.set_int_value(self.base(), *v) },
            Value::Float(v) => unsafe { node.set_float_value(self.base(), *v) },
            Value::Bool(v) => unsafe { node.set_bool_value(self.base(), *v) },
            Value::Str(bytes) => {
                let data_off = self.alloc_bytes_nul_terminated(bytes)?;
                unsafe { node.set_str_value(self.base(), bytes.len() as u64, data_off) };
            }
        }
        Ok(())
    }

    /// Replace `leaf`'s value in place.
    ///
    /// For a `Str` leaf this allocates a brand-new buffer; the previous
    /// one is not freed (see DESIGN.md for why this is a known, accepted
    /// leak rather than a bug).
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `leaf` is null, a directory, or
    /// `value`'s variant does not match the leaf's existing type, and
    /// [`Error::OutOfArena`] if a `Str` replacement cannot be allocated.
    pub fn update_leaf(&mut self, leaf: NodeRef, value: Value) -> Result<()> {
        self.check_writable()?;
        if leaf.is_null() {
            return Err(Error::InvalidArgument("leaf handle is null"));
        }
        let ty = unsafe { leaf.node_type(self.base()) };
        if ty == NodeType::Dir {
            return Err(Error::InvalidArgument("cannot update a directory"));
        }
        if ty != value_type(&value) {
            return Err(Error::InvalidArgument(
                "replacement value's type does not match the leaf's type",
            ));
        }
        self.write_leaf_value(leaf, &value)
    }

    fn detach(&mut self, node: NodeRef) {
        let base = self.base();
        unsafe {
            let prev = node.prev(base);
            let next = node.next(base);
            debug_assert!(!prev.is_null(), "every node but the root has a prev");
            if prev.child(base) == node {
                prev.set_child(base, next);
            } else {
                prev.set_next(base, next);
            }
            if !next.is_null() {
                next.set_prev(base, prev);
            }
        }
    }

    fn free_node(&mut self, node: NodeRef) {
        let base = self.base();
        let ty = unsafe { node.node_type(base) };
        self.detach(node);
        unsafe {
            if ty == NodeType::Str {
                let (_, data_off) = node.str_value(base);
                self.arena.free(data_off);
            }
            let name_off = node.name_offset(base);
            if name_off != node::NULL {
                self.arena.free(name_off);
            }
            self.arena.free(node.offset());
        }
    }

    /// Detach and free `dir`.
    ///
    /// Returns `false` (not an error) without modifying the graph if
    /// `dir` is null, not a directory, has any child, or is the root.
    pub fn delete_directory(&mut self, dir: NodeRef) -> Result<bool> {
        self.check_writable()?;
        if dir.is_null() || dir == self.root {
            return Ok(false);
        }
        let base = self.base();
        if unsafe { dir.node_type(base) } != NodeType::Dir {
            return Ok(false);
        }
        if !unsafe { dir.child(base) }.is_null() {
            return Ok(false);
        }
        self.free_node(dir);
        Ok(true)
    }

    /// Detach and free `leaf`, including its name and (for `Str`) string
    /// buffer.
    ///
    /// Returns `false` (not an error) without modifying the graph if
    /// `leaf` is null or a directory.
    pub fn delete_leaf(&mut self, leaf: NodeRef) -> Result<bool> {
        self.check_writable()?;
        if leaf.is_null() {
            return Ok(false);
        }
        if unsafe { leaf.node_type(self.base()) } == NodeType::Dir {
            return Ok(false);
        }
        self.free_node(leaf);
        Ok(true)
    }

    /// Depth-first remove every descendant of `dir` (root, if `dir` is
    /// null). `dir` itself remains, now empty.
    pub fn clear_directory(&mut self, dir: NodeRef) {
        let dir = if dir.is_null() { self.root } else { dir };
        self.clear_dir_dfs(dir);
    }

    fn clear_dir_dfs(&mut self, dir: NodeRef) {
        let base = self.base();
        let mut cur = unsafe { dir.child(base) };
        while !cur.is_null() {
            if unsafe { cur.node_type(base) } == NodeType::Dir {
                self.clear_dir_dfs(cur);
            }
            // Computed before freeing: `free_node` mutates `cur`'s own
            // sibling links as part of detaching it.
            let next = unsafe { cur.next(self.base()) };
            self.free_node(cur);
            cur = next;
        }
    }

    /// A read-only view of `leaf`'s value, or `None` if `leaf` is null or
    /// a directory.
    #[must_use]
    pub fn get_leaf_value(&self, leaf: NodeRef) -> Option<LeafValue<'_>> {
        if leaf.is_null() {
            return None;
        }
        let base = self.base();
        unsafe {
            match leaf.node_type(base) {
                NodeType::Dir => None,
                NodeType::Int => Some(LeafValue::Int(leaf.int_value(base))),
                NodeType::Float => Some(LeafValue::Float(leaf.float_value(base))),
                NodeType::Bool => Some(LeafValue::Bool(leaf.bool_value(base))),
                NodeType::Str => {
                    let (size, data_off) = leaf.str_value(base);
                    let slice = std::slice::from_raw_parts(base.add(data_off as usize), size as usize);
                    Some(LeafValue::Str(slice))
                }
            }
        }
    }

    /// `node`'s type, or `None` if `node` is null.
    #[must_use]
    pub fn node_type(&self, node: NodeRef) -> Option<NodeType> {
        if node.is_null() {
            None
        } else {
            Some(unsafe { node.node_type(self.base()) })
        }
    }

    /// `node`'s name. Empty for the root (which has no name buffer).
    ///
    /// # Panics
    /// If the stored name bytes are not valid UTF-8, which would indicate
    /// a corrupted file (names are always written from a `&str`).
    #[must_use]
    pub fn node_name(&self, node: NodeRef) -> &str {
        let base = self.base();
        unsafe {
            let name_off = node.name_offset(base);
            if name_off == node::NULL {
                return "";
            }
            let cstr = std::ffi::CStr::from_ptr(base.add(name_off as usize).cast());
            cstr.to_str().expect("node name must be valid UTF-8")
        }
    }

    /// A cursor over `dir`'s children (root, if `dir` is null), yielding
    /// them in reverse creation order. Not invalidated automatically if
    /// the node it is currently parked on is deleted by a later call —
    /// advancing past a deleted node reads its already-repaired `next`
    /// link, which after deletion points at whatever followed it, so the
    /// cursor simply skips the deleted node rather than observing
    /// undefined behavior.
    #[must_use]
    pub fn iterate(&self, dir: NodeRef) -> DirIterator {
        let dir = if dir.is_null() { self.root } else { dir };
        let base = self.base();
        let start = if unsafe { dir.node_type(base) } == NodeType::Dir {
            unsafe { dir.child(base) }
        } else {
            NodeRef::null()
        };
        DirIterator::new(start)
    }

    /// Number of directory hops from `node` up to the root, found by
    /// repeatedly walking the "parent via prev" trick: a node's `prev` is
    /// either a previous sibling or, once the head of the child list is
    /// reached, the parent directory itself.
    #[must_use]
    pub fn depth(&self, node: NodeRef) -> u32 {
        let base = self.base();
        let mut cur = node;
        let mut depth = 0u32;
        while cur != self.root {
            let mut head = cur;
            loop {
                let p = unsafe { head.prev(base) };
                if unsafe { p.child(base) } == head {
                    cur = p;
                    break;
                }
                head = p;
            }
            depth += 1;
        }
        depth
    }
}

const fn value_type(value: &Value) -> NodeType {
    match value {
        Value::Int(_) => NodeType::Int,
        Value::Str(_) => NodeType::Str,
        Value::Float(_) => NodeType::Float,
        Value::Bool(_) => NodeType::Bool,
    }
}
