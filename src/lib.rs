//! # rb-multimap
//!
//! An in-memory ordered multi-map built on a red-black tree.
//!
//! Records are ordered by an integer key (see [`Keyed`]). Duplicate keys are
//! allowed: a record inserted with a key that is already present is placed
//! after every existing record with that key, so records sharing a key are
//! enumerated in insertion order.
//!
//! ## Example
//!
//! ```rust
//! use rb_multimap::{Employee, RbTree};
//!
//! let mut tree = RbTree::new();
//! tree.insert(Employee::new("Evan", "Whitmer", "Engineer", 199_999));
//! tree.insert(Employee::new("Jonah", "Ebent", "Engineer", 200_000));
//! tree.insert(Employee::new("Thor", "Odinson", "Manager", 199_998));
//!
//! let names: Vec<&str> = tree.iter().map(|e| e.first_name.as_str()).collect();
//! assert_eq!(names, ["Thor", "Evan", "Jonah"]);
//!
//! let jonah = Employee::new("Jonah", "Ebent", "Engineer", 200_000);
//! assert_eq!(tree.delete(200_000, &jonah), Ok(jonah));
//! assert_eq!(tree.range(199_999, 200_000).count(), 1);
//! ```

mod error;
mod record;

pub use error::{Error, Result};
pub use record::{Employee, Key, Keyed};

use log::{debug, trace};

// =============================================================================
// Configuration
// =============================================================================

const DEFAULT_INITIAL_CAPACITY: usize = 1024;

/// Construction options for [`RbTree::with_config`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of node slots reserved up front.
    pub initial_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }
}

// =============================================================================
// Node ids, colors, sides
// =============================================================================

/// Index of a node slot in the arena.
///
/// `NodeId::NULL` marks an absent child or the root's parent. There is no
/// shared sentinel node: absent positions carry no color and are read as
/// Black.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct NodeId(u32);

impl NodeId {
    const NULL: NodeId = NodeId(u32::MAX);

    #[inline]
    fn is_null(self) -> bool {
        self.0 == Self::NULL.0
    }

    #[inline]
    fn index(self) -> usize {
        debug_assert!(!self.is_null());
        self.0 as usize
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Color {
    Red,
    Black,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Side {
    Left = 0,
    Right = 1,
}

impl Side {
    #[inline]
    fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

#[derive(Clone, Debug)]
struct Node<R> {
    record: R,
    color: Color,
    children: [NodeId; 2],
    /// Back-reference only; ownership flows from the arena through `children`.
    parent: NodeId,
}

// =============================================================================
// Node Arena
// =============================================================================

/// Slot storage for tree nodes, with a free list of vacated slots.
#[derive(Clone)]
struct NodeArena<R> {
    slots: Vec<Option<Node<R>>>,
    free: Vec<NodeId>,
}

impl<R> NodeArena<R> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
        }
    }

    fn memory_usage(&self) -> usize {
        self.slots.capacity() * std::mem::size_of::<Option<Node<R>>>()
            + self.free.capacity() * std::mem::size_of::<NodeId>()
    }

    fn shrink_to_fit(&mut self) {
        // Trailing vacant slots can be dropped outright.
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
        let live_len = self.slots.len();
        self.free.retain(|id| id.index() < live_len);
        self.slots.shrink_to_fit();
        self.free.shrink_to_fit();
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }

    /// Make sure the next `alloc` does not need to grow `slots`.
    fn try_reserve_one(&mut self) -> Result<()> {
        if self.free.is_empty() {
            self.slots
                .try_reserve(1)
                .map_err(|_| Error::OutOfMemory)?;
        }
        Ok(())
    }

    /// Allocate a detached Red node.
    fn alloc(&mut self, record: R) -> NodeId {
        let node = Node {
            record,
            color: Color::Red,
            children: [NodeId::NULL; 2],
            parent: NodeId::NULL,
        };
        if let Some(id) = self.free.pop() {
            self.slots[id.index()] = Some(node);
            return id;
        }
        let idx = self.slots.len();
        assert!(idx < NodeId::NULL.0 as usize, "node arena exhausted");
        self.slots.push(Some(node));
        NodeId(idx as u32)
    }

    /// Vacate a slot, handing back its record.
    fn release(&mut self, id: NodeId) -> R {
        match self.slots[id.index()].take() {
            Some(node) => {
                self.free.push(id);
                node.record
            }
            None => unreachable!("released vacant node slot {}", id.0),
        }
    }

    #[inline]
    fn get(&self, id: NodeId) -> &Node<R> {
        match &self.slots[id.index()] {
            Some(node) => node,
            None => unreachable!("dangling node id {}", id.0),
        }
    }

    #[inline]
    fn get_mut(&mut self, id: NodeId) -> &mut Node<R> {
        match &mut self.slots[id.index()] {
            Some(node) => node,
            None => unreachable!("dangling node id {}", id.0),
        }
    }

    /// Exchange the records held by two distinct live nodes.
    fn swap_records(&mut self, a: NodeId, b: NodeId) {
        debug_assert_ne!(a, b);
        let (lo, hi) = if a.index() < b.index() {
            (a.index(), b.index())
        } else {
            (b.index(), a.index())
        };
        let (head, tail) = self.slots.split_at_mut(hi);
        match (&mut head[lo], &mut tail[0]) {
            (Some(x), Some(y)) => std::mem::swap(&mut x.record, &mut y.record),
            _ => unreachable!("swap involving vacant node slot"),
        }
    }
}

// =============================================================================
// RbTree
// =============================================================================

/// An ordered multi-map of records keyed by [`Keyed::key`].
///
/// Properties kept after every insert and delete:
/// - the root is Black
/// - no Red node has a Red child
/// - every root-to-absence path crosses the same number of Black nodes
/// - in-order traversal is sorted by key, with equal keys in insertion order
#[derive(Clone)]
pub struct RbTree<R> {
    nodes: NodeArena<R>,
    root: NodeId,
    count: usize,
}

impl<R> RbTree<R> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: NodeArena::with_capacity(capacity),
            root: NodeId::NULL,
            count: 0,
        }
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_capacity(config.initial_capacity)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bytes held by the node arena, including unused capacity.
    pub fn memory_usage(&self) -> usize {
        self.nodes.memory_usage()
    }

    pub fn shrink_to_fit(&mut self) {
        self.nodes.shrink_to_fit();
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = NodeId::NULL;
        self.count = 0;
    }

    /// Number of nodes on the longest root-to-leaf path (0 when empty).
    pub fn height(&self) -> usize {
        self.subtree_height(self.root)
    }

    fn subtree_height(&self, id: NodeId) -> usize {
        if id.is_null() {
            return 0;
        }
        let [l, r] = self.nodes.get(id).children;
        1 + self.subtree_height(l).max(self.subtree_height(r))
    }

    /// In-order cursor over every record.
    pub fn iter(&self) -> Iter<'_, R> {
        let mut iter = Iter {
            tree: self,
            stack: Vec::new(),
            remaining: self.count,
        };
        iter.push_left_spine(self.root);
        iter
    }

    /// Every record in ascending key order.
    pub fn display(&self) -> Vec<&R> {
        self.iter().collect()
    }

    pub fn first(&self) -> Option<&R> {
        if self.root.is_null() {
            return None;
        }
        Some(&self.nodes.get(self.extreme(self.root, Side::Left)).record)
    }

    pub fn last(&self) -> Option<&R> {
        if self.root.is_null() {
            return None;
        }
        Some(&self.nodes.get(self.extreme(self.root, Side::Right)).record)
    }

    // === Link helpers ===

    #[inline]
    fn child(&self, id: NodeId, side: Side) -> NodeId {
        self.nodes.get(id).children[side as usize]
    }

    #[inline]
    fn parent(&self, id: NodeId) -> NodeId {
        self.nodes.get(id).parent
    }

    /// Absent children count as Black.
    #[inline]
    fn color(&self, id: NodeId) -> Color {
        if id.is_null() {
            Color::Black
        } else {
            self.nodes.get(id).color
        }
    }

    #[inline]
    fn is_red(&self, id: NodeId) -> bool {
        self.color(id) == Color::Red
    }

    #[inline]
    fn set_color(&mut self, id: NodeId, color: Color) {
        self.nodes.get_mut(id).color = color;
    }

    /// Which side of `parent` holds `child`. `child` must be non-null.
    #[inline]
    fn side_of(&self, parent: NodeId, child: NodeId) -> Side {
        debug_assert!(!child.is_null());
        if self.child(parent, Side::Left) == child {
            Side::Left
        } else {
            debug_assert_eq!(self.child(parent, Side::Right), child);
            Side::Right
        }
    }

    /// Link `child` under `parent` and point its back-reference up.
    fn set_child(&mut self, parent: NodeId, side: Side, child: NodeId) {
        self.nodes.get_mut(parent).children[side as usize] = child;
        if !child.is_null() {
            self.nodes.get_mut(child).parent = parent;
        }
    }

    /// Put `new` in the position `old` occupies under `parent` (or at the root).
    fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        if parent.is_null() {
            self.root = new;
            if !new.is_null() {
                self.nodes.get_mut(new).parent = NodeId::NULL;
            }
        } else {
            let side = self.side_of(parent, old);
            self.set_child(parent, side, new);
        }
    }

    /// Follow `side` links from `id` until the last node.
    fn extreme(&self, mut id: NodeId, side: Side) -> NodeId {
        loop {
            let next = self.child(id, side);
            if next.is_null() {
                return id;
            }
            id = next;
        }
    }

    fn successor(&self, id: NodeId) -> NodeId {
        let right = self.child(id, Side::Right);
        if !right.is_null() {
            return self.extreme(right, Side::Left);
        }
        let mut cur = id;
        let mut up = self.parent(cur);
        while !up.is_null() && self.child(up, Side::Right) == cur {
            cur = up;
            up = self.parent(up);
        }
        up
    }

    /// Rotate `x` down toward `side`; its child on the other side takes its place.
    ///
    /// `rotate(x, Side::Left)` is the classic left rotation.
    fn rotate(&mut self, x: NodeId, side: Side) {
        let other = side.opposite();
        let y = self.child(x, other);
        debug_assert!(!y.is_null(), "rotation pivot must exist");
        trace!("rotate {:?} at node {}", side, x.0);

        let inner = self.child(y, side);
        self.set_child(x, other, inner);
        let x_parent = self.parent(x);
        self.replace_child(x_parent, x, y);
        self.set_child(y, side, x);
    }
}

impl<R: Keyed> RbTree<R> {
    #[inline]
    fn key_of(&self, id: NodeId) -> Key {
        self.nodes.get(id).record.key()
    }

    /// Leftmost node with key `>= key`, or NULL.
    fn lower_bound(&self, key: Key) -> NodeId {
        let mut best = NodeId::NULL;
        let mut cur = self.root;
        while !cur.is_null() {
            if self.key_of(cur) >= key {
                best = cur;
                cur = self.child(cur, Side::Left);
            } else {
                cur = self.child(cur, Side::Right);
            }
        }
        best
    }

    // === Insert ===

    /// Insert a record. Equal keys are placed after existing ones.
    pub fn insert(&mut self, record: R) {
        let key = record.key();
        let mut parent = NodeId::NULL;
        let mut side = Side::Left;
        let mut cur = self.root;
        while !cur.is_null() {
            parent = cur;
            side = if key < self.key_of(cur) {
                Side::Left
            } else {
                Side::Right
            };
            cur = self.child(cur, side);
        }

        let id = self.nodes.alloc(record);
        if parent.is_null() {
            self.root = id;
        } else {
            self.set_child(parent, side, id);
        }
        self.count += 1;
        self.insert_fixup(id);
    }

    /// Like [`insert`](Self::insert), but reports allocation failure instead
    /// of aborting.
    pub fn try_insert(&mut self, record: R) -> Result<()> {
        self.nodes.try_reserve_one()?;
        self.insert(record);
        Ok(())
    }

    fn insert_fixup(&mut self, mut z: NodeId) {
        loop {
            let mut p = self.parent(z);
            if !self.is_red(p) {
                break;
            }
            // A Red parent is never the root, so the grandparent exists.
            let g = self.parent(p);
            let p_side = self.side_of(g, p);
            let uncle = self.child(g, p_side.opposite());

            if self.is_red(uncle) {
                trace!("insert fixup: recolor at node {}", g.0);
                self.set_color(p, Color::Black);
                self.set_color(uncle, Color::Black);
                self.set_color(g, Color::Red);
                z = g;
                continue;
            }

            if self.side_of(p, z) != p_side {
                // Triangle: turn it into a line.
                self.rotate(p, p_side);
                z = p;
                p = self.parent(z);
            }
            self.set_color(p, Color::Black);
            self.set_color(g, Color::Red);
            self.rotate(g, p_side.opposite());
            break;
        }
        let root = self.root;
        self.set_color(root, Color::Black);
    }

    // === Delete ===

    /// Remove the record equal to `target` among those stored under `key`.
    ///
    /// When several stored records equal `target`, the first in key order
    /// is removed. Returns the removed record.
    pub fn delete(&mut self, key: Key, target: &R) -> Result<R>
    where
        R: PartialEq,
    {
        let mut cur = self.lower_bound(key);
        while !cur.is_null() && self.key_of(cur) == key {
            if self.nodes.get(cur).record == *target {
                return Ok(self.remove_node(cur));
            }
            cur = self.successor(cur);
        }
        debug!("delete: no record with key {} matches", key);
        Err(Error::NotFound { key })
    }

    /// Remove the first record stored under `key`, if any.
    pub fn remove_first(&mut self, key: Key) -> Option<R> {
        let id = self.lower_bound(key);
        if id.is_null() || self.key_of(id) != key {
            return None;
        }
        Some(self.remove_node(id))
    }

    fn remove_node(&mut self, mut z: NodeId) -> R {
        if !self.child(z, Side::Left).is_null() && !self.child(z, Side::Right).is_null() {
            // Move the doomed record into the in-order successor's slot and
            // unlink that slot instead; it has no left child.
            let s = self.extreme(self.child(z, Side::Right), Side::Left);
            self.nodes.swap_records(z, s);
            z = s;
        }

        let left = self.child(z, Side::Left);
        let child = if left.is_null() {
            self.child(z, Side::Right)
        } else {
            left
        };
        let parent = self.parent(z);
        let side = if parent.is_null() {
            Side::Left
        } else {
            self.side_of(parent, z)
        };
        let removed_color = self.color(z);

        self.replace_child(parent, z, child);
        let record = self.nodes.release(z);
        self.count -= 1;

        if removed_color == Color::Black {
            self.delete_fixup(child, parent, side);
        }
        record
    }

    /// Restore black height after a Black node was unlinked.
    ///
    /// `x` is the node now sitting in the vacated position (possibly NULL),
    /// `parent` its parent and `side` the side it occupies.
    fn delete_fixup(&mut self, mut x: NodeId, mut parent: NodeId, mut side: Side) {
        while x != self.root && !self.is_red(x) {
            let other = side.opposite();
            let mut w = self.child(parent, other);

            if self.is_red(w) {
                trace!("delete fixup: red sibling at node {}", parent.0);
                self.set_color(w, Color::Black);
                self.set_color(parent, Color::Red);
                self.rotate(parent, side);
                w = self.child(parent, other);
            }

            let near = self.child(w, side);
            let far = self.child(w, other);
            if !self.is_red(near) && !self.is_red(far) {
                self.set_color(w, Color::Red);
                x = parent;
                parent = self.parent(x);
                if !parent.is_null() {
                    side = self.side_of(parent, x);
                }
                continue;
            }

            if !self.is_red(far) {
                self.set_color(near, Color::Black);
                self.set_color(w, Color::Red);
                self.rotate(w, other);
                w = self.child(parent, other);
            }

            let far = self.child(w, other);
            let parent_color = self.color(parent);
            self.set_color(w, parent_color);
            self.set_color(parent, Color::Black);
            self.set_color(far, Color::Black);
            self.rotate(parent, side);
            x = self.root;
            break;
        }
        if !x.is_null() {
            self.set_color(x, Color::Black);
        }
    }

    // === Lookup ===

    /// First record with `key` met while descending from the root.
    ///
    /// With duplicates this is not necessarily the oldest one; use
    /// [`find_all`](Self::find_all) to see every match.
    pub fn find(&self, key: Key) -> Option<&R> {
        let mut cur = self.root;
        while !cur.is_null() {
            let node = self.nodes.get(cur);
            cur = match key.cmp(&node.record.key()) {
                std::cmp::Ordering::Less => node.children[Side::Left as usize],
                std::cmp::Ordering::Greater => node.children[Side::Right as usize],
                std::cmp::Ordering::Equal => return Some(&node.record),
            };
        }
        None
    }

    pub fn contains_key(&self, key: Key) -> bool {
        self.find(key).is_some()
    }

    /// Every record stored under `key`, in insertion order.
    pub fn find_all(&self, key: Key) -> Vec<&R> {
        let mut out = Vec::new();
        let mut cur = self.lower_bound(key);
        while !cur.is_null() && self.key_of(cur) == key {
            out.push(&self.nodes.get(cur).record);
            cur = self.successor(cur);
        }
        out
    }

    pub fn count(&self, key: Key) -> usize {
        self.range(key, key).count()
    }

    // === Range ===

    /// Records with `min <= key <= max`, ascending. Empty when `max < min`.
    pub fn range(&self, min: Key, max: Key) -> Range<'_, R> {
        let mut range = Range {
            tree: self,
            stack: Vec::new(),
            max,
        };
        if max < min {
            debug!("range: max {} below min {}, nothing to visit", max, min);
            return range;
        }
        // Seek: keep only ancestors whose key can still be >= min.
        let mut cur = self.root;
        while !cur.is_null() {
            if self.key_of(cur) >= min {
                range.stack.push(cur);
                cur = self.child(cur, Side::Left);
            } else {
                cur = self.child(cur, Side::Right);
            }
        }
        range
    }

    /// Eager form of [`range`](Self::range) that rejects `max < min`.
    pub fn range_query(&self, min: Key, max: Key) -> Result<Vec<&R>> {
        if max < min {
            return Err(Error::EmptyRange { min, max });
        }
        Ok(self.range(min, max).collect())
    }
}

impl<R> Default for RbTree<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: std::fmt::Debug> std::fmt::Debug for RbTree<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<R: Keyed> Extend<R> for RbTree<R> {
    fn extend<I: IntoIterator<Item = R>>(&mut self, iter: I) {
        for record in iter {
            self.insert(record);
        }
    }
}

impl<R: Keyed> FromIterator<R> for RbTree<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        let mut tree = Self::new();
        tree.extend(iter);
        tree
    }
}

impl<'a, R> IntoIterator for &'a RbTree<R> {
    type Item = &'a R;
    type IntoIter = Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// =============================================================================
// Iterators
// =============================================================================

/// In-order cursor over all records. Holds at most `height` pending nodes.
pub struct Iter<'a, R> {
    tree: &'a RbTree<R>,
    stack: Vec<NodeId>,
    remaining: usize,
}

impl<'a, R> Iter<'a, R> {
    fn push_left_spine(&mut self, mut id: NodeId) {
        while !id.is_null() {
            self.stack.push(id);
            id = self.tree.child(id, Side::Left);
        }
    }
}

impl<'a, R> Iterator for Iter<'a, R> {
    type Item = &'a R;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let tree = self.tree;
        self.push_left_spine(tree.child(id, Side::Right));
        self.remaining -= 1;
        Some(&tree.nodes.get(id).record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<R> ExactSizeIterator for Iter<'_, R> {}

/// In-order cursor over records with keys in `[min, max]`.
///
/// Subtrees entirely below `min` are never entered and iteration stops at
/// the first key above `max`.
pub struct Range<'a, R> {
    tree: &'a RbTree<R>,
    stack: Vec<NodeId>,
    max: Key,
}

impl<'a, R: Keyed> Iterator for Range<'a, R> {
    type Item = &'a R;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let tree = self.tree;
        if tree.key_of(id) > self.max {
            self.stack.clear();
            return None;
        }
        let mut cur = tree.child(id, Side::Right);
        while !cur.is_null() {
            self.stack.push(cur);
            cur = tree.child(cur, Side::Left);
        }
        Some(&tree.nodes.get(id).record)
    }
}

impl<R: Keyed> std::iter::FusedIterator for Range<'_, R> {}


#[cfg(test)]
mod proptests;
