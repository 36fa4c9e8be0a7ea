//! Typed accessors over a raw page buffer. This is the one module allowed
//! to reason about byte offsets directly; everything above it (the tree
//! walk, the split/promote cascade, the iterator) goes through `NodeView`
//! / `NodeViewMut` and never indexes a page buffer itself.
//!
//! Grounded in the teacher's `storage-engine::index::node::BPlusTreeNode`,
//! which wraps a `&'a mut [u8]` the same way; generalized to the two
//! header shapes in `layout.rs` and to runtime-configured key/data sizes.

use crate::layout::{self, HeaderLayout, NodeLayout};
use common::{PageId, INVALID_PAGE_ID};

/// Read-only view of a node page.
pub struct NodeView<'a> {
    buf: &'a [u8],
    layout: NodeLayout,
}

/// Mutable view of a node page, including the one-time `initialize` that
/// stamps a fresh header.
pub struct NodeViewMut<'a> {
    buf: &'a mut [u8],
    layout: NodeLayout,
}

macro_rules! shared_accessors {
    () => {
        pub fn page_id(&self) -> PageId {
            common::header::read_page_id(self.buf)
        }

        pub fn is_leaf(&self) -> bool {
            self.buf[layout::flags_offset(self.layout.header)] & layout::FLAG_LEAF_BIT != 0
        }

        pub fn is_root(&self) -> bool {
            self.buf[layout::flags_offset(self.layout.header)] & layout::FLAG_ROOT_BIT != 0
        }

        pub fn count(&self) -> u16 {
            let off = layout::count_offset(self.layout.header);
            u16::from_le_bytes(self.buf[off..off + 2].try_into().unwrap())
        }

        pub fn next_leaf(&self) -> PageId {
            let off = layout::next_leaf_offset(self.layout.header);
            PageId::from_le_bytes(self.buf[off..off + 4].try_into().unwrap())
        }

        pub fn next_id(&self) -> PageId {
            match self.layout.header {
                HeaderLayout::Chained => {
                    PageId::from_le_bytes(
                        self.buf[layout::CHAINED_NEXT_ID..layout::CHAINED_NEXT_ID + 4]
                            .try_into()
                            .unwrap(),
                    )
                }
                HeaderLayout::Compact => INVALID_PAGE_ID,
            }
        }

        /// Key bytes for leaf record `i` or interior key slot `i`.
        pub fn key(&self, i: usize) -> &[u8] {
            let off = if self.is_leaf() {
                self.layout.leaf_record_offset(i)
            } else {
                self.layout.interior_key_offset(i)
            };
            &self.buf[off..off + self.layout.key_size]
        }

        /// Data payload for leaf record `i`. Only meaningful on leaves.
        pub fn data(&self, i: usize) -> &[u8] {
            let off = self.layout.leaf_record_offset(i) + self.layout.key_size;
            &self.buf[off..off + self.layout.data_size]
        }

        /// Child pointer `i` of an interior node (there are `count() + 1`
        /// of them, indices `0..=count()`).
        pub fn child(&self, i: usize) -> PageId {
            let off = self.layout.interior_pointer_offset(i);
            PageId::from_le_bytes(self.buf[off..off + 4].try_into().unwrap())
        }

        /// Binary search among this node's keys for `key`. `Ok(i)` gives the
        /// *first* slot holding an exact match — leaf records with equal
        /// keys are kept contiguous and in insertion order, so this is also
        /// the oldest surviving duplicate. `Err(i)` gives the insertion
        /// point that keeps keys sorted.
        pub fn binary_search(&self, key: &[u8]) -> Result<usize, usize> {
            let n = self.count() as usize;
            let mut lo = 0usize;
            let mut hi = n;
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                if self.key(mid) < key {
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }
            if lo < n && self.key(lo) == key {
                Ok(lo)
            } else {
                Err(lo)
            }
        }

        pub fn layout(&self) -> &NodeLayout {
            &self.layout
        }
    };
}

impl<'a> NodeView<'a> {
    pub fn new(buf: &'a [u8], layout: NodeLayout) -> Self {
        Self { buf, layout }
    }

    shared_accessors!();
}

impl<'a> NodeViewMut<'a> {
    pub fn new(buf: &'a mut [u8], layout: NodeLayout) -> Self {
        Self { buf, layout }
    }

    shared_accessors!();

    pub fn as_view(&self) -> NodeView<'_> {
        NodeView { buf: self.buf, layout: self.layout }
    }

    /// Stamps a brand new header: zeroes the page, sets leaf/root flags,
    /// zero count, and `INVALID_PAGE_ID` chain pointers.
    pub fn initialize(&mut self, page_id: PageId, is_leaf: bool, is_root: bool) {
        self.buf.fill(0);
        common::header::stamp_page_id(self.buf, page_id);
        let mut flags = 0u8;
        if is_leaf {
            flags |= layout::FLAG_LEAF_BIT;
        }
        if is_root {
            flags |= layout::FLAG_ROOT_BIT;
        }
        self.buf[layout::flags_offset(self.layout.header)] = flags;
        self.set_count(0);
        self.set_next_leaf(INVALID_PAGE_ID);
        if self.layout.header == HeaderLayout::Chained {
            self.set_next_id(INVALID_PAGE_ID);
        }
    }

    pub fn set_page_id(&mut self, id: PageId) {
        common::header::stamp_page_id(self.buf, id);
    }

    pub fn set_is_root(&mut self, is_root: bool) {
        let off = layout::flags_offset(self.layout.header);
        if is_root {
            self.buf[off] |= layout::FLAG_ROOT_BIT;
        } else {
            self.buf[off] &= !layout::FLAG_ROOT_BIT;
        }
    }

    pub fn set_count(&mut self, count: u16) {
        let off = layout::count_offset(self.layout.header);
        self.buf[off..off + 2].copy_from_slice(&count.to_le_bytes());
    }

    pub fn set_next_leaf(&mut self, id: PageId) {
        let off = layout::next_leaf_offset(self.layout.header);
        self.buf[off..off + 4].copy_from_slice(&id.to_le_bytes());
    }

    pub fn set_next_id(&mut self, id: PageId) {
        if self.layout.header == HeaderLayout::Chained {
            let off = layout::CHAINED_NEXT_ID;
            self.buf[off..off + 4].copy_from_slice(&id.to_le_bytes());
        }
    }

    pub fn set_key(&mut self, i: usize, key: &[u8]) {
        let is_leaf = self.is_leaf();
        let off = if is_leaf {
            self.layout.leaf_record_offset(i)
        } else {
            self.layout.interior_key_offset(i)
        };
        let size = self.layout.key_size;
        self.buf[off..off + size].copy_from_slice(key);
    }

    pub fn set_data(&mut self, i: usize, data: &[u8]) {
        let off = self.layout.leaf_record_offset(i) + self.layout.key_size;
        self.buf[off..off + self.layout.data_size].copy_from_slice(data);
    }

    pub fn set_child(&mut self, i: usize, pid: PageId) {
        let off = self.layout.interior_pointer_offset(i);
        self.buf[off..off + 4].copy_from_slice(&pid.to_le_bytes());
    }

    /// Inserts a leaf record at slot `i`, shifting later records right.
    pub fn insert_leaf_record(&mut self, i: usize, key: &[u8], data: &[u8]) {
        let n = self.count() as usize;
        let record_size = self.layout.key_size + self.layout.data_size;
        let base = self.layout.leaf_records_offset;
        if i < n {
            let src_start = base + i * record_size;
            let src_end = base + n * record_size;
            self.buf.copy_within(src_start..src_end, src_start + record_size);
        }
        self.set_count(n as u16 + 1);
        self.set_key(i, key);
        self.set_data(i, data);
    }

    pub fn remove_leaf_record(&mut self, i: usize) {
        let n = self.count() as usize;
        let record_size = self.layout.key_size + self.layout.data_size;
        let base = self.layout.leaf_records_offset;
        if i + 1 < n {
            let dst_start = base + i * record_size;
            let src_start = base + (i + 1) * record_size;
            let src_end = base + n * record_size;
            self.buf.copy_within(src_start..src_end, dst_start);
        }
        self.set_count(n as u16 - 1);
    }

    /// Inserts interior key `i` and the child pointer that follows it
    /// (at index `i + 1`), shifting later keys and pointers right.
    pub fn insert_interior_key_child(&mut self, i: usize, key: &[u8], right_child: PageId) {
        let n = self.count() as usize;
        let key_size = self.layout.key_size;

        let keys_start = self.layout.interior_key_offset(i);
        let keys_end = self.layout.interior_key_offset(n);
        if i < n {
            self.buf.copy_within(keys_start..keys_end, keys_start + key_size);
        }
        self.set_count(n as u16 + 1);
        self.set_key(i, key);

        let ptr_start = self.layout.interior_pointer_offset(i + 1);
        let ptr_end = self.layout.interior_pointer_offset(n + 1);
        if i + 1 <= n {
            self.buf.copy_within(ptr_start..ptr_end, ptr_start + 4);
        }
        self.set_child(i + 1, right_child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Config;

    fn layout_for(cfg: &Config) -> NodeLayout {
        NodeLayout::from_config(cfg)
    }

    #[test]
    fn initialize_sets_leaf_and_root_flags() {
        let cfg = Config::variant_a(256, 4, 4, 4);
        let layout = layout_for(&cfg);
        let mut buf = vec![0u8; 256];
        let mut node = NodeViewMut::new(&mut buf, layout);
        node.initialize(7, true, true);
        assert_eq!(node.page_id(), 7);
        assert!(node.is_leaf());
        assert!(node.is_root());
        assert_eq!(node.count(), 0);
    }

    #[test]
    fn leaf_insert_and_search_roundtrip() {
        let mut cfg = Config::variant_a(256, 4, 4, 4);
        cfg.fanout_override = Some((5, 4));
        let layout = layout_for(&cfg);
        let mut buf = vec![0u8; 256];
        let mut node = NodeViewMut::new(&mut buf, layout);
        node.initialize(0, true, false);

        // Keys are compared as raw bytes, so integer keys are encoded
        // big-endian to keep byte order and numeric order in agreement.
        node.insert_leaf_record(0, &10u32.to_be_bytes(), &1u32.to_le_bytes());
        node.insert_leaf_record(1, &30u32.to_be_bytes(), &3u32.to_le_bytes());
        node.insert_leaf_record(1, &20u32.to_be_bytes(), &2u32.to_le_bytes());

        assert_eq!(node.count(), 3);
        assert_eq!(node.key(0), 10u32.to_be_bytes());
        assert_eq!(node.key(1), 20u32.to_be_bytes());
        assert_eq!(node.key(2), 30u32.to_be_bytes());
        assert_eq!(node.binary_search(&20u32.to_be_bytes()), Ok(1));
        assert_eq!(node.binary_search(&25u32.to_be_bytes()), Err(2));
    }

    #[test]
    fn interior_insert_key_child_shifts_correctly() {
        let mut cfg = Config::variant_a(256, 4, 4, 4);
        cfg.fanout_override = Some((5, 4));
        let layout = layout_for(&cfg);
        let mut buf = vec![0u8; 256];
        let mut node = NodeViewMut::new(&mut buf, layout);
        node.initialize(1, false, false);
        node.set_child(0, 100);

        node.insert_interior_key_child(0, &50u32.to_le_bytes(), 101);
        node.insert_interior_key_child(1, &80u32.to_le_bytes(), 102);

        assert_eq!(node.count(), 2);
        assert_eq!(node.child(0), 100);
        assert_eq!(node.child(1), 101);
        assert_eq!(node.child(2), 102);
    }
}
