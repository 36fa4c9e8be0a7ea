//! Byte-offset geometry for a node page: where the header ends, where the
//! leaf record array or the interior keys/pointers regions begin, and how
//! many entries each region holds.
//!
//! Grounded in the teacher's `storage-engine::index::metadata::compute_fanout`,
//! generalized from the teacher's fixed key/row sizes to `Config`'s
//! runtime-configured `key_size`/`data_size`, and extended with a second
//! header shape for `Variant::B` (see `node.rs`).

use common::{Config, Variant};

/// Which header shape a page uses. `Compact` is used under `Variant::A`;
/// `Chained` adds the fields `Variant::B` needs (a write-order sequence
/// number for recovery, and a `nextId` forward-chain pointer for deferred
/// remap-table spill).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayout {
    Compact,
    Chained,
}

impl HeaderLayout {
    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::A => HeaderLayout::Compact,
            Variant::B => HeaderLayout::Chained,
        }
    }

    /// Header length in bytes.
    pub fn header_len(self) -> usize {
        match self {
            HeaderLayout::Compact => COMPACT_NEXT_LEAF + 4,
            HeaderLayout::Chained => CHAINED_NEXT_LEAF + 4,
        }
    }
}

pub const PAGE_ID: usize = common::header::PAGE_ID_FIELD; // 0, 4 bytes, both layouts

// Compact (Variant A): pageId(4) flags(1) count(2) nextLeaf(4) = 11 bytes
pub const COMPACT_FLAGS: usize = 4;
pub const COMPACT_COUNT: usize = 5;
pub const COMPACT_NEXT_LEAF: usize = 7;

// Chained (Variant B): pageId(4) writeSeq(8) flags(1) count(2) nextId(4) nextLeaf(4) = 23 bytes
pub const CHAINED_WRITE_SEQ: usize = common::header::WRITE_SEQ_FIELD; // 4, 8 bytes
pub const CHAINED_FLAGS: usize = 12;
pub const CHAINED_COUNT: usize = 13;
pub const CHAINED_NEXT_ID: usize = 15;
pub const CHAINED_NEXT_LEAF: usize = 19;

const FLAG_IS_LEAF: u8 = 0b01;
const FLAG_IS_ROOT: u8 = 0b10;

pub(crate) fn flags_offset(layout: HeaderLayout) -> usize {
    match layout {
        HeaderLayout::Compact => COMPACT_FLAGS,
        HeaderLayout::Chained => CHAINED_FLAGS,
    }
}

pub(crate) fn count_offset(layout: HeaderLayout) -> usize {
    match layout {
        HeaderLayout::Compact => COMPACT_COUNT,
        HeaderLayout::Chained => CHAINED_COUNT,
    }
}

pub(crate) fn next_leaf_offset(layout: HeaderLayout) -> usize {
    match layout {
        HeaderLayout::Compact => COMPACT_NEXT_LEAF,
        HeaderLayout::Chained => CHAINED_NEXT_LEAF,
    }
}

pub(crate) const FLAG_LEAF_BIT: u8 = FLAG_IS_LEAF;
pub(crate) const FLAG_ROOT_BIT: u8 = FLAG_IS_ROOT;

/// Fixed per-page geometry, computed once from `Config` and shared by every
/// node of a tree.
#[derive(Debug, Clone, Copy)]
pub struct NodeLayout {
    pub header: HeaderLayout,
    pub page_size: usize,
    pub key_size: usize,
    pub data_size: usize,
    pub max_leaf_records: u16,
    pub max_interior_keys: u16,
    pub leaf_records_offset: usize,
    pub interior_keys_offset: usize,
    pub interior_pointers_offset: usize,
}

const PAGE_ID_SIZE: usize = 4;

impl NodeLayout {
    pub fn from_config(config: &Config) -> Self {
        let header = HeaderLayout::for_variant(config.variant);
        let header_len = header.header_len();
        let record_size = config.record_size();

        let (max_leaf_records, max_interior_keys) = match config.fanout_override {
            Some((leaf, interior)) => (leaf, interior),
            None => {
                let leaf = (config.page_size.saturating_sub(header_len)) / record_size;
                // Size the interior region for `n` keys and `n + 1`
                // pointers regardless of current fill, per the design note
                // that interior pages never shrink their key/pointer
                // regions based on occupancy.
                let denom = config.key_size + PAGE_ID_SIZE;
                let interior = (config.page_size.saturating_sub(header_len + PAGE_ID_SIZE)) / denom;
                (leaf.max(1) as u16, interior.max(1) as u16)
            }
        };

        Self {
            header,
            page_size: config.page_size,
            key_size: config.key_size,
            data_size: config.data_size,
            max_leaf_records,
            max_interior_keys,
            leaf_records_offset: header_len,
            interior_keys_offset: header_len,
            interior_pointers_offset: header_len + max_interior_keys as usize * config.key_size,
        }
    }

    pub fn leaf_record_offset(&self, i: usize) -> usize {
        self.leaf_records_offset + i * (self.key_size + self.data_size)
    }

    pub fn interior_key_offset(&self, i: usize) -> usize {
        self.interior_keys_offset + i * self.key_size
    }

    pub fn interior_pointer_offset(&self, i: usize) -> usize {
        self.interior_pointers_offset + i * PAGE_ID_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fanout_fits_within_page_size() {
        let cfg = Config::variant_a(256, 4, 4, 4);
        let layout = NodeLayout::from_config(&cfg);
        let leaf_bytes = layout.leaf_records_offset + layout.max_leaf_records as usize * (4 + 4);
        assert!(leaf_bytes <= 256);
        let interior_bytes = layout.interior_pointer_offset(layout.max_interior_keys as usize + 1);
        assert!(interior_bytes <= 256);
    }

    #[test]
    fn fanout_override_is_used_verbatim() {
        let mut cfg = Config::variant_a(4096, 4, 4, 4);
        cfg.fanout_override = Some((5, 4));
        let layout = NodeLayout::from_config(&cfg);
        assert_eq!(layout.max_leaf_records, 5);
        assert_eq!(layout.max_interior_keys, 4);
    }
}
