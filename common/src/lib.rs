//! Shared types for the embedded B-tree workspace: page ids, the public
//! error type, and the init-time `Config` that every other crate is built
//! against.

use std::fmt;

/// Physical or logical page identifier.
///
/// Mirrors `original_source/btree.h`'s `id_t` (a `uint32_t`), kept as a
/// plain `u32` rather than `usize` so the on-disk header width is
/// independent of the host's pointer size.
pub type PageId = u32;

/// Sentinel meaning "no page" (end of a leaf chain, empty child slot,
/// absent remap target). Chosen as `u32::MAX` rather than `0` because,
/// unlike the teacher repo, physical page `0` is reserved for the metadata
/// page and is itself a page id every tree actually uses — see `DESIGN.md`.
pub const INVALID_PAGE_ID: PageId = PageId::MAX;

/// Which storage backend variant a `Config` targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Overwrite-capable storage: pages may be rewritten in place.
    A,
    /// Append-only / erase-block flash: pages are immutable once written.
    B,
}

/// Compile/init-time configuration for the tree, buffer manager, and node
/// layout. No environment variables and no CLI parsing touch this type —
/// callers construct it directly.
#[derive(Debug, Clone)]
pub struct Config {
    /// Size in bytes of one page, including its header.
    pub page_size: usize,
    /// Number of in-memory buffer frames the `BufferManager` may hold.
    pub num_buffer_frames: usize,
    /// Fixed size in bytes of a key.
    pub key_size: usize,
    /// Fixed size in bytes of a data payload.
    pub data_size: usize,
    /// Which storage backend this configuration targets.
    pub variant: Variant,
    /// Erase block size in pages. Required (and only meaningful) for
    /// `Variant::B`.
    pub erase_block_pages: usize,
    /// Capacity of the in-RAM remap table. Only meaningful for `Variant::B`.
    pub max_mappings: usize,
    /// Last usable physical page in the device's data region (inclusive).
    /// Only meaningful for `Variant::B`, where it bounds the write
    /// frontier's wrap point.
    pub end_data_page: PageId,
    /// Maximum tree depth (levels). Defaults to 8, matching
    /// `original_source/btree.h`'s `MAX_LEVEL`.
    pub max_depth: usize,
    /// Test-only override for `(max_leaf_records, max_interior_keys)`,
    /// bypassing the page-size-derived fanout calculation. The reference
    /// test suite pins this to `(5, 4)` regardless of `page_size`, mirroring
    /// `original_source/btree.c`'s hard-coded testing block.
    pub fanout_override: Option<(u16, u16)>,
}

impl Config {
    /// A reasonable default for `Variant::A` deployments.
    pub fn variant_a(page_size: usize, num_buffer_frames: usize, key_size: usize, data_size: usize) -> Self {
        Self {
            page_size,
            num_buffer_frames,
            key_size,
            data_size,
            variant: Variant::A,
            erase_block_pages: 0,
            max_mappings: 0,
            end_data_page: 0,
            max_depth: 8,
            fanout_override: None,
        }
    }

    /// A reasonable default for `Variant::B` deployments.
    pub fn variant_b(
        page_size: usize,
        num_buffer_frames: usize,
        key_size: usize,
        data_size: usize,
        erase_block_pages: usize,
        max_mappings: usize,
        end_data_page: PageId,
    ) -> Self {
        Self {
            page_size,
            num_buffer_frames,
            key_size,
            data_size,
            variant: Variant::B,
            erase_block_pages,
            max_mappings,
            end_data_page,
            max_depth: 8,
            fanout_override: None,
        }
    }

    /// Record size for a leaf entry: `key_size + data_size`.
    pub fn record_size(&self) -> usize {
        self.key_size + self.data_size
    }
}

/// Errors surfaced across the public API boundary, per spec.md §7.
///
/// `remapFull` is deliberately absent: it is recovered internally by the
/// buffer manager (spilling the mapping into the prior page's `nextId`
/// field) and never reaches a caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The tree has reached its configured capacity cutoff.
    #[error("storage is at capacity")]
    StorageFull,
    /// The underlying block device failed a read, write, or erase.
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// `get` found no record for the given key.
    #[error("key not found")]
    NotFound,
    /// An iterator has been exhausted or has passed its `maxKey`.
    #[error("iterator exhausted")]
    IterEnd,
    /// The tree exceeded `Config::max_depth` levels.
    #[error("tree exceeded maximum depth")]
    TooDeep,
    /// A node invariant was violated; only raised by `Tree::validate`.
    #[error("tree invariant violated: {0}")]
    InvariantViolation(String),
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::A => write!(f, "A (overwrite)"),
            Variant::B => write!(f, "B (append-only)"),
        }
    }
}

/// Fixed byte offsets shared by both page layouts, so a layer that only
/// needs to touch the page id or write sequence (the buffer manager, during
/// relocation) doesn't need to know the rest of the header shape.
///
/// Grounded in `original_source/dbbuffer.c`'s `writePageDirect`, which
/// stamps a page id into the first four bytes of a page unconditionally,
/// whichever node type (leaf or interior) is underneath.
pub mod header {
    use crate::PageId;

    /// Every page's self-identifying physical page id: 4 bytes, offset 0.
    pub const PAGE_ID_FIELD: usize = 0;
    /// Variant B only: a monotonic write-order counter stamped on every
    /// write, letting recovery find the most recently written root even
    /// after the physical address space has wrapped and been reused.
    pub const WRITE_SEQ_FIELD: usize = 4;

    pub fn stamp_page_id(buf: &mut [u8], id: PageId) {
        buf[PAGE_ID_FIELD..PAGE_ID_FIELD + 4].copy_from_slice(&id.to_le_bytes());
    }

    pub fn read_page_id(buf: &[u8]) -> PageId {
        PageId::from_le_bytes(buf[PAGE_ID_FIELD..PAGE_ID_FIELD + 4].try_into().unwrap())
    }

    pub fn stamp_write_seq(buf: &mut [u8], seq: u64) {
        buf[WRITE_SEQ_FIELD..WRITE_SEQ_FIELD + 8].copy_from_slice(&seq.to_le_bytes());
    }

    pub fn read_write_seq(buf: &[u8]) -> u64 {
        u64::from_le_bytes(buf[WRITE_SEQ_FIELD..WRITE_SEQ_FIELD + 8].try_into().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_size_sums_key_and_data() {
        let cfg = Config::variant_a(4096, 3, 4, 8);
        assert_eq!(cfg.record_size(), 12);
    }

    #[test]
    fn invalid_page_id_is_not_zero() {
        // Page 0 is the metadata page, not a sentinel, in this design.
        assert_ne!(INVALID_PAGE_ID, 0);
    }
}
