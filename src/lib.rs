//! Public facade over the workspace: a `Tree` that owns a `BlockDevice` and
//! a detached `Cursor` for range iteration, matching the external surface
//! the lower crates were built to support.
//!
//! `btree-core::Tree` already implements everything here; this crate exists
//! so callers depend on one package rather than wiring `common` /
//! `block-device` / `buffer-manager` / `btree-core` together themselves —
//! the same role the teacher's root package plays over its own `common` /
//! `buffer_pool_manager` / `storage` crates, minus the teacher's `main.rs`
//! demo binary (this crate ships as a library only).

pub use block_device::{BlockDevice, DeviceError, DeviceResult, FileBlockDevice, MemBlockDevice};
pub use common::{Config, Error, PageId, Result, Variant, INVALID_PAGE_ID};

/// An open B-tree index over some `BlockDevice`.
///
/// Thin wrapper around `btree_core::Tree`, reshaping two methods to the
/// external interface: `get` writes into a caller-supplied buffer instead
/// of allocating, and range iteration is a detached `Cursor` rather than a
/// borrowing `Iterator`, so a caller can interleave `put`/`get` calls with
/// cursor steps instead of holding a live borrow across the whole scan.
pub struct Tree<D: BlockDevice>(btree_core::Tree<D>);

impl<D: BlockDevice> Tree<D> {
    /// Creates a fresh tree: a metadata page and a single empty root leaf.
    pub fn init(config: &Config, device: D) -> Result<Self> {
        Ok(Self(btree_core::Tree::init(config, device)?))
    }

    /// Opens a tree previously created by `init`, reconstructing its shape
    /// from the metadata page rather than trusting the caller's `Config`.
    pub fn open(config: &Config, device: D) -> Result<Self> {
        Ok(Self(btree_core::Tree::open(config, device)?))
    }

    /// Inserts `key` / `data`. A duplicate key is appended after any existing
    /// records sharing that key rather than overwriting them; `get` returns
    /// the first (oldest) value inserted under a key, and a range scan
    /// yields every duplicate in insertion order.
    pub fn put(&mut self, key: &[u8], data: &[u8]) -> Result<()> {
        self.0.put(key, data)
    }

    /// Looks up `key`, copying its data payload into `out`. `out` must be
    /// exactly `data_size` bytes long. Returns `Error::NotFound` if `key`
    /// isn't present.
    pub fn get(&mut self, key: &[u8], out: &mut [u8]) -> Result<()> {
        let data = self.0.get(key)?;
        debug_assert_eq!(out.len(), data.len(), "out buffer must match the tree's data_size");
        out.copy_from_slice(&data);
        Ok(())
    }

    /// Opens a cursor over `[min_key, max_key]` (either bound may be
    /// unbounded), positioned before the first matching record.
    pub fn iterate(&mut self, min_key: Option<&[u8]>, max_key: Option<&[u8]>) -> Result<Cursor> {
        let leaf = match min_key {
            Some(key) => self.0.leaf_for_key(key)?,
            None => self.0.leftmost_leaf()?,
        };
        Ok(Cursor { leaf, slot: 0, max_key: max_key.map(|k| k.to_vec()), done: false })
    }

    /// Runs the structural self-check (sorted keys, correct children
    /// counts, an ordered leaf chain).
    pub fn validate(&mut self) -> Result<()> {
        self.0.validate()
    }

    pub fn stats(&self) -> buffer_manager::Stats {
        self.0.stats()
    }

    pub fn root_page_id(&self) -> PageId {
        self.0.root_page_id()
    }

    /// Consumes the tree. Every write already lands on the device
    /// synchronously, so there's no flush to perform; this exists so
    /// callers have an explicit point to drop the underlying device (e.g.
    /// closing a file) rather than relying on an implicit `Drop`.
    pub fn close(self) -> Result<()> {
        Ok(())
    }
}

/// A detached cursor over a key range, produced by `Tree::iterate`.
///
/// Unlike a Rust `Iterator`, `Cursor` doesn't borrow the `Tree` between
/// calls to `next` — it carries only its own position (current leaf, slot,
/// upper bound), and the caller passes the tree back in on each step. That
/// lets a caller freely interleave `put`/`get` with cursor steps, which a
/// `&'a mut Tree`-borrowing iterator (see `btree_core::RangeIter`, used
/// internally) cannot allow.
pub struct Cursor {
    leaf: PageId,
    slot: usize,
    max_key: Option<Vec<u8>>,
    done: bool,
}

impl Cursor {
    /// Advances to the next record in range, or `None` once the cursor is
    /// exhausted or has passed `max_key`.
    pub fn next<D: BlockDevice>(&mut self, tree: &mut Tree<D>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if self.done {
            return Ok(None);
        }
        loop {
            match tree.0.read_leaf_slot(self.leaf, self.slot)? {
                Some((key, data)) => {
                    if let Some(max) = &self.max_key {
                        if &key > max {
                            self.done = true;
                            return Ok(None);
                        }
                    }
                    self.slot += 1;
                    return Ok(Some((key, data)));
                }
                None => {
                    let next = tree.0.next_leaf_of(self.leaf)?;
                    if next == INVALID_PAGE_ID {
                        self.done = true;
                        return Ok(None);
                    }
                    self.leaf = next;
                    self.slot = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        let mut c = Config::variant_a(256, 4, 4, 4);
        c.fanout_override = Some((5, 4));
        c
    }

    #[test]
    fn put_get_roundtrip() {
        let dev = MemBlockDevice::new(256);
        let mut tree = Tree::init(&cfg(), dev).unwrap();
        tree.put(&10u32.to_be_bytes(), &99u32.to_le_bytes()).unwrap();

        let mut out = [0u8; 4];
        tree.get(&10u32.to_be_bytes(), &mut out).unwrap();
        assert_eq!(out, 99u32.to_le_bytes());
    }

    #[test]
    fn get_missing_key_is_not_found() {
        let dev = MemBlockDevice::new(256);
        let mut tree = Tree::init(&cfg(), dev).unwrap();
        let mut out = [0u8; 4];
        let err = tree.get(&1u32.to_be_bytes(), &mut out).unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[test]
    fn cursor_yields_keys_in_order_across_a_split() {
        let dev = MemBlockDevice::new(256);
        let mut tree = Tree::init(&cfg(), dev).unwrap();
        for k in [30u32, 10, 20, 40, 5, 25] {
            tree.put(&k.to_be_bytes(), &k.to_le_bytes()).unwrap();
        }

        let mut cursor = tree.iterate(None, None).unwrap();
        let mut seen = Vec::new();
        while let Some((key, _)) = cursor.next(&mut tree).unwrap() {
            seen.push(u32::from_be_bytes(key.try_into().unwrap()));
        }
        assert_eq!(seen, vec![5, 10, 20, 25, 30, 40]);
    }

    #[test]
    fn cursor_respects_max_key() {
        let dev = MemBlockDevice::new(256);
        let mut tree = Tree::init(&cfg(), dev).unwrap();
        for k in [10u32, 20, 30, 40] {
            tree.put(&k.to_be_bytes(), &k.to_le_bytes()).unwrap();
        }

        let max = 25u32.to_be_bytes();
        let mut cursor = tree.iterate(None, Some(&max)).unwrap();
        let mut seen = Vec::new();
        while let Some((key, _)) = cursor.next(&mut tree).unwrap() {
            seen.push(u32::from_be_bytes(key.try_into().unwrap()));
        }
        assert_eq!(seen, vec![10, 20]);
    }

    #[test]
    fn reopen_recovers_root_and_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.db");
        let c = cfg();
        {
            let dev = FileBlockDevice::open(&path, c.page_size).unwrap();
            let mut tree = Tree::init(&c, dev).unwrap();
            for k in 0u32..20 {
                tree.put(&k.to_be_bytes(), &k.to_le_bytes()).unwrap();
            }
            tree.close().unwrap();
        }
        {
            let dev = FileBlockDevice::open(&path, c.page_size).unwrap();
            let mut tree = Tree::open(&c, dev).unwrap();
            let mut out = [0u8; 4];
            tree.get(&7u32.to_be_bytes(), &mut out).unwrap();
            assert_eq!(out, 7u32.to_le_bytes());
            tree.validate().unwrap();
        }
    }
}
