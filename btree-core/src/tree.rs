//! The tree itself: init/open, point lookup, insert with the recursive
//! split/promote cascade, and the validity oracle the recycler calls back
//! into under `Variant::B`.
//!
//! The split/promote cascade is grounded in `original_source/btree.c`'s
//! `btreePut` — the teacher's own `storage-engine::index::bptree::insert_into_parent`
//! stops short of this (it returns "Parent split not yet implemented"), so
//! the recursive-split shape here follows the C source instead, expressed
//! as an explicit path stack rather than C's recursive call frames.

use crate::layout::{self, NodeLayout};
use crate::node::{NodeView, NodeViewMut};
use buffer_manager::recycler::{self, RecyclerClient, ValidityProbe};
use buffer_manager::remap::RemapTable;
use buffer_manager::BufferManager;
use common::{Config, Error, PageId, Result, Variant, INVALID_PAGE_ID};

/// Frame reserved as scratch space by the buffer manager's own contract.
/// Used both for short-lived probes that never need to survive a call into
/// the buffer manager (`resolve_chain`, `is_valid`, `relocate`) and, by
/// every node-building call site in this module, to stage a freshly built
/// page before it's written out — `write_fresh` snapshots and restores this
/// frame around any reclaim pass precisely because the latter use can
/// otherwise collide with the former.
const SCRATCH_FRAME: usize = 0;

/// Resolves `pid` to wherever its data actually lives now: an in-memory
/// remap-table hit is the fast path; when the table has no entry it may
/// still be that `pid` was relocated and the mapping spilled into the
/// page's own `nextId` field (`record_remap`'s fallback when the table is
/// full), so the page at `pid` is read and the forward chain followed
/// until a page reports no successor.
///
/// Grounded in spec.md §4.2's "node-chase": "a chained read follows
/// `nextId` forward until the sentinel is hit".
fn resolve_chain<D: block_device::BlockDevice>(
    bm: &mut BufferManager<D>,
    remap: &RemapTable,
    layout: NodeLayout,
    pid: PageId,
) -> Result<PageId> {
    if let Some(current) = remap.lookup(pid) {
        return Ok(current);
    }
    let mut cur = pid;
    loop {
        bm.read_into(cur, SCRATCH_FRAME)?;
        let next = NodeView::new(bm.frame(SCRATCH_FRAME), layout).next_id();
        if next == INVALID_PAGE_ID {
            return Ok(cur);
        }
        cur = next;
    }
}

/// Everything about a tree's shape and recovery bookkeeping that isn't the
/// buffer manager itself. Split out from `Tree` so the recycler's
/// callbacks can borrow this and the buffer manager as two disjoint
/// fields of the same struct, rather than needing `&mut self` on a type
/// that also owns the buffer manager.
struct TreeState {
    layout: NodeLayout,
    root_page_id: PageId,
    levels: usize,
    remap: RemapTable,
    max_depth: usize,
    variant: Variant,
    /// Count of node pages currently in the tree, tracked so `put` can
    /// enforce the `Variant::B` capacity cutoff (spec.md §4.4): every split
    /// or new-root write that creates a genuinely new node (as opposed to
    /// relocating an existing one to a new physical address) increments
    /// this. Unused under `Variant::A`, which has no `end_data_page`.
    num_nodes: usize,
    /// Last usable physical page for `Variant::B`, copied from `Config` so
    /// the capacity cutoff can be checked without reaching into the buffer
    /// manager. Unused under `Variant::A`.
    end_data_page: PageId,
}

impl<D: block_device::BlockDevice> RecyclerClient<D> for TreeState {
    fn is_valid(&mut self, bm: &mut BufferManager<D>, pid: PageId) -> Result<ValidityProbe> {
        if let Some(current) = self.remap.lookup(pid) {
            return Ok(ValidityProbe::RemappedOnly { current });
        }

        bm.read_into(pid, SCRATCH_FRAME)?;
        let min_key = {
            let view = NodeView::new(bm.frame(SCRATCH_FRAME), self.layout);
            if view.count() == 0 {
                return Ok(ValidityProbe::Dead);
            }
            view.key(0).to_vec()
        };

        let mut cur = self.root_page_id;
        loop {
            let resolved = resolve_chain(bm, &self.remap, self.layout, cur)?;
            if resolved == pid {
                return Ok(ValidityProbe::Live);
            }
            bm.read_into(resolved, SCRATCH_FRAME)?;
            let view = NodeView::new(bm.frame(SCRATCH_FRAME), self.layout);
            if view.is_leaf() {
                return Ok(ValidityProbe::Dead);
            }
            let idx = match view.binary_search(&min_key) {
                Ok(i) => i + 1,
                Err(i) => i,
            };
            cur = view.child(idx);
        }
    }

    fn relocate(&mut self, bm: &mut BufferManager<D>, prior: PageId, new_pid: PageId) -> Result<()> {
        bm.read_into(prior, SCRATCH_FRAME)?;
        {
            let mut view = NodeViewMut::new(bm.frame_mut(SCRATCH_FRAME), self.layout);
            view.set_page_id(new_pid);
            if !view.is_leaf() {
                repair_children(&mut view, &mut self.remap);
            }
        }
        bm.write_physical_at(SCRATCH_FRAME, new_pid)?;
        record_remap(bm, &mut self.remap, prior, new_pid)?;
        Ok(())
    }
}

/// Resolves every child slot of an interior node through the remap table,
/// patching any slot whose target has moved and forgetting that mapping —
/// the "repair sweep" the remap table's spill behavior depends on.
///
/// Grounded in spec.md's remap table section: "before writing an interior
/// page for any reason, call repairPointers".
fn repair_children(view: &mut NodeViewMut, remap: &mut RemapTable) {
    let n = view.count() as usize;
    for i in 0..=n {
        let child = view.child(i);
        if let Some(current) = remap.lookup(child) {
            view.set_child(i, current);
            remap.remove(child);
        }
    }
}

/// Records that `prior` now lives at `new_pid`, spilling to the page's own
/// `nextId` forward-chain field if the table is already at capacity.
fn record_remap<D: block_device::BlockDevice>(
    bm: &mut BufferManager<D>,
    remap: &mut RemapTable,
    prior: PageId,
    new_pid: PageId,
) -> Result<()> {
    if remap.add(prior, new_pid).is_err() {
        bm.write_bytes(prior, layout::CHAINED_NEXT_ID, &new_pid.to_le_bytes())?;
    }
    Ok(())
}

/// The embedded B-tree: point lookups, inserts, ordered range iteration,
/// and a structural self-check.
pub struct Tree<D: block_device::BlockDevice> {
    bm: BufferManager<D>,
    state: TreeState,
}

/// Result of writing a single node during insert: `None` if it fit without
/// splitting, `Some` carrying the new sibling's page id and the separator
/// key to promote into the parent otherwise.
struct SplitResult {
    sibling_pid: PageId,
    separator: Vec<u8>,
}

impl<D: block_device::BlockDevice> Tree<D> {
    /// Creates a fresh tree: a metadata page and a single empty root leaf.
    pub fn init(config: &Config, device: D) -> Result<Self> {
        let layout = NodeLayout::from_config(config);
        let mut bm = BufferManager::new(config, device);

        {
            let mut view = NodeViewMut::new(bm.frame_mut(SCRATCH_FRAME), layout);
            view.initialize(0, true, true);
        }
        let root_pid = write_fresh(&mut bm, &mut trivial_state(config, layout), SCRATCH_FRAME)?;
        bm.set_root_hint(root_pid);

        let metadata = crate::metadata::Metadata {
            root_page_id: root_pid,
            variant: config.variant,
            key_size: config.key_size as u16,
            data_size: config.data_size as u16,
            max_leaf_records: layout.max_leaf_records,
            max_interior_keys: layout.max_interior_keys,
        };
        let mut meta_buf = vec![0u8; config.page_size];
        metadata.serialize(&mut meta_buf);
        bm.frame_mut(SCRATCH_FRAME)[..meta_buf.len()].copy_from_slice(&meta_buf);
        bm.write_raw_at(SCRATCH_FRAME, crate::metadata::METADATA_PAGE_ID)?;

        let state = TreeState {
            layout,
            root_page_id: root_pid,
            levels: 1,
            remap: RemapTable::new(config.max_mappings),
            max_depth: config.max_depth,
            variant: config.variant,
            num_nodes: 1,
            end_data_page: config.end_data_page,
        };
        Ok(Self { bm, state })
    }

    /// Opens a tree previously created by `init`, reading the root page id
    /// back from the metadata page.
    pub fn open(config: &Config, device: D) -> Result<Self> {
        let layout = NodeLayout::from_config(config);
        let mut bm = BufferManager::new(config, device);
        bm.read_into(crate::metadata::METADATA_PAGE_ID, SCRATCH_FRAME)?;
        let metadata = crate::metadata::Metadata::deserialize(bm.frame(SCRATCH_FRAME));
        bm.set_root_hint(metadata.root_page_id);

        let empty_remap = RemapTable::new(config.max_mappings);
        let num_nodes = if config.variant == Variant::B {
            count_nodes(&mut bm, &empty_remap, layout, metadata.root_page_id)?
        } else {
            0
        };
        let state = TreeState {
            layout,
            root_page_id: metadata.root_page_id,
            levels: count_levels(&mut bm, layout, metadata.root_page_id)?,
            remap: empty_remap,
            max_depth: config.max_depth,
            variant: config.variant,
            num_nodes,
            end_data_page: config.end_data_page,
        };
        Ok(Self { bm, state })
    }

    pub fn root_page_id(&self) -> PageId {
        self.state.root_page_id
    }

    pub fn stats(&self) -> buffer_manager::Stats {
        self.bm.stats()
    }

    /// Point lookup. Returns `Error::NotFound` if no record has this key.
    pub fn get(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        let leaf_pid = self.descend_to_leaf(key, None)?.1;
        let frame = self.bm.read(leaf_pid)?;
        let view = NodeView::new(self.bm.frame(frame), self.state.layout);
        match view.binary_search(key) {
            Ok(i) => Ok(view.data(i).to_vec()),
            Err(_) => Err(Error::NotFound),
        }
    }

    /// Inserts `key` / `data`. A duplicate key is appended after the run of
    /// existing records sharing that key rather than overwriting any of
    /// them — `get` returns the first (oldest) value inserted under a key,
    /// and a range scan yields every duplicate in insertion order.
    /// Triggers the split/promote cascade when a node overflows. Returns
    /// `Error::StorageFull` once the tree has grown past its configured
    /// capacity cutoff (`Variant::B` only).
    pub fn put(&mut self, key: &[u8], data: &[u8]) -> Result<()> {
        if self.state.variant == Variant::B && (self.state.num_nodes as u64) * 2 >= self.state.end_data_page as u64 {
            return Err(Error::StorageFull);
        }

        let mut path = Vec::new();
        let (_, leaf_pid) = self.descend_to_leaf(key, Some(&mut path))?;

        let frame = self.bm.read(leaf_pid)?;
        let insert_at = {
            let view = NodeView::new(self.bm.frame(frame), self.state.layout);
            match view.binary_search(key) {
                Ok(first_match) => {
                    let n = view.count() as usize;
                    let mut j = first_match;
                    while j < n && view.key(j) == key {
                        j += 1;
                    }
                    j
                }
                Err(i) => i,
            }
        };
        let full = (self.bm_frame_count(frame) as usize) >= self.state.layout.max_leaf_records as usize;

        let mut split = None;
        if full {
            split = Some(self.split_leaf_and_insert(frame, insert_at, key, data)?);
        } else {
            let mut view = NodeViewMut::new(self.bm.frame_mut(frame), self.state.layout);
            view.insert_leaf_record(insert_at, key, data);
        }

        let new_leaf_pid = self.persist_existing(frame, leaf_pid)?;
        self.fix_up_path(&mut path, leaf_pid, new_leaf_pid);

        let mut pending = split;

        while let Some(s) = pending.take() {
            match path.pop() {
                None => {
                    self.new_root(s.sibling_pid, &s.separator)?;
                }
                Some((parent_pid, child_idx)) => {
                    pending = self.insert_into_parent(parent_pid, child_idx, &s.separator, s.sibling_pid, &mut path)?;
                }
            }
        }
        Ok(())
    }

    /// Walks from the root to the leaf that should contain `key`,
    /// resolving every child pointer through the remap table along the
    /// way. When `path` is `Some`, records `(node_pid, child_index)` for
    /// every interior node descended through, for the split cascade.
    fn descend_to_leaf(
        &mut self,
        key: &[u8],
        mut path: Option<&mut Vec<(PageId, usize)>>,
    ) -> Result<(Vec<PageId>, PageId)> {
        let mut cur = self.resolve(self.state.root_page_id)?;
        let mut visited = vec![cur];
        loop {
            let frame = self.bm.read(cur)?;
            let (is_leaf, idx, child) = {
                let view = NodeView::new(self.bm.frame(frame), self.state.layout);
                if view.is_leaf() {
                    (true, 0, 0)
                } else {
                    let idx = match view.binary_search(key) {
                        Ok(i) => i + 1,
                        Err(i) => i,
                    };
                    (false, idx, view.child(idx))
                }
            };
            if is_leaf {
                return Ok((visited, cur));
            }
            if let Some(p) = path.as_deref_mut() {
                p.push((cur, idx));
            }
            cur = self.resolve(child)?;
            visited.push(cur);
        }
    }

    fn bm_frame_count(&self, frame: usize) -> u16 {
        NodeView::new(self.bm.frame(frame), self.state.layout).count()
    }

    /// Resolves `pid` to its current physical location, chasing the
    /// on-disk `nextId` forward chain when the in-memory remap table has
    /// spilled the mapping. A no-op under `Variant::A`, which never
    /// populates a remap table.
    pub(crate) fn resolve(&mut self, pid: PageId) -> Result<PageId> {
        if self.state.variant == Variant::B {
            resolve_chain(&mut self.bm, &self.state.remap, self.state.layout, pid)
        } else {
            Ok(pid)
        }
    }

    /// Splits a full leaf, inserting the new record into whichever half it
    /// belongs in, and writes both halves out.
    fn split_leaf_and_insert(&mut self, frame: usize, insert_at: usize, key: &[u8], data: &[u8]) -> Result<SplitResult> {
        let layout = self.state.layout;
        let (old_pid, mut records, old_next_leaf) = {
            let view = NodeView::new(self.bm.frame(frame), layout);
            let n = view.count() as usize;
            let mut records: Vec<(Vec<u8>, Vec<u8>)> = (0..n).map(|i| (view.key(i).to_vec(), view.data(i).to_vec())).collect();
            records.insert(insert_at, (key.to_vec(), data.to_vec()));
            (view.page_id(), records, view.next_leaf())
        };

        let mid = records.len().div_ceil(2);
        let right: Vec<_> = records.split_off(mid);
        let left = records;
        let separator = right[0].0.clone();

        let new_pid_placeholder = INVALID_PAGE_ID;
        {
            let mut view = NodeViewMut::new(self.bm.frame_mut(frame), layout);
            view.initialize(old_pid, true, false);
            for (i, (k, d)) in left.iter().enumerate() {
                view.insert_leaf_record(i, k, d);
            }
            view.set_next_leaf(new_pid_placeholder);
        }

        bm_load_scratch_zero(&mut self.bm);
        {
            let mut view = NodeViewMut::new(self.bm.frame_mut(SCRATCH_FRAME), layout);
            view.initialize(0, true, false);
            for (i, (k, d)) in right.iter().enumerate() {
                view.insert_leaf_record(i, k, d);
            }
            view.set_next_leaf(old_next_leaf);
        }
        let new_pid = write_fresh(&mut self.bm, &mut self.state, SCRATCH_FRAME)?;
        self.state.num_nodes += 1;

        {
            let mut view = NodeViewMut::new(self.bm.frame_mut(frame), layout);
            view.set_next_leaf(new_pid);
        }

        Ok(SplitResult { sibling_pid: new_pid, separator })
    }

    /// Inserts `(separator, right_child)` into the interior node at
    /// `parent_pid`, splitting it (and recursing further up through
    /// `path` on the caller's next loop iteration) if it's already full.
    fn insert_into_parent(
        &mut self,
        parent_pid: PageId,
        child_idx: usize,
        separator: &[u8],
        right_child: PageId,
        path: &mut Vec<(PageId, usize)>,
    ) -> Result<Option<SplitResult>> {
        let layout = self.state.layout;
        let frame = self.bm.read(parent_pid)?;
        {
            let mut view = NodeViewMut::new(self.bm.frame_mut(frame), layout);
            repair_children(&mut view, &mut self.state.remap);
        }

        let fits = {
            let view = NodeView::new(self.bm.frame(frame), layout);
            (view.count() as usize) < layout.max_interior_keys as usize
        };

        if fits {
            let mut view = NodeViewMut::new(self.bm.frame_mut(frame), layout);
            view.insert_interior_key_child(child_idx, separator, right_child);
            drop(view);
            let new_pid = self.persist_existing(frame, parent_pid)?;
            self.fix_up_path(path, parent_pid, new_pid);
            return Ok(None);
        }

        if path.len() + 2 > self.state.max_depth {
            return Err(Error::TooDeep);
        }

        // Combine existing keys/children with the new entry, then split,
        // promoting the middle key rather than copying it (interior
        // separators carry no data of their own).
        let (old_pid, mut keys, mut children) = {
            let view = NodeView::new(self.bm.frame(frame), layout);
            let n = view.count() as usize;
            let keys: Vec<Vec<u8>> = (0..n).map(|i| view.key(i).to_vec()).collect();
            let children: Vec<PageId> = (0..=n).map(|i| view.child(i)).collect();
            (view.page_id(), keys, children)
        };
        keys.insert(child_idx, separator.to_vec());
        children.insert(child_idx + 1, right_child);

        let mid = keys.len() / 2;
        let promoted = keys[mid].clone();
        let right_keys = keys.split_off(mid + 1);
        let left_keys = { keys.truncate(mid); keys };
        let right_children = children.split_off(mid + 1);
        let left_children = children;

        {
            let mut view = NodeViewMut::new(self.bm.frame_mut(frame), layout);
            view.initialize(old_pid, false, false);
            view.set_child(0, left_children[0]);
            for (i, k) in left_keys.iter().enumerate() {
                view.insert_interior_key_child(i, k, left_children[i + 1]);
            }
        }

        bm_load_scratch_zero(&mut self.bm);
        {
            let mut view = NodeViewMut::new(self.bm.frame_mut(SCRATCH_FRAME), layout);
            view.initialize(0, false, false);
            view.set_child(0, right_children[0]);
            for (i, k) in right_keys.iter().enumerate() {
                view.insert_interior_key_child(i, k, right_children[i + 1]);
            }
        }
        let new_pid = write_fresh(&mut self.bm, &mut self.state, SCRATCH_FRAME)?;
        self.state.num_nodes += 1;

        let new_left_pid = self.persist_existing(frame, old_pid)?;
        self.fix_up_path(path, parent_pid, new_left_pid);
        Ok(Some(SplitResult { sibling_pid: new_pid, separator: promoted }))
    }

    /// Persists an already-loaded, already-modified existing node,
    /// returning its (possibly new, under `Variant::B`) physical page id.
    fn persist_existing(&mut self, frame: usize, prior_pid: PageId) -> Result<PageId> {
        match self.state.variant {
            Variant::A => {
                self.bm.overwrite(frame, prior_pid)?;
                Ok(prior_pid)
            }
            Variant::B => {
                let new_pid = recycler::write_with_recycle(&mut self.bm, &mut self.state, frame)?;
                record_remap(&mut self.bm, &mut self.state.remap, prior_pid, new_pid)?;
                Ok(new_pid)
            }
        }
    }

    /// Under `Variant::B`, rewriting an existing node changes its address
    /// even though its logical position in `path` doesn't change; keep the
    /// in-flight path consistent for the rest of this `put`.
    fn fix_up_path(&self, path: &mut [(PageId, usize)], old_pid: PageId, new_pid: PageId) {
        if old_pid == new_pid {
            return;
        }
        if self.state.root_page_id == old_pid {
            // handled by the caller via set_root_hint/new_root bookkeeping
        }
        for entry in path.iter_mut() {
            if entry.0 == old_pid {
                entry.0 = new_pid;
            }
        }
    }

    /// Creates a brand new interior root above the current one, after the
    /// root itself split during a `put`.
    fn new_root(&mut self, right_child: PageId, separator: &[u8]) -> Result<()> {
        if self.state.levels + 1 > self.state.max_depth {
            return Err(Error::TooDeep);
        }
        let layout = self.state.layout;
        let old_root = self.state.root_page_id;

        bm_load_scratch_zero(&mut self.bm);
        {
            let mut view = NodeViewMut::new(self.bm.frame_mut(SCRATCH_FRAME), layout);
            view.initialize(0, false, true);
            view.set_child(0, old_root);
            view.insert_interior_key_child(0, separator, right_child);
        }
        let new_root_pid = write_fresh(&mut self.bm, &mut self.state, SCRATCH_FRAME)?;
        self.state.num_nodes += 1;

        self.state.root_page_id = new_root_pid;
        self.state.levels += 1;
        self.bm.set_root_hint(new_root_pid);
        self.rewrite_metadata()?;
        Ok(())
    }

    fn rewrite_metadata(&mut self) -> Result<()> {
        let metadata = crate::metadata::Metadata {
            root_page_id: self.state.root_page_id,
            variant: self.state.variant,
            key_size: self.state.layout.key_size as u16,
            data_size: self.state.layout.data_size as u16,
            max_leaf_records: self.state.layout.max_leaf_records,
            max_interior_keys: self.state.layout.max_interior_keys,
        };
        let page_size = self.state.layout.page_size;
        self.bm.read_into(crate::metadata::METADATA_PAGE_ID, SCRATCH_FRAME)?;
        let mut buf = vec![0u8; page_size];
        metadata.serialize(&mut buf);
        self.bm.frame_mut(SCRATCH_FRAME)[..buf.len()].copy_from_slice(&buf);
        self.bm.write_raw_at(SCRATCH_FRAME, crate::metadata::METADATA_PAGE_ID)
    }

    /// Iterates records with `min_key <= key <= max_key` in ascending
    /// order, following the leaf sibling chain.
    pub fn range<'a>(&'a mut self, min_key: Option<&[u8]>, max_key: Option<&'a [u8]>) -> Result<crate::iterator::RangeIter<'a, D>> {
        let start_leaf = if let Some(min) = min_key {
            self.descend_to_leaf(min, None)?.1
        } else {
            self.leftmost_leaf()?
        };
        crate::iterator::RangeIter::new(self, start_leaf, max_key)
    }

    /// The leaf that should contain `key`, without recording a split path.
    /// Used by a detached cursor that walks the leaf chain one call at a
    /// time rather than holding a live borrow of the tree between calls.
    pub fn leaf_for_key(&mut self, key: &[u8]) -> Result<PageId> {
        Ok(self.descend_to_leaf(key, None)?.1)
    }

    /// The record at `slot` of `leaf`, or `None` if `slot` is past the
    /// node's current record count.
    pub fn read_leaf_slot(&mut self, leaf: PageId, slot: usize) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let frame = self.bm.read(leaf)?;
        let view = NodeView::new(self.bm.frame(frame), self.state.layout);
        if slot >= view.count() as usize {
            return Ok(None);
        }
        Ok(Some((view.key(slot).to_vec(), view.data(slot).to_vec())))
    }

    /// The leaf following `leaf` in sibling order, resolved through the
    /// remap table, or `INVALID_PAGE_ID` at the end of the chain.
    pub fn next_leaf_of(&mut self, leaf: PageId) -> Result<PageId> {
        let frame = self.bm.read(leaf)?;
        let view = NodeView::new(self.bm.frame(frame), self.state.layout);
        let next = view.next_leaf();
        if next == INVALID_PAGE_ID {
            return Ok(INVALID_PAGE_ID);
        }
        self.resolve(next)
    }

    pub fn leftmost_leaf(&mut self) -> Result<PageId> {
        let mut cur = self.resolve(self.state.root_page_id)?;
        loop {
            let frame = self.bm.read(cur)?;
            let (is_leaf, child0) = {
                let view = NodeView::new(self.bm.frame(frame), self.state.layout);
                (view.is_leaf(), if view.is_leaf() { 0 } else { view.child(0) })
            };
            if is_leaf {
                return Ok(cur);
            }
            cur = self.resolve(child0)?;
        }
    }

    pub(crate) fn bm_mut(&mut self) -> &mut BufferManager<D> {
        &mut self.bm
    }

    pub(crate) fn layout(&self) -> NodeLayout {
        self.state.layout
    }

    /// Structural self-check: every interior node's children outnumber its
    /// keys by one, every node's keys are sorted, and the leaf chain
    /// produces keys in non-decreasing order end to end.
    ///
    /// Repurposed from `original_source/btree.c`'s `btreePrint` diagnostic
    /// walk as a non-printing invariant check.
    pub fn validate(&mut self) -> Result<()> {
        let root = self.resolve(self.state.root_page_id)?;
        self.validate_subtree(root)?;

        let mut cur = self.leftmost_leaf()?;
        let mut last_key: Option<Vec<u8>> = None;
        loop {
            let frame = self.bm.read(cur)?;
            let next = {
                let view = NodeView::new(self.bm.frame(frame), self.state.layout);
                for i in 0..view.count() as usize {
                    let k = view.key(i).to_vec();
                    if let Some(prev) = &last_key {
                        if &k < prev {
                            return Err(Error::InvariantViolation("leaf chain out of order".into()));
                        }
                    }
                    last_key = Some(k);
                }
                view.next_leaf()
            };
            if next == INVALID_PAGE_ID {
                break;
            }
            cur = self.resolve(next)?;
        }
        Ok(())
    }

    fn validate_subtree(&mut self, pid: PageId) -> Result<()> {
        let frame = self.bm.read(pid)?;
        let (is_leaf, n, raw_children): (bool, usize, Vec<PageId>) = {
            let view = NodeView::new(self.bm.frame(frame), self.state.layout);
            let n = view.count() as usize;
            for i in 1..n {
                if view.key(i - 1) > view.key(i) {
                    return Err(Error::InvariantViolation(format!("unsorted keys in page {pid}")));
                }
            }
            if view.is_leaf() {
                (true, n, Vec::new())
            } else {
                let raw_children = (0..=n).map(|i| view.child(i)).collect();
                (false, n, raw_children)
            }
        };
        if !is_leaf {
            if raw_children.len() != n + 1 {
                return Err(Error::InvariantViolation(format!("page {pid} has {} children for {n} keys", raw_children.len())));
            }
            for raw_child in raw_children {
                let child = self.resolve(raw_child)?;
                self.validate_subtree(child)?;
            }
        }
        Ok(())
    }
}

fn count_levels<D: block_device::BlockDevice>(bm: &mut BufferManager<D>, layout: NodeLayout, root: PageId) -> Result<usize> {
    let mut cur = root;
    let mut levels = 1;
    loop {
        let frame = bm.read(cur)?;
        let view = NodeView::new(bm.frame(frame), layout);
        if view.is_leaf() {
            return Ok(levels);
        }
        cur = view.child(0);
        levels += 1;
    }
}

/// Recomputes the live node count by walking the whole tree, resolving
/// every pointer through `resolve_chain` since `open` starts with an empty
/// remap table (spec.md §4.5: only the on-disk `nextId` chains survive a
/// restart). Only meaningful — and only called — under `Variant::B`.
fn count_nodes<D: block_device::BlockDevice>(
    bm: &mut BufferManager<D>,
    remap: &RemapTable,
    layout: NodeLayout,
    pid: PageId,
) -> Result<usize> {
    let resolved = resolve_chain(bm, remap, layout, pid)?;
    let children: Vec<PageId> = {
        let frame = bm.read(resolved)?;
        let view = NodeView::new(bm.frame(frame), layout);
        if view.is_leaf() {
            return Ok(1);
        }
        let n = view.count() as usize;
        (0..=n).map(|i| view.child(i)).collect()
    };
    let mut total = 1;
    for child in children {
        total += count_nodes(bm, remap, layout, child)?;
    }
    Ok(total)
}

/// Writes the freshly-built node page already sitting in `frame` to a new
/// physical address.
///
/// Under `Variant::B` a reclaim pass may need to run first, and that pass
/// reads and relocates pages through `SCRATCH_FRAME` — which `frame` itself
/// may alias (every caller here stages its new node in `SCRATCH_FRAME`).
/// `frame`'s contents are snapshotted before the reclaim pass and restored
/// right before the actual write, so the reclaim pass is free to use any
/// frame, including this one, without corrupting the page being written.
fn write_fresh<D: block_device::BlockDevice>(bm: &mut BufferManager<D>, state: &mut TreeState, frame: usize) -> Result<PageId> {
    match state.variant {
        Variant::A => bm.write(frame),
        Variant::B => {
            let staged = bm.frame(frame).to_vec();
            recycler::ensure_frontier_space(bm, state)?;
            bm.frame_mut(frame).copy_from_slice(&staged);
            recycler::finish_write(bm, frame)
        }
    }
}

fn bm_load_scratch_zero<D: block_device::BlockDevice>(bm: &mut BufferManager<D>) {
    bm.frame_mut(SCRATCH_FRAME).fill(0);
}

/// `Tree::init` needs a `TreeState` before it has one, just to drive
/// `write_fresh` for the very first root page; this builds a throwaway one
/// from config alone (no remap entries can exist yet).
fn trivial_state(config: &Config, layout: NodeLayout) -> TreeState {
    TreeState {
        layout,
        root_page_id: 0,
        levels: 1,
        remap: RemapTable::new(config.max_mappings),
        max_depth: config.max_depth,
        variant: config.variant,
        num_nodes: 0,
        end_data_page: config.end_data_page,
    }
}
