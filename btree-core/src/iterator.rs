//! Ordered range iteration over the leaf sibling chain.
//!
//! Grounded in the teacher's `storage-engine::index::iterator::BPlusTreeIterator`,
//! which walks `next_leaf()` the same way; adapted to the remap-aware
//! `Tree::resolve` and to this workspace's byte-slice keys rather than the
//! teacher's `IndexKey` enum.

use crate::node::NodeView;
use crate::tree::Tree;
use common::{PageId, Result, INVALID_PAGE_ID};

pub struct RangeIter<'a, D: block_device::BlockDevice> {
    tree: &'a mut Tree<D>,
    current_leaf: PageId,
    slot: usize,
    max_key: Option<&'a [u8]>,
    done: bool,
}

impl<'a, D: block_device::BlockDevice> RangeIter<'a, D> {
    pub(crate) fn new(tree: &'a mut Tree<D>, start_leaf: PageId, max_key: Option<&'a [u8]>) -> Result<Self> {
        Ok(Self { tree, current_leaf: start_leaf, slot: 0, max_key, done: false })
    }
}

impl<'a, D: block_device::BlockDevice> Iterator for RangeIter<'a, D> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let frame = match self.tree.bm_mut().read(self.current_leaf) {
                Ok(f) => f,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            let layout = self.tree.layout();
            let view = NodeView::new(self.tree.bm_mut().frame(frame), layout);
            let n = view.count() as usize;

            if self.slot < n {
                let key = view.key(self.slot).to_vec();
                if let Some(max) = self.max_key {
                    if key.as_slice() > max {
                        self.done = true;
                        return None;
                    }
                }
                let data = view.data(self.slot).to_vec();
                self.slot += 1;
                return Some(Ok((key, data)));
            }

            let next = view.next_leaf();
            if next == INVALID_PAGE_ID {
                self.done = true;
                return None;
            }
            self.current_leaf = match self.tree.resolve(next) {
                Ok(pid) => pid,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            self.slot = 0;
        }
    }
}
