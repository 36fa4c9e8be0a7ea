//! The erase-block recycler: the part of `Variant::B`'s write path that
//! reclaims an old erase block once the write frontier reaches its end,
//! relocating any pages in that block the tree still needs.
//!
//! Grounded in `original_source/dbbuffer.c`'s `writePage`: the
//! `while (nextPageWriteId == blockEndPage)` outer loop, the `finderase`
//! retry-on-sparse-block inner loop, and the `isValid`/`movePage` callback
//! contract. The callbacks are expressed here as a `RecyclerClient` trait
//! rather than C function pointers, implemented by the B-tree core (the
//! only layer that knows how to search from a root or repair an interior
//! node's child pointers).

use crate::BufferManager;
use block_device::BlockDevice;
use common::{PageId, Result};

/// What the tree reports about a page under consideration for reclaim.
pub enum ValidityProbe {
    /// Nothing references this page any more; its slot can be erased
    /// without copying anything out of it.
    Dead,
    /// The page is still reachable from the root and must be relocated.
    Live,
    /// A previous recycle pass already relocated this page's data and
    /// recorded the mapping; `current` is where the data actually lives
    /// now, so this slot needs no data copy, only eventual mapping cleanup.
    RemappedOnly { current: PageId },
}

/// Implemented by the B-tree core to give the recycler the two
/// tree-shaped operations it cannot perform on its own: deciding whether a
/// candidate page is still reachable, and relocating one that is.
///
/// Every method takes the buffer manager as an explicit parameter rather
/// than capturing it, so `write_with_recycle` can reborrow `bm` across
/// calls without the client ever owning it.
pub trait RecyclerClient<D: BlockDevice> {
    fn is_valid(&mut self, bm: &mut BufferManager<D>, pid: PageId) -> Result<ValidityProbe>;

    /// Relocates the page currently at `prior` to the already-assigned
    /// physical slot `new_pid`: load it, fix up its self-identifying
    /// header field and (if interior) its child pointers, write it to
    /// `new_pid`, and record `prior -> new_pid` in the remap table.
    fn relocate(&mut self, bm: &mut BufferManager<D>, prior: PageId, new_pid: PageId) -> Result<()>;
}

/// Writes `frame_idx` under `Variant::B`, reclaiming an erase block first
/// if the write frontier has reached the end of its current block.
///
/// Mirrors `writePage`'s structure: the outer `while` advances to a new
/// block when needed, the `finderase` loop scans that block for live data
/// and either moves it (then erases) or, if it's too full to be worth
/// reclaiming yet, tries the next block instead.
///
/// Composed of `ensure_frontier_space` followed by `finish_write` so a
/// caller whose `frame_idx` might alias a frame the reclaim pass touches
/// internally can snapshot and restore it around just the first half.
pub fn write_with_recycle<D: BlockDevice, C: RecyclerClient<D>>(
    bm: &mut BufferManager<D>,
    client: &mut C,
    frame_idx: usize,
) -> Result<PageId> {
    ensure_frontier_space(bm, client)?;
    finish_write(bm, frame_idx)
}

/// Runs the reclaim loop alone: advances the write frontier, relocating and
/// erasing blocks as needed, until the next physical page is free to write
/// to. Reclaiming a block reads and relocates pages through the buffer
/// manager's own scratch frame, which can clobber any frame the caller is
/// staging a not-yet-written page in; split out so that staging can be
/// snapshotted beforehand and restored once this returns, before the final
/// write.
pub fn ensure_frontier_space<D: BlockDevice, C: RecyclerClient<D>>(
    bm: &mut BufferManager<D>,
    client: &mut C,
) -> Result<()> {
    while bm.next_page_write_id == bm.block_end_page {
        reclaim_one_block(bm, client)?;
    }
    Ok(())
}

/// Writes `frame_idx` to the next page in the write frontier, assuming the
/// caller already ensured space via `ensure_frontier_space`.
pub fn finish_write<D: BlockDevice>(bm: &mut BufferManager<D>, frame_idx: usize) -> Result<PageId> {
    let pid = bm.next_page_write_id;
    bm.next_page_write_id += 1;
    bm.write_physical_at(frame_idx, pid)?;
    Ok(pid)
}

fn reclaim_one_block<D: BlockDevice, C: RecyclerClient<D>>(
    bm: &mut BufferManager<D>,
    client: &mut C,
) -> Result<()> {
    bm.next_page_write_id = if bm.block_end_page >= bm.end_data_page {
        0
    } else {
        bm.erased_start_page
    };
    bm.block_end_page = bm.erased_start_page + bm.erase_block_pages as PageId - 1;

    loop {
        bm.erased_start_page += bm.erase_block_pages as PageId;
        let mut start_erase = bm.erased_start_page;
        let mut end_erase = bm.erased_start_page + bm.erase_block_pages as PageId - 1;

        if end_erase > bm.end_data_page {
            bm.wrapped_memory = true;
            start_erase = 0;
            end_erase = bm.erase_block_pages as PageId - 1;
            bm.erased_start_page = 0;
        }

        if !bm.wrapped_memory {
            // Memory hasn't wrapped yet, so this block is guaranteed to be
            // unwritten: nothing to relocate.
            bm.erase(start_erase, end_erase)?;
            return Ok(());
        }

        let mut live = Vec::new();
        for pid in start_erase..=end_erase {
            match client.is_valid(bm, pid)? {
                ValidityProbe::Dead => {}
                ValidityProbe::Live => live.push(pid),
                ValidityProbe::RemappedOnly { .. } => {}
            }
        }

        if live.len() >= bm.erase_block_pages / 2 {
            // Too much of this block is still live to be worth reclaiming
            // right now; try the next block instead.
            continue;
        }

        for prior in live {
            let new_pid = bm.next_page_write_id;
            bm.next_page_write_id += 1;
            client.relocate(bm, prior, new_pid)?;
        }

        bm.erase(start_erase, end_erase)?;
        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_device::MemBlockDevice;
    use common::Config;

    struct AllDead;
    impl<D: BlockDevice> RecyclerClient<D> for AllDead {
        fn is_valid(&mut self, _bm: &mut BufferManager<D>, _pid: PageId) -> Result<ValidityProbe> {
            Ok(ValidityProbe::Dead)
        }
        fn relocate(&mut self, _bm: &mut BufferManager<D>, _prior: PageId, _new_pid: PageId) -> Result<()> {
            unreachable!("nothing should be relocated in this test")
        }
    }

    #[test]
    fn fills_first_block_without_reclaiming() {
        let cfg = Config::variant_b(64, 4, 4, 4, 4, 4, 32);
        let dev = MemBlockDevice::new(64);
        let mut bm = BufferManager::new(&cfg, dev);
        let mut client = AllDead;

        let mut last = None;
        for i in 0..3u32 {
            bm.frame_mut(0)[4] = i as u8;
            let pid = write_with_recycle(&mut bm, &mut client, 0).unwrap();
            if let Some(prev) = last {
                assert_eq!(pid, prev + 1);
            }
            last = Some(pid);
        }
    }

    #[test]
    fn wraps_and_erases_a_dead_block() {
        let cfg = Config::variant_b(64, 4, 4, 4, 4, 4, 15);
        let dev = MemBlockDevice::new(64);
        let mut bm = BufferManager::new(&cfg, dev);
        let mut client = AllDead;

        for _ in 0..8 {
            write_with_recycle(&mut bm, &mut client, 0).unwrap();
        }
        assert!(bm.stats().num_writes >= 8);
    }
}
