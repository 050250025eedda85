use crate::blockmeta::{BlockHeader, BlockId, BlockState};

/// Head of one of the two intrusive block lists, with running totals
#[derive(Debug, Default)]
struct BlockList {
    head: Option<BlockId>,
    len: usize,
    bytes: usize,
}

/// The arena of every block header the heap has ever carved, and the free
/// and allocated lists threaded through it. Headers are never removed, so a
/// `BlockId` stays valid for the life of the heap.
#[derive(Debug, Default)]
pub struct BlockDirectory<'l> {
    headers: Vec<BlockHeader<'l>>,
    free: BlockList,
    allocated: BlockList,
}

impl<'l> BlockDirectory<'l> {
    pub fn new() -> BlockDirectory<'l> {
        BlockDirectory::default()
    }

    pub fn header(&self, id: BlockId) -> &BlockHeader<'l> {
        &self.headers[id.index()]
    }

    pub fn header_mut(&mut self, id: BlockId) -> &mut BlockHeader<'l> {
        &mut self.headers[id.index()]
    }

    /// Map a directory index read back from a block prefix to a block id,
    /// checking that the header really describes the payload at `payload`.
    pub fn resolve(&self, index: usize, payload: usize) -> Option<BlockId> {
        match self.headers.get(index) {
            Some(header) if header.payload() == payload => Some(BlockId::new(index)),
            _ => None,
        }
    }

    /// Record a newly carved block and put it at the head of the allocated
    /// list.
    pub fn insert(&mut self, payload: usize, size: usize) -> BlockId {
        let id = BlockId::new(self.headers.len());
        self.headers.push(BlockHeader::new(payload, size));
        self.push_front(id);
        id
    }

    /// Move a block to the head of the list for `state`.
    pub fn transfer(&mut self, id: BlockId, state: BlockState) {
        self.unlink(id);
        self.header_mut(id).set_state(state);
        self.push_front(id);
    }

    /// Best-fit search of the free list: the smallest block of at least
    /// `size` bytes, the first in list order among equals.
    pub fn find_best_fit(&self, size: usize) -> Option<BlockId> {
        let mut best: Option<BlockId> = None;

        for id in self.iter(BlockState::Free) {
            let header = self.header(id);

            if header.is_allocated() {
                heap_fatal!(
                    "Allocated block on free list: {:#x}",
                    header.payload()
                );
            }

            let fits = header.size() >= size;
            let better = match best {
                None => true,
                Some(best) => header.size() < self.header(best).size(),
            };

            if fits && better {
                best = Some(id);

                if header.size() == size {
                    break;
                }
            }
        }

        best
    }

    /// Iterate over the block ids of one list, head first.
    pub fn iter(&self, state: BlockState) -> ListIter<'_, 'l> {
        ListIter {
            directory: self,
            cursor: self.list(state).head,
        }
    }

    pub fn head(&self, state: BlockState) -> Option<BlockId> {
        self.list(state).head
    }

    pub fn len(&self, state: BlockState) -> usize {
        self.list(state).len
    }

    /// Sum of the payload sizes on one list
    pub fn bytes(&self, state: BlockState) -> usize {
        self.list(state).bytes
    }

    fn list(&self, state: BlockState) -> &BlockList {
        match state {
            BlockState::Free => &self.free,
            BlockState::Allocated => &self.allocated,
        }
    }

    fn list_mut(&mut self, state: BlockState) -> &mut BlockList {
        match state {
            BlockState::Free => &mut self.free,
            BlockState::Allocated => &mut self.allocated,
        }
    }

    /// Remove a block from whichever list its state names, fixing the
    /// neighbours' links and the list head.
    fn unlink(&mut self, id: BlockId) {
        let (prev, next, state, size) = {
            let header = self.header(id);
            (header.prev, header.next, header.state(), header.size())
        };

        match prev {
            Some(prev) => self.header_mut(prev).next = next,
            None => self.list_mut(state).head = next,
        }

        if let Some(next) = next {
            self.header_mut(next).prev = prev;
        }

        let header = self.header_mut(id);
        header.next = None;
        header.prev = None;

        let list = self.list_mut(state);
        list.len -= 1;
        list.bytes -= size;
    }

    /// Insert an unlinked block at the head of the list its state names.
    fn push_front(&mut self, id: BlockId) {
        let (state, size) = {
            let header = self.header(id);
            (header.state(), header.size())
        };

        let old_head = self.list(state).head;

        {
            let header = self.header_mut(id);
            header.prev = None;
            header.next = old_head;
        }

        if let Some(old_head) = old_head {
            self.header_mut(old_head).prev = Some(id);
        }

        let list = self.list_mut(state);
        list.head = Some(id);
        list.len += 1;
        list.bytes += size;
    }
}

/// Walks one block list by following `next` links
pub struct ListIter<'d, 'l> {
    directory: &'d BlockDirectory<'l>,
    cursor: Option<BlockId>,
}

impl<'d, 'l> Iterator for ListIter<'d, 'l> {
    type Item = BlockId;

    fn next(&mut self) -> Option<BlockId> {
        let id = self.cursor?;
        self.cursor = self.directory.header(id).next;
        Some(id)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    // Carve blocks of the given sizes at fake, distinct payload addresses
    fn directory_with(sizes: &[usize]) -> (BlockDirectory<'static>, Vec<BlockId>) {
        let mut dir = BlockDirectory::new();
        let ids = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| dir.insert(0x1000 + i * 0x100, *size))
            .collect();
        (dir, ids)
    }

    fn list_of(dir: &BlockDirectory, state: BlockState) -> Vec<BlockId> {
        dir.iter(state).collect()
    }

    #[test]
    fn test_insert_pushes_front() {
        let (dir, ids) = directory_with(&[8, 16, 24]);

        assert!(list_of(&dir, BlockState::Allocated) == vec![ids[2], ids[1], ids[0]]);
        assert!(dir.len(BlockState::Allocated) == 3);
        assert!(dir.bytes(BlockState::Allocated) == 48);
        assert!(dir.head(BlockState::Free).is_none());
    }

    #[test]
    fn test_transfer_middle_and_head() {
        let (mut dir, ids) = directory_with(&[8, 16, 24]);

        // middle of the allocated list
        dir.transfer(ids[1], BlockState::Free);
        assert!(list_of(&dir, BlockState::Allocated) == vec![ids[2], ids[0]]);
        assert!(list_of(&dir, BlockState::Free) == vec![ids[1]]);

        // head of the allocated list
        dir.transfer(ids[2], BlockState::Free);
        assert!(list_of(&dir, BlockState::Allocated) == vec![ids[0]]);
        assert!(list_of(&dir, BlockState::Free) == vec![ids[2], ids[1]]);

        // backwards links agree with the forward walk
        assert!(dir.header(ids[1]).prev == Some(ids[2]));
        assert!(dir.header(ids[2]).prev.is_none());
        assert!(dir.header(ids[0]).prev.is_none() && dir.header(ids[0]).next.is_none());

        assert!(dir.bytes(BlockState::Free) == 40);
        assert!(dir.bytes(BlockState::Allocated) == 8);
    }

    #[test]
    fn test_best_fit_prefers_smallest() {
        let (mut dir, ids) = directory_with(&[10, 50, 20, 20]);

        // free in reverse so the free list reads 10, 50, 20, 20 from the head
        for id in ids.iter().rev() {
            dir.transfer(*id, BlockState::Free);
        }
        assert!(list_of(&dir, BlockState::Free) == ids);

        assert!(dir.find_best_fit(15) == Some(ids[2]));
        assert!(dir.find_best_fit(20) == Some(ids[2]));
        assert!(dir.find_best_fit(5) == Some(ids[0]));
        assert!(dir.find_best_fit(21) == Some(ids[1]));
        assert!(dir.find_best_fit(51) == None);
    }

    #[test]
    fn test_resolve() {
        let (dir, ids) = directory_with(&[8, 16]);

        assert!(dir.resolve(1, 0x1100) == Some(ids[1]));
        assert!(dir.resolve(1, 0x1000) == None);
        assert!(dir.resolve(7, 0x1000) == None);
    }

    #[test]
    #[should_panic(expected = "Allocated block on free list")]
    fn test_corrupt_free_list_is_fatal() {
        let (mut dir, ids) = directory_with(&[8]);

        dir.transfer(ids[0], BlockState::Free);
        dir.header_mut(ids[0]).set_state(BlockState::Allocated);

        dir.find_best_fit(8);
    }
}
