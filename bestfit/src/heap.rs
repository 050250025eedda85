use std::ptr;

use regionalloc::Region;

use crate::allocator::{aligned_payload, AllocError, AllocRaw};
use crate::blockmeta::{BlockHeader, BlockId, BlockState};
use crate::constants;
use crate::directory::{BlockDirectory, ListIter};
use crate::rawptr::RawPtr;

/// Heap construction parameters
#[derive(Copy, Clone, Debug)]
pub struct HeapConfig {
    /// Bytes of address space to reserve on first use
    pub region_size: usize,
}

impl HeapConfig {
    pub fn with_region_size(self, region_size: usize) -> HeapConfig {
        HeapConfig { region_size }
    }
}

impl Default for HeapConfig {
    fn default() -> HeapConfig {
        HeapConfig {
            region_size: constants::DEFAULT_REGION_SIZE,
        }
    }
}

/// A snapshot of heap occupancy
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct HeapStats {
    /// Size of the reserved region, zero until the first allocation
    pub region_size: usize,
    /// Bytes of the region carved into blocks so far, prefixes and padding
    /// included
    pub carved_bytes: usize,
    pub allocated_blocks: usize,
    pub allocated_bytes: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
}

/// A best-fit heap. Blocks are carved from one lazily reserved region and
/// recycled through a free list; freed blocks are neither split nor merged.
///
/// The `'l` lifetime bounds the object layouts recorded on typed blocks.
pub struct Heap<'l> {
    config: HeapConfig,
    region: Option<Region>,
    /// Next unused address in the region
    high_water: usize,
    blocks: BlockDirectory<'l>,
}

impl<'l> Heap<'l> {
    pub fn new() -> Heap<'l> {
        Heap::with_config(HeapConfig::default())
    }

    /// A heap that will reserve `config.region_size` bytes on first use.
    /// Nothing is reserved here.
    pub fn with_config(config: HeapConfig) -> Heap<'l> {
        Heap {
            config,
            region: None,
            high_water: 0,
            blocks: BlockDirectory::new(),
        }
    }

    /// Reserve the heap region if that hasn't happened yet. Failing to do so
    /// is fatal.
    pub fn ensure_initialized(&mut self) {
        if self.region.is_some() {
            return;
        }

        match Region::new(self.config.region_size) {
            Ok(region) => {
                log::debug!(
                    "heap initialized: {} bytes at {:#x}",
                    region.size(),
                    region.start()
                );
                self.high_water = region.start();
                self.region = Some(region);
            }

            Err(error) => heap_fatal!(
                "Could not reserve heap region of {} bytes: {}",
                self.config.region_size,
                error
            ),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.region.is_some()
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// The usable size of the block at `ptr`, or `None` if `ptr` is not a
    /// block payload of this heap. Reused blocks may be larger than the size
    /// last requested for them.
    pub fn block_size(&self, ptr: RawPtr<u8>) -> Option<usize> {
        self.lookup(ptr).map(|id| self.blocks.header(id).size())
    }

    /// Whether `ptr` is currently allocated, or `None` if `ptr` is not a
    /// block payload of this heap.
    pub fn is_allocated(&self, ptr: RawPtr<u8>) -> Option<bool> {
        self.lookup(ptr).map(|id| self.blocks.header(id).is_allocated())
    }

    pub fn stats(&self) -> HeapStats {
        let (region_size, carved_bytes) = match self.region {
            Some(ref region) => (region.size(), self.high_water - region.start()),
            None => (0, 0),
        };

        HeapStats {
            region_size,
            carved_bytes,
            allocated_blocks: self.blocks.len(BlockState::Allocated),
            allocated_bytes: self.blocks.bytes(BlockState::Allocated),
            free_blocks: self.blocks.len(BlockState::Free),
            free_bytes: self.blocks.bytes(BlockState::Free),
        }
    }

    /// The free list as `(payload, size)` pairs, head first
    pub fn free_blocks(&self) -> BlockIter<'_, 'l> {
        BlockIter::new(&self.blocks, BlockState::Free)
    }

    /// The allocated list as `(payload, size)` pairs, most recent first
    pub fn allocated_blocks(&self) -> BlockIter<'_, 'l> {
        BlockIter::new(&self.blocks, BlockState::Allocated)
    }

    /// Find the block whose payload starts at `ptr`. Anything that is not
    /// exactly a payload address carved from this heap gives `None`.
    pub(crate) fn lookup(&self, ptr: RawPtr<u8>) -> Option<BlockId> {
        let region = self.region.as_ref()?;
        let addr = ptr.as_word();
        let prefix = addr.checked_sub(constants::HEADER_SIZE)?;

        if addr % constants::ALLOC_ALIGN_BYTES != 0
            || !region.contains(prefix)
            || addr >= self.high_water
        {
            return None;
        }

        // the prefix word lies inside the carved part of the region
        let index = unsafe { (prefix as *const usize).read() };
        self.blocks.resolve(index, addr)
    }

    pub(crate) fn header(&self, id: BlockId) -> &BlockHeader<'l> {
        self.blocks.header(id)
    }

    pub(crate) fn header_mut(&mut self, id: BlockId) -> &mut BlockHeader<'l> {
        self.blocks.header_mut(id)
    }

    pub(crate) fn first_allocated(&self) -> Option<BlockId> {
        self.blocks.head(BlockState::Allocated)
    }

    /// Allocate and return the block id rather than the payload
    pub(crate) fn allocate_block(&mut self, size: usize) -> Result<BlockId, AllocError> {
        self.ensure_initialized();

        if size == 0 {
            return Err(AllocError::BadRequest);
        }

        let id = match self.blocks.find_best_fit(size) {
            Some(id) => {
                self.blocks.transfer(id, BlockState::Allocated);
                id
            }

            None => self.carve(size)?,
        };

        log::trace!(
            "allocate({}) -> {:#x} (block size {})",
            size,
            self.blocks.header(id).payload(),
            self.blocks.header(id).size()
        );

        Ok(id)
    }

    /// Move an allocated block to the free list. The block must be
    /// allocated; freeing it twice is fatal.
    pub(crate) fn release(&mut self, id: BlockId) {
        let header = self.blocks.header_mut(id);

        if !header.is_allocated() {
            heap_fatal!("Double-free: {:#x}", header.payload());
        }

        header.set_layout(None);
        self.blocks.transfer(id, BlockState::Free);
    }

    /// Carve a new block from the high-water mark, leaving the mark where it
    /// was if the block doesn't fit in the region.
    fn carve(&mut self, size: usize) -> Result<BlockId, AllocError> {
        let end = match self.region {
            Some(ref region) => region.end(),
            None => return Err(AllocError::OOM),
        };

        let payload = aligned_payload(self.high_water).ok_or(AllocError::OOM)?;
        let limit = match payload.checked_add(size) {
            Some(limit) if limit <= end => limit,
            _ => {
                log::warn!(
                    "heap exhausted: {} bytes requested, {} left",
                    size,
                    end - self.high_water
                );
                return Err(AllocError::OOM);
            }
        };

        let id = self.blocks.insert(payload, size);
        unsafe {
            ((payload - constants::HEADER_SIZE) as *mut usize).write(id.index());
        }
        self.high_water = limit;

        Ok(id)
    }

    /// Look up a block a client handed back, treating a pointer this heap
    /// never returned as fatal.
    fn client_block(&self, ptr: RawPtr<u8>, operation: &str) -> BlockId {
        match self.lookup(ptr) {
            Some(id) => id,
            None => heap_fatal!("Invalid pointer passed to {}: {:p}", operation, ptr),
        }
    }
}

/// Iterator over one block list as `(payload, size)` pairs
pub struct BlockIter<'h, 'l> {
    blocks: &'h BlockDirectory<'l>,
    ids: ListIter<'h, 'l>,
}

impl<'h, 'l> BlockIter<'h, 'l> {
    fn new(blocks: &'h BlockDirectory<'l>, state: BlockState) -> BlockIter<'h, 'l> {
        BlockIter {
            blocks,
            ids: blocks.iter(state),
        }
    }
}

impl<'h, 'l> Iterator for BlockIter<'h, 'l> {
    type Item = (RawPtr<u8>, usize);

    fn next(&mut self) -> Option<(RawPtr<u8>, usize)> {
        let id = self.ids.next()?;
        let header = self.blocks.header(id);
        RawPtr::from_word(header.payload()).map(|ptr| (ptr, header.size()))
    }
}

impl<'l> AllocRaw for Heap<'l> {
    fn allocate(&mut self, size: usize) -> Result<RawPtr<u8>, AllocError> {
        let id = self.allocate_block(size)?;
        RawPtr::from_word(self.blocks.header(id).payload()).ok_or(AllocError::OOM)
    }

    fn deallocate(&mut self, ptr: Option<RawPtr<u8>>) {
        if let Some(ptr) = ptr {
            let id = self.client_block(ptr, "deallocate");
            log::trace!("deallocate({:p})", ptr);
            self.release(id);
        }
    }

    fn resize(
        &mut self,
        ptr: Option<RawPtr<u8>>,
        new_size: usize,
    ) -> Result<Option<RawPtr<u8>>, AllocError> {
        if new_size == 0 {
            self.deallocate(ptr);
            return Ok(None);
        }

        let ptr = match ptr {
            Some(ptr) => ptr,
            None => return self.allocate(new_size).map(Some),
        };

        let id = self.client_block(ptr, "resize");
        let header = self.blocks.header(id);
        if !header.is_allocated() {
            heap_fatal!("Resize of a freed block: {:p}", ptr);
        }

        let old_size = header.size();
        if new_size <= old_size {
            return Ok(Some(ptr));
        }

        // the old block stays allocated until the copy is done, so a failure
        // here leaves it untouched
        let new_ptr = self.allocate(new_size)?;
        unsafe {
            ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), old_size.min(new_size));
        }
        self.release(id);

        log::trace!("resize({:p}, {}) -> {:p}", ptr, new_size, new_ptr);
        Ok(Some(new_ptr))
    }

    fn allocate_zeroed(&mut self, count: usize, size: usize) -> Result<RawPtr<u8>, AllocError> {
        let total = count.checked_mul(size).ok_or(AllocError::BadRequest)?;
        let ptr = self.allocate(total)?;

        unsafe {
            ptr::write_bytes(ptr.as_ptr(), 0, total);
        }

        Ok(ptr)
    }
}

impl<'l> Default for Heap<'l> {
    fn default() -> Heap<'l> {
        Heap::new()
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    const TEST_REGION_SIZE: usize = 4 * constants::MB;

    fn test_heap() -> Heap<'static> {
        Heap::with_config(HeapConfig::default().with_region_size(TEST_REGION_SIZE))
    }

    #[test]
    fn test_lazy_initialization() {
        let mut mem = test_heap();
        assert!(!mem.is_initialized());
        assert!(mem.stats() == HeapStats::default());

        // even a zero-size request reserves the region
        assert!(mem.allocate(0) == Err(AllocError::BadRequest));
        assert!(mem.is_initialized());
        assert!(mem.stats().region_size == TEST_REGION_SIZE);
        assert!(mem.stats().allocated_blocks == 0);
    }

    #[test]
    fn test_default_config() {
        let mem = Heap::new();
        assert!(mem.config().region_size == constants::DEFAULT_REGION_SIZE);
    }

    #[test]
    fn test_alignment() {
        let mut mem = test_heap();

        for size in 1..200 {
            let ptr = mem.allocate(size).unwrap();
            assert!(ptr.as_word() % constants::ALLOC_ALIGN_BYTES == 0);
        }
    }

    #[test]
    fn test_no_aliasing() {
        let mut mem = test_heap();

        let mut ranges = Vec::new();
        for i in 0..500 {
            let size = 1 + (i * 37) % 113;
            let ptr = mem.allocate(size).unwrap();

            // write a pattern over the whole payload
            unsafe { ptr::write_bytes(ptr.as_ptr(), (i % 251) as u8, size) };
            ranges.push((ptr, size, (i % 251) as u8));

            // free some of them so later requests reuse blocks
            if i % 3 == 0 {
                let (old, _, _) = ranges.remove(ranges.len() / 2);
                mem.deallocate(Some(old));
            }
        }

        let mut sorted: Vec<(usize, usize)> =
            ranges.iter().map(|(p, size, _)| (p.as_word(), *size)).collect();
        sorted.sort();
        for pair in sorted.windows(2) {
            assert!(pair[0].0 + pair[0].1 <= pair[1].0);
        }

        // no write clobbered another live block
        for (ptr, size, fill) in ranges {
            let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size) };
            assert!(bytes.iter().all(|b| *b == fill));
        }
    }

    #[test]
    fn test_best_fit_selection() {
        let mut mem = test_heap();

        let b10 = mem.allocate(10).unwrap();
        let b50 = mem.allocate(50).unwrap();
        let b20a = mem.allocate(20).unwrap();
        let b20b = mem.allocate(20).unwrap();

        // freeing in reverse leaves the free list as 10, 50, 20, 20
        for ptr in [b20b, b20a, b50, b10].iter() {
            mem.deallocate(Some(*ptr));
        }
        let free: Vec<usize> = mem.free_blocks().map(|(_, size)| size).collect();
        assert!(free == vec![10, 50, 20, 20]);

        let got = mem.allocate(15).unwrap();
        assert!(got == b20a);
        // a reused block keeps its original size
        assert!(mem.block_size(got) == Some(20));

        let got = mem.allocate(15).unwrap();
        assert!(got == b20b);
    }

    #[test]
    fn test_exact_fit_wins() {
        let mut mem = test_heap();

        let big = mem.allocate(64).unwrap();
        let exact = mem.allocate(32).unwrap();
        mem.deallocate(Some(exact));
        mem.deallocate(Some(big));

        assert!(mem.allocate(32).unwrap() == exact);
    }

    #[test]
    fn test_free_allocate_round_trip() {
        let mut mem = test_heap();

        for size in [1, 7, 16, 100, 4096].iter() {
            let ptr = mem.allocate(*size).unwrap();
            mem.deallocate(Some(ptr));
            assert!(mem.allocate(*size).unwrap() == ptr);
        }
    }

    #[test]
    fn test_lists_track_state() {
        let mut mem = test_heap();

        let a = mem.allocate(8).unwrap();
        let b = mem.allocate(24).unwrap();
        mem.deallocate(Some(a));

        let stats = mem.stats();
        assert!(stats.allocated_blocks == 1 && stats.allocated_bytes == 24);
        assert!(stats.free_blocks == 1 && stats.free_bytes == 8);

        assert!(mem.is_allocated(a) == Some(false));
        assert!(mem.is_allocated(b) == Some(true));
        assert!(mem.allocated_blocks().map(|(p, _)| p).collect::<Vec<_>>() == vec![b]);
    }

    #[test]
    fn test_lookup_rejects_foreign_pointers() {
        let mut mem = test_heap();
        let ptr = mem.allocate(64).unwrap();

        let mut local = 0u8;
        let foreign = RawPtr::from_ptr(&mut local as *mut u8).unwrap();
        let interior = RawPtr::from_word(ptr.as_word() + 16).unwrap();

        assert!(mem.block_size(foreign).is_none());
        assert!(mem.block_size(interior).is_none());
        assert!(mem.block_size(ptr) == Some(64));
    }

    #[test]
    fn test_deallocate_none() {
        let mut mem = test_heap();
        mem.deallocate(None);
        assert!(!mem.is_initialized());
    }

    #[test]
    #[should_panic(expected = "Double-free")]
    fn test_double_free_is_fatal() {
        let mut mem = test_heap();
        let ptr = mem.allocate(32).unwrap();

        mem.deallocate(Some(ptr));
        mem.deallocate(Some(ptr));
    }

    #[test]
    #[should_panic(expected = "Invalid pointer")]
    fn test_foreign_free_is_fatal() {
        let mut mem = test_heap();
        mem.allocate(32).unwrap();

        let mut local = 0u8;
        mem.deallocate(RawPtr::from_ptr(&mut local as *mut u8));
    }

    #[test]
    #[should_panic(expected = "Could not reserve")]
    fn test_failed_reservation_is_fatal() {
        let mut mem = Heap::with_config(HeapConfig::default().with_region_size(0));
        let _ = mem.allocate(8);
    }

    #[test]
    #[should_panic(expected = "Resize of a freed block")]
    fn test_resize_freed_block_is_fatal() {
        let mut mem = test_heap();
        let ptr = mem.allocate(32).unwrap();

        mem.deallocate(Some(ptr));
        let _ = mem.resize(Some(ptr), 4096);
    }

    #[test]
    fn test_lookup_below_first_payload() {
        let mut mem = test_heap();
        let ptr = mem.allocate(32).unwrap();

        // the region base itself holds a prefix, not a payload
        let base = RawPtr::from_word(ptr.as_word() - constants::HEADER_SIZE).unwrap();
        assert!(mem.block_size(base).is_none());
        assert!(mem.block_size(RawPtr::from_word(constants::HEADER_SIZE).unwrap()).is_none());
    }

    #[test]
    fn test_exhaustion() {
        let mut mem = Heap::with_config(HeapConfig::default().with_region_size(4096));

        let first = mem.allocate(1024).unwrap();
        let carved = mem.stats().carved_bytes;

        assert!(mem.allocate(4096) == Err(AllocError::OOM));
        // the failed attempt didn't move the high-water mark
        assert!(mem.stats().carved_bytes == carved);

        // smaller requests still succeed
        assert!(mem.allocate(1024).is_ok());

        // and freed space is still reusable
        mem.deallocate(Some(first));
        assert!(mem.allocate(1000).unwrap() == first);
    }

    #[test]
    fn test_resize_grow_preserves_data() {
        let mut mem = test_heap();

        let x = mem.allocate(24).unwrap();
        let original: Vec<u8> = (0..24u8).map(|i| i * 2).collect();
        unsafe { ptr::copy_nonoverlapping(original.as_ptr(), x.as_ptr(), 24) };

        let y = mem.resize(Some(x), 48).unwrap().unwrap();
        assert!(y != x);

        let copied = unsafe { std::slice::from_raw_parts(y.as_ptr(), 24) };
        assert!(copied == &original[..]);
        assert!(mem.is_allocated(x) == Some(false));
        assert!(mem.block_size(y) == Some(48));
    }

    #[test]
    fn test_resize_shrink_is_noop() {
        let mut mem = test_heap();

        let x = mem.allocate(48).unwrap();
        assert!(mem.resize(Some(x), 10).unwrap() == Some(x));
        assert!(mem.resize(Some(x), 48).unwrap() == Some(x));
        assert!(mem.block_size(x) == Some(48));
    }

    #[test]
    fn test_resize_special_cases() {
        let mut mem = test_heap();

        // absent pointer allocates
        let x = mem.resize(None, 32).unwrap().unwrap();
        assert!(mem.is_allocated(x) == Some(true));

        // zero size frees
        assert!(mem.resize(Some(x), 0).unwrap() == None);
        assert!(mem.is_allocated(x) == Some(false));

        assert!(mem.resize(None, 0).unwrap() == None);
    }

    #[test]
    fn test_resize_failure_keeps_block() {
        let mut mem = Heap::with_config(HeapConfig::default().with_region_size(4096));

        let x = mem.allocate(100).unwrap();
        unsafe { ptr::write_bytes(x.as_ptr(), 0x5a, 100) };

        assert!(mem.resize(Some(x), 8192) == Err(AllocError::OOM));

        assert!(mem.is_allocated(x) == Some(true));
        let bytes = unsafe { std::slice::from_raw_parts(x.as_ptr(), 100) };
        assert!(bytes.iter().all(|b| *b == 0x5a));
    }

    #[test]
    fn test_allocate_zeroed() {
        let mut mem = test_heap();

        // dirty a block and free it so the zeroed request reuses it
        let dirty = mem.allocate(64).unwrap();
        unsafe { ptr::write_bytes(dirty.as_ptr(), 0xff, 64) };
        mem.deallocate(Some(dirty));

        let ptr = mem.allocate_zeroed(8, 8).unwrap();
        assert!(ptr == dirty);

        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 64) };
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_allocate_zeroed_bad_requests() {
        let mut mem = test_heap();

        assert!(mem.allocate_zeroed(usize::MAX, 2) == Err(AllocError::BadRequest));
        assert!(mem.allocate_zeroed(0, 8) == Err(AllocError::BadRequest));
    }

    #[test]
    fn test_many_obs() {
        let mut mem = test_heap();

        let mut obs = Vec::new();

        // allocate a sequence of numbers
        for i in 0..10_000usize {
            match mem.allocate(std::mem::size_of::<usize>()) {
                Err(_) => assert!(false, "Allocation failed unexpectedly"),
                Ok(ptr) => {
                    let ptr = ptr.cast::<usize>();
                    unsafe { ptr.as_ptr().write(i) };
                    obs.push(ptr);
                }
            }
        }

        // check that all values of allocated words match the original
        // numbers written, that no heap corruption occurred
        for (i, ob) in obs.iter().enumerate() {
            assert!(i == unsafe { *ob.as_ref() })
        }
    }
}
