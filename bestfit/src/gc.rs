use std::ptr;

use crate::allocator::{AllocError, AllocRaw};
use crate::heap::{Heap, HeapConfig};
use crate::layout::ObjectLayout;
use crate::rawptr::RawPtr;
use crate::roots::RootSet;

/// What one collection cycle did
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct CollectionStats {
    /// Blocks found reachable from the root set
    pub marked: usize,
    /// Blocks returned to the free list
    pub swept: usize,
    /// Payload bytes returned to the free list
    pub reclaimed_bytes: usize,
}

/// A best-fit heap with a precise mark-and-sweep collector.
///
/// Objects meant to be traced are created with `allocate_typed`, which
/// records their `ObjectLayout`. Before each `collect`, every pointer the
/// program still holds from outside the heap must be passed to
/// `root_insert`; anything not reachable from those roots is freed.
/// Blocks allocated through `AllocRaw` carry no layout: they are kept alive
/// only if rooted or pointed to, and nothing inside them is traced.
pub struct GcHeap<'l> {
    heap: Heap<'l>,
    roots: RootSet,
}

impl<'l> GcHeap<'l> {
    pub fn new() -> GcHeap<'l> {
        GcHeap::with_config(HeapConfig::default())
    }

    pub fn with_config(config: HeapConfig) -> GcHeap<'l> {
        GcHeap {
            heap: Heap::with_config(config),
            roots: RootSet::new(),
        }
    }

    /// The underlying heap, for queries
    pub fn heap(&self) -> &Heap<'l> {
        &self.heap
    }

    /// Allocate a zero-filled object described by `layout` and record the
    /// layout for tracing.
    pub fn allocate_typed(&mut self, layout: &'l ObjectLayout) -> Result<RawPtr<u8>, AllocError> {
        let id = self.heap.allocate_block(layout.size())?;

        let header = self.heap.header_mut(id);
        header.set_layout(Some(layout));
        let payload = header.payload();

        // pointer fields must not hold stale addresses from a reused block
        unsafe {
            ptr::write_bytes(payload as *mut u8, 0, layout.size());
        }

        RawPtr::from_word(payload).ok_or(AllocError::OOM)
    }

    /// Add a pointer to the root set for the next collection. Only pointers
    /// to objects that are live at that moment may be inserted.
    pub fn root_insert(&mut self, ptr: Option<RawPtr<u8>>) {
        self.roots.push(ptr);
    }

    /// Number of roots waiting for the next collection
    pub fn pending_roots(&self) -> usize {
        self.roots.len()
    }

    /// Mark everything reachable from the root set, then free the rest.
    /// The root set is empty afterwards.
    pub fn collect(&mut self) -> CollectionStats {
        let marked = self.mark();
        let (swept, reclaimed_bytes) = self.sweep();

        debug_assert!(self.roots.is_empty());

        let stats = CollectionStats {
            marked,
            swept,
            reclaimed_bytes,
        };
        log::debug!("collection: {:?}", stats);
        stats
    }

    /// Drain the root set, tracing through object layouts with the root
    /// stack as the worklist.
    ///
    /// Only exact payload addresses of allocated blocks are marked. Null
    /// entries, addresses outside any block and pointers to freed blocks are
    /// skipped, so no block on the free list ever carries a mark.
    fn mark(&mut self) -> usize {
        let mut marked = 0;

        while let Some(entry) = self.roots.pop() {
            let ptr = match entry {
                Some(ptr) => ptr,
                None => continue,
            };

            let id = match self.heap.lookup(ptr) {
                Some(id) => id,
                None => {
                    log::trace!("mark: {:p} is not a heap block, ignored", ptr);
                    continue;
                }
            };

            let header = self.heap.header_mut(id);
            if header.is_marked() {
                continue;
            }

            // a free block would keep its mark past the sweep
            if !header.is_allocated() {
                log::warn!("mark: {:p} points to a freed block, ignored", ptr);
                continue;
            }

            header.mark();
            marked += 1;

            if let Some(layout) = header.layout() {
                for &offset in layout.pointer_offsets() {
                    // the block is at least layout.size() bytes long
                    let word = unsafe { (ptr.as_ptr().add(offset) as *const usize).read_unaligned() };
                    self.roots.push(RawPtr::from_word(word));
                }
            }
        }

        marked
    }

    /// Free every unmarked allocated block and clear the marks of the rest.
    fn sweep(&mut self) -> (usize, usize) {
        let mut swept = 0;
        let mut reclaimed_bytes = 0;

        let mut cursor = self.heap.first_allocated();
        while let Some(id) = cursor {
            let header = self.heap.header_mut(id);
            cursor = header.next;

            if header.is_marked() {
                header.unmark();
            } else {
                swept += 1;
                reclaimed_bytes += header.size();
                self.heap.release(id);
            }
        }

        (swept, reclaimed_bytes)
    }
}

impl<'l> AllocRaw for GcHeap<'l> {
    fn allocate(&mut self, size: usize) -> Result<RawPtr<u8>, AllocError> {
        self.heap.allocate(size)
    }

    fn deallocate(&mut self, ptr: Option<RawPtr<u8>>) {
        self.heap.deallocate(ptr)
    }

    /// Resize through the inner heap. A typed object that moves keeps its
    /// layout, so its pointer fields are still traced at the new address.
    fn resize(
        &mut self,
        ptr: Option<RawPtr<u8>>,
        new_size: usize,
    ) -> Result<Option<RawPtr<u8>>, AllocError> {
        let layout = ptr
            .and_then(|ptr| self.heap.lookup(ptr))
            .and_then(|id| self.heap.header(id).layout());

        let new_ptr = self.heap.resize(ptr, new_size)?;

        // a grown block is larger than the old one, so the layout still fits
        if let (Some(layout), Some(moved)) = (layout, new_ptr) {
            if let Some(id) = self.heap.lookup(moved) {
                self.heap.header_mut(id).set_layout(Some(layout));
            }
        }

        Ok(new_ptr)
    }

    fn allocate_zeroed(&mut self, count: usize, size: usize) -> Result<RawPtr<u8>, AllocError> {
        self.heap.allocate_zeroed(count, size)
    }
}

impl<'l> Default for GcHeap<'l> {
    fn default() -> GcHeap<'l> {
        GcHeap::new()
    }
}
