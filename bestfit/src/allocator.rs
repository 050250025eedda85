use std::error::Error;
use std::fmt;

use crate::constants;
use crate::rawptr::RawPtr;

/// An allocation error type
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AllocError {
    /// Some attribute of the allocation, most likely the size requested,
    /// could not be fulfilled: a zero size or a size that overflows
    BadRequest,
    /// Out of memory - the heap region has no room left for the request
    OOM,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AllocError::BadRequest => write!(f, "invalid allocation size requested"),
            AllocError::OOM => write!(f, "heap region exhausted"),
        }
    }
}

impl Error for AllocError {}

/// A type that describes allocation of untyped byte ranges in a heap space,
/// returning bare payload pointers on success. A `None` pointer argument is
/// the absent pointer.
pub trait AllocRaw {
    /// Allocate `size` bytes, the smallest fitting free block first
    fn allocate(&mut self, size: usize) -> Result<RawPtr<u8>, AllocError>;

    /// Return a block to the heap. `None` is ignored.
    fn deallocate(&mut self, ptr: Option<RawPtr<u8>>);

    /// Grow a block, preserving its contents. Shrinking returns the same
    /// pointer; a `new_size` of zero frees the block and returns `None`.
    fn resize(
        &mut self,
        ptr: Option<RawPtr<u8>>,
        new_size: usize,
    ) -> Result<Option<RawPtr<u8>>, AllocError>;

    /// Allocate `count * size` bytes, all zero
    fn allocate_zeroed(&mut self, count: usize, size: usize) -> Result<RawPtr<u8>, AllocError>;
}

/// Given the next free address in the heap region, return the payload
/// address of a block carved there: the first double-word boundary that
/// leaves room for the block prefix. `None` if the arithmetic overflows.
pub fn aligned_payload(free_addr: usize) -> Option<usize> {
    let unaligned = free_addr.checked_add(constants::HEADER_SIZE + constants::ALLOC_ALIGN_BYTES - 1)?;
    Some(unaligned & constants::ALLOC_ALIGN_MASK)
}
