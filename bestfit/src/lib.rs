//! A best-fit heap over one reserved address-space region, with a precise
//! mark-and-sweep collector on top.
//!
//! `Heap` is the plain allocator: allocate, deallocate, resize and
//! allocate_zeroed through the `AllocRaw` trait. `GcHeap` wraps it and adds
//! `allocate_typed`, `root_insert` and `collect`.

extern crate regionalloc;

/// Heap corruption and client contract violations can't be recovered from.
/// Log the diagnostic and panic, which aborts under the workspace profiles.
macro_rules! heap_fatal {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
        panic!($($arg)*)
    }};
}

mod allocator;
mod blockmeta;
pub mod constants;
mod directory;
mod gc;
mod heap;
mod layout;
mod rawptr;
mod roots;

pub use allocator::{AllocError, AllocRaw};

pub use gc::{CollectionStats, GcHeap};

pub use heap::{BlockIter, Heap, HeapConfig, HeapStats};

pub use layout::{LayoutError, ObjectLayout};

pub use rawptr::RawPtr;

pub use roots::RootSet;
