use std::mem::size_of;

pub const WORD_SIZE: usize = size_of::<usize>();

/// Every payload address is a multiple of this many bytes (double-word
/// alignment).
pub const ALLOC_ALIGN_BYTES: usize = 16;
pub const ALLOC_ALIGN_MASK: usize = !(ALLOC_ALIGN_BYTES - 1);

/// The in-band block prefix that precedes every payload. The first word
/// holds the block's directory index, the second keeps the payload on a
/// double-word boundary.
pub const HEADER_SIZE: usize = WORD_SIZE * 2;

pub const KB: usize = 1024;
pub const MB: usize = KB * 1024;
pub const GB: usize = MB * 1024;

/// Address space reserved for a heap unless configured otherwise.
pub const DEFAULT_REGION_SIZE: usize = 2 * GB;
