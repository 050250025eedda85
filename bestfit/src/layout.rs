use std::error::Error;
use std::fmt;

use crate::constants::WORD_SIZE;

/// Reasons an object layout can't be described
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LayoutError {
    /// Objects must occupy at least one byte
    ZeroSize,
    /// The object size can't be represented
    TooLarge,
    /// A pointer field would extend past the end of the object
    OffsetOutOfBounds { offset: usize, size: usize },
    /// Two pointer fields share bytes
    OverlappingPointers { first: usize, second: usize },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LayoutError::ZeroSize => write!(f, "object layout has zero size"),
            LayoutError::TooLarge => write!(f, "object layout size overflows"),
            LayoutError::OffsetOutOfBounds { offset, size } => write!(
                f,
                "pointer field at offset {} does not fit in a {} byte object",
                offset, size
            ),
            LayoutError::OverlappingPointers { first, second } => write!(
                f,
                "pointer fields at offsets {} and {} overlap",
                first, second
            ),
        }
    }
}

impl Error for LayoutError {}

/// Describes an object type to the collector: its total size and the byte
/// offsets of every pointer-sized field that may hold a heap pointer.
///
/// Layouts are owned by client code. The heap only borrows them, so a layout
/// must outlive every object allocated with it.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectLayout {
    size: usize,
    pointer_offsets: Vec<usize>,
}

impl ObjectLayout {
    /// Describe an object of `size` bytes with pointer fields at the given
    /// offsets. The collector visits the fields in the order given.
    pub fn new<O: Into<Vec<usize>>>(size: usize, pointer_offsets: O) -> Result<ObjectLayout, LayoutError> {
        let pointer_offsets = pointer_offsets.into();

        if size == 0 {
            return Err(LayoutError::ZeroSize);
        }

        for &offset in &pointer_offsets {
            match offset.checked_add(WORD_SIZE) {
                Some(field_end) if field_end <= size => (),
                _ => return Err(LayoutError::OffsetOutOfBounds { offset, size }),
            }
        }

        let mut sorted = pointer_offsets.clone();
        sorted.sort_unstable();
        for pair in sorted.windows(2) {
            if pair[1] - pair[0] < WORD_SIZE {
                return Err(LayoutError::OverlappingPointers {
                    first: pair[0],
                    second: pair[1],
                });
            }
        }

        Ok(ObjectLayout {
            size,
            pointer_offsets,
        })
    }

    /// An object with no pointer fields
    pub fn leaf(size: usize) -> Result<ObjectLayout, LayoutError> {
        ObjectLayout::new(size, Vec::new())
    }

    /// An array of `count` pointers
    pub fn pointer_array(count: usize) -> Result<ObjectLayout, LayoutError> {
        let size = count.checked_mul(WORD_SIZE).ok_or(LayoutError::TooLarge)?;
        let offsets = (0..count).map(|i| i * WORD_SIZE).collect::<Vec<_>>();
        ObjectLayout::new(size, offsets)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn num_ptrs(&self) -> usize {
        self.pointer_offsets.len()
    }

    pub fn pointer_offsets(&self) -> &[usize] {
        &self.pointer_offsets
    }
}
