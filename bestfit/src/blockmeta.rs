use crate::layout::ObjectLayout;

/// Stable index of a block header in the block directory
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(usize);

impl BlockId {
    pub fn new(index: usize) -> BlockId {
        BlockId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Which of the two block lists a header belongs to
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum BlockState {
    Free,
    Allocated,
}

/// Per-block metadata. `next` and `prev` link the header into the list
/// named by `state` and no other.
#[derive(Debug)]
pub struct BlockHeader<'l> {
    payload: usize,
    size: usize,
    state: BlockState,
    pub next: Option<BlockId>,
    pub prev: Option<BlockId>,
    marked: bool,
    layout: Option<&'l ObjectLayout>,
}

impl<'l> BlockHeader<'l> {
    /// A header for a freshly carved block, allocated but not yet linked
    pub fn new(payload: usize, size: usize) -> BlockHeader<'l> {
        BlockHeader {
            payload,
            size,
            state: BlockState::Allocated,
            next: None,
            prev: None,
            marked: false,
            layout: None,
        }
    }

    pub fn payload(&self) -> usize {
        self.payload
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn is_allocated(&self) -> bool {
        self.state == BlockState::Allocated
    }

    /// Change state. Only the directory may do this, and only while the
    /// header is unlinked.
    pub fn set_state(&mut self, state: BlockState) {
        self.state = state;
    }

    pub fn mark(&mut self) {
        self.marked = true;
    }

    pub fn unmark(&mut self) {
        self.marked = false;
    }

    pub fn is_marked(&self) -> bool {
        self.marked
    }

    pub fn layout(&self) -> Option<&'l ObjectLayout> {
        self.layout
    }

    pub fn set_layout(&mut self, layout: Option<&'l ObjectLayout>) {
        self.layout = layout;
    }
}
