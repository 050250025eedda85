use crate::rawptr::RawPtr;

/// The stack of pointers that are reachable when a collection begins.
/// Null entries are allowed and ignored by the tracer. Every collection
/// drains the stack, so roots must be inserted again before each cycle.
#[derive(Debug, Default)]
pub struct RootSet {
    stack: Vec<Option<RawPtr<u8>>>,
}

impl RootSet {
    pub fn new() -> RootSet {
        RootSet::default()
    }

    pub fn push(&mut self, ptr: Option<RawPtr<u8>>) {
        self.stack.push(ptr);
    }

    /// The outer `Option` is `None` once the stack is empty; the inner one
    /// is the (possibly null) pointer that was pushed.
    pub fn pop(&mut self) -> Option<Option<RawPtr<u8>>> {
        self.stack.pop()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
