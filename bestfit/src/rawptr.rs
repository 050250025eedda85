use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;

/// A container for a bare pointer to a block payload of type `T`.
/// This is the only form in which heap addresses are handed to clients;
/// block prefixes and directory entries stay private to the heap.
pub struct RawPtr<T: Sized> {
    ptr: NonNull<T>,
}

impl<T: Sized> RawPtr<T> {
    /// Wrap a non-null pointer
    pub fn new(ptr: NonNull<T>) -> RawPtr<T> {
        RawPtr { ptr }
    }

    /// Wrap a bare pointer, `None` if it is null
    pub fn from_ptr(ptr: *const T) -> Option<RawPtr<T>> {
        NonNull::new(ptr as *mut T).map(RawPtr::new)
    }

    /// Reinterpret a word-sized integer, as stored in an object's pointer
    /// field, as a pointer. Zero is the null pointer and gives `None`.
    pub fn from_word(word: usize) -> Option<RawPtr<T>> {
        RawPtr::from_ptr(word as *const T)
    }

    /// Get the pointer value as a word-sized integer
    pub fn as_word(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Get the bare pointer
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Reinterpret the payload as another type
    pub fn cast<U: Sized>(&self) -> RawPtr<U> {
        RawPtr {
            ptr: self.ptr.cast(),
        }
    }

    /// Get a `&` reference to the object. Unsafe because there are no guarantees at this level
    /// about the internal pointer's validity.
    pub unsafe fn as_ref(&self) -> &T {
        self.ptr.as_ref()
    }

    /// Get a `&mut` reference to the object. Unsafe because there are no guarantees at this level
    /// about the internal pointer's validity.
    /// In addition, there can be no compile-time guarantees of mutable aliasing prevention.
    /// Use with caution!
    pub unsafe fn as_mut_ref(&mut self) -> &mut T {
        self.ptr.as_mut()
    }
}

impl<T> Clone for RawPtr<T> {
    fn clone(&self) -> RawPtr<T> {
        RawPtr { ptr: self.ptr }
    }
}

impl<T> Copy for RawPtr<T> {}

impl<T: Sized> PartialEq for RawPtr<T> {
    fn eq(&self, other: &RawPtr<T>) -> bool {
        self.ptr == other.ptr
    }
}

impl<T: Sized> Eq for RawPtr<T> {}

impl<T: Sized> Hash for RawPtr<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr.hash(state)
    }
}

impl<T: Sized> fmt::Debug for RawPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RawPtr({:p})", self.ptr.as_ptr())
    }
}

impl<T: Sized> fmt::Pointer for RawPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Pointer::fmt(&self.ptr, f)
    }
}
