/// A region allocator for one large, contiguous span of address space that is:
///  - anonymous and private to the process
///  - readable and writable
///  - zero-initialized
///
/// On unix this maps the space with `mmap`, elsewhere it falls back to the
/// std Alloc API with page alignment.
///
/// Usage:
/// ```
/// extern crate regionalloc;
/// use regionalloc::Region;
///
/// let size = 1024 * 1024;
/// let region = Region::new(size).unwrap();
/// assert!(region.contains(region.start()));
/// ```
///
/// Normal scoping rules will call Region::drop() when `region` goes out of
/// scope, releasing the whole range back to the operating system.
use std::fmt;
use std::ptr::NonNull;

pub type RegionPtr = NonNull<u8>;
pub type RegionSize = usize;

/// Set of possible region reservation failures
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RegionError {
    /// The requested size was zero or can't be described to the allocator
    BadRequest,
    /// The operating system refused to hand over the address space
    OOM,
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RegionError::BadRequest => write!(f, "invalid region size requested"),
            RegionError::OOM => write!(f, "could not reserve region address space"),
        }
    }
}

impl std::error::Error for RegionError {}

/// A reserved span of zero-initialized, read-write address space
pub struct Region {
    ptr: RegionPtr,
    size: RegionSize,
}

impl Region {
    /// Reserve a new region of the given size in bytes.
    pub fn new(size: RegionSize) -> Result<Region, RegionError> {
        if size == 0 {
            return Err(RegionError::BadRequest);
        }

        let ptr = internal::alloc_region(size)?;
        log::debug!("reserved region {:p} of {} bytes", ptr.as_ptr(), size);

        Ok(Region { ptr, size })
    }

    /// Return the size in bytes of the region
    pub fn size(&self) -> RegionSize {
        self.size
    }

    /// Return a bare pointer to the base of the region
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// The first address inside the region
    pub fn start(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// The first address past the end of the region
    pub fn end(&self) -> usize {
        self.start() + self.size
    }

    /// Does the given address fall inside the region?
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.start() && addr < self.end()
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        log::debug!("releasing region {:p}", self.ptr.as_ptr());
        internal::dealloc_region(self.ptr, self.size);
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Region")
            .field("start", &format_args!("{:#x}", self.start()))
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(unix)]
mod internal {
    use super::{RegionError, RegionPtr, RegionSize};
    use std::ptr::{self, NonNull};

    pub fn alloc_region(size: RegionSize) -> Result<RegionPtr, RegionError> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            log::error!(
                "mmap of {} bytes failed: {}",
                size,
                std::io::Error::last_os_error()
            );
            return Err(RegionError::OOM);
        }

        NonNull::new(ptr as *mut u8).ok_or(RegionError::OOM)
    }

    pub fn dealloc_region(ptr: RegionPtr, size: RegionSize) {
        let result = unsafe { libc::munmap(ptr.as_ptr() as *mut libc::c_void, size) };
        if result != 0 {
            log::warn!(
                "munmap of region {:p} failed: {}",
                ptr.as_ptr(),
                std::io::Error::last_os_error()
            );
        }
    }
}

#[cfg(not(unix))]
mod internal {
    use super::{RegionError, RegionPtr, RegionSize};
    use std::alloc::{alloc_zeroed, dealloc, Layout};
    use std::ptr::NonNull;

    const PAGE_ALIGN: usize = 4096;

    pub fn alloc_region(size: RegionSize) -> Result<RegionPtr, RegionError> {
        let layout =
            Layout::from_size_align(size, PAGE_ALIGN).map_err(|_| RegionError::BadRequest)?;

        let ptr = unsafe { alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or(RegionError::OOM)
    }

    pub fn dealloc_region(ptr: RegionPtr, size: RegionSize) {
        unsafe {
            let layout = Layout::from_size_align_unchecked(size, PAGE_ALIGN);
            dealloc(ptr.as_ptr(), layout);
        }
    }
}
