use core::{
    alloc::{GlobalAlloc, Layout},
    ptr::{self, NonNull},
};

use spin::{Mutex, MutexGuard};

use crate::{PageAllocator, WORD_SIZE, log::Logger};

/// A [`PageAllocator`] behind a single spin lock.
///
/// Runs may span and merge across page boundaries, so every operation holds
/// the lock over the whole descriptor table and arena.
///
/// The type can be placed in a `static` and registered with
/// `#[global_allocator]`. Pages start on word boundaries, so layouts aligned
/// to more than [`WORD_SIZE`] bytes are refused.
///
/// ```rust
/// use core::alloc::{GlobalAlloc, Layout};
///
/// use page_allocator::LockedPageAllocator;
///
/// static HEAP: LockedPageAllocator<4, 256> = LockedPageAllocator::new();
///
/// let layout = Layout::from_size_align(100, 8).unwrap();
/// unsafe {
///     let ptr = HEAP.alloc(layout);
///     assert!(!ptr.is_null());
///     HEAP.dealloc(ptr, layout);
/// }
/// ```
pub struct LockedPageAllocator<const P: usize, const C: usize> {
    inner: Mutex<PageAllocator<P, C>>,
}

impl<const P: usize, const C: usize> Default for LockedPageAllocator<P, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const P: usize, const C: usize> LockedPageAllocator<P, C> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(PageAllocator::new()),
        }
    }

    /// Locks the allocator for exclusive use.
    pub fn lock(&self) -> MutexGuard<'_, PageAllocator<P, C>> {
        self.inner.lock()
    }

    pub fn set_logger(&self, logger: &'static dyn Logger) {
        self.lock().set_logger(logger);
    }

    fn supports(layout: Layout) -> bool {
        layout.size() > 0 && layout.align() <= WORD_SIZE
    }
}

unsafe impl<const P: usize, const C: usize> GlobalAlloc for LockedPageAllocator<P, C> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if !Self::supports(layout) {
            return ptr::null_mut();
        }
        self.lock()
            .alloc(layout.size())
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        let result = self.lock().free(ptr);
        debug_assert!(result.is_ok(), "dealloc of foreign pointer: {result:?}");
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let Some(ptr) = NonNull::new(ptr) else {
            return ptr::null_mut();
        };
        if layout.align() > WORD_SIZE {
            return ptr::null_mut();
        }
        self.lock()
            .realloc(ptr, new_size)
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }
}
