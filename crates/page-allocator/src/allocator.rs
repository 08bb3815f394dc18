//! Page allocator over a fixed arena.
//!
//! # Algorithm
//!
//! - **Allocation**: a request of `size` bytes needs `ceil(size / C)` pages.
//!   The descriptor table is scanned from page 0 for the first run of that
//!   many contiguous free pages (first fit).
//! - **Deallocation**: the run starting at the given page is walked through
//!   its continuation flags and every page of it is marked free.
//! - **Reallocation**: the run keeps its address when the page count is
//!   unchanged or shrinks. When it grows, the run is extended forward into
//!   free pages after it, then backward into free pages before it (moving the
//!   payload down), and as a last resort relocated to a fresh run. A
//!   relocation is reported to the logger as an allocation of the new run and
//!   a release of the old one.
//!
//! Every public operation starts with an integrity repair pass
//! ([`PageAllocator::sanity_check`]).
//!
//! ```text
//!  page  0      1      2      3      4      5      6
//!      ┌──────┬──────┬──────┬──────┬──────┬──────┬──────┐
//! used │ 4096 │ 4096 │  100 │    0 │  812 │    0 │    0 │
//! cont │  yes │  yes │   no │   no │   no │   no │   no │
//!      └──────┴──────┴──────┴──────┴──────┴──────┴──────┘
//!       └─── run of 8292 bytes ──┘        └ run ┘
//! ```

use core::{cmp::Ordering, ptr::NonNull};

use snafu::{OptionExt as _, ensure};

use crate::{
    arena::Arena,
    error::{AllocError, InvalidPointerSnafu, OutOfMemorySnafu, ZeroSizeSnafu},
    log::{Action, Logger},
    page::{PageDescriptor, PageIndex, Run},
    table::{PageTable, Runs},
};

/// Page occupancy summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub used_pages: usize,
    pub free_pages: usize,
    /// Sum of the payload sizes of all live runs.
    pub payload_bytes: usize,
}

/// Allocator owning an arena of `P` pages of `C` bytes and its descriptor
/// table.
///
/// Pointers returned by [`alloc`](Self::alloc) and
/// [`realloc`](Self::realloc) point into the allocator itself. The allocator
/// must not be moved while they are in use; keep it in a `static` (see
/// [`LockedPageAllocator`](crate::LockedPageAllocator)) or behind a `Box`.
/// They stay usable for reads and writes across later calls, including calls
/// that borrow the allocator mutably.
///
/// # Thread Safety
///
/// Every mutating operation takes `&mut self`. Shared access needs a lock
/// around the whole allocator.
pub struct PageAllocator<const P: usize, const C: usize> {
    arena: Arena<P, C>,
    table: PageTable<P, C>,
    logger: Option<&'static dyn Logger>,
}

impl<const P: usize, const C: usize> Default for PageAllocator<P, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const P: usize, const C: usize> PageAllocator<P, C> {
    /// Number of pages in the arena.
    pub const PAGE_COUNT: usize = P;
    /// Capacity of a page in bytes.
    pub const PAGE_SIZE: usize = C;
    /// Capacity of the arena in bytes.
    pub const CAPACITY: usize = P * C;

    /// Creates an initialized allocator: every page is free and the arena is
    /// filled with [`DEBUG_FILL`](crate::DEBUG_FILL).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            arena: Arena::new(),
            table: PageTable::new(),
            logger: None,
        }
    }

    /// Resets the allocator to its initial state.
    ///
    /// Every live run is dropped and the arena is refilled with
    /// [`DEBUG_FILL`](crate::DEBUG_FILL). Pointers handed out earlier become
    /// invalid.
    pub fn initialize(&mut self) {
        self.table.reset();
        self.arena.fill(crate::DEBUG_FILL);
    }

    /// Installs a sink for request diagnostics.
    pub fn set_logger(&mut self, logger: &'static dyn Logger) {
        self.logger = Some(logger);
    }

    fn log(&self, action: Action, bytes: usize) {
        if let Some(logger) = self.logger {
            logger.log(action, bytes);
        }
    }

    /// Normalizes the descriptor flags.
    ///
    /// Free pages lose their continuation flag and the last page never
    /// continues. Every public operation runs this first; it is idempotent.
    pub fn sanity_check(&mut self) {
        self.table.sanity_check();
    }

    /// Number of pages needed to hold `size` bytes.
    const fn pages_for(size: usize) -> usize {
        size.div_ceil(C)
    }

    /// Allocates a run holding `size` bytes.
    ///
    /// Requests of up to `C` bytes take the first free page. Larger requests
    /// take the first run of `ceil(size / C)` contiguous free pages.
    ///
    /// # Errors
    ///
    /// - [`AllocError::ZeroSize`] if `size` is zero
    /// - [`AllocError::OutOfMemory`] if no sufficient run of free pages exists
    pub fn alloc(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.log(Action::Allocating, size);
        self.sanity_check();

        ensure!(size > 0, ZeroSizeSnafu);
        let start = self.allocate_run(size)?;
        Ok(self.arena.page_ptr(start))
    }

    fn allocate_run(&mut self, size: usize) -> Result<PageIndex, AllocError> {
        let page_count = Self::pages_for(size);
        ensure!(page_count <= P, OutOfMemorySnafu { size });

        let start = self
            .table
            .find_free_run(page_count)
            .context(OutOfMemorySnafu { size })?;
        self.table.claim(start, page_count, size);
        Ok(start)
    }

    /// Releases the run starting at `ptr`.
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidPointer`] if `ptr` is not the start of a live
    ///   run of this allocator
    pub fn free(&mut self, ptr: NonNull<u8>) -> Result<(), AllocError> {
        self.sanity_check();

        let run = self.run(ptr);
        self.log(Action::Freeing, run.as_ref().map_or(0, Run::size));
        self.table.release(&run?);
        Ok(())
    }

    /// Resizes the run starting at `ptr` to `size` bytes.
    ///
    /// Returns the (possibly moved) start of the run. The first
    /// `min(old_size, size)` bytes of the payload are preserved.
    ///
    /// - Same page count: the run stays in place.
    /// - Fewer pages: trailing pages are released; the run stays in place.
    /// - More pages: the run grows forward into the free pages after it if
    ///   they suffice, otherwise into the free pages both after and before it
    ///   (the start moves back and the payload is moved down), otherwise the
    ///   payload is copied to a freshly allocated run and the old one is
    ///   released.
    ///
    /// # Errors
    ///
    /// - [`AllocError::ZeroSize`] if `size` is zero
    /// - [`AllocError::InvalidPointer`] if `ptr` is not the start of a live
    ///   run of this allocator
    /// - [`AllocError::OutOfMemory`] if no growth strategy succeeds
    ///
    /// On error the run, its address and its content are left untouched.
    pub fn realloc(&mut self, ptr: NonNull<u8>, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.log(Action::Reallocating, size);
        self.sanity_check();

        ensure!(size > 0, ZeroSizeSnafu);
        let run = self.run(ptr)?;
        let page_count = Self::pages_for(size);
        ensure!(page_count <= P, OutOfMemorySnafu { size });

        match page_count.cmp(&run.page_count) {
            Ordering::Equal => {
                self.table.claim(run.start, page_count, size);
                Ok(ptr)
            }
            Ordering::Less => {
                let kept_end = run.start.value() + page_count;
                self.table.clear(kept_end..run.pages().end);
                self.table.claim(run.start, page_count, size);
                Ok(ptr)
            }
            Ordering::Greater => self.grow(&run, page_count, size),
        }
    }

    fn grow(&mut self, run: &Run, page_count: usize, size: usize) -> Result<NonNull<u8>, AllocError> {
        let extra = page_count - run.page_count;
        let following = self.table.free_after(run.last(), extra);
        let preceding = self.table.free_before(run.start, extra);

        if following == extra {
            self.table.claim(run.start, page_count, size);
            return Ok(self.arena.page_ptr(run.start));
        }

        if following + preceding >= extra {
            let start = PageIndex::new(run.start.value() - (extra - following));
            self.table.claim(start, page_count, size);
            self.arena.move_pages(start, run.start, run.size);
            return Ok(self.arena.page_ptr(start));
        }

        // The old run is still held, so the new one cannot overlap it.
        self.log(Action::Allocating, size);
        let start = self.allocate_run(size)?;
        self.arena.move_pages(start, run.start, run.size.min(size));
        self.log(Action::Freeing, run.size);
        self.table.release(run);
        Ok(self.arena.page_ptr(start))
    }

    /// Resolves `ptr` to the start page of a live run.
    fn resolve(&self, ptr: NonNull<u8>) -> Result<PageIndex, AllocError> {
        let addr = ptr.addr().get();
        let index = addr
            .checked_sub(self.arena.base_addr())
            .and_then(|offset| PageIndex::from_byte_offset(offset, C, P))
            .filter(|&index| self.table.is_run_start(index))
            .context(InvalidPointerSnafu { addr })?;
        Ok(index)
    }

    /// Returns the run starting at `ptr`.
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidPointer`] if `ptr` is not the start of a live
    ///   run of this allocator
    pub fn run(&self, ptr: NonNull<u8>) -> Result<Run, AllocError> {
        let start = self.resolve(ptr)?;
        Ok(self.table.run_at(start))
    }

    /// Returns the payload of the run starting at `ptr`.
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidPointer`] if `ptr` is not the start of a live
    ///   run of this allocator
    pub fn payload(&self, ptr: NonNull<u8>) -> Result<&[u8], AllocError> {
        let run = self.run(ptr)?;
        let offset = run.start.byte_offset(C);
        Ok(self.arena.bytes(offset..offset + run.size))
    }

    /// Returns the payload of the run starting at `ptr` for writing.
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidPointer`] if `ptr` is not the start of a live
    ///   run of this allocator
    pub fn payload_mut(&mut self, ptr: NonNull<u8>) -> Result<&mut [u8], AllocError> {
        let run = self.run(ptr)?;
        let offset = run.start.byte_offset(C);
        Ok(self.arena.bytes_mut(offset..offset + run.size))
    }

    /// Returns the start of page `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below `P`.
    #[must_use]
    pub fn page_address(&self, index: PageIndex) -> NonNull<u8> {
        self.arena.page_ptr(index)
    }

    #[must_use]
    pub fn descriptors(&self) -> &[PageDescriptor; P] {
        self.table.descriptors()
    }

    /// Returns the descriptor of page `index`, or `None` if out of range.
    #[must_use]
    pub fn descriptor(&self, index: PageIndex) -> Option<PageDescriptor> {
        self.table.descriptors().get(index.value()).copied()
    }

    /// Iterates over the live runs in address order.
    pub fn runs(&self) -> Runs<'_> {
        self.table.runs()
    }

    #[must_use]
    pub fn usage(&self) -> Usage {
        let used_pages = self
            .descriptors()
            .iter()
            .filter(|desc| !desc.is_free())
            .count();
        let payload_bytes = self.descriptors().iter().map(|desc| desc.used_size()).sum();
        Usage {
            used_pages,
            free_pages: P - used_pages,
            payload_bytes,
        }
    }
}
