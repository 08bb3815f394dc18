//! Page-table allocator over a fixed, statically sized arena.
//!
//! This crate provides `alloc`, `realloc` and `free` over a contiguous byte
//! arena reserved up front, without relying on any other allocator. It is
//! `no_std` and meant for bare-metal environments where the whole heap is a
//! pre-reserved block of memory.
//!
//! # Memory Layout
//!
//! The arena is split into `P` pages of `C` bytes. Allocation metadata lives
//! apart from user data, in a table with one [`PageDescriptor`] per page:
//!
//! - `used_size`: payload bytes accounted to the page, zero when free
//! - `is_continuation`: the next page belongs to the same allocation
//!
//! An allocation ([`Run`]) is a sequence of contiguous pages in which every
//! page but the last carries the continuation flag. Every page but the last is
//! full; the last page holds the remainder. Pointers handed out always point to
//! the first page of a run.
//!
//! ```text
//!             ┌─────────── arena (P × C bytes) ───────────┐
//!             ┌──────────┬──────────┬──────────┬──────────┐
//!             │  page 0  │  page 1  │  page 2  │  page 3  │
//!             └──────────┴──────────┴──────────┴──────────┘
//! descriptors   C, cont    C, cont   rem, end     free
//!             └────────── one run ─────────────┘
//! ```
//!
//! The reference geometry is [`DefaultPageAllocator`]: 16 pages of
//! 512 words (4096 bytes), 64 KiB in total.
//!
//! # Usage Example
//!
//! ```rust
//! use page_allocator::PageAllocator;
//!
//! // Boxed so that the arena does not move while pointers into it are live.
//! let mut allocator = Box::new(PageAllocator::<8, 256>::new());
//!
//! let ptr = allocator.alloc(100).unwrap();
//! allocator.payload_mut(ptr).unwrap().fill(0x5a);
//!
//! // Grows in place into the free pages that follow.
//! let ptr = allocator.realloc(ptr, 600).unwrap();
//! assert_eq!(allocator.run(ptr).unwrap().page_count(), 3);
//! assert!(allocator.payload(ptr).unwrap()[..100].iter().all(|&b| b == 0x5a));
//!
//! allocator.free(ptr).unwrap();
//! ```
//!
//! # Integrity Repair
//!
//! `free` only clears the used sizes of a run. Before every operation the
//! allocator runs [`PageAllocator::sanity_check`], which drops the
//! continuation flag of every free page and of the last page, so run walks
//! always terminate inside the table.
//!
//! # Thread Safety
//!
//! [`PageAllocator`] requires `&mut self` for every mutation.
//! [`LockedPageAllocator`] wraps it in a spin lock and implements
//! [`GlobalAlloc`](core::alloc::GlobalAlloc).

#![no_std]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub use self::{
    allocator::{PageAllocator, Usage},
    error::{AllocError, Location},
    locked::LockedPageAllocator,
    log::{Action, Logger},
    page::{PageDescriptor, PageIndex, Run},
    table::Runs,
};

mod allocator;
mod arena;
pub mod copy;
mod error;
mod locked;
mod log;
mod page;
mod table;

/// Size of a storage word. Pages are word aligned and a whole number of words
/// long.
pub const WORD_SIZE: usize = 8;

/// Number of pages in the reference geometry.
pub const DEFAULT_PAGE_COUNT: usize = 16;

/// Page size of the reference geometry.
pub const DEFAULT_PAGE_SIZE: usize = 512 * WORD_SIZE;

/// Byte pattern the arena is filled with on initialization.
pub const DEBUG_FILL: u8 = 0xaa;

/// Allocator with the reference geometry: 16 pages of 4096 bytes.
pub type DefaultPageAllocator = PageAllocator<DEFAULT_PAGE_COUNT, DEFAULT_PAGE_SIZE>;
