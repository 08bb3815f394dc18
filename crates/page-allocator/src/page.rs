use core::{fmt, ops::Range};

/// Index of a page in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PageIndex(usize);

impl fmt::Display for PageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl PageIndex {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn value(self) -> usize {
        self.0
    }

    /// Returns the byte offset of this page from the arena base.
    #[must_use]
    pub const fn byte_offset(self, page_size: usize) -> usize {
        self.0 * page_size
    }

    /// Converts a byte offset from the arena base into a page index.
    ///
    /// Returns `None` unless `offset` falls exactly on the start of one of
    /// `page_count` pages.
    #[must_use]
    pub const fn from_byte_offset(offset: usize, page_size: usize, page_count: usize) -> Option<Self> {
        if !offset.is_multiple_of(page_size) {
            return None;
        }
        let index = offset / page_size;
        if index >= page_count {
            return None;
        }
        Some(Self(index))
    }
}

/// Bookkeeping record of a single page.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageDescriptor {
    /// Payload bytes accounted to this page; zero means the page is free.
    pub(crate) used_size: usize,
    /// The next page belongs to the same run as this one.
    pub(crate) is_continuation: bool,
}

impl PageDescriptor {
    pub const FREE: Self = Self {
        used_size: 0,
        is_continuation: false,
    };

    #[must_use]
    pub const fn used_size(self) -> usize {
        self.used_size
    }

    #[must_use]
    pub const fn is_continuation(self) -> bool {
        self.is_continuation
    }

    #[must_use]
    pub const fn is_free(self) -> bool {
        self.used_size == 0
    }
}

/// A live allocation: physically contiguous pages allocated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub(crate) start: PageIndex,
    pub(crate) page_count: usize,
    pub(crate) size: usize,
}

impl Run {
    /// First page of the run. Pointers handed out by the allocator point here.
    #[must_use]
    pub const fn start(&self) -> PageIndex {
        self.start
    }

    /// Terminal page of the run.
    #[must_use]
    pub const fn last(&self) -> PageIndex {
        PageIndex(self.start.0 + self.page_count - 1)
    }

    #[must_use]
    pub const fn page_count(&self) -> usize {
        self.page_count
    }

    /// Payload bytes of the run.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Page indices covered by the run.
    #[must_use]
    pub const fn pages(&self) -> Range<usize> {
        self.start.0..self.start.0 + self.page_count
    }
}
