use core::fmt;

use snafu::{GenerateImplicitData, Snafu};

/// Source location at which an [`AllocError`] was raised.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location(&'static core::panic::Location<'static>);

impl Location {
    #[must_use]
    pub fn file(&self) -> &'static str {
        self.0.file()
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.0.line()
    }
}

impl Default for Location {
    #[track_caller]
    fn default() -> Self {
        Self(core::panic::Location::caller())
    }
}

impl GenerateImplicitData for Location {
    #[track_caller]
    fn generate() -> Self {
        Self::default()
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Errors reported by the page allocator.
///
/// None of them is fatal: a failed call leaves the page table exactly as it
/// was before the call.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AllocError {
    /// No single page, page run or growth strategy can hold `size` bytes.
    #[snafu(display("out of memory, requested {size} bytes"))]
    OutOfMemory {
        size: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// The pointer does not reference the first page of a live run.
    #[snafu(display("invalid pointer {addr:#x}"))]
    InvalidPointer {
        addr: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// Zero-sized requests cannot be told apart from free pages.
    #[snafu(display("zero-sized request"))]
    ZeroSize {
        #[snafu(implicit)]
        location: Location,
    },
}

impl AllocError {
    /// Returns where the error was raised.
    #[must_use]
    pub fn location(&self) -> Location {
        match self {
            Self::OutOfMemory { location, .. }
            | Self::InvalidPointer { location, .. }
            | Self::ZeroSize { location } => *location,
        }
    }

    #[must_use]
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }

    #[must_use]
    pub fn is_invalid_pointer(&self) -> bool {
        matches!(self, Self::InvalidPointer { .. })
    }
}
