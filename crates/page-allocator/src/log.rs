//! Diagnostic hook for allocator requests.
//!
//! The allocator reports every public request to an optional [`Logger`] with
//! an [`Action`] label and a byte count. The hook has no influence on control
//! flow; an allocator without a logger simply skips it.

/// Kind of request being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::IsVariant)]
pub enum Action {
    #[display("Allocating")]
    Allocating,
    #[display("Reallocating")]
    Reallocating,
    #[display("Freeing")]
    Freeing,
}

/// Sink for allocator diagnostics.
///
/// Implementations must be `Sync` because a logger is shared by reference
/// with every allocator it is installed on, including allocators behind a
/// [`LockedPageAllocator`](crate::LockedPageAllocator) in a `static`.
pub trait Logger: Sync {
    /// Records a request.
    ///
    /// `bytes` is the requested size for [`Action::Allocating`] and
    /// [`Action::Reallocating`], and the released run size for
    /// [`Action::Freeing`] (zero when the pointer is rejected). A relocating
    /// reallocation is followed by the allocation of the new run and the
    /// release of the old one.
    fn log(&self, action: Action, bytes: usize);
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::string::ToString as _;

    use super::*;

    #[test]
    fn test_action_labels() {
        assert_eq!(Action::Allocating.to_string(), "Allocating");
        assert_eq!(Action::Reallocating.to_string(), "Reallocating");
        assert_eq!(Action::Freeing.to_string(), "Freeing");
        assert!(Action::Freeing.is_freeing());
        assert!(!Action::Allocating.is_reallocating());
    }
}
