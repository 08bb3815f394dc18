//! Page descriptor table.
//!
//! Runs are not stored explicitly. A run is recovered by walking forward from
//! its first page while the current page carries the continuation flag. The
//! last page never carries the flag, which bounds every walk.

use core::{iter::FusedIterator, ops::Range};

use crate::page::{PageDescriptor, PageIndex, Run};

pub(crate) struct PageTable<const P: usize, const C: usize> {
    descriptors: [PageDescriptor; P],
}

impl<const P: usize, const C: usize> PageTable<P, C> {
    pub(crate) const fn new() -> Self {
        Self {
            descriptors: [PageDescriptor::FREE; P],
        }
    }

    pub(crate) fn reset(&mut self) {
        self.descriptors.fill(PageDescriptor::FREE);
    }

    pub(crate) fn descriptors(&self) -> &[PageDescriptor; P] {
        &self.descriptors
    }

    /// Restores the flag invariants: free pages never continue a run, and
    /// the last page never continues past the end of the table.
    pub(crate) fn sanity_check(&mut self) {
        for desc in &mut self.descriptors {
            if desc.is_free() {
                desc.is_continuation = false;
            }
        }
        if let Some(last) = self.descriptors.last_mut() {
            last.is_continuation = false;
        }
    }

    /// Returns `true` if `index` is the first page of a live run.
    pub(crate) fn is_run_start(&self, index: PageIndex) -> bool {
        let i = index.value();
        !self.descriptors[i].is_free() && (i == 0 || !self.descriptors[i - 1].is_continuation)
    }

    /// Walks the run starting at `start`.
    pub(crate) fn run_at(&self, start: PageIndex) -> Run {
        let mut last = start.value();
        let mut size = self.descriptors[last].used_size;
        while self.descriptors[last].is_continuation && last + 1 < P {
            last += 1;
            size += self.descriptors[last].used_size;
        }
        Run {
            start,
            page_count: last - start.value() + 1,
            size,
        }
    }

    /// Finds the first `count` contiguous free pages.
    pub(crate) fn find_free_run(&self, count: usize) -> Option<PageIndex> {
        assert!(count > 0, "page count must be non-zero");
        let mut streak = 0;
        for (i, desc) in self.descriptors.iter().enumerate() {
            if !desc.is_free() {
                streak = 0;
                continue;
            }
            streak += 1;
            if streak == count {
                return Some(PageIndex::new(i + 1 - count));
            }
        }
        None
    }

    /// Counts free pages directly after `last`, up to `limit`.
    pub(crate) fn free_after(&self, last: PageIndex, limit: usize) -> usize {
        self.descriptors[last.value() + 1..]
            .iter()
            .take_while(|desc| desc.is_free())
            .take(limit)
            .count()
    }

    /// Counts free pages directly before `first`, up to `limit`.
    pub(crate) fn free_before(&self, first: PageIndex, limit: usize) -> usize {
        self.descriptors[..first.value()]
            .iter()
            .rev()
            .take_while(|desc| desc.is_free())
            .take(limit)
            .count()
    }

    /// Writes the descriptors of a `count`-page run holding `size` bytes.
    ///
    /// Every page but the last is accounted as full; the last page takes the
    /// remainder.
    pub(crate) fn claim(&mut self, start: PageIndex, count: usize, size: usize) {
        assert!(count > 0, "page count must be non-zero");
        assert!(
            size > (count - 1) * C && size <= count * C,
            "run of {count} pages cannot hold {size} bytes"
        );

        let end = start.value() + count - 1;
        for desc in &mut self.descriptors[start.value()..end] {
            desc.used_size = C;
            desc.is_continuation = true;
        }
        self.descriptors[end] = PageDescriptor {
            used_size: size - (count - 1) * C,
            is_continuation: false,
        };
    }

    /// Marks every page of `run` free.
    ///
    /// Continuation flags are left as they are; [`Self::sanity_check`]
    /// normalizes them before the next operation.
    pub(crate) fn release(&mut self, run: &Run) {
        for desc in &mut self.descriptors[run.pages()] {
            desc.used_size = 0;
        }
    }

    /// Resets the descriptors in `pages` to [`PageDescriptor::FREE`].
    pub(crate) fn clear(&mut self, pages: Range<usize>) {
        self.descriptors[pages].fill(PageDescriptor::FREE);
    }

    pub(crate) fn runs(&self) -> Runs<'_> {
        Runs {
            descriptors: &self.descriptors,
            next: 0,
        }
    }
}

/// Iterator over the live runs of an allocator, in address order.
///
/// Free pages are skipped and a continuation flag pointing at a free page
/// ends the run, so a table with flags not yet normalized is still walked
/// correctly.
#[derive(Debug, Clone)]
pub struct Runs<'a> {
    descriptors: &'a [PageDescriptor],
    next: usize,
}

impl Iterator for Runs<'_> {
    type Item = Run;

    fn next(&mut self) -> Option<Self::Item> {
        let descriptors = self.descriptors;
        let start = self.next + descriptors[self.next..].iter().position(|d| !d.is_free())?;

        let mut last = start;
        let mut size = descriptors[last].used_size;
        while descriptors[last].is_continuation
            && last + 1 < descriptors.len()
            && !descriptors[last + 1].is_free()
        {
            last += 1;
            size += descriptors[last].used_size;
        }
        self.next = last + 1;

        Some(Run {
            start: PageIndex::new(start),
            page_count: last - start + 1,
            size,
        })
    }
}

impl FusedIterator for Runs<'_> {}
