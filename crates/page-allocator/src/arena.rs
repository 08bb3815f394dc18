use core::{cell::UnsafeCell, marker::PhantomPinned, ops::Range, ptr::NonNull, slice};

use crate::{DEBUG_FILL, WORD_SIZE, copy, page::PageIndex};

/// One page of the arena.
///
/// The page size is a multiple of the word size, so pages are laid out
/// back-to-back without padding and every page starts word aligned.
#[repr(C, align(8))]
struct Page<const C: usize>([u8; C]);
const _: () = assert!(align_of::<Page<8>>() == WORD_SIZE);

/// Backing store for all user data: `P` pages of `C` bytes each.
///
/// Run pointers handed out to callers alias the pages while the allocator is
/// borrowed again, so every access goes through the raw pointer of the cell
/// and the arena opts out of `&mut` uniqueness.
pub(crate) struct Arena<const P: usize, const C: usize> {
    pages: UnsafeCell<[Page<C>; P]>,
    _pinned: PhantomPinned,
}

impl<const P: usize, const C: usize> Arena<P, C> {
    pub(crate) const LEN: usize = P * C;

    const GEOMETRY: () = {
        assert!(P > 0, "arena must contain at least one page");
        assert!(C > 0, "page size must be non-zero");
        assert!(
            C.is_multiple_of(WORD_SIZE),
            "page size must be a multiple of the word size"
        );
        assert!(size_of::<Page<C>>() == C);
    };

    /// Creates an arena filled with [`DEBUG_FILL`].
    pub(crate) const fn new() -> Self {
        let () = Self::GEOMETRY;
        Self {
            pages: UnsafeCell::new([const { Page([DEBUG_FILL; C]) }; P]),
            _pinned: PhantomPinned,
        }
    }

    fn as_ptr(&self) -> *mut u8 {
        self.pages.get().cast()
    }

    /// Address of the first byte of the arena.
    pub(crate) fn base_addr(&self) -> usize {
        self.as_ptr().addr()
    }

    pub(crate) fn fill(&mut self, byte: u8) {
        unsafe { self.as_ptr().write_bytes(byte, Self::LEN) }
    }

    /// Returns a pointer to the start of page `index`.
    ///
    /// The pointer carries the provenance of the whole arena, so a run
    /// spanning several pages can be accessed through it.
    pub(crate) fn page_ptr(&self, index: PageIndex) -> NonNull<u8> {
        assert!(index.value() < P, "page index out of range: {index}");
        let offset = index.byte_offset(C);
        unsafe { NonNull::new_unchecked(self.as_ptr().add(offset)) }
    }

    fn check_range(range: &Range<usize>) {
        assert!(
            range.start <= range.end && range.end <= Self::LEN,
            "byte range {range:?} outside the arena"
        );
    }

    /// Returns the bytes `range` of the arena.
    pub(crate) fn bytes(&self, range: Range<usize>) -> &[u8] {
        Self::check_range(&range);
        unsafe { slice::from_raw_parts(self.as_ptr().add(range.start), range.len()) }
    }

    pub(crate) fn bytes_mut(&mut self, range: Range<usize>) -> &mut [u8] {
        Self::check_range(&range);
        unsafe { slice::from_raw_parts_mut(self.as_ptr().add(range.start), range.len()) }
    }

    /// Moves `len` bytes from page `src` to page `dst` within the arena.
    ///
    /// The source and destination ranges may overlap.
    pub(crate) fn move_pages(&mut self, dst: PageIndex, src: PageIndex, len: usize) {
        let dst_offset = dst.byte_offset(C);
        let src_offset = src.byte_offset(C);
        assert!(
            dst_offset + len <= Self::LEN && src_offset + len <= Self::LEN,
            "move of {len} bytes runs past the end of the arena"
        );

        let base = self.as_ptr();
        unsafe {
            copy::move_bytes(base.add(dst_offset), base.add(src_offset), len);
        }
    }
}
