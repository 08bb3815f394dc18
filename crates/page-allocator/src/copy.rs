//! Overlap-safe byte mover.
//!
//! Live data moves inside the arena when a run grows backward or is
//! relocated. Source and destination may overlap, so the copy direction is
//! picked from the relative position of the two regions.

/// Copies `n` bytes from `src` to `dst`.
///
/// The regions may overlap. Bytes are copied in ascending order when `dst`
/// is below `src` and in descending order otherwise, so every source byte is
/// read before it can be overwritten.
///
/// Does nothing if either pointer is null or `n` is zero.
///
/// # Safety
///
/// When `n` is non-zero and both pointers are non-null:
///
/// - `src..src + n` must be valid for reads
/// - `dst..dst + n` must be valid for writes
/// - both pointers must be derived from the same allocation when the regions
///   overlap
pub unsafe fn move_bytes(dst: *mut u8, src: *const u8, n: usize) {
    if dst.is_null() || src.is_null() || n == 0 {
        return;
    }

    unsafe {
        if dst.cast_const() < src {
            for i in 0..n {
                dst.add(i).write(src.add(i).read());
            }
        } else {
            for i in (0..n).rev() {
                dst.add(i).write(src.add(i).read());
            }
        }
    }
}
