#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))]
#![cfg(test)]

use std::ptr::NonNull;

use page_allocator::{
    DEFAULT_PAGE_SIZE, DefaultPageAllocator, PageAllocator, PageIndex, Run, WORD_SIZE,
};
use proptest::prelude::*;

const C: usize = DEFAULT_PAGE_SIZE;

fn page_of<const P: usize, const N: usize>(
    allocator: &PageAllocator<P, N>,
    ptr: NonNull<u8>,
) -> usize {
    let base = allocator.page_address(PageIndex::new(0)).addr().get();
    (ptr.addr().get() - base) / N
}

/// Checks that live runs are disjoint and well formed.
fn assert_consistent<const P: usize, const N: usize>(allocator: &PageAllocator<P, N>) {
    let runs: Vec<Run> = allocator.runs().collect();
    let descriptors = allocator.descriptors();

    let mut owner = [None::<usize>; P];
    for (i, run) in runs.iter().enumerate() {
        for page in run.pages() {
            assert_eq!(owner[page], None, "page {page} belongs to two runs");
            owner[page] = Some(i);
        }
        let last = run.last().value();
        for page in run.pages().filter(|&page| page != last) {
            assert_eq!(descriptors[page].used_size(), N);
            assert!(descriptors[page].is_continuation());
        }
        assert!((1..=N).contains(&descriptors[last].used_size()));
        assert_eq!(
            run.size(),
            (run.page_count() - 1) * N + descriptors[last].used_size()
        );
    }
    for (page, desc) in descriptors.iter().enumerate() {
        assert_eq!(desc.is_free(), owner[page].is_none(), "page {page}");
    }
}

#[test]
fn end_to_end_reference_geometry() {
    let mut allocator = Box::new(DefaultPageAllocator::new());

    let first = allocator.alloc(100).unwrap();
    assert_eq!(page_of(&allocator, first), 0);
    assert_eq!(allocator.descriptors()[0].used_size(), 100);
    assert!(first.addr().get().is_multiple_of(WORD_SIZE));

    let second = allocator.alloc(100).unwrap();
    assert_eq!(page_of(&allocator, second), 1);

    allocator.free(first).unwrap();
    assert!(allocator.descriptors()[0].is_free());
    assert_eq!(allocator.descriptors()[1].used_size(), 100);

    // page 0 alone is too small, page 1 is occupied
    let big = allocator.alloc(C * 3 + 1).unwrap();
    assert_eq!(page_of(&allocator, big), 2);
    let run = allocator.run(big).unwrap();
    assert_eq!(run.pages(), 2..6);
    assert_eq!(run.size(), C * 3 + 1);
    assert_eq!(allocator.descriptors()[5].used_size(), 1);
    assert_consistent(&allocator);
}

#[test]
fn exact_page_multiples_are_boundaries() {
    let mut allocator = Box::new(DefaultPageAllocator::new());

    let one = allocator.alloc(C).unwrap();
    assert_eq!(allocator.run(one).unwrap().page_count(), 1);

    let two = allocator.alloc(2 * C).unwrap();
    let run = allocator.run(two).unwrap();
    assert_eq!(run.page_count(), 2);
    assert_eq!(allocator.descriptors()[run.last().value()].used_size(), C);

    let two_and_a_bit = allocator.alloc(2 * C + 1).unwrap();
    assert_eq!(allocator.run(two_and_a_bit).unwrap().page_count(), 3);
    assert_consistent(&allocator);
}

#[test]
fn capacity_bound_holds_for_all_geometries() {
    fn check<const P: usize, const N: usize>() {
        let mut allocator = Box::new(PageAllocator::<P, N>::new());
        assert!(allocator.alloc(P * N + 1).unwrap_err().is_out_of_memory());
        assert!(allocator.alloc((P + 1) * N).unwrap_err().is_out_of_memory());

        let all = allocator.alloc(P * N).unwrap();
        assert!(allocator.alloc(1).unwrap_err().is_out_of_memory());
        assert!(allocator.realloc(all, P * N + 1).unwrap_err().is_out_of_memory());
        assert_consistent(&allocator);
    }

    check::<1, 8>();
    check::<4, 64>();
    check::<16, 4096>();
    check::<3, 24>();
}

#[test]
fn grow_backward_into_preceding_page() {
    let mut allocator = Box::new(DefaultPageAllocator::new());

    // pages 0..=4 and 7 occupied, then page 4 released
    let mut fillers: Vec<_> = (0..5).map(|_| allocator.alloc(1).unwrap()).collect();
    let run = allocator.alloc(2 * C).unwrap();
    assert_eq!(page_of(&allocator, run), 5);
    let _blocker = allocator.alloc(1).unwrap();
    allocator.free(fillers.pop().unwrap()).unwrap();

    for (i, b) in allocator.payload_mut(run).unwrap().iter_mut().enumerate() {
        *b = (i % 253) as u8;
    }

    let moved = allocator.realloc(run, 3 * C).unwrap();
    assert_eq!(page_of(&allocator, moved), 4);
    assert_eq!(allocator.run(moved).unwrap().pages(), 4..7);

    let payload = allocator.payload(moved).unwrap();
    assert!(
        payload[..2 * C]
            .iter()
            .enumerate()
            .all(|(i, &b)| b == (i % 253) as u8)
    );
    assert_consistent(&allocator);
}

#[test]
fn relocation_preserves_content() {
    let mut allocator = Box::new(DefaultPageAllocator::new());

    let ptr = allocator.alloc(300).unwrap();
    let _neighbour = allocator.alloc(1).unwrap();
    for (i, b) in allocator.payload_mut(ptr).unwrap().iter_mut().enumerate() {
        *b = (i * 7) as u8;
    }

    let moved = allocator.realloc(ptr, 5 * C).unwrap();
    assert_ne!(moved, ptr);
    assert_eq!(page_of(&allocator, moved), 2);
    assert!(allocator.descriptors()[0].is_free());

    let payload = allocator.payload(moved).unwrap();
    assert!(payload[..300].iter().enumerate().all(|(i, &b)| b == (i * 7) as u8));
    assert_consistent(&allocator);
}

#[test]
fn shrink_then_grow_restores_page_count() {
    let mut allocator = Box::new(DefaultPageAllocator::new());

    let size = 4 * C + 17;
    let ptr = allocator.alloc(size).unwrap();
    let _other = allocator.alloc(C).unwrap();
    let original = allocator.run(ptr).unwrap().page_count();

    let shrunk = allocator.realloc(ptr, 10).unwrap();
    assert_eq!(shrunk, ptr);
    assert_eq!(allocator.run(shrunk).unwrap().page_count(), 1);

    let _squatter = allocator.alloc(C).unwrap();
    let regrown = allocator.realloc(shrunk, size).unwrap();
    assert_eq!(allocator.run(regrown).unwrap().page_count(), original);
    assert_eq!(allocator.run(regrown).unwrap().size(), size);
    assert_consistent(&allocator);
}

#[test]
fn free_then_reuse_same_pages() {
    let mut allocator = Box::new(DefaultPageAllocator::new());

    let _a = allocator.alloc(C).unwrap();
    let b = allocator.alloc(3 * C).unwrap();
    let _c = allocator.alloc(C).unwrap();
    let pages = allocator.run(b).unwrap().pages();

    allocator.free(b).unwrap();
    let again = allocator.alloc(2 * C + 5).unwrap();
    assert_eq!(again, b);
    assert_eq!(allocator.run(again).unwrap().pages(), pages.start..pages.end);
    assert_consistent(&allocator);
}

#[derive(Debug, Clone)]
enum Step {
    Alloc(usize),
    Realloc(usize, usize),
    Free(usize),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        (1..=5 * 64_usize).prop_map(Step::Alloc),
        (any::<usize>(), 1..=6 * 64_usize).prop_map(|(i, size)| Step::Realloc(i, size)),
        any::<usize>().prop_map(Step::Free),
    ]
}

/// Runs `steps` on a small arena, checking content and layout after each one.
fn run_steps(steps: Vec<Step>) {
    let mut allocator = Box::new(PageAllocator::<12, 64>::new());
    let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();

    for (step_index, step) in steps.into_iter().enumerate() {
        let tag = u8::try_from(step_index % 251).unwrap();
        match step {
            Step::Alloc(size) => {
                if let Ok(ptr) = allocator.alloc(size) {
                    allocator.payload_mut(ptr).unwrap().fill(tag);
                    live.push((ptr, size, tag));
                }
            }
            Step::Realloc(i, new_size) if !live.is_empty() => {
                let i = i % live.len();
                let (ptr, size, old_tag) = live[i];
                match allocator.realloc(ptr, new_size) {
                    Ok(new_ptr) => {
                        let payload = allocator.payload_mut(new_ptr).unwrap();
                        assert_eq!(payload.len(), new_size);
                        let kept = size.min(new_size);
                        assert!(payload[..kept].iter().all(|&b| b == old_tag));
                        payload.fill(tag);
                        live[i] = (new_ptr, new_size, tag);
                    }
                    Err(err) => {
                        assert!(err.is_out_of_memory());
                        let payload = allocator.payload(ptr).unwrap();
                        assert_eq!(payload.len(), size);
                        assert!(payload.iter().all(|&b| b == old_tag));
                    }
                }
            }
            Step::Free(i) if !live.is_empty() => {
                let (ptr, _, _) = live.swap_remove(i % live.len());
                allocator.free(ptr).unwrap();
            }
            Step::Realloc(..) | Step::Free(_) => {}
        }

        assert_consistent(&allocator);
        for &(ptr, size, tag) in &live {
            let payload = allocator.payload(ptr).unwrap();
            assert_eq!(payload.len(), size);
            assert!(payload.iter().all(|&b| b == tag));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_sequences_keep_runs_disjoint(
        steps in prop::collection::vec(step_strategy(), 1..200)
    ) {
        run_steps(steps);
    }
}

#[test]
fn invalid_pointers_are_rejected_without_side_effects() {
    let mut allocator = Box::new(DefaultPageAllocator::new());
    let ptr = allocator.alloc(2 * C).unwrap();
    let before = allocator.descriptors().to_vec();

    let inner = unsafe { ptr.add(C) };
    assert!(allocator.free(inner).unwrap_err().is_invalid_pointer());
    assert!(allocator.realloc(inner, 10).unwrap_err().is_invalid_pointer());
    let misaligned = unsafe { ptr.add(WORD_SIZE) };
    assert!(allocator.realloc(misaligned, 10).unwrap_err().is_invalid_pointer());

    let mut foreign = [0_u8; 16];
    let foreign = NonNull::from(&mut foreign).cast::<u8>();
    assert!(allocator.free(foreign).unwrap_err().is_invalid_pointer());

    assert_eq!(allocator.descriptors().to_vec(), before);
}
