mod common;

use common::{assert_disjoint, assert_free_list_consistent, fill, heap_at, is_filled, region_at};
use kernel_heap::{
    FreeListMemoryManager, HEADER_SIZE, HeapError, HeapMemoryManager, MIN_BLOCK_SIZE,
    MemoryManager, NoPaging,
};
use kernel_memory_addresses::VirtualAddress;

const START: usize = 0x1000;
const LEN: usize = 0x1000;

#[test]
fn fresh_heap_is_one_chunk() {
    let heap = heap_at(START, LEN);
    assert_eq!(heap.free_memory(), 4096 - HEADER_SIZE);
    heap.free_chunks(|chunks| {
        let chunks: Vec<_> = chunks.collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].header, VirtualAddress::new(START));
        assert_eq!(chunks[0].end(), VirtualAddress::new(START + LEN));
    });
}

#[test]
fn allocations_split_and_coalesce_back() {
    let heap = heap_at(START, LEN);
    let initial = heap.free_memory();

    let p1 = heap.alloc(64).unwrap();
    assert_eq!(heap.free_memory(), initial - 64 - HEADER_SIZE);

    let p2 = heap.alloc(64).unwrap();
    assert_ne!(p1, p2);
    assert!(p2.as_usize() >= p1.as_usize() + 64 || p2.as_usize() + 64 <= p1.as_usize());
    assert_disjoint(&heap, &[(p1, 64), (p2, 64)]);

    heap.free(p1);
    assert_free_list_consistent(&heap);
    heap.free(p2);
    assert_eq!(heap.free_memory(), initial);
    assert_eq!(heap.free_chunks(|chunks| chunks.count()), 1);
}

#[test]
fn aligned_allocation_is_aligned() {
    let heap = heap_at(START, LEN);
    let p = heap.aligned_alloc(100, 16).unwrap();
    assert!(p.is_aligned(16));
    assert_free_list_consistent(&heap);
}

#[test]
fn oversized_request_changes_nothing() {
    let heap = heap_at(START, LEN);
    let before = heap.free_memory();
    assert_eq!(heap.alloc(LEN), None);
    assert_eq!(heap.alloc(before + 1), None);
    assert_eq!(heap.free_memory(), before);
    assert_eq!(heap.free_chunks(|chunks| chunks.count()), 1);
}

#[test]
fn zero_sized_requests_yield_nothing() {
    let heap = heap_at(START, LEN);
    assert_eq!(heap.alloc(0), None);
    assert_eq!(heap.aligned_alloc(0, 64), None);
    assert_eq!(heap.free_memory(), LEN - HEADER_SIZE);
}

#[test]
fn exact_fit_succeeds_once() {
    let heap = heap_at(START, LEN);
    let all = heap.free_memory();
    let p = heap.alloc(all).unwrap();
    assert_eq!(heap.free_memory(), 0);
    assert_eq!(heap.alloc(all), None);
    assert_eq!(heap.alloc(1), None);

    heap.free(p);
    assert_eq!(heap.free_memory(), all);
}

#[test]
fn sizes_round_up_to_four_bytes() {
    let heap = heap_at(START, LEN);
    let initial = heap.free_memory();
    let p = heap.alloc(1).unwrap();
    assert_eq!(heap.free_memory(), initial - 4 - HEADER_SIZE);
    let q = heap.alloc(5).unwrap();
    assert_eq!(q.as_usize(), p.as_usize() + 4 + HEADER_SIZE);
}

#[test]
fn invalid_frees_are_ignored() {
    let heap = heap_at(START, LEN);
    let p = heap.alloc(32).unwrap();
    let before = heap.free_memory();

    for _ in 0..3 {
        heap.free(VirtualAddress::NULL);
        heap.free(VirtualAddress::new(START - 0x100));
        heap.free(VirtualAddress::new(START + LEN + 1));
        heap.free(VirtualAddress::new(usize::MAX));
    }
    assert_eq!(heap.free_memory(), before);

    heap.free(p);
    assert_eq!(heap.free_memory(), LEN - HEADER_SIZE);
}

#[test]
fn initialize_reports_configuration_errors() {
    let heap = FreeListMemoryManager::new(NoPaging);
    assert_eq!(
        heap.initialize(region_at(START, HEADER_SIZE - 1)),
        Err(HeapError::RegionTooSmall {
            size: HEADER_SIZE - 1
        })
    );
    assert!(matches!(
        heap.initialize(region_at(0, 0x100)),
        Err(HeapError::InvalidRegion { .. })
    ));

    heap.initialize(region_at(START, LEN)).unwrap();
    assert_eq!(
        heap.initialize(region_at(0x8000, LEN)),
        Err(HeapError::AlreadyInitialized)
    );
    assert_eq!(heap.start_address(), VirtualAddress::new(START));
    assert_eq!(
        HeapError::RegionTooSmall { size: 3 }.to_string(),
        "heap region of 3 bytes cannot hold a free-list header"
    );
}

#[test]
fn realloc_preserves_contents_when_growing() {
    let heap = heap_at(START, LEN);
    let p = heap.alloc(40).unwrap();
    let blocker = heap.alloc(8).unwrap();
    fill(&heap, p, 40, 0xA5);

    // blocked behind: has to move
    let q = heap.realloc(p, 200).unwrap();
    assert_ne!(p, q);
    assert!(is_filled(&heap, q, 40, 0xA5));
    assert_disjoint(&heap, &[(q, 200), (blocker, 8)]);
    assert_free_list_consistent(&heap);

    // free space right behind: grows in place
    let r = heap.realloc(q, 400).unwrap();
    assert_eq!(q, r);
    assert!(is_filled(&heap, r, 40, 0xA5));
    assert_free_list_consistent(&heap);
}

#[test]
fn realloc_shrinks_in_place() {
    let heap = heap_at(START, LEN);
    let p = heap.alloc(256).unwrap();
    let _blocker = heap.alloc(8).unwrap();
    let before = heap.free_memory();
    fill(&heap, p, 256, 0x3C);

    assert_eq!(heap.realloc(p, 64), Some(p));
    assert_eq!(heap.free_memory(), before + 256 - 64 - HEADER_SIZE);
    assert!(is_filled(&heap, p, 64, 0x3C));

    // tail too small to become a chunk: nothing changes
    let freed = heap.free_memory();
    assert_eq!(heap.realloc(p, 64 - MIN_BLOCK_SIZE), Some(p));
    assert_eq!(heap.free_memory(), freed);
    assert_free_list_consistent(&heap);
}

#[test]
fn realloc_to_same_size_is_a_no_op() {
    let heap = heap_at(START, LEN);
    let p = heap.alloc(30).unwrap();
    let before = heap.free_memory();
    // 30 and 32 round to the same size
    assert_eq!(heap.realloc(p, 32), Some(p));
    assert_eq!(heap.free_memory(), before);
}

#[test]
fn failed_realloc_keeps_the_block() {
    let heap = heap_at(START, LEN);
    let p = heap.alloc(100).unwrap();
    let _blocker = heap.alloc(8).unwrap();
    fill(&heap, p, 100, 0x77);
    let before = heap.free_memory();

    assert_eq!(heap.realloc(p, LEN), None);
    assert_eq!(heap.free_memory(), before);
    assert!(is_filled(&heap, p, 100, 0x77));

    heap.free(p);
    assert_free_list_consistent(&heap);
}

#[test]
fn realloc_edge_cases() {
    let heap = heap_at(START, LEN);

    // null behaves as alloc
    let p = heap.realloc(VirtualAddress::NULL, 48).unwrap();
    assert!(heap.free_memory() < LEN - HEADER_SIZE);

    // foreign address: nothing happens
    let before = heap.free_memory();
    assert_eq!(heap.realloc(VirtualAddress::new(0x10_0000), 8), None);
    assert_eq!(heap.free_memory(), before);

    // zero size frees
    assert_eq!(heap.realloc(p, 0), None);
    assert_eq!(heap.free_memory(), LEN - HEADER_SIZE);
}

#[test]
fn aligned_realloc_moves_misaligned_blocks() {
    let heap = heap_at(START, LEN);
    let p = heap.alloc(64).unwrap();
    assert!(!p.is_aligned(128));
    fill(&heap, p, 64, 0x11);

    let q = heap.aligned_realloc(p, 64, 128).unwrap();
    assert!(q.is_aligned(128));
    assert!(is_filled(&heap, q, 64, 0x11));

    heap.aligned_free(q, 128);
    assert_eq!(heap.free_memory(), LEN - HEADER_SIZE);
}

#[test]
fn unusual_alignments() {
    let heap = heap_at(START, LEN);
    for alignment in [1, 3, 24, 100, 512] {
        let p = heap.aligned_alloc(20, alignment).unwrap();
        assert_eq!(p.as_usize() % alignment, 0, "alignment {alignment}");
        heap.free(p);
    }
    assert_eq!(heap.aligned_alloc(8, 0x2000), None);
    assert_eq!(heap.free_memory(), LEN - HEADER_SIZE);
}

#[test]
fn many_small_blocks_fill_and_drain() {
    let heap = heap_at(START, LEN);
    let mut blocks = Vec::new();
    while let Some(p) = heap.alloc(16) {
        blocks.push((p, 16));
    }
    assert!(blocks.len() >= LEN / (16 + HEADER_SIZE) - 1);
    assert_disjoint(&heap, &blocks);

    // every other block first, then the rest
    for &(p, _) in blocks.iter().step_by(2) {
        heap.free(p);
    }
    assert_free_list_consistent(&heap);
    for &(p, _) in blocks.iter().skip(1).step_by(2) {
        heap.free(p);
    }
    assert_eq!(heap.free_memory(), LEN - HEADER_SIZE);
    assert_eq!(heap.free_chunks(|chunks| chunks.count()), 1);
}

#[test]
fn generic_code_sees_the_traits() {
    fn churn(heap: &impl HeapMemoryManager) -> usize {
        let a = heap.alloc(10).unwrap();
        let b = heap.aligned_alloc(10, 64).unwrap().unwrap();
        let c = heap.realloc(a, 50).unwrap();
        heap.free(c);
        heap.aligned_free(b, 64).unwrap();
        heap.free_memory()
    }

    let heap = heap_at(START, LEN);
    assert_eq!(churn(&heap), LEN - HEADER_SIZE);

    let manager: &dyn MemoryManager = &heap;
    assert_eq!(manager.name(), "FreeListMemoryManager");
    assert_eq!(manager.total_memory(), LEN);
}

#[test]
fn dump_walks_the_list() {
    let heap = heap_at(START, LEN);
    let _a = heap.alloc(8).unwrap();
    let b = heap.alloc(8).unwrap();
    let _c = heap.alloc(8).unwrap();
    heap.free(b);
    heap.dump();
    assert_eq!(heap.free_chunks(|chunks| chunks.count()), 2);
}
