#![allow(dead_code)]

use kernel_heap::{FreeListMemoryManager, HeapRegion, NoPaging, VirtualMemory};
use kernel_memory_addresses::VirtualAddress;
use std::ptr::NonNull;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// `len` fresh bytes presented as `start..start + len`.
pub fn region_at(start: usize, len: usize) -> HeapRegion {
    let memory = vec![0u8; len].leak();
    let base = NonNull::new(memory.as_mut_ptr()).unwrap();
    unsafe {
        HeapRegion::new(
            base,
            VirtualAddress::new(start),
            VirtualAddress::new(start + len),
        )
    }
}

pub fn heap_at(start: usize, len: usize) -> FreeListMemoryManager {
    heap_with(NoPaging, start, len)
}

pub fn heap_with<V>(paging: V, start: usize, len: usize) -> FreeListMemoryManager<V> {
    let heap = FreeListMemoryManager::new(paging);
    heap.initialize(region_at(start, len)).unwrap();
    heap
}

/// Paging service that records every unmap request.
#[derive(Default)]
pub struct RecordingPaging {
    initialized: AtomicBool,
    calls: Mutex<Vec<(VirtualAddress, VirtualAddress)>>,
}

impl RecordingPaging {
    pub fn initialized() -> Self {
        let paging = Self::default();
        paging.set_initialized();
        paging
    }

    pub fn set_initialized(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(VirtualAddress, VirtualAddress)> {
        self.calls.lock().unwrap().clone()
    }
}

impl VirtualMemory for RecordingPaging {
    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn unmap(&self, start: VirtualAddress, end_inclusive: VirtualAddress) {
        self.calls.lock().unwrap().push((start, end_inclusive));
    }
}

/// Free sizes add up to `free_memory`, chunks are address-ordered, inside
/// the region and fully coalesced.
pub fn assert_free_list_consistent<V>(heap: &FreeListMemoryManager<V>) {
    let chunks = heap.free_chunks(|chunks| chunks.collect::<Vec<_>>());
    let total: usize = chunks.iter().map(|c| c.size).sum();
    assert_eq!(total, heap.free_memory(), "free_memory out of sync");

    for c in &chunks {
        assert!(c.header >= heap.start_address());
        assert!(c.end() <= heap.end_address());
    }
    for pair in chunks.windows(2) {
        assert!(
            pair[0].end() < pair[1].header,
            "free chunks {} and {} are unordered or unmerged",
            pair[0].header,
            pair[1].header
        );
    }
}

/// No block in `blocks` overlaps another block or a free chunk.
pub fn assert_disjoint<V>(heap: &FreeListMemoryManager<V>, blocks: &[(VirtualAddress, usize)]) {
    let mut ranges: Vec<(usize, usize)> = blocks
        .iter()
        .map(|&(p, len)| (p.as_usize(), p.as_usize() + len))
        .collect();
    heap.free_chunks(|chunks| {
        ranges.extend(chunks.map(|c| (c.header.as_usize(), c.end().as_usize())));
    });
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "overlap: {pair:x?}");
    }
}

pub fn fill<V>(heap: &FreeListMemoryManager<V>, p: VirtualAddress, len: usize, byte: u8) {
    let ptr = heap.translate(p).unwrap();
    unsafe { std::ptr::write_bytes(ptr.as_ptr(), byte, len) };
}

pub fn is_filled<V>(heap: &FreeListMemoryManager<V>, p: VirtualAddress, len: usize, byte: u8) -> bool {
    let ptr = heap.translate(p).unwrap();
    unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) }
        .iter()
        .all(|&b| b == byte)
}
