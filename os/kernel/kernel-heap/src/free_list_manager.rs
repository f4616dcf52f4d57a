//! # Free-list memory manager
//!
//! [`FreeListMemoryManager`] puts the address-ordered free list behind a
//! [`SpinLock`] and connects it to a paging service for lazy unmapping.
//!
//! ## Locking
//!
//! Every mutating operation holds the lock for its whole search-and-mutate
//! sequence. Statistics are mirrored into atomics after each locked section so
//! they can be read without contending.
//!
//! [`VirtualMemory::unmap`] is called with the lock held, right after the free
//! that produced the range. No other caller can carve the merged chunk before
//! its pages are gone, so the paging service must not call back into the heap.
//!
//! Payload copies when [`realloc`](FreeListMemoryManager::realloc) has to move
//! a block run outside the lock. Both blocks belong to the caller then.

use crate::free_list::{FreeChunks, FreeList, Resize, UnmapRange};
use crate::{HeapError, HeapMemoryManager, HeapRegion, MemoryManager, SIZE_GRANULE};
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use kernel_memory_addresses::{VirtualAddress, align_up};
use kernel_sync::SpinLock;
use kernel_vmem::{NoPaging, VirtualMemory};
use log::{debug, info, trace};

/// A kernel heap over one fixed region, using first-fit allocation from an
/// address-ordered, coalescing free list.
///
/// `V` is the paging service consulted when a free produces a chunk of at
/// least a page. [`NoPaging`] (the default) disables unmapping entirely.
///
/// ```rust
/// use kernel_heap::{FreeListMemoryManager, HeapRegion, NoPaging};
///
/// static HEAP: FreeListMemoryManager = FreeListMemoryManager::new(NoPaging);
///
/// let memory = vec![0u8; 4096].leak();
/// HEAP.initialize(HeapRegion::from_slice(memory)).unwrap();
///
/// let block = HEAP.alloc(100).unwrap();
/// let moved = HEAP.realloc(block, 200).unwrap();
/// HEAP.free(moved);
/// assert_eq!(HEAP.free_memory(), 4096 - kernel_heap::HEADER_SIZE);
/// ```
pub struct FreeListMemoryManager<V = NoPaging> {
    free_list: SpinLock<FreeList>,
    paging: V,
    start: AtomicUsize,
    end: AtomicUsize,
    free_memory: AtomicUsize,
    unmap_freed_memory: AtomicBool,
}

impl<V: Default> Default for FreeListMemoryManager<V> {
    fn default() -> Self {
        Self::new(V::default())
    }
}

impl<V> FreeListMemoryManager<V> {
    /// An uninitialized manager; every allocation fails until
    /// [`initialize`](Self::initialize) succeeds.
    #[must_use]
    pub const fn new(paging: V) -> Self {
        Self {
            free_list: SpinLock::new(FreeList::new()),
            paging,
            start: AtomicUsize::new(0),
            end: AtomicUsize::new(0),
            free_memory: AtomicUsize::new(0),
            unmap_freed_memory: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        "FreeListMemoryManager"
    }

    #[must_use]
    pub const fn paging(&self) -> &V {
        &self.paging
    }

    /// Run `f` on the locked free list and publish the resulting free byte count.
    fn with_free_list<R>(&self, f: impl FnOnce(&mut FreeList) -> R) -> R {
        self.free_list.with_lock(|list| {
            let result = f(list);
            self.free_memory.store(list.free_memory(), Ordering::Release);
            result
        })
    }

    /// Hand `region` to the manager as one free chunk.
    ///
    /// # Errors
    /// [`HeapError::InvalidRegion`] for empty, inverted or null-based regions,
    /// [`HeapError::RegionTooSmall`] if not even one header fits, and
    /// [`HeapError::AlreadyInitialized`] on a second call.
    pub fn initialize(&self, region: HeapRegion) -> Result<(), HeapError> {
        let (start, end) = (region.start(), region.end());
        self.with_free_list(|list| list.initialize(region))?;
        self.start.store(start.as_usize(), Ordering::Release);
        self.end.store(end.as_usize(), Ordering::Release);
        debug!(
            "free-list heap at {start}..{end}: {} bytes free",
            self.free_memory()
        );
        Ok(())
    }

    #[must_use]
    pub fn start_address(&self) -> VirtualAddress {
        VirtualAddress::new(self.start.load(Ordering::Acquire))
    }

    /// Exclusive end of the managed region.
    #[must_use]
    pub fn end_address(&self) -> VirtualAddress {
        VirtualAddress::new(self.end.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn total_memory(&self) -> usize {
        self.end_address()
            .distance_from(self.start_address())
            .unwrap_or(0)
    }

    /// Sum of the payload sizes of all free chunks. Advisory under concurrency.
    #[must_use]
    pub fn free_memory(&self) -> usize {
        self.free_memory.load(Ordering::Acquire)
    }

    /// Stop asking the paging service to unmap freed pages.
    pub fn disable_automatic_unmapping(&self) {
        self.unmap_freed_memory.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn unmaps_freed_memory(&self) -> bool {
        self.unmap_freed_memory.load(Ordering::Acquire)
    }

    /// Whether some caller currently holds the heap lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.free_list.is_locked()
    }

    /// Payload size recorded in the header of the allocated block at `ptr`.
    /// `None` for addresses whose header would fall outside the region.
    #[must_use]
    pub fn block_size(&self, ptr: VirtualAddress) -> Option<usize> {
        self.free_list.with_lock(|list| list.block_size(ptr))
    }

    /// Inspect the free list, in address order, under the lock.
    ///
    /// `f` must not call back into this manager.
    pub fn free_chunks<R>(&self, f: impl FnOnce(FreeChunks<'_>) -> R) -> R {
        self.free_list.with_lock(|list| f(list.chunks()))
    }

    /// Log every free chunk at `info` level.
    ///
    /// The installed logger must not allocate from this heap.
    pub fn dump(&self) {
        self.free_chunks(|chunks| {
            info!("{} free list:", self.name());
            let mut chunks = chunks.peekable();
            while let Some(chunk) = chunks.next() {
                let next = chunks.peek().map_or(VirtualAddress::NULL, |n| n.header);
                info!(
                    "  {}..{} next {next} size {:#x}",
                    chunk.header,
                    chunk.end(),
                    chunk.size
                );
            }
        });
    }

    /// Backing pointer for an address inside the managed region.
    #[must_use]
    pub fn translate(&self, addr: VirtualAddress) -> Option<NonNull<u8>> {
        self.free_list.with_lock(|list| list.region().translate(addr))
    }

    /// Region address of a backing pointer; inverse of [`translate`](Self::translate).
    #[must_use]
    pub fn address_of(&self, ptr: *const u8) -> Option<VirtualAddress> {
        self.free_list.with_lock(|list| list.region().address_of(ptr))
    }
}

impl<V: VirtualMemory> FreeListMemoryManager<V> {
    /// First fit for `size` bytes. `None` for `size == 0` or when no free
    /// chunk is large enough.
    #[must_use]
    pub fn alloc(&self, size: usize) -> Option<VirtualAddress> {
        self.aligned_alloc(size, 0)
    }

    /// First fit for `size` bytes at an address that is a multiple of
    /// `alignment`. Alignments 0 and 1 impose no constraint; other values
    /// need not be powers of two.
    #[must_use]
    pub fn aligned_alloc(&self, size: usize, alignment: usize) -> Option<VirtualAddress> {
        if size == 0 {
            return None;
        }
        self.with_free_list(|list| list.allocate(size, alignment, None))
    }

    /// Return a block. Null pointers and addresses outside the region are
    /// ignored.
    pub fn free(&self, ptr: VirtualAddress) {
        self.with_free_list(|list| {
            if let Some(range) = list.release(ptr) {
                self.unmap(range);
            }
        });
    }

    /// Same as [`free`](Self::free); the block's header carries its size.
    pub fn aligned_free(&self, ptr: VirtualAddress, _alignment: usize) {
        self.free(ptr);
    }

    #[must_use]
    pub fn realloc(&self, ptr: VirtualAddress, size: usize) -> Option<VirtualAddress> {
        self.aligned_realloc(ptr, size, 0)
    }

    /// Resize the block at `ptr` to `size` bytes with its address a multiple
    /// of `alignment`.
    ///
    /// - `size == 0` frees the block and yields `None`.
    /// - A null `ptr` allocates.
    /// - An address outside the region yields `None` and changes nothing.
    /// - The block stays in place when it is already aligned and either
    ///   shrinks or the free chunk right behind it has room. Otherwise it
    ///   moves; if that allocation fails the old block is left untouched.
    #[must_use]
    pub fn aligned_realloc(
        &self,
        ptr: VirtualAddress,
        size: usize,
        alignment: usize,
    ) -> Option<VirtualAddress> {
        if ptr.is_null() {
            return self.aligned_alloc(size, alignment);
        }
        if size == 0 {
            self.free(ptr);
            return None;
        }
        let size = align_up(size, SIZE_GRANULE)?;

        let outcome = self.with_free_list(|list| {
            let outcome = list.resize_in_place(ptr, size, alignment);
            if let Some(Resize::InPlace(Some(range))) = outcome {
                self.unmap(range);
            }
            outcome
        });
        match outcome {
            None => {
                trace!("ignoring realloc of {ptr}: not a block of this heap");
                None
            }
            Some(Resize::InPlace(_)) => Some(ptr),
            Some(Resize::Relocate { old_size }) => self.relocate(ptr, old_size, size, alignment),
        }
    }

    /// Move `old_size` live bytes at `ptr` into a fresh `size`-byte block.
    fn relocate(
        &self,
        ptr: VirtualAddress,
        old_size: usize,
        size: usize,
        alignment: usize,
    ) -> Option<VirtualAddress> {
        let (new, src, dst) = self.with_free_list(|list| {
            let new = list.allocate(size, alignment, None)?;
            let region = list.region();
            if let Some((src, dst)) = region.translate(ptr).zip(region.translate(new)) {
                Some((new, src, dst))
            } else {
                list.release(new);
                None
            }
        })?;

        // Safety: both blocks lie inside the region and are owned by the caller;
        // the new block was carved from free memory, so they do not overlap.
        unsafe {
            core::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), old_size.min(size));
        }
        self.free(ptr);
        Some(new)
    }

    /// Forward a freed range to the paging service if unmapping is enabled
    /// and paging is up. Called with the heap lock held.
    fn unmap(&self, range: UnmapRange) {
        if !self.unmaps_freed_memory() || !self.paging.is_initialized() {
            return;
        }
        debug!("unmapping freed heap memory {}..={}", range.start, range.end_inclusive);
        self.paging.unmap(range.start, range.end_inclusive);
    }
}

impl<V: VirtualMemory> MemoryManager for FreeListMemoryManager<V> {
    fn name(&self) -> &'static str {
        Self::name(self)
    }

    fn initialize(&self, region: HeapRegion) -> Result<(), HeapError> {
        Self::initialize(self, region)
    }

    fn start_address(&self) -> VirtualAddress {
        Self::start_address(self)
    }

    fn end_address(&self) -> VirtualAddress {
        Self::end_address(self)
    }

    fn total_memory(&self) -> usize {
        Self::total_memory(self)
    }

    fn free_memory(&self) -> usize {
        Self::free_memory(self)
    }
}

impl<V: VirtualMemory> HeapMemoryManager for FreeListMemoryManager<V> {
    fn alloc(&self, size: usize) -> Option<VirtualAddress> {
        Self::alloc(self, size)
    }

    fn free(&self, ptr: VirtualAddress) {
        Self::free(self, ptr);
    }

    fn realloc(&self, ptr: VirtualAddress, size: usize) -> Option<VirtualAddress> {
        Self::realloc(self, ptr, size)
    }

    fn aligned_alloc(
        &self,
        size: usize,
        alignment: usize,
    ) -> Result<Option<VirtualAddress>, HeapError> {
        Ok(Self::aligned_alloc(self, size, alignment))
    }

    fn aligned_free(&self, ptr: VirtualAddress, alignment: usize) -> Result<(), HeapError> {
        Self::aligned_free(self, ptr, alignment);
        Ok(())
    }

    fn aligned_realloc(
        &self,
        ptr: VirtualAddress,
        size: usize,
        alignment: usize,
    ) -> Result<Option<VirtualAddress>, HeapError> {
        Ok(Self::aligned_realloc(self, ptr, size, alignment))
    }
}
