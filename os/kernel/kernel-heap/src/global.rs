//! # Global allocator adapter
//!
//! Lets a [`FreeListMemoryManager`] back Rust's `alloc` crate:
//!
//! ```rust,ignore
//! use kernel_heap::{FreeListMemoryManager, HeapRegion, NoPaging};
//!
//! #[global_allocator]
//! static KERNEL_HEAP: FreeListMemoryManager = FreeListMemoryManager::new(NoPaging);
//!
//! fn init_heap(memory: &'static mut [u8]) {
//!     KERNEL_HEAP
//!         .initialize(HeapRegion::from_slice(memory))
//!         .expect("kernel heap setup failed");
//! }
//! ```
//!
//! Layout alignment is honored on the region's presented addresses. Regions
//! created with [`HeapRegion::from_slice`](crate::HeapRegion::from_slice)
//! present the backing memory at its own address, so the pointers are aligned
//! as well.

use crate::FreeListMemoryManager;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::VirtualMemory;

impl<V: VirtualMemory + Sync> FreeListMemoryManager<V> {
    /// Pointer handed to `alloc` users for a heap address; null for `None`.
    fn backing_ptr(&self, addr: Option<VirtualAddress>, align: usize) -> *mut u8 {
        let Some(p) = addr.and_then(|addr| self.translate(addr)) else {
            return ptr::null_mut();
        };
        debug_assert_eq!(p.as_ptr().addr() % align, 0, "region base breaks layout alignment");
        p.as_ptr()
    }
}

unsafe impl<V: VirtualMemory + Sync> GlobalAlloc for FreeListMemoryManager<V> {
    /// Allocate `layout.size()` bytes aligned to `layout.align()`.
    ///
    /// # Safety
    /// The `GlobalAlloc` contract applies. A null return signals exhaustion.
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.backing_ptr(self.aligned_alloc(layout.size(), layout.align()), layout.align())
    }

    /// # Safety
    /// The `GlobalAlloc` contract applies. `ptr` must come from this allocator.
    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if let Some(addr) = self.address_of(ptr) {
            self.free(addr);
        }
    }

    /// # Safety
    /// The `GlobalAlloc` contract applies.
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let p = unsafe { GlobalAlloc::alloc(self, layout) };
        if !p.is_null() {
            unsafe { ptr::write_bytes(p, 0, layout.size()) };
        }
        p
    }

    /// Resize in place when possible, otherwise move.
    ///
    /// # Safety
    /// The `GlobalAlloc` contract applies. On a null return `ptr` stays valid.
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let Some(addr) = self.address_of(ptr) else {
            return ptr::null_mut();
        };
        self.backing_ptr(
            self.aligned_realloc(addr, new_size, layout.align()),
            layout.align(),
        )
    }
}
