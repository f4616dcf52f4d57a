//! # Kernel Heap
//!
//! A general-purpose kernel heap over one fixed, contiguous region of memory.
//! Blocks are served first-fit from a **doubly linked, address-ordered free
//! list** whose headers are embedded in the managed memory itself. Freed
//! blocks are coalesced with their physical neighbors, and free chunks of at
//! least a page are reported to the virtual memory subsystem so their backing
//! pages can be released.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │       HeapMemoryManager / MemoryManager traits      │
//! │    • alloc / free / realloc (+ aligned variants)    │
//! │    • name, region bounds, free-memory statistics    │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              FreeListMemoryManager                  │
//! │    • SpinLock around the free list                  │
//! │    • Lock-free statistics snapshots                 │
//! │    • Unmap dispatch under the lock                  │
//! │    • GlobalAlloc adapter                            │
//! └──────────┬──────────────────────────┬───────────────┘
//!            │                          │
//! ┌──────────▼──────────────┐ ┌─────────▼───────────────┐
//! │   Free list             │ │   VirtualMemory         │
//! │  • first fit + carving  │ │  (kernel-vmem)          │
//! │  • split / merge        │ │  • is_initialized       │
//! │  • in-place resize      │ │  • unmap(start..=end)   │
//! └─────────────────────────┘ └─────────────────────────┘
//! ```
//!
//! ## Chunk Layout
//!
//! Every chunk, free or allocated, begins with a header of [`HEADER_SIZE`]
//! bytes (`prev`, `next`, `size`). Callers receive the address right after
//! the header. Request sizes are rounded up to multiples of
//! [`SIZE_GRANULE`]; a chunk is only split if the remainder can hold a header
//! plus [`MIN_BLOCK_SIZE`] bytes.
//!
//! ```text
//! start                                                               end
//! ┌────────┬──────────┬────────┬──────────────┬────────┬───────────────┐
//! │ header │ alloc'd  │ header │ free         │ header │ alloc'd       │
//! └────────┴──────────┴────────┴──────────────┴────────┴───────────────┘
//!                       ▲ free list: address-ordered, prev/next linked
//! ```
//!
//! ## Alignment
//!
//! [`FreeListMemoryManager::aligned_alloc`] carves an aligned chunk out of the
//! tail of a misaligned free chunk. The leading fragment keeps at least
//! [`MIN_BLOCK_SIZE`] payload bytes and stays on the free list.
//!
//! ## Unmapping
//!
//! When a free coalesces into a chunk of at least [`PAGE_SIZE`] payload bytes,
//! the manager calls [`VirtualMemory::unmap`] on the chunk's payload, provided
//! the paging service reports itself initialized and unmapping was not
//! disabled through
//! [`disable_automatic_unmapping`](FreeListMemoryManager::disable_automatic_unmapping).
//! The call is made while the heap lock is still held, so the range is free
//! for its whole duration. Once the lock drops, a later allocation may carve
//! headers and payload out of pages that were just unmapped; the paging
//! service maps them back on demand.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_heap::{FreeListMemoryManager, HeapRegion, NoPaging};
//!
//! let heap = FreeListMemoryManager::new(NoPaging);
//! heap.initialize(HeapRegion::from_slice(vec![0u8; 0x4000].leak()))
//!     .expect("heap region is large enough");
//!
//! let a = heap.alloc(64).unwrap();
//! let b = heap.aligned_alloc(100, 256).unwrap();
//! assert!(b.is_aligned(256));
//!
//! heap.free(a);
//! heap.free(b);
//! heap.free_chunks(|chunks| assert_eq!(chunks.count(), 1));
//! ```
//!
//! ## Concurrency
//!
//! All list manipulation happens under one [`SpinLock`](kernel_sync::SpinLock),
//! and so do the unmap calls a free triggers. Paging services must not call
//! back into the heap.
//! [`FreeListMemoryManager::free_memory`] and the region bounds are atomics and
//! may be read at any time; under concurrent use they are snapshots.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod error;
mod free_list;
mod free_list_manager;
mod global;
mod manager;
mod region;

use kernel_memory_addresses::{PageSize, Size4K};

pub use error::HeapError;
pub use free_list::{FreeChunk, FreeChunks};
pub use free_list_manager::FreeListMemoryManager;
pub use kernel_vmem::{NoPaging, VirtualMemory};
pub use manager::{HeapMemoryManager, MemoryManager};
pub use region::HeapRegion;

/// Bytes of bookkeeping in front of every chunk.
pub const HEADER_SIZE: usize = size_of::<free_list::FreeListHeader>();

/// Smallest payload a split-off or carved-off free chunk may have.
pub const MIN_BLOCK_SIZE: usize = 4;

/// Requested sizes are rounded up to a multiple of this.
pub const SIZE_GRANULE: usize = 4;

/// Merged chunks at least this large are offered to the paging service.
pub const PAGE_SIZE: usize = Size4K::SIZE;
