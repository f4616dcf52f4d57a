//! # Memory manager contracts
//!
//! [`MemoryManager`] covers what every manager of an address range reports;
//! [`HeapMemoryManager`] adds dynamic allocation. Alignment-aware operations
//! are optional: their default implementations return
//! [`HeapError::Unsupported`], so strategies that cannot place blocks at
//! arbitrary alignments opt out with a typed error instead of misbehaving.

use crate::{HeapError, HeapRegion};
use kernel_memory_addresses::VirtualAddress;

/// A manager owning a fixed address range.
///
/// The statistics are snapshots: they may be read while another thread is
/// mutating the manager and are only advisory.
pub trait MemoryManager {
    /// Human-readable name of the strategy.
    fn name(&self) -> &'static str;

    /// Take ownership of `region`.
    ///
    /// # Errors
    /// A [`HeapError`] when `region` is unusable or the manager already owns
    /// one. The manager cannot operate at all then; kernels treat it as fatal.
    fn initialize(&self, region: HeapRegion) -> Result<(), HeapError>;

    fn start_address(&self) -> VirtualAddress;

    fn end_address(&self) -> VirtualAddress;

    /// Size of the managed range in bytes.
    fn total_memory(&self) -> usize {
        self.end_address()
            .distance_from(self.start_address())
            .unwrap_or(0)
    }

    /// Bytes currently available for allocation.
    fn free_memory(&self) -> usize;
}

/// Dynamic allocation on top of a [`MemoryManager`].
///
/// Addresses are those of the managed range. A null address stands for "no
/// block"; results use `None` for it.
pub trait HeapMemoryManager: MemoryManager {
    /// At least `size` bytes, or `None` if `size == 0` or nothing fits.
    fn alloc(&self, size: usize) -> Option<VirtualAddress>;

    /// Return a block obtained from this manager. Null and foreign addresses
    /// are ignored.
    fn free(&self, ptr: VirtualAddress);

    /// Resize a block, preserving `min(size, old size)` bytes of its content.
    ///
    /// `size == 0` frees `ptr` and returns `None`. If a new block is needed
    /// but cannot be allocated, `None` is returned and `ptr` stays valid.
    fn realloc(&self, ptr: VirtualAddress, size: usize) -> Option<VirtualAddress>;

    /// Like [`alloc`](Self::alloc), with the block's address a multiple of
    /// `alignment` (0 means no requirement).
    ///
    /// # Errors
    /// [`HeapError::Unsupported`] unless the strategy places aligned blocks.
    fn aligned_alloc(
        &self,
        _size: usize,
        _alignment: usize,
    ) -> Result<Option<VirtualAddress>, HeapError> {
        Err(HeapError::Unsupported {
            operation: "aligned_alloc",
        })
    }

    /// Counterpart of [`aligned_alloc`](Self::aligned_alloc).
    ///
    /// # Errors
    /// [`HeapError::Unsupported`] unless the strategy places aligned blocks.
    fn aligned_free(&self, _ptr: VirtualAddress, _alignment: usize) -> Result<(), HeapError> {
        Err(HeapError::Unsupported {
            operation: "aligned_free",
        })
    }

    /// Like [`realloc`](Self::realloc), keeping the block aligned to `alignment`.
    ///
    /// # Errors
    /// [`HeapError::Unsupported`] unless the strategy places aligned blocks.
    fn aligned_realloc(
        &self,
        _ptr: VirtualAddress,
        _size: usize,
        _alignment: usize,
    ) -> Result<Option<VirtualAddress>, HeapError> {
        Err(HeapError::Unsupported {
            operation: "aligned_realloc",
        })
    }
}
