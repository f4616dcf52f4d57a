//! # Virtual memory service boundary
//!
//! The heap does not manage page tables itself. When a coalesced free chunk
//! spans at least one page it asks the virtual memory subsystem to drop the
//! backing of the chunk's payload through [`VirtualMemory::unmap`]. Whatever
//! owns the page tables implements this trait; the heap only depends on the
//! contract below.
//!
//! ## Contract
//!
//! - [`is_initialized`](VirtualMemory::is_initialized) gates every unmap. Heaps
//!   brought up before paging (early boot) see `false` and skip unmapping.
//! - [`unmap`](VirtualMemory::unmap) receives an **inclusive** byte range and
//!   releases the pages lying fully inside it. Partial pages at either end stay
//!   mapped: they still hold live data or free-list headers.
//! - Implementations are called *with* the heap's lock held, so the range
//!   cannot be handed out again before the call returns. They must not
//!   allocate from or free into the calling heap.
//!
//! ```rust
//! use kernel_memory_addresses::VirtualAddress;
//! use kernel_vmem::{NoPaging, VirtualMemory};
//!
//! let paging = NoPaging;
//! assert!(!paging.is_initialized());
//! // No-op: nothing is ever mapped through `NoPaging`.
//! paging.unmap(VirtualAddress::new(0x1000), VirtualAddress::new(0x2FFF));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

use kernel_memory_addresses::{PageSize, VirtualAddress};

/// Paging-layer operations consumed by the kernel heap.
pub trait VirtualMemory {
    /// Whether the paging subsystem is ready to accept [`unmap`](Self::unmap) calls.
    fn is_initialized(&self) -> bool;

    /// Release the mappings of all pages fully contained in `start..=end_inclusive`.
    fn unmap(&self, start: VirtualAddress, end_inclusive: VirtualAddress);
}

impl<T: VirtualMemory + ?Sized> VirtualMemory for &T {
    #[inline]
    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }

    #[inline]
    fn unmap(&self, start: VirtualAddress, end_inclusive: VirtualAddress) {
        (**self).unmap(start, end_inclusive);
    }
}

/// Paging service for heaps that live outside any paged address space.
///
/// Never reports itself initialized, so a heap built on it never unmaps.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct NoPaging;

impl VirtualMemory for NoPaging {
    #[inline]
    fn is_initialized(&self) -> bool {
        false
    }

    #[inline]
    fn unmap(&self, _start: VirtualAddress, _end_inclusive: VirtualAddress) {}
}

/// The `S`-sized pages lying entirely inside `start..=end_inclusive`, as a
/// half-open `[first, last)` range of page bases.
///
/// Returns `None` when no whole page fits. Paging implementations use this to
/// honor the "partial pages stay mapped" rule.
///
/// ```rust
/// use kernel_memory_addresses::{Size4K, VirtualAddress};
/// use kernel_vmem::whole_pages;
///
/// let (first, last) =
///     whole_pages::<Size4K>(VirtualAddress::new(0x1018), VirtualAddress::new(0x3FFF)).unwrap();
/// assert_eq!(first, VirtualAddress::new(0x2000));
/// assert_eq!(last, VirtualAddress::new(0x4000));
/// assert!(whole_pages::<Size4K>(VirtualAddress::new(0x1018), VirtualAddress::new(0x1FFF)).is_none());
/// ```
#[must_use]
pub fn whole_pages<S: PageSize>(
    start: VirtualAddress,
    end_inclusive: VirtualAddress,
) -> Option<(VirtualAddress, VirtualAddress)> {
    let first = start.align_up(S::SIZE)?;
    let last = end_inclusive.checked_add(1)?.align_down(S::SIZE);
    (first < last).then_some((first, last))
}
