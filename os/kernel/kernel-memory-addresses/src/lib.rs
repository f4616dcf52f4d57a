//! # Virtual Memory Address Types
//!
//! Strongly typed wrapper for the addresses handed around by the kernel heap
//! and the paging layer.
//!
//! ## Overview
//!
//! | Type | Description |
//! |------|-------------|
//! | [`VirtualAddress`] | A `usize`-wide virtual address. Address `0` is the null address. |
//! | [`PageSize`] / [`Size4K`] | Page granularity used when releasing memory back to paging. |
//!
//! The free-function helpers [`align_up`] and [`align_down`] accept any
//! non-zero alignment (not only powers of two) and report overflow instead of
//! wrapping, because heap requests carry caller-chosen alignments.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x1018);
//! assert_eq!(va.align_up(16), Some(VirtualAddress::new(0x1020)));
//! assert!(va.is_aligned(8));
//! assert_eq!(va.page_base::<Size4K>(), VirtualAddress::new(0x1000));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod page_size;
mod virtual_address;

pub use page_size::{PageSize, Size4K};
pub use virtual_address::VirtualAddress;

/// Align `x` up to the next multiple of `align`.
///
/// An alignment of `0` or `1` leaves `x` unchanged. Returns `None` if the
/// result does not fit in a `usize`.
///
/// ```rust
/// # use kernel_memory_addresses::align_up;
/// assert_eq!(align_up(0x1001, 0x1000), Some(0x2000));
/// assert_eq!(align_up(0x1000, 0x1000), Some(0x1000));
/// assert_eq!(align_up(13, 0), Some(13));
/// assert_eq!(align_up(10, 12), Some(12));
/// assert_eq!(align_up(usize::MAX, 16), None);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_up(x: usize, align: usize) -> Option<usize> {
    if align <= 1 {
        return Some(x);
    }
    x.checked_next_multiple_of(align)
}

/// Align `x` down to the previous multiple of `align`.
///
/// An alignment of `0` or `1` leaves `x` unchanged.
///
/// ```rust
/// # use kernel_memory_addresses::align_down;
/// assert_eq!(align_down(0x1FFF, 0x1000), 0x1000);
/// assert_eq!(align_down(23, 12), 12);
/// assert_eq!(align_down(7, 0), 7);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_down(x: usize, align: usize) -> usize {
    if align <= 1 {
        return x;
    }
    x - x % align
}
