use crate::{PageSize, align_down, align_up};
use core::fmt;
use core::ptr::NonNull;

/// Virtual memory address.
///
/// A thin `usize` wrapper that carries the *kind* of a value at the type level
/// so heap addresses don't get mixed up with sizes and offsets. Address `0`
/// is [`VirtualAddress::NULL`].
///
/// Arithmetic is checked: the `checked_*` helpers return `None` on overflow
/// instead of wrapping, which lets allocator code reject absurd requests.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0x2000);
/// assert_eq!(va.checked_add(0x18), Some(VirtualAddress::new(0x2018)));
/// assert_eq!(VirtualAddress::new(0x2018).distance_from(va), Some(0x18));
/// assert!(VirtualAddress::NULL.is_null());
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(usize);

impl VirtualAddress {
    /// The null address.
    pub const NULL: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn new(v: usize) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr.addr())
    }

    #[inline]
    #[must_use]
    pub fn from_nonnull<T>(ptr: NonNull<T>) -> Self {
        Self::from_ptr(ptr.as_ptr())
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: usize) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn checked_sub(self, rhs: usize) -> Option<Self> {
        match self.0.checked_sub(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Number of bytes from `origin` up to `self`, or `None` if `origin` lies above.
    #[inline]
    #[must_use]
    pub const fn distance_from(self, origin: Self) -> Option<usize> {
        self.0.checked_sub(origin.0)
    }

    /// Whether the address is a multiple of `align`. Alignments `0` and `1` always hold.
    #[inline]
    #[must_use]
    pub const fn is_aligned(self, align: usize) -> bool {
        align <= 1 || self.0.is_multiple_of(align)
    }

    #[inline]
    #[must_use]
    pub const fn align_up(self, align: usize) -> Option<Self> {
        match align_up(self.0, align) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn align_down(self, align: usize) -> Self {
        Self(align_down(self.0, align))
    }

    /// Base address of the `S`-sized page containing this address.
    #[inline]
    #[must_use]
    pub const fn page_base<S: PageSize>(self) -> Self {
        Self(self.0 & !(S::SIZE - 1))
    }

    /// Offset of this address within its `S`-sized page.
    #[inline]
    #[must_use]
    pub const fn page_offset<S: PageSize>(self) -> usize {
        self.0 & (S::SIZE - 1)
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl fmt::LowerHex for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl From<usize> for VirtualAddress {
    #[inline]
    fn from(v: usize) -> Self {
        Self::new(v)
    }
}

impl From<VirtualAddress> for usize {
    #[inline]
    fn from(v: VirtualAddress) -> Self {
        v.0
    }
}
