//! # Managed heap regions

use core::ptr::NonNull;
use kernel_memory_addresses::VirtualAddress;

/// The address range a heap manages and the bytes backing it.
///
/// A region is *presented* to callers as `[start, end)`: every address the
/// heap hands out or accepts lies in that range. The bytes themselves live at
/// `base`, so presented address `start + n` is backed by `base + n`.
///
/// For the common case (a kernel heap in its own address space) the two
/// coincide; use [`HeapRegion::from_slice`]. [`HeapRegion::new`] presents
/// arbitrary memory at an arbitrary range, e.g. a 4 KiB buffer as
/// `0x1000..0x2000`.
#[derive(Debug)]
pub struct HeapRegion {
    base: NonNull<u8>,
    start: VirtualAddress,
    end: VirtualAddress,
}

// Safety: a region is only ever accessed by the manager that owns it, under that manager's lock.
unsafe impl Send for HeapRegion {}

impl HeapRegion {
    /// Placeholder used before a manager is initialized; contains no addresses.
    pub(crate) const EMPTY: Self = Self {
        base: NonNull::dangling(),
        start: VirtualAddress::NULL,
        end: VirtualAddress::NULL,
    };

    /// Manage `memory`, presented at its own address.
    ///
    /// The slice is handed over for good: the heap writes its headers into it.
    #[must_use]
    pub fn from_slice(memory: &'static mut [u8]) -> Self {
        let len = memory.len();
        let base = NonNull::from(memory).cast::<u8>();
        let start = VirtualAddress::from_nonnull(base);
        Self {
            base,
            start,
            end: VirtualAddress::new(start.as_usize() + len),
        }
    }

    /// Manage the bytes at `base`, presented as `[start, end)`.
    ///
    /// Range validity (non-empty, non-null start, large enough) is checked
    /// when the region is handed to a manager.
    ///
    /// # Safety
    /// - `base` must be valid for reads and writes of `end - start` bytes for as
    ///   long as the manager using this region lives.
    /// - Nothing else may access those bytes except through pointers the
    ///   manager hands out.
    #[must_use]
    pub const unsafe fn new(base: NonNull<u8>, start: VirtualAddress, end: VirtualAddress) -> Self {
        Self { base, start, end }
    }

    #[must_use]
    pub const fn start(&self) -> VirtualAddress {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> VirtualAddress {
        self.end
    }

    /// Size of the region in bytes (0 for inverted ranges).
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.as_usize().saturating_sub(self.start.as_usize())
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `start <= addr <= end`; the end address itself counts as inside.
    pub(crate) fn contains(&self, addr: VirtualAddress) -> bool {
        self.start <= addr && addr <= self.end
    }

    /// Whether `[addr, addr + len)` lies entirely inside the region.
    pub(crate) fn holds(&self, addr: VirtualAddress, len: usize) -> bool {
        self.start <= addr && addr.checked_add(len).is_some_and(|end| end <= self.end)
    }

    /// Backing pointer for a presented address (the end address is allowed).
    pub(crate) fn translate(&self, addr: VirtualAddress) -> Option<NonNull<u8>> {
        if !self.contains(addr) {
            return None;
        }
        let offset = addr.distance_from(self.start)?;
        // Safety: `offset <= len`, so the result stays within (or one past) the backing bytes.
        Some(unsafe { self.base.add(offset) })
    }

    /// Presented address for a backing pointer; inverse of [`translate`](Self::translate).
    pub(crate) fn address_of(&self, ptr: *const u8) -> Option<VirtualAddress> {
        let offset = ptr.addr().checked_sub(self.base.addr().get())?;
        (offset <= self.len()).then(|| VirtualAddress::new(self.start.as_usize() + offset))
    }
}
