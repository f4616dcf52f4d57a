//! # Address-ordered free list
//!
//! Every chunk of the managed region, free or allocated, starts with a
//! [`FreeListHeader`] followed by `size` payload bytes:
//!
//! ```text
//! ┌──────────────────────────────┬──────────────────────────┐
//! │ FreeListHeader               │ payload (size bytes)     │
//! │ ┌──────┬──────┬────────────┐ │                          │
//! │ │ prev │ next │ size       │ │                          │
//! │ └──────┴──────┴────────────┘ │                          │
//! └──────────────────────────────┴──────────────────────────┘
//! ^ chunk                        ^ chunk + HEADER_SIZE (handed to callers)
//! ```
//!
//! Free chunks are doubly linked in **address order**. Allocated chunks keep
//! their header (the size is needed on free) but are detached: both links are
//! null.
//!
//! Headers live inside the region at 4-byte granularity, so every access goes
//! through [`FreeList::header_ptr`] (bounds check) and unaligned reads and
//! writes. Links hold presented addresses with `0` meaning "none".

use crate::region::HeapRegion;
use crate::{HEADER_SIZE, HeapError, MIN_BLOCK_SIZE, PAGE_SIZE, SIZE_GRANULE};
use core::mem::offset_of;
use core::ptr::NonNull;
use kernel_memory_addresses::{VirtualAddress, align_up};
use log::trace;

/// Header embedded at the start of every chunk.
#[repr(C)]
pub(crate) struct FreeListHeader {
    prev: usize,
    next: usize,
    /// Payload bytes after the header.
    size: usize,
}

/// A payload range the paging layer may release after a free.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct UnmapRange {
    pub start: VirtualAddress,
    pub end_inclusive: VirtualAddress,
}

/// Outcome of trying to resize an allocated block where it is.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Resize {
    /// The block keeps its address. Freeing a cut-off tail may have produced
    /// a range to unmap.
    InPlace(Option<UnmapRange>),
    /// The block has to move; `old_size` bytes of payload are live.
    Relocate { old_size: usize },
}

/// A free chunk as seen through [`FreeListMemoryManager::free_chunks`](crate::FreeListMemoryManager::free_chunks).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FreeChunk {
    /// Address of the chunk's header.
    pub header: VirtualAddress,
    /// Payload bytes, excluding the header.
    pub size: usize,
}

impl FreeChunk {
    /// First payload byte.
    #[must_use]
    pub const fn data(&self) -> VirtualAddress {
        VirtualAddress::new(self.header.as_usize() + HEADER_SIZE)
    }

    /// One past the last payload byte.
    #[must_use]
    pub const fn end(&self) -> VirtualAddress {
        VirtualAddress::new(self.header.as_usize() + HEADER_SIZE + self.size)
    }
}

/// Iterator over the free list in address order.
pub struct FreeChunks<'a> {
    list: &'a FreeList,
    current: Option<VirtualAddress>,
}

impl Iterator for FreeChunks<'_> {
    type Item = FreeChunk;

    fn next(&mut self) -> Option<Self::Item> {
        let header = self.current?;
        self.current = self.list.next(header);
        Some(FreeChunk {
            header,
            size: self.list.size(header),
        })
    }
}

/// `chunk + n` for offsets known to stay inside the region.
#[inline]
const fn offset(chunk: VirtualAddress, n: usize) -> VirtualAddress {
    VirtualAddress::new(chunk.as_usize() + n)
}

#[inline]
const fn data_of(chunk: VirtualAddress) -> VirtualAddress {
    offset(chunk, HEADER_SIZE)
}

#[inline]
const fn encode(link: Option<VirtualAddress>) -> usize {
    match link {
        Some(addr) => addr.as_usize(),
        None => 0,
    }
}

#[inline]
const fn decode(raw: usize) -> Option<VirtualAddress> {
    if raw == 0 {
        None
    } else {
        Some(VirtualAddress::new(raw))
    }
}

/// The free list of one heap region. Not synchronized; the manager wraps it
/// in a lock.
pub(crate) struct FreeList {
    region: HeapRegion,
    initialized: bool,
    first_chunk: Option<VirtualAddress>,
    /// Sum of the sizes of all free chunks.
    free_memory: usize,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self {
            region: HeapRegion::EMPTY,
            initialized: false,
            first_chunk: None,
            free_memory: 0,
        }
    }

    pub(crate) const fn free_memory(&self) -> usize {
        self.free_memory
    }

    pub(crate) const fn region(&self) -> &HeapRegion {
        &self.region
    }

    pub(crate) const fn chunks(&self) -> FreeChunks<'_> {
        FreeChunks {
            list: self,
            current: self.first_chunk,
        }
    }

    /// Turn `region` into a single free chunk.
    pub(crate) fn initialize(&mut self, region: HeapRegion) -> Result<(), HeapError> {
        if self.initialized {
            return Err(HeapError::AlreadyInitialized);
        }
        let (start, end) = (region.start(), region.end());
        if start.is_null() || end <= start {
            return Err(HeapError::InvalidRegion { start, end });
        }
        let total = region.len();
        if total < HEADER_SIZE {
            return Err(HeapError::RegionTooSmall { size: total });
        }

        self.region = region;
        self.initialized = true;
        self.write_header(start, None, None, total - HEADER_SIZE);
        self.first_chunk = Some(start);
        self.free_memory = total - HEADER_SIZE;
        Ok(())
    }

    fn header_ptr(&self, chunk: VirtualAddress) -> NonNull<u8> {
        assert!(
            self.region.holds(chunk, HEADER_SIZE),
            "free-list header {chunk} outside heap {}..{}",
            self.region.start(),
            self.region.end()
        );
        match self.region.translate(chunk) {
            Some(ptr) => ptr,
            None => unreachable!("header inside the region always translates"),
        }
    }

    fn read_field(&self, chunk: VirtualAddress, field: usize) -> usize {
        let ptr = self.header_ptr(chunk);
        // Safety: `header_ptr` checked that the whole header lies inside the region.
        unsafe { ptr.add(field).cast::<usize>().read_unaligned() }
    }

    fn write_field(&mut self, chunk: VirtualAddress, field: usize, value: usize) {
        let ptr = self.header_ptr(chunk);
        // Safety: as in `read_field`; `&mut self` serializes writers.
        unsafe { ptr.add(field).cast::<usize>().write_unaligned(value) }
    }

    fn size(&self, chunk: VirtualAddress) -> usize {
        self.read_field(chunk, offset_of!(FreeListHeader, size))
    }

    fn next(&self, chunk: VirtualAddress) -> Option<VirtualAddress> {
        decode(self.read_field(chunk, offset_of!(FreeListHeader, next)))
    }

    fn prev(&self, chunk: VirtualAddress) -> Option<VirtualAddress> {
        decode(self.read_field(chunk, offset_of!(FreeListHeader, prev)))
    }

    fn set_size(&mut self, chunk: VirtualAddress, size: usize) {
        self.write_field(chunk, offset_of!(FreeListHeader, size), size);
    }

    fn set_next(&mut self, chunk: VirtualAddress, next: Option<VirtualAddress>) {
        self.write_field(chunk, offset_of!(FreeListHeader, next), encode(next));
    }

    fn set_prev(&mut self, chunk: VirtualAddress, prev: Option<VirtualAddress>) {
        self.write_field(chunk, offset_of!(FreeListHeader, prev), encode(prev));
    }

    fn write_header(
        &mut self,
        chunk: VirtualAddress,
        prev: Option<VirtualAddress>,
        next: Option<VirtualAddress>,
        size: usize,
    ) {
        self.set_prev(chunk, prev);
        self.set_next(chunk, next);
        self.set_size(chunk, size);
    }

    fn chunk_end(&self, chunk: VirtualAddress) -> VirtualAddress {
        offset(chunk, HEADER_SIZE + self.size(chunk))
    }

    /// Header of the allocated block whose payload starts at `ptr`, if that
    /// block lies inside the region.
    fn header_of(&self, ptr: VirtualAddress) -> Option<VirtualAddress> {
        if ptr.is_null() || !self.region.contains(ptr) {
            return None;
        }
        let header = ptr.checked_sub(HEADER_SIZE)?;
        if !self.region.holds(header, HEADER_SIZE) {
            return None;
        }
        let len = self.size(header).checked_add(HEADER_SIZE)?;
        self.region.holds(header, len).then_some(header)
    }

    /// Payload size of the allocated block at `ptr`.
    pub(crate) fn block_size(&self, ptr: VirtualAddress) -> Option<usize> {
        self.header_of(ptr).map(|header| self.size(header))
    }

    /// Put `with` where the chunk between `prev` and `next` used to be, or
    /// close the gap if `with` is `None`.
    fn replace(
        &mut self,
        prev: Option<VirtualAddress>,
        next: Option<VirtualAddress>,
        with: Option<VirtualAddress>,
    ) {
        let (after_prev, before_next) = match with {
            Some(chunk) => (Some(chunk), Some(chunk)),
            None => (next, prev),
        };
        if let Some(next) = next {
            self.set_prev(next, before_next);
        }
        match prev {
            Some(prev) => self.set_next(prev, after_prev),
            None => self.first_chunk = after_prev,
        }
    }

    /// First-fit allocation of `size` bytes whose payload address is a
    /// multiple of `alignment`, searching from `start_chunk` (or the head of
    /// the list). Returns the payload address.
    pub(crate) fn allocate(
        &mut self,
        size: usize,
        alignment: usize,
        start_chunk: Option<VirtualAddress>,
    ) -> Option<VirtualAddress> {
        if size == 0 {
            return None;
        }
        let size = align_up(size, SIZE_GRANULE)?;

        let mut current = start_chunk.or(self.first_chunk);
        let accepted = loop {
            let Some(chunk) = current else {
                trace!("no free chunk for {size} bytes aligned to {alignment}");
                return None;
            };
            if self.size(chunk) >= size
                && let Some(accepted) = self.fit_aligned(chunk, size, alignment)
            {
                break accepted;
            }
            current = self.next(chunk);
        };

        self.take(accepted, size);
        Some(data_of(accepted))
    }

    /// The chunk to hand out for `size` bytes at `alignment` out of `chunk`.
    ///
    /// If `chunk`'s payload is misaligned, an aligned chunk is carved out of
    /// its tail and linked in right after it; the head keeps at least
    /// `MIN_BLOCK_SIZE` payload bytes and stays free.
    fn fit_aligned(
        &mut self,
        chunk: VirtualAddress,
        size: usize,
        alignment: usize,
    ) -> Option<VirtualAddress> {
        let data = data_of(chunk);
        if data.is_aligned(alignment) {
            return Some(chunk);
        }

        let aligned_data = data
            .checked_add(HEADER_SIZE + MIN_BLOCK_SIZE)?
            .align_up(alignment)?;
        let chunk_end = self.chunk_end(chunk);
        if aligned_data.checked_add(size)? > chunk_end {
            return None;
        }

        let aligned = aligned_data.checked_sub(HEADER_SIZE)?;
        let next = self.next(chunk);
        let aligned_size = chunk_end.distance_from(aligned_data)?;
        let head_size = aligned.distance_from(data)?;

        self.write_header(aligned, Some(chunk), next, aligned_size);
        if let Some(next) = next {
            self.set_prev(next, Some(aligned));
        }
        self.set_next(chunk, Some(aligned));
        self.set_size(chunk, head_size);
        self.free_memory -= HEADER_SIZE;
        Some(aligned)
    }

    /// Remove `chunk` from the list for a `size`-byte allocation, splitting
    /// off the tail as a new free chunk when it is worth keeping.
    fn take(&mut self, chunk: VirtualAddress, size: usize) {
        let chunk_size = self.size(chunk);
        let prev = self.prev(chunk);
        let next = self.next(chunk);

        if chunk_size - size >= HEADER_SIZE + MIN_BLOCK_SIZE {
            let slice = offset(chunk, HEADER_SIZE + size);
            self.write_header(slice, prev, next, chunk_size - size - HEADER_SIZE);
            self.replace(prev, next, Some(slice));
            self.set_size(chunk, size);
            self.free_memory -= HEADER_SIZE;
        } else {
            self.replace(prev, next, None);
        }

        self.set_prev(chunk, None);
        self.set_next(chunk, None);
        self.free_memory -= self.size(chunk);
    }

    /// Return the block at `ptr` to the list and coalesce it.
    ///
    /// Null pointers, pointers outside the region and blocks that would not
    /// fit the region are ignored. Returns the payload of the merged chunk
    /// when it spans at least a page.
    pub(crate) fn release(&mut self, ptr: VirtualAddress) -> Option<UnmapRange> {
        let Some(header) = self.header_of(ptr) else {
            if !ptr.is_null() {
                trace!("ignoring free of {ptr}: not a block of this heap");
            }
            return None;
        };

        self.free_memory += self.size(header);
        self.insert(header);

        let merged = self.merge(header)?;
        let size = self.size(merged);
        (size >= PAGE_SIZE).then(|| UnmapRange {
            start: data_of(merged),
            end_inclusive: offset(merged, HEADER_SIZE + size - 1),
        })
    }

    /// Link the detached `header` into the list at its address position.
    fn insert(&mut self, header: VirtualAddress) {
        let Some(first) = self.first_chunk else {
            self.set_prev(header, None);
            self.set_next(header, None);
            self.first_chunk = Some(header);
            return;
        };

        if header < first {
            debug_assert!(
                self.chunk_end(header) <= first,
                "double free: block at {} overlaps free chunk {first}",
                data_of(header)
            );
            self.set_prev(header, None);
            self.set_next(header, Some(first));
            self.set_prev(first, Some(header));
            self.first_chunk = Some(header);
            return;
        }

        let mut tmp = first;
        loop {
            debug_assert!(
                header >= self.chunk_end(tmp),
                "double free: block at {} is already free",
                data_of(header)
            );
            let next = self.next(tmp);
            match next {
                Some(n) if n <= header => tmp = n,
                _ => {
                    debug_assert!(
                        next.is_none_or(|n| self.chunk_end(header) <= n),
                        "double free: block at {} overlaps the next free chunk",
                        data_of(header)
                    );
                    self.set_prev(header, Some(tmp));
                    self.set_next(header, next);
                    if let Some(n) = next {
                        self.set_prev(n, Some(header));
                    }
                    self.set_next(tmp, Some(header));
                    return;
                }
            }
        }
    }

    /// Coalesce the freshly linked `origin` with its physically adjacent
    /// neighbors: first the successor, then the predecessor. Returns the
    /// header of the resulting chunk.
    pub(crate) fn merge(&mut self, origin: VirtualAddress) -> Option<VirtualAddress> {
        self.first_chunk?;

        if let Some(next) = self.next(origin)
            && self.chunk_end(origin) == next
        {
            self.absorb_next(origin);
        }

        if let Some(prev) = self.prev(origin)
            && self.chunk_end(prev) == origin
        {
            self.absorb_next(prev);
            return Some(prev);
        }

        Some(origin)
    }

    /// Fold `chunk.next` into `chunk`; one header fewer.
    fn absorb_next(&mut self, chunk: VirtualAddress) {
        let Some(next) = self.next(chunk) else {
            return;
        };
        let after = self.next(next);
        let size = self.size(chunk) + HEADER_SIZE + self.size(next);
        self.set_size(chunk, size);
        self.set_next(chunk, after);
        if let Some(after) = after {
            self.set_prev(after, Some(chunk));
        }
        self.free_memory += HEADER_SIZE;
    }

    /// Try to give the block at `ptr` a payload of `size` bytes (already
    /// rounded) without moving it. `None` if `ptr` is not a block of this heap.
    pub(crate) fn resize_in_place(
        &mut self,
        ptr: VirtualAddress,
        size: usize,
        alignment: usize,
    ) -> Option<Resize> {
        let header = self.header_of(ptr)?;
        let old_size = self.size(header);

        if !ptr.is_aligned(alignment) {
            return Some(Resize::Relocate { old_size });
        }

        let resized = match size.cmp(&old_size) {
            core::cmp::Ordering::Equal => Resize::InPlace(None),
            core::cmp::Ordering::Less if old_size - size > HEADER_SIZE + MIN_BLOCK_SIZE => {
                let tail = offset(ptr, size);
                self.write_header(tail, None, None, old_size - size - HEADER_SIZE);
                self.set_size(header, size);
                Resize::InPlace(self.release(data_of(tail)))
            }
            core::cmp::Ordering::Less => Resize::InPlace(None),
            core::cmp::Ordering::Greater => self
                .grow_in_place(header, size)
                .map_or(Resize::Relocate { old_size }, Resize::InPlace),
        };
        Some(resized)
    }

    /// Extend the allocated chunk `header` into the free chunk directly
    /// behind it. `None` if there is no such chunk or it is too small.
    fn grow_in_place(
        &mut self,
        header: VirtualAddress,
        size: usize,
    ) -> Option<Option<UnmapRange>> {
        let old_size = self.size(header);
        let block_end = self.chunk_end(header);

        let mut current = self.first_chunk;
        while let Some(chunk) = current
            && chunk < block_end
        {
            current = self.next(chunk);
        }
        let follower = current.filter(|&chunk| chunk == block_end)?;

        let follower_size = self.size(follower);
        let combined = old_size + HEADER_SIZE + follower_size;
        if combined < size {
            return None;
        }

        let (prev, next) = (self.prev(follower), self.next(follower));
        self.replace(prev, next, None);
        self.free_memory -= follower_size;
        self.set_size(header, combined);

        if combined - size >= HEADER_SIZE + MIN_BLOCK_SIZE {
            let tail = offset(header, HEADER_SIZE + size);
            self.write_header(tail, None, None, combined - size - HEADER_SIZE);
            self.set_size(header, size);
            return Some(self.release(data_of(tail)));
        }
        Some(None)
    }
}
