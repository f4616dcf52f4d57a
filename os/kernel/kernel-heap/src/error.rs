use kernel_memory_addresses::VirtualAddress;

/// Errors reported by heap memory managers.
///
/// Allocation failure is **not** an error: it is the regular `None` outcome of
/// `alloc`/`realloc`. Only setting up a heap and calling an operation a
/// manager does not provide produce a `HeapError`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeapError {
    /// The region is empty, inverted, or starts at the null address.
    #[error("invalid heap region {start}..{end}")]
    InvalidRegion {
        start: VirtualAddress,
        end: VirtualAddress,
    },
    /// The region cannot even hold one free-list header.
    #[error("heap region of {size} bytes cannot hold a free-list header")]
    RegionTooSmall { size: usize },
    #[error("heap is already initialized")]
    AlreadyInitialized,
    /// The manager does not implement this (alignment-aware) operation.
    #[error("{operation} is not supported by this memory manager")]
    Unsupported { operation: &'static str },
}
