use std::alloc::{Layout, alloc, dealloc, realloc};
use std::ptr::NonNull;
use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Source of the memory that backs the element buffer of a dynamic array.
///
/// The container treats the provider as an opaque service: it asks for a block, asks for that
/// block to be resized and eventually hands it back. Failure is reported by returning `None`,
/// which the container turns into [`Error::OutOfMemory`][crate::Error::OutOfMemory] while
/// keeping its previous buffer.
///
/// Most code uses [`SystemMemory`], the default, which forwards to the global allocator.
/// Custom providers are mostly useful for injecting allocation failures in tests.
///
/// # Safety
///
/// Implementations must behave like the global allocator primitives they stand in for:
///
/// * A block returned by `allocate()` or `reallocate()` must be valid for reads and writes of
///   the requested size and aligned to the requested alignment, and must stay valid until it
///   is passed to `reallocate()` or `deallocate()`.
/// * If `reallocate()` returns `None`, the original block must remain valid and unchanged.
/// * If `reallocate()` returns a block, the first `min(old size, new size)` bytes must hold the
///   contents of the original block and the original block must no longer be used.
pub unsafe trait MemoryProvider {
    /// Allocates a block of memory for the given non-zero-sized layout.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Resizes a block previously returned by this provider, preserving its contents.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this provider for `old_layout` and not yet released.
    /// `new_size` must be non-zero and, rounded up to `old_layout.align()`, must not exceed
    /// `isize::MAX`.
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>>;

    /// Releases a block previously returned by this provider.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this provider for `layout` and not yet released.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The default [`MemoryProvider`], backed by the global allocator.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[expect(
    clippy::exhaustive_structs,
    reason = "stateless marker that callers construct directly"
)]
pub struct SystemMemory;

// SAFETY: We forward to the global allocator, which upholds the same contract.
unsafe impl MemoryProvider for SystemMemory {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() > 0);

        // SAFETY: The container never requests zero-sized blocks.
        NonNull::new(unsafe { alloc(layout) })
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        // SAFETY: Forwarding safety requirements to the caller.
        NonNull::new(unsafe { realloc(ptr.as_ptr(), old_layout, new_size) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe {
            dealloc(ptr.as_ptr(), layout);
        }
    }
}

// SAFETY: Forwarding to a provider that upholds the contract.
unsafe impl<P: MemoryProvider + ?Sized> MemoryProvider for &P {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { (**self).reallocate(ptr, old_layout, new_size) }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe {
            (**self).deallocate(ptr, layout);
        }
    }
}

// SAFETY: Forwarding to a provider that upholds the contract.
unsafe impl<P: MemoryProvider + ?Sized> MemoryProvider for Arc<P> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { (**self).reallocate(ptr, old_layout, new_size) }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe {
            (**self).deallocate(ptr, layout);
        }
    }
}

/// Memory provider for tests that can be switched into a failing mode and counts calls.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FailingMemory {
    failing: AtomicBool,
    allocations: AtomicUsize,
    reallocations: AtomicUsize,
}

#[cfg(test)]
impl FailingMemory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every allocation and reallocation fails until `allow()` is called.
    pub(crate) fn fail(&self) {
        self.failing.store(true, Ordering::Relaxed);
    }

    pub(crate) fn allow(&self) {
        self.failing.store(false, Ordering::Relaxed);
    }

    /// Number of `allocate()` calls, failed ones included.
    pub(crate) fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Number of `reallocate()` calls, failed ones included.
    pub(crate) fn reallocations(&self) -> usize {
        self.reallocations.load(Ordering::Relaxed)
    }

    fn is_failing(&self) -> bool {
        self.failing.load(Ordering::Relaxed)
    }
}

// SAFETY: Forwards to SystemMemory, only ever adding failures.
#[cfg(test)]
unsafe impl MemoryProvider for FailingMemory {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        self.allocations.fetch_add(1, Ordering::Relaxed);

        if self.is_failing() {
            return None;
        }

        SystemMemory.allocate(layout)
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        self.reallocations.fetch_add(1, Ordering::Relaxed);

        if self.is_failing() {
            return None;
        }

        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { SystemMemory.reallocate(ptr, old_layout, new_size) }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe {
            SystemMemory.deallocate(ptr, layout);
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(SystemMemory: Send, Sync, Copy, Debug, MemoryProvider);
    assert_impl_all!(Arc<FailingMemory>: Send, Sync, MemoryProvider);

    #[test]
    fn system_memory_round_trip() {
        let layout = Layout::array::<u64>(4).unwrap();
        let ptr = SystemMemory.allocate(layout).unwrap();

        // SAFETY: The block is valid for 4 u64 writes.
        unsafe {
            ptr.cast::<u64>().write(0x1234);
        }

        // SAFETY: The block came from SystemMemory with this layout.
        let grown = unsafe { SystemMemory.reallocate(ptr, layout, layout.size().checked_mul(2).unwrap()) }.unwrap();

        // SAFETY: Contents are preserved across reallocation.
        assert_eq!(unsafe { grown.cast::<u64>().read() }, 0x1234);

        let grown_layout = Layout::array::<u64>(8).unwrap();

        // SAFETY: The block came from SystemMemory with this layout.
        unsafe {
            SystemMemory.deallocate(grown, grown_layout);
        }
    }

    #[test]
    fn failing_memory_counts_and_fails() {
        let memory = FailingMemory::new();
        let layout = Layout::new::<u32>();

        let ptr = memory.allocate(layout).unwrap();
        assert_eq!(memory.allocations(), 1);

        memory.fail();
        assert!(memory.allocate(layout).is_none());
        assert_eq!(memory.allocations(), 2);

        // SAFETY: The block came from this provider with this layout.
        assert!(unsafe { memory.reallocate(ptr, layout, 8) }.is_none());
        assert_eq!(memory.reallocations(), 1);

        memory.allow();

        // SAFETY: A failed reallocation leaves the original block intact.
        unsafe {
            memory.deallocate(ptr, layout);
        }
    }
}
