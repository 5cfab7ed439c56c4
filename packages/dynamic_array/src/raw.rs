use std::alloc::Layout;
use std::num::NonZero;
use std::ptr::{self, NonNull};
use std::{fmt, slice};

use tracing::{debug, warn};

use crate::{Error, MemoryProvider, RawDynamicArrayBuilder, Result, SystemMemory};

const ERR_RELEASED: &str = "the buffer has been released";
const ERR_ELEMENT_SIZE_MISMATCH: &str = "element length does not match the element size";

/// A growable contiguous array whose elements are opaque byte blocks of a fixed size.
///
/// The element size (and alignment) is chosen when the array is built and never changes.
/// Elements are passed in and out as byte slices of exactly that size. For arrays of a single
/// Rust type, [`DynamicArray<T>`][crate::DynamicArray] provides the same behavior with typed
/// access.
///
/// # Capacity management
///
/// The array starts with [`DEFAULT_CAPACITY`][crate::DEFAULT_CAPACITY] slots unless configured
/// otherwise. Capacity doubles on demand when [`push()`](Self::push) or
/// [`insert()`](Self::insert) run out of room. It can also be controlled explicitly:
///
/// * [`reserve()`](Self::reserve) sets an exact capacity.
/// * [`expand()`](Self::expand) doubles capacity a given number of times.
/// * [`shrink()`](Self::shrink) halves capacity up to a given number of times.
/// * [`shrink_to_fit()`](Self::shrink_to_fit) trims capacity to the element count.
///
/// Capacity never drops to zero while the buffer is allocated.
///
/// # Failure atomicity
///
/// Every operation either succeeds or leaves the array exactly as it was. In particular, if the
/// [memory provider][MemoryProvider] fails to grow the buffer, the existing elements, the
/// element count and the capacity are all unchanged.
///
/// # Released state
///
/// [`release_buffer()`](Self::release_buffer) frees the buffer but keeps the array object.
/// All element and capacity operations then fail with [`Error::InvalidArgument`] until
/// [`reinitialize()`](Self::reinitialize) allocates a fresh buffer.
///
/// # Example
///
/// ```
/// use dynamic_array::RawDynamicArray;
///
/// let mut array = RawDynamicArray::builder().element_size(4).build()?;
///
/// array.push(&[1, 2, 3, 4])?;
/// array.push(&[5, 6, 7, 8])?;
///
/// assert_eq!(array.len(), 2);
/// assert_eq!(array.get(1)?, &[5, 6, 7, 8]);
///
/// let last = array.pop()?;
/// assert_eq!(last.as_deref(), Some(&[5_u8, 6, 7, 8][..]));
/// # Ok::<(), dynamic_array::Error>(())
/// ```
///
/// # Thread safety
///
/// The array is thread-mobile ([`Send`]) and can be shared for reading ([`Sync`]) if its
/// memory provider allows it. Mutation requires exclusive access; use
/// [`SharedDynamicArray`][crate::SharedDynamicArray] to mutate from multiple threads.
pub struct RawDynamicArray<M: MemoryProvider = SystemMemory> {
    /// Layout of one element, padded to its alignment so that the size is also the stride.
    element_layout: Layout,

    /// Capacity of the buffer allocated by [`reinitialize()`](Self::reinitialize).
    initial_capacity: NonZero<usize>,

    /// `None` after the buffer has been released.
    buffer: Option<Allocation>,

    /// Number of slots in the buffer. Zero if and only if the buffer is released.
    capacity: usize,

    /// Number of live elements, occupying slots `0..len`.
    len: usize,

    memory: M,
}

/// A block obtained from the memory provider, together with the layout it was requested with.
#[derive(Clone, Copy, Debug)]
struct Allocation {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl RawDynamicArray {
    /// Creates a builder for configuring and constructing a [`RawDynamicArray`].
    ///
    /// The element size is mandatory and is set using `.element_size()`, `.layout()` or
    /// `.layout_of::<T>()`.
    ///
    /// # Example
    ///
    /// ```
    /// use dynamic_array::RawDynamicArray;
    ///
    /// let array = RawDynamicArray::builder().element_size(12).build()?;
    ///
    /// assert_eq!(array.element_size(), 12);
    /// assert_eq!(array.capacity(), 15);
    /// assert!(array.is_empty());
    /// # Ok::<(), dynamic_array::Error>(())
    /// ```
    #[inline]
    pub fn builder() -> RawDynamicArrayBuilder {
        RawDynamicArrayBuilder::new()
    }
}

impl<M: MemoryProvider> RawDynamicArray<M> {
    /// Creates the array and allocates its initial buffer.
    ///
    /// Fails with [`Error::InvalidArgument`] for zero-sized elements and with
    /// [`Error::OutOfMemory`] if the initial buffer cannot be allocated.
    pub(crate) fn new_inner(
        element_layout: Layout,
        initial_capacity: NonZero<usize>,
        memory: M,
    ) -> Result<Self> {
        if element_layout.size() == 0 {
            return Err(Error::InvalidArgument {
                reason: "element size must be non-zero",
            });
        }

        let mut array = Self {
            element_layout: element_layout.pad_to_align(),
            initial_capacity,
            buffer: None,
            capacity: 0,
            len: 0,
            memory,
        };

        array.reinitialize()?;

        Ok(array)
    }

    /// Size of one element in bytes.
    ///
    /// This includes any padding required to keep consecutive elements aligned.
    #[must_use]
    #[inline]
    pub fn element_size(&self) -> usize {
        self.element_layout.size()
    }

    /// Memory layout of one element slot.
    #[must_use]
    #[inline]
    pub fn element_layout(&self) -> Layout {
        self.element_layout
    }

    /// Number of live elements.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinite loops in callers.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array has no live elements.
    ///
    /// An empty array may still hold allocated capacity.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements the buffer can hold without reallocating.
    ///
    /// Zero if and only if the buffer has been released.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the array currently owns a buffer.
    ///
    /// This is `false` only between [`release_buffer()`](Self::release_buffer) and the next
    /// successful [`reinitialize()`](Self::reinitialize).
    #[must_use]
    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.buffer.is_some()
    }

    /// Allocates a fresh buffer of the initial capacity and empties the array.
    ///
    /// This is how a released array is brought back into use. Calling it on an array that
    /// still owns a buffer replaces that buffer; the old one is only freed once the new one
    /// has been allocated, so on failure the array keeps its previous contents.
    ///
    /// # Example
    ///
    /// ```
    /// use dynamic_array::RawDynamicArray;
    ///
    /// let mut array = RawDynamicArray::builder().element_size(1).build()?;
    /// array.release_buffer();
    /// assert!(array.push(&[1]).is_err());
    ///
    /// array.reinitialize()?;
    /// array.push(&[1])?;
    /// assert_eq!(array.len(), 1);
    /// # Ok::<(), dynamic_array::Error>(())
    /// ```
    pub fn reinitialize(&mut self) -> Result<()> {
        let capacity = self.initial_capacity.get();
        let layout = self.buffer_layout(capacity)?;

        let Some(ptr) = self.memory.allocate(layout) else {
            warn!(
                element_size = self.element_size(),
                requested_bytes = layout.size(),
                "failed to allocate dynamic array buffer"
            );

            return Err(Error::OutOfMemory {
                requested_bytes: layout.size(),
            });
        };

        self.release_buffer();

        self.buffer = Some(Allocation { ptr, layout });
        self.capacity = capacity;
        self.len = 0;

        debug!(
            element_size = self.element_size(),
            capacity, "allocated dynamic array buffer"
        );

        #[cfg(debug_assertions)]
        self.integrity_check();

        Ok(())
    }

    /// Frees the buffer, keeping the array itself usable for
    /// [`reinitialize()`](Self::reinitialize).
    ///
    /// Afterwards the array has zero length and zero capacity. Releasing an already released
    /// buffer does nothing.
    pub fn release_buffer(&mut self) {
        let Some(allocation) = self.buffer.take() else {
            return;
        };

        // SAFETY: The allocation came from our memory provider with this layout and we just
        // took it out of the array, so nothing can use it afterwards.
        unsafe {
            self.memory.deallocate(allocation.ptr, allocation.layout);
        }

        debug!(
            element_size = self.element_size(),
            capacity = self.capacity,
            "released dynamic array buffer"
        );

        self.capacity = 0;
        self.len = 0;
    }

    /// Removes all elements without changing the capacity.
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Reallocates the buffer to hold exactly `capacity` elements.
    ///
    /// Does nothing if the capacity already matches.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] if `capacity` is zero or less than [`len()`](Self::len),
    ///   or if the buffer has been released.
    /// * [`Error::OutOfMemory`] if the reallocation fails.
    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(Error::InvalidArgument {
                reason: "capacity must be non-zero",
            });
        }

        self.allocation()?;

        if capacity < self.len {
            return Err(Error::InvalidArgument {
                reason: "capacity cannot be less than the element count",
            });
        }

        if capacity == self.capacity {
            return Ok(());
        }

        self.resize(capacity)
    }

    /// Doubles the capacity `doublings` times, regardless of how many elements are present.
    ///
    /// Zero doublings is a no-op.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] if the buffer has been released.
    /// * [`Error::OutOfMemory`] if the reallocation fails or the new capacity does not fit in
    ///   the address space.
    ///
    /// # Example
    ///
    /// ```
    /// use dynamic_array::RawDynamicArray;
    ///
    /// let mut array = RawDynamicArray::builder().element_size(1).build()?;
    /// assert_eq!(array.capacity(), 15);
    ///
    /// array.expand(2)?;
    /// assert_eq!(array.capacity(), 60);
    /// # Ok::<(), dynamic_array::Error>(())
    /// ```
    pub fn expand(&mut self, doublings: u32) -> Result<()> {
        self.allocation()?;

        if doublings == 0 {
            return Ok(());
        }

        let new_capacity = 2_usize
            .checked_pow(doublings)
            .and_then(|factor| self.capacity.checked_mul(factor))
            .ok_or(Error::OutOfMemory {
                requested_bytes: usize::MAX,
            })?;

        self.resize(new_capacity)
    }

    /// Halves the capacity up to `halvings` times.
    ///
    /// Stops early when another halving would take the capacity below the element count or
    /// below one slot. If not even one halving is possible, nothing is reallocated.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] if the buffer has been released.
    /// * [`Error::OutOfMemory`] if the reallocation fails.
    ///
    /// # Example
    ///
    /// ```
    /// use dynamic_array::RawDynamicArray;
    ///
    /// let mut array = RawDynamicArray::builder().element_size(1).build()?;
    /// array.reserve(64)?;
    ///
    /// for value in 0..20 {
    ///     array.push(&[value])?;
    /// }
    ///
    /// // 64 -> 32 is fine, 32 -> 16 would no longer fit 20 elements.
    /// array.shrink(5)?;
    /// assert_eq!(array.capacity(), 32);
    /// # Ok::<(), dynamic_array::Error>(())
    /// ```
    pub fn shrink(&mut self, halvings: u32) -> Result<()> {
        self.allocation()?;

        let floor = self.len.max(1);
        let mut target = self.capacity;

        for _ in 0..halvings {
            // Halve, rounding down.
            let next = target >> 1;

            if next < floor {
                break;
            }

            target = next;
        }

        if target == self.capacity {
            return Ok(());
        }

        self.resize(target)
    }

    /// Reallocates the buffer to hold exactly `max(len, 1)` elements.
    ///
    /// Capacity never becomes zero here, since zero capacity is how a released buffer is
    /// represented.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] if the buffer has been released.
    /// * [`Error::OutOfMemory`] if the reallocation fails.
    pub fn shrink_to_fit(&mut self) -> Result<()> {
        self.allocation()?;

        let target = self.len.max(1);

        // A zero capacity cannot coexist with an allocated buffer but is treated as fitted.
        if self.capacity == 0 || self.capacity == target {
            return Ok(());
        }

        self.resize(target)
    }

    /// Appends an element, doubling the capacity first if the buffer is full.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] if `element` is not exactly
    ///   [`element_size()`](Self::element_size) bytes long or the buffer has been released.
    /// * [`Error::OutOfMemory`] if growing the buffer fails.
    pub fn push(&mut self, element: &[u8]) -> Result<()> {
        self.check_element(element)?;

        // SAFETY: The slice is exactly one element long.
        unsafe { self.push_from(NonNull::from(element).cast::<u8>()) }
    }

    /// Removes the last element and returns an owned copy of its bytes.
    ///
    /// Returns `Ok(None)` if the array is empty. The copy is a regular [`Vec`], so it comes from
    /// the global allocator rather than from the array's [memory provider][MemoryProvider].
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] if the buffer has been released.
    /// * [`Error::OutOfMemory`] if the copy cannot be allocated. The element stays in the
    ///   array in that case.
    pub fn pop(&mut self) -> Result<Option<Vec<u8>>> {
        self.allocation()?;

        if self.is_empty() {
            return Ok(None);
        }

        let element_size = self.element_size();

        let mut element = Vec::new();
        element
            .try_reserve_exact(element_size)
            .map_err(|error| {
                warn!(%error, element_size, "failed to allocate popped element");

                Error::OutOfMemory {
                    requested_bytes: element_size,
                }
            })?;

        let Some(slot) = self.pop_slot()? else {
            return Ok(None);
        };

        // SAFETY: The slot held a live element, so it is valid for element_size byte reads.
        // We still hold the exclusive borrow, so nothing has overwritten it.
        element.extend_from_slice(unsafe { slice::from_raw_parts(slot.as_ptr(), element_size) });

        Ok(Some(element))
    }

    /// Overwrites the slot at `index` with `element`.
    ///
    /// Any slot within the capacity may be written, including slots at or beyond
    /// [`len()`](Self::len). Writing such a slot does not change the length, so the written
    /// bytes are not observable through [`get()`](Self::get).
    ///
    /// # Errors
    ///
    /// * [`Error::IndexOutOfRange`] if `index >= capacity()`.
    /// * [`Error::InvalidArgument`] if `element` has the wrong length or the buffer has been
    ///   released.
    pub fn set(&mut self, index: usize, element: &[u8]) -> Result<()> {
        self.check_element(element)?;

        // SAFETY: The slice is exactly one element long.
        unsafe { self.set_from(index, NonNull::from(element).cast::<u8>()) }
    }

    /// Inserts an element at `index`, shifting all later elements one slot to the right.
    ///
    /// `index == len()` appends. Capacity doubles first if the buffer is full.
    ///
    /// # Errors
    ///
    /// * [`Error::IndexOutOfRange`] if `index > len()`.
    /// * [`Error::InvalidArgument`] if `element` has the wrong length or the buffer has been
    ///   released.
    /// * [`Error::OutOfMemory`] if growing the buffer fails.
    pub fn insert(&mut self, index: usize, element: &[u8]) -> Result<()> {
        self.check_element(element)?;

        // SAFETY: The slice is exactly one element long.
        unsafe { self.insert_from(index, NonNull::from(element).cast::<u8>()) }
    }

    /// Removes the element at `index`, shifting all later elements one slot to the left.
    ///
    /// Capacity is not reduced.
    ///
    /// # Errors
    ///
    /// * [`Error::IndexOutOfRange`] if `index >= len()`.
    /// * [`Error::InvalidArgument`] if the buffer has been released.
    pub fn remove(&mut self, index: usize) -> Result<()> {
        let allocation = self.allocation()?;

        if index >= self.len {
            return Err(Error::IndexOutOfRange {
                index,
                bound: self.len,
            });
        }

        // Cannot underflow because index < len.
        let last_index = self.len.wrapping_sub(1);

        if index != last_index {
            // Cannot overflow or underflow because index < last_index < capacity.
            let tail_len = last_index.wrapping_sub(index);
            let next_index = index.wrapping_add(1);

            // SAFETY: next_index <= last_index < capacity.
            let src = unsafe { self.slot(allocation, next_index) };
            // SAFETY: index < capacity.
            let dst = unsafe { self.slot(allocation, index) };

            // SAFETY: Both ranges lie within the live elements of the buffer and ptr::copy
            // permits overlap.
            unsafe {
                ptr::copy(src.as_ptr(), dst.as_ptr(), self.byte_len(tail_len));
            }
        }

        self.len = last_index;

        #[cfg(debug_assertions)]
        self.integrity_check();

        Ok(())
    }

    /// Returns the bytes of the element at `index`.
    ///
    /// The borrow ends before the array can be mutated again, so it can never observe a
    /// reallocated or released buffer.
    ///
    /// # Errors
    ///
    /// * [`Error::IndexOutOfRange`] if `index >= len()`.
    /// * [`Error::InvalidArgument`] if the buffer has been released.
    pub fn get(&self, index: usize) -> Result<&[u8]> {
        let slot = self.live_slot(index)?;

        // SAFETY: The slot holds a live element of element_size bytes and the returned borrow
        // is tied to &self, which prevents any mutation of the buffer while it exists.
        Ok(unsafe { slice::from_raw_parts(slot.as_ptr(), self.element_size()) })
    }

    /// Returns the bytes of the element at `index` for in-place modification.
    ///
    /// # Errors
    ///
    /// * [`Error::IndexOutOfRange`] if `index >= len()`.
    /// * [`Error::InvalidArgument`] if the buffer has been released.
    pub fn get_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        let slot = self.live_slot(index)?;

        // SAFETY: As in get(), plus we hold &mut self so the borrow is exclusive.
        Ok(unsafe { slice::from_raw_parts_mut(slot.as_ptr(), self.element_size()) })
    }

    /// Appends the element stored at `element`.
    ///
    /// # Safety
    ///
    /// `element` must be valid for reads of [`element_size()`](Self::element_size) bytes and
    /// must not point into this array's buffer.
    pub(crate) unsafe fn push_from(&mut self, element: NonNull<u8>) -> Result<()> {
        let allocation = self.grow_if_full()?;

        // SAFETY: grow_if_full() guarantees len < capacity, so slot `len` is within the
        // buffer.
        let dst = unsafe { self.slot(allocation, self.len) };

        // SAFETY: The caller guarantees the source is readable and does not overlap.
        unsafe {
            ptr::copy_nonoverlapping(element.as_ptr(), dst.as_ptr(), self.element_size());
        }

        // Cannot overflow because len < capacity.
        self.len = self.len.wrapping_add(1);

        #[cfg(debug_assertions)]
        self.integrity_check();

        Ok(())
    }

    /// Overwrites the slot at `index` with the element stored at `element`.
    ///
    /// # Safety
    ///
    /// Same as [`push_from()`](Self::push_from).
    pub(crate) unsafe fn set_from(&mut self, index: usize, element: NonNull<u8>) -> Result<()> {
        let allocation = self.allocation()?;

        if index >= self.capacity {
            return Err(Error::IndexOutOfRange {
                index,
                bound: self.capacity,
            });
        }

        // SAFETY: index < capacity so the slot is within the buffer.
        let dst = unsafe { self.slot(allocation, index) };

        // SAFETY: The caller guarantees the source is readable and does not overlap.
        unsafe {
            ptr::copy_nonoverlapping(element.as_ptr(), dst.as_ptr(), self.element_size());
        }

        Ok(())
    }

    /// Inserts the element stored at `element` at `index`.
    ///
    /// # Safety
    ///
    /// Same as [`push_from()`](Self::push_from).
    pub(crate) unsafe fn insert_from(&mut self, index: usize, element: NonNull<u8>) -> Result<()> {
        self.allocation()?;

        if index > self.len {
            return Err(Error::IndexOutOfRange {
                index,
                bound: self.len.saturating_add(1),
            });
        }

        let allocation = self.grow_if_full()?;

        if index < self.len {
            // Cannot overflow because len < capacity after growing.
            let next_index = index.wrapping_add(1);
            let tail_len = self.len.wrapping_sub(index);

            // SAFETY: index < len < capacity.
            let src = unsafe { self.slot(allocation, index) };
            // SAFETY: next_index <= len < capacity.
            let dst = unsafe { self.slot(allocation, next_index) };

            // SAFETY: Source covers the live elements index..len, destination ends at slot
            // len, which is within capacity. ptr::copy permits overlap.
            unsafe {
                ptr::copy(src.as_ptr(), dst.as_ptr(), self.byte_len(tail_len));
            }
        }

        // SAFETY: index <= len < capacity.
        let dst = unsafe { self.slot(allocation, index) };

        // SAFETY: The caller guarantees the source is readable and does not overlap.
        unsafe {
            ptr::copy_nonoverlapping(element.as_ptr(), dst.as_ptr(), self.element_size());
        }

        // Cannot overflow because len < capacity.
        self.len = self.len.wrapping_add(1);

        #[cfg(debug_assertions)]
        self.integrity_check();

        Ok(())
    }

    /// Removes the last element from the live range and returns a pointer to its slot.
    ///
    /// The slot contents are left in place and stay valid until the next mutation.
    pub(crate) fn pop_slot(&mut self) -> Result<Option<NonNull<u8>>> {
        let allocation = self.allocation()?;

        let Some(last_index) = self.len.checked_sub(1) else {
            return Ok(None);
        };

        self.len = last_index;

        // SAFETY: last_index < capacity.
        Ok(Some(unsafe { self.slot(allocation, last_index) }))
    }

    /// Returns a pointer to the live element at `index`.
    pub(crate) fn live_slot(&self, index: usize) -> Result<NonNull<u8>> {
        let allocation = self.allocation()?;

        if index >= self.len {
            return Err(Error::IndexOutOfRange {
                index,
                bound: self.len,
            });
        }

        // SAFETY: index < len <= capacity.
        Ok(unsafe { self.slot(allocation, index) })
    }

    fn allocation(&self) -> Result<Allocation> {
        self.buffer.ok_or(Error::InvalidArgument {
            reason: ERR_RELEASED,
        })
    }

    fn check_element(&self, element: &[u8]) -> Result<()> {
        if element.len() != self.element_size() {
            return Err(Error::InvalidArgument {
                reason: ERR_ELEMENT_SIZE_MISMATCH,
            });
        }

        Ok(())
    }

    /// Doubles the capacity if every slot is occupied and returns the current allocation.
    fn grow_if_full(&mut self) -> Result<Allocation> {
        let allocation = self.allocation()?;

        if self.len < self.capacity {
            return Ok(allocation);
        }

        let new_capacity = self.capacity.checked_mul(2).ok_or(Error::OutOfMemory {
            requested_bytes: usize::MAX,
        })?;

        self.resize(new_capacity)?;
        self.allocation()
    }

    /// Reallocates the buffer to `new_capacity` slots, keeping the live elements.
    ///
    /// On failure the buffer, capacity and length are untouched.
    fn resize(&mut self, new_capacity: usize) -> Result<()> {
        debug_assert!(new_capacity > 0);
        debug_assert!(new_capacity >= self.len);

        let allocation = self.allocation()?;
        let new_layout = self.buffer_layout(new_capacity)?;

        // SAFETY: The allocation came from our memory provider with this layout. The new size
        // is non-zero and buffer_layout() verified it does not exceed isize::MAX when rounded
        // up to the alignment.
        let new_ptr = unsafe {
            self.memory
                .reallocate(allocation.ptr, allocation.layout, new_layout.size())
        };

        let Some(ptr) = new_ptr else {
            warn!(
                element_size = self.element_size(),
                old_capacity = self.capacity,
                new_capacity,
                requested_bytes = new_layout.size(),
                "failed to resize dynamic array buffer"
            );

            return Err(Error::OutOfMemory {
                requested_bytes: new_layout.size(),
            });
        };

        debug!(
            element_size = self.element_size(),
            old_capacity = self.capacity,
            new_capacity,
            "resized dynamic array buffer"
        );

        self.buffer = Some(Allocation {
            ptr,
            layout: new_layout,
        });
        self.capacity = new_capacity;

        #[cfg(debug_assertions)]
        self.integrity_check();

        Ok(())
    }

    fn buffer_layout(&self, capacity: usize) -> Result<Layout> {
        self.element_size()
            .checked_mul(capacity)
            .and_then(|size| Layout::from_size_align(size, self.element_layout.align()).ok())
            .ok_or(Error::OutOfMemory {
                requested_bytes: self.element_size().saturating_mul(capacity),
            })
    }

    /// Number of bytes occupied by `count` consecutive elements.
    fn byte_len(&self, count: usize) -> usize {
        // Only called for counts within the capacity, which fit in the allocation.
        count.wrapping_mul(self.element_size())
    }

    /// # Safety
    ///
    /// `index` must not exceed the capacity of `allocation`.
    unsafe fn slot(&self, allocation: Allocation, index: usize) -> NonNull<u8> {
        // SAFETY: The caller guarantees the offset stays within (or one past) the allocation.
        unsafe { allocation.ptr.add(self.byte_len(index)) }
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        assert!(
            self.len <= self.capacity,
            "len {} exceeds capacity {}",
            self.len,
            self.capacity
        );

        match self.buffer {
            Some(allocation) => {
                assert!(self.capacity > 0, "allocated buffer has zero capacity");
                assert_eq!(
                    allocation.layout.size(),
                    self.byte_len(self.capacity),
                    "allocation size does not match capacity {}",
                    self.capacity
                );
            }
            None => {
                assert_eq!(self.capacity, 0, "released buffer has non-zero capacity");
            }
        }
    }
}

impl<M: MemoryProvider> Drop for RawDynamicArray<M> {
    fn drop(&mut self) {
        self.release_buffer();
    }
}

impl<M: MemoryProvider> fmt::Debug for RawDynamicArray<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawDynamicArray")
            .field("element_layout", &self.element_layout)
            .field("initial_capacity", &self.initial_capacity)
            .field("capacity", &self.capacity)
            .field("len", &self.len)
            .field("allocated", &self.buffer.is_some())
            .finish_non_exhaustive()
    }
}

// SAFETY: The buffer is exclusively owned, so moving the array to another thread moves the
// buffer with it. The memory provider travels along and must itself be Send.
unsafe impl<M: MemoryProvider + Send> Send for RawDynamicArray<M> {}

// SAFETY: Shared references only permit reading the buffer. Shared access to the provider
// requires it to be Sync.
unsafe impl<M: MemoryProvider + Sync> Sync for RawDynamicArray<M> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::marker::PhantomData;

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::{DEFAULT_CAPACITY, FailingMemory};

    assert_impl_all!(RawDynamicArray: Send, Sync, fmt::Debug);

    // A provider that is neither Send nor Sync makes the array neither Send nor Sync.
    struct LocalMemory(PhantomData<*const ()>);

    // SAFETY: Forwards to SystemMemory.
    unsafe impl MemoryProvider for LocalMemory {
        fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
            SystemMemory.allocate(layout)
        }

        unsafe fn reallocate(
            &self,
            ptr: NonNull<u8>,
            old_layout: Layout,
            new_size: usize,
        ) -> Option<NonNull<u8>> {
            // SAFETY: Forwarding safety requirements to the caller.
            unsafe { SystemMemory.reallocate(ptr, old_layout, new_size) }
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
            // SAFETY: Forwarding safety requirements to the caller.
            unsafe { SystemMemory.deallocate(ptr, layout) }
        }
    }

    assert_not_impl_any!(RawDynamicArray<LocalMemory>: Send, Sync);

    fn bytes_array(element_size: usize) -> RawDynamicArray {
        RawDynamicArray::builder()
            .element_size(element_size)
            .build()
            .unwrap()
    }

    fn contents(array: &RawDynamicArray<impl MemoryProvider>) -> Vec<Vec<u8>> {
        (0..array.len())
            .map(|index| array.get(index).unwrap().to_vec())
            .collect()
    }

    #[test]
    fn smoke_test() {
        let mut array = bytes_array(2);

        assert_eq!(array.len(), 0);
        assert!(array.is_empty());
        assert!(array.is_allocated());
        assert_eq!(array.capacity(), DEFAULT_CAPACITY.get());
        assert_eq!(array.element_size(), 2);

        array.push(&[1, 2]).unwrap();
        array.push(&[3, 4]).unwrap();

        assert_eq!(array.len(), 2);
        assert_eq!(array.get(0).unwrap(), &[1, 2]);
        assert_eq!(array.get(1).unwrap(), &[3, 4]);

        assert_eq!(array.pop().unwrap(), Some(vec![3, 4]));
        assert_eq!(array.len(), 1);
    }

    #[test]
    fn zero_element_size_is_invalid() {
        let result = RawDynamicArray::builder().element_size(0).build();

        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn push_then_get_preserves_order() {
        let mut array = bytes_array(3);

        for value in 0..40_u8 {
            array.push(&[value, value.wrapping_mul(2), 0xAA]).unwrap();
        }

        for (index, element) in contents(&array).iter().enumerate() {
            let value = u8::try_from(index).unwrap();
            assert_eq!(element, &[value, value.wrapping_mul(2), 0xAA]);
        }
    }

    #[test]
    fn push_past_capacity_doubles_once() {
        let mut array = bytes_array(1);

        for value in 0..=DEFAULT_CAPACITY.get() {
            array.push(&[u8::try_from(value).unwrap()]).unwrap();
        }

        assert_eq!(array.len(), 16);
        assert_eq!(array.capacity(), 30);
    }

    #[test]
    fn push_wrong_size_is_invalid() {
        let mut array = bytes_array(4);

        assert!(matches!(
            array.push(&[1, 2, 3]),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            array.push(&[1, 2, 3, 4, 5]),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(array.is_empty());
    }

    #[test]
    fn pop_empty_is_none() {
        let mut array = bytes_array(8);

        assert_eq!(array.pop().unwrap(), None);
        assert_eq!(array.len(), 0);
    }

    #[test]
    fn pop_leaves_slot_bytes_in_place() {
        let mut array = bytes_array(1);
        array.push(&[7]).unwrap();

        assert_eq!(array.pop().unwrap(), Some(vec![7]));
        assert!(array.is_empty());

        let allocation = array.allocation().unwrap();

        // SAFETY: Slot 0 was written by push() and pop() does not touch the bytes.
        assert_eq!(unsafe { allocation.ptr.read() }, 7);
    }

    #[test]
    fn remove_shifts_left() {
        let mut array = bytes_array(1);
        for value in [b'a', b'b', b'c', b'd'] {
            array.push(&[value]).unwrap();
        }

        array.remove(1).unwrap();
        assert_eq!(contents(&array), vec![vec![b'a'], vec![b'c'], vec![b'd']]);

        array.insert(1, &[b'x']).unwrap();
        assert_eq!(
            contents(&array),
            vec![vec![b'a'], vec![b'x'], vec![b'c'], vec![b'd']]
        );
    }

    #[test]
    fn remove_last_only_decrements() {
        let mut array = bytes_array(1);
        array.push(&[1]).unwrap();
        array.push(&[2]).unwrap();

        array.remove(1).unwrap();

        assert_eq!(contents(&array), vec![vec![1]]);
        assert_eq!(array.capacity(), DEFAULT_CAPACITY.get());
    }

    #[test]
    fn remove_first_of_many() {
        let mut array = bytes_array(2);
        for value in 0..5_u8 {
            array.push(&[value, value]).unwrap();
        }

        array.remove(0).unwrap();

        assert_eq!(
            contents(&array),
            vec![vec![1, 1], vec![2, 2], vec![3, 3], vec![4, 4]]
        );
    }

    #[test]
    fn insert_at_front_and_end() {
        let mut array = bytes_array(1);
        array.insert(0, &[2]).unwrap();
        array.insert(0, &[1]).unwrap();
        array.insert(2, &[3]).unwrap();

        assert_eq!(contents(&array), vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn insert_into_full_buffer_doubles() {
        let mut array = RawDynamicArray::builder()
            .element_size(1)
            .initial_capacity(nz!(2))
            .build()
            .unwrap();

        array.push(&[1]).unwrap();
        array.push(&[3]).unwrap();
        array.insert(1, &[2]).unwrap();

        assert_eq!(array.capacity(), 4);
        assert_eq!(contents(&array), vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn boundary_errors() {
        let mut array = bytes_array(1);
        array.push(&[1]).unwrap();
        array.push(&[2]).unwrap();

        assert_eq!(
            array.get(2),
            Err(Error::IndexOutOfRange { index: 2, bound: 2 })
        );
        assert_eq!(
            array.remove(2),
            Err(Error::IndexOutOfRange { index: 2, bound: 2 })
        );
        assert_eq!(
            array.insert(3, &[0]),
            Err(Error::IndexOutOfRange { index: 3, bound: 3 })
        );

        let capacity = array.capacity();
        assert_eq!(
            array.set(capacity, &[0]),
            Err(Error::IndexOutOfRange {
                index: capacity,
                bound: capacity
            })
        );

        // Insert at len appends.
        array.insert(2, &[3]).unwrap();
        assert_eq!(contents(&array), vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn set_overwrites_live_element() {
        let mut array = bytes_array(2);
        array.push(&[1, 1]).unwrap();

        array.set(0, &[9, 9]).unwrap();

        assert_eq!(array.get(0).unwrap(), &[9, 9]);
    }

    #[test]
    fn set_beyond_len_within_capacity_succeeds() {
        let mut array = bytes_array(1);
        array.push(&[1]).unwrap();

        array.set(1, &[5]).unwrap();
        array.set(array.capacity().checked_sub(1).unwrap(), &[6]).unwrap();

        // The length is not touched.
        assert_eq!(array.len(), 1);
        assert!(array.get(1).is_err());
    }

    #[test]
    fn get_mut_modifies_in_place() {
        let mut array = bytes_array(2);
        array.push(&[1, 2]).unwrap();

        array.get_mut(0).unwrap()[1] = 42;

        assert_eq!(array.get(0).unwrap(), &[1, 42]);
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut array = bytes_array(1);
        for value in 0..20 {
            array.push(&[value]).unwrap();
        }
        let capacity = array.capacity();

        array.clear();

        assert!(array.is_empty());
        assert_eq!(array.capacity(), capacity);
        assert!(array.get(0).is_err());
    }

    #[test]
    fn reserve_sets_exact_capacity() {
        let mut array = bytes_array(4);

        array.reserve(100).unwrap();
        assert_eq!(array.capacity(), 100);

        array.reserve(3).unwrap();
        assert_eq!(array.capacity(), 3);
    }

    #[test]
    fn reserve_rejects_zero_and_below_len() {
        let mut array = bytes_array(1);
        for value in 0..5 {
            array.push(&[value]).unwrap();
        }

        assert!(matches!(
            array.reserve(0),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            array.reserve(4),
            Err(Error::InvalidArgument { .. })
        ));
        assert_eq!(array.capacity(), DEFAULT_CAPACITY.get());

        array.reserve(5).unwrap();
        assert_eq!(array.capacity(), 5);
        assert_eq!(array.len(), 5);
    }

    #[test]
    fn reserve_same_capacity_does_not_reallocate() {
        let memory = FailingMemory::new();
        let mut array = RawDynamicArray::builder()
            .element_size(1)
            .memory(&memory)
            .build()
            .unwrap();

        array.reserve(DEFAULT_CAPACITY.get()).unwrap();

        assert_eq!(memory.reallocations(), 0);
    }

    #[test]
    fn expand_doubles_n_times() {
        let mut array = bytes_array(1);

        array.expand(0).unwrap();
        assert_eq!(array.capacity(), 15);

        array.expand(1).unwrap();
        assert_eq!(array.capacity(), 30);

        array.expand(3).unwrap();
        assert_eq!(array.capacity(), 240);
    }

    #[test]
    fn expand_overflow_is_out_of_memory() {
        let mut array = bytes_array(1);

        assert!(matches!(
            array.expand(usize::BITS),
            Err(Error::OutOfMemory { .. })
        ));
        assert_eq!(array.capacity(), DEFAULT_CAPACITY.get());
    }

    #[test]
    fn shrink_never_goes_below_len_or_one() {
        let mut array = bytes_array(1);
        array.reserve(64).unwrap();

        array.shrink(100).unwrap();
        assert_eq!(array.capacity(), 1);

        array.reserve(64).unwrap();
        for value in 0..9 {
            array.push(&[value]).unwrap();
        }

        array.shrink(100).unwrap();
        assert_eq!(array.capacity(), 16);
        assert_eq!(array.len(), 9);
    }

    #[test]
    fn shrink_limited_by_count_of_halvings() {
        let mut array = bytes_array(1);
        array.reserve(64).unwrap();

        array.shrink(2).unwrap();

        assert_eq!(array.capacity(), 16);
    }

    #[test]
    fn shrink_rounds_down_odd_capacity() {
        let mut array = bytes_array(1);

        array.shrink(1).unwrap();

        assert_eq!(array.capacity(), 7);
    }

    #[test]
    fn inapplicable_shrink_does_not_reallocate() {
        let memory = FailingMemory::new();
        let mut array = RawDynamicArray::builder()
            .element_size(1)
            .initial_capacity(nz!(4))
            .memory(&memory)
            .build()
            .unwrap();

        for value in 0..4 {
            array.push(&[value]).unwrap();
        }

        array.shrink(3).unwrap();
        array.shrink(0).unwrap();

        assert_eq!(array.capacity(), 4);
        assert_eq!(memory.reallocations(), 0);
    }

    #[test]
    fn shrink_to_fit_is_idempotent() {
        let memory = FailingMemory::new();
        let mut array = RawDynamicArray::builder()
            .element_size(1)
            .memory(&memory)
            .build()
            .unwrap();

        for value in 0..3 {
            array.push(&[value]).unwrap();
        }

        array.shrink_to_fit().unwrap();
        assert_eq!(array.capacity(), 3);
        assert_eq!(memory.reallocations(), 1);

        array.shrink_to_fit().unwrap();
        assert_eq!(array.capacity(), 3);
        assert_eq!(memory.reallocations(), 1);
    }

    #[test]
    fn shrink_to_fit_empty_keeps_one_slot() {
        let mut array = bytes_array(8);

        array.shrink_to_fit().unwrap();

        assert_eq!(array.capacity(), 1);
        assert!(array.is_allocated());
    }

    #[test]
    fn failed_push_growth_leaves_state_intact() {
        let memory = FailingMemory::new();
        let mut array = RawDynamicArray::builder()
            .element_size(2)
            .initial_capacity(nz!(2))
            .memory(&memory)
            .build()
            .unwrap();

        array.push(&[1, 1]).unwrap();
        array.push(&[2, 2]).unwrap();

        memory.fail();

        assert!(matches!(
            array.push(&[3, 3]),
            Err(Error::OutOfMemory { requested_bytes: 8 })
        ));
        assert_eq!(array.len(), 2);
        assert_eq!(array.capacity(), 2);
        assert_eq!(contents(&array), vec![vec![1, 1], vec![2, 2]]);

        assert!(matches!(
            array.insert(0, &[3, 3]),
            Err(Error::OutOfMemory { .. })
        ));
        assert_eq!(contents(&array), vec![vec![1, 1], vec![2, 2]]);

        memory.allow();

        array.push(&[3, 3]).unwrap();
        assert_eq!(contents(&array), vec![vec![1, 1], vec![2, 2], vec![3, 3]]);
    }

    #[test]
    fn failed_capacity_operations_leave_state_intact() {
        let memory = FailingMemory::new();
        let mut array = RawDynamicArray::builder()
            .element_size(1)
            .memory(&memory)
            .build()
            .unwrap();
        array.push(&[1]).unwrap();

        memory.fail();

        assert!(matches!(array.reserve(100), Err(Error::OutOfMemory { .. })));
        assert!(matches!(array.expand(1), Err(Error::OutOfMemory { .. })));
        assert!(matches!(array.shrink(1), Err(Error::OutOfMemory { .. })));
        assert!(matches!(
            array.shrink_to_fit(),
            Err(Error::OutOfMemory { .. })
        ));
        assert!(matches!(
            array.reinitialize(),
            Err(Error::OutOfMemory { .. })
        ));

        assert_eq!(array.capacity(), DEFAULT_CAPACITY.get());
        assert_eq!(contents(&array), vec![vec![1]]);
    }

    #[test]
    fn failed_initial_allocation_is_out_of_memory() {
        let memory = FailingMemory::new();
        memory.fail();

        let result = RawDynamicArray::builder()
            .element_size(1)
            .memory(&memory)
            .build();

        assert!(matches!(
            result,
            Err(Error::OutOfMemory {
                requested_bytes: 15
            })
        ));
        assert_eq!(memory.allocations(), 1);
    }

    #[test]
    fn released_buffer_rejects_operations() {
        let mut array = bytes_array(1);
        array.push(&[1]).unwrap();

        array.release_buffer();
        array.release_buffer();

        assert!(!array.is_allocated());
        assert_eq!(array.capacity(), 0);
        assert_eq!(array.len(), 0);

        let released = |result: Result<()>| matches!(result, Err(Error::InvalidArgument { .. }));

        assert!(released(array.push(&[1])));
        assert!(released(array.insert(0, &[1])));
        assert!(released(array.set(0, &[1])));
        assert!(released(array.remove(0)));
        assert!(released(array.reserve(4)));
        assert!(released(array.expand(1)));
        assert!(released(array.shrink(1)));
        assert!(released(array.shrink_to_fit()));
        assert!(matches!(array.get(0), Err(Error::InvalidArgument { .. })));
        assert!(matches!(array.pop(), Err(Error::InvalidArgument { .. })));

        // Clearing a released array is harmless.
        array.clear();
    }

    #[test]
    fn reinitialize_after_release() {
        let mut array = bytes_array(1);
        array.push(&[1]).unwrap();
        array.release_buffer();

        array.reinitialize().unwrap();

        assert!(array.is_allocated());
        assert!(array.is_empty());
        assert_eq!(array.capacity(), DEFAULT_CAPACITY.get());

        array.push(&[2]).unwrap();
        assert_eq!(contents(&array), vec![vec![2]]);
    }

    #[test]
    fn reinitialize_replaces_live_buffer() {
        let mut array = bytes_array(1);
        array.reserve(100).unwrap();
        array.push(&[1]).unwrap();

        array.reinitialize().unwrap();

        assert!(array.is_empty());
        assert_eq!(array.capacity(), DEFAULT_CAPACITY.get());
    }

    #[test]
    fn respects_element_alignment() {
        let layout = Layout::from_size_align(8, 8).unwrap();
        let mut array = RawDynamicArray::builder().layout(layout).build().unwrap();

        for value in 0..20_u8 {
            array.push(&[value; 8]).unwrap();
        }

        for index in 0..array.len() {
            let address = array.get(index).unwrap().as_ptr().addr();
            assert_eq!(address.checked_rem(8), Some(0));
        }
    }

    #[test]
    fn element_size_is_padded_to_alignment() {
        let layout = Layout::from_size_align(3, 2).unwrap();
        let array = RawDynamicArray::builder().layout(layout).build().unwrap();

        assert_eq!(array.element_size(), 4);
        assert_eq!(array.element_layout().align(), 2);
    }

    #[test]
    fn debug_output_names_type() {
        let array = bytes_array(1);

        let output = format!("{array:?}");

        assert!(output.contains("RawDynamicArray"));
        assert!(output.contains("capacity"));
    }
}
