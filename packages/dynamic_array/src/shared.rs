use std::any::type_name;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::constants::ERR_POISONED_LOCK;
use crate::{ArrayAccess, DynamicArray, DynamicArrayBuilder, MemoryProvider, Result, SystemMemory};

/// A thread-safe handle to a [`DynamicArray`] guarded by an exclusive lock.
///
/// Every operation takes the lock for its full duration, including any reallocation, and
/// releases it before returning. Each operation is therefore atomic with respect to the others,
/// but a sequence of operations is not: another thread may run between two calls.
///
/// This type acts as a cloneable handle to a shared array. All clones operate on the same
/// elements, and the array lives until the last handle is dropped.
///
/// Values are returned by copy because a reference into the buffer cannot outlive the lock.
///
/// # Example
///
/// ```
/// use std::thread;
///
/// use dynamic_array::SharedDynamicArray;
///
/// let array = SharedDynamicArray::<u32>::new()?;
///
/// let workers: Vec<_> = (0..4)
///     .map(|worker| {
///         let array = array.clone();
///         thread::spawn(move || {
///             for value in 0..100 {
///                 array.push(worker * 100 + value).unwrap();
///             }
///         })
///     })
///     .collect();
///
/// for worker in workers {
///     worker.join().unwrap();
/// }
///
/// assert_eq!(array.len(), 400);
/// # Ok::<(), dynamic_array::Error>(())
/// ```
pub struct SharedDynamicArray<T, M: MemoryProvider = SystemMemory> {
    inner: Arc<Mutex<DynamicArray<T, M>>>,
}

impl<T: Copy> SharedDynamicArray<T> {
    /// Creates a builder for configuring and constructing a shared array.
    ///
    /// Finish the builder with [`build_shared()`](DynamicArrayBuilder::build_shared).
    #[inline]
    pub fn builder() -> DynamicArrayBuilder<T> {
        DynamicArrayBuilder::new()
    }

    /// Creates an empty shared array with the default configuration.
    ///
    /// # Errors
    ///
    /// Same as [`DynamicArray::new()`].
    #[inline]
    pub fn new() -> Result<Self> {
        DynamicArray::new().map(Self::from)
    }
}

impl<T: Copy, M: MemoryProvider> From<DynamicArray<T, M>> for SharedDynamicArray<T, M> {
    /// Wraps an existing array so it can be shared across threads.
    ///
    /// # Example
    ///
    /// ```
    /// use dynamic_array::{DynamicArray, SharedDynamicArray};
    ///
    /// let mut array = DynamicArray::<u8>::new()?;
    /// array.push(1)?;
    ///
    /// let shared = SharedDynamicArray::from(array);
    /// assert_eq!(shared.get(0)?, 1);
    /// # Ok::<(), dynamic_array::Error>(())
    /// ```
    fn from(array: DynamicArray<T, M>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(array)),
        }
    }
}

impl<T: Copy, M: MemoryProvider> SharedDynamicArray<T, M> {
    fn lock(&self) -> MutexGuard<'_, DynamicArray<T, M>> {
        self.inner.lock().expect(ERR_POISONED_LOCK)
    }

    /// Size of one element in bytes, which is `size_of::<T>()`.
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.lock().element_size()
    }

    /// Number of live elements at the time of the call.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the array had no live elements at the time of the call.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of elements the buffer can hold without reallocating.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Whether the array currently owns a buffer.
    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.lock().is_allocated()
    }

    /// See [`DynamicArray::reinitialize()`].
    pub fn reinitialize(&self) -> Result<()> {
        self.lock().reinitialize()
    }

    /// Frees the buffer for every handle. See [`DynamicArray::release_buffer()`].
    pub fn release_buffer(&self) {
        self.lock().release_buffer();
    }

    /// Frees the buffer for every handle and drops this handle.
    ///
    /// The lock itself is freed together with the last handle.
    pub fn release_all(self) {
        self.release_buffer();
    }

    /// See [`DynamicArray::clear()`].
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// See [`DynamicArray::reserve()`].
    pub fn reserve(&self, capacity: usize) -> Result<()> {
        self.lock().reserve(capacity)
    }

    /// See [`DynamicArray::expand()`].
    pub fn expand(&self, doublings: u32) -> Result<()> {
        self.lock().expand(doublings)
    }

    /// See [`DynamicArray::shrink()`].
    pub fn shrink(&self, halvings: u32) -> Result<()> {
        self.lock().shrink(halvings)
    }

    /// See [`DynamicArray::shrink_to_fit()`].
    pub fn shrink_to_fit(&self) -> Result<()> {
        self.lock().shrink_to_fit()
    }

    /// See [`DynamicArray::push()`].
    pub fn push(&self, value: T) -> Result<()> {
        self.lock().push(value)
    }

    /// See [`DynamicArray::pop()`].
    pub fn pop(&self) -> Result<Option<T>> {
        self.lock().pop()
    }

    /// See [`DynamicArray::set()`].
    pub fn set(&self, index: usize, value: T) -> Result<()> {
        self.lock().set(index, value)
    }

    /// See [`DynamicArray::insert()`].
    pub fn insert(&self, index: usize, value: T) -> Result<()> {
        self.lock().insert(index, value)
    }

    /// See [`DynamicArray::remove()`].
    pub fn remove(&self, index: usize) -> Result<()> {
        self.lock().remove(index)
    }

    /// Returns a copy of the value at `index`.
    ///
    /// # Errors
    ///
    /// Same as [`DynamicArray::get()`].
    pub fn get(&self, index: usize) -> Result<T> {
        self.lock().get(index).copied()
    }
}

impl<T, M: MemoryProvider> Clone for SharedDynamicArray<T, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, M: MemoryProvider> fmt::Debug for SharedDynamicArray<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedDynamicArray")
            .field("element_type", &type_name::<T>())
            .field("handles", &Arc::strong_count(&self.inner))
            .finish_non_exhaustive()
    }
}

impl<T: Copy, M: MemoryProvider> ArrayAccess<T> for SharedDynamicArray<T, M> {
    fn len(&self) -> usize {
        Self::len(self)
    }

    fn is_empty(&self) -> bool {
        Self::is_empty(self)
    }

    fn capacity(&self) -> usize {
        Self::capacity(self)
    }

    fn clear(&mut self) {
        Self::clear(self);
    }

    fn reserve(&mut self, capacity: usize) -> Result<()> {
        Self::reserve(self, capacity)
    }

    fn expand(&mut self, doublings: u32) -> Result<()> {
        Self::expand(self, doublings)
    }

    fn shrink(&mut self, halvings: u32) -> Result<()> {
        Self::shrink(self, halvings)
    }

    fn shrink_to_fit(&mut self) -> Result<()> {
        Self::shrink_to_fit(self)
    }

    fn push(&mut self, value: T) -> Result<()> {
        Self::push(self, value)
    }

    fn pop(&mut self) -> Result<Option<T>> {
        Self::pop(self)
    }

    fn set(&mut self, index: usize, value: T) -> Result<()> {
        Self::set(self, index, value)
    }

    fn insert(&mut self, index: usize, value: T) -> Result<()> {
        Self::insert(self, index, value)
    }

    fn remove(&mut self, index: usize) -> Result<()> {
        Self::remove(self, index)
    }

    fn read(&self, index: usize) -> Result<T> {
        self.get(index)
    }
}
