use thiserror::Error;

/// Errors returned by the operations of the dynamic array types.
///
/// Every failed operation leaves the container exactly as it was before the call.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Generic failure. Reserved; no current operation returns it.
    #[error("the operation failed")]
    Failure,

    /// The memory provider could not satisfy an allocation or reallocation, or the requested
    /// size does not fit in the address space.
    #[error("failed to allocate {requested_bytes} bytes")]
    OutOfMemory {
        /// Size of the allocation that was attempted. Saturates at `usize::MAX` if the size
        /// calculation itself overflowed.
        requested_bytes: usize,
    },

    /// The call is structurally invalid, e.g. the buffer has been released, the element has
    /// the wrong size or a requested capacity is below the element count.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// A human-readable description of the problem.
        reason: &'static str,
    },

    /// The index is outside the range accepted by the operation.
    #[error("index {index} is out of range (must be less than {bound})")]
    IndexOutOfRange {
        /// The index supplied by the caller.
        index: usize,

        /// The exclusive upper bound the index was checked against.
        bound: usize,
    },
}

impl Error {
    /// Result code reported for a successful operation.
    ///
    /// Successful operations return `Ok`, so this value never appears in an [`Error`]. It is
    /// exposed to complete the numeric code table for callers that forward codes elsewhere.
    pub const SUCCESS_CODE: u8 = 0;

    /// Returns the stable numeric result code of this error.
    ///
    /// | Error                | Code |
    /// |----------------------|------|
    /// | `Failure`            | 1    |
    /// | `OutOfMemory`        | 2    |
    /// | `InvalidArgument`    | 3    |
    /// | `IndexOutOfRange`    | 4    |
    ///
    /// # Example
    ///
    /// ```
    /// use dynamic_array::{DynamicArray, Error};
    ///
    /// let array = DynamicArray::<u32>::new().unwrap();
    /// let error = array.get(0).unwrap_err();
    ///
    /// assert_eq!(error.code(), 4);
    /// assert_ne!(error.code(), Error::SUCCESS_CODE);
    /// ```
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            Self::Failure => 1,
            Self::OutOfMemory { .. } => 2,
            Self::InvalidArgument { .. } => 3,
            Self::IndexOutOfRange { .. } => 4,
        }
    }
}

/// A specialized `Result` type for dynamic array operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
