use std::num::NonZero;

use new_zealand::nz;

/// Capacity of the buffer allocated when a container is initialized without an explicit
/// initial capacity.
pub const DEFAULT_CAPACITY: NonZero<usize> = nz!(15);

// A poisoned lock means another caller panicked halfway through an operation. We do not try to
// reason about what state the container was left in and treat this as unrecoverable.
#[cfg(feature = "sync")]
pub(crate) const ERR_POISONED_LOCK: &str = "encountered poisoned lock - another thread panicked \
    while operating on the shared dynamic array and its state can no longer be trusted";
