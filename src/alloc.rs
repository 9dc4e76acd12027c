//! Allocator capability and allocation failure values.
//!
//! Every internal allocation a map makes (bucket arrays, chain nodes,
//! key copies) is routed through an [`Alloc`] instance supplied at
//! construction, never through the global allocator directly. The
//! capability is the injection point for arenas, pools, and test
//! harnesses that count or fail allocations; [`Global`] is the default
//! backed by `std::alloc`.

use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;

/// An allocate/release capability.
///
/// The original design threads an opaque context value through a pair
/// of function pointers; here the context is `&self`. Implementations
/// report exhaustion as a value instead of aborting.
pub trait Alloc {
    /// Allocate a block for `layout`, which must have non-zero size.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, OutOfMemory>;

    /// Release a block previously returned by [`Alloc::allocate`] on
    /// this same capability with this same `layout`.
    ///
    /// # Safety
    /// `ptr` must come from `self.allocate(layout)` and must not be
    /// released twice.
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The process-wide allocator, used when no capability is injected.
#[derive(Copy, Clone, Debug, Default)]
pub struct Global;

impl Alloc for Global {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, OutOfMemory> {
        debug_assert!(layout.size() > 0);
        // SAFETY: layout has non-zero size per the trait contract.
        let ptr = unsafe { std::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(OutOfMemory)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout);
    }
}

// Shared capabilities: a map can hold `&A` so several maps (or a test
// harness) observe one allocator.
impl<A: Alloc + ?Sized> Alloc for &A {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, OutOfMemory> {
        (**self).allocate(layout)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).release(ptr, layout)
    }
}

/// Allocation failure, reported by [`Alloc::allocate`] and by the
/// fallible map constructors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OutOfMemory;

impl fmt::Display for OutOfMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("allocator reported out of memory")
    }
}

impl std::error::Error for OutOfMemory {}

/// Failure from a map's `set`. Allocation can fail at two points with
/// different consequences for the map.
#[derive(Debug, PartialEq, Eq)]
pub enum SetError<V> {
    /// Storage for the new entry (key copy, slot, or chain node) could
    /// not be allocated. The map is unchanged and the rejected value is
    /// handed back.
    Entry(V),
    /// The entry was inserted, but doubling the bucket array failed.
    /// The map stays valid and fully readable, just above its load
    /// threshold; the next successful fresh insert retries the growth.
    Grow,
}

impl<V> SetError<V> {
    /// Recover the rejected value, if this failure returned one.
    pub fn into_value(self) -> Option<V> {
        match self {
            SetError::Entry(v) => Some(v),
            SetError::Grow => None,
        }
    }
}

impl<V> fmt::Display for SetError<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetError::Entry(_) => f.write_str("out of memory allocating a map entry"),
            SetError::Grow => f.write_str("entry inserted, but growing the bucket array failed"),
        }
    }
}

impl<V: fmt::Debug> std::error::Error for SetError<V> {}
