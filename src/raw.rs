//! Raw storage primitives routed through the allocator capability.
//!
//! This is the only module that touches raw allocation. Everything here
//! is manually managed: nothing implements `Drop`, and each primitive
//! must be freed explicitly with the same capability that allocated it.
//! The map backends own that discipline; their `Drop` impls drain and
//! free in one place each.

use crate::alloc::{Alloc, OutOfMemory};
use core::alloc::Layout;
use core::ptr::NonNull;
use core::slice;
use core::str;

/// An owned heap copy of a key's bytes.
///
/// Keys enter the map as `&str` and are copied into the capability's
/// memory, so the map owns every key it holds. The empty key does not
/// allocate.
pub(crate) struct KeyBox {
    ptr: NonNull<u8>,
    len: usize,
}

impl KeyBox {
    // `len` always comes from an existing `&str`, so it fits in an
    // `isize` and the byte layout is constructible.
    fn layout(len: usize) -> Layout {
        Layout::from_size_align(len, 1).unwrap()
    }

    pub(crate) fn copy_in<A: Alloc>(alloc: &A, key: &str) -> Result<Self, OutOfMemory> {
        let len = key.len();
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len: 0,
            });
        }
        let ptr = alloc.allocate(Self::layout(len))?;
        // SAFETY: `ptr` is a fresh allocation of `len` bytes.
        unsafe {
            ptr.as_ptr().copy_from_nonoverlapping(key.as_ptr(), len);
        }
        Ok(Self { ptr, len })
    }

    pub(crate) fn as_str(&self) -> &str {
        // SAFETY: the bytes were copied verbatim from a `&str` and
        // never mutated, so they remain valid UTF-8.
        unsafe { str::from_utf8_unchecked(slice::from_raw_parts(self.ptr.as_ptr(), self.len)) }
    }

    /// Release the key's bytes.
    ///
    /// # Safety
    /// `alloc` must be the capability that allocated this key.
    pub(crate) unsafe fn free<A: Alloc>(self, alloc: &A) {
        if self.len > 0 {
            alloc.release(self.ptr, Self::layout(self.len));
        }
    }
}

/// A fixed-length array allocation used for bucket and slot arrays.
///
/// Elements are initialized up front and freed without being dropped,
/// so the owner must drain any element resources before `free`.
pub(crate) struct RawArray<T> {
    ptr: NonNull<T>,
    len: usize,
}

impl<T> RawArray<T> {
    pub(crate) fn alloc_with<A, F>(alloc: &A, len: usize, mut fill: F) -> Result<Self, OutOfMemory>
    where
        A: Alloc,
        F: FnMut() -> T,
    {
        debug_assert!(len > 0);
        let layout = Layout::array::<T>(len).map_err(|_| OutOfMemory)?;
        let ptr = alloc.allocate(layout)?.cast::<T>();
        for i in 0..len {
            // SAFETY: `i < len` indexes within the fresh allocation.
            unsafe {
                ptr.as_ptr().add(i).write(fill());
            }
        }
        Ok(Self { ptr, len })
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn as_slice(&self) -> &[T] {
        // SAFETY: `ptr..ptr+len` was allocated and initialized by
        // `alloc_with` and stays valid until `free`.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as `as_slice`, plus `&mut self` gives exclusivity.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Release the array memory. Elements are not dropped.
    ///
    /// # Safety
    /// `alloc` must be the capability that allocated this array, any
    /// element resources must already have been moved out, and the
    /// array must not be used again.
    pub(crate) unsafe fn free<A: Alloc>(&mut self, alloc: &A) {
        // Same layout `alloc_with` constructed, so this cannot fail.
        let layout = Layout::array::<T>(self.len).unwrap();
        alloc.release(self.ptr.cast(), layout);
    }
}

/// Allocate a single node through the capability. On allocation
/// failure the value is handed back untouched.
pub(crate) fn alloc_one<A: Alloc, T>(alloc: &A, value: T) -> Result<NonNull<T>, T> {
    let ptr = match alloc.allocate(Layout::new::<T>()) {
        Ok(p) => p.cast::<T>(),
        Err(OutOfMemory) => return Err(value),
    };
    // SAFETY: `ptr` is a fresh, properly aligned allocation for `T`.
    unsafe {
        ptr.as_ptr().write(value);
    }
    Ok(ptr)
}

/// Move the node's value out and release its memory.
///
/// # Safety
/// `ptr` must come from [`alloc_one`] on the same capability and must
/// not be freed twice.
pub(crate) unsafe fn free_one<A: Alloc, T>(alloc: &A, ptr: NonNull<T>) -> T {
    let value = ptr.as_ptr().read();
    alloc.release(ptr.cast(), Layout::new::<T>());
    value
}
