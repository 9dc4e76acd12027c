//! ChainMap: separate chaining with per-bucket singly-linked lists.
//!
//! Each bucket heads a chain of individually allocated nodes. Removal
//! is exact (no tombstones), and growing relinks the existing nodes
//! into the new bucket array without reallocating them. The chain
//! order is arbitrary: inserts prepend.

use crate::alloc::{Alloc, Global, OutOfMemory, SetError};
use crate::fnv::{bucket_of, fnv1a};
use crate::raw::{alloc_one, free_one, KeyBox, RawArray};
use core::fmt;
use core::mem;
use core::ptr::NonNull;
use core::slice;

const INIT_N_BUCKETS: usize = 4;

// Maximum load factor 2.0: collisions cost a short list walk here, not
// a degrading probe sequence, so chains tolerate more load than slots.
fn max_entries(n_buckets: usize) -> usize {
    n_buckets * 2
}

struct Node<V> {
    key: KeyBox,
    value: V,
    next: Link<V>,
}

type Link<V> = Option<NonNull<Node<V>>>;

/// A string-keyed hash map using separate chaining.
///
/// Same contract as [`OpenMap`](crate::OpenMap): keys are copied in
/// through the allocator capability, values move in and out, and the
/// map is `!Send`/`!Sync` by construction.
pub struct ChainMap<V, A: Alloc = Global> {
    buckets: RawArray<Link<V>>,
    n_entries: usize,
    alloc: A,
}

impl<V> ChainMap<V> {
    /// A map backed by the global allocator. Follows the std
    /// convention of treating global allocation failure as fatal.
    pub fn new() -> Self {
        Self::new_in(Global).expect("global allocator failed")
    }
}

impl<V> Default for ChainMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, A: Alloc> ChainMap<V, A> {
    /// A map routing all internal allocation through `alloc`.
    pub fn new_in(alloc: A) -> Result<Self, OutOfMemory> {
        let buckets = RawArray::alloc_with(&alloc, INIT_N_BUCKETS, || None)?;
        Ok(Self {
            buckets,
            n_entries: 0,
            alloc,
        })
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.n_entries
    }

    pub fn is_empty(&self) -> bool {
        self.n_entries == 0
    }

    /// Current bucket count. Always a power of two.
    pub fn buckets(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_index(&self, key: &str) -> usize {
        bucket_of(fnv1a(key.as_bytes()), self.buckets.len())
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        let mut cur = self.buckets.as_slice()[self.bucket_index(key)];
        while let Some(ptr) = cur {
            // SAFETY: nodes are owned by this map and stay allocated
            // until delete or drop; `&self` keeps both alive.
            let node = unsafe { &*ptr.as_ptr() };
            if node.key.as_str() == key {
                return Some(&node.value);
            }
            cur = node.next;
        }
        None
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let mut cur = self.buckets.as_slice()[self.bucket_index(key)];
        while let Some(ptr) = cur {
            // SAFETY: as in `get`, plus `&mut self` gives exclusivity.
            let node = unsafe { &mut *ptr.as_ptr() };
            if node.key.as_str() == key {
                return Some(&mut node.value);
            }
            cur = node.next;
        }
        None
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or overwrite `key`.
    ///
    /// Returns `Ok(Some(previous))` on overwrite (len unchanged) and
    /// `Ok(None)` on a fresh insert, which copies the key, prepends a
    /// node to the key's chain, and may grow the table once the
    /// post-insert load exceeds two entries per bucket.
    pub fn set(&mut self, key: &str, value: V) -> Result<Option<V>, SetError<V>> {
        let i = self.bucket_index(key);
        let mut cur = self.buckets.as_slice()[i];
        while let Some(ptr) = cur {
            // SAFETY: as in `get_mut`.
            let node = unsafe { &mut *ptr.as_ptr() };
            if node.key.as_str() == key {
                return Ok(Some(mem::replace(&mut node.value, value)));
            }
            cur = node.next;
        }

        let key_copy = match KeyBox::copy_in(&self.alloc, key) {
            Ok(k) => k,
            Err(OutOfMemory) => return Err(SetError::Entry(value)),
        };
        let head = self.buckets.as_slice()[i];
        let node = Node {
            key: key_copy,
            value,
            next: head,
        };
        let ptr = match alloc_one(&self.alloc, node) {
            Ok(p) => p,
            Err(node) => {
                let Node { key, value, .. } = node;
                // SAFETY: the key copy was just made through `self.alloc`.
                unsafe { key.free(&self.alloc) };
                return Err(SetError::Entry(value));
            }
        };
        self.buckets.as_mut_slice()[i] = Some(ptr);
        self.n_entries += 1;

        if self.n_entries > max_entries(self.buckets.len()) && self.grow().is_err() {
            return Err(SetError::Grow);
        }
        Ok(None)
    }

    /// Remove `key`, returning its value. The node is unlinked and
    /// freed immediately.
    pub fn delete(&mut self, key: &str) -> Option<V> {
        let i = self.bucket_index(key);
        let alloc = &self.alloc;
        let mut cur: &mut Link<V> = &mut self.buckets.as_mut_slice()[i];
        loop {
            let ptr = (*cur)?;
            // SAFETY: exclusive access through `&mut self`; every node
            // has exactly one incoming link.
            let node = unsafe { &mut *ptr.as_ptr() };
            if node.key.as_str() == key {
                *cur = node.next;
                // SAFETY: the node was produced by `alloc_one` on this
                // capability and is now unlinked.
                let Node { key, value, .. } = unsafe { free_one(alloc, ptr) };
                // SAFETY: the key was copied through this capability.
                unsafe { key.free(alloc) };
                self.n_entries -= 1;
                return Some(value);
            }
            cur = &mut node.next;
        }
    }

    fn grow(&mut self) -> Result<(), OutOfMemory> {
        self.resize(self.buckets.len() * 2)
    }

    /// Relink every node into a fresh array of `n_buckets` chain
    /// heads. Nodes are not reallocated. On allocation failure the
    /// map is left untouched.
    fn resize(&mut self, n_buckets: usize) -> Result<(), OutOfMemory> {
        debug_assert!(n_buckets.is_power_of_two());
        let mut new_buckets = RawArray::alloc_with(&self.alloc, n_buckets, || None)?;
        {
            let new = new_buckets.as_mut_slice();
            for head in self.buckets.as_mut_slice() {
                let mut cur = head.take();
                while let Some(ptr) = cur {
                    // SAFETY: exclusive access; node detached below
                    // before relinking.
                    let node = unsafe { &mut *ptr.as_ptr() };
                    cur = node.next.take();
                    let j = bucket_of(fnv1a(node.key.as_str().as_bytes()), n_buckets);
                    node.next = new[j];
                    new[j] = Some(ptr);
                }
            }
        }
        let mut old = mem::replace(&mut self.buckets, new_buckets);
        // SAFETY: every chain head was drained above.
        unsafe { old.free(&self.alloc) };
        Ok(())
    }

    /// Iterate live entries in bucket order, chain order within a
    /// bucket. Order is not insertion order and is not stable across
    /// resizes.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            buckets: self.buckets.as_slice().iter(),
            cur: None,
        }
    }

    /// Like [`iter`](ChainMap::iter), with in-place value mutation.
    pub fn iter_mut(&mut self) -> IterMut<'_, V> {
        IterMut {
            buckets: self.buckets.as_slice().iter(),
            cur: None,
            _exclusive: core::marker::PhantomData,
        }
    }
}

impl<V, A: Alloc> Drop for ChainMap<V, A> {
    fn drop(&mut self) {
        for head in self.buckets.as_mut_slice() {
            let mut cur = head.take();
            while let Some(ptr) = cur {
                // SAFETY: nodes and keys were allocated through
                // `self.alloc` and each is freed exactly once here.
                let Node { key, value, next } = unsafe { free_one(&self.alloc, ptr) };
                unsafe { key.free(&self.alloc) };
                drop(value);
                cur = next;
            }
        }
        // SAFETY: all chain heads were just drained.
        unsafe { self.buckets.free(&self.alloc) };
    }
}

impl<V: fmt::Debug, A: Alloc> fmt::Debug for ChainMap<V, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator over `(&str, &V)` pairs of a [`ChainMap`].
pub struct Iter<'a, V> {
    buckets: slice::Iter<'a, Link<V>>,
    cur: Link<V>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a str, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(ptr) = self.cur {
                // SAFETY: the map is borrowed for 'a, so nodes stay
                // allocated and unaliased by mutation.
                let node = unsafe { &*ptr.as_ptr() };
                self.cur = node.next;
                return Some((node.key.as_str(), &node.value));
            }
            self.cur = *self.buckets.next()?;
        }
    }
}

/// Iterator over `(&str, &mut V)` pairs of a [`ChainMap`].
pub struct IterMut<'a, V> {
    buckets: slice::Iter<'a, Link<V>>,
    cur: Link<V>,
    // Constructed from `&'a mut ChainMap`, which is what makes the
    // yielded mutable borrows sound.
    _exclusive: core::marker::PhantomData<&'a mut V>,
}

impl<'a, V> Iterator for IterMut<'a, V> {
    type Item = (&'a str, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(ptr) = self.cur {
                // SAFETY: the map is exclusively borrowed for 'a and
                // each node is yielded at most once.
                let node = unsafe { &mut *ptr.as_ptr() };
                self.cur = node.next;
                let Node { key, value, .. } = node;
                return Some(((*key).as_str(), value));
            }
            self.cur = *self.buckets.next()?;
        }
    }
}
