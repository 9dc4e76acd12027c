//! OpenMap: open addressing with linear probing and tombstones.
//!
//! Storage is one flat array of tri-state slots. A probe for a key
//! starts at its hash bucket and walks forward one slot at a time.
//! Tombstones (deleted slots) are transparent to lookup and must be
//! skipped; only a never-occupied `Empty` slot proves a key absent.
//! Tombstones cost a probe step just like live entries, so they count
//! against the load threshold too; the rehash that growing performs is
//! the only place they are reclaimed.

use crate::alloc::{Alloc, Global, OutOfMemory, SetError};
use crate::fnv::{bucket_of, fnv1a};
use crate::raw::{KeyBox, RawArray};
use core::fmt;
use core::mem;
use core::slice;

const INIT_N_BUCKETS: usize = 8;

// Maximum load factor 0.75, counted over entries plus tombstones.
fn max_used(n_buckets: usize) -> usize {
    n_buckets / 4 * 3
}

enum Slot<V> {
    Empty,
    Tombstone,
    Occupied { key: KeyBox, value: V },
}

/// A string-keyed hash map using open addressing.
///
/// Keys are copied into the map through its allocator capability;
/// values are moved in on [`set`](OpenMap::set) and handed back on
/// [`delete`](OpenMap::delete) or overwrite. The map holds raw
/// storage, so it is `!Send` and `!Sync` by construction.
pub struct OpenMap<V, A: Alloc = Global> {
    slots: RawArray<Slot<V>>,
    n_entries: usize,
    n_tombstones: usize,
    alloc: A,
}

/// Where a probe for an insert landed.
enum ProbeSlot {
    /// The key is already present at this index.
    Existing(usize),
    /// The key is absent; this is the first reusable slot on its path.
    New(usize),
}

impl<V> OpenMap<V> {
    /// A map backed by the global allocator. Follows the std
    /// convention of treating global allocation failure as fatal.
    pub fn new() -> Self {
        Self::new_in(Global).expect("global allocator failed")
    }
}

impl<V> Default for OpenMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, A: Alloc> OpenMap<V, A> {
    /// A map routing all internal allocation through `alloc`.
    pub fn new_in(alloc: A) -> Result<Self, OutOfMemory> {
        let slots = RawArray::alloc_with(&alloc, INIT_N_BUCKETS, || Slot::Empty)?;
        Ok(Self {
            slots,
            n_entries: 0,
            n_tombstones: 0,
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
        self.slots.len()
    }

    /// Index of the live slot holding `key`, if present.
    fn find_index(&self, key: &str) -> Option<usize> {
        let n = self.slots.len();
        let slots = self.slots.as_slice();
        let mut i = bucket_of(fnv1a(key.as_bytes()), n);
        for _ in 0..n {
            match &slots[i] {
                Slot::Empty => return None,
                Slot::Tombstone => {}
                Slot::Occupied { key: k, .. } if k.as_str() == key => return Some(i),
                Slot::Occupied { .. } => {}
            }
            i = (i + 1) & (n - 1);
        }
        unreachable!("probe wrapped the table; an empty slot must always exist");
    }

    /// Probe for an insert of `key`: either the slot already holding
    /// it, or the first tombstone-or-empty slot on its probe path.
    /// The scan continues past tombstones until an `Empty` slot proves
    /// the key absent, so a key can never be inserted twice.
    fn probe_insert(&self, key: &str) -> ProbeSlot {
        let n = self.slots.len();
        let slots = self.slots.as_slice();
        let mut reuse = None;
        let mut i = bucket_of(fnv1a(key.as_bytes()), n);
        for _ in 0..n {
            match &slots[i] {
                Slot::Empty => return ProbeSlot::New(reuse.unwrap_or(i)),
                Slot::Tombstone => {
                    if reuse.is_none() {
                        reuse = Some(i);
                    }
                }
                Slot::Occupied { key: k, .. } if k.as_str() == key => {
                    return ProbeSlot::Existing(i)
                }
                Slot::Occupied { .. } => {}
            }
            i = (i + 1) & (n - 1);
        }
        unreachable!("probe wrapped the table; an empty slot must always exist");
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        let i = self.find_index(key)?;
        match &self.slots.as_slice()[i] {
            Slot::Occupied { value, .. } => Some(value),
            _ => unreachable!("find_index returns occupied slots"),
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let i = self.find_index(key)?;
        match &mut self.slots.as_mut_slice()[i] {
            Slot::Occupied { value, .. } => Some(value),
            _ => unreachable!("find_index returns occupied slots"),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.find_index(key).is_some()
    }

    /// Insert or overwrite `key`.
    ///
    /// Returns `Ok(Some(previous))` on overwrite (len unchanged) and
    /// `Ok(None)` on a fresh insert, which copies the key and may grow
    /// the table once the post-insert load exceeds the threshold. See
    /// [`SetError`] for the two failure shapes.
    pub fn set(&mut self, key: &str, value: V) -> Result<Option<V>, SetError<V>> {
        match self.probe_insert(key) {
            ProbeSlot::Existing(i) => match &mut self.slots.as_mut_slice()[i] {
                Slot::Occupied { value: v, .. } => Ok(Some(mem::replace(v, value))),
                _ => unreachable!("probe_insert returned an unoccupied slot as existing"),
            },
            ProbeSlot::New(mut i) => {
                // Never consume the last empty slot: probes for missing
                // keys terminate only by reaching one. Reachable only
                // in the over-loaded state after a failed grow, where
                // growth normally runs post-insert but must run first.
                let reusing = matches!(self.slots.as_slice()[i], Slot::Tombstone);
                if !reusing && self.n_entries + self.n_tombstones + 1 == self.slots.len() {
                    if self.grow().is_err() {
                        return Err(SetError::Entry(value));
                    }
                    i = match self.probe_insert(key) {
                        ProbeSlot::New(j) => j,
                        ProbeSlot::Existing(_) => {
                            unreachable!("key appeared during rehash")
                        }
                    };
                }
                let key_copy = match KeyBox::copy_in(&self.alloc, key) {
                    Ok(k) => k,
                    Err(OutOfMemory) => return Err(SetError::Entry(value)),
                };
                let old = mem::replace(
                    &mut self.slots.as_mut_slice()[i],
                    Slot::Occupied {
                        key: key_copy,
                        value,
                    },
                );
                if matches!(old, Slot::Tombstone) {
                    self.n_tombstones -= 1;
                }
                self.n_entries += 1;

                if self.n_entries + self.n_tombstones > max_used(self.slots.len())
                    && self.grow().is_err()
                {
                    return Err(SetError::Grow);
                }
                Ok(None)
            }
        }
    }

    /// Remove `key`, returning its value. The slot becomes a tombstone
    /// so later probes still walk through it.
    pub fn delete(&mut self, key: &str) -> Option<V> {
        let i = self.find_index(key)?;
        match mem::replace(&mut self.slots.as_mut_slice()[i], Slot::Tombstone) {
            Slot::Occupied { key, value } => {
                // SAFETY: this key was copied through `self.alloc`.
                unsafe { key.free(&self.alloc) };
                self.n_entries -= 1;
                self.n_tombstones += 1;
                Some(value)
            }
            _ => unreachable!("find_index returns occupied slots"),
        }
    }

    fn grow(&mut self) -> Result<(), OutOfMemory> {
        self.resize(self.slots.len() * 2)
    }

    /// Rehash into a fresh array of `n_buckets` slots. On allocation
    /// failure the map is left untouched. Tombstones are dropped here:
    /// rehashing is exactly where they are reclaimed.
    fn resize(&mut self, n_buckets: usize) -> Result<(), OutOfMemory> {
        debug_assert!(n_buckets.is_power_of_two());
        debug_assert!(n_buckets > self.n_entries);
        let mut new_slots = RawArray::alloc_with(&self.alloc, n_buckets, || Slot::Empty)?;
        {
            let new = new_slots.as_mut_slice();
            for slot in self.slots.as_mut_slice() {
                if let Slot::Occupied { key, value } = mem::replace(slot, Slot::Empty) {
                    let h = fnv1a(key.as_str().as_bytes());
                    let mut j = bucket_of(h, n_buckets);
                    let mut placed = false;
                    for _ in 0..n_buckets {
                        if matches!(new[j], Slot::Empty) {
                            new[j] = Slot::Occupied { key, value };
                            placed = true;
                            break;
                        }
                        j = (j + 1) & (n_buckets - 1);
                    }
                    assert!(placed, "rehash target table full; entry count exceeds buckets");
                }
            }
        }
        let mut old = mem::replace(&mut self.slots, new_slots);
        // SAFETY: every occupied slot was moved into the new array.
        unsafe { old.free(&self.alloc) };
        self.n_tombstones = 0;
        Ok(())
    }

    /// Iterate live entries in slot order. Order is not insertion
    /// order and is not stable across resizes.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            slots: self.slots.as_slice().iter(),
        }
    }

    /// Like [`iter`](OpenMap::iter), with in-place value mutation.
    pub fn iter_mut(&mut self) -> IterMut<'_, V> {
        IterMut {
            slots: self.slots.as_mut_slice().iter_mut(),
        }
    }
}

impl<V, A: Alloc> Drop for OpenMap<V, A> {
    fn drop(&mut self) {
        for slot in self.slots.as_mut_slice() {
            if let Slot::Occupied { key, value } = mem::replace(slot, Slot::Empty) {
                // SAFETY: the key was copied through `self.alloc`.
                unsafe { key.free(&self.alloc) };
                drop(value);
            }
        }
        // SAFETY: all slots were just drained to `Empty`.
        unsafe { self.slots.free(&self.alloc) };
    }
}

impl<V: fmt::Debug, A: Alloc> fmt::Debug for OpenMap<V, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator over `(&str, &V)` pairs of an [`OpenMap`].
pub struct Iter<'a, V> {
    slots: slice::Iter<'a, Slot<V>>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a str, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        for slot in self.slots.by_ref() {
            if let Slot::Occupied { key, value } = slot {
                return Some((key.as_str(), value));
            }
        }
        None
    }
}

/// Iterator over `(&str, &mut V)` pairs of an [`OpenMap`].
pub struct IterMut<'a, V> {
    slots: slice::IterMut<'a, Slot<V>>,
}

impl<'a, V> Iterator for IterMut<'a, V> {
    type Item = (&'a str, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        for slot in self.slots.by_ref() {
            if let Slot::Occupied { key, value } = slot {
                return Some(((*key).as_str(), value));
            }
        }
        None
    }
}
