//! strmap: string-keyed hash maps with pluggable allocation, in two
//! collision-resolution flavors.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: build two small, allocator-explicit map engines in layers
//!   so each piece can be reasoned about independently.
//! - Layers:
//!   - `fnv`: the 64-bit FNV-1a digest and power-of-two bucket
//!     indexing shared by both backends.
//!   - `alloc`: the [`Alloc`] capability every internal allocation is
//!     routed through (bucket arrays, chain nodes, key copies), with
//!     [`Global`] as the default. Exhaustion is a value, never an
//!     abort.
//!   - `raw`: the only unsafe module. Manually managed primitives
//!     (key copies, bucket arrays, chain nodes) that are freed
//!     explicitly with the capability that allocated them.
//!   - [`OpenMap`]: open addressing. Flat tri-state slots
//!     (empty / tombstone / occupied), linear probing, load threshold
//!     0.75 counting tombstones, 8 initial buckets.
//!   - [`ChainMap`]: separate chaining. Bucket array of singly-linked
//!     node chains, load threshold 2.0, 4 initial buckets.
//!
//! Constraints
//! - Single-threaded: both maps hold raw pointers and are `!Send` and
//!   `!Sync` by construction. A capability shared by reference across
//!   maps is the caller's to synchronize.
//! - Keys are `&str` at the boundary; the map owns a copy of every
//!   stored key. Values are a generic `V`, moved in by `set` and moved
//!   back out by `delete` and overwrite.
//! - Every bucket count is a power of two at or above the backend's
//!   minimum, and the load invariant holds after every operation
//!   except the documented over-loaded state after a failed grow.
//! - No structural mutation while iterating: `iter`/`iter_mut` borrow
//!   the map, so the borrow checker enforces the rule statically.
//!   Mutating already yielded values through `iter_mut` is supported.
//!
//! Why this split?
//! - Localize invariants: probe/tombstone accounting lives entirely in
//!   `open_map`, chain ownership entirely in `chain_map`.
//! - Minimize unsafe: raw allocation and pointer handling are isolated
//!   in `raw`; the backends deal in slices, enums, and `Option` links.
//! - Clear failure boundaries: allocation failure surfaces as
//!   [`OutOfMemory`] or [`SetError`] with the map left in a stated,
//!   valid configuration; invariant breaks inside the engine fail
//!   loudly instead of corrupting storage.

mod alloc;
mod chain_map;
mod fnv;
mod open_map;
mod raw;

// Public surface
pub use self::alloc::{Alloc, Global, OutOfMemory, SetError};
pub use chain_map::{ChainMap, Iter as ChainIter, IterMut as ChainIterMut};
pub use open_map::{Iter as OpenIter, IterMut as OpenIterMut, OpenMap};
