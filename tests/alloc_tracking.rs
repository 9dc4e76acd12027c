// Allocator capability suite.
//
// Drives both maps through counting and failure-injecting allocators:
// - every allocate is matched by a release with the same byte total,
// - construction reports OutOfMemory instead of panicking,
// - SetError::Entry hands the rejected value back with the map
//   unchanged,
// - SetError::Grow leaves an over-loaded but fully usable map, and a
//   later insert retries the growth once memory is available again.
use core::alloc::Layout;
use core::ptr::NonNull;
use std::cell::Cell;
use strmap::{Alloc, ChainMap, Global, OpenMap, OutOfMemory, SetError};

/// Delegates to [`Global`], counting calls and live bytes.
#[derive(Default)]
struct CountingAlloc {
    allocs: Cell<usize>,
    releases: Cell<usize>,
    live_bytes: Cell<usize>,
}

impl Alloc for CountingAlloc {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, OutOfMemory> {
        let ptr = Global.allocate(layout)?;
        self.allocs.set(self.allocs.get() + 1);
        self.live_bytes.set(self.live_bytes.get() + layout.size());
        Ok(ptr)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        self.releases.set(self.releases.get() + 1);
        self.live_bytes.set(self.live_bytes.get() - layout.size());
        Global.release(ptr, layout)
    }
}

/// Delegates to [`Global`] until its budget runs out, then fails every
/// allocate. The budget can be topped up mid-test.
struct BudgetAlloc {
    remaining: Cell<usize>,
}

impl BudgetAlloc {
    fn new(budget: usize) -> Self {
        Self {
            remaining: Cell::new(budget),
        }
    }

    fn refill(&self, budget: usize) {
        self.remaining.set(budget);
    }
}

impl Alloc for BudgetAlloc {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, OutOfMemory> {
        if self.remaining.get() == 0 {
            return Err(OutOfMemory);
        }
        self.remaining.set(self.remaining.get() - 1);
        Global.allocate(layout)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        Global.release(ptr, layout)
    }
}

// Test: allocation accounting balances out.
// Verifies: after a workload with growth, overwrites, and deletes on
// both maps sharing one capability, dropping the maps releases every
// allocation and every byte.
#[test]
fn balanced_alloc_release_across_drop() {
    let counting = CountingAlloc::default();
    {
        let mut open: OpenMap<String, &CountingAlloc> =
            OpenMap::new_in(&counting).expect("tracked allocation");
        let mut chain: ChainMap<String, &CountingAlloc> =
            ChainMap::new_in(&counting).expect("tracked allocation");
        for i in 0..50 {
            let k = format!("k{i}");
            open.set(&k, format!("open-{i}")).unwrap();
            chain.set(&k, format!("chain-{i}")).unwrap();
        }
        for i in (0..50).step_by(3) {
            let k = format!("k{i}");
            open.delete(&k).unwrap();
            chain.delete(&k).unwrap();
        }
        open.set("k1", String::from("overwritten")).unwrap();
        chain.set("k1", String::from("overwritten")).unwrap();
    }
    assert_eq!(counting.allocs.get(), counting.releases.get());
    assert_eq!(counting.live_bytes.get(), 0);
    assert!(counting.allocs.get() > 0);
}

// Test: construction failure.
// Verifies: a capability with no budget makes new_in report
// OutOfMemory for both backends.
#[test]
fn construction_reports_oom() {
    let empty = BudgetAlloc::new(0);
    assert_eq!(
        OpenMap::<i32, &BudgetAlloc>::new_in(&empty).err(),
        Some(OutOfMemory)
    );
    assert_eq!(
        ChainMap::<i32, &BudgetAlloc>::new_in(&empty).err(),
        Some(OutOfMemory)
    );
}

// Test: entry allocation failure hands the value back.
// Assumes: OpenMap construction costs one allocation and a fresh
// insert of a non-empty key costs one (the key copy).
// Verifies: SetError::Entry carries the rejected value; the map is
// unchanged and still readable.
#[test]
fn open_map_entry_oom_returns_value() {
    let budget = BudgetAlloc::new(2);
    let mut m: OpenMap<String, &BudgetAlloc> = OpenMap::new_in(&budget).unwrap();
    m.set("kept", String::from("v0")).unwrap();

    let rejected = m.set("rejected", String::from("v1"));
    match rejected {
        Err(SetError::Entry(v)) => assert_eq!(v, "v1"),
        other => panic!("expected Entry error, got {other:?}"),
    }
    assert_eq!(m.len(), 1);
    assert_eq!(m.get("kept").map(String::as_str), Some("v0"));
    assert_eq!(m.get("rejected"), None);
}

// Test: entry allocation failure hands the value back (chaining).
// Assumes: ChainMap construction costs one allocation and a fresh
// insert costs two (key copy + node).
// Verifies: a failure on either of the two leaves the map unchanged.
#[test]
fn chain_map_entry_oom_returns_value() {
    for budget_after_new in [0usize, 1] {
        let budget = BudgetAlloc::new(1 + budget_after_new);
        let mut m: ChainMap<String, &BudgetAlloc> = ChainMap::new_in(&budget).unwrap();
        let rejected = m.set("rejected", String::from("v"));
        match rejected {
            Err(SetError::Entry(v)) => assert_eq!(v, "v"),
            other => panic!("expected Entry error, got {other:?}"),
        }
        assert_eq!(m.len(), 0);
        assert_eq!(m.get("rejected"), None);
    }
}

// Test: failed growth leaves a valid, over-loaded map that recovers.
// Assumes: OpenMap growth triggers once used slots exceed 6 of 8; the
// budget covers the initial array plus seven key copies and nothing
// more.
// Verifies: the triggering entry is inserted despite SetError::Grow,
// reads keep working, further inserts fail cleanly, and refilling the
// budget lets the next insert grow the table.
#[test]
fn open_map_failed_growth_degrades_then_recovers() {
    let budget = BudgetAlloc::new(1 + 7);
    let mut m: OpenMap<usize, &BudgetAlloc> = OpenMap::new_in(&budget).unwrap();
    for i in 0..6 {
        m.set(&format!("k{i}"), i).unwrap();
    }
    assert_eq!(m.buckets(), 8);

    // Seventh insert: key copy succeeds, growth allocation fails.
    assert_eq!(m.set("k6", 6), Err(SetError::Grow));
    assert_eq!(m.len(), 7);
    assert_eq!(m.buckets(), 8);
    for i in 0..7 {
        assert_eq!(m.get(&format!("k{i}")), Some(&i));
    }

    // Exhausted: a further insert is refused with the value back.
    assert_eq!(m.set("k7", 7), Err(SetError::Entry(7)));
    assert_eq!(m.len(), 7);

    // With memory available again, the same insert grows first.
    budget.refill(usize::MAX);
    assert_eq!(m.set("k7", 7), Ok(None));
    assert_eq!(m.buckets(), 16);
    assert_eq!(m.len(), 8);
    for i in 0..8 {
        assert_eq!(m.get(&format!("k{i}")), Some(&i));
    }
}

// Test: failed growth on the chaining backend.
// Assumes: growth triggers once entries exceed 8 in 4 buckets; the
// budget covers the initial array plus nine inserts (key + node each).
// Verifies: SetError::Grow keeps the ninth entry, and a later insert
// retries the growth once the budget allows.
#[test]
fn chain_map_failed_growth_degrades_then_recovers() {
    let budget = BudgetAlloc::new(1 + 9 * 2);
    let mut m: ChainMap<usize, &BudgetAlloc> = ChainMap::new_in(&budget).unwrap();
    for i in 0..8 {
        m.set(&format!("k{i}"), i).unwrap();
    }
    assert_eq!(m.buckets(), 4);

    assert_eq!(m.set("k8", 8), Err(SetError::Grow));
    assert_eq!(m.len(), 9);
    assert_eq!(m.buckets(), 4);
    for i in 0..9 {
        assert_eq!(m.get(&format!("k{i}")), Some(&i));
    }

    assert_eq!(m.set("k9", 9), Err(SetError::Entry(9)));

    budget.refill(usize::MAX);
    assert_eq!(m.set("k9", 9), Ok(None));
    assert_eq!(m.buckets(), 8);
    assert_eq!(m.len(), 10);
    for i in 0..10 {
        assert_eq!(m.get(&format!("k{i}")), Some(&i));
    }
}
