use std::{
    alloc::{GlobalAlloc, Layout, System},
    cell::Cell,
};

use rcblock::{Intrusive, RefCount, RefCounted, Shared, Unique};

struct CountingAlloc;

thread_local! {
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = ALLOCATIONS.try_with(|count| count.set(count.get() + 1));
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

/// Number of allocations made by this thread while running `f`.
fn allocations<R>(f: impl FnOnce() -> R) -> (usize, R) {
    let before = ALLOCATIONS.with(Cell::get);
    let result = f();
    (ALLOCATIONS.with(Cell::get) - before, result)
}

#[test]
fn test_inplace_is_one_allocation() {
    let (count, shared) = allocations(|| Shared::new([0u64; 16]));
    assert_eq!(count, 1);
    assert_eq!(shared.len(), 16);
}

#[test]
fn test_from_box_adds_one_block() {
    let value = Box::new(5u64);
    let (count, shared) = allocations(|| Shared::from_box(value));
    assert_eq!(count, 1);
    assert_eq!(*shared, 5);
}

#[test]
fn test_handles_do_not_allocate() {
    let shared = Shared::new(String::from("value"));
    let (count, _) = allocations(|| {
        let clone = shared.clone();
        let weak = Shared::downgrade(&clone);
        let locked = rcblock::Weak::lock(&weak);
        let part = Shared::project(&locked, |s| s.as_str());
        drop((clone, weak, locked, part));
    });
    assert_eq!(count, 0);
}

struct Node {
    count: RefCount,
}

unsafe impl RefCounted for Node {
    fn counter(&self) -> &RefCount {
        &self.count
    }
}

#[test]
fn test_intrusive_and_unique_are_one_allocation() {
    let (count, node) = allocations(|| Intrusive::new(Node { count: RefCount::new() }));
    assert_eq!(count, 1);
    let (count, _) = allocations(|| node.clone());
    assert_eq!(count, 0);

    let (count, unique) = allocations(|| Unique::new(7u8));
    assert_eq!(count, 1);
    assert_eq!(*unique, 7);
}
