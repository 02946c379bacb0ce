use std::{ops::Deref, rc::Rc};

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rcblock::{Intrusive, RefCount, RefCounted, Shared, Weak};

//cargo install cargo-criterion
//cargo criterion

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("New Shared", |b| b.iter(new_shared));
    c.bench_function("New Shared from box", |b| b.iter(new_shared_from_box));
    c.bench_function("New Rc", |b| b.iter(new_rc));
    c.bench_function("Clone Shared", |b| b.iter(clone_shared));
    c.bench_function("Clone Rc", |b| b.iter(clone_rc));
    c.bench_function("Clone Intrusive", |b| b.iter(clone_intrusive));
    c.bench_function("Multiple clone Shared", |b| b.iter(multi_clone_shared));
    c.bench_function("Multiple clone Rc", |b| b.iter(multi_clone_rc));
    c.bench_function("Deref Shared", |b| b.iter(deref_shared));
    c.bench_function("Deref Rc", |b| b.iter(deref_rc));
    c.bench_function("Lock Weak", |b| b.iter(lock_weak));
    c.bench_function("Upgrade rc::Weak", |b| b.iter(upgrade_rc_weak));
}

struct Counted {
    value: u64,
    count: RefCount,
}

unsafe impl RefCounted for Counted {
    fn counter(&self) -> &RefCount {
        &self.count
    }
}

fn new_shared() {
    let _ = black_box(Shared::new(100));
}

fn new_shared_from_box() {
    let _ = black_box(Shared::from_box(Box::new(100)));
}

fn new_rc() {
    let _ = black_box(Rc::new(100));
}

fn clone_shared() {
    let shared = Shared::new(100);
    let _ = black_box(Shared::clone(&shared));
}

fn clone_rc() {
    let rc = Rc::new(100);
    let _ = black_box(Rc::clone(&rc));
}

fn clone_intrusive() {
    let intrusive = Intrusive::new(Counted {
        value: 100,
        count: RefCount::new(),
    });
    let clone = black_box(intrusive.clone());
    let _ = black_box(clone.value);
}

fn multi_clone_shared() {
    let shared = Shared::new(100);
    for _ in 0..100 {
        let _ = black_box(shared.clone());
    }
}

fn multi_clone_rc() {
    let rc = Rc::new(100);
    for _ in 0..100 {
        let _ = black_box(rc.clone());
    }
}

fn deref_shared() {
    let shared = Shared::new(100);
    for _ in 0..100 {
        let _ = black_box(*shared.deref());
    }
}

fn deref_rc() {
    let rc = Rc::new(100);
    for _ in 0..100 {
        let _ = black_box(*rc.deref());
    }
}

fn lock_weak() {
    let shared = Shared::new(100);
    let weak = Shared::downgrade(&shared);
    for _ in 0..100 {
        let _ = black_box(Weak::lock(&weak));
    }
}

fn upgrade_rc_weak() {
    let rc = Rc::new(100);
    let weak = Rc::downgrade(&rc);
    for _ in 0..100 {
        let _ = black_box(weak.upgrade());
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
