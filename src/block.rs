//! Control blocks: the bookkeeping record shared by every [`Shared`](crate::Shared)
//! and [`Weak`](crate::Weak) of one value.
//!
//! A block starts with a [`Header`] holding the strong and weak counts and a
//! pointer to a [`BlockVTable`]. The vtable erases the payload's type and the
//! block's shape, so one handle type manages both shapes:
//!
//! - [`PtrBlock`] references a payload that lives in its own `Box`.
//! - [`InplaceBlock`] stores the payload inside the block, one allocation total.
//!
//! Teardown happens in two phases. The payload is dropped when the strong count
//! reaches zero; the block itself is freed once the strong and weak counts are
//! both zero. The weak count includes one implicit reference owned collectively
//! by the strong handles, released right after the payload is dropped.

use std::{
    cell::{Cell, UnsafeCell},
    mem::MaybeUninit,
    ptr::{self, addr_of, NonNull},
};

use log::trace;

pub(crate) const MAX_REFCOUNT: usize = (isize::MAX) as usize;

/// Type-erased operations of a concrete control block.
pub(crate) struct BlockVTable {
    payload: unsafe fn(NonNull<Header>) -> *mut (),
    destroy_payload: unsafe fn(NonNull<Header>),
    free: unsafe fn(NonNull<Header>),
}

#[repr(C)]
pub(crate) struct Header {
    strong: Cell<usize>,
    weak: Cell<usize>,
    vtable: &'static BlockVTable,
}

impl Header {
    fn new(vtable: &'static BlockVTable) -> Self {
        Header {
            strong: Cell::new(1),
            weak: Cell::new(1),
            vtable,
        }
    }
}

/// A concrete control block shape.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with a [`Header`] as their first field, so
/// that a pointer to the block is also a pointer to its header.
pub(crate) unsafe trait ControlBlock: Sized {
    const VTABLE: &'static BlockVTable = &BlockVTable {
        payload: erased_payload::<Self>,
        destroy_payload: erased_destroy_payload::<Self>,
        free: erased_free::<Self>,
    };

    /// Address of the payload's storage. Null for a pointer-owning block whose
    /// payload was already dropped.
    unsafe fn payload(this: NonNull<Self>) -> *mut ();

    /// Drops the payload in place. Called once, when the strong count hits zero.
    unsafe fn destroy_payload(this: NonNull<Self>);

    /// Releases the block's own storage. The payload must already be dropped.
    unsafe fn free(this: NonNull<Self>);
}

unsafe fn erased_payload<B: ControlBlock>(header: NonNull<Header>) -> *mut () {
    B::payload(header.cast())
}

unsafe fn erased_destroy_payload<B: ControlBlock>(header: NonNull<Header>) {
    B::destroy_payload(header.cast())
}

unsafe fn erased_free<B: ControlBlock>(header: NonNull<Header>) {
    B::free(header.cast())
}

/// Control block for a payload allocated separately, in a `Box<T>`.
#[repr(C)]
pub(crate) struct PtrBlock<T: ?Sized> {
    header: Header,
    ptr: Cell<Option<NonNull<T>>>,
}

impl<T: ?Sized> PtrBlock<T> {
    /// Takes ownership of `value` and wraps it in a new block with one strong
    /// and one (implicit) weak reference.
    pub(crate) fn allocate(value: Box<T>) -> (BlockRef, NonNull<T>) {
        let ptr = NonNull::from(Box::leak(value));
        let block = NonNull::from(Box::leak(Box::new(PtrBlock {
            header: Header::new(Self::VTABLE),
            ptr: Cell::new(Some(ptr)),
        })));
        trace!("allocated pointer-owning control block {:p}", block);
        #[cfg(test)]
        stats::allocated();
        (BlockRef(block.cast()), ptr)
    }
}

unsafe impl<T: ?Sized> ControlBlock for PtrBlock<T> {
    unsafe fn payload(this: NonNull<Self>) -> *mut () {
        match this.as_ref().ptr.get() {
            Some(ptr) => ptr.as_ptr().cast(),
            None => ptr::null_mut(),
        }
    }

    unsafe fn destroy_payload(this: NonNull<Self>) {
        if let Some(ptr) = this.as_ref().ptr.take() {
            drop(Box::from_raw(ptr.as_ptr()));
        }
    }

    unsafe fn free(this: NonNull<Self>) {
        drop(Box::from_raw(this.as_ptr()));
    }
}

/// Control block whose storage holds the payload itself.
#[repr(C)]
pub(crate) struct InplaceBlock<T> {
    header: Header,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> InplaceBlock<T> {
    /// Moves `value` into a freshly allocated block. This is the only
    /// allocation made for the pair.
    pub(crate) fn allocate(value: T) -> (BlockRef, NonNull<T>) {
        let raw = Box::into_raw(Box::new(InplaceBlock {
            header: Header::new(Self::VTABLE),
            value: UnsafeCell::new(MaybeUninit::new(value)),
        }));
        // SAFETY: `Box::into_raw` never returns null.
        let block = unsafe { NonNull::new_unchecked(raw) };
        // SAFETY: the payload address lies inside the block we just allocated.
        let ptr = unsafe { NonNull::new_unchecked(Self::payload(block).cast::<T>()) };
        trace!("allocated in-place control block {:p}", block);
        #[cfg(test)]
        stats::allocated();
        (BlockRef(block.cast()), ptr)
    }
}

unsafe impl<T> ControlBlock for InplaceBlock<T> {
    unsafe fn payload(this: NonNull<Self>) -> *mut () {
        UnsafeCell::raw_get(addr_of!((*this.as_ptr()).value)).cast()
    }

    unsafe fn destroy_payload(this: NonNull<Self>) {
        ptr::drop_in_place(Self::payload(this).cast::<T>());
    }

    unsafe fn free(this: NonNull<Self>) {
        // `MaybeUninit` never drops its contents, so this only releases storage.
        drop(Box::from_raw(this.as_ptr()));
    }
}

/// An untyped reference to a live control block.
///
/// A `BlockRef` does not own a count by itself; the handle that holds it does.
/// Every `BlockRef` in circulation is backed by a strong or weak count, which
/// keeps the header readable.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct BlockRef(NonNull<Header>);

impl BlockRef {
    fn header(&self) -> &Header {
        // SAFETY: the owning handle's count keeps the block allocated.
        unsafe { self.0.as_ref() }
    }

    pub(crate) fn as_ptr(self) -> *const () {
        self.0.as_ptr().cast_const().cast()
    }

    pub(crate) fn strong(self) -> usize {
        self.header().strong.get()
    }

    pub(crate) fn weak(self) -> usize {
        self.header().weak.get()
    }

    pub(crate) fn inc_strong(self) {
        let strong = &self.header().strong;
        if strong.get() >= MAX_REFCOUNT {
            panic!("Overflow of maximum strong reference count.");
        }
        strong.set(strong.get() + 1);
    }

    pub(crate) fn inc_weak(self) {
        let weak = &self.header().weak;
        if weak.get() >= MAX_REFCOUNT {
            panic!("Overflow of maximum weak reference count.");
        }
        weak.set(weak.get() + 1);
    }

    /// Untyped address of the payload storage; must not be dereferenced once
    /// the strong count is zero.
    pub(crate) fn payload(self) -> *mut () {
        // SAFETY: the vtable was installed together with this header.
        unsafe { (self.header().vtable.payload)(self.0) }
    }

    /// Gives up one strong reference. On the last one, drops the payload and
    /// then the implicit weak reference, which may free the block.
    ///
    /// # Safety
    ///
    /// The caller must own the strong reference being released and must not
    /// use this `BlockRef` afterwards.
    pub(crate) unsafe fn release_strong(self) {
        let header = self.header();
        header.strong.set(header.strong.get() - 1);
        if header.strong.get() != 0 {
            return;
        }

        // The payload's own drop may release weak references to this block
        // (a self-aware payload does). The implicit weak reference keeps the
        // block alive through it.
        (header.vtable.destroy_payload)(self.0);
        self.release_weak();
    }

    /// Gives up one weak reference, freeing the block if nothing else refers
    /// to it.
    ///
    /// # Safety
    ///
    /// The caller must own the weak reference being released and must not
    /// use this `BlockRef` afterwards.
    pub(crate) unsafe fn release_weak(self) {
        let header = self.header();
        header.weak.set(header.weak.get() - 1);
        if header.strong.get() != 0 || header.weak.get() != 0 {
            return;
        }

        let free = header.vtable.free;
        trace!("freeing control block {:p}", self.0);
        #[cfg(test)]
        stats::freed();
        free(self.0);
    }
}

/// Per-thread count of live control blocks, used by the unit tests to check
/// that every block is freed exactly once.
#[cfg(test)]
pub(crate) mod stats {
    use std::cell::Cell;

    thread_local! {
        static LIVE: Cell<usize> = const { Cell::new(0) };
    }

    pub(crate) fn allocated() {
        LIVE.with(|live| live.set(live.get() + 1));
    }

    pub(crate) fn freed() {
        LIVE.with(|live| match live.get().checked_sub(1) {
            Some(n) => live.set(n),
            None => panic!("control block freed twice"),
        });
    }

    pub(crate) fn live_blocks() -> usize {
        LIVE.with(Cell::get)
    }
}
