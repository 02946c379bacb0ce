//! Intrusively counted pointers.
//!
//! The reference count lives inside the value, in a [`RefCount`] reached through the
//! [`RefCounted`] trait, so there is no control block and no weak variant. When the count
//! drops to zero the value is handed to a [`Destroy`] strategy chosen by the handle's type;
//! the default, [`DropBox`], frees it as a `Box`.
//!
//! Because the count is reachable from the value, a raw pointer to a counted value can be
//! turned back into an owning handle at any time with [`Intrusive::from_raw`].
//!
//! ```
//! use rcblock::{Intrusive, RefCount, RefCounted};
//!
//! struct Node {
//!     value: u32,
//!     count: RefCount,
//! }
//!
//! unsafe impl RefCounted for Node {
//!     fn counter(&self) -> &RefCount {
//!         &self.count
//!     }
//! }
//!
//! let node = Intrusive::new(Node { value: 3, count: RefCount::new() });
//! let raw = Intrusive::as_ptr(&node).unwrap().as_ptr();
//! let again = unsafe { Intrusive::<Node>::from_raw(raw) };
//! assert_eq!(again.value, 3);
//! assert_eq!(Intrusive::use_count(&node), 2);
//! ```

use std::{
    cell::Cell,
    cmp::Ordering,
    fmt::{Debug, Pointer},
    hash::{Hash, Hasher},
    marker::PhantomData,
    mem::ManuallyDrop,
    ops::Deref,
    ptr::{self, NonNull},
};

use crate::block::MAX_REFCOUNT;

/// A plain, non-atomic reference counter to embed in a value. Starts at zero.
pub struct RefCount {
    count: Cell<usize>,
}

impl RefCount {
    pub const fn new() -> Self {
        RefCount {
            count: Cell::new(0),
        }
    }

    /// The current number of [`Intrusive`] handles to the value.
    #[inline]
    pub fn get(&self) -> usize {
        self.count.get()
    }

    #[inline]
    fn increment(&self) -> usize {
        let count = self.count.get();
        if count >= MAX_REFCOUNT {
            panic!("Overflow of maximum strong reference count.");
        }
        self.count.set(count + 1);
        count + 1
    }

    #[inline]
    fn decrement(&self) -> usize {
        let count = self.count.get() - 1;
        self.count.set(count);
        count
    }
}

impl Default for RefCount {
    fn default() -> Self {
        RefCount::new()
    }
}

impl Clone for RefCount {
    /// A copied value has no handles yet, so the clone starts at zero.
    fn clone(&self) -> Self {
        RefCount::new()
    }
}

impl Debug for RefCount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("RefCount").field(&self.get()).finish()
    }
}

/// A value that embeds its own [`RefCount`].
///
/// # Safety
///
/// `counter` must return the same `RefCount`, embedded in `self`, on every call for the whole
/// lifetime of the value. [`Intrusive`] frees the value when that count reaches zero, so a
/// second counter would let it free a value that other handles still refer to.
///
/// Implementations therefore have to be marked `unsafe`:
/// ```compile_fail
/// use rcblock::{RefCount, RefCounted};
///
/// struct Node {
///     count: RefCount,
/// }
///
/// impl RefCounted for Node {
///     fn counter(&self) -> &RefCount {
///         &self.count
///     }
/// }
/// ```
pub unsafe trait RefCounted {
    fn counter(&self) -> &RefCount;
}

/// What to do with a value once its last [`Intrusive`] handle is gone.
pub trait Destroy<T: ?Sized> {
    /// # Safety
    ///
    /// `ptr` points to a live value whose count just reached zero. Nothing else refers to it.
    unsafe fn destroy(ptr: NonNull<T>);
}

/// Default strategy: the value was allocated as a `Box` and is dropped as one.
#[derive(Clone, Copy, Debug, Default)]
pub struct DropBox;

impl<T: ?Sized> Destroy<T> for DropBox {
    #[inline]
    unsafe fn destroy(ptr: NonNull<T>) {
        drop(Box::from_raw(ptr.as_ptr()));
    }
}

/// A nullable pointer to a [`RefCounted`] value, destroyed through `D` when the count reaches
/// zero. Handles compare, order and hash by address.
pub struct Intrusive<T: ?Sized + RefCounted, D: Destroy<T> = DropBox> {
    ptr: Option<NonNull<T>>,
    _marker: PhantomData<(Box<T>, D)>,
}

impl<T: RefCounted> Intrusive<T> {
    /// Boxes `value` and takes the first reference to it.
    #[inline]
    pub fn new(value: T) -> Self {
        Intrusive::from_box(Box::new(value))
    }
}

impl<T: ?Sized + RefCounted> Intrusive<T> {
    /// Takes the first reference to an already boxed value, which may be unsized.
    #[inline]
    pub fn from_box(value: Box<T>) -> Self {
        // SAFETY: the pointer comes from a live box, which `DropBox` knows how to free.
        unsafe { Intrusive::from_raw(Box::into_raw(value)) }
    }
}

impl<T: ?Sized + RefCounted, D: Destroy<T>> Intrusive<T, D> {
    /// Creates a handle that refers to nothing.
    /// ```
    /// use rcblock::{Intrusive, RefCount, RefCounted};
    ///
    /// struct Node(RefCount);
    ///
    /// unsafe impl RefCounted for Node {
    ///     fn counter(&self) -> &RefCount {
    ///         &self.0
    ///     }
    /// }
    ///
    /// let empty = Intrusive::<Node>::empty();
    /// assert!(Intrusive::is_null(&empty));
    /// assert_eq!(Intrusive::use_count(&empty), 0);
    /// ```
    #[inline]
    pub const fn empty() -> Self {
        Intrusive {
            ptr: None,
            _marker: PhantomData,
        }
    }

    /// Takes a new reference to the value behind `ptr`, incrementing its count. A null `ptr`
    /// gives an empty handle.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must point to a live value that `D` can destroy, and that value may only
    /// be destroyed through its count.
    #[inline]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        let ptr = NonNull::new(ptr);
        if let Some(ptr) = ptr {
            ptr.as_ref().counter().increment();
        }
        Intrusive {
            ptr,
            _marker: PhantomData,
        }
    }

    /// Wraps `ptr` without incrementing its count, taking over a reference given up earlier by
    /// [`Intrusive::into_raw`].
    ///
    /// # Safety
    ///
    /// The caller must own one reference to the value, obtained from `into_raw` of an
    /// `Intrusive<T, D>`.
    #[inline]
    pub unsafe fn adopt(ptr: NonNull<T>) -> Self {
        Intrusive {
            ptr: Some(ptr),
            _marker: PhantomData,
        }
    }

    /// Gives up the handle without decrementing the count. The reference it held now belongs to
    /// the caller, who can hand it back with [`Intrusive::adopt`].
    #[inline]
    pub fn into_raw(this: Self) -> Option<NonNull<T>> {
        ManuallyDrop::new(this).ptr
    }

    /// Releases the reference and leaves the handle empty.
    #[inline]
    pub fn reset(this: &mut Self) {
        if let Some(ptr) = this.ptr.take() {
            // SAFETY: this handle owned one reference.
            unsafe { release::<T, D>(ptr) };
        }
    }

    /// Points the handle at `ptr`, releasing the previous reference. The new value is counted
    /// before the old one is released, so re-pointing a handle at its own value is harmless.
    ///
    /// # Safety
    ///
    /// Same as [`Intrusive::from_raw`].
    #[inline]
    pub unsafe fn reset_raw(this: &mut Self, ptr: *mut T) {
        *this = Intrusive::from_raw(ptr);
    }

    /// Exchanges the pointees of two handles without touching either count.
    #[inline]
    pub fn swap(this: &mut Self, other: &mut Self) {
        core::mem::swap(this, other);
    }

    /// Returns a reference to the value, or [`None`] for an empty handle.
    #[inline]
    pub fn get(this: &Self) -> Option<&T> {
        // SAFETY: a non-empty handle keeps its pointee alive.
        this.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    /// Returns the pointer to the value without affecting the count.
    #[inline]
    pub fn as_ptr(this: &Self) -> Option<NonNull<T>> {
        this.ptr
    }

    /// The value's own count, or 0 for an empty handle.
    #[inline]
    pub fn use_count(this: &Self) -> usize {
        Intrusive::get(this).map_or(0, |value| value.counter().get())
    }

    /// Returns `true` if the handle refers to nothing.
    #[inline]
    pub fn is_null(this: &Self) -> bool {
        this.ptr.is_none()
    }

    fn addr(&self) -> *const () {
        self.ptr
            .map_or(ptr::null(), |ptr| ptr.as_ptr().cast_const().cast())
    }
}

unsafe fn release<T: ?Sized + RefCounted, D: Destroy<T>>(ptr: NonNull<T>) {
    if ptr.as_ref().counter().decrement() == 0 {
        D::destroy(ptr);
    }
}

impl<T: ?Sized + RefCounted, D: Destroy<T>> Drop for Intrusive<T, D> {
    #[inline]
    fn drop(&mut self) {
        Intrusive::reset(self);
    }
}

impl<T: ?Sized + RefCounted, D: Destroy<T>> Clone for Intrusive<T, D> {
    #[inline]
    fn clone(&self) -> Self {
        if let Some(value) = Intrusive::get(self) {
            value.counter().increment();
        }
        Intrusive {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized + RefCounted, D: Destroy<T>> Deref for Intrusive<T, D> {
    type Target = T;

    /// Panics if the handle is empty.
    #[inline]
    fn deref(&self) -> &T {
        match Intrusive::get(self) {
            Some(value) => value,
            None => panic!("Dereferenced an empty `Intrusive`."),
        }
    }
}

impl<T: ?Sized + RefCounted, D: Destroy<T>> Default for Intrusive<T, D> {
    fn default() -> Self {
        Intrusive::empty()
    }
}

impl<T: ?Sized + RefCounted, D: Destroy<T>> PartialEq for Intrusive<T, D> {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl<T: ?Sized + RefCounted, D: Destroy<T>> Eq for Intrusive<T, D> {}

impl<T: ?Sized + RefCounted, D: Destroy<T>> PartialOrd for Intrusive<T, D> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ?Sized + RefCounted, D: Destroy<T>> Ord for Intrusive<T, D> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl<T: ?Sized + RefCounted, D: Destroy<T>> Hash for Intrusive<T, D> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T: ?Sized + RefCounted + Debug, D: Destroy<T>> Debug for Intrusive<T, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match Intrusive::get(self) {
            Some(value) => Debug::fmt(value, f),
            None => f.write_str("(empty)"),
        }
    }
}

impl<T: ?Sized + RefCounted, D: Destroy<T>> Pointer for Intrusive<T, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        Pointer::fmt(&self.addr(), f)
    }
}
