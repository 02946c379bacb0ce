//! Exclusive ownership with a pluggable deleter.

use std::{
    fmt::Debug,
    marker::PhantomData,
    mem,
    ops::{Deref, DerefMut},
    ptr::NonNull,
};

use crate::pair::CompressedPair;

/// Releases a value owned by a [`Unique`].
pub trait Deleter<T: ?Sized> {
    /// # Safety
    ///
    /// `ptr` must be the pointer the owning [`Unique`] held, and must not be used afterwards.
    unsafe fn delete(&mut self, ptr: NonNull<T>);
}

/// Drops the value as the `Box` it was allocated in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DefaultDelete;

impl<T: ?Sized> Deleter<T> for DefaultDelete {
    #[inline]
    unsafe fn delete(&mut self, ptr: NonNull<T>) {
        drop(Box::from_raw(ptr.as_ptr()));
    }
}

/// Adapts a closure into a [`Deleter`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FnDeleter<F>(pub F);

impl<T: ?Sized, F: FnMut(NonNull<T>)> Deleter<T> for FnDeleter<F> {
    #[inline]
    unsafe fn delete(&mut self, ptr: NonNull<T>) {
        (self.0)(ptr)
    }
}

/// A nullable owning pointer that hands its value to `D` when dropped or reset.
///
/// With a zero-sized deleter a `Unique<T>` is the size of a pointer. Slices work through
/// `Unique<[T]>`, which dereferences to `[T]`:
/// ```
/// use rcblock::Unique;
///
/// let mut values = Unique::from_box(vec![1, 2, 3].into_boxed_slice());
/// values[1] = 20;
/// assert_eq!(&*values, &[1, 20, 3]);
/// assert_eq!(std::mem::size_of::<Unique<u64>>(), std::mem::size_of::<*mut u64>());
/// ```
pub struct Unique<T: ?Sized, D: Deleter<T> = DefaultDelete> {
    pair: CompressedPair<Option<NonNull<T>>, D>,
    _marker: PhantomData<T>,
}

unsafe impl<T: ?Sized + Send, D: Deleter<T> + Send> Send for Unique<T, D> {}
unsafe impl<T: ?Sized + Sync, D: Deleter<T> + Sync> Sync for Unique<T, D> {}

impl<T> Unique<T> {
    /// Boxes `value` and takes ownership of it.
    /// ```
    /// use rcblock::Unique;
    ///
    /// let mut unique = Unique::new(String::from("owned"));
    /// unique.push('!');
    /// assert_eq!(*unique, "owned!");
    /// ```
    #[inline]
    pub fn new(value: T) -> Self {
        Unique::from_box(Box::new(value))
    }
}

impl<T: ?Sized> Unique<T> {
    /// Takes ownership of an already boxed value, to be dropped as that `Box`.
    #[inline]
    pub fn from_box(value: Box<T>) -> Self {
        Unique {
            pair: CompressedPair::new(Some(NonNull::from(Box::leak(value))), DefaultDelete),
            _marker: PhantomData,
        }
    }

    /// Gives the value back as a `Box`, leaving the handle empty.
    #[inline]
    pub fn into_box(mut this: Self) -> Option<Box<T>> {
        // SAFETY: values owned through `DefaultDelete` are always boxed.
        Unique::release(&mut this).map(|ptr| unsafe { Box::from_raw(ptr.as_ptr()) })
    }
}

impl<T: ?Sized, D: Deleter<T>> Unique<T, D> {
    /// Takes ownership of `ptr`, to be released through `deleter`. A null `ptr` gives an empty
    /// handle.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must be valid for reads and writes until `deleter` receives it, and
    /// nothing else may access it meanwhile.
    #[inline]
    pub unsafe fn from_raw_with(ptr: *mut T, deleter: D) -> Self {
        Unique {
            pair: CompressedPair::new(NonNull::new(ptr), deleter),
            _marker: PhantomData,
        }
    }

    /// Creates a handle that owns nothing, with a default deleter.
    /// ```
    /// use rcblock::Unique;
    ///
    /// let empty = Unique::<u32>::empty();
    /// assert!(Unique::is_null(&empty));
    /// assert!(Unique::get(&empty).is_none());
    /// ```
    #[inline]
    pub fn empty() -> Self
    where
        D: Default,
    {
        Unique {
            pair: CompressedPair::new(None, D::default()),
            _marker: PhantomData,
        }
    }

    /// Gives up ownership without running the deleter.
    #[inline]
    pub fn release(this: &mut Self) -> Option<NonNull<T>> {
        this.pair.first_mut().take()
    }

    /// Runs the deleter on the current value, if any, and leaves the handle empty.
    #[inline]
    pub fn reset(this: &mut Self) {
        if let Some(ptr) = this.pair.first_mut().take() {
            // SAFETY: the handle owned `ptr` and no longer refers to it.
            unsafe { this.pair.second_mut().delete(ptr) };
        }
    }

    /// Takes ownership of `ptr`, then runs the deleter on the previous value.
    ///
    /// # Safety
    ///
    /// Same as [`Unique::from_raw_with`], with the existing deleter.
    #[inline]
    pub unsafe fn reset_raw(this: &mut Self, ptr: *mut T) {
        if let Some(old) = mem::replace(this.pair.first_mut(), NonNull::new(ptr)) {
            this.pair.second_mut().delete(old);
        }
    }

    /// Exchanges the values and deleters of two handles.
    #[inline]
    pub fn swap(this: &mut Self, other: &mut Self) {
        mem::swap(this, other);
    }

    /// Returns a reference to the value, or [`None`] for an empty handle.
    #[inline]
    pub fn get(this: &Self) -> Option<&T> {
        // SAFETY: the handle owns its pointee.
        (*this.pair.first()).map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    /// Returns a mutable reference to the value, or [`None`] for an empty handle.
    #[inline]
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        // SAFETY: the handle owns its pointee exclusively.
        (*this.pair.first()).map(|ptr| unsafe { &mut *ptr.as_ptr() })
    }

    /// Returns the owned pointer without giving up ownership.
    #[inline]
    pub fn as_ptr(this: &Self) -> Option<NonNull<T>> {
        *this.pair.first()
    }

    /// The deleter that will receive the value.
    #[inline]
    pub fn deleter(this: &Self) -> &D {
        this.pair.second()
    }

    /// Mutable access to the deleter, for stateful deleters.
    #[inline]
    pub fn deleter_mut(this: &mut Self) -> &mut D {
        this.pair.second_mut()
    }

    /// Returns `true` if the handle owns nothing.
    #[inline]
    pub fn is_null(this: &Self) -> bool {
        this.pair.first().is_none()
    }
}

impl<T: ?Sized, D: Deleter<T>> Drop for Unique<T, D> {
    fn drop(&mut self) {
        Unique::reset(self);
    }
}

impl<T: ?Sized, D: Deleter<T>> Deref for Unique<T, D> {
    type Target = T;

    fn deref(&self) -> &T {
        match Unique::get(self) {
            Some(value) => value,
            None => panic!("Dereferenced an empty `Unique`."),
        }
    }
}

impl<T: ?Sized, D: Deleter<T>> DerefMut for Unique<T, D> {
    fn deref_mut(&mut self) -> &mut T {
        match Unique::get_mut(self) {
            Some(value) => value,
            None => panic!("Dereferenced an empty `Unique`."),
        }
    }
}

impl<T: ?Sized, D: Deleter<T> + Default> Default for Unique<T, D> {
    fn default() -> Self {
        Unique::empty()
    }
}

impl<T: ?Sized> From<Box<T>> for Unique<T> {
    fn from(value: Box<T>) -> Self {
        Unique::from_box(value)
    }
}

impl<T: ?Sized + Debug, D: Deleter<T>> Debug for Unique<T, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match Unique::get(self) {
            Some(value) => Debug::fmt(value, f),
            None => f.write_str("(empty)"),
        }
    }
}
