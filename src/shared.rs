use std::{
    fmt::{Debug, Display, Pointer},
    hash::{Hash, Hasher},
    marker::PhantomData,
    mem::ManuallyDrop,
    ops::Deref,
    ptr::{self, NonNull},
};

use crate::{
    block::{BlockRef, InplaceBlock, PtrBlock},
    error::BadWeakRef,
};

/// `Shared<T>` is a reference counted pointer with shared ownership of a heap allocated value.
/// All `Shared<T>`s created from one another refer to one control block, which holds a strong
/// and a weak reference count. The value is dropped when the last `Shared<T>` is dropped, and the
/// control block is freed once there are no `Shared<T>`s or [`Weak<T>`]s left.
///
/// A `Shared<T>` may be empty. Empty handles own nothing, report a use count of 0 and panic on
/// dereference; [`Shared::get`] is the non-panicking accessor.
///
/// ## Construction
/// - [`Shared::new`] moves the value into the control block: one allocation in total.
/// - [`Shared::from_box`] takes an existing `Box<T>` and allocates a block next to it. This works
///   for unsized values such as `Box<dyn Trait>` or `Box<[T]>`.
/// - [`Shared::new_aware`] and [`Shared::from_box_aware`] do the same for
///   [`SelfAware`](crate::SelfAware) types and let the value hand out handles to itself.
///
/// ## Aliasing
/// [`Shared::project`] produces a `Shared<U>` that points at some part of the value (or at the
/// value seen as a trait object) while sharing the original handle's ownership. The whole value
/// stays alive until both the original and the projected handles are gone.
///
/// ## Reference cycles
/// A cycle of `Shared<T>` pointers is never freed because the strong count never reaches zero.
/// Use a [`Weak<T>`] on one side of the cycle.
///
/// ## Threads
/// The counts are plain integers, so `Shared<T>` is neither [`Send`] nor [`Sync`].
///
/// ## Associated functions
/// `Shared<T>` dereferences to `T`, so its own functions are associated to avoid name clashes:
/// `Shared::use_count(&shared)` rather than `shared.use_count()`.
///
/// ## Examples
///
/// ```
/// use rcblock::Shared;
///
/// let shared = Shared::new(100);
/// let other = shared.clone();
/// assert_eq!(*other, 100);
/// assert_eq!(Shared::use_count(&shared), 2);
/// ```
pub struct Shared<T: ?Sized> {
    ptr: Option<NonNull<T>>,
    block: Option<BlockRef>,
    _marker: PhantomData<T>,
}

/// `Weak<T>` is a non-owning reference to the value held by a [`Shared<T>`]. It keeps the control
/// block alive but not the value, so it has to be turned back into a `Shared<T>` with
/// [`Weak::lock`] or [`Shared::from_weak`] before the value can be used.
///
/// A typical use is a tree: parents own their children through `Shared<T>` and children refer to
/// their parent through `Weak<T>`.
///
/// ```
/// use rcblock::{Shared, Weak};
///
/// let shared = Shared::new(100);
/// let weak = Shared::downgrade(&shared);
/// assert_eq!(*Weak::lock(&weak), 100);
///
/// drop(shared);
/// assert!(Weak::expired(&weak));
/// assert!(Shared::is_null(&Weak::lock(&weak)));
/// ```
pub struct Weak<T: ?Sized> {
    ptr: Option<NonNull<T>>,
    block: Option<BlockRef>,
}

impl<T> Shared<T> {
    /// Creates a new `Shared<T>` holding `value`. The value is stored inside the control block,
    /// so this performs exactly one allocation.
    /// ```
    /// use rcblock::Shared;
    ///
    /// let shared = Shared::new(100);
    /// assert_eq!(*shared, 100);
    /// ```
    #[inline]
    pub fn new(value: T) -> Self {
        let (block, ptr) = InplaceBlock::allocate(value);
        Shared::from_parts(Some(ptr), Some(block))
    }
}

impl<T: ?Sized> Shared<T> {
    #[inline]
    fn from_parts(ptr: Option<NonNull<T>>, block: Option<BlockRef>) -> Self {
        Shared {
            ptr,
            block,
            _marker: PhantomData,
        }
    }

    /// Creates an empty `Shared<T>` that owns nothing.
    /// ```
    /// use rcblock::Shared;
    ///
    /// let shared = Shared::<i32>::empty();
    /// assert!(Shared::is_null(&shared));
    /// assert_eq!(Shared::use_count(&shared), 0);
    /// ```
    #[inline]
    pub const fn empty() -> Self {
        Shared {
            ptr: None,
            block: None,
            _marker: PhantomData,
        }
    }

    /// Takes ownership of a boxed value. The box stays where it is and a separate control block
    /// is allocated to track it. The value is dropped through the `Box` when the last strong
    /// reference goes away.
    /// ```
    /// use rcblock::Shared;
    /// use std::fmt::Display;
    ///
    /// let shared: Shared<dyn Display> = Shared::from_box(Box::new(7));
    /// assert_eq!(shared.to_string(), "7");
    /// ```
    #[inline]
    pub fn from_box(value: Box<T>) -> Self {
        let (block, ptr) = PtrBlock::allocate(value);
        Shared::from_parts(Some(ptr), Some(block))
    }

    /// Promotes a [`Weak<T>`] to a new strong reference. Fails with [`BadWeakRef`] if the value
    /// has already been dropped, or if the weak reference never referred to a value.
    /// ```
    /// use rcblock::{Shared, Weak};
    ///
    /// let shared = Shared::new(5);
    /// let weak = Shared::downgrade(&shared);
    /// let again = Shared::from_weak(&weak).unwrap();
    /// assert_eq!(Shared::use_count(&again), 2);
    ///
    /// drop((shared, again));
    /// assert!(Shared::from_weak(&weak).is_err());
    /// assert!(Shared::from_weak(&Weak::<i32>::empty()).is_err());
    /// ```
    #[inline]
    pub fn from_weak(weak: &Weak<T>) -> Result<Self, BadWeakRef> {
        match (weak.ptr, weak.block) {
            (Some(ptr), Some(block)) if block.strong() > 0 => {
                block.inc_strong();
                Ok(Shared::from_parts(Some(ptr), Some(block)))
            }
            _ => Err(BadWeakRef(())),
        }
    }

    /// Creates a handle to a part of the value (or to the value viewed through another type)
    /// that shares ownership with `this`. The strong count is incremented; the whole value lives
    /// as long as any handle of the group. Projecting an empty handle gives an empty handle.
    ///
    /// This is also how a handle is converted to a trait object:
    /// ```
    /// use rcblock::Shared;
    /// use std::fmt::Debug;
    ///
    /// struct Pair {
    ///     left: String,
    ///     right: u32,
    /// }
    ///
    /// let pair = Shared::new(Pair { left: "l".into(), right: 2 });
    /// let right = Shared::project(&pair, |p| &p.right);
    /// let left = Shared::project::<dyn Debug, _>(&pair, |p| &p.left);
    /// drop(pair);
    ///
    /// assert_eq!(*right, 2);
    /// assert_eq!(format!("{:?}", left), "\"l\"");
    /// assert_eq!(Shared::use_count(&right), 2);
    /// assert!(right == left);
    /// ```
    ///
    /// `T` must be `'static`. A handle carries no lifetime, so a projection through a borrow
    /// held by the value could otherwise outlive the borrowed data:
    /// ```compile_fail
    /// use rcblock::Shared;
    ///
    /// let escaped: Shared<String>;
    /// {
    ///     let local = String::from("borrowed");
    ///     let outer = Shared::new(&local);
    ///     escaped = Shared::project(&outer, |r| *r);
    /// }
    /// assert_eq!(escaped.len(), 8);
    /// ```
    #[inline]
    pub fn project<U: ?Sized, F>(this: &Self, f: F) -> Shared<U>
    where
        T: 'static,
        F: FnOnce(&T) -> &U,
    {
        match Shared::get(this) {
            Some(value) => {
                let target = NonNull::from(f(value));
                if let Some(block) = this.block {
                    block.inc_strong();
                }
                Shared::from_parts(Some(target), this.block)
            }
            None => Shared::empty(),
        }
    }

    /// Like [`Shared::project`], but consumes `this` and so leaves the counts unchanged.
    /// ```
    /// use rcblock::Shared;
    ///
    /// let shared = Shared::new((1, 2));
    /// let second = Shared::map(shared, |pair| &pair.1);
    /// assert_eq!(*second, 2);
    /// assert_eq!(Shared::use_count(&second), 1);
    /// ```
    ///
    /// As with [`Shared::project`], `T` must be `'static`:
    /// ```compile_fail
    /// use rcblock::Shared;
    ///
    /// let escaped: Shared<String>;
    /// {
    ///     let local = String::from("borrowed");
    ///     escaped = Shared::map(Shared::new(&local), |r| *r);
    /// }
    /// assert_eq!(escaped.len(), 8);
    /// ```
    #[inline]
    pub fn map<U: ?Sized, F>(this: Self, f: F) -> Shared<U>
    where
        T: 'static,
        F: FnOnce(&T) -> &U,
    {
        let target = Shared::get(&this).map(|value| NonNull::from(f(value)));
        let this = ManuallyDrop::new(this);
        Shared::from_parts(target, this.block)
    }

    /// Creates a handle that shares `owner`'s ownership but points at `ptr`, which need not be
    /// related to `owner`'s value at all. The strong count of `owner`'s group is incremented.
    ///
    /// # Safety
    ///
    /// `ptr` must stay valid for reads for as long as any handle of `owner`'s group is alive.
    /// If `owner` is empty the result owns nothing and `ptr` must outlive the result itself.
    #[inline]
    pub unsafe fn alias<U: ?Sized>(owner: &Shared<U>, ptr: NonNull<T>) -> Self {
        if let Some(block) = owner.block {
            block.inc_strong();
        }
        Shared::from_parts(Some(ptr), owner.block)
    }

    /// Create a [`Weak<T>`] from a `Shared<T>`. This increments the weak count.
    /// ```
    /// use rcblock::Shared;
    ///
    /// let shared = Shared::new(100);
    /// let weak = Shared::downgrade(&shared);
    /// assert_eq!(Shared::weak_count(&shared), 2);
    /// ```
    #[inline]
    pub fn downgrade(this: &Self) -> Weak<T> {
        if let Some(block) = this.block {
            block.inc_weak();
        }
        Weak {
            ptr: this.ptr,
            block: this.block,
        }
    }

    /// Releases this handle's reference and leaves it empty. If it was the last strong
    /// reference the value is dropped; if no weak references remain either, the control block
    /// is freed as well.
    /// ```
    /// use rcblock::Shared;
    ///
    /// let mut shared = Shared::new(100);
    /// let other = shared.clone();
    /// Shared::reset(&mut shared);
    /// assert!(Shared::is_null(&shared));
    /// assert_eq!(Shared::use_count(&other), 1);
    /// ```
    #[inline]
    pub fn reset(this: &mut Self) {
        this.ptr = None;
        if let Some(block) = this.block.take() {
            // SAFETY: this handle owned one strong reference and no longer refers to the block.
            unsafe { block.release_strong() };
        }
    }

    /// Releases this handle's reference, then takes ownership of `value` as
    /// [`Shared::from_box`] would.
    /// ```
    /// use rcblock::Shared;
    ///
    /// let mut shared = Shared::new(1);
    /// Shared::reset_with(&mut shared, Box::new(2));
    /// assert_eq!(*shared, 2);
    /// ```
    #[inline]
    pub fn reset_with(this: &mut Self, value: Box<T>) {
        Shared::reset(this);
        *this = Shared::from_box(value);
    }

    /// Exchanges the contents of two handles without touching any count.
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

    /// Get a `&mut` reference to the value if this is the only `Shared<T>` and there are no
    /// [`Weak<T>`]s. Otherwise return [`None`], because mutating a shared value would be unsound.
    /// Aliased handles (see [`Shared::project`]) never qualify.
    ///
    /// ```
    /// use rcblock::Shared;
    ///
    /// let mut shared = Shared::new(100);
    /// *Shared::get_mut(&mut shared).unwrap() = 300;
    /// assert_eq!(*shared, 300);
    ///
    /// let weak = Shared::downgrade(&shared);
    /// assert!(Shared::get_mut(&mut shared).is_none());
    /// ```
    #[inline]
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        let (ptr, block) = (this.ptr?, this.block?);
        if block.strong() == 1 && block.weak() == 1 && block.payload() == ptr.as_ptr().cast() {
            // SAFETY: no other handle can reach the value.
            Some(unsafe { &mut *ptr.as_ptr() })
        } else {
            None
        }
    }

    /// Returns the pointer this handle dereferences to, or [`None`] for an empty handle.
    #[inline]
    pub fn as_ptr(this: &Self) -> Option<NonNull<T>> {
        this.ptr
    }

    /// Return the number of `Shared<T>`s in this handle's ownership group, or 0 for an empty
    /// handle. Weak references are not counted.
    /// ```
    /// use rcblock::Shared;
    ///
    /// let shared = Shared::new(100);
    /// let _weak = Shared::downgrade(&shared);
    /// let _other = shared.clone();
    /// assert_eq!(Shared::use_count(&shared), 2);
    /// ```
    #[inline]
    pub fn use_count(this: &Self) -> usize {
        this.block.map_or(0, BlockRef::strong)
    }

    /// Return the weak count of the control block, or 0 for an empty handle.
    /// It includes the implicit weak reference held by all `Shared<T>`s together.
    /// ```
    /// use rcblock::Shared;
    ///
    /// let shared = Shared::new(100);
    /// assert_eq!(Shared::weak_count(&shared), 1);
    /// let weak = Shared::downgrade(&shared);
    /// let weak2 = weak.clone();
    /// assert_eq!(Shared::weak_count(&shared), 3);
    /// ```
    #[inline]
    pub fn weak_count(this: &Self) -> usize {
        this.block.map_or(0, BlockRef::weak)
    }

    /// Returns `true` if the handle has no value to dereference.
    #[inline]
    pub fn is_null(this: &Self) -> bool {
        this.ptr.is_none()
    }

    /// Checks whether two handles point at the same address. Compare handles with `==` to check
    /// whether they share ownership instead.
    /// ```
    /// use rcblock::Shared;
    ///
    /// let shared = Shared::new((1, 2));
    /// let first = Shared::project(&shared, |p| &p.0);
    /// let second = Shared::project(&shared, |p| &p.1);
    /// assert!(!Shared::ptr_eq(&first, &second));
    /// assert!(first == second);
    /// ```
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.ptr.map(|ptr| ptr.as_ptr().cast::<()>()) == other.ptr.map(|ptr| ptr.as_ptr().cast::<()>())
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    /// Get an immutable reference to the value. Panics if the handle is empty.
    /// ```
    /// use rcblock::Shared;
    /// use std::ops::Deref;
    ///
    /// let shared = Shared::new(100i32);
    /// assert_eq!(*shared, 100i32);
    /// assert_eq!(shared.deref(), &100i32);
    /// ```
    #[inline]
    fn deref(&self) -> &Self::Target {
        match Shared::get(self) {
            Some(value) => value,
            None => panic!("Dereferenced an empty `Shared`."),
        }
    }
}

impl<T: ?Sized> Drop for Shared<T> {
    #[inline]
    fn drop(&mut self) {
        Shared::reset(self);
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    /// Clone a `Shared<T>` (increment the strong count). Cloning an empty handle gives an empty
    /// handle.
    /// ```
    /// use rcblock::Shared;
    ///
    /// let shared = Shared::new(100);
    /// let shared2 = shared.clone();
    /// assert_eq!(Shared::use_count(&shared), 2);
    /// ```
    #[inline]
    fn clone(&self) -> Self {
        if let Some(block) = self.block {
            block.inc_strong();
        }
        Shared::from_parts(self.ptr, self.block)
    }
}

impl<T: ?Sized> Default for Shared<T> {
    /// An empty handle.
    fn default() -> Self {
        Shared::empty()
    }
}

impl<T: ?Sized> AsRef<T> for Shared<T> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T: ?Sized + Display> Display for Shared<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match Shared::get(self) {
            Some(value) => Display::fmt(value, f),
            None => f.write_str("(empty)"),
        }
    }
}

impl<T: ?Sized + Debug> Debug for Shared<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match Shared::get(self) {
            Some(value) => Debug::fmt(value, f),
            None => f.write_str("(empty)"),
        }
    }
}

impl<T: ?Sized> Pointer for Shared<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.ptr {
            Some(ptr) => Pointer::fmt(&ptr, f),
            None => Pointer::fmt(&ptr::null::<()>(), f),
        }
    }
}

impl<T> From<T> for Shared<T> {
    /// Equivalent to [`Shared::new`].
    fn from(value: T) -> Self {
        Shared::new(value)
    }
}

impl<T: ?Sized> From<Box<T>> for Shared<T> {
    /// Equivalent to [`Shared::from_box`].
    /// ```
    /// use rcblock::Shared;
    ///
    /// let shared: Shared<[i32]> = Shared::from(vec![1, 2, 3].into_boxed_slice());
    /// assert_eq!(&*shared, &[1, 2, 3]);
    /// ```
    fn from(value: Box<T>) -> Self {
        Shared::from_box(value)
    }
}

impl<'a, T: ?Sized> TryFrom<&'a Weak<T>> for Shared<T> {
    type Error = BadWeakRef;

    /// Equivalent to [`Shared::from_weak`].
    fn try_from(weak: &'a Weak<T>) -> Result<Self, Self::Error> {
        Shared::from_weak(weak)
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<Shared<U>> for Shared<T> {
    /// Two handles are equal when they belong to the same ownership group, whatever they point
    /// at. Two empty handles are equal.
    /// ```
    /// use rcblock::Shared;
    ///
    /// let a = Shared::new(1);
    /// let b = Shared::new(1);
    /// assert!(a == a.clone());
    /// assert!(a != b);
    /// ```
    #[inline]
    fn eq(&self, other: &Shared<U>) -> bool {
        self.block == other.block
    }
}

impl<T: ?Sized> Eq for Shared<T> {}

impl<T: ?Sized> Hash for Shared<T> {
    /// Hashes the ownership group, consistent with `==`.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.block.map(BlockRef::as_ptr).hash(state);
    }
}

impl<T: ?Sized> Weak<T> {
    /// Creates a `Weak<T>` that refers to nothing. It is always expired.
    #[inline]
    pub const fn empty() -> Self {
        Weak {
            ptr: None,
            block: None,
        }
    }

    /// Tries to create a [`Shared<T>`] from the `Weak<T>`. If the value was already dropped an
    /// empty `Shared<T>` is returned; otherwise the strong count is incremented.
    ///
    /// Use [`Shared::from_weak`] to get a [`BadWeakRef`] error instead of an empty handle.
    /// ```
    /// use rcblock::Shared;
    /// use rcblock::Weak;
    ///
    /// let shared = Shared::new(100i32);
    /// let weak = Shared::downgrade(&shared);
    /// let locked = Weak::lock(&weak);
    /// assert_eq!(*locked, 100i32);
    /// assert_eq!(Shared::use_count(&locked), 2);
    /// ```
    #[inline]
    pub fn lock(this: &Self) -> Shared<T> {
        Shared::from_weak(this).unwrap_or_else(|_| Shared::empty())
    }

    /// Returns `true` if the value is gone (or there never was one).
    #[inline]
    pub fn expired(this: &Self) -> bool {
        Weak::use_count(this) == 0
    }

    /// Return the number of `Shared<T>`s keeping the value alive.
    #[inline]
    pub fn use_count(this: &Self) -> usize {
        this.block.map_or(0, BlockRef::strong)
    }

    /// Return the weak count of the control block, or 0 for an empty `Weak<T>`. While the value
    /// is alive this includes the implicit reference held by the `Shared<T>`s.
    /// ```
    /// use rcblock::Shared;
    /// use rcblock::Weak;
    ///
    /// let shared = Shared::new(100);
    /// let weak = Shared::downgrade(&shared);
    /// assert_eq!(Weak::weak_count(&weak), 2);
    /// drop(shared);
    /// assert_eq!(Weak::weak_count(&weak), 1);
    /// ```
    #[inline]
    pub fn weak_count(this: &Self) -> usize {
        this.block.map_or(0, BlockRef::weak)
    }

    /// Releases this weak reference and leaves it empty.
    #[inline]
    pub fn reset(this: &mut Self) {
        this.ptr = None;
        if let Some(block) = this.block.take() {
            // SAFETY: this handle owned one weak reference and no longer refers to the block.
            unsafe { block.release_weak() };
        }
    }

    /// Exchanges the contents of two weak handles without touching any count.
    #[inline]
    pub fn swap(this: &mut Self, other: &mut Self) {
        core::mem::swap(this, other);
    }

    /// Checks whether two weak handles refer to the same control block.
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.block == other.block
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    #[inline]
    fn drop(&mut self) {
        Weak::reset(self);
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    /// Clone a `Weak<T>` (increment the weak count).
    /// ```
    /// use rcblock::Shared;
    ///
    /// let shared = Shared::new(100);
    /// let weak1 = Shared::downgrade(&shared);
    /// let weak2 = weak1.clone();
    /// assert_eq!(Shared::weak_count(&shared), 3);
    /// ```
    #[inline]
    fn clone(&self) -> Self {
        if let Some(block) = self.block {
            block.inc_weak();
        }
        Weak {
            ptr: self.ptr,
            block: self.block,
        }
    }
}

impl<T: ?Sized> Default for Weak<T> {
    fn default() -> Self {
        Weak::empty()
    }
}

impl<T: ?Sized> From<&Shared<T>> for Weak<T> {
    /// Equivalent to [`Shared::downgrade`].
    fn from(shared: &Shared<T>) -> Self {
        Shared::downgrade(shared)
    }
}

impl<T: ?Sized> Debug for Weak<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("(Weak)")
    }
}
