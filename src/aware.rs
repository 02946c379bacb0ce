//! Values that can hand out [`Shared`] and [`Weak`] handles to themselves.
//!
//! A type opts in by embedding a [`SelfRef<Self>`] and implementing [`SelfAware`]. The slot is
//! filled the first time the value is wrapped with [`Shared::new_aware`] or
//! [`Shared::from_box_aware`]; from then on the value can produce handles that share ownership
//! with every other handle to it.
//!
//! ```
//! use rcblock::{SelfAware, SelfRef, Shared};
//!
//! struct Node {
//!     name: String,
//!     this: SelfRef<Node>,
//! }
//!
//! impl SelfAware for Node {
//!     fn self_ref(&self) -> &SelfRef<Self> {
//!         &self.this
//!     }
//! }
//!
//! let node = Shared::new_aware(Node { name: "root".into(), this: SelfRef::new() });
//! let again = node.shared_from_self().unwrap();
//! assert_eq!(again.name, "root");
//! assert_eq!(Shared::use_count(&node), 2);
//!
//! let loose = Node { name: "loose".into(), this: SelfRef::new() };
//! assert!(loose.shared_from_self().is_err());
//! ```

use std::{cell::UnsafeCell, fmt::Debug};

use crate::{error::BadWeakRef, Shared, Weak};

/// The embedded weak reference of a [`SelfAware`] value.
///
/// Empty until the value is first wrapped. Cloning a `SelfRef` gives an empty slot: a copy of a
/// value is a different object and is not owned by the original's handles.
pub struct SelfRef<T: ?Sized> {
    weak: UnsafeCell<Weak<T>>,
}

impl<T: ?Sized> SelfRef<T> {
    pub const fn new() -> Self {
        SelfRef {
            weak: UnsafeCell::new(Weak::empty()),
        }
    }

    fn weak(&self) -> &Weak<T> {
        // SAFETY: the slot is only written by `bind`, which never overlaps a read.
        unsafe { &*self.weak.get() }
    }

    /// Returns `true` once the owning value has been wrapped and is still alive.
    pub fn is_bound(&self) -> bool {
        !Weak::expired(self.weak())
    }

    /// # Safety
    ///
    /// No reference returned by `weak` may be alive.
    unsafe fn bind(&self, weak: Weak<T>) {
        *self.weak.get() = weak;
    }
}

impl<T: ?Sized> Default for SelfRef<T> {
    fn default() -> Self {
        SelfRef::new()
    }
}

impl<T: ?Sized> Clone for SelfRef<T> {
    fn clone(&self) -> Self {
        SelfRef::new()
    }
}

impl<T: ?Sized> Debug for SelfRef<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SelfRef")
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Capability of a value that knows about the handles owning it.
///
/// The slot is only filled by [`Shared::new_aware`] and [`Shared::from_box_aware`]. Wrapping a
/// `SelfAware` value with plain [`Shared::new`] or [`Shared::from_box`] leaves it unbound, and
/// [`SelfAware::shared_from_self`] then fails with [`BadWeakRef`]:
/// ```
/// use rcblock::{SelfAware, SelfRef, Shared};
///
/// struct Node {
///     this: SelfRef<Node>,
/// }
///
/// impl SelfAware for Node {
///     fn self_ref(&self) -> &SelfRef<Self> {
///         &self.this
///     }
/// }
///
/// let plain = Shared::new(Node { this: SelfRef::new() });
/// assert!(plain.shared_from_self().is_err());
///
/// let aware = Shared::new_aware(Node { this: SelfRef::new() });
/// assert!(aware.shared_from_self().is_ok());
/// ```
pub trait SelfAware {
    /// The slot embedded in the value.
    fn self_ref(&self) -> &SelfRef<Self>;

    /// Returns a new strong handle to `self`, incrementing the use count.
    /// Fails with [`BadWeakRef`] if `self` is not owned by a [`Shared`] created with
    /// [`Shared::new_aware`] or [`Shared::from_box_aware`].
    fn shared_from_self(&self) -> Result<Shared<Self>, BadWeakRef> {
        Shared::from_weak(self.self_ref().weak())
    }

    /// Returns a new weak handle to `self`, or an empty one if `self` is not owned by a
    /// [`Shared`].
    fn weak_from_self(&self) -> Weak<Self> {
        let weak = self.self_ref().weak();
        if Weak::expired(weak) {
            Weak::empty()
        } else {
            weak.clone()
        }
    }
}

impl<T: SelfAware> Shared<T> {
    /// Like [`Shared::new`], and fills the value's [`SelfRef`] slot.
    pub fn new_aware(value: T) -> Self {
        let this = Shared::new(value);
        bind_self(&this);
        this
    }
}

impl<T: ?Sized + SelfAware> Shared<T> {
    /// Like [`Shared::from_box`], and fills the value's [`SelfRef`] slot.
    pub fn from_box_aware(value: Box<T>) -> Self {
        let this = Shared::from_box(value);
        bind_self(&this);
        this
    }
}

/// Points the slot of a freshly wrapped value at its control block. The weak reference stored
/// there counts towards the block's weak count and is released when the value is dropped.
fn bind_self<T: ?Sized + SelfAware>(this: &Shared<T>) {
    let weak = Shared::downgrade(this);
    // SAFETY: the value was wrapped a moment ago, so nothing can be reading its slot.
    unsafe { SelfAware::self_ref(&**this).bind(weak) };
}
