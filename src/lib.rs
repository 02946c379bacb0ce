//! Ownership primitives for heap allocated values, without atomics.
//!
//! [`Shared<T>`] provides shared ownership of a value through a control block that holds a strong and
//! a weak reference count. The block is type-erased: a value moved in with [`Shared::new`] lives inside
//! the block itself (one allocation), while a value passed as a `Box` with [`Shared::from_box`] keeps
//! its own allocation. Either way the handles look the same.
//!
//! A cycle between `Shared` pointers cannot be deallocated as the strong counts never reach zero. The
//! solution is a [`Weak<T>`]: a non-owning reference that only keeps the control block alive and must be
//! turned back into a `Shared<T>` before the value can be used. Teardown is split in two so this works:
//! the value is dropped when the last `Shared<T>` goes away, the control block once the last `Weak<T>`
//! does too.
//!
//! A value that implements [`SelfAware`] can hand out handles to itself once it is owned by a `Shared`.
//!
//! [`Intrusive<T>`] is the simpler alternative for values that carry their own [`RefCount`]: no control
//! block, no weak references, and any raw pointer to such a value can be turned back into a handle.
//!
//! [`Unique<T>`] is single ownership with a custom [`Deleter`].
//!
//! None of these types synchronise their counts. They are not [`Send`] or [`Sync`] (except `Unique`),
//! and sharing them across threads needs external synchronisation and a different pointer type.

mod block;

pub mod aware;
pub mod error;
pub mod intrusive;
pub mod pair;
pub mod shared;
pub mod unique;

pub use crate::aware::{SelfAware, SelfRef};
pub use crate::error::BadWeakRef;
pub use crate::intrusive::{Destroy, DropBox, Intrusive, RefCount, RefCounted};
pub use crate::pair::CompressedPair;
pub use crate::shared::{Shared, Weak};
pub use crate::unique::{DefaultDelete, Deleter, FnDeleter, Unique};
