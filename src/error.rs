use thiserror::Error;

/// Returned when a [`Shared`](crate::Shared) is requested from a weak reference
/// whose value has already been dropped, or that never referred to a value.
///
/// This is the only error the crate produces. Non-failing alternatives exist
/// where a caller wants to test rather than assert: [`Weak::lock`](crate::Weak::lock)
/// and [`SelfAware::weak_from_self`](crate::SelfAware::weak_from_self).
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("bad weak reference: the referenced value is no longer alive")]
pub struct BadWeakRef(pub(crate) ());
