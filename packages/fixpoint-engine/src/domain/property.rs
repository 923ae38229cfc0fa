//! Dynamically-typed property values
//!
//! Every analysis brings its own lattice element type (an immutability
//! level, a receiver type set, a string-value abstraction). The store must
//! hold all of them side by side, so a `Property` is a cheaply clonable
//! handle over an analysis-owned value with dynamic equality and typed
//! downcasting. Ordering between values is never defined here; it belongs
//! to the kind's [`Lattice`](crate::domain::kind::Lattice).

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Object-safe view of an analysis-owned lattice value
///
/// Blanket-implemented for every `Any + Debug + Send + Sync + PartialEq`
/// type; analyses never implement this by hand.
pub trait PropertyValue: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Dynamic equality across type-erased values
    fn dyn_eq(&self, other: &dyn PropertyValue) -> bool;
}

impl<T> PropertyValue for T
where
    T: Any + fmt::Debug + Send + Sync + PartialEq,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn PropertyValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |o| o == self)
    }
}

/// One concrete lattice element, attached to an entity by the store
#[derive(Clone)]
pub struct Property {
    value: Arc<dyn PropertyValue>,
}

impl Property {
    /// Wrap an analysis value
    pub fn new<T: PropertyValue>(value: T) -> Self {
        Self {
            value: Arc::new(value),
        }
    }

    /// Downcast to the concrete analysis type
    pub fn downcast_ref<T: PropertyValue>(&self) -> Option<&T> {
        self.value.as_any().downcast_ref::<T>()
    }

    /// Whether the wrapped value has type `T`
    pub fn is<T: PropertyValue>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.value.dyn_eq(other.value.as_ref())
    }
}

impl Eq for Property {}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}
