//! gengc uses the [`VMBinding`] trait to talk to a language runtime. A runtime implements the
//! three sub-traits and names them in its `VMBinding` implementation:
//!
//! * [`ObjectModel`]: object sizes, reference slots, reference types and finalizers.
//! * [`Scanning`]: root enumeration.
//! * [`Collection`]: thread suspension and fatal error reporting.

mod collection;
mod object_model;
mod scanning;
mod slot;

pub use self::collection::AllocationError;
pub use self::collection::Collection;
pub use self::object_model::ObjectModel;
pub use self::object_model::ReferenceKind;
pub use self::scanning::RootSetBuilder;
pub use self::scanning::Scanning;
pub use self::slot::Slot;

/// Default alignment of objects.
pub const DEFAULT_OBJECT_ALIGNMENT: usize = crate::util::constants::MIN_OBJECT_ALIGNMENT;

/// The `VMBinding` trait associates the runtime's implementations of the binding traits.
pub trait VMBinding
where
    Self: Sized + 'static + Send + Sync + Default,
{
    /// The binding's implementation of [`crate::vm::ObjectModel`].
    type VMObjectModel: ObjectModel<Self>;
    /// The binding's implementation of [`crate::vm::Scanning`].
    type VMScanning: Scanning<Self>;
    /// The binding's implementation of [`crate::vm::Collection`].
    type VMCollection: Collection<Self>;
}

#[cfg(test)]
mod tests;
