use crate::util::{Address, ObjectReference};
use crate::vm::VMBinding;
use enum_map::Enum;

/// The strength of a reference object. Reference objects hold one referent slot that the
/// collector treats specially.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Enum)]
pub enum ReferenceKind {
    /// Cleared when the referent is only softly reachable and the collection is a full-heap
    /// one. Strong during minor collections.
    Soft,
    /// Cleared as soon as the referent is only weakly reachable.
    Weak,
    /// Cleared when the referent is unreachable after finalization.
    Phantom,
}

/// The object model tells gengc about the layout of objects.
///
/// gengc owns the first two header words of every object (see [`crate::util::header`]): the
/// vtable word, written by gengc at allocation with the type handle passed to
/// [`crate::memory_manager::gc_alloc`], and the object-info word. Everything after the header is
/// described by the runtime through these methods.
pub trait ObjectModel<VM: VMBinding> {
    /// Return the size of the object in bytes, including the two header words. The size must
    /// be the same as the size requested when the object was allocated.
    fn get_current_size(object: ObjectReference) -> usize;

    /// Report the address of every reference slot of the object to `slot_visitor`. A slot holds
    /// a full-width object reference or zero. For reference objects, the referent slot must be
    /// reported too; gengc decides whether to trace it.
    fn scan_object<F: FnMut(Address)>(object: ObjectReference, slot_visitor: &mut F);

    /// Whether the object is a reference object, and of what strength.
    fn reference_kind(_object: ObjectReference) -> Option<ReferenceKind> {
        None
    }

    /// The referent slot of a reference object. Only called on objects for which
    /// [`ObjectModel::reference_kind`] returns `Some`.
    fn referent_slot(object: ObjectReference) -> Address {
        unimplemented!("reference object {} without a referent slot", object)
    }

    /// Whether objects of this type need to be finalized before their memory is reused.
    fn has_finalizer(_object: ObjectReference) -> bool {
        false
    }
}
