//! Record-like values.
//!
//! Rust has no runtime reflection, so record-like host values opt into
//! encoding by providing a snapshot of their readable state through the
//! [`Reflect`] trait.  The `#[derive(Pickle)]` macro implements it from
//! field attributes; hand-written implementations are equally valid and
//! can fail field access with [`Error::field_read`](crate::Error::field_read).

use std::any::Any;
use std::borrow::Cow;

use crate::error::Result;
use crate::value::Value;

/// Which members of a record are part of its encoded form.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FieldStrategy {
    /// Only members explicitly annotated as contract members.
    Contract,
    /// Every declared field that is not marked as skipped.
    Serializable,
    /// The readable public fields.
    PublicProperties,
}

/// A record-like host value: a class tag plus named state.
///
/// The encoder turns an implementor into a dict of its fields, keyed by
/// name, with a `__class__` entry carrying the class tag.
pub trait Reflect: 'static {
    /// Class tag emitted under the `__class__` key.  `None` marks a
    /// synthetic/anonymous record, whose dict carries no class tag.
    fn class_name(&self) -> Option<Cow<'static, str>>;

    /// The member-selection strategy the snapshot was built with.
    fn strategy(&self) -> FieldStrategy {
        FieldStrategy::PublicProperties
    }

    /// Snapshot of the readable state, in declaration order.
    fn fields(&self) -> Result<Vec<(Cow<'static, str>, Value)>>;

    /// Identity hook for the custom-pickler registry.
    fn as_any(&self) -> &dyn Any;
}
