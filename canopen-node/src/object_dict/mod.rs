//! Object dictionary building blocks for node-local object implementations
//!
//! An object in the dictionary implements [`canopen_common::objects::ObjectRawAccess`] directly,
//! or, for VAR/ARRAY/RECORD-shaped objects with heterogeneous sub-object storage, by implementing
//! the more ergonomic [`ProvidesSubObjects`] trait below and getting a blanket `ObjectRawAccess`
//! implementation for free. Individual sub objects are built from the small set of storage
//! primitives in [`sub_objects`] ([`ScalarField`], [`ByteField`], [`NullTermByteField`],
//! [`ConstField`], [`ConstByteRefField`], [`CallbackSubObject`]).
//!
//! Objects that need to be injected at runtime (rather than built statically into the dictionary
//! table) are represented in the table by [`canopen_common::objects::CallbackObject`], which a
//! [`ProvidesSubObjects`]-backed struct is registered into after construction.
//!
//! # Object flags for TPDO event triggering
//!
//! Objects that participate in async-triggered TPDOs track a set of per-sub-object event flags
//! ([`ObjectFlags`]), double-buffered via a shared [`ObjectFlagSync`] so the PDO engine can swap the
//! active buffer without racing the object's writer.

mod object_flags;
mod sub_objects;

pub use object_flags::*;
pub use sub_objects::*;

use canopen_common::objects::{ObjectCode, SubInfo};
use canopen_common::sdo::AbortCode;

/// A trait for structs which represent one VAR/ARRAY/RECORD object's set of sub objects
///
/// Implementing this for a struct gives it a blanket [`canopen_common::objects::ObjectRawAccess`]
/// implementation, dispatching each operation to the sub object named by the `sub` index.
pub trait ProvidesSubObjects: Sync + Send {
    /// Get a sub object's metadata and storage accessor, or `None` if `sub` is not implemented
    fn get_sub_object(&self, sub: u8) -> Option<(SubInfo, &dyn SubObjectAccess)>;

    /// The object flags for this object, if it supports TPDO event triggering
    fn flags(&self) -> Option<&dyn ObjectFlagAccess> {
        None
    }

    /// What kind of object this is (VAR, ARRAY or RECORD)
    fn object_code(&self) -> ObjectCode;
}

impl<T: ProvidesSubObjects> canopen_common::objects::ObjectRawAccess for T {
    fn read(&self, sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        let (info, access) = self.get_sub_object(sub).ok_or(AbortCode::NoSuchSubIndex)?;
        if !info.access_type.is_readable() {
            return Err(AbortCode::WriteOnly);
        }
        access.read(offset, buf)
    }

    fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        let (info, access) = self.get_sub_object(sub).ok_or(AbortCode::NoSuchSubIndex)?;
        if !info.access_type.is_writable() {
            return Err(AbortCode::ReadOnly);
        }
        access.write(data)
    }

    fn sub_info(&self, sub: u8) -> Result<SubInfo, AbortCode> {
        self.get_sub_object(sub)
            .map(|(info, _)| info)
            .ok_or(AbortCode::NoSuchSubIndex)
    }

    fn object_code(&self) -> ObjectCode {
        ProvidesSubObjects::object_code(self)
    }

    fn set_event_flag(&self, sub: u8) {
        if let Some(flags) = self.flags() {
            flags.set_flag(sub);
        }
    }

    fn read_event_flag(&self, sub: u8) -> bool {
        self.flags().is_some_and(|flags| flags.get_flag(sub))
    }

    fn clear_events(&self) {
        if let Some(flags) = self.flags() {
            flags.clear();
        }
    }
}
