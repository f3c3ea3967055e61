//! The object dictionary: the sorted table plus the primitive read/write flow that binds node-id
//! biasing, width checking and async-PDO triggering to a single (index, sub) lookup
//!
//! The table itself ([`canopen_common::objects::ODEntry`]) is a plain `&'static [ODEntry]`, built
//! and owned by the embedder; this module only adds the accessors layered on top of
//! `find`/`find_object` (binary search, invariant D1).

use canopen_common::error::CanopenError;
use canopen_common::key::{ObjectKey, Width};
use canopen_common::objects::{find_object, ODEntry, ObjectRawAccess};
use canopen_common::NodeId;

/// A hook invoked after a successful write to an async-trigger-flagged object, so the PDO engine
/// can fan the change out to every TPDO that maps it
pub trait AsyncTriggerHook {
    /// Called with the object index that was just written
    fn trigger_by_object(&self, index: u16);
}

/// A dictionary with no async-trigger hook installed; writes never fan out to PDOs
pub struct NullTrigger;
impl AsyncTriggerHook for NullTrigger {
    fn trigger_by_object(&self, _index: u16) {}
}

/// Read/write primitive accessors layered over the raw object table
pub struct Dictionary<'a> {
    table: &'a [ODEntry<'a>],
    node_id: NodeId,
}

impl<'a> Dictionary<'a> {
    /// Wrap a sorted, `init`ialized object table
    pub fn new(table: &'a [ODEntry<'a>], node_id: NodeId) -> Self {
        Self { table, node_id }
    }

    /// Update the node-id used for node-id-biased reads/writes (set once the node is configured)
    pub fn set_node_id(&mut self, node_id: NodeId) {
        self.node_id = node_id;
    }

    /// The raw table, for callers (PDO mapping validation, SDO server) that need direct access
    pub fn table(&self) -> &'a [ODEntry<'a>] {
        self.table
    }

    /// `find(dev)`: O(log n) binary search by (index, sub); invariant D1 requires the table sorted
    pub fn find(&self, index: u16) -> Option<&'a dyn ObjectRawAccess> {
        find_object(self.table, index).map(|d| d as &dyn ObjectRawAccess)
    }

    /// `init(root, max, node)`: call every entry's type `init`, allowing self-registration
    /// (heartbeat consumers, the SYNC cob-id cache) to happen before any read/write is serviced
    pub fn init(&self) -> Result<(), CanopenError> {
        for entry in self.table {
            entry.data.init().map_err(|_| CanopenError::TypeInit)?;
        }
        Ok(())
    }

    /// `reset()`: CiA 301 "restore default parameters", dispatched to every entry's type `reset`
    pub fn reset(&self) -> Result<(), CanopenError> {
        for entry in self.table {
            entry.data.reset().map_err(|_| CanopenError::TypeCtrl)?;
        }
        Ok(())
    }

    fn read_raw(&self, index: u16, sub: u8, buf: &mut [u8]) -> Result<usize, CanopenError> {
        let obj = self.find(index).ok_or(CanopenError::NotFound)?;
        obj.read(sub, 0, buf).map_err(|_| CanopenError::ObjRead)
    }

    /// Read a u8 primitive, validating the declared width is exactly 1 byte and applying node-id
    /// bias on read if the entry's key marks it biased
    pub fn read_u8(&self, key: ObjectKey) -> Result<u8, CanopenError> {
        if key.flags().width() != Width::Byte {
            return Err(CanopenError::ObjSize);
        }
        let mut buf = [0u8; 1];
        self.read_raw(key.index(), key.sub(), &mut buf)?;
        Ok(self.bias_read_u8(key, buf[0]))
    }

    /// Read a u16 primitive
    pub fn read_u16(&self, key: ObjectKey) -> Result<u16, CanopenError> {
        if key.flags().width() != Width::Word {
            return Err(CanopenError::ObjSize);
        }
        let mut buf = [0u8; 2];
        self.read_raw(key.index(), key.sub(), &mut buf)?;
        Ok(self.bias_read_u16(key, u16::from_le_bytes(buf)))
    }

    /// Read a u32 primitive
    pub fn read_u32(&self, key: ObjectKey) -> Result<u32, CanopenError> {
        if key.flags().width() != Width::Long {
            return Err(CanopenError::ObjSize);
        }
        let mut buf = [0u8; 4];
        self.read_raw(key.index(), key.sub(), &mut buf)?;
        Ok(self.bias_read_u32(key, u32::from_le_bytes(buf)))
    }

    /// Bulk read, used by SDO expedited transfers; does not apply node-id bias (callers operating
    /// on raw bytes are expected to already know the wire representation they want)
    pub fn read_buffer(&self, index: u16, sub: u8, dst: &mut [u8]) -> Result<usize, CanopenError> {
        self.read_raw(index, sub, dst)
    }

    fn write_raw(
        &self,
        trigger: &dyn AsyncTriggerHook,
        key: ObjectKey,
        data: &[u8],
    ) -> Result<(), CanopenError> {
        let obj = self.find(key.index()).ok_or(CanopenError::NotFound)?;
        obj.write(key.sub(), data).map_err(|_| CanopenError::ObjWrite)?;
        if key.flags().async_trigger() {
            obj.set_event_flag(key.sub());
            trigger.trigger_by_object(key.index());
        }
        Ok(())
    }

    /// Write a u8 primitive, subtracting node-id bias first if the key is biased
    pub fn write_u8(
        &self,
        trigger: &dyn AsyncTriggerHook,
        key: ObjectKey,
        value: u8,
    ) -> Result<(), CanopenError> {
        if key.flags().width() != Width::Byte {
            return Err(CanopenError::ObjSize);
        }
        let value = self.bias_write_u8(key, value);
        self.write_raw(trigger, key, &[value])
    }

    /// Write a u16 primitive
    pub fn write_u16(
        &self,
        trigger: &dyn AsyncTriggerHook,
        key: ObjectKey,
        value: u16,
    ) -> Result<(), CanopenError> {
        if key.flags().width() != Width::Word {
            return Err(CanopenError::ObjSize);
        }
        let value = self.bias_write_u16(key, value);
        self.write_raw(trigger, key, &value.to_le_bytes())
    }

    /// Write a u32 primitive
    pub fn write_u32(
        &self,
        trigger: &dyn AsyncTriggerHook,
        key: ObjectKey,
        value: u32,
    ) -> Result<(), CanopenError> {
        if key.flags().width() != Width::Long {
            return Err(CanopenError::ObjSize);
        }
        let value = self.bias_write_u32(key, value);
        self.write_raw(trigger, key, &value.to_le_bytes())
    }

    /// Bulk write, used by SDO expedited downloads
    pub fn write_buffer(
        &self,
        trigger: &dyn AsyncTriggerHook,
        index: u16,
        sub: u8,
        src: &[u8],
    ) -> Result<(), CanopenError> {
        let obj = self.find(index).ok_or(CanopenError::NotFound)?;
        obj.write(sub, src).map_err(|_| CanopenError::ObjWrite)?;
        obj.set_event_flag(sub);
        trigger.trigger_by_object(index);
        Ok(())
    }

    fn node_id_offset(&self) -> u32 {
        self.node_id.raw() as u32
    }

    fn bias_read_u8(&self, key: ObjectKey, v: u8) -> u8 {
        if key.flags().nodeid_biased() {
            v.wrapping_add(self.node_id_offset() as u8)
        } else {
            v
        }
    }

    fn bias_write_u8(&self, key: ObjectKey, v: u8) -> u8 {
        if key.flags().nodeid_biased() {
            v.wrapping_sub(self.node_id_offset() as u8)
        } else {
            v
        }
    }

    fn bias_read_u16(&self, key: ObjectKey, v: u16) -> u16 {
        if key.flags().nodeid_biased() {
            v.wrapping_add(self.node_id_offset() as u16)
        } else {
            v
        }
    }

    fn bias_write_u16(&self, key: ObjectKey, v: u16) -> u16 {
        if key.flags().nodeid_biased() {
            v.wrapping_sub(self.node_id_offset() as u16)
        } else {
            v
        }
    }

    fn bias_read_u32(&self, key: ObjectKey, v: u32) -> u32 {
        if key.flags().nodeid_biased() {
            v.wrapping_add(self.node_id_offset())
        } else {
            v
        }
    }

    fn bias_write_u32(&self, key: ObjectKey, v: u32) -> u32 {
        if key.flags().nodeid_biased() {
            v.wrapping_sub(self.node_id_offset())
        } else {
            v
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_dict::ScalarField;
    use canopen_common::key::Flags;
    use canopen_common::objects::{AccessType, DataType, ObjectCode, PdoMapping, SubInfo};
    use canopen_common::objects::ObjectData;

    fn rw_long_key(index: u16) -> ObjectKey {
        ObjectKey::new(index, 0, Flags::new(true, true, false, false, false, true, Width::Long))
    }

    struct TestVar(ScalarField<u32>);

    impl ObjectRawAccess for TestVar {
        fn read(&self, sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, canopen_common::sdo::AbortCode> {
            crate::object_dict::SubObjectAccess::read(&self.0, offset, buf)
        }
        fn write(&self, _sub: u8, data: &[u8]) -> Result<(), canopen_common::sdo::AbortCode> {
            crate::object_dict::SubObjectAccess::write(&self.0, data)
        }
        fn sub_info(&self, _sub: u8) -> Result<SubInfo, canopen_common::sdo::AbortCode> {
            Ok(SubInfo {
                size: 4,
                data_type: DataType::UInt32,
                access_type: AccessType::Rw,
                pdo_mapping: PdoMapping::None,
                persist: false,
            })
        }
        fn object_code(&self) -> ObjectCode {
            ObjectCode::Var
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let var = TestVar(ScalarField::new(0));
        let table = [ODEntry {
            index: 0x2000,
            data: ObjectData::Storage(&var),
        }];
        let dict = Dictionary::new(&table, NodeId::Unconfigured);
        let key = rw_long_key(0x2000);
        dict.write_u32(&NullTrigger, key, 0xdead_beef).unwrap();
        assert_eq!(dict.read_u32(key).unwrap(), 0xdead_beef);
    }

    #[test]
    fn find_missing_returns_not_found() {
        let table: [ODEntry; 0] = [];
        let dict = Dictionary::new(&table, NodeId::Unconfigured);
        assert!(dict.find(0x2000).is_none());
    }
}
