//! Store/restore parameters command objects (CiA 301 objects 0x1010 and 0x1011)
//!
//! Actually writing and reading non-volatile storage is outside this crate's scope; an embedder
//! registers a pair of callbacks on [`StorageContext`] -- one to consume the serialized byte
//! stream produced by [`crate::persist::serialize`], one to hand back a previously-stored byte
//! slice -- and these two command objects drive them in response to the CiA 301 "save"/"load"
//! magic values.

use core::convert::Infallible;

use canopen_common::{
    constants::values::{LOAD_CMD, SAVE_CMD},
    objects::{ObjectCode, ObjectRawAccess, SubInfo},
    sdo::AbortCode,
    AtomicCell,
};

use crate::object_dict::ODEntry;

/// Callback invoked to consume the serialized object stream produced on a "save" command
pub type StoreObjectsCallback = dyn Fn(&mut dyn embedded_io::Read<Error = Infallible>, usize) + Sync;

/// Callback invoked to fetch the previously stored byte slice on a "load" command, or `None` if
/// nothing has been stored yet
pub type LoadObjectsCallback = dyn Fn() -> Option<&'static [u8]> + Sync;

/// Shared state backing both the store and restore command objects
#[allow(missing_debug_implementations)]
pub struct StorageContext {
    pub(crate) store_callback: AtomicCell<Option<&'static StoreObjectsCallback>>,
    pub(crate) load_callback: AtomicCell<Option<&'static LoadObjectsCallback>>,
}

impl Default for StorageContext {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageContext {
    pub const fn new() -> Self {
        Self {
            store_callback: AtomicCell::new(None),
            load_callback: AtomicCell::new(None),
        }
    }

    /// Register the save/load callbacks; called once during node assembly
    pub fn register(
        &self,
        store: Option<&'static StoreObjectsCallback>,
        load: Option<&'static LoadObjectsCallback>,
    ) {
        self.store_callback.store(store);
        self.load_callback.store(load);
    }
}

/// Object 0x1010: triggers serialization of the dictionary's persistable values via the
/// registered [`StoreObjectsCallback`]
#[allow(missing_debug_implementations)]
pub struct StorageCommandObject {
    od: &'static [ODEntry<'static>],
    storage_context: &'static StorageContext,
}

impl StorageCommandObject {
    pub const fn new(od: &'static [ODEntry<'static>], storage_context: &'static StorageContext) -> Self {
        Self { od, storage_context }
    }
}

impl ObjectRawAccess for StorageCommandObject {
    fn read(&self, sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        match sub {
            0 => {
                if offset != 0 || buf.is_empty() {
                    return Err(AbortCode::DataTypeMismatch);
                }
                buf[0] = 1;
                Ok(1)
            }
            1 => {
                // Bit 0: the node is capable of saving objects (a callback is registered)
                let mut value = 0u32;
                if self.storage_context.store_callback.load().is_some() {
                    value |= 1;
                }
                read_u32_at_offset(value, offset, buf)
            }
            _ => Err(AbortCode::NoSuchSubIndex),
        }
    }

    fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        match sub {
            0 => Err(AbortCode::ReadOnly),
            1 => {
                let value = read_command_u32(data)?;
                if value != SAVE_CMD {
                    return Err(AbortCode::IncompatibleParameter);
                }
                match self.storage_context.store_callback.load() {
                    Some(cb) => {
                        crate::persist::serialize(self.od, cb);
                        Ok(())
                    }
                    None => Err(AbortCode::ResourceNotAvailable),
                }
            }
            _ => Err(AbortCode::NoSuchSubIndex),
        }
    }

    fn object_code(&self) -> ObjectCode {
        ObjectCode::Record
    }

    fn sub_info(&self, sub: u8) -> Result<SubInfo, AbortCode> {
        match sub {
            0 => Ok(SubInfo::MAX_SUB_NUMBER),
            1 => Ok(SubInfo::new_u32().rw_access()),
            _ => Err(AbortCode::NoSuchSubIndex),
        }
    }
}

/// Object 0x1011: triggers restoring the dictionary's persisted values via the registered
/// [`LoadObjectsCallback`]
#[allow(missing_debug_implementations)]
pub struct RestoreCommandObject {
    od: &'static [ODEntry<'static>],
    storage_context: &'static StorageContext,
}

impl RestoreCommandObject {
    pub const fn new(od: &'static [ODEntry<'static>], storage_context: &'static StorageContext) -> Self {
        Self { od, storage_context }
    }
}

impl ObjectRawAccess for RestoreCommandObject {
    fn read(&self, sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        match sub {
            0 => {
                if offset != 0 || buf.is_empty() {
                    return Err(AbortCode::DataTypeMismatch);
                }
                buf[0] = 1;
                Ok(1)
            }
            1 => {
                let mut value = 0u32;
                if self.storage_context.load_callback.load().is_some() {
                    value |= 1;
                }
                read_u32_at_offset(value, offset, buf)
            }
            _ => Err(AbortCode::NoSuchSubIndex),
        }
    }

    fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        match sub {
            0 => Err(AbortCode::ReadOnly),
            1 => {
                let value = read_command_u32(data)?;
                if value != LOAD_CMD {
                    return Err(AbortCode::IncompatibleParameter);
                }
                match self.storage_context.load_callback.load() {
                    Some(cb) => match cb() {
                        Some(stored) => {
                            crate::persist::restore_stored_objects(self.od, stored);
                            Ok(())
                        }
                        None => Err(AbortCode::ResourceNotAvailable),
                    },
                    None => Err(AbortCode::ResourceNotAvailable),
                }
            }
            _ => Err(AbortCode::NoSuchSubIndex),
        }
    }

    fn object_code(&self) -> ObjectCode {
        ObjectCode::Record
    }

    fn sub_info(&self, sub: u8) -> Result<SubInfo, AbortCode> {
        match sub {
            0 => Ok(SubInfo::MAX_SUB_NUMBER),
            1 => Ok(SubInfo::new_u32().rw_access()),
            _ => Err(AbortCode::NoSuchSubIndex),
        }
    }
}

fn read_u32_at_offset(value: u32, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
    let bytes = value.to_le_bytes();
    if offset >= bytes.len() {
        return Ok(0);
    }
    let read_len = buf.len().min(bytes.len() - offset);
    buf[..read_len].copy_from_slice(&bytes[offset..offset + read_len]);
    Ok(read_len)
}

fn read_command_u32(data: &[u8]) -> Result<u32, AbortCode> {
    if data.len() != 4 {
        return Err(AbortCode::DataTypeMismatch);
    }
    Ok(u32::from_le_bytes(data.try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    static STORAGE_CTX: StorageContext = StorageContext::new();
    static OD: [ODEntry; 0] = [];

    #[test]
    fn save_without_callback_is_unavailable() {
        let obj = StorageCommandObject::new(&OD, &STORAGE_CTX);
        let err = obj.write(1, &SAVE_CMD.to_le_bytes()).unwrap_err();
        assert_eq!(err, AbortCode::ResourceNotAvailable);
    }

    #[test]
    fn save_rejects_wrong_magic() {
        let obj = StorageCommandObject::new(&OD, &STORAGE_CTX);
        let err = obj.write(1, &0u32.to_le_bytes()).unwrap_err();
        assert_eq!(err, AbortCode::IncompatibleParameter);
    }

    #[test]
    fn load_without_callback_is_unavailable() {
        let obj = RestoreCommandObject::new(&OD, &STORAGE_CTX);
        let err = obj.write(1, &LOAD_CMD.to_le_bytes()).unwrap_err();
        assert_eq!(err, AbortCode::ResourceNotAvailable);
    }
}
