//! Serialization of persisted object values (CiA 301 "store/restore parameters", objects 0x1010
//! and 0x1011) to and from a flat byte stream handed to the embedder's non-volatile storage
//!
//! Reading each persistable sub object's current value through [`embedded_io::Read`] rather than
//! building a buffer up front keeps this `no_std`-friendly for large dictionaries: the caller
//! drives how many bytes are read at a time, and values are streamed out of the dictionary as they
//! are requested. The streaming is driven by polling a hand-written generator future once per byte
//! requested -- there's no executor available in this context, so the future is polled directly.

use core::{
    cell::RefCell,
    convert::Infallible,
    future::Future,
    pin::{pin, Pin},
    task::Context,
};

use canopen_common::objects::{find_object, ODEntry, ObjectCode, ObjectRawAccess};
use futures::{pending, task::noop_waker_ref};

use defmt_or_log::{debug, warn};

/// Specifies the types of nodes which can be serialized to persistent storage
#[derive(Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
pub enum NodeType {
    /// A node containing a saved sub-object value
    ObjectValue = 1,
    /// An unrecognized node type
    Unknown,
}

impl NodeType {
    /// Create a `NodeType` from an ID byte
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => Self::ObjectValue,
            _ => Self::Unknown,
        }
    }
}

/// Top-level node configuration which is persisted outside the object dictionary stream (baud
/// rate and node-id come from LSS/hardware straps, not the object dictionary)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeConfig {
    /// The configured node ID
    pub node_id: u8,
    /// The configured baud table
    pub baud_table: u8,
    /// The index into the baud table of the configured baud rate
    pub baud_index: u8,
}

/// The highest sub index implemented by an entry, for iterating its persistable subs
///
/// ARRAY and RECORD objects report this at sub 0 (CiA 301); a VAR object has only sub 0.
fn max_sub_number(entry: &ODEntry) -> u8 {
    if entry.data.object_code() == ObjectCode::Var {
        return 0;
    }
    let mut buf = [0u8; 1];
    entry.data.read(0, 0, &mut buf).map(|_| buf[0]).unwrap_or(0)
}

async fn write_bytes(bytes: &[u8], reg: &RefCell<u8>) {
    for b in bytes {
        *reg.borrow_mut() = *b;
        pending!()
    }
}

async fn serialize_object(obj: &ODEntry<'_>, sub: u8, data_size: u16, reg: &RefCell<u8>) {
    // Serialized node size is the variable length object data, plus node type (u8), index (u16),
    // and sub index (u8)
    let node_size = data_size + 4;

    write_bytes(&node_size.to_le_bytes(), reg).await;
    write_bytes(&[NodeType::ObjectValue as u8], reg).await;
    write_bytes(&obj.index.to_le_bytes(), reg).await;
    write_bytes(&[sub], reg).await;

    const CHUNK_SIZE: usize = 32;
    let mut buf = [0u8; CHUNK_SIZE];
    let mut read_pos = 0;
    loop {
        // The returned read_len is not checked, on purpose. We already committed above to writing
        // a certain number of bytes, and we must write them. This is fine for fields which are
        // shorter than CHUNK_SIZE; larger fields risk a "torn read" if modified concurrently with
        // serialization, which would need an object locking mechanism to fix.
        obj.data.read(sub, read_pos, &mut buf).unwrap();
        let copy_len = (data_size as usize - read_pos).min(CHUNK_SIZE);
        write_bytes(&buf[0..copy_len], reg).await;
        read_pos += copy_len;
        if read_pos >= data_size as usize {
            break;
        }
    }
}

fn persistable_subs(objects: &[ODEntry<'static>]) -> impl Iterator<Item = (&ODEntry<'static>, u8, u16)> {
    objects.iter().flat_map(|obj| {
        let max_sub = max_sub_number(obj);
        (0..=max_sub).filter_map(move |sub| {
            let info = obj.data.sub_info(sub).ok()?;
            info.persist.then(|| (obj, sub, info.size as u16))
        })
    })
}

async fn serialize_sm(objects: &'static [ODEntry<'static>], reg: &RefCell<u8>) {
    for (obj, sub, data_size) in persistable_subs(objects) {
        serialize_object(obj, sub, data_size, reg).await;
    }
}

/// Total number of bytes [`serialize`] will produce for the given dictionary
pub fn serialized_size(objects: &[ODEntry]) -> usize {
    const OVERHEAD_SIZE: usize = 6;
    persistable_subs(objects)
        .map(|(_, _, size)| size as usize + OVERHEAD_SIZE)
        .sum()
}

struct PersistSerializer<'a, 'b, F: Future> {
    f: Pin<&'a mut F>,
    reg: &'b RefCell<u8>,
}

impl<'a, 'b, F: Future> PersistSerializer<'a, 'b, F> {
    pub fn new(f: Pin<&'a mut F>, reg: &'b RefCell<u8>) -> Self {
        Self { f, reg }
    }
}

impl<F: Future> embedded_io::ErrorType for PersistSerializer<'_, '_, F> {
    type Error = Infallible;
}

impl<F: Future> embedded_io::Read for PersistSerializer<'_, '_, F> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        let mut cx = Context::from_waker(noop_waker_ref());

        let mut pos = 0;
        loop {
            if pos >= buf.len() {
                return Ok(pos);
            }

            match self.f.as_mut().poll(&mut cx) {
                core::task::Poll::Ready(_) => return Ok(pos),
                core::task::Poll::Pending => {
                    buf[pos] = *self.reg.borrow();
                    pos += 1;
                }
            }
        }
    }
}

/// Serialize every persistable sub object's current value, handing the resulting byte stream and
/// its total length to `callback` (typically the embedder's NVM write routine)
pub fn serialize<F: Fn(&mut dyn embedded_io::Read<Error = Infallible>, usize)>(
    od: &'static [ODEntry<'static>],
    callback: F,
) {
    let reg = RefCell::new(0);
    let fut = pin!(serialize_sm(od, &reg));
    let mut serializer = PersistSerializer::new(fut, &reg);
    let size = serialized_size(od);
    callback(&mut serializer, size)
}

/// Error which can be returned while reading persisted data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistReadError {
    /// Not enough bytes were present to construct the node
    NodeLengthShort,
}

/// The data for an ObjectValue node
#[derive(Debug, PartialEq)]
pub struct ObjectValue<'a> {
    /// The object index this value belongs to
    pub index: u16,
    /// The sub-object index this value belongs to
    pub sub: u8,
    /// The raw bytes to be restored to the sub object
    pub data: &'a [u8],
}

/// A reference to a single node within a slice of serialized data
#[derive(Debug, PartialEq)]
pub enum PersistNodeRef<'a> {
    /// A saved value for a sub-object
    ObjectValue(ObjectValue<'a>),
    /// An unrecognized node type: either the data is malformed, or was written by a newer version
    /// of the firmware that supports more node types. The bytes are kept as-is, node type first.
    Unknown(&'a [u8]),
}

impl<'a> PersistNodeRef<'a> {
    /// Create a PersistNodeRef from a slice of bytes
    pub fn from_slice(data: &'a [u8]) -> Result<Self, PersistReadError> {
        if data.is_empty() {
            return Err(PersistReadError::NodeLengthShort);
        }

        match NodeType::from_byte(data[0]) {
            NodeType::ObjectValue => {
                if data.len() < 5 {
                    return Err(PersistReadError::NodeLengthShort);
                }
                Ok(Self::ObjectValue(ObjectValue {
                    index: u16::from_le_bytes(data[1..3].try_into().unwrap()),
                    sub: data[3],
                    data: &data[4..],
                }))
            }
            NodeType::Unknown => Ok(PersistNodeRef::Unknown(data)),
        }
    }
}

/// Iterates the nodes stored in a slice of data previously produced by [`serialize`]
struct PersistNodeReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PersistNodeReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { buf: data, pos: 0 }
    }
}

impl<'a> Iterator for PersistNodeReader<'a> {
    type Item = PersistNodeRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.len() - self.pos < 2 {
            return None;
        }
        let length = u16::from_le_bytes(self.buf[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        let node_slice = &self.buf[self.pos..self.pos + length as usize];
        self.pos += length as usize;

        PersistNodeRef::from_slice(node_slice).ok()
    }
}

/// Load values of objects previously persisted in serialized format
///
/// # Arguments
/// - `od`: The object dictionary where objects will be updated
/// - `stored_data`: A slice of bytes, as previously provided to the store_objects callback
pub fn restore_stored_objects(od: &[ODEntry], stored_data: &[u8]) {
    let reader = PersistNodeReader::new(stored_data);
    for item in reader {
        match item {
            PersistNodeRef::ObjectValue(restore) => {
                if let Some(obj) = find_object(od, restore.index) {
                    if obj.sub_info(restore.sub).is_ok() {
                        debug!(
                            "Restoring 0x{:x}sub{} with {:?}",
                            restore.index, restore.sub, restore.data
                        );
                        if let Err(abort_code) = obj.write(restore.sub, restore.data) {
                            warn!(
                                "Error restoring object 0x{:x}sub{}: {:x}",
                                restore.index, restore.sub, abort_code as u32
                            );
                        }
                    } else {
                        warn!(
                            "Saved object 0x{:x}sub{} not found in OD",
                            restore.index, restore.sub
                        );
                    }
                } else {
                    warn!("Saved object 0x{:x} not found in OD", restore.index);
                }
            }
            PersistNodeRef::Unknown(id) => warn!("Unknown persisted object read: {}", id[0]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_dict::{ConstField, NullTermByteField, ProvidesSubObjects, ScalarField, SubObjectAccess};
    use canopen_common::objects::{DataType, ObjectData, SubInfo};

    use crate::persist::serialize;

    extern crate std;
    use std::{boxed::Box, cell::RefCell as StdRefCell, vec::Vec};

    #[test]
    fn test_serialize_deserialize() {
        #[derive(Default)]
        struct Object100 {
            value1: ScalarField<u32>,
            value2: ScalarField<u16>,
        }

        impl ProvidesSubObjects for Object100 {
            fn get_sub_object(&self, sub: u8) -> Option<(SubInfo, &dyn SubObjectAccess)> {
                match sub {
                    0 => Some((
                        SubInfo::MAX_SUB_NUMBER,
                        const { &ConstField::new(2u8.to_le_bytes()) },
                    )),
                    1 => Some((
                        SubInfo { size: 4, data_type: DataType::UInt32, persist: true, ..SubInfo::new_u32() },
                        &self.value1,
                    )),
                    2 => Some((
                        SubInfo { size: 2, data_type: DataType::UInt16, persist: false, ..SubInfo::new_u16() },
                        &self.value2,
                    )),
                    _ => None,
                }
            }

            fn object_code(&self) -> ObjectCode {
                ObjectCode::Record
            }
        }

        #[derive(Default)]
        struct Object200 {
            string: NullTermByteField<15>,
        }

        impl ProvidesSubObjects for Object200 {
            fn get_sub_object(&self, sub: u8) -> Option<(SubInfo, &dyn SubObjectAccess)> {
                match sub {
                    0 => Some((
                        SubInfo {
                            size: self.string.len(),
                            data_type: DataType::VisibleString,
                            persist: true,
                            ..SubInfo::new_u8().rw_access()
                        },
                        &self.string,
                    )),
                    _ => None,
                }
            }

            fn object_code(&self) -> ObjectCode {
                ObjectCode::Var
            }
        }

        let inst100 = Box::leak(Box::new(Object100::default()));
        let inst200 = Box::leak(Box::new(Object200::default()));

        let od = Box::leak(Box::new([
            ODEntry { index: 0x100, data: ObjectData::Storage(inst100) },
            ODEntry { index: 0x200, data: ObjectData::Storage(inst200) },
        ]));
        inst100.value1.store(42);
        inst200.string.set_str("test".as_bytes()).unwrap();

        let data = StdRefCell::new(Vec::new());
        serialize(od, |reader, _size| {
            const CHUNK_SIZE: usize = 2;
            let mut buf = [0; CHUNK_SIZE];
            loop {
                let n = embedded_io::Read::read(reader, &mut buf).unwrap();
                data.borrow_mut().extend_from_slice(&buf[..n]);
                if n < buf.len() {
                    break;
                }
            }
        });

        let data = data.take();
        assert_eq!(20, data.len());
        assert_eq!(data.len(), serialized_size(od));

        let mut deser = PersistNodeReader::new(&data);
        assert_eq!(
            deser.next().unwrap(),
            PersistNodeRef::ObjectValue(ObjectValue { index: 0x100, sub: 1, data: &42u32.to_le_bytes() })
        );
        assert_eq!(
            deser.next().unwrap(),
            PersistNodeRef::ObjectValue(ObjectValue { index: 0x200, sub: 0, data: "test".as_bytes() })
        );
        assert_eq!(deser.next(), None);
    }
}
