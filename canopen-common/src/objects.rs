//! The object vtable and dictionary entry types shared between the node core and its collaborators
//!
//! Every dictionary entry is bound to a small set of operations -- `size`, `init`, `read`,
//! `write`, `reset` -- through the [`ObjectRawAccess`] trait. This plays the role the spec calls
//! the "type vtable": a closed, exhaustively-matched capability rather than a struct of raw
//! function pointers, so a missing implementation is a compile error instead of a null check.
//!
//! Storage is a two-variant split, mirroring the direct/referenced distinction in the key flags:
//!
//! - [`ObjectData::Storage`]: a `&dyn ObjectRawAccess` backed by statically allocated storage
//!   (scalar fields, byte fields, composite records such as PDO mapping or heartbeat consumer
//!   entries).
//! - [`ObjectData::Callback`]: a [`CallbackObject`], a placeholder that an embedder or a later
//!   init step registers function pointers and a context into. Used for objects whose storage is
//!   genuinely owned by application code.

use core::any::Any;

use crate::atomic_cell::AtomicCell;
use crate::sdo::AbortCode;

/// CANopen object codes (CiA 301 table 1), identifying the shape of an object (not its element type)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectCode {
    /// Unused/placeholder
    Null = 0,
    /// A block of opaque application data, accessed by offset
    Domain = 2,
    /// A single value
    #[default]
    Var = 7,
    /// A homogeneous array; sub 0 is the element count
    Array = 8,
    /// A heterogeneous record; sub 0 is the highest implemented subindex
    Record = 9,
}

impl TryFrom<u8> for ObjectCode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ObjectCode::Null),
            2 => Ok(ObjectCode::Domain),
            7 => Ok(ObjectCode::Var),
            8 => Ok(ObjectCode::Array),
            9 => Ok(ObjectCode::Record),
            _ => Err(()),
        }
    }
}

/// Access permissions for a sub object
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AccessType {
    /// Read-only
    #[default]
    Ro,
    /// Write-only
    Wo,
    /// Read-write
    Rw,
    /// Read-only and never internally modified
    Const,
}

impl AccessType {
    /// True if reads are permitted
    pub fn is_readable(self) -> bool {
        matches!(self, AccessType::Ro | AccessType::Rw | AccessType::Const)
    }

    /// True if writes are permitted
    pub fn is_writable(self) -> bool {
        matches!(self, AccessType::Wo | AccessType::Rw)
    }
}

/// Whether, and in which direction, a sub object may be mapped into a PDO
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PdoMapping {
    /// Not PDO mappable
    #[default]
    None,
    /// Mappable into a TPDO (read side)
    Tpdo,
    /// Mappable into an RPDO (write side)
    Rpdo,
    /// Mappable into either
    Both,
}

/// The element data type of a sub object, per CiA 301 table 44
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u16)]
pub enum DataType {
    /// Single bit boolean, stored as a byte
    Boolean = 1,
    /// Signed 8-bit
    #[default]
    Int8 = 2,
    /// Signed 16-bit
    Int16 = 3,
    /// Signed 32-bit
    Int32 = 4,
    /// Signed 48-bit, referenced storage only
    Int48 = 0x14,
    /// Signed 64-bit
    Int64 = 0x15,
    /// Unsigned 8-bit
    UInt8 = 5,
    /// Unsigned 16-bit
    UInt16 = 6,
    /// Unsigned 32-bit
    UInt32 = 7,
    /// Unsigned 64-bit
    UInt64 = 0x1b,
    /// Printable text
    VisibleString = 9,
    /// Opaque byte string
    OctetString = 0xa,
    /// Opaque block, offset-addressed
    Domain = 0xf,
}

impl DataType {
    /// True if this is one of the string-like types with a null-terminated current length
    pub fn is_str(self) -> bool {
        matches!(self, DataType::VisibleString | DataType::OctetString)
    }
}

/// Static metadata describing a single sub object
#[derive(Clone, Copy, Debug)]
pub struct SubInfo {
    /// Declared (maximum) size in bytes
    pub size: usize,
    /// The element type
    pub data_type: DataType,
    /// Permitted accesses
    pub access_type: AccessType,
    /// PDO mappability
    pub pdo_mapping: PdoMapping,
    /// Whether this value should be written to non-volatile storage on a "save" command
    pub persist: bool,
}

impl SubInfo {
    /// The canonical sub 0 entry for an ARRAY or RECORD object: a const u8 element/highest-sub count
    pub const MAX_SUB_NUMBER: SubInfo = SubInfo {
        size: 1,
        data_type: DataType::UInt8,
        access_type: AccessType::Const,
        pdo_mapping: PdoMapping::None,
        persist: false,
    };

    /// Builder for a plain read-only u8
    pub const fn new_u8() -> Self {
        SubInfo {
            size: 1,
            data_type: DataType::UInt8,
            access_type: AccessType::Ro,
            pdo_mapping: PdoMapping::None,
            persist: false,
        }
    }

    /// Builder for a plain read-only u16
    pub const fn new_u16() -> Self {
        SubInfo {
            size: 2,
            data_type: DataType::UInt16,
            access_type: AccessType::Ro,
            pdo_mapping: PdoMapping::None,
            persist: false,
        }
    }

    /// Builder for a plain read-only u32
    pub const fn new_u32() -> Self {
        SubInfo {
            size: 4,
            data_type: DataType::UInt32,
            access_type: AccessType::Ro,
            pdo_mapping: PdoMapping::None,
            persist: false,
        }
    }

    /// Return a copy with read-write access
    pub const fn rw_access(mut self) -> Self {
        self.access_type = AccessType::Rw;
        self
    }

    /// Return a copy with write-only access
    pub const fn wo_access(mut self) -> Self {
        self.access_type = AccessType::Wo;
        self
    }

    /// Return a copy with the persist flag set as given
    pub const fn persist(mut self, value: bool) -> Self {
        self.persist = value;
        self
    }

    /// Return a copy marked PDO mappable in the given direction
    pub const fn mappable(mut self, mapping: PdoMapping) -> Self {
        self.pdo_mapping = mapping;
        self
    }
}

/// The per-entry vtable: size/init/read/write/reset dispatch for one dictionary object
///
/// `sub_info` stands in for the "size" operation (it reports width along with the rest of an
/// entry's static metadata); `init` and `reset` default to no-ops so that most scalar types need
/// not implement them at all.
pub trait ObjectRawAccess: Sync + Send {
    /// Read up to `buf.len()` bytes starting at `offset` into `buf`, returning the number written
    fn read(&self, sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode>;

    /// Overwrite the sub object with `data`
    fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode>;

    /// Static metadata for a sub object
    fn sub_info(&self, sub: u8) -> Result<SubInfo, AbortCode>;

    /// The object code (VAR/ARRAY/RECORD/DOMAIN) of this entry
    fn object_code(&self) -> ObjectCode {
        ObjectCode::Var
    }

    /// Called once during dictionary `init`, before any read/write is serviced. Used by types such
    /// as heartbeat consumers and the SYNC producer cache to register themselves.
    fn init(&self) -> Result<(), AbortCode> {
        Ok(())
    }

    /// Restore this entry to its factory default (CiA 301 "restore parameters")
    fn reset(&self) -> Result<(), AbortCode> {
        Ok(())
    }

    /// The declared (maximum) size of a sub object, in bytes
    fn size(&self, sub: u8) -> Result<usize, AbortCode> {
        Ok(self.sub_info(sub)?.size)
    }

    /// The size of the value currently stored, which for string types may be less than `size`
    fn current_size(&self, sub: u8) -> Result<usize, AbortCode> {
        const CHUNK: usize = 8;
        let info = self.sub_info(sub)?;
        if !info.data_type.is_str() {
            return Ok(info.size);
        }
        let mut buf = [0u8; CHUNK];
        let mut offset = 0;
        while offset < info.size {
            let n = CHUNK.min(info.size - offset);
            self.read(sub, offset, &mut buf[..n])?;
            if let Some(zero) = buf[..n].iter().position(|b| *b == 0) {
                return Ok(offset + zero);
            }
            offset += n;
        }
        Ok(info.size)
    }

    /// Set the TPDO event flag for `sub` (no-op for types that don't track one)
    fn set_event_flag(&self, _sub: u8) {}

    /// Read the TPDO event flag for `sub`
    fn read_event_flag(&self, _sub: u8) -> bool {
        false
    }

    /// Clear all event flags on this entry
    fn clear_events(&self) {}
}

/// Function signature for a registered callback object's read hook
pub type ReadHookFn =
    fn(ctx: Option<&'static dyn Context>, sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode>;
/// Function signature for a registered callback object's write hook
pub type WriteHookFn = fn(ctx: Option<&'static dyn Context>, sub: u8, data: &[u8]) -> Result<(), AbortCode>;
/// Function signature for a registered callback object's sub-info hook
pub type InfoHookFn = fn(ctx: Option<&'static dyn Context>, sub: u8) -> Result<SubInfo, AbortCode>;

/// Opaque context handed back to a registered callback hook
pub trait Context: Any + Sync + Send + 'static {
    /// Downcast back to the concrete context type
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Sync + Send + 'static> Context for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A late-bound object whose storage and behavior are supplied at runtime by `register`
///
/// Used for the handful of objects (PDO communication/mapping, storage command, heartbeat
/// consumer array) whose implementation needs a `'static` handle to node-scoped state that does
/// not exist until the node is being assembled.
pub struct CallbackObject {
    read_cb: AtomicCell<Option<ReadHookFn>>,
    write_cb: AtomicCell<Option<WriteHookFn>>,
    info_cb: AtomicCell<Option<InfoHookFn>>,
    context: AtomicCell<Option<&'static dyn Context>>,
    object_code: ObjectCode,
}

impl CallbackObject {
    /// Create an unregistered callback object of the given object code
    pub const fn new(object_code: ObjectCode) -> Self {
        Self {
            read_cb: AtomicCell::new(None),
            write_cb: AtomicCell::new(None),
            info_cb: AtomicCell::new(None),
            context: AtomicCell::new(None),
            object_code,
        }
    }

    /// Register the hooks and context backing this object
    pub fn register(
        &self,
        read: Option<ReadHookFn>,
        write: Option<WriteHookFn>,
        info: Option<InfoHookFn>,
        context: Option<&'static dyn Context>,
    ) {
        self.read_cb.store(read);
        self.write_cb.store(write);
        self.info_cb.store(info);
        self.context.store(context);
    }
}

impl ObjectRawAccess for CallbackObject {
    fn read(&self, sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        match self.read_cb.load() {
            Some(cb) => cb(self.context.load(), sub, offset, buf),
            None => Err(AbortCode::ResourceNotAvailable),
        }
    }

    fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        match self.write_cb.load() {
            Some(cb) => cb(self.context.load(), sub, data),
            None => Err(AbortCode::ResourceNotAvailable),
        }
    }

    fn sub_info(&self, sub: u8) -> Result<SubInfo, AbortCode> {
        match self.info_cb.load() {
            Some(cb) => cb(self.context.load(), sub),
            None => Err(AbortCode::ResourceNotAvailable),
        }
    }

    fn object_code(&self) -> ObjectCode {
        self.object_code
    }
}

/// The storage variant of a dictionary entry: statically allocated, or callback-registered
pub enum ObjectData<'a> {
    /// Backed by statically allocated storage implementing [`ObjectRawAccess`] directly
    Storage(&'a dyn ObjectRawAccess),
    /// A placeholder whose behavior is registered at runtime
    Callback(&'a CallbackObject),
}

impl ObjectRawAccess for ObjectData<'_> {
    fn read(&self, sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        match self {
            ObjectData::Storage(o) => o.read(sub, offset, buf),
            ObjectData::Callback(o) => o.read(sub, offset, buf),
        }
    }

    fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        match self {
            ObjectData::Storage(o) => o.write(sub, data),
            ObjectData::Callback(o) => o.write(sub, data),
        }
    }

    fn sub_info(&self, sub: u8) -> Result<SubInfo, AbortCode> {
        match self {
            ObjectData::Storage(o) => o.sub_info(sub),
            ObjectData::Callback(o) => o.sub_info(sub),
        }
    }

    fn object_code(&self) -> ObjectCode {
        match self {
            ObjectData::Storage(o) => o.object_code(),
            ObjectData::Callback(o) => o.object_code(),
        }
    }

    fn init(&self) -> Result<(), AbortCode> {
        match self {
            ObjectData::Storage(o) => o.init(),
            ObjectData::Callback(_) => Ok(()),
        }
    }

    fn reset(&self) -> Result<(), AbortCode> {
        match self {
            ObjectData::Storage(o) => o.reset(),
            ObjectData::Callback(_) => Ok(()),
        }
    }

    fn set_event_flag(&self, sub: u8) {
        if let ObjectData::Storage(o) = self {
            o.set_event_flag(sub)
        }
    }

    fn read_event_flag(&self, sub: u8) -> bool {
        match self {
            ObjectData::Storage(o) => o.read_event_flag(sub),
            ObjectData::Callback(_) => false,
        }
    }

    fn clear_events(&self) {
        if let ObjectData::Storage(o) = self {
            o.clear_events()
        }
    }
}

/// One entry in the dictionary's sorted array
pub struct ODEntry<'a> {
    /// The object index (high 16 bits of the entry's key)
    pub index: u16,
    /// The backing storage or callback
    pub data: ObjectData<'a>,
}

// Safety: ODEntry is only ever placed in a `&'static [ODEntry]` built from `Sync` storage.
unsafe impl Sync for ODEntry<'_> {}

/// Binary search the (index-sorted) dictionary for the entry at `index`
///
/// Per invariant D1 the table must be sorted strictly ascending by index with no duplicates; this
/// uses `slice::binary_search_by_key` rather than a linear scan.
pub fn find_object<'a, 'b>(table: &'b [ODEntry<'a>], index: u16) -> Option<&'b ObjectData<'a>> {
    table.binary_search_by_key(&index, |e| e.index).ok().map(|i| &table[i].data)
}

/// Like [`find_object`] but returns the whole entry (needed by PDO mapping validation, which wants
/// the entry's index back out)
pub fn find_object_entry<'a, 'b>(table: &'b [ODEntry<'a>], index: u16) -> Option<&'b ODEntry<'a>> {
    table.binary_search_by_key(&index, |e| e.index).ok().map(|i| &table[i])
}
