//! PDO configuration objects (communication/mapping parameter records) and PDO transmit/receive
//! state
//!
//! A [`Pdo`] tracks the runtime state of one TPDO or RPDO slot: its COB-ID, transmission type,
//! inhibit/event timing, and up to 8 mapped sub objects. The decision of *when* to actually put a
//! frame on the bus belongs to the node's process loop (it alone holds the timer wheel and the CAN
//! sender); this module only answers "is this PDO due" and moves bytes between mapped objects and
//! the 8-byte frame buffer.

use crate::object_dict::{ConstField, ProvidesSubObjects, SubObjectAccess};
use canopen_common::{
    can::CanId,
    objects::{find_object_entry, AccessType, DataType, ODEntry, ObjectCode, ObjectData, ObjectRawAccess, PdoMapping, SubInfo},
    sdo::AbortCode,
    AtomicCell,
};

/// Number of mapping parameter sub objects supported per PDO (sub 1..=8 of the mapping record)
///
/// CAN-FD and sub-byte mapping are out of scope, so 8 byte-aligned entries is the practical limit
/// for an 8-byte frame.
const N_MAPPING_PARAMS: usize = 8;

/// The first dummy-mapping pseudo index (CiA 301 Table 71); 0x0002..=0x0007 map to INTEGER8/16/32
/// and UNSIGNED8/16/32 respectively and are never backed by a real object -- mapping one just
/// reserves that many bytes of the frame
const DUMMY_MAPPING_FIRST: u16 = 0x0002;
const DUMMY_MAPPING_LAST: u16 = 0x0007;

fn dummy_mapping_length(index: u16) -> Option<u8> {
    match index {
        0x0002 | 0x0005 => Some(1),
        0x0003 | 0x0006 => Some(2),
        0x0004 | 0x0007 => Some(4),
        _ => None,
    }
}

#[derive(Clone, Copy)]
enum MappingEntry {
    /// A real object/sub mapped into the frame
    Real {
        object: &'static ODEntry<'static>,
        sub: u8,
        length: u8,
    },
    /// A dummy entry: `length` bytes of the frame are skipped, reading as zero on TPDOs and
    /// discarded on RPDOs
    Dummy { length: u8 },
}

impl MappingEntry {
    fn length(&self) -> u8 {
        match self {
            MappingEntry::Real { length, .. } => *length,
            MappingEntry::Dummy { length } => *length,
        }
    }
}

/// Runtime state for a single TPDO or RPDO
#[allow(missing_debug_implementations)]
pub struct Pdo {
    /// The COB-ID used to send or receive this PDO
    cob_id: AtomicCell<CanId>,
    /// Indicates if the PDO is enabled
    valid: AtomicCell<bool>,
    /// If set, this PDO cannot be requested via RTR
    rtr_disabled: AtomicCell<bool>,
    /// Transmission type field (sub 2): 0 = synchronous/acyclic (event-triggered only at SYNC),
    /// 1-240 = every Nth SYNC, 254/255 = asynchronous (event- or timer-triggered, no SYNC needed)
    transmission_type: AtomicCell<u8>,
    /// Minimum time between transmissions, in units of 100us (sub 3). TPDO only; always 0 for RPDO
    inhibit_time: AtomicCell<u16>,
    /// Maximum time between transmissions before the PDO is re-sent even without an event, in ms
    /// (sub 5). TPDO only; always 0 (disabled) for RPDO
    event_timer: AtomicCell<u16>,
    /// Tracks the number of SYNC signals since this was last sent or received
    sync_counter: AtomicCell<u8>,
    /// Set for `inhibit_time` after a transmission, cleared when the node's inhibit timer fires
    inhibit_active: AtomicCell<bool>,
    /// Set if an event arrived (or the event timer fired) while `inhibit_active`, so the inhibit
    /// timer's expiry handler knows to transmit immediately instead of waiting for another event
    pending_event: AtomicCell<bool>,
    /// The last received data value for an RPDO
    pub buffered_value: AtomicCell<Option<[u8; 8]>>,
    /// How many of `mapping_params` are valid (sub 0 of the mapping record)
    valid_maps: AtomicCell<u8>,
    /// The mapped sub objects, in frame order
    mapping_params: [AtomicCell<Option<MappingEntry>>; N_MAPPING_PARAMS],
}

impl Default for Pdo {
    fn default() -> Self {
        Self::new()
    }
}

impl Pdo {
    /// Create a new, invalid PDO with no mappings
    pub const fn new() -> Self {
        Self {
            cob_id: AtomicCell::new(CanId::new(0)),
            valid: AtomicCell::new(false),
            rtr_disabled: AtomicCell::new(false),
            transmission_type: AtomicCell::new(0),
            inhibit_time: AtomicCell::new(0),
            event_timer: AtomicCell::new(0),
            sync_counter: AtomicCell::new(0),
            inhibit_active: AtomicCell::new(false),
            pending_event: AtomicCell::new(false),
            buffered_value: AtomicCell::new(None),
            valid_maps: AtomicCell::new(0),
            mapping_params: [const { AtomicCell::new(None) }; N_MAPPING_PARAMS],
        }
    }

    /// Set the valid bit
    pub fn set_valid(&self, value: bool) {
        self.valid.store(value);
    }

    /// Get the valid bit value
    pub fn valid(&self) -> bool {
        self.valid.load()
    }

    /// Set the transmission type
    pub fn set_transmission_type(&self, value: u8) {
        self.transmission_type.store(value);
    }

    /// Get the transmission type
    pub fn transmission_type(&self) -> u8 {
        self.transmission_type.load()
    }

    /// Get the inhibit time, in microseconds
    pub fn inhibit_time_us(&self) -> u32 {
        self.inhibit_time.load() as u32 * 100
    }

    /// Get the configured event timer period, in milliseconds (0 means disabled)
    pub fn event_timer_ms(&self) -> u16 {
        self.event_timer.load()
    }

    /// Set the COB used to send or receive this PDO
    pub fn set_cob_id(&self, value: CanId) {
        self.cob_id.store(value)
    }

    /// Get the COB used to send or receive this PDO
    pub fn cob_id(&self) -> CanId {
        self.cob_id.load()
    }

    /// True if RTR requests for this PDO should be ignored
    pub fn rtr_disabled(&self) -> bool {
        self.rtr_disabled.load()
    }

    /// True while the inhibit window opened by the last transmission is still running; the node's
    /// timer wheel is what actually closes it (see [`Node::process`](crate::node::Node::process))
    pub fn inhibit_active(&self) -> bool {
        self.inhibit_active.load()
    }

    /// Open the inhibit window after a transmission
    pub fn start_inhibit(&self) {
        self.inhibit_active.store(true);
    }

    /// Close the inhibit window; called when the node's inhibit timer fires
    pub fn clear_inhibit(&self) {
        self.inhibit_active.store(false);
    }

    /// Record that a transmission was requested while the inhibit window was open, so the window's
    /// expiry handler transmits right away instead of waiting for the next event
    pub fn set_pending_event(&self) {
        self.pending_event.store(true);
    }

    /// Clear and return the pending-while-inhibited flag
    pub fn take_pending_event(&self) -> bool {
        self.pending_event.take()
    }

    /// Called on every SYNC event; returns true if a synchronous TPDO is due this SYNC
    ///
    /// Transmission type 0 means "send only if an event has been registered since the last SYNC";
    /// 1-240 means "send every Nth SYNC unconditionally".
    pub fn sync_update(&self) -> bool {
        if !self.valid.load() {
            return false;
        }
        let transmission_type = self.transmission_type.load();
        if transmission_type == 0 {
            self.read_events()
        } else if transmission_type <= 240 {
            let cnt = self.sync_counter.fetch_add(1) + 1;
            if cnt >= transmission_type {
                self.sync_counter.store(0);
                true
            } else {
                false
            }
        } else {
            false
        }
    }

    /// True if this PDO is asynchronous (event- or timer-triggered, independent of SYNC)
    pub fn is_async(&self) -> bool {
        self.transmission_type.load() >= 254
    }

    /// Check every mapped object's TPDO event flag
    pub fn read_events(&self) -> bool {
        if !self.valid.load() {
            return false;
        }
        self.iter_mappings().any(|param| match param {
            MappingEntry::Real { object, sub, .. } => object.data.read_event_flag(sub),
            MappingEntry::Dummy { .. } => false,
        })
    }

    pub(crate) fn clear_events(&self) {
        for param in self.iter_mappings() {
            if let MappingEntry::Real { object, .. } = param {
                object.data.clear_events();
            }
        }
    }

    fn iter_mappings(&self) -> impl Iterator<Item = MappingEntry> + '_ {
        let valid_maps = self.valid_maps.load() as usize;
        self.mapping_params
            .iter()
            .take(valid_maps)
            .map_while(|p| p.load())
    }

    /// Fill `data` (the 8-byte frame payload) from the mapped objects; returns the number of bytes
    /// written, for use as the frame's DLC
    pub(crate) fn read_pdo_data(&self, data: &mut [u8]) -> usize {
        let mut offset = 0;
        for param in self.iter_mappings() {
            let length = param.length() as usize;
            if offset + length > data.len() {
                break;
            }
            if let MappingEntry::Real { object, sub, .. } = param {
                // mapping validity is enforced on write, so a read error here cannot occur
                object.data.read(sub, 0, &mut data[offset..offset + length]).ok();
            } else {
                data[offset..offset + length].fill(0);
            }
            offset += length;
        }
        offset
    }

    /// Distribute a received frame's payload to the mapped objects
    pub(crate) fn store_pdo_data(&self, data: &[u8]) {
        let mut offset = 0;
        for param in self.iter_mappings() {
            let length = param.length() as usize;
            if offset + length > data.len() {
                break;
            }
            if let MappingEntry::Real { object, sub, .. } = param {
                if object.data.write(sub, &data[offset..offset + length]).is_ok() {
                    // fans out to any other TPDO mapping this same object/sub (CiA 301 4.7 step 5)
                    object.data.set_event_flag(sub);
                }
            }
            offset += length;
        }
    }
}

struct PdoCobSubObject {
    pdo: &'static Pdo,
}

impl PdoCobSubObject {
    pub const fn new(pdo: &'static Pdo) -> Self {
        Self { pdo }
    }
}

impl SubObjectAccess for PdoCobSubObject {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        let mut value = self.pdo.cob_id.load().raw() as u32;
        if self.pdo.rtr_disabled.load() {
            value |= 1 << 30;
        }
        if !self.pdo.valid.load() {
            value |= 1 << 31;
        }

        let bytes = value.to_le_bytes();
        if offset < bytes.len() {
            let read_len = buf.len().min(bytes.len() - offset);
            buf[0..read_len].copy_from_slice(&bytes[offset..offset + read_len]);
            Ok(read_len)
        } else {
            Ok(0)
        }
    }

    fn read_size(&self) -> usize {
        4
    }

    fn write(&self, data: &[u8]) -> Result<(), AbortCode> {
        if data.len() < 4 {
            Err(AbortCode::DataTypeMismatchLengthLow)
        } else if data.len() > 4 {
            Err(AbortCode::DataTypeMismatchLengthHigh)
        } else {
            let value = u32::from_le_bytes(data.try_into().unwrap());
            let not_valid = (value & (1 << 31)) != 0;
            let no_rtr = (value & (1 << 30)) != 0;
            let can_id = CanId::new((value & 0x7FF) as u16);
            // CiA 301 the cob-id's valid bit (bit 31) may always be changed, but the cob-id
            // itself and the RTR-disable bit are frozen while the PDO is active
            if self.pdo.valid.load() && (can_id != self.pdo.cob_id.load() || no_rtr != self.pdo.rtr_disabled.load()) {
                return Err(AbortCode::UnsupportedAccess);
            }
            self.pdo.cob_id.store(can_id);
            self.pdo.valid.store(!not_valid);
            self.pdo.rtr_disabled.store(no_rtr);
            Ok(())
        }
    }
}

struct PdoTransmissionTypeSubObject {
    pdo: &'static Pdo,
}

impl PdoTransmissionTypeSubObject {
    pub const fn new(pdo: &'static Pdo) -> Self {
        Self { pdo }
    }
}

impl SubObjectAccess for PdoTransmissionTypeSubObject {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        if offset > 0 || buf.is_empty() {
            return Ok(0);
        }
        buf[0] = self.pdo.transmission_type();
        Ok(1)
    }

    fn read_size(&self) -> usize {
        1
    }

    fn write(&self, data: &[u8]) -> Result<(), AbortCode> {
        if data.is_empty() {
            Err(AbortCode::DataTypeMismatchLengthLow)
        } else if self.pdo.valid.load() {
            Err(AbortCode::UnsupportedAccess)
        } else {
            self.pdo.set_transmission_type(data[0]);
            Ok(())
        }
    }
}

struct PdoU16SubObject {
    cell: &'static AtomicCell<u16>,
}

impl PdoU16SubObject {
    pub const fn new(cell: &'static AtomicCell<u16>) -> Self {
        Self { cell }
    }
}

impl SubObjectAccess for PdoU16SubObject {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        let bytes = self.cell.load().to_le_bytes();
        if offset >= bytes.len() {
            return Ok(0);
        }
        let read_len = buf.len().min(bytes.len() - offset);
        buf[..read_len].copy_from_slice(&bytes[offset..offset + read_len]);
        Ok(read_len)
    }

    fn read_size(&self) -> usize {
        2
    }

    fn write(&self, data: &[u8]) -> Result<(), AbortCode> {
        if data.len() < 2 {
            Err(AbortCode::DataTypeMismatchLengthLow)
        } else if data.len() > 2 {
            Err(AbortCode::DataTypeMismatchLengthHigh)
        } else {
            self.cell.store(u16::from_le_bytes(data.try_into().unwrap()));
            Ok(())
        }
    }
}

/// Implements a PDO communication parameter record (0x1400-0x15FF for RPDOs, 0x1800-0x19FF for
/// TPDOs); the inhibit time and event timer subs only make sense for TPDOs, so an RPDO's record is
/// built with `has_timing = false` and exposes only sub 0-2
#[allow(missing_debug_implementations)]
pub struct PdoCommObject {
    cob: PdoCobSubObject,
    transmission_type: PdoTransmissionTypeSubObject,
    inhibit_time: Option<PdoU16SubObject>,
    event_timer: Option<PdoU16SubObject>,
}

impl PdoCommObject {
    /// Create a communication parameter record for an RPDO (no inhibit time or event timer subs)
    pub const fn new_rpdo(pdo: &'static Pdo) -> Self {
        Self {
            cob: PdoCobSubObject::new(pdo),
            transmission_type: PdoTransmissionTypeSubObject::new(pdo),
            inhibit_time: None,
            event_timer: None,
        }
    }

    /// Create a communication parameter record for a TPDO
    pub const fn new_tpdo(pdo: &'static Pdo) -> Self {
        Self {
            cob: PdoCobSubObject::new(pdo),
            transmission_type: PdoTransmissionTypeSubObject::new(pdo),
            inhibit_time: Some(PdoU16SubObject::new(&pdo.inhibit_time)),
            event_timer: Some(PdoU16SubObject::new(&pdo.event_timer)),
        }
    }
}

impl ProvidesSubObjects for PdoCommObject {
    fn get_sub_object(&self, sub: u8) -> Option<(SubInfo, &dyn SubObjectAccess)> {
        match sub {
            0 => {
                let max_sub = if self.inhibit_time.is_some() { 5 } else { 2 };
                Some((
                    SubInfo { access_type: AccessType::Const, ..SubInfo::new_u8() },
                    // SAFETY-free: max_sub is a compile-time-known small constant per instance
                    const_max_sub(max_sub),
                ))
            }
            1 => Some((SubInfo::new_u32().rw_access().persist(true), &self.cob)),
            2 => Some((
                SubInfo::new_u8().rw_access().persist(true),
                &self.transmission_type,
            )),
            3 => self
                .inhibit_time
                .as_ref()
                .map(|o| (SubInfo::new_u16().rw_access().persist(true), o as &dyn SubObjectAccess)),
            5 => self
                .event_timer
                .as_ref()
                .map(|o| (SubInfo::new_u16().rw_access().persist(true), o as &dyn SubObjectAccess)),
            _ => None,
        }
    }

    fn object_code(&self) -> ObjectCode {
        ObjectCode::Record
    }
}

fn const_max_sub(n: u8) -> &'static dyn SubObjectAccess {
    match n {
        5 => const { &ConstField::new(5u8.to_le_bytes()) },
        _ => const { &ConstField::new(2u8.to_le_bytes()) },
    }
}

/// Implements a PDO mapping parameter record (0x1600-0x17FF / 0x1A00-0x1BFF)
#[allow(missing_debug_implementations)]
pub struct PdoMappingObject {
    od: &'static [ODEntry<'static>],
    pdo: &'static Pdo,
    /// True for a TPDO mapping record (0x1A00+n), false for an RPDO one (0x1600+n); determines
    /// which side of [`PdoMapping`] a mapped sub object must support
    is_tpdo: bool,
}

impl PdoMappingObject {
    /// Create a mapping parameter record for a TPDO (0x1A00+n); mapped objects must be readable
    /// by the PDO producer, i.e. `PdoMapping::Tpdo` or `PdoMapping::Both`
    pub const fn new_tpdo(od: &'static [ODEntry<'static>], pdo: &'static Pdo) -> Self {
        Self { od, pdo, is_tpdo: true }
    }

    /// Create a mapping parameter record for an RPDO (0x1600+n); mapped objects must be writable
    /// by the PDO consumer, i.e. `PdoMapping::Rpdo` or `PdoMapping::Both`
    pub const fn new_rpdo(od: &'static [ODEntry<'static>], pdo: &'static Pdo) -> Self {
        Self { od, pdo, is_tpdo: false }
    }
}

impl ObjectRawAccess for PdoMappingObject {
    fn read(&self, sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        if sub == 0 {
            if offset < 1 && !buf.is_empty() {
                buf[0] = self.pdo.valid_maps.load();
                Ok(1)
            } else {
                Ok(0)
            }
        } else if sub <= self.pdo.mapping_params.len() as u8 {
            let value = match self.pdo.mapping_params[(sub - 1) as usize].load() {
                Some(MappingEntry::Real { object, sub, length }) => {
                    ((object.index as u32) << 16) + ((sub as u32) << 8) + length as u32 * 8
                }
                Some(MappingEntry::Dummy { length }) => {
                    let index = match length {
                        1 => 0x0005u32,
                        2 => 0x0006,
                        _ => 0x0007,
                    };
                    (index << 16) + length as u32 * 8
                }
                None => 0,
            };
            let bytes = value.to_le_bytes();
            let read_len = buf.len().min(bytes.len().saturating_sub(offset));
            buf[..read_len].copy_from_slice(&bytes[offset..offset + read_len]);
            Ok(read_len)
        } else {
            Err(AbortCode::NoSuchSubIndex)
        }
    }

    fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        if sub == 0 {
            if data.is_empty() {
                return Err(AbortCode::DataTypeMismatchLengthLow);
            }
            if self.pdo.valid.load() {
                return Err(AbortCode::UnsupportedAccess);
            }
            self.pdo.valid_maps.store(data[0]);
            Ok(())
        } else if sub <= self.pdo.mapping_params.len() as u8 {
            if data.len() != 4 {
                return Err(AbortCode::DataTypeMismatch);
            }
            if self.pdo.valid.load() {
                return Err(AbortCode::UnsupportedAccess);
            }
            let value = u32::from_le_bytes(data.try_into().unwrap());

            let object_id = (value >> 16) as u16;
            let mapping_sub = ((value & 0xFF00) >> 8) as u8;
            let bit_length = (value & 0xFF) as usize;
            if bit_length % 8 != 0 {
                // only byte-level access is supported
                return Err(AbortCode::IncompatibleParameter);
            }
            let length = bit_length / 8;

            let entry = if (DUMMY_MAPPING_FIRST..=DUMMY_MAPPING_LAST).contains(&object_id) {
                let dummy_length =
                    dummy_mapping_length(object_id).ok_or(AbortCode::NoSuchObject)?;
                if dummy_length as usize != length {
                    return Err(AbortCode::IncompatibleParameter);
                }
                MappingEntry::Dummy { length: dummy_length }
            } else {
                let od_entry = find_object_entry(self.od, object_id).ok_or(AbortCode::NoSuchObject)?;
                let sub_info = od_entry.data.sub_info(mapping_sub)?;
                let allowed = match sub_info.pdo_mapping {
                    PdoMapping::None => false,
                    PdoMapping::Both => true,
                    PdoMapping::Tpdo => self.is_tpdo,
                    PdoMapping::Rpdo => !self.is_tpdo,
                };
                if !allowed {
                    return Err(AbortCode::UnnallowedPdo);
                }
                if sub_info.size < length {
                    return Err(AbortCode::IncompatibleParameter);
                }
                MappingEntry::Real {
                    object: od_entry,
                    sub: mapping_sub,
                    length: length as u8,
                }
            };
            self.pdo.mapping_params[(sub - 1) as usize].store(Some(entry));
            Ok(())
        } else {
            Err(AbortCode::NoSuchSubIndex)
        }
    }

    fn object_code(&self) -> ObjectCode {
        ObjectCode::Record
    }

    fn sub_info(&self, sub: u8) -> Result<SubInfo, AbortCode> {
        if sub == 0 {
            Ok(SubInfo {
                size: 1,
                data_type: DataType::UInt8,
                access_type: AccessType::Rw,
                pdo_mapping: PdoMapping::None,
                persist: true,
            })
        } else if sub <= self.pdo.mapping_params.len() as u8 {
            Ok(SubInfo {
                size: 4,
                data_type: DataType::UInt32,
                access_type: AccessType::Rw,
                pdo_mapping: PdoMapping::None,
                persist: true,
            })
        } else {
            Err(AbortCode::NoSuchSubIndex)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_type_one_fires_every_sync() {
        let pdo = Pdo::new();
        pdo.set_valid(true);
        pdo.set_transmission_type(1);
        assert!(pdo.sync_update());
        assert!(pdo.sync_update());
    }

    #[test]
    fn sync_type_n_fires_every_nth_sync() {
        let pdo = Pdo::new();
        pdo.set_valid(true);
        pdo.set_transmission_type(3);
        assert!(!pdo.sync_update());
        assert!(!pdo.sync_update());
        assert!(pdo.sync_update());
        assert!(!pdo.sync_update());
    }

    #[test]
    fn invalid_pdo_never_fires() {
        let pdo = Pdo::new();
        pdo.set_transmission_type(1);
        assert!(!pdo.sync_update());
    }

    #[test]
    fn inhibit_window_tracks_pending_event_until_cleared() {
        let pdo = Pdo::new();
        assert!(!pdo.inhibit_active());
        pdo.start_inhibit();
        assert!(pdo.inhibit_active());
        pdo.set_pending_event();
        pdo.clear_inhibit();
        assert!(!pdo.inhibit_active());
        assert!(pdo.take_pending_event());
        // takes, so a second read sees it consumed
        assert!(!pdo.take_pending_event());
    }

    #[test]
    fn async_detection() {
        let pdo = Pdo::new();
        pdo.set_transmission_type(254);
        assert!(pdo.is_async());
        pdo.set_transmission_type(1);
        assert!(!pdo.is_async());
    }

    struct FixedSub {
        mapping: PdoMapping,
    }

    impl SubObjectAccess for FixedSub {
        fn read(&self, _offset: usize, _buf: &mut [u8]) -> Result<usize, AbortCode> {
            Ok(0)
        }

        fn read_size(&self) -> usize {
            4
        }

        fn write(&self, _data: &[u8]) -> Result<(), AbortCode> {
            Ok(())
        }
    }

    impl ObjectRawAccess for FixedSub {
        fn read(&self, sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
            SubObjectAccess::read(self, offset, buf).map(|n| if sub == 0 { n } else { 0 })
        }

        fn write(&self, _sub: u8, data: &[u8]) -> Result<(), AbortCode> {
            SubObjectAccess::write(self, data)
        }

        fn sub_info(&self, _sub: u8) -> Result<SubInfo, AbortCode> {
            Ok(SubInfo { size: 4, data_type: DataType::UInt32, access_type: AccessType::Rw, pdo_mapping: self.mapping, persist: false })
        }

        fn object_code(&self) -> ObjectCode {
            ObjectCode::Var
        }
    }

    fn mapping_word(index: u16, sub: u8, bits: u8) -> [u8; 4] {
        (((index as u32) << 16) + ((sub as u32) << 8) + bits as u32).to_le_bytes()
    }

    #[test]
    fn cob_id_write_refused_while_active() {
        let pdo = Pdo::new();
        pdo.set_cob_id(CanId::new(0x200));
        pdo.set_valid(true);
        let sub = PdoCobSubObject::new(&pdo);
        // cob-id/rtr bits frozen while active, even though the valid bit (31) may still flip
        let value: u32 = 0x300;
        let err = sub.write(&value.to_le_bytes()).unwrap_err();
        assert_eq!(err, AbortCode::UnsupportedAccess);
        assert_eq!(pdo.cob_id().raw(), 0x200);
    }

    #[test]
    fn transmission_type_write_refused_while_active() {
        let pdo = Pdo::new();
        pdo.set_valid(true);
        pdo.set_transmission_type(1);
        let sub = PdoTransmissionTypeSubObject::new(&pdo);
        let err = sub.write(&[5]).unwrap_err();
        assert_eq!(err, AbortCode::UnsupportedAccess);
        assert_eq!(pdo.transmission_type(), 1);
    }

    #[test]
    fn mapping_write_refused_while_active() {
        static OD: [ODEntry<'static>; 0] = [];
        let pdo = Pdo::new();
        pdo.set_valid(true);
        let obj = PdoMappingObject::new_tpdo(&OD, &pdo);
        let err = obj.write(0, &[1]).unwrap_err();
        assert_eq!(err, AbortCode::UnsupportedAccess);
    }

    #[test]
    fn tpdo_mapping_rejects_write_only_object() {
        static RPDO_ONLY: FixedSub = FixedSub { mapping: PdoMapping::Rpdo };
        static OD: [ODEntry<'static>; 1] =
            [ODEntry { index: 0x2000, data: ObjectData::Storage(&RPDO_ONLY) }];
        let pdo = Pdo::new();
        let obj = PdoMappingObject::new_tpdo(&OD, &pdo);
        let err = obj.write(1, &mapping_word(0x2000, 0, 32)).unwrap_err();
        assert_eq!(err, AbortCode::UnnallowedPdo);
    }

    #[test]
    fn rpdo_mapping_rejects_read_only_object() {
        static TPDO_ONLY: FixedSub = FixedSub { mapping: PdoMapping::Tpdo };
        static OD: [ODEntry<'static>; 1] =
            [ODEntry { index: 0x2000, data: ObjectData::Storage(&TPDO_ONLY) }];
        let pdo = Pdo::new();
        let obj = PdoMappingObject::new_rpdo(&OD, &pdo);
        let err = obj.write(1, &mapping_word(0x2000, 0, 32)).unwrap_err();
        assert_eq!(err, AbortCode::UnnallowedPdo);
    }

    #[test]
    fn both_direction_mapping_accepted_either_way() {
        static EITHER: FixedSub = FixedSub { mapping: PdoMapping::Both };
        static OD: [ODEntry<'static>; 1] =
            [ODEntry { index: 0x2000, data: ObjectData::Storage(&EITHER) }];
        let tpdo = Pdo::new();
        let tpdo_obj = PdoMappingObject::new_tpdo(&OD, &tpdo);
        tpdo_obj.write(1, &mapping_word(0x2000, 0, 32)).unwrap();

        let rpdo = Pdo::new();
        let rpdo_obj = PdoMappingObject::new_rpdo(&OD, &rpdo);
        rpdo_obj.write(1, &mapping_word(0x2000, 0, 32)).unwrap();
    }
}
