//! Emergency (EMCY) producer: error code/register encoding, the pre-defined error field history
//! ring (object 0x1003) and the 8-byte wire frame
//!
//! EMCY is fire-and-forget: a raised error produces one frame at `cob_id` and one new entry at
//! the head of the history ring. There is no consumer side in this crate; a peer's EMCY frames are
//! just CAN traffic an application may choose to log.

use canopen_common::can::{CanFrame, CanId};
use canopen_common::objects::{AccessType, ObjectCode, ObjectRawAccess, SubInfo};
use canopen_common::sdo::AbortCode;
use canopen_common::AtomicCell;

/// Capacity of the pre-defined error field ring (object 0x1003); CiA 301 permits any size, 8 is a
/// common default for small devices
pub const EMCY_HIST_LEN: usize = 8;

/// CiA 301 Table 12 error register bits (object 0x1001)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorRegisterBit {
    Generic = 1 << 0,
    Current = 1 << 1,
    Voltage = 1 << 2,
    Temperature = 1 << 3,
    Communication = 1 << 4,
    DeviceProfile = 1 << 5,
    Manufacturer = 1 << 7,
}

/// A raised emergency condition: a 16-bit error code (CiA 301 Table 13) plus up to 5 bytes of
/// manufacturer-specific additional information
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmcyEvent {
    pub error_code: u16,
    pub register_bit: Option<ErrorRegisterBit>,
    pub additional: [u8; 5],
}

impl EmcyEvent {
    pub const fn new(error_code: u16) -> Self {
        Self { error_code, register_bit: None, additional: [0; 5] }
    }

    pub const fn with_register_bit(mut self, bit: ErrorRegisterBit) -> Self {
        self.register_bit = Some(bit);
        self
    }

    pub const fn with_additional(mut self, additional: [u8; 5]) -> Self {
        self.additional = additional;
        self
    }

    fn to_history_word(self) -> u32 {
        // Pre-defined error field stores just the 16-bit error code, zero-extended
        self.error_code as u32
    }
}

/// Emergency producer state: the error register, the history ring, and the cob-id
#[allow(missing_debug_implementations)]
pub struct Emcy {
    cob_id: AtomicCell<CanId>,
    active: AtomicCell<bool>,
    error_register: AtomicCell<u8>,
    history: [AtomicCell<u32>; EMCY_HIST_LEN],
    history_len: AtomicCell<u8>,
}

impl Default for Emcy {
    fn default() -> Self {
        Self::new(CanId::new(0x080))
    }
}

impl Emcy {
    pub const fn new(default_cob_id: CanId) -> Self {
        Self {
            cob_id: AtomicCell::new(default_cob_id),
            active: AtomicCell::new(true),
            error_register: AtomicCell::new(0),
            history: [const { AtomicCell::new(0) }; EMCY_HIST_LEN],
            history_len: AtomicCell::new(0),
        }
    }

    pub fn cob_id(&self) -> CanId {
        self.cob_id.load()
    }

    pub fn error_register(&self) -> u8 {
        self.error_register.load()
    }

    /// Object 0x1014: cob-id changes are forbidden while an error condition is active (register
    /// nonzero), per CiA 301
    pub fn set_cob_id(&self, id: CanId) -> Result<(), ()> {
        if self.error_register.load() != 0 {
            Err(())
        } else {
            self.cob_id.store(id);
            Ok(())
        }
    }

    /// Raise an emergency: update the error register, push onto the history ring, and build the
    /// wire frame
    pub fn raise(&self, event: EmcyEvent) -> CanFrame {
        if let Some(bit) = event.register_bit {
            self.error_register.fetch_update(|r| Some(r | bit as u8)).ok();
        }
        self.active.store(true);
        self.push_history(event.to_history_word());

        let mut data = [0u8; 8];
        data[0..2].copy_from_slice(&event.error_code.to_le_bytes());
        data[2] = self.error_register.load();
        data[3..8].copy_from_slice(&event.additional);
        CanFrame::new(self.cob_id.load(), &data)
    }

    /// Clear the given error register bit; once the register reaches zero, send the "error
    /// resolved" frame (error code 0x0000) per CiA 301
    pub fn resolve(&self, bit: ErrorRegisterBit) -> Option<CanFrame> {
        self.error_register.fetch_update(|r| Some(r & !(bit as u8))).ok();
        if self.error_register.load() == 0 {
            let mut data = [0u8; 8];
            data[2] = 0;
            Some(CanFrame::new(self.cob_id.load(), &data))
        } else {
            None
        }
    }

    fn push_history(&self, word: u32) {
        let len = (self.history_len.load() as usize).min(EMCY_HIST_LEN);
        for i in (1..len.min(EMCY_HIST_LEN - 1) + 1).rev() {
            self.history[i].store(self.history[i - 1].load());
        }
        self.history[0].store(word);
        self.history_len.store((len + 1).min(EMCY_HIST_LEN) as u8);
    }

    /// Object 0x1003 sub 0: number of entries currently recorded
    pub fn history_len(&self) -> u8 {
        self.history_len.load()
    }

    /// Object 0x1003 sub N (1-indexed, most recent first)
    pub fn history_entry(&self, sub: u8) -> Option<u32> {
        if sub == 0 || sub as usize > self.history_len.load() as usize {
            return None;
        }
        Some(self.history[(sub - 1) as usize].load())
    }

    /// Writing 0 to sub 0 clears the whole history, per CiA 301
    pub fn clear_history(&self) {
        for cell in &self.history {
            cell.store(0);
        }
        self.history_len.store(0);
    }
}

/// Object 0x1001: the error register, read-only from the bus (the application sets it indirectly
/// by raising/resolving emergencies)
#[allow(missing_debug_implementations)]
pub struct ErrorRegisterObject {
    emcy: &'static Emcy,
}

impl ErrorRegisterObject {
    pub const fn new(emcy: &'static Emcy) -> Self {
        Self { emcy }
    }
}

impl ObjectRawAccess for ErrorRegisterObject {
    fn read(&self, _sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        if offset != 0 || buf.is_empty() {
            return Ok(0);
        }
        buf[0] = self.emcy.error_register();
        Ok(1)
    }

    fn write(&self, _sub: u8, _data: &[u8]) -> Result<(), AbortCode> {
        Err(AbortCode::ReadOnly)
    }

    fn object_code(&self) -> ObjectCode {
        ObjectCode::Var
    }

    fn sub_info(&self, _sub: u8) -> Result<SubInfo, AbortCode> {
        Ok(SubInfo { access_type: AccessType::Ro, ..SubInfo::new_u8() })
    }
}

/// Object 0x1003: the pre-defined error field, an array whose sub 0 is the live entry count and
/// subs 1..N are the most-recent-first history; writing 0 to sub 0 clears it (CiA 301 ss. 7.5.2.6)
#[allow(missing_debug_implementations)]
pub struct PredefinedErrorFieldObject {
    emcy: &'static Emcy,
}

impl PredefinedErrorFieldObject {
    pub const fn new(emcy: &'static Emcy) -> Self {
        Self { emcy }
    }
}

impl ObjectRawAccess for PredefinedErrorFieldObject {
    fn read(&self, sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        if sub == 0 {
            if offset != 0 || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.emcy.history_len();
            Ok(1)
        } else {
            let value = self.emcy.history_entry(sub).ok_or(AbortCode::NoSuchSubIndex)?;
            let bytes = value.to_le_bytes();
            if offset >= bytes.len() {
                return Ok(0);
            }
            let n = buf.len().min(bytes.len() - offset);
            buf[..n].copy_from_slice(&bytes[offset..offset + n]);
            Ok(n)
        }
    }

    fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        if sub != 0 {
            return Err(AbortCode::ReadOnly);
        }
        if data.first() != Some(&0) {
            return Err(AbortCode::InvalidValue);
        }
        self.emcy.clear_history();
        Ok(())
    }

    fn object_code(&self) -> ObjectCode {
        ObjectCode::Array
    }

    fn sub_info(&self, sub: u8) -> Result<SubInfo, AbortCode> {
        if sub == 0 {
            Ok(SubInfo::MAX_SUB_NUMBER)
        } else if sub as usize <= EMCY_HIST_LEN {
            Ok(SubInfo { access_type: AccessType::Ro, ..SubInfo::new_u32() })
        } else {
            Err(AbortCode::NoSuchSubIndex)
        }
    }
}

/// Object 0x1014: the emergency COB-ID; writing while the error register is nonzero is rejected
#[allow(missing_debug_implementations)]
pub struct EmcyCobObject {
    emcy: &'static Emcy,
}

impl EmcyCobObject {
    pub const fn new(emcy: &'static Emcy) -> Self {
        Self { emcy }
    }
}

impl ObjectRawAccess for EmcyCobObject {
    fn read(&self, _sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        let bytes = (self.emcy.cob_id().raw() as u32).to_le_bytes();
        if offset >= bytes.len() {
            return Ok(0);
        }
        let n = buf.len().min(bytes.len() - offset);
        buf[..n].copy_from_slice(&bytes[offset..offset + n]);
        Ok(n)
    }

    fn write(&self, _sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        if data.len() != 4 {
            return Err(AbortCode::DataTypeMismatch);
        }
        let value = u32::from_le_bytes(data.try_into().unwrap());
        self.emcy
            .set_cob_id(CanId::new((value & 0x7ff) as u16))
            .map_err(|_| AbortCode::IncompatibleParameter)
    }

    fn object_code(&self) -> ObjectCode {
        ObjectCode::Var
    }

    fn sub_info(&self, _sub: u8) -> Result<SubInfo, AbortCode> {
        Ok(SubInfo::new_u32().rw_access())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_sets_register_and_frame_fields() {
        let emcy = Emcy::default();
        let frame = emcy.raise(
            EmcyEvent::new(0x5000).with_register_bit(ErrorRegisterBit::Generic),
        );
        assert_eq!(u16::from_le_bytes([frame.data()[0], frame.data()[1]]), 0x5000);
        assert_eq!(frame.data()[2], ErrorRegisterBit::Generic as u8);
        assert_eq!(emcy.error_register(), ErrorRegisterBit::Generic as u8);
    }

    #[test]
    fn history_ring_keeps_most_recent_first() {
        let emcy = Emcy::default();
        emcy.raise(EmcyEvent::new(0x1111));
        emcy.raise(EmcyEvent::new(0x2222));
        assert_eq!(emcy.history_entry(1), Some(0x2222));
        assert_eq!(emcy.history_entry(2), Some(0x1111));
        assert_eq!(emcy.history_len(), 2);
    }

    #[test]
    fn clear_history_resets_count() {
        let emcy = Emcy::default();
        emcy.raise(EmcyEvent::new(0x1111));
        emcy.clear_history();
        assert_eq!(emcy.history_len(), 0);
        assert_eq!(emcy.history_entry(1), None);
    }

    #[test]
    fn resolve_sends_frame_only_when_register_clears() {
        let emcy = Emcy::default();
        emcy.raise(EmcyEvent::new(0x5000).with_register_bit(ErrorRegisterBit::Generic));
        assert!(emcy.resolve(ErrorRegisterBit::Generic).is_some());
    }

    #[test]
    fn cob_id_change_forbidden_while_active() {
        let emcy = Emcy::default();
        emcy.raise(EmcyEvent::new(0x5000).with_register_bit(ErrorRegisterBit::Generic));
        assert!(emcy.set_cob_id(CanId::new(0x090)).is_err());
    }

    #[test]
    fn history_object_clears_on_zero_write() {
        static EMCY: Emcy = Emcy::new(CanId::new(0x080));
        EMCY.raise(EmcyEvent::new(0x1111));
        let obj = PredefinedErrorFieldObject::new(&EMCY);
        let mut count = [0u8; 1];
        obj.read(0, 0, &mut count).unwrap();
        assert_eq!(count[0], 1);
        obj.write(0, &[0]).unwrap();
        obj.read(0, 0, &mut count).unwrap();
        assert_eq!(count[0], 0);
    }

    #[test]
    fn cob_object_rejects_write_while_active() {
        static EMCY: Emcy = Emcy::new(CanId::new(0x080));
        EMCY.raise(EmcyEvent::new(0x5000).with_register_bit(ErrorRegisterBit::Generic));
        let obj = EmcyCobObject::new(&EMCY);
        let err = obj.write(0, &0x090u32.to_le_bytes()).unwrap_err();
        assert_eq!(err, AbortCode::IncompatibleParameter);
    }
}
