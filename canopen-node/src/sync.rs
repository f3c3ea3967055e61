//! The SYNC service: producer (periodic id-only frame) and consumer (per-TPDO counters, RPDO
//! buffer flush)
//!
//! Object 0x1005 bit 30 enables production; object 0x1006 holds the cycle time in microseconds.
//! The producer needs a timer period expressed in the wheel's 100us ticks, so activation fails
//! with [`CanopenError::SyncRes`] if the configured cycle can't be resolved to a whole number of
//! ticks -- CiA 301 calls this the timer resolution error.

use canopen_common::can::{CanFrame, CanId};
use canopen_common::constants::values::TIMER_RESOLUTION_US;
use canopen_common::error::CanopenError;
use canopen_common::objects::{ObjectCode, ObjectRawAccess, SubInfo};
use canopen_common::sdo::AbortCode;
use canopen_common::AtomicCell;

const COBID_ON_BIT: u32 = 1 << 30;

/// SYNC producer/consumer state, backing objects 0x1005 and 0x1006
#[allow(missing_debug_implementations)]
pub struct Sync {
    cob_id: AtomicCell<CanId>,
    producing: AtomicCell<bool>,
    cycle_us: AtomicCell<u32>,
}

impl Default for Sync {
    fn default() -> Self {
        Self::new()
    }
}

impl Sync {
    pub const fn new() -> Self {
        Self {
            cob_id: AtomicCell::new(CanId::new(canopen_common::can::reserved::SYNC)),
            producing: AtomicCell::new(false),
            cycle_us: AtomicCell::new(0),
        }
    }

    pub fn cob_id(&self) -> CanId {
        self.cob_id.load()
    }

    pub fn is_producing(&self) -> bool {
        self.producing.load()
    }

    pub fn cycle_us(&self) -> u32 {
        self.cycle_us.load()
    }

    /// Resolve the cycle time into a whole number of 100us timer ticks
    fn resolve_ticks(&self) -> Result<u32, CanopenError> {
        let cycle = self.cycle_us.load();
        if cycle == 0 || cycle % TIMER_RESOLUTION_US as u32 != 0 {
            Err(CanopenError::SyncRes)
        } else {
            Ok(cycle / TIMER_RESOLUTION_US as u32)
        }
    }

    /// Attempt to (re)start production; returns the tick period for the caller to (re)arm the
    /// timer wheel with, or `SyncRes` if the cycle cannot be resolved
    pub fn activate(&self) -> Result<u32, CanopenError> {
        let ticks = self.resolve_ticks()?;
        self.producing.store(true);
        Ok(ticks)
    }

    pub fn deactivate(&self) {
        self.producing.store(false);
    }

    /// Read object 0x1005: bit 30 set if producing, plus the cob-id
    pub fn read_cob_reg(&self) -> u32 {
        let mut value = self.cob_id.load().raw() as u32;
        if self.producing.load() {
            value |= COBID_ON_BIT;
        }
        value
    }

    /// Apply a write to object 0x1005; `activate`/`deactivate` the timer as directed by the
    /// caller's returned [`SyncCobWrite`]
    pub fn write_cob_reg(&self, value: u32) -> Result<SyncCobWrite, CanopenError> {
        let new_cob_id = CanId::new((value & 0x7ff) as u16);
        let turning_on = (value & COBID_ON_BIT) != 0;
        let was_producing = self.producing.load();

        if was_producing && new_cob_id != self.cob_id.load() {
            return Err(CanopenError::ObjRange);
        }

        self.cob_id.store(new_cob_id);

        match (was_producing, turning_on) {
            (true, false) => {
                self.deactivate();
                Ok(SyncCobWrite::Deactivated)
            }
            (false, true) => match self.activate() {
                Ok(ticks) => Ok(SyncCobWrite::Activated { ticks }),
                Err(e) => {
                    self.producing.store(false);
                    Err(e)
                }
            },
            _ => Ok(SyncCobWrite::Unchanged),
        }
    }

    /// Apply a write to object 0x1006 (cycle time in us); if currently producing, re-activate
    /// with the new cycle, restoring the old one on failure
    pub fn write_cycle(&self, new_cycle_us: u32) -> Result<Option<u32>, CanopenError> {
        let old_cycle = self.cycle_us.load();
        self.cycle_us.store(new_cycle_us);
        if !self.producing.load() {
            return Ok(None);
        }
        match self.activate() {
            Ok(ticks) => Ok(Some(ticks)),
            Err(e) => {
                self.cycle_us.store(old_cycle);
                Err(e)
            }
        }
    }

    /// Build the id-only frame to transmit when the producer timer fires
    pub fn frame(&self) -> CanFrame {
        CanFrame::id_only(self.cob_id.load())
    }
}

/// The effect a write to object 0x1005 had on the producer, so the caller knows whether to
/// (re)arm or cancel the timer wheel entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncCobWrite {
    Unchanged,
    Activated { ticks: u32 },
    Deactivated,
}

fn config_err_to_abort(err: CanopenError) -> AbortCode {
    match err {
        CanopenError::ObjRange => AbortCode::InvalidValue,
        CanopenError::SyncRes => AbortCode::InvalidValue,
        _ => AbortCode::GeneralError,
    }
}

/// Object 0x1005: the SYNC COB-ID register, bit 30 enabling production
#[allow(missing_debug_implementations)]
pub struct SyncCobObject {
    sync: &'static Sync,
}

impl SyncCobObject {
    pub const fn new(sync: &'static Sync) -> Self {
        Self { sync }
    }
}

impl ObjectRawAccess for SyncCobObject {
    fn read(&self, _sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        let bytes = self.sync.read_cob_reg().to_le_bytes();
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
        self.sync.write_cob_reg(value).map(|_| ()).map_err(config_err_to_abort)
    }

    fn object_code(&self) -> ObjectCode {
        ObjectCode::Var
    }

    fn sub_info(&self, _sub: u8) -> Result<SubInfo, AbortCode> {
        Ok(SubInfo::new_u32().rw_access())
    }
}

/// Object 0x1006: the SYNC communication cycle period, in microseconds
#[allow(missing_debug_implementations)]
pub struct SyncCycleObject {
    sync: &'static Sync,
}

impl SyncCycleObject {
    pub const fn new(sync: &'static Sync) -> Self {
        Self { sync }
    }
}

impl ObjectRawAccess for SyncCycleObject {
    fn read(&self, _sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        let bytes = self.sync.cycle_us().to_le_bytes();
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
        self.sync.write_cycle(value).map(|_| ()).map_err(config_err_to_abort)
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
    fn activate_resolves_whole_ticks() {
        let sync = Sync::new();
        sync.write_cycle(1000).unwrap(); // 1ms = 10 ticks @ 100us
        assert_eq!(sync.activate().unwrap(), 10);
    }

    #[test]
    fn activate_rejects_unresolvable_cycle() {
        let sync = Sync::new();
        sync.cycle_us.store(150); // not a multiple of 100us
        assert_eq!(sync.activate(), Err(CanopenError::SyncRes));
    }

    #[test]
    fn cob_write_while_producing_rejects_id_change() {
        let sync = Sync::new();
        sync.cycle_us.store(1000);
        sync.activate().unwrap();
        let new_id_bits = 0x100u32 | COBID_ON_BIT;
        assert_eq!(sync.write_cob_reg(new_id_bits), Err(CanopenError::ObjRange));
    }

    #[test]
    fn cob_write_turns_off_and_on() {
        let sync = Sync::new();
        sync.cycle_us.store(1000);
        let cob = sync.cob_id().raw() as u32;
        assert_eq!(sync.write_cob_reg(cob).unwrap(), SyncCobWrite::Deactivated);
        assert!(!sync.is_producing());
        assert_eq!(
            sync.write_cob_reg(cob | COBID_ON_BIT).unwrap(),
            SyncCobWrite::Activated { ticks: 10 }
        );
        assert!(sync.is_producing());
    }

    #[test]
    fn cycle_object_rejects_unresolvable_value() {
        static SYNC: Sync = Sync::new();
        let obj = SyncCycleObject::new(&SYNC);
        SYNC.producing.store(true);
        let err = obj.write(0, &150u32.to_le_bytes()).unwrap_err();
        assert_eq!(err, AbortCode::InvalidValue);
    }

    #[test]
    fn cob_object_round_trips_through_dictionary() {
        static SYNC: Sync = Sync::new();
        let obj = SyncCobObject::new(&SYNC);
        SYNC.cycle_us.store(1000);
        let on = (SYNC.cob_id().raw() as u32) | COBID_ON_BIT;
        obj.write(0, &on.to_le_bytes()).unwrap();
        assert!(SYNC.is_producing());
        let mut buf = [0u8; 4];
        obj.read(0, 0, &mut buf).unwrap();
        assert_eq!(u32::from_le_bytes(buf) & COBID_ON_BIT, COBID_ON_BIT);
    }
}
