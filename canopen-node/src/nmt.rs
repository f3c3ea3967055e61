//! The NMT state machine: slave-side state tracking, master command handling, the heartbeat
//! producer and the heartbeat consumer list
//!
//! A node starts in [`NmtState::Init`], transitions itself to [`NmtState::PreOperational`] once
//! initialization completes (sending one bootup message on the way), and from there only moves in
//! response to an NMT master command (`0x000`) or a local application reset request.

use canopen_common::can::{reserved, CanFrame, CanId, Heartbeat, NmtCommand, NmtCommandSpecifier, NmtState};
use canopen_common::node_id::NodeId;
use canopen_common::objects::{ObjectCode, ObjectRawAccess, SubInfo};
use canopen_common::sdo::AbortCode;
use canopen_common::AtomicCell;

/// Bitmask of which frame classes a node is allowed to send/receive in each NMT state
///
/// CiA 301 ss. 7.3 fixes this table: NMT and the node's own heartbeat are always allowed; SDO is
/// allowed in Pre-Operational and Operational; PDO and SYNC only in Operational.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllowedFrames {
    pub nmt: bool,
    pub sync: bool,
    pub pdo: bool,
    pub sdo: bool,
    pub heartbeat: bool,
}

impl AllowedFrames {
    /// Look up the allowed frame classes for a given NMT state
    pub const fn for_state(state: NmtState) -> Self {
        match state {
            NmtState::Operational => AllowedFrames {
                nmt: true,
                sync: true,
                pdo: true,
                sdo: true,
                heartbeat: true,
            },
            NmtState::PreOperational => AllowedFrames {
                nmt: true,
                sync: false,
                pdo: false,
                sdo: true,
                heartbeat: true,
            },
            NmtState::Stopped => AllowedFrames {
                nmt: true,
                sync: false,
                pdo: false,
                sdo: false,
                heartbeat: true,
            },
            NmtState::Init | NmtState::Invalid => AllowedFrames {
                nmt: false,
                sync: false,
                pdo: false,
                sdo: false,
                heartbeat: false,
            },
        }
    }
}

/// What the application should do in response to a processed NMT command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetAction {
    /// No reset requested
    None,
    /// Re-run initialization of the object dictionary (CiA 301 "reset application")
    ResetNode,
    /// Re-establish the CAN connection and NMT state, without touching application objects
    ResetComm,
}

/// The slave-side NMT state machine and heartbeat producer
#[allow(missing_debug_implementations)]
pub struct NmtSlave {
    state: AtomicCell<NmtState>,
    /// Producer period in ms (object 0x1017); 0 disables heartbeat production. The cadence itself
    /// is driven by the node's timer wheel, not by this struct; it only holds the configured value
    /// for [`Node`](crate::node::Node) to compare against what it currently has armed.
    heartbeat_period_ms: AtomicCell<u16>,
}

impl Default for NmtSlave {
    fn default() -> Self {
        Self::new()
    }
}

impl NmtSlave {
    pub const fn new() -> Self {
        Self {
            state: AtomicCell::new(NmtState::Init),
            heartbeat_period_ms: AtomicCell::new(0),
        }
    }

    pub fn state(&self) -> NmtState {
        self.state.load()
    }

    pub fn allowed(&self) -> AllowedFrames {
        AllowedFrames::for_state(self.state())
    }

    pub fn set_heartbeat_period_ms(&self, period_ms: u16) {
        self.heartbeat_period_ms.store(period_ms);
    }

    pub fn heartbeat_period_ms(&self) -> u16 {
        self.heartbeat_period_ms.load()
    }

    /// Transition Init -> PreOperational, returning the bootup frame to send
    pub fn boot(&self, node_id: NodeId, _now_us: u32) -> CanFrame {
        self.state.store(NmtState::PreOperational);
        Heartbeat {
            node_id: node_id.raw(),
            state: NmtState::Invalid, // bootup message: state byte is always 0 on the wire
        }
        .to_frame()
    }

    /// Process a received NMT master command addressed to this node (target already matched
    /// against `node_id` or the broadcast value 0 by the caller)
    pub fn process_command(&self, cmd: NmtCommand) -> ResetAction {
        match cmd.cs {
            NmtCommandSpecifier::Start => {
                self.state.store(NmtState::Operational);
                ResetAction::None
            }
            NmtCommandSpecifier::Stop => {
                self.state.store(NmtState::Stopped);
                ResetAction::None
            }
            NmtCommandSpecifier::EnterPreOp => {
                self.state.store(NmtState::PreOperational);
                ResetAction::None
            }
            NmtCommandSpecifier::ResetNode => ResetAction::ResetNode,
            NmtCommandSpecifier::ResetComm => ResetAction::ResetComm,
        }
    }

    /// Build the heartbeat frame for the current state; called by
    /// [`Node::process`](crate::node::Node::process) when its timer wheel's heartbeat-producer
    /// timer fires
    pub fn heartbeat_frame(&self, node_id: NodeId) -> CanFrame {
        Heartbeat {
            node_id: node_id.raw(),
            state: self.state.load(),
        }
        .to_frame()
    }
}

/// One entry in the heartbeat consumer list (object 0x1016), tracking a remote node's heartbeat
/// timeout
///
/// CiA 301 allows any number of consumer entries; a node built from a fixed-size dictionary array
/// gets a fixed, statically-allocated set of these rather than the original's linked list, which
/// exists only because the reference device builds its consumer table at runtime.
#[allow(missing_debug_implementations)]
pub struct HbConsumer {
    /// Remote node-id being monitored; 0 means this slot is unused
    node_id: AtomicCell<u8>,
    /// Expected heartbeat period in ms; 0 disables monitoring even if `node_id` is set
    time_ms: AtomicCell<u16>,
    /// Microsecond deadline by which the next heartbeat must arrive
    deadline_us: AtomicCell<u32>,
    /// Set once a heartbeat has ever been seen from this node, so the first deadline check after
    /// configuration doesn't immediately fire
    armed: AtomicCell<bool>,
    timed_out: AtomicCell<bool>,
}

impl Default for HbConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl HbConsumer {
    pub const fn new() -> Self {
        Self {
            node_id: AtomicCell::new(0),
            time_ms: AtomicCell::new(0),
            deadline_us: AtomicCell::new(0),
            armed: AtomicCell::new(false),
            timed_out: AtomicCell::new(false),
        }
    }

    /// Configure this slot from the packed value written to object 0x1016 sub-N: high byte
    /// node-id, low 16 bits period in ms
    pub fn configure(&self, packed: u32) {
        let node_id = ((packed >> 16) & 0xff) as u8;
        let time_ms = (packed & 0xffff) as u16;
        self.node_id.store(node_id);
        self.time_ms.store(time_ms);
        self.armed.store(false);
        self.timed_out.store(false);
    }

    pub fn packed(&self) -> u32 {
        ((self.node_id.load() as u32) << 16) | self.time_ms.load() as u32
    }

    fn active(&self) -> bool {
        self.node_id.load() != 0 && self.time_ms.load() != 0
    }

    /// Called whenever a heartbeat is received from `from_node`
    pub fn on_heartbeat(&self, from_node: u8, now_us: u32) {
        if self.active() && self.node_id.load() == from_node {
            self.deadline_us
                .store(now_us.wrapping_add(self.time_ms.load() as u32 * 1000));
            self.armed.store(true);
            self.timed_out.store(false);
        }
    }

    /// Called every process loop iteration; returns true the instant the deadline is crossed
    /// (edge-triggered -- only fires once per timeout)
    pub fn service(&self, now_us: u32) -> bool {
        if !self.active() || !self.armed.load() || self.timed_out.load() {
            return false;
        }
        if now_us.wrapping_sub(self.deadline_us.load()) as i32 >= 0 {
            self.timed_out.store(true);
            true
        } else {
            false
        }
    }

    pub fn monitored_node(&self) -> Option<u8> {
        self.active().then(|| self.node_id.load())
    }

    /// True if this slot's deadline has already been crossed without a subsequent heartbeat
    pub fn timed_out(&self) -> bool {
        self.timed_out.load()
    }

    fn raw_node_id(&self) -> u8 {
        self.node_id.load()
    }
}

/// Object 0x1017: the heartbeat producer time, in milliseconds; zero disables production
#[allow(missing_debug_implementations)]
pub struct HeartbeatProducerObject {
    nmt: &'static NmtSlave,
}

impl HeartbeatProducerObject {
    pub const fn new(nmt: &'static NmtSlave) -> Self {
        Self { nmt }
    }
}

impl ObjectRawAccess for HeartbeatProducerObject {
    fn read(&self, _sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        let bytes = self.nmt.heartbeat_period_ms().to_le_bytes();
        if offset >= bytes.len() {
            return Ok(0);
        }
        let n = buf.len().min(bytes.len() - offset);
        buf[..n].copy_from_slice(&bytes[offset..offset + n]);
        Ok(n)
    }

    fn write(&self, _sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        if data.len() != 2 {
            return Err(AbortCode::DataTypeMismatch);
        }
        self.nmt.set_heartbeat_period_ms(u16::from_le_bytes(data.try_into().unwrap()));
        Ok(())
    }

    fn object_code(&self) -> ObjectCode {
        ObjectCode::Var
    }

    fn sub_info(&self, _sub: u8) -> Result<SubInfo, AbortCode> {
        Ok(SubInfo::new_u16().rw_access())
    }
}

/// Enforce CiA 301's activation rule for a write to one slot of object 0x1016, considering every
/// other configured slot: a nonzero new time is refused if another slot already monitors the same
/// node-id; a zero new time always disables the slot (CiA 301 ss. 7.2.8.3.2)
fn validate_consumer_write(consumers: &[HbConsumer], idx: usize, packed: u32) -> Result<(), ()> {
    let node_id = ((packed >> 16) & 0xff) as u8;
    let time_ms = (packed & 0xffff) as u16;
    if time_ms != 0 && node_id != 0 {
        let conflict = consumers
            .iter()
            .enumerate()
            .any(|(i, c)| i != idx && c.raw_node_id() == node_id && c.raw_node_id() != 0);
        if conflict {
            return Err(());
        }
    }
    Ok(())
}

/// Object 0x1016: the fixed-size consumer slot array, with the activation rule enforced across the
/// whole table at write time (a single slot can't see its siblings on its own)
#[allow(missing_debug_implementations)]
pub struct HbConsumerTable {
    consumers: &'static [HbConsumer],
}

impl HbConsumerTable {
    pub const fn new(consumers: &'static [HbConsumer]) -> Self {
        Self { consumers }
    }
}

impl ObjectRawAccess for HbConsumerTable {
    fn read(&self, sub: u8, offset: usize, buf: &mut [u8]) -> Result<usize, AbortCode> {
        if sub == 0 {
            if offset != 0 || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.consumers.len() as u8;
            Ok(1)
        } else if (sub as usize) <= self.consumers.len() {
            let bytes = self.consumers[(sub - 1) as usize].packed().to_le_bytes();
            if offset >= bytes.len() {
                return Ok(0);
            }
            let n = buf.len().min(bytes.len() - offset);
            buf[..n].copy_from_slice(&bytes[offset..offset + n]);
            Ok(n)
        } else {
            Err(AbortCode::NoSuchSubIndex)
        }
    }

    fn write(&self, sub: u8, data: &[u8]) -> Result<(), AbortCode> {
        if sub == 0 {
            return Err(AbortCode::ReadOnly);
        }
        let idx = (sub - 1) as usize;
        if idx >= self.consumers.len() {
            return Err(AbortCode::NoSuchSubIndex);
        }
        if data.len() != 4 {
            return Err(AbortCode::DataTypeMismatch);
        }
        let packed = u32::from_le_bytes(data.try_into().unwrap());
        validate_consumer_write(self.consumers, idx, packed)
            .map_err(|_| AbortCode::IncompatibleParameter)?;
        self.consumers[idx].configure(packed);
        Ok(())
    }

    fn object_code(&self) -> ObjectCode {
        ObjectCode::Array
    }

    fn sub_info(&self, sub: u8) -> Result<SubInfo, AbortCode> {
        if sub == 0 {
            Ok(SubInfo::MAX_SUB_NUMBER)
        } else if (sub as usize) <= self.consumers.len() {
            Ok(SubInfo::new_u32().rw_access())
        } else {
            Err(AbortCode::NoSuchSubIndex)
        }
    }
}

/// True if `id` is the global NMT command COB-ID
pub fn is_nmt_command(id: CanId) -> bool {
    id == reserved::NMT_CMD
}

/// True if `id` falls in the heartbeat/bootup range and decodes the producing node-id
pub fn heartbeat_node_id(id: CanId) -> Option<u8> {
    let raw = id.raw();
    if (reserved::HEARTBEAT_BASE..=reserved::HEARTBEAT_BASE + 127).contains(&raw) {
        Some((raw - reserved::HEARTBEAT_BASE) as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_enters_pre_operational() {
        let nmt = NmtSlave::new();
        let node_id = NodeId::new(5).unwrap();
        nmt.boot(node_id, 0);
        assert_eq!(nmt.state(), NmtState::PreOperational);
    }

    #[test]
    fn start_command_enters_operational() {
        let nmt = NmtSlave::new();
        nmt.process_command(NmtCommand { cs: NmtCommandSpecifier::Start, target: 0 });
        assert_eq!(nmt.state(), NmtState::Operational);
        assert!(nmt.allowed().pdo);
    }

    #[test]
    fn reset_node_is_reported_not_applied_locally() {
        let nmt = NmtSlave::new();
        let action = nmt.process_command(NmtCommand { cs: NmtCommandSpecifier::ResetNode, target: 0 });
        assert_eq!(action, ResetAction::ResetNode);
    }

    #[test]
    fn heartbeat_consumer_times_out_once() {
        let hb = HbConsumer::new();
        hb.configure((5u32 << 16) | 100); // node 5, 100ms
        hb.on_heartbeat(5, 0);
        assert!(!hb.service(50_000));
        assert!(hb.service(100_001));
        // edge-triggered: stays quiet until re-armed by another heartbeat
        assert!(!hb.service(200_000));
    }

    #[test]
    fn heartbeat_consumer_ignores_other_nodes() {
        let hb = HbConsumer::new();
        hb.configure((5u32 << 16) | 100);
        hb.on_heartbeat(6, 0);
        assert!(!hb.armed.load());
    }

    #[test]
    fn consumer_table_rejects_duplicate_monitored_node() {
        static SLOTS: [HbConsumer; 2] = [HbConsumer::new(), HbConsumer::new()];
        let table = HbConsumerTable::new(&SLOTS);
        let packed = (5u32 << 16) | 100;
        table.write(1, &packed.to_le_bytes()).unwrap();
        let err = table.write(2, &packed.to_le_bytes()).unwrap_err();
        assert_eq!(err, AbortCode::IncompatibleParameter);
    }

    #[test]
    fn consumer_table_zero_time_always_allowed() {
        static SLOTS: [HbConsumer; 2] = [HbConsumer::new(), HbConsumer::new()];
        let table = HbConsumerTable::new(&SLOTS);
        let packed = 5u32 << 16;
        table.write(1, &packed.to_le_bytes()).unwrap();
        table.write(2, &packed.to_le_bytes()).unwrap();
    }
}
