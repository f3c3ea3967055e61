//! CAN frame and standard message definitions
//!
//! Only standard (11-bit) identifiers are modelled; the transport is expected to drop RTR frames
//! and never deliver extended frames to the core (see [`CanFrame`]).

use snafu::Snafu;

const MAX_DATA_LENGTH: usize = 8;

/// A standard 11-bit CAN identifier
///
/// Extended identifiers are explicitly out of scope for PDOs; everywhere an id is exchanged with
/// the core it is a bare 11-bit value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CanId(u16);

impl CanId {
    /// Build a CanId, truncating to 11 bits
    pub const fn new(id: u16) -> Self {
        CanId(id & 0x7ff)
    }

    /// The raw 11-bit value
    pub const fn raw(self) -> u16 {
        self.0
    }
}

/// A fixed-size CAN frame: an 11-bit id, a data length in 0..=8, and 8 bytes of which only the
/// first `dlc` are meaningful
#[derive(Clone, Copy, Debug)]
pub struct CanFrame {
    id: CanId,
    dlc: u8,
    data: [u8; MAX_DATA_LENGTH],
}

impl Default for CanFrame {
    fn default() -> Self {
        Self {
            id: CanId::new(0),
            dlc: 0,
            data: [0; MAX_DATA_LENGTH],
        }
    }
}

impl CanFrame {
    /// Build a frame from an id and payload; panics if `data` is longer than 8 bytes
    pub fn new(id: CanId, data: &[u8]) -> Self {
        assert!(data.len() <= MAX_DATA_LENGTH, "CAN payload exceeds 8 bytes");
        let mut buf = [0u8; MAX_DATA_LENGTH];
        buf[..data.len()].copy_from_slice(data);
        Self {
            id,
            dlc: data.len() as u8,
            data: buf,
        }
    }

    /// Build a zero-length frame, used for SYNC
    pub fn id_only(id: CanId) -> Self {
        Self { id, dlc: 0, ..Default::default() }
    }

    /// The frame's identifier
    pub fn id(&self) -> CanId {
        self.id
    }

    /// The number of valid bytes in `data`
    pub fn dlc(&self) -> u8 {
        self.dlc
    }

    /// The valid payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }
}

/// An error reported by a CAN controller on the bus
#[derive(Clone, Copy, Debug, Snafu)]
#[repr(u8)]
pub enum CanError {
    /// Transmitter detected a different bus value than it was driving, after arbitration
    Bit = 1,
    /// Six consecutive bits of the same polarity; a bit-stuffing violation
    Stuff = 2,
    /// A malformed frame (e.g. non-dominant SOF)
    Form = 3,
    /// No receiver acknowledged the frame
    Ack = 4,
    /// CRC mismatch
    Crc = 5,
    /// A recognized but otherwise unclassified error
    Other,
}

/// NMT lifecycle states, encoded as transmitted on the wire in heartbeat/bootup frames
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum NmtState {
    /// No valid state has been established yet (never transmitted)
    Invalid = 255,
    /// Node has just reset and has not yet produced its first bootup message
    Init = 0,
    /// Awaiting an NMT command to begin operation
    PreOperational = 127,
    /// Normal operation; PDO and SYNC frames are allowed
    Operational = 5,
    /// Node has been stopped; only NMT frames are allowed
    Stopped = 4,
}

impl NmtState {
    /// Decode a wire byte (heartbeat payload, masking off the toggle bit is the caller's job)
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            255 => Some(NmtState::Invalid),
            0 => Some(NmtState::Init),
            127 => Some(NmtState::PreOperational),
            5 => Some(NmtState::Operational),
            4 => Some(NmtState::Stopped),
            _ => None,
        }
    }

    /// The wire encoding of this state
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl core::fmt::Display for NmtState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            NmtState::Invalid => "Invalid",
            NmtState::Init => "Init",
            NmtState::PreOperational => "PreOperational",
            NmtState::Operational => "Operational",
            NmtState::Stopped => "Stopped",
        };
        f.write_str(s)
    }
}

/// NMT master command specifiers (CiA 301 table 81)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum NmtCommandSpecifier {
    /// Enter Operational
    Start = 1,
    /// Enter Stopped
    Stop = 2,
    /// Enter PreOperational
    EnterPreOp = 128,
    /// Perform a node (application) reset
    ResetNode = 129,
    /// Perform a communication reset
    ResetComm = 130,
}

impl NmtCommandSpecifier {
    /// Decode the command byte of an NMT master command frame
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Start),
            2 => Some(Self::Stop),
            128 => Some(Self::EnterPreOp),
            129 => Some(Self::ResetNode),
            130 => Some(Self::ResetComm),
            _ => None,
        }
    }
}

/// A decoded NMT master command frame
#[derive(Clone, Copy, Debug)]
pub struct NmtCommand {
    /// The requested transition or reset kind
    pub cs: NmtCommandSpecifier,
    /// Target node-id; 0 means "all nodes"
    pub target: u8,
}

impl NmtCommand {
    /// Decode from a frame's payload; the caller is responsible for checking the id is
    /// [`reserved::NMT_CMD`]
    pub fn from_payload(data: &[u8]) -> Option<Self> {
        if data.len() < 2 {
            return None;
        }
        Some(NmtCommand {
            cs: NmtCommandSpecifier::from_byte(data[0])?,
            target: data[1],
        })
    }

    /// Encode as a CAN frame addressed to [`reserved::NMT_CMD`]
    pub fn to_frame(self) -> CanFrame {
        CanFrame::new(reserved::NMT_CMD, &[self.cs as u8, self.target])
    }
}

/// A decoded heartbeat/bootup message
#[derive(Clone, Copy, Debug)]
pub struct Heartbeat {
    /// Producing node-id
    pub node_id: u8,
    /// Encoded NMT state
    pub state: NmtState,
}

impl Heartbeat {
    /// Encode as a one-byte CAN frame at `0x700 + node_id`
    pub fn to_frame(self) -> CanFrame {
        CanFrame::new(
            CanId::new(reserved::HEARTBEAT_BASE + self.node_id as u16),
            &[self.state.code()],
        )
    }

    /// Decode a heartbeat frame given its id was already matched against the heartbeat range
    pub fn from_frame(id: CanId, data: &[u8]) -> Option<Self> {
        if data.is_empty() {
            return None;
        }
        let node_id = (id.raw() - reserved::HEARTBEAT_BASE) as u8;
        let state = NmtState::from_code(data[0] & 0x7f)?;
        Some(Heartbeat { node_id, state })
    }
}

/// Reserved CAN identifiers (CiA 301 predefined connection set)
pub mod reserved {
    use super::CanId;

    /// NMT master command
    pub const NMT_CMD: CanId = CanId::new(0x000);
    /// Default SYNC COB-ID
    pub const SYNC: u16 = 0x080;
    /// Emergency base (add node-id)
    pub const EMCY_BASE: u16 = 0x080;
    /// SDO request (server rx) base (add node-id)
    pub const SDO_RX_BASE: u16 = 0x600;
    /// SDO response (server tx) base (add node-id)
    pub const SDO_TX_BASE: u16 = 0x580;
    /// Heartbeat/bootup base (add node-id); valid range is 0x701..=0x77f
    pub const HEARTBEAT_BASE: u16 = 0x700;
    /// LSS master request
    pub const LSS_REQ: CanId = CanId::new(0x7e5);
    /// LSS slave response
    pub const LSS_RESP: CanId = CanId::new(0x7e4);
}
