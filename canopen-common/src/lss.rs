//! Layer Setting Service wire types (CiA 305), slave side only
//!
//! LSS is a peripheral collaborator here: a node exposes a minimal responder that lets a master
//! assign a node-id to an otherwise unconfigured device. Fastscan and the node-id-inquiry
//! commands that address multiple candidates on the bus are not implemented; only the
//! switch-to-configuration-state-by-identity and set-node-id exchanges are.

use crate::can::{CanFrame, CanId};

/// LSS request command specifiers this responder understands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LssCommand {
    /// Switch all nodes into configuration state (global, unaddressed)
    SwitchGlobal = 4,
    /// Configure the node-id of the node currently in configuration state
    ConfigureNodeId = 17,
    /// Request the vendor id of the node in configuration state, part of identity switch
    InquireVendorId = 90,
}

impl LssCommand {
    /// Decode a request command byte
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            4 => Some(Self::SwitchGlobal),
            17 => Some(Self::ConfigureNodeId),
            90 => Some(Self::InquireVendorId),
            _ => None,
        }
    }
}

/// A decoded LSS master request
#[derive(Clone, Copy, Debug)]
pub enum LssRequest {
    /// Switch every node (mode=1) or no node (mode=0) into configuration state
    SwitchGlobal {
        /// 1 to enter configuration state, 0 to return to operation state
        mode: u8,
    },
    /// Assign a new node-id to the node currently in configuration state
    ConfigureNodeId {
        /// The node-id to assign, 1..=127 or 255 for unconfigured
        node_id: u8,
    },
}

impl LssRequest {
    /// Decode an LSS request frame's payload; the caller checks the id against
    /// [`crate::can::reserved::LSS_REQ`]
    pub fn from_payload(data: &[u8]) -> Option<Self> {
        if data.is_empty() {
            return None;
        }
        match LssCommand::from_byte(data[0])? {
            LssCommand::SwitchGlobal => {
                if data.len() < 2 {
                    return None;
                }
                Some(LssRequest::SwitchGlobal { mode: data[1] })
            }
            LssCommand::ConfigureNodeId => {
                if data.len() < 2 {
                    return None;
                }
                Some(LssRequest::ConfigureNodeId { node_id: data[1] })
            }
            LssCommand::InquireVendorId => None,
        }
    }
}

/// A decoded LSS slave response
#[derive(Clone, Copy, Debug)]
pub struct LssConfigureNodeIdResponse {
    /// 0 = success, 1 = node-id out of range
    pub error_code: u8,
}

impl LssConfigureNodeIdResponse {
    /// Encode as a CAN frame addressed to [`crate::can::reserved::LSS_RESP`]
    pub fn to_frame(self) -> CanFrame {
        CanFrame::new(CanId::new(crate::can::reserved::LSS_RESP.raw()), &[17, self.error_code, 0])
    }
}
