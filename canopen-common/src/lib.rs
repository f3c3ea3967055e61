#![cfg_attr(not(feature = "std"), no_std)]
//! Shared message, object and error types used by both the node core and its embedder
//!
//! This crate has no notion of a "node" -- it is the wire format (CAN frames, NMT/heartbeat/SDO
//! messages), the object model (key, vtable, sub info) and the error taxonomy that
//! `canopen-node` builds the protocol engine on top of.

mod atomic_cell;
pub use atomic_cell::AtomicCell;

pub mod can;
pub mod constants;
pub mod error;
pub mod key;
pub mod lss;
pub mod node_id;
pub mod objects;
pub mod sdo;
pub mod traits;

pub use can::{CanError, CanFrame, CanId, Heartbeat, NmtCommand, NmtCommandSpecifier, NmtState};
pub use error::{CanopenError, CoResult};
pub use key::{Flags, ObjectKey, Width};
pub use node_id::NodeId;
