//! Transport and embedder collaborator traits
//!
//! These are the explicit trait objects that stand in for the callback-style hooks the source
//! material implements as weak-symbol overrides: a CAN transport, and the handful of "the
//! application needs to know about this" notifications (fatal error, NMT state change, heartbeat
//! timeout, non-volatile storage).

use core::time::Duration;

use crate::can::{CanFrame, NmtState};
use crate::error::CanopenError;

/// A synchronous CAN sender
pub trait CanSender {
    /// Send a frame to the bus; returns the frame back on failure so the caller can retry or queue
    fn send(&mut self, frame: CanFrame) -> Result<(), CanFrame>;
}

/// A synchronous CAN receiver
pub trait CanReceiver {
    /// The error type returned by a blocking `recv`
    type Error;

    /// Read a frame immediately if one is available, otherwise return `None`
    fn try_recv(&mut self) -> Option<CanFrame>;

    /// Block for up to `timeout` waiting for a frame
    fn recv(&mut self, timeout: Duration) -> Result<CanFrame, Self::Error>;
}

/// An async CAN sender
pub trait AsyncCanSender: Send {
    /// Send a frame to the bus
    fn send(&mut self, frame: CanFrame) -> impl core::future::Future<Output = Result<(), CanFrame>>;
}

/// An async CAN receiver
pub trait AsyncCanReceiver: Send {
    /// The error type returned by a blocking `recv`
    type Error: core::fmt::Debug + Send;

    /// Read a frame immediately if one is available, otherwise return `None`
    fn try_recv(&mut self) -> Option<CanFrame>;

    /// Wait for the next frame
    fn recv(&mut self) -> impl core::future::Future<Output = Result<CanFrame, Self::Error>> + Send;

    /// Discard any buffered frames
    fn flush(&mut self) {
        while self.try_recv().is_some() {}
    }
}

/// Non-volatile storage used to persist and restore "save"-marked parameters
///
/// `group` identifies which parameter group is being saved/restored, following CiA 301's
/// "store parameters"/"restore default parameters" sub-index convention (1 = all parameters,
/// 2 = communication parameters, 3 = application parameters, ...).
pub trait NvStorage {
    /// Write `data` as the persisted image for `group`
    fn write(&mut self, group: u8, data: &[u8]) -> Result<(), CanopenError>;

    /// Read the persisted image for `group` into `buf`, returning the number of bytes written
    fn read(&mut self, group: u8, buf: &mut [u8]) -> Result<usize, CanopenError>;
}

/// Application notifications raised by the node core
///
/// Every method has a default no-op body; an embedder overrides only the events it cares about.
/// This plays the role the source material fills with weak-symbol callback overrides, made
/// explicit as a trait so an embedder is forced to opt in per event rather than silently missing
/// one.
pub trait NodeEvents {
    /// The node's NMT state changed
    fn on_nmt_state_change(&mut self, _old: NmtState, _new: NmtState) {}

    /// A monitored remote node's heartbeat was not received within its configured timeout
    fn on_heartbeat_timeout(&mut self, _node_id: u8) {}

    /// A monitored remote node resumed producing heartbeats after a timeout
    fn on_heartbeat_resumed(&mut self, _node_id: u8) {}

    /// An unrecoverable internal error occurred; the node has latched `error` and should be
    /// power-cycled or reset by the embedder
    fn on_fatal(&mut self, _error: CanopenError) {}

    /// "store parameters" was requested for `group`
    fn on_store(&mut self, _group: u8) {}

    /// "restore default parameters" was requested for `group`
    fn on_restore(&mut self, _group: u8) {}

    /// A received frame matched no protocol handler (wrong state, unmapped RPDO cob-id, ...) and is
    /// handed to the application as raw bus traffic
    fn on_unhandled_frame(&mut self, _frame: CanFrame) {}
}

/// A no-op implementation of [`NodeEvents`], used when an embedder has no need to observe any event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEvents;

impl NodeEvents for NullEvents {}
