//! The node: wires the object dictionary, NMT/heartbeat, SYNC, PDO, SDO, LSS and storage
//! subsystems together behind a single `process()` entry point
//!
//! Every subsystem collaborator is a plain struct with interior-mutable (`AtomicCell`) state and a
//! const `new()`, meant to be declared as a `static` alongside the object dictionary table it backs
//! and handed to [`Node`] by `&'static` reference. `Node` itself carries no external `&mut` state
//! beyond the application's event sink, so [`Node::process`] only needs `&self`.

use core::cell::RefCell;

use canopen_common::can::{CanFrame, NmtCommand, NmtState};
use canopen_common::constants::values::TIMER_RESOLUTION_US;
use canopen_common::error::CanopenError;
use canopen_common::lss::LssRequest;
use canopen_common::node_id::NodeId;
use canopen_common::objects::ODEntry;
use canopen_common::traits::{CanReceiver, CanSender, NodeEvents, NullEvents};
use canopen_common::AtomicCell;

use crate::dictionary::{AsyncTriggerHook, Dictionary};
use crate::emcy::{Emcy, EmcyEvent};
use crate::lss::LssSlave;
use crate::nmt::{heartbeat_node_id, is_nmt_command, HbConsumer, NmtSlave, ResetAction};
use crate::pdo::Pdo;
use crate::sdo_server::SdoServer;
use crate::sync::Sync;
use crate::timer::{TimerId, TimerWheel};

/// Upper bound on the number of TPDOs a single node can drive through the timer wheel (each gets
/// an event-timer and an inhibit-timer slot); generous for a CiA 301 device, which typically
/// implements 4.
const MAX_WHEEL_TPDOS: usize = 16;
/// One heartbeat-producer slot, one SYNC-producer slot, plus an event- and inhibit-timer slot per
/// TPDO in [`MAX_WHEEL_TPDOS`].
const N_TIMER_ACTIONS: usize = 2 + 2 * MAX_WHEEL_TPDOS;
const N_TIMER_SLOTS: usize = N_TIMER_ACTIONS;

const TIMER_ARG_HEARTBEAT: u32 = 0;
const TIMER_ARG_SYNC: u32 = 1;
const TIMER_ARG_TPDO_EVENT_BASE: u32 = 2;
const TIMER_ARG_TPDO_INHIBIT_BASE: u32 = TIMER_ARG_TPDO_EVENT_BASE + MAX_WHEEL_TPDOS as u32;

/// Flags set by the wheel's bare `fn(u32)` callbacks, which carry only the `arg` they were created
/// with and so cannot reach back into a particular `Node`'s fields, and drained by [`Node::process`]
/// once [`TimerWheel::process`] returns -- the actual CAN I/O runs there, with the node's full
/// context, instead of from inside the callback.
static TIMER_DUE: [AtomicCell<bool>; N_TIMER_ACTIONS] =
    [const { AtomicCell::new(false) }; N_TIMER_ACTIONS];

fn mark_timer_due(arg: u32) {
    if let Some(flag) = TIMER_DUE.get(arg as usize) {
        flag.store(true);
    }
}

fn take_timer_due(arg: u32) -> bool {
    TIMER_DUE.get(arg as usize).map(|f| f.take()).unwrap_or(false)
}

type NodeTimerWheel = TimerWheel<N_TIMER_ACTIONS, N_TIMER_SLOTS>;

/// Every collaborator a [`Node`] is assembled from; the embedder builds one of these, typically out
/// of `static` items, and hands it to [`Node::new`]/[`Node::with_events`]
#[allow(missing_debug_implementations)]
pub struct NodeParts<'a> {
    pub object_dict: &'a [ODEntry<'a>],
    pub nmt: &'a NmtSlave,
    pub hb_consumers: &'a [HbConsumer],
    pub sync: &'a Sync,
    pub emcy: &'a Emcy,
    pub sdo: &'a SdoServer,
    pub lss: Option<&'a LssSlave>,
    pub tpdos: &'a [Pdo],
    pub rpdos: &'a [Pdo],
}

/// The assembled protocol engine for one CANopen node
///
/// `Ev` is the application's [`NodeEvents`] sink; it defaults to [`NullEvents`] for embedders that
/// don't need any of the notifications.
#[allow(missing_debug_implementations)]
pub struct Node<'a, Ev: NodeEvents = NullEvents> {
    node_id: AtomicCell<NodeId>,
    dict: RefCell<Dictionary<'a>>,
    nmt: &'a NmtSlave,
    hb_consumers: &'a [HbConsumer],
    sync: &'a Sync,
    emcy: &'a Emcy,
    sdo: &'a SdoServer,
    lss: Option<&'a LssSlave>,
    tpdos: &'a [Pdo],
    rpdos: &'a [Pdo],
    events: RefCell<Ev>,

    /// The tick-source/main-task split of CiA 301 ss. 4.1/5, collapsed into one `&self` struct: the
    /// wheel's `service()` side is caught up from elapsed `now_us` at the top of every
    /// [`Self::process`] call, and `process()` is then drained in the same call, since this crate
    /// has no separate interrupt context to call `service()` from.
    wheel: RefCell<NodeTimerWheel>,
    last_tick_us: AtomicCell<u32>,
    hb_timer: AtomicCell<Option<TimerId>>,
    /// The heartbeat period the wheel is currently armed for, so a write to object 0x1017 is
    /// noticed and re-armed on the next `process()` without polling `now_us` deltas
    hb_armed_period_ms: AtomicCell<u16>,
    sync_timer: AtomicCell<Option<TimerId>>,
    /// The SYNC period (in wheel ticks) the wheel is currently armed for; 0 means not producing
    sync_armed_ticks: AtomicCell<u32>,
    tpdo_event_timer: [AtomicCell<Option<TimerId>>; MAX_WHEEL_TPDOS],
    tpdo_event_armed_ms: [AtomicCell<u16>; MAX_WHEEL_TPDOS],
    tpdo_inhibit_timer: [AtomicCell<Option<TimerId>>; MAX_WHEEL_TPDOS],
}

/// `Node` is its own async-trigger hook: [`Dictionary::write_raw`]/`write_buffer` already set the
/// written object's event flag directly (see [`crate::dictionary`]), so the only thing left for the
/// hook to do is exist for callers (the SDO server) that require one.
impl<Ev: NodeEvents> AsyncTriggerHook for Node<'_, Ev> {
    fn trigger_by_object(&self, _index: u16) {}
}

impl<'a> Node<'a, NullEvents> {
    /// Build a node with no event sink
    pub fn new(node_id: NodeId, parts: NodeParts<'a>) -> Self {
        Self::with_events(node_id, parts, NullEvents)
    }
}

impl<'a, Ev: NodeEvents> Node<'a, Ev> {
    /// Build a node with an application-supplied event sink
    pub fn with_events(node_id: NodeId, parts: NodeParts<'a>, events: Ev) -> Self {
        Self {
            node_id: AtomicCell::new(node_id),
            dict: RefCell::new(Dictionary::new(parts.object_dict, node_id)),
            nmt: parts.nmt,
            hb_consumers: parts.hb_consumers,
            sync: parts.sync,
            emcy: parts.emcy,
            sdo: parts.sdo,
            lss: parts.lss,
            tpdos: parts.tpdos,
            rpdos: parts.rpdos,
            events: RefCell::new(events),
            wheel: RefCell::new(NodeTimerWheel::new()),
            last_tick_us: AtomicCell::new(0),
            hb_timer: AtomicCell::new(None),
            hb_armed_period_ms: AtomicCell::new(0),
            sync_timer: AtomicCell::new(None),
            sync_armed_ticks: AtomicCell::new(0),
            tpdo_event_timer: [const { AtomicCell::new(None) }; MAX_WHEEL_TPDOS],
            tpdo_event_armed_ms: [const { AtomicCell::new(0) }; MAX_WHEEL_TPDOS],
            tpdo_inhibit_timer: [const { AtomicCell::new(None) }; MAX_WHEEL_TPDOS],
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id.load()
    }

    pub fn nmt_state(&self) -> NmtState {
        self.nmt.state()
    }

    /// Read an object directly (outside the wire protocol), e.g. for an embedder's own application
    /// logic
    pub fn read_object(&self, index: u16, sub: u8, buf: &mut [u8]) -> Result<usize, CanopenError> {
        self.dict.borrow().read_buffer(index, sub, buf)
    }

    /// Write an object directly, fanning out to PDOs exactly as a bus-driven SDO write would
    pub fn write_object(&self, index: u16, sub: u8, data: &[u8]) -> Result<(), CanopenError> {
        self.dict.borrow().write_buffer(self, index, sub, data)
    }

    /// Run the object dictionary's `init` over every entry and transition Init -> PreOperational,
    /// sending the bootup frame
    pub fn start<S: CanSender>(&self, can_tx: &mut S, now_us: u32) -> Result<(), CanopenError> {
        self.dict.borrow().init()?;
        self.last_tick_us.store(now_us);
        let frame = self.nmt.boot(self.node_id.load(), now_us);
        let _ = can_tx.send(frame);
        Ok(())
    }

    /// One pass of the process loop (CiA 301 ss. 4.8): services the periodic producers (heartbeat,
    /// SYNC, async TPDO timers), then drains and routes one received frame
    pub fn process<S: CanSender, R: CanReceiver>(&self, can_tx: &mut S, can_rx: &mut R, now_us: u32) {
        self.service_periodic(can_tx, now_us);

        let Some(frame) = can_rx.try_recv() else {
            return;
        };
        self.route_frame(can_tx, frame, now_us);
    }

    fn route_frame<S: CanSender>(&self, can_tx: &mut S, frame: CanFrame, now_us: u32) {
        // LSS runs regardless of NMT state -- it's how an unconfigured node gets a node-id in the
        // first place.
        if let Some(lss) = self.lss {
            if frame.id() == canopen_common::can::reserved::LSS_REQ {
                if let Some(request) = LssRequest::from_payload(frame.data()) {
                    if let Some(response) = lss.process_request(request) {
                        self.node_id.store(lss.node_id());
                        self.dict.borrow_mut().set_node_id(lss.node_id());
                        let _ = can_tx.send(response);
                    }
                }
                return;
            }
        }

        let allowed = self.nmt.allowed();

        if allowed.sdo && self.sdo.matches(frame.id()) {
            let response = self.sdo.handle(&self.dict.borrow(), self, frame.data());
            let _ = can_tx.send(response);
            return;
        }

        if allowed.nmt {
            if is_nmt_command(frame.id()) {
                if let Some(cmd) = NmtCommand::from_payload(frame.data()) {
                    let for_me = cmd.target == 0
                        || NodeId::new(cmd.target)
                            .map(|id| id == self.node_id.load())
                            .unwrap_or(false);
                    if for_me {
                        self.apply_nmt_command(cmd);
                    }
                }
                return;
            }
            if let Some(from_node) = heartbeat_node_id(frame.id()) {
                self.service_heartbeat_consumer(from_node, now_us);
                return;
            }
        }

        if allowed.pdo {
            if let Some(rpdo) = self.rpdos.iter().find(|p| p.valid() && p.cob_id() == frame.id()) {
                self.receive_rpdo(rpdo, frame.data());
                return;
            }
        }

        if allowed.sync && frame.id() == self.sync.cob_id() {
            self.service_sync_consumers(can_tx);
            return;
        }

        self.events.borrow_mut().on_unhandled_frame(frame);
    }

    /// Apply a received RPDO payload: transmission type <= 240 means "hold until next SYNC",
    /// 254/255 means "apply immediately" (CiA 301 ss. 7.2.3 RPDO communication parameter)
    fn receive_rpdo(&self, rpdo: &Pdo, data: &[u8]) {
        if rpdo.transmission_type() <= 240 {
            let mut buf = [0u8; 8];
            let len = data.len().min(8);
            buf[..len].copy_from_slice(&data[..len]);
            rpdo.buffered_value.store(Some(buf));
        } else {
            rpdo.store_pdo_data(data);
        }
    }

    fn apply_nmt_command(&self, cmd: NmtCommand) {
        let old = self.nmt.state();
        match self.nmt.process_command(cmd) {
            ResetAction::None => {}
            ResetAction::ResetNode => {
                if self.dict.borrow().reset().is_ok() {
                    self.events.borrow_mut().on_restore(1);
                }
            }
            ResetAction::ResetComm => {
                self.sync.deactivate();
                self.wheel.borrow_mut().reset();
                self.hb_timer.store(None);
                self.hb_armed_period_ms.store(0);
                self.sync_timer.store(None);
                self.sync_armed_ticks.store(0);
                for i in 0..MAX_WHEEL_TPDOS {
                    self.tpdo_event_timer[i].store(None);
                    self.tpdo_event_armed_ms[i].store(0);
                    self.tpdo_inhibit_timer[i].store(None);
                }
            }
        }
        let new = self.nmt.state();
        if old != new {
            self.events.borrow_mut().on_nmt_state_change(old, new);
        }
    }

    fn service_heartbeat_consumer(&self, from_node: u8, now_us: u32) {
        for consumer in self.hb_consumers {
            if consumer.monitored_node() == Some(from_node) {
                let was_timed_out = consumer.timed_out();
                consumer.on_heartbeat(from_node, now_us);
                if was_timed_out {
                    self.events.borrow_mut().on_heartbeat_resumed(from_node);
                }
            }
        }
    }

    /// Advance the wheel's tick clock to `now_us` and drain whatever falls due: the heartbeat and
    /// SYNC producers, and every TPDO's inhibit/event timer. This is the §5 tick-source/main-task
    /// split collapsed into one call, since there is no separate interrupt context here to call
    /// [`TimerWheel::service`] from.
    fn service_periodic<S: CanSender>(&self, can_tx: &mut S, now_us: u32) {
        self.reconcile_heartbeat_timer();
        let allowed = self.nmt.allowed();
        self.reconcile_sync_timer(allowed.sync);
        self.reconcile_tpdo_event_timers();

        self.tick_wheel(now_us);
        self.wheel.borrow_mut().process();

        if take_timer_due(TIMER_ARG_HEARTBEAT) {
            let frame = self.nmt.heartbeat_frame(self.node_id.load());
            let _ = can_tx.send(frame);
        }

        if take_timer_due(TIMER_ARG_SYNC) {
            let _ = can_tx.send(self.sync.frame());
            self.service_sync_consumers(can_tx);
        }

        for consumer in self.hb_consumers {
            if consumer.service(now_us) {
                if let Some(node_id) = consumer.monitored_node() {
                    self.events.borrow_mut().on_heartbeat_timeout(node_id);
                }
            }
        }

        for i in 0..MAX_WHEEL_TPDOS.min(self.tpdos.len()) {
            if take_timer_due(TIMER_ARG_TPDO_EVENT_BASE + i as u32) && self.tpdos[i].valid() {
                self.request_tpdo_tx(i, can_tx);
            }
            if take_timer_due(TIMER_ARG_TPDO_INHIBIT_BASE + i as u32) {
                let tpdo = &self.tpdos[i];
                tpdo.clear_inhibit();
                if tpdo.take_pending_event() {
                    self.transmit_tpdo_now(i, can_tx);
                }
            }
        }

        if allowed.pdo {
            self.service_async_tpdos(can_tx);
        }
    }

    /// Advance `last_tick_us` to `now_us`, calling [`TimerWheel::service`] once per elapsed
    /// [`TIMER_RESOLUTION_US`] tick. Capped per call so a large `now_us` jump (e.g. the first call
    /// after a long idle gap) can't turn one `process()` into an unbounded loop; any ticks not
    /// caught up this call are picked up on the next one.
    fn tick_wheel(&self, now_us: u32) {
        const MAX_CATCHUP_TICKS: u32 = 10_000;
        let last = self.last_tick_us.load();
        let mut ticks = now_us.wrapping_sub(last) / TIMER_RESOLUTION_US;
        if ticks > MAX_CATCHUP_TICKS {
            ticks = MAX_CATCHUP_TICKS;
        }
        if ticks > 0 {
            let mut wheel = self.wheel.borrow_mut();
            for _ in 0..ticks {
                wheel.service();
            }
            drop(wheel);
            self.last_tick_us.store(last.wrapping_add(ticks * TIMER_RESOLUTION_US));
        }
    }

    /// (Re)arm the wheel's heartbeat-producer timer if object 0x1017 has changed since it was last
    /// armed
    fn reconcile_heartbeat_timer(&self) {
        let want_ms = self.nmt.heartbeat_period_ms();
        if want_ms == self.hb_armed_period_ms.load() {
            return;
        }
        if let Some(id) = self.hb_timer.take() {
            let _ = self.wheel.borrow_mut().delete(id);
        }
        self.hb_armed_period_ms.store(want_ms);
        if want_ms > 0 {
            let ticks = (want_ms as u32 * 1000) / TIMER_RESOLUTION_US;
            if ticks > 0 {
                if let Ok(id) = self.wheel.borrow_mut().create(ticks, ticks, mark_timer_due, TIMER_ARG_HEARTBEAT) {
                    self.hb_timer.store(Some(id));
                }
            }
        }
    }

    /// (Re)arm the wheel's SYNC-producer timer if object 0x1005/0x1006 or the NMT state's
    /// allowed-frames gate has changed since it was last armed
    fn reconcile_sync_timer(&self, sync_allowed: bool) {
        let want_ticks = if sync_allowed && self.sync.is_producing() {
            let cycle = self.sync.cycle_us();
            if cycle > 0 && cycle % TIMER_RESOLUTION_US == 0 {
                cycle / TIMER_RESOLUTION_US
            } else {
                0
            }
        } else {
            0
        };
        if want_ticks == self.sync_armed_ticks.load() {
            return;
        }
        if let Some(id) = self.sync_timer.take() {
            let _ = self.wheel.borrow_mut().delete(id);
        }
        self.sync_armed_ticks.store(want_ticks);
        if want_ticks > 0 {
            if let Ok(id) = self.wheel.borrow_mut().create(want_ticks, want_ticks, mark_timer_due, TIMER_ARG_SYNC) {
                self.sync_timer.store(Some(id));
            }
        }
    }

    /// (Re)arm each TPDO's event-timer (sub 5: maximum time between transmissions) if its
    /// configuration has changed since it was last armed
    fn reconcile_tpdo_event_timers(&self) {
        for i in 0..MAX_WHEEL_TPDOS.min(self.tpdos.len()) {
            let tpdo = &self.tpdos[i];
            let want_ms = if tpdo.valid() { tpdo.event_timer_ms() } else { 0 };
            if want_ms == self.tpdo_event_armed_ms[i].load() {
                continue;
            }
            if let Some(id) = self.tpdo_event_timer[i].take() {
                let _ = self.wheel.borrow_mut().delete(id);
            }
            self.tpdo_event_armed_ms[i].store(want_ms);
            if want_ms > 0 {
                let ticks = (want_ms as u32 * 1000) / TIMER_RESOLUTION_US;
                if ticks > 0 {
                    if let Ok(id) =
                        self.wheel.borrow_mut().create(ticks, ticks, mark_timer_due, TIMER_ARG_TPDO_EVENT_BASE + i as u32)
                    {
                        self.tpdo_event_timer[i].store(Some(id));
                    }
                }
            }
        }
    }

    /// Consume a SYNC event: flush every synchronous RPDO's buffer and fire every TPDO whose
    /// N-th-SYNC counter or pending event says it's due
    fn service_sync_consumers<S: CanSender>(&self, can_tx: &mut S) {
        for rpdo in self.rpdos.iter().filter(|p| p.valid() && p.transmission_type() <= 240) {
            if let Some(data) = rpdo.buffered_value.take() {
                rpdo.store_pdo_data(&data);
            }
        }
        for (i, tpdo) in self.tpdos.iter().enumerate() {
            if tpdo.valid() && tpdo.transmission_type() <= 240 && tpdo.sync_update() {
                self.request_tpdo_tx(i, can_tx);
            }
        }
    }

    /// Poll every async (event/timer-driven) TPDO's mapped objects for a pending event flag
    fn service_async_tpdos<S: CanSender>(&self, can_tx: &mut S) {
        for (i, tpdo) in self.tpdos.iter().enumerate() {
            if tpdo.valid() && tpdo.is_async() && tpdo.read_events() {
                self.request_tpdo_tx(i, can_tx);
            }
        }
    }

    /// A TPDO has something to send: transmit it now, or defer until the inhibit window (armed on
    /// the wheel by the previous transmission) closes
    fn request_tpdo_tx<S: CanSender>(&self, index: usize, can_tx: &mut S) {
        let tpdo = &self.tpdos[index];
        if tpdo.inhibit_active() {
            tpdo.set_pending_event();
        } else {
            self.transmit_tpdo_now(index, can_tx);
        }
    }

    /// Send a TPDO's frame and, if it has a nonzero inhibit time, arm the wheel to close the
    /// inhibit window after it
    fn transmit_tpdo_now<S: CanSender>(&self, index: usize, can_tx: &mut S) {
        let tpdo = &self.tpdos[index];
        let mut data = [0u8; 8];
        let len = tpdo.read_pdo_data(&mut data);
        let frame = CanFrame::new(tpdo.cob_id(), &data[..len]);
        if can_tx.send(frame).is_ok() {
            tpdo.clear_events();
            if index < MAX_WHEEL_TPDOS {
                let ticks = tpdo.inhibit_time_us() / TIMER_RESOLUTION_US;
                if ticks > 0 {
                    tpdo.start_inhibit();
                    if let Ok(id) =
                        self.wheel.borrow_mut().create(ticks, 0, mark_timer_due, TIMER_ARG_TPDO_INHIBIT_BASE + index as u32)
                    {
                        self.tpdo_inhibit_timer[index].store(Some(id));
                    }
                }
            }
        }
    }

    /// Raise an emergency and send the resulting frame
    pub fn raise_emcy<S: CanSender>(&self, can_tx: &mut S, event: EmcyEvent) {
        let frame = self.emcy.raise(event);
        let _ = can_tx.send(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopen_common::can::{reserved, CanError, CanId, NmtCommandSpecifier};

    extern crate std;
    use std::vec::Vec;

    struct VecSender(Vec<CanFrame>);
    impl CanSender for VecSender {
        fn send(&mut self, frame: CanFrame) -> Result<(), CanFrame> {
            self.0.push(frame);
            Ok(())
        }
    }

    struct QueueReceiver(Vec<CanFrame>);
    impl CanReceiver for QueueReceiver {
        type Error = CanError;
        fn try_recv(&mut self) -> Option<CanFrame> {
            if self.0.is_empty() {
                None
            } else {
                Some(self.0.remove(0))
            }
        }
        fn recv(&mut self, _timeout: core::time::Duration) -> Result<CanFrame, Self::Error> {
            self.try_recv().ok_or(CanError::Other)
        }
    }

    static NMT: NmtSlave = NmtSlave::new();
    static SYNC: Sync = Sync::new();
    static EMCY: Emcy = Emcy::new(CanId::new(0x081));
    static SDO: SdoServer = SdoServer::new(CanId::new(0x601), CanId::new(0x581));
    static HB_CONSUMERS: [HbConsumer; 1] = [HbConsumer::new()];
    static OD: [ODEntry; 0] = [];
    static TPDOS: [Pdo; 0] = [];
    static RPDOS: [Pdo; 0] = [];

    fn test_node() -> Node<'static, NullEvents> {
        Node::new(
            NodeId::new(1).unwrap(),
            NodeParts {
                object_dict: &OD,
                nmt: &NMT,
                hb_consumers: &HB_CONSUMERS,
                sync: &SYNC,
                emcy: &EMCY,
                sdo: &SDO,
                lss: None,
                tpdos: &TPDOS,
                rpdos: &RPDOS,
            },
        )
    }

    #[test]
    fn start_sends_bootup_and_enters_pre_operational() {
        let node = test_node();
        let mut tx = VecSender(Vec::new());
        node.start(&mut tx, 0).unwrap();
        assert_eq!(node.nmt_state(), NmtState::PreOperational);
        assert_eq!(tx.0.len(), 1);
        assert_eq!(tx.0[0].id(), CanId::new(reserved::HEARTBEAT_BASE + 1));
    }

    #[test]
    fn nmt_start_command_enters_operational() {
        let node = test_node();
        let mut tx = VecSender(Vec::new());
        node.start(&mut tx, 0).unwrap();
        let mut rx = QueueReceiver(Vec::from([NmtCommand { cs: NmtCommandSpecifier::Start, target: 0 }.to_frame()]));
        node.process(&mut tx, &mut rx, 1_000);
        assert_eq!(node.nmt_state(), NmtState::Operational);
    }

    #[test]
    fn unmatched_frame_reaches_event_sink() {
        struct RecordingEvents {
            seen: RefCell<Option<CanId>>,
        }
        impl NodeEvents for RecordingEvents {
            fn on_unhandled_frame(&mut self, frame: CanFrame) {
                *self.seen.borrow_mut() = Some(frame.id());
            }
        }

        let events = RecordingEvents { seen: RefCell::new(None) };
        let node = Node::with_events(
            NodeId::new(1).unwrap(),
            NodeParts {
                object_dict: &OD,
                nmt: &NMT,
                hb_consumers: &HB_CONSUMERS,
                sync: &SYNC,
                emcy: &EMCY,
                sdo: &SDO,
                lss: None,
                tpdos: &TPDOS,
                rpdos: &RPDOS,
            },
            events,
        );
        let mut tx = VecSender(Vec::new());
        node.start(&mut tx, 0).unwrap();
        let mut rx = QueueReceiver(Vec::from([NmtCommand { cs: NmtCommandSpecifier::Start, target: 0 }.to_frame()]));
        node.process(&mut tx, &mut rx, 1_000);

        let mut rx = QueueReceiver(Vec::from([CanFrame::new(CanId::new(0x234), &[1, 2, 3])]));
        node.process(&mut tx, &mut rx, 2_000);
        assert_eq!(node.events.borrow().seen.borrow().clone(), Some(CanId::new(0x234)));
    }

    #[test]
    fn heartbeat_producer_fires_after_period() {
        let node = test_node();
        let mut tx = VecSender(Vec::new());
        node.start(&mut tx, 0).unwrap();
        NMT.set_heartbeat_period_ms(100);
        tx.0.clear();
        let mut rx = QueueReceiver(Vec::new());
        node.process(&mut tx, &mut rx, 100_001);
        assert_eq!(tx.0.len(), 1);
        assert_eq!(tx.0[0].id(), CanId::new(reserved::HEARTBEAT_BASE + 1));
        NMT.set_heartbeat_period_ms(0);
    }
}
