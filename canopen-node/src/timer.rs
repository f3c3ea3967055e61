//! Timer wheel
//!
//! Outstanding deadlines are kept as a singly-linked list of slots sorted by absolute expiry, each
//! slot storing only the delta from the slot before it. Multiple actions due at the same absolute
//! time share a slot. `service` (called from the tick source) decrements the head slot's delta and,
//! when it reaches zero, moves the whole slot into the elapsed list; `process` (called from the
//! application task) drains the elapsed list and runs callbacks.
//!
//! Both the slot pool and the action pool are fixed-capacity arrays sized by the embedder at
//! construction (`N_SLOTS`, `N_ACTIONS`); there is no allocation after `new`.

use canopen_common::error::CanopenError;

/// A scheduled callback: fires `cb(arg)` after its slot's cumulative delay elapses
#[derive(Clone, Copy)]
struct TimerAction {
    id: u32,
    /// Ticks to reschedule after firing; 0 means one-shot
    cycle_ticks: u32,
    callback: fn(u32),
    arg: u32,
    /// Index of next action sharing this action's slot, or `None`
    next: Option<usize>,
}

#[derive(Clone, Copy)]
struct TimerSlot {
    /// Ticks since the previous slot (or since `service` was last called, for the head slot)
    delta_ticks: u32,
    action_head: Option<usize>,
    action_tail: Option<usize>,
    /// Index of next slot (further in the future), or `None`
    next: Option<usize>,
}

/// A handle returned by [`TimerWheel::create`], used to [`TimerWheel::delete`] the action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(u32);

/// Fixed-capacity timer wheel driving single-shot and periodic callbacks off a shared tick clock
///
/// `N_ACTIONS` and `N_SLOTS` bound, respectively, the number of outstanding scheduled callbacks and
/// the number of distinct absolute expiry times in use at once; both are provided by the embedder.
pub struct TimerWheel<const N_ACTIONS: usize, const N_SLOTS: usize> {
    actions: [Option<TimerAction>; N_ACTIONS],
    slots: [Option<TimerSlot>; N_SLOTS],
    /// Head of the used (not-yet-elapsed) slot list, sorted by ascending absolute expiry
    used_head: Option<usize>,
    /// Head of the elapsed slot list, drained by `process`
    elapsed_head: Option<usize>,
    next_id: u32,
}

impl<const N_ACTIONS: usize, const N_SLOTS: usize> Default for TimerWheel<N_ACTIONS, N_SLOTS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N_ACTIONS: usize, const N_SLOTS: usize> TimerWheel<N_ACTIONS, N_SLOTS> {
    /// Create an empty wheel
    pub const fn new() -> Self {
        Self {
            actions: [None; N_ACTIONS],
            slots: [None; N_SLOTS],
            used_head: None,
            elapsed_head: None,
            next_id: 1,
        }
    }

    fn alloc_action(&mut self) -> Option<usize> {
        self.actions.iter().position(|a| a.is_none())
    }

    fn alloc_slot(&mut self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }

    /// Schedule `callback(arg)` to fire after `start` ticks; if `cycle > 0` it fires again every
    /// `cycle` ticks thereafter. `start == 0` reuses `cycle` as the first delay. Both zero is
    /// rejected with [`CanopenError::BadArg`].
    pub fn create(
        &mut self,
        start: u32,
        cycle: u32,
        callback: fn(u32),
        arg: u32,
    ) -> Result<TimerId, CanopenError> {
        let start = if start == 0 { cycle } else { start };
        if start == 0 {
            return Err(CanopenError::BadArg);
        }

        let action_idx = self.alloc_action().ok_or(CanopenError::TmrCreate)?;
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);

        self.insert_action(
            start,
            TimerAction {
                id,
                cycle_ticks: cycle,
                callback,
                arg,
                next: None,
            },
            action_idx,
        )?;

        Ok(TimerId(id))
    }

    /// Insert `action` (already assigned `action_idx`) so it fires after `delay` ticks from now
    fn insert_action(
        &mut self,
        delay: u32,
        action: TimerAction,
        action_idx: usize,
    ) -> Result<(), CanopenError> {
        let mut remaining = delay;
        let mut prev: Option<usize> = None;
        let mut cur = self.used_head;

        loop {
            match cur {
                None => {
                    // Append a new slot at the end
                    let slot_idx = self.alloc_slot().ok_or(CanopenError::TmrInsert)?;
                    self.slots[slot_idx] = Some(TimerSlot {
                        delta_ticks: remaining,
                        action_head: Some(action_idx),
                        action_tail: Some(action_idx),
                        next: None,
                    });
                    self.actions[action_idx] = Some(action);
                    self.link_slot(prev, slot_idx);
                    return Ok(());
                }
                Some(slot_idx) => {
                    let slot = self.slots[slot_idx].unwrap();
                    if remaining < slot.delta_ticks {
                        // Insert a new slot before this one
                        let new_idx = self.alloc_slot().ok_or(CanopenError::TmrInsert)?;
                        self.slots[new_idx] = Some(TimerSlot {
                            delta_ticks: remaining,
                            action_head: Some(action_idx),
                            action_tail: Some(action_idx),
                            next: Some(slot_idx),
                        });
                        self.actions[action_idx] = Some(action);
                        if let Some(s) = self.slots[slot_idx].as_mut() {
                            s.delta_ticks -= remaining;
                        }
                        self.link_slot(prev, new_idx);
                        return Ok(());
                    } else if remaining == slot.delta_ticks {
                        // Append to this slot's action list (FIFO: creation order)
                        self.actions[action_idx] = Some(action);
                        let tail = slot.action_tail;
                        if let Some(TimerAction { next, .. }) =
                            tail.and_then(|t| self.actions[t].as_mut())
                        {
                            *next = Some(action_idx);
                        }
                        if let Some(s) = self.slots[slot_idx].as_mut() {
                            s.action_tail = Some(action_idx);
                            if s.action_head.is_none() {
                                s.action_head = Some(action_idx);
                            }
                        }
                        return Ok(());
                    } else {
                        remaining -= slot.delta_ticks;
                        prev = Some(slot_idx);
                        cur = slot.next;
                    }
                }
            }
        }
    }

    fn link_slot(&mut self, prev: Option<usize>, slot_idx: usize) {
        match prev {
            None => self.used_head = Some(slot_idx),
            Some(p) => {
                if let Some(s) = self.slots[p].as_mut() {
                    s.next = Some(slot_idx);
                }
            }
        }
    }

    /// Cancel the action with `id`. Idempotent-safe: returns [`CanopenError::TmrDelete`] if `id` is
    /// unknown (already fired and removed, or never allocated).
    pub fn delete(&mut self, id: TimerId) -> Result<(), CanopenError> {
        // Search the used list for the action and unlink it, removing its slot if now empty
        let mut slot_cur = self.used_head;
        let mut slot_prev = None;
        while let Some(slot_idx) = slot_cur {
            let slot = self.slots[slot_idx].unwrap();
            let mut act_cur = slot.action_head;
            let mut act_prev: Option<usize> = None;
            while let Some(act_idx) = act_cur {
                let action = self.actions[act_idx].unwrap();
                if action.id == id.0 {
                    let next = action.next;
                    match act_prev {
                        None => {
                            if let Some(s) = self.slots[slot_idx].as_mut() {
                                s.action_head = next;
                            }
                        }
                        Some(p) => {
                            if let Some(a) = self.actions[p].as_mut() {
                                a.next = next;
                            }
                        }
                    }
                    if self.slots[slot_idx].unwrap().action_tail == Some(act_idx) {
                        if let Some(s) = self.slots[slot_idx].as_mut() {
                            s.action_tail = act_prev;
                        }
                    }
                    self.actions[act_idx] = None;

                    if self.slots[slot_idx].unwrap().action_head.is_none() {
                        self.remove_empty_slot(slot_prev, slot_idx);
                    }
                    return Ok(());
                }
                act_prev = Some(act_idx);
                act_cur = action.next;
            }
            slot_prev = Some(slot_idx);
            slot_cur = slot.next;
        }
        Err(CanopenError::TmrDelete)
    }

    fn remove_empty_slot(&mut self, prev: Option<usize>, slot_idx: usize) {
        let next = self.slots[slot_idx].unwrap().next;
        // Fold this slot's delta into the following slot, preserving absolute deadlines
        if let Some(next_idx) = next {
            let delta = self.slots[slot_idx].unwrap().delta_ticks;
            if let Some(n) = self.slots[next_idx].as_mut() {
                n.delta_ticks += delta;
            }
        }
        match prev {
            None => self.used_head = next,
            Some(p) => {
                if let Some(s) = self.slots[p].as_mut() {
                    s.next = next;
                }
            }
        }
        self.slots[slot_idx] = None;
    }

    /// Called from the tick source. Decrements the head slot's delta; when it reaches zero,
    /// detaches the slot into the elapsed list.
    pub fn service(&mut self) {
        if let Some(head_idx) = self.used_head {
            let fire = {
                let slot = self.slots[head_idx].as_mut().unwrap();
                slot.delta_ticks = slot.delta_ticks.saturating_sub(1);
                slot.delta_ticks == 0
            };
            if fire {
                let next = self.slots[head_idx].unwrap().next;
                self.used_head = next;
                if let Some(s) = self.slots[head_idx].as_mut() {
                    s.next = self.elapsed_head;
                }
                self.elapsed_head = Some(head_idx);
            }
        }
    }

    /// Called from the main loop. Drains the elapsed list, firing each action's callback exactly
    /// once, and re-inserts periodic actions.
    pub fn process(&mut self) {
        while let Some(slot_idx) = self.elapsed_head {
            let slot = self.slots[slot_idx].unwrap();
            self.elapsed_head = slot.next;
            self.slots[slot_idx] = None;

            let mut act_cur = slot.action_head;
            while let Some(act_idx) = act_cur {
                let action = self.actions[act_idx].unwrap();
                self.actions[act_idx] = None;
                (action.callback)(action.arg);
                if action.cycle_ticks > 0 {
                    if let Some(new_idx) = self.alloc_action() {
                        let _ = self.insert_action(
                            action.cycle_ticks,
                            TimerAction {
                                next: None,
                                ..action
                            },
                            new_idx,
                        );
                    }
                }
                act_cur = action.next;
            }
        }
    }

    /// Cancel every outstanding action and slot, for NMT reset-communication
    pub fn clear(&mut self) {
        self.actions = [None; N_ACTIONS];
        self.slots = [None; N_SLOTS];
        self.used_head = None;
        self.elapsed_head = None;
    }

    /// Alias for [`Self::clear`]
    pub fn reset(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    static FIRE_COUNT: AtomicU32 = AtomicU32::new(0);
    static LAST_ARG: AtomicU32 = AtomicU32::new(0);

    fn cb(arg: u32) {
        FIRE_COUNT.fetch_add(1, Ordering::SeqCst);
        LAST_ARG.store(arg, Ordering::SeqCst);
    }

    fn tick_n<const A: usize, const S: usize>(wheel: &mut TimerWheel<A, S>, n: u32) {
        for _ in 0..n {
            wheel.service();
            wheel.process();
        }
    }

    #[test]
    fn one_shot_fires_once_at_deadline() {
        FIRE_COUNT.store(0, Ordering::SeqCst);
        let mut wheel: TimerWheel<4, 4> = TimerWheel::new();
        wheel.create(5, 0, cb, 7).unwrap();
        tick_n(&mut wheel, 4);
        assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), 0);
        tick_n(&mut wheel, 1);
        assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), 1);
        assert_eq!(LAST_ARG.load(Ordering::SeqCst), 7);
        tick_n(&mut wheel, 10);
        assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn periodic_reschedules() {
        FIRE_COUNT.store(0, Ordering::SeqCst);
        let mut wheel: TimerWheel<4, 4> = TimerWheel::new();
        wheel.create(3, 3, cb, 0).unwrap();
        tick_n(&mut wheel, 9);
        assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn delete_cancels_pending_action() {
        FIRE_COUNT.store(0, Ordering::SeqCst);
        let mut wheel: TimerWheel<4, 4> = TimerWheel::new();
        let id = wheel.create(5, 0, cb, 0).unwrap();
        wheel.delete(id).unwrap();
        tick_n(&mut wheel, 10);
        assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn delete_unknown_id_errs() {
        let mut wheel: TimerWheel<4, 4> = TimerWheel::new();
        let id = wheel.create(5, 0, cb, 0).unwrap();
        wheel.delete(id).unwrap();
        assert!(wheel.delete(id).is_err());
    }

    #[test]
    fn both_zero_rejected() {
        let mut wheel: TimerWheel<4, 4> = TimerWheel::new();
        assert!(wheel.create(0, 0, cb, 0).is_err());
    }

    #[test]
    fn ties_fire_in_creation_order() {
        static ORDER: AtomicU32 = AtomicU32::new(0);
        fn cb_a(_arg: u32) {
            ORDER.fetch_or(0b01, Ordering::SeqCst);
        }
        fn cb_b(_arg: u32) {
            let prev = ORDER.fetch_or(0b10, Ordering::SeqCst);
            assert_eq!(prev & 0b01, 0b01, "cb_a must have fired first");
        }
        let mut wheel: TimerWheel<4, 4> = TimerWheel::new();
        wheel.create(5, 0, cb_a, 0).unwrap();
        wheel.create(5, 0, cb_b, 0).unwrap();
        tick_n(&mut wheel, 5);
        assert_eq!(ORDER.load(Ordering::SeqCst), 0b11);
    }
}
