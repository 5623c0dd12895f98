//! Wakeup negotiation: the interval embedded in every frame to a node.
//!
//! Nodes only listen for a short window after waking, so any frame to a node
//! that still has traffic coming must keep it awake (interval 0).

use std::collections::HashSet;
use std::time::Instant;

use tracing::debug;

use crate::identity::ShortAddr;
use crate::protocol::{CONFIG_SEND_DELAY, NORMAL_WAKEUP, PRESSED_STATE, PRESSED_WAKEUP};
use crate::scheduler::{Deferred, Task};

/// What the engine knows about a node when a frame to it is built.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeActivity {
    pub button_state: Option<u8>,
    pub pending_config: bool,
    pub including: bool,
    pub queued: bool,
}

/// Interval from the last button state alone.
pub fn base_interval(button_state: Option<u8>) -> u16 {
    if button_state == Some(PRESSED_STATE) {
        PRESSED_WAKEUP
    } else {
        NORMAL_WAKEUP
    }
}

#[derive(Debug, Default)]
pub struct WakeupScheduler {
    /// Addresses with a config send already deferred.
    scheduled: HashSet<ShortAddr>,
    deferred: Deferred,
}

impl WakeupScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interval for the next frame to `address`. Defers one config send per address
    /// when configuration is pending.
    pub fn compute(&mut self, address: ShortAddr, activity: NodeActivity, now: Instant) -> u16 {
        let mut wakeup = base_interval(activity.button_state);
        if activity.pending_config || activity.including || activity.queued {
            wakeup = 0;
        }
        if activity.pending_config && self.scheduled.insert(address) {
            debug!(%address, "deferring config send");
            self.deferred
                .schedule(now + CONFIG_SEND_DELAY, Task::SendConfig(address));
        }
        wakeup
    }

    pub fn take_due(&mut self, now: Instant) -> Vec<Task> {
        self.deferred.take_due(now)
    }

    /// Allow another config send to be deferred for `address`.
    pub fn clear(&mut self, address: ShortAddr) {
        self.scheduled.remove(&address);
    }

    pub fn is_scheduled(&self, address: ShortAddr) -> bool {
        self.scheduled.contains(&address)
    }
}
