//! Engine settings supplied by the host.

use serde::{Deserialize, Serialize};

use crate::identity::ShortAddr;
use crate::protocol::DEFAULT_BEACON_EVERY;

/// What a repeated inclusion request does to a node's existing address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReincludePolicy {
    /// Purge the node's queued traffic and config but keep its address.
    #[default]
    KeepAddress,
    /// Also drop the address mapping, so the next grant allocates a fresh address.
    Forget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// This gateway's own short address: source of every frame, filter for inbound ones.
    pub address: ShortAddr,
    /// Fast ticks spent draining between beacons.
    pub beacon_every: u32,
    pub reinclude: ReincludePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            address: ShortAddr(0x0000),
            beacon_every: DEFAULT_BEACON_EVERY,
            reinclude: ReincludePolicy::KeepAddress,
        }
    }
}
