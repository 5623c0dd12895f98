//! Inclusion registry: node ID ⇄ short address, in-progress inclusions, button state.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::identity::{NodeId, ShortAddr};
use crate::protocol::{BEACON_ADDRESS, GRANT_ADDRESS, IDLE_STATE, UNADDRESSED};
use crate::snapshot::Snapshot;

/// Outcome of `grant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub address: ShortAddr,
    /// True when the address was allocated by this call.
    pub is_new: bool,
}

/// Outcome of `request_inclusion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InclusionRequest {
    /// First request: the backend should be asked to grant.
    New,
    /// The node asked again before finishing; its pending traffic is stale.
    Retry,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no short address left to allocate")]
    AddressSpaceExhausted,
}

#[derive(Debug, Default)]
pub struct Registry {
    addresses: HashMap<NodeId, ShortAddr>,
    nodes: HashMap<ShortAddr, NodeId>,
    max_addr: u16,
    including: HashSet<NodeId>,
    button_state: HashMap<ShortAddr, u8>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a validated snapshot. The inclusion set starts empty.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let addresses: HashMap<NodeId, ShortAddr> =
            snapshot.nodes.iter().map(|(&n, &a)| (n, a)).collect();
        let nodes = addresses.iter().map(|(&n, &a)| (a, n)).collect();
        Self {
            addresses,
            nodes,
            max_addr: snapshot.max_addr,
            including: HashSet::new(),
            button_state: snapshot
                .button_state
                .iter()
                .map(|(&a, &s)| (a, s))
                .collect(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            nodes: self
                .addresses
                .iter()
                .map(|(&n, &a)| (n, a))
                .collect::<BTreeMap<_, _>>(),
            max_addr: self.max_addr,
            button_state: self
                .button_state
                .iter()
                .map(|(&a, &s)| (a, s))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    /// Allocate an address for `node`, or return the one it already has.
    pub fn grant(&mut self, node: NodeId) -> Result<Grant, RegistryError> {
        if let Some(&address) = self.addresses.get(&node) {
            return Ok(Grant {
                address,
                is_new: false,
            });
        }
        let address = self.next_address()?;
        self.addresses.insert(node, address);
        self.nodes.insert(address, node);
        self.button_state.insert(address, IDLE_STATE);
        debug!(%node, %address, "allocated short address");
        Ok(Grant {
            address,
            is_new: true,
        })
    }

    fn next_address(&mut self) -> Result<ShortAddr, RegistryError> {
        let mut candidate = self.max_addr;
        loop {
            candidate = candidate
                .checked_add(1)
                .ok_or(RegistryError::AddressSpaceExhausted)?;
            let addr = ShortAddr(candidate);
            if addr != GRANT_ADDRESS && addr != BEACON_ADDRESS && addr != UNADDRESSED {
                self.max_addr = candidate;
                return Ok(addr);
            }
        }
    }

    pub fn request_inclusion(&mut self, node: NodeId) -> InclusionRequest {
        if self.including.insert(node) {
            InclusionRequest::New
        } else {
            InclusionRequest::Retry
        }
    }

    /// Returns false if the node was not mid-inclusion.
    pub fn finish_inclusion(&mut self, node: NodeId) -> bool {
        self.including.remove(&node)
    }

    /// Drop both directions of the mapping and the button state.
    pub fn forget(&mut self, node: NodeId) -> Option<ShortAddr> {
        let address = self.addresses.remove(&node)?;
        self.nodes.remove(&address);
        self.button_state.remove(&address);
        Some(address)
    }

    pub fn address_of(&self, node: NodeId) -> Option<ShortAddr> {
        self.addresses.get(&node).copied()
    }

    pub fn node_at(&self, address: ShortAddr) -> Option<NodeId> {
        self.nodes.get(&address).copied()
    }

    pub fn is_including(&self, node: NodeId) -> bool {
        self.including.contains(&node)
    }

    /// True if the node at `address` is mid-inclusion.
    pub fn is_including_at(&self, address: ShortAddr) -> bool {
        self.node_at(address)
            .map(|n| self.is_including(n))
            .unwrap_or(false)
    }

    pub fn button_state(&self, address: ShortAddr) -> Option<u8> {
        self.button_state.get(&address).copied()
    }

    pub fn record_button_state(&mut self, address: ShortAddr, state: u8) {
        self.button_state.insert(address, state);
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
