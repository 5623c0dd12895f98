//! Persisted node table: identity mapping, address high-water mark, button state.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::identity::{NodeId, ShortAddr};
use crate::integrity;

/// Snapshot of everything that must survive a restart. Queue, pending config and
/// the inclusion set are not persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub nodes: BTreeMap<NodeId, ShortAddr>,
    pub max_addr: u16,
    pub button_state: BTreeMap<ShortAddr, u8>,
}

impl Snapshot {
    /// bincode body sealed with a SHA-256 trailer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        let body = bincode::serialize(self)?;
        Ok(integrity::seal(&body))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let body = integrity::unseal(bytes).ok_or(SnapshotError::Corrupt)?;
        let snapshot: Snapshot = bincode::deserialize(body)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// The mapping must be a bijection and below the high-water mark.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        for (&node, &addr) in &self.nodes {
            if !seen.insert(addr) || addr.0 > self.max_addr {
                return Err(SnapshotError::Inconsistent { node, addr });
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot checksum mismatch or truncated")]
    Corrupt,
    #[error("snapshot encoding: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("snapshot maps node {node} to address {addr} twice or beyond the high-water mark")]
    Inconsistent { node: NodeId, addr: ShortAddr },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        let mut s = Snapshot {
            max_addr: 2,
            ..Default::default()
        };
        s.nodes.insert(NodeId(1001), ShortAddr(1));
        s.nodes.insert(NodeId(2002), ShortAddr(2));
        s.button_state.insert(ShortAddr(1), 0xFF);
        s.button_state.insert(ShortAddr(2), 0x01);
        s
    }

    #[test]
    fn bytes_roundtrip() {
        let s = sample();
        let bytes = s.to_bytes().unwrap();
        assert_eq!(Snapshot::from_bytes(&bytes).unwrap(), s);
    }

    #[test]
    fn corrupt_bytes_rejected() {
        let mut bytes = sample().to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            Snapshot::from_bytes(&bytes),
            Err(SnapshotError::Corrupt)
        ));
    }

    #[test]
    fn duplicate_address_rejected() {
        let mut s = sample();
        s.nodes.insert(NodeId(3003), ShortAddr(2));
        let bytes = s.to_bytes().unwrap();
        assert!(matches!(
            Snapshot::from_bytes(&bytes),
            Err(SnapshotError::Inconsistent { .. })
        ));
    }
}
