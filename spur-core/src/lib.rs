//! Spur gateway protocol engine.
//! Host-driven: no I/O; host passes radio frames, backend messages and ticks, and
//! receives actions.

pub mod alert;
pub mod config;
pub mod core;
pub mod display;
pub mod identity;
pub mod integrity;
pub mod messages;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod snapshot;
pub mod wakeup;
pub mod wire;

pub use config::{EngineConfig, ReincludePolicy};
pub use crate::core::{MessageError, OutboundAction, SpurCore};
pub use display::Directive;
pub use identity::{NodeId, ShortAddr};
pub use messages::{keepalive, ClientMessage, Notification};
pub use protocol::Function;
pub use snapshot::{Snapshot, SnapshotError};
pub use wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError};
