//! Host-driven API: SpurCore receives radio frames, backend messages and ticks,
//! and returns actions for the host to perform.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::alert::{self, AlertEvent, UNREADABLE_ALERT};
use crate::config::{EngineConfig, ReincludePolicy};
use crate::display::{self, Directive};
use crate::identity::{NodeId, ShortAddr};
use crate::messages::{ClientMessage, Notification};
use crate::protocol::{
    Function, BEACON_ADDRESS, GRANT_ADDRESS, IDLE_STATE, PRESSED_WAKEUP, REPORTED_SIGNAL,
    UNADDRESSED,
};
use crate::queue::{AckOutcome, DeliveryQueue};
use crate::registry::{InclusionRequest, Registry, RegistryError};
use crate::scheduler::Task;
use crate::snapshot::Snapshot;
use crate::wakeup::{NodeActivity, WakeupScheduler};
use crate::wire::{self, Frame, FrameDecodeError, FrameEncodeError};

/// Action for host to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundAction {
    /// Hand the frame to the radio adaptor.
    Transmit(Vec<u8>),
    /// Send to the backend.
    Notify(Notification),
    /// Persist the node table.
    SaveState(Snapshot),
}

/// Main coordinator. Owns every table; all mutation goes through `&mut self`.
pub struct SpurCore {
    config: EngineConfig,
    registry: Registry,
    queue: DeliveryQueue,
    wakeup: WakeupScheduler,
    pending_config: HashMap<ShortAddr, Vec<Directive>>,
    beacon_count: u32,
}

impl SpurCore {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(config, Registry::new())
    }

    /// Start from a persisted node table.
    pub fn restore(config: EngineConfig, snapshot: &Snapshot) -> Self {
        Self::with_registry(config, Registry::from_snapshot(snapshot))
    }

    fn with_registry(config: EngineConfig, registry: Registry) -> Self {
        Self {
            config,
            registry,
            queue: DeliveryQueue::new(),
            wakeup: WakeupScheduler::new(),
            pending_config: HashMap::new(),
            beacon_count: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    pub fn pending_config(&self, address: ShortAddr) -> Option<&[Directive]> {
        self.pending_config.get(&address).map(Vec::as_slice)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.registry.snapshot()
    }

    /// Process one frame from the adaptor.
    pub fn on_radio_message(
        &mut self,
        bytes: &[u8],
        now: Instant,
    ) -> Result<Vec<OutboundAction>, MessageError> {
        let frame = wire::decode_frame(bytes)?;
        if frame.destination != self.config.address {
            return Ok(Vec::new());
        }
        let source = frame.source;
        let node = self.registry.node_at(source);
        if node.is_none() && source != UNADDRESSED {
            return Err(MessageError::UnallocatedAddress(source));
        }
        debug!(function = %frame.function, %source, frame = %hex::encode(bytes), "rx");

        let mut actions = Vec::new();
        match frame.function {
            Function::IncludeReq => {
                actions.extend(self.on_include_request(frame.include_node()?));
            }
            Function::Alert => {
                let node = node.ok_or(MessageError::UnallocatedAddress(source))?;
                actions.push(self.on_alert(source, node, &frame, now)?);
            }
            Function::WokenUp => {
                let node = node.ok_or(MessageError::UnallocatedAddress(source))?;
                let wakeup = self.compute_wakeup(source, now);
                self.enqueue(source, Function::Ack, wakeup, &[])?;
                actions.push(OutboundAction::Notify(Notification::WokenUp {
                    signal: REPORTED_SIGNAL,
                    source: node,
                }));
            }
            Function::Ack => self.on_ack(source)?,
            other => {
                warn!(%source, function = %other, code = other.code(), "undefined message");
            }
        }
        Ok(actions)
    }

    fn on_include_request(&mut self, node: NodeId) -> Vec<OutboundAction> {
        let mut actions = vec![OutboundAction::Notify(Notification::IncludeReq {
            include_req: node,
        })];
        match self.registry.request_inclusion(node) {
            InclusionRequest::New => debug!(%node, "inclusion requested"),
            InclusionRequest::Retry => {
                info!(%node, "repeated inclusion request, purging node state");
                if self.remove_node_messages(node) {
                    actions.push(OutboundAction::SaveState(self.snapshot()));
                }
            }
        }
        actions
    }

    fn on_alert(
        &mut self,
        source: ShortAddr,
        node: NodeId,
        frame: &Frame<'_>,
        now: Instant,
    ) -> Result<OutboundAction, MessageError> {
        let code = frame.alert_code().unwrap_or_else(|| {
            warn!(%source, "alert without a readable code");
            UNREADABLE_ALERT
        });
        let notification = match alert::decode_alert(code) {
            AlertEvent::Battery { level } => {
                debug!(%node, level, "battery level");
                Notification::Battery {
                    value: level,
                    signal: REPORTED_SIGNAL,
                    source: node,
                }
            }
            AlertEvent::Button { code, kind, state } => {
                debug!(%node, kind = kind.name(), "button alert");
                self.registry.record_button_state(source, state);
                Notification::Alert {
                    alert_type: code,
                    signal: REPORTED_SIGNAL,
                    source: node,
                }
            }
        };
        let wakeup = self.compute_wakeup(source, now);
        self.enqueue(source, Function::Ack, wakeup, &[])?;
        Ok(OutboundAction::Notify(notification))
    }

    /// On the last ack of a burst, tell the node to sleep briefly rather than for the
    /// full interval announced before its traffic was queued.
    fn on_ack(&mut self, source: ShortAddr) -> Result<(), MessageError> {
        match self.queue.on_ack(source) {
            AckOutcome::Spurious => {
                warn!(%source, "ack does not correspond to a sent message");
            }
            AckOutcome::Released { more_pending } => {
                debug!(%source, more_pending, "ack");
                if !more_pending && !self.registry.is_including_at(source) {
                    self.enqueue(source, Function::Ack, PRESSED_WAKEUP, &[])?;
                }
            }
        }
        Ok(())
    }

    /// Process one message from the backend.
    pub fn on_client_message(
        &mut self,
        message: ClientMessage,
    ) -> Result<Vec<OutboundAction>, MessageError> {
        let mut actions = Vec::new();
        match message {
            ClientMessage::IncludeGrant { node } => {
                let grant = self.registry.grant(node)?;
                if grant.is_new {
                    info!(%node, address = %grant.address, "node included");
                    actions.push(OutboundAction::SaveState(self.snapshot()));
                }
                let mut payload = Vec::with_capacity(6);
                payload.extend_from_slice(&node.to_be_bytes());
                payload.extend_from_slice(&grant.address.to_be_bytes());
                // Granted nodes keep listening so the config can follow.
                let frame = self.encode(GRANT_ADDRESS, Function::IncludeGrant, 0, &payload)?;
                self.queue
                    .enqueue(frame, grant.address, Function::IncludeGrant);
            }
            ClientMessage::Config { node, config } => {
                let address = self
                    .registry
                    .address_of(node)
                    .ok_or(MessageError::UnknownNode(node))?;
                let directives = display::parse_directives(&config);
                debug!(%node, %address, directives = directives.len(), "config pending");
                self.pending_config.insert(address, directives);
            }
        }
        Ok(actions)
    }

    /// Fast tick: run due deferred work, then either beacon or drain the queue.
    pub fn tick(&mut self, now: Instant) -> Vec<OutboundAction> {
        for task in self.wakeup.take_due(now) {
            match task {
                Task::SendConfig(address) => self.send_config(address),
            }
        }

        if self.beacon_count >= self.config.beacon_every {
            self.beacon_count = 0;
            return match self.encode(BEACON_ADDRESS, Function::Beacon, 0, &[]) {
                Ok(frame) => vec![OutboundAction::Transmit(frame)],
                Err(e) => {
                    warn!(error = %e, "failed to encode beacon");
                    Vec::new()
                }
            };
        }
        self.beacon_count += 1;

        self.queue
            .drain(now)
            .into_iter()
            .map(|frame| {
                debug!(frame = %hex::encode(&frame), "tx");
                OutboundAction::Transmit(frame)
            })
            .collect()
    }

    /// Wakeup interval for the next frame to `address`.
    pub fn compute_wakeup(&mut self, address: ShortAddr, now: Instant) -> u16 {
        let activity = NodeActivity {
            button_state: self.registry.button_state(address),
            pending_config: self.pending_config.contains_key(&address),
            including: self.registry.is_including_at(address),
            queued: self.queue.targets(address),
        };
        self.wakeup.compute(address, activity, now)
    }

    /// Ask a node for a battery reading on its next wake.
    pub fn request_battery(&mut self, address: ShortAddr, now: Instant) -> Result<(), MessageError> {
        if self.registry.node_at(address).is_none() {
            return Err(MessageError::UnallocatedAddress(address));
        }
        let wakeup = self.compute_wakeup(address, now);
        self.enqueue(address, Function::SendBattery, wakeup, &[])
    }

    /// Deferred config send. No-op if the config was purged in the meantime.
    fn send_config(&mut self, address: ShortAddr) {
        self.wakeup.clear(address);
        let Some(directives) = self.pending_config.remove(&address) else {
            debug!(%address, "no pending config, nothing to send");
            return;
        };
        for payload in display::encode(&directives) {
            debug!(%address, payload = %hex::encode(&payload), "queueing config");
            if let Err(e) = self.enqueue(address, Function::Config, 0, &payload) {
                warn!(%address, error = %e, "config payload dropped");
            }
        }
        let Some(node) = self.registry.node_at(address) else {
            return;
        };
        if self.registry.finish_inclusion(node) {
            info!(%node, %address, "inclusion complete");
            if let Err(e) = self.enqueue(address, Function::Start, PRESSED_WAKEUP, &[]) {
                warn!(%address, error = %e, "start frame dropped");
            }
        }
    }

    /// Purge everything queued or pending for a node that asked to be included again.
    /// Returns true if persisted state (mapping or button state) changed.
    pub fn remove_node_messages(&mut self, node: NodeId) -> bool {
        let Some(address) = self.registry.address_of(node) else {
            return false;
        };
        let dropped = self.queue.remove_destination(address);
        self.pending_config.remove(&address);
        self.wakeup.clear(address);
        debug!(%node, %address, dropped, "removed node messages");
        match self.config.reinclude {
            ReincludePolicy::KeepAddress => {
                let changed = self.registry.button_state(address) != Some(IDLE_STATE);
                self.registry.record_button_state(address, IDLE_STATE);
                changed
            }
            ReincludePolicy::Forget => self.registry.forget(node).is_some(),
        }
    }

    fn encode(
        &self,
        destination: ShortAddr,
        function: Function,
        wakeup: u16,
        payload: &[u8],
    ) -> Result<Vec<u8>, FrameEncodeError> {
        wire::encode_frame(destination, self.config.address, function, wakeup, payload)
    }

    fn enqueue(
        &mut self,
        destination: ShortAddr,
        function: Function,
        wakeup: u16,
        payload: &[u8],
    ) -> Result<(), MessageError> {
        let frame = self.encode(destination, function, wakeup, payload)?;
        self.queue.enqueue(frame, destination, function);
        Ok(())
    }
}

impl Default for SpurCore {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("malformed frame: {0}")]
    Decode(#[from] FrameDecodeError),
    #[error("frame encoding failed: {0}")]
    Encode(#[from] FrameEncodeError),
    #[error("frame from unallocated address {0}")]
    UnallocatedAddress(ShortAddr),
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{NORMAL_WAKEUP, PRESSED_STATE};
    use serde_json::json;
    use std::time::Duration;

    fn inbound(source: u16, function: Function, payload: &[u8]) -> Vec<u8> {
        let mut v = vec![0x00, 0x00];
        v.extend_from_slice(&source.to_be_bytes());
        v.push(function.code());
        v.push(4 + payload.len() as u8);
        v.extend_from_slice(&[0, 0, 0, 0]);
        v.extend_from_slice(payload);
        v
    }

    fn include_req(node: u32) -> Vec<u8> {
        inbound(0, Function::IncludeReq, &node.to_be_bytes())
    }

    fn transmitted(actions: &[OutboundAction]) -> Vec<Vec<u8>> {
        actions
            .iter()
            .filter_map(|a| match a {
                OutboundAction::Transmit(f) => Some(f.clone()),
                _ => None,
            })
            .collect()
    }

    fn wakeup_of(frame: &[u8]) -> u16 {
        u16::from_be_bytes([frame[10], frame[11]])
    }

    fn config_msg(node: u32, config: serde_json::Value) -> ClientMessage {
        ClientMessage::Config {
            node: NodeId(node),
            config: config.as_object().unwrap().clone(),
        }
    }

    /// Include node `id` and return its address, with the grant still queued.
    fn included(core: &mut SpurCore, id: u32, now: Instant) -> ShortAddr {
        core.on_radio_message(&include_req(id), now).unwrap();
        core.on_client_message(ClientMessage::IncludeGrant { node: NodeId(id) })
            .unwrap();
        core.registry().address_of(NodeId(id)).unwrap()
    }

    #[test]
    fn inclusion_request_then_grant() {
        let mut core = SpurCore::default();
        let now = Instant::now();
        let actions = core.on_radio_message(&include_req(1001), now).unwrap();
        assert_eq!(
            actions,
            vec![OutboundAction::Notify(Notification::IncludeReq {
                include_req: NodeId(1001)
            })]
        );
        assert!(core.registry().is_including(NodeId(1001)));

        let actions = core
            .on_client_message(ClientMessage::IncludeGrant {
                node: NodeId(1001),
            })
            .unwrap();
        assert!(matches!(actions.as_slice(), [OutboundAction::SaveState(s)] if s.nodes.len() == 1));
        assert_eq!(core.registry().address_of(NodeId(1001)), Some(ShortAddr(1)));
        assert_eq!(core.registry().node_at(ShortAddr(1)), Some(NodeId(1001)));
        assert_eq!(core.registry().button_state(ShortAddr(1)), Some(IDLE_STATE));

        let frames = transmitted(&core.tick(now));
        assert_eq!(frames.len(), 1);
        let grant = &frames[0];
        assert_eq!(&grant[0..2], &[0xBB, 0x00]);
        assert_eq!(grant[4], Function::IncludeGrant.code());
        assert_eq!(wakeup_of(grant), 0);
        assert_eq!(&grant[12..16], &1001u32.to_be_bytes());
        assert_eq!(&grant[16..18], &[0x00, 0x01]);
        assert!(core.queue().in_flight(ShortAddr(1)));
    }

    #[test]
    fn repeated_grant_does_not_save_again() {
        let mut core = SpurCore::default();
        let now = Instant::now();
        included(&mut core, 5, now);
        let actions = core
            .on_client_message(ClientMessage::IncludeGrant { node: NodeId(5) })
            .unwrap();
        assert!(actions.is_empty());
        assert_eq!(core.registry().len(), 1);
        assert_eq!(core.queue().len(), 2);
    }

    #[test]
    fn inclusion_retry_purges_but_keeps_address() {
        let mut core = SpurCore::default();
        let now = Instant::now();
        let addr = included(&mut core, 1001, now);
        core.on_client_message(config_msg(1001, json!({"name": "Kitchen"})))
            .unwrap();
        core.tick(now);
        assert!(core.pending_config(addr).is_some());

        let actions = core.on_radio_message(&include_req(1001), now).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(!core.queue().targets(addr));
        assert!(!core.queue().in_flight(addr));
        assert!(core.pending_config(addr).is_none());
        assert_eq!(core.registry().address_of(NodeId(1001)), Some(addr));
        assert_eq!(core.registry().node_at(addr), Some(NodeId(1001)));
        assert!(core.registry().is_including(NodeId(1001)));
    }

    #[test]
    fn forget_policy_drops_mapping() {
        let mut core = SpurCore::new(EngineConfig {
            reinclude: ReincludePolicy::Forget,
            ..Default::default()
        });
        let now = Instant::now();
        included(&mut core, 1001, now);
        let actions = core.on_radio_message(&include_req(1001), now).unwrap();
        assert!(matches!(actions.last(), Some(OutboundAction::SaveState(s)) if s.nodes.is_empty()));
        assert_eq!(core.registry().address_of(NodeId(1001)), None);
        core.on_client_message(ClientMessage::IncludeGrant {
            node: NodeId(1001),
        })
        .unwrap();
        assert_eq!(core.registry().address_of(NodeId(1001)), Some(ShortAddr(2)));
    }

    #[test]
    fn wakeup_zero_with_pending_config() {
        let mut core = SpurCore::default();
        let now = Instant::now();
        let addr = included(&mut core, 7, now);
        core.registry.finish_inclusion(NodeId(7));
        core.queue.remove_destination(addr);
        core.registry.record_button_state(addr, PRESSED_STATE);
        assert_eq!(core.compute_wakeup(addr, now), PRESSED_WAKEUP);
        core.on_client_message(config_msg(7, json!({"app_value": 1})))
            .unwrap();
        assert_eq!(core.compute_wakeup(addr, now), 0);
        core.registry.record_button_state(addr, 0x00);
        assert_eq!(core.compute_wakeup(addr, now), 0);
    }

    #[test]
    fn button_alert_recorded_and_acked() {
        let mut core = SpurCore::default();
        let now = Instant::now();
        let addr = included(&mut core, 9, now);
        core.registry.finish_inclusion(NodeId(9));
        core.queue.remove_destination(addr);

        let actions = core
            .on_radio_message(&inbound(addr.0, Function::Alert, &[0x00, 0x01]), now)
            .unwrap();
        assert_eq!(
            actions,
            vec![OutboundAction::Notify(Notification::Alert {
                alert_type: 0x0001,
                signal: 5,
                source: NodeId(9)
            })]
        );
        assert_eq!(core.registry().button_state(addr), Some(PRESSED_STATE));
        let frames = transmitted(&core.tick(now));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][4], Function::Ack.code());
        assert_eq!(wakeup_of(&frames[0]), PRESSED_WAKEUP);
        assert!(core.queue().is_empty());

        core.on_radio_message(&inbound(addr.0, Function::Alert, &[0x00, 0x00]), now)
            .unwrap();
        let frames = transmitted(&core.tick(now));
        assert_eq!(wakeup_of(&frames[0]), NORMAL_WAKEUP);
    }

    #[test]
    fn battery_alert_reported() {
        let mut core = SpurCore::default();
        let now = Instant::now();
        let addr = included(&mut core, 9, now);
        let actions = core
            .on_radio_message(&inbound(addr.0, Function::Alert, &[0x02, 0x05]), now)
            .unwrap();
        match &actions[..] {
            [OutboundAction::Notify(Notification::Battery { value, signal, source })] => {
                assert!((value - 0.5 * 0.235668).abs() < 1e-12);
                assert_eq!(*signal, 5);
                assert_eq!(*source, NodeId(9));
            }
            other => panic!("unexpected actions {other:?}"),
        }
        assert_eq!(core.registry().button_state(addr), Some(IDLE_STATE));
    }

    #[test]
    fn full_inclusion_and_config_flow() {
        let mut core = SpurCore::default();
        let t0 = Instant::now();
        let addr = included(&mut core, 1001, t0);
        core.tick(t0);

        // Grant acked while including: no closing ack.
        assert!(core.on_radio_message(&inbound(addr.0, Function::Ack, &[]), t0).unwrap().is_empty());
        assert!(core.queue().is_empty());

        core.on_client_message(config_msg(1001, json!({"name": "Kitchen", "app_value": 3})))
            .unwrap();
        let actions = core
            .on_radio_message(&inbound(addr.0, Function::WokenUp, &[]), t0)
            .unwrap();
        assert!(matches!(
            actions.as_slice(),
            [OutboundAction::Notify(Notification::WokenUp { source: NodeId(1001), .. })]
        ));

        let frames = transmitted(&core.tick(t0));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][4], Function::Ack.code());
        assert_eq!(wakeup_of(&frames[0]), 0);

        // Deferred send runs one second later; first config frame goes out.
        let t1 = t0 + Duration::from_secs(1);
        let frames = transmitted(&core.tick(t1));
        assert_eq!(frames.len(), 1);
        let config = &frames[0];
        assert_eq!(config[4], Function::Config.code());
        assert_eq!(wakeup_of(config), 0);
        assert!(config.windows(8).any(|w| w == b"Kitchen\0"));
        assert!(config.ends_with(b"ES"));
        assert!(core.pending_config(addr).is_none());
        assert!(!core.registry().is_including(NodeId(1001)));
        assert_eq!(core.queue().len(), 3);

        core.on_radio_message(&inbound(addr.0, Function::Ack, &[]), t1).unwrap();
        let frames = transmitted(&core.tick(t1));
        assert_eq!(&frames[0][12..], &[b'A', 3]);
        core.on_radio_message(&inbound(addr.0, Function::Ack, &[]), t1).unwrap();
        let frames = transmitted(&core.tick(t1));
        assert_eq!(frames[0][4], Function::Start.code());
        assert_eq!(wakeup_of(&frames[0]), PRESSED_WAKEUP);

        // Last ack: closing ack with the short interval.
        core.on_radio_message(&inbound(addr.0, Function::Ack, &[]), t1).unwrap();
        let frames = transmitted(&core.tick(t1));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][4], Function::Ack.code());
        assert_eq!(wakeup_of(&frames[0]), PRESSED_WAKEUP);
        assert!(core.queue().is_empty());
    }

    #[test]
    fn purged_config_send_is_noop() {
        let mut core = SpurCore::default();
        let t0 = Instant::now();
        let addr = included(&mut core, 3, t0);
        core.on_client_message(config_msg(3, json!({"D1": "hi"}))).unwrap();
        core.compute_wakeup(addr, t0);
        core.on_radio_message(&include_req(3), t0).unwrap();
        assert!(core.queue().is_empty());
        let frames = transmitted(&core.tick(t0 + Duration::from_secs(2)));
        assert!(frames.is_empty());
        assert!(core.queue().is_empty());
    }

    #[test]
    fn retry_budget_exhausted() {
        let mut core = SpurCore::default();
        let t0 = Instant::now();
        let addr = included(&mut core, 4, t0);
        let mut sends = 0;
        for s in 0..60u64 {
            let frames = transmitted(&core.tick(t0 + Duration::from_secs(s)));
            sends += frames.iter().filter(|f| f[4] == Function::IncludeGrant.code()).count();
        }
        assert_eq!(sends, 4);
        assert!(!core.queue().targets(addr));
        assert!(!core.queue().in_flight(addr));
    }

    #[test]
    fn beacon_every_seventh_tick() {
        let mut core = SpurCore::default();
        let now = Instant::now();
        for _ in 0..6 {
            assert!(core.tick(now).is_empty());
        }
        let frames = transmitted(&core.tick(now));
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][0..2], &[0xBB, 0xBB]);
        assert_eq!(wire::decode_frame(&frames[0]).unwrap().function, Function::Beacon);
        assert!(core.tick(now).is_empty());
    }

    #[test]
    fn retry_after_press_saves_reset_button_state() {
        let mut core = SpurCore::default();
        let now = Instant::now();
        let addr = included(&mut core, 21, now);
        core.on_radio_message(&inbound(addr.0, Function::Alert, &[0x00, 0x01]), now)
            .unwrap();
        assert_eq!(core.registry().button_state(addr), Some(PRESSED_STATE));

        let actions = core.on_radio_message(&include_req(21), now).unwrap();
        match actions.last() {
            Some(OutboundAction::SaveState(s)) => {
                assert_eq!(s.button_state.get(&addr), Some(&IDLE_STATE));
                assert_eq!(s.nodes.get(&NodeId(21)), Some(&addr));
            }
            other => panic!("expected a save, got {other:?}"),
        }
    }

    #[test]
    fn long_screen_still_queued() {
        let mut core = SpurCore::default();
        let t0 = Instant::now();
        let addr = included(&mut core, 1001, t0);
        let text = format!("{}\n{}\n{}", "A".repeat(90), "B".repeat(90), "C".repeat(90));
        core.on_client_message(config_msg(1001, json!({ "D1": text })))
            .unwrap();
        core.compute_wakeup(addr, t0);
        core.tick(t0 + Duration::from_secs(2));
        let configs: Vec<_> = core
            .queue()
            .iter()
            .filter(|e| e.function == Function::Config)
            .collect();
        assert_eq!(configs.len(), 1);
        assert!(configs[0].frame.ends_with(b"ES"));
        assert!(core.queue().iter().any(|e| e.function == Function::Start));
        assert!(core.pending_config(addr).is_none());
    }

    #[test]
    fn frames_for_other_gateways_ignored() {
        let mut core = SpurCore::default();
        let mut frame = include_req(1);
        frame[1] = 0x07;
        assert!(core.on_radio_message(&frame, Instant::now()).unwrap().is_empty());
        assert!(!core.registry().is_including(NodeId(1)));
    }

    #[test]
    fn errors_reported() {
        let mut core = SpurCore::default();
        let now = Instant::now();
        assert!(matches!(
            core.on_radio_message(&[0, 0, 0], now),
            Err(MessageError::Decode(FrameDecodeError::TooShort(3)))
        ));
        assert!(matches!(
            core.on_radio_message(&inbound(0x0033, Function::Alert, &[0, 1]), now),
            Err(MessageError::UnallocatedAddress(ShortAddr(0x0033)))
        ));
        assert!(matches!(
            core.on_radio_message(&inbound(0, Function::IncludeReq, &[1, 2]), now),
            Err(MessageError::Decode(FrameDecodeError::ShortPayload { .. }))
        ));
        assert!(matches!(
            core.on_radio_message(&inbound(0, Function::WokenUp, &[]), now),
            Err(MessageError::UnallocatedAddress(UNADDRESSED))
        ));
        assert!(matches!(
            core.on_client_message(config_msg(77, json!({}))),
            Err(MessageError::UnknownNode(NodeId(77)))
        ));
    }

    #[test]
    fn spurious_and_undefined_are_ignored() {
        let mut core = SpurCore::default();
        let now = Instant::now();
        let addr = included(&mut core, 2, now);
        assert!(core
            .on_radio_message(&inbound(addr.0, Function::Ack, &[]), now)
            .unwrap()
            .is_empty());
        assert_eq!(core.queue().len(), 1);
        assert!(core
            .on_radio_message(&inbound(addr.0, Function::Undefined(0x3F), &[]), now)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn battery_request_uses_current_wakeup() {
        let mut core = SpurCore::default();
        let now = Instant::now();
        let addr = included(&mut core, 6, now);
        core.request_battery(addr, now).unwrap();
        let last = core.queue().iter().last().unwrap();
        assert_eq!(last.function, Function::SendBattery);
        assert_eq!(wakeup_of(&last.frame), 0);
        assert!(core.request_battery(ShortAddr(99), now).is_err());
    }

    #[test]
    fn restore_from_snapshot() {
        let mut core = SpurCore::default();
        let now = Instant::now();
        included(&mut core, 11, now);
        included(&mut core, 12, now);
        let snapshot = core.snapshot();
        let mut restored = SpurCore::restore(EngineConfig::default(), &snapshot);
        assert_eq!(restored.registry().address_of(NodeId(12)), Some(ShortAddr(2)));
        assert!(restored.queue().is_empty());
        restored
            .on_client_message(ClientMessage::IncludeGrant { node: NodeId(13) })
            .unwrap();
        assert_eq!(restored.registry().address_of(NodeId(13)), Some(ShortAddr(3)));
    }
}
