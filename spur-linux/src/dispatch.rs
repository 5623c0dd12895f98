//! Single task owning the engine: feeds it link events and ticks, performs its actions.

use std::future::Future;
use std::time::{Duration, Instant};

use spur_core::{keepalive, ClientMessage, OutboundAction, Snapshot, SpurCore};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::store::SnapshotStore;

/// Fast tick: deferred work, queue drain, beacons.
pub const FAST_TICK: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum Event {
    Radio(Vec<u8>),
    Client(ClientMessage),
}

pub struct Dispatcher {
    core: SpurCore,
    store: SnapshotStore,
    radio: mpsc::Sender<Vec<u8>>,
    backend: mpsc::Sender<String>,
}

impl Dispatcher {
    pub fn new(
        core: SpurCore,
        store: SnapshotStore,
        radio: mpsc::Sender<Vec<u8>>,
        backend: mpsc::Sender<String>,
    ) -> Self {
        Self {
            core,
            store,
            radio,
            backend,
        }
    }

    pub fn handle(&mut self, event: Event, now: Instant) {
        let result = match event {
            Event::Radio(bytes) => self.core.on_radio_message(&bytes, now),
            Event::Client(msg) => self.core.on_client_message(msg),
        };
        match result {
            Ok(actions) => self.perform(actions),
            Err(e) => warn!(error = %e, "message dropped"),
        }
    }

    pub fn tick(&mut self, now: Instant) {
        let actions = self.core.tick(now);
        self.perform(actions);
    }

    pub fn check_connected(&mut self) {
        self.send_backend(keepalive().to_string());
    }

    pub fn shutdown(&mut self) {
        info!("saving state before exit");
        self.save(&self.core.snapshot());
    }

    fn perform(&mut self, actions: Vec<OutboundAction>) {
        for action in actions {
            match action {
                OutboundAction::Transmit(frame) => {
                    if self.radio.try_send(frame).is_err() {
                        warn!("adaptor link backlogged, frame dropped");
                    }
                }
                OutboundAction::Notify(n) => match n.to_json() {
                    Ok(line) => self.send_backend(line),
                    Err(e) => warn!(error = %e, "failed to encode notification"),
                },
                OutboundAction::SaveState(snapshot) => self.save(&snapshot),
            }
        }
    }

    fn send_backend(&self, line: String) {
        debug!(%line, "to backend");
        if self.backend.try_send(line).is_err() {
            warn!("backend link backlogged, message dropped");
        }
    }

    fn save(&self, snapshot: &Snapshot) {
        if let Err(e) = self.store.save(snapshot) {
            warn!(path = %self.store.path().display(), error = %format!("{e:#}"), "problem saving state");
        }
    }

    /// Run until `shutdown` resolves or every event source has gone away, then save.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<Event>,
        check_interval: Duration,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut fast = tokio::time::interval(FAST_TICK);
        fast.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut slow = liveness_timer(check_interval);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = events.recv() => match event {
                    Some(event) => self.handle(event, Instant::now()),
                    None => {
                        warn!("all links closed");
                        break;
                    }
                },
                _ = fast.tick() => self.tick(Instant::now()),
                _ = slow.tick() => self.check_connected(),
            }
        }
        self.shutdown();
    }
}

/// First liveness message goes out one full interval after startup.
fn liveness_timer(check_interval: Duration) -> Interval {
    let mut timer =
        tokio::time::interval_at(tokio::time::Instant::now() + check_interval, check_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}
