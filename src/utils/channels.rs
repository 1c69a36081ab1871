use crate::config::EngineConfig;
use crate::model::loader::{LoadCommand, LoadEvent};
use crate::state::{AvatarEvent, AvatarState};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Command and event channels between the model store and the loader worker
pub struct LoaderChannels {
    pub command_tx: Sender<LoadCommand>,
    pub command_rx: Receiver<LoadCommand>,
    pub event_tx: Sender<LoadEvent>,
    pub event_rx: Receiver<LoadEvent>,
}

impl LoaderChannels {
    pub fn new(buffer_size: usize) -> Self {
        let (command_tx, command_rx) = bounded(buffer_size);
        let (event_tx, event_rx) = bounded(buffer_size);

        Self {
            command_tx,
            command_rx,
            event_tx,
            event_rx,
        }
    }
}

struct Subscriber {
    tx: Sender<AvatarEvent>,
    /// Skipped a snapshot and has not seen the latest one yet
    state_behind: bool,
}

/// Fans renderer notifications out to every subscriber
///
/// Each subscriber owns a bounded channel. Snapshots may only fill half of
/// it; a lagging subscriber gets the newest snapshot once it has room again,
/// so a backlog of state changes never crowds out `Loaded` or `Error`.
pub struct EventHub {
    capacity: usize,
    subscribers: Vec<Subscriber>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            subscribers: Vec::new(),
        }
    }

    /// Open a new receiver that sees every event emitted from now on
    pub fn subscribe(&mut self) -> Receiver<AvatarEvent> {
        let (tx, rx) = bounded(self.capacity);
        self.subscribers.push(Subscriber {
            tx,
            state_behind: false,
        });
        debug!("Event subscriber added ({} total)", self.subscribers.len());
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn state_limit(&self) -> usize {
        self.capacity / 2
    }

    /// Deliver a discrete event to every live subscriber
    pub fn emit(&mut self, event: AvatarEvent) {
        self.subscribers.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!("Event subscriber full, dropping {:?}", event);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// Offer the current snapshot. `changed` marks a new snapshot; lagging
    /// subscribers are caught up with the latest one either way.
    pub fn publish_state(&mut self, state: &Arc<AvatarState>, changed: bool) {
        let limit = self.state_limit();
        self.subscribers.retain_mut(|sub| {
            if !changed && !sub.state_behind {
                return true;
            }
            if sub.tx.len() >= limit {
                sub.state_behind = true;
                return true;
            }
            match sub.tx.try_send(AvatarEvent::StateChanged(Arc::clone(state))) {
                Ok(()) => {
                    sub.state_behind = false;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    sub.state_behind = true;
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
    }

    /// Drop every subscriber; their receivers see a disconnect
    pub fn clear(&mut self) {
        self.subscribers.clear();
    }
}

pub struct AvatarChannels {
    pub loader: LoaderChannels,
    pub events: EventHub,
}

impl AvatarChannels {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            loader: LoaderChannels::new(config.loader_queue),
            events: EventHub::new(config.events_capacity),
        }
    }
}

impl Default for AvatarChannels {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}
