//! The polling engine.
//!
//! One background task continuously reads every registered tag from the
//! industrial source and emits a `TagUpdate` per successful read. The loop
//! runs whether or not any dashboard is connected, so the hub's last-value
//! cache stays warm for late-joining sessions.
//!
//! On connection loss the poller transitions to `Disconnected`, emits
//! nothing, and reconnects with exponential backoff. It never crashes the
//! process; it logs and retries indefinitely.

use std::sync::Arc;
use std::time::Duration;

use plantpulse_core::{TagRegistry, TagUpdate};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::source::PlantSource;

/// Polling engine tuning knobs.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between poll rounds.
    pub poll_interval: Duration,

    /// First reconnect delay after a disconnect.
    pub backoff_initial: Duration,

    /// Reconnect delay ceiling.
    pub backoff_max: Duration,

    /// Failed poll rounds tolerated before declaring the source down.
    pub max_consecutive_failures: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            max_consecutive_failures: 3,
        }
    }
}

/// Observable poller lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Created, not yet started.
    Idle,
    /// Establishing the source session.
    Connecting,
    /// Live: reading tags every interval.
    Polling,
    /// Source down; reconnecting with backoff. No updates are emitted.
    Disconnected,
    /// Terminal: `stop()` was called.
    Stopped,
}

/// The polling engine. Construct, then [`start`](SourcePoller::start) to
/// spawn the background loop.
pub struct SourcePoller<S> {
    registry: Arc<TagRegistry>,
    source: S,
    config: PollerConfig,
}

/// Handle to a running poller: observe its state, stop it, await shutdown.
pub struct PollerHandle {
    state_rx: watch::Receiver<PollerState>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Current state of the polling loop.
    pub fn state(&self) -> PollerState {
        *self.state_rx.borrow()
    }

    /// A receiver for watching state transitions.
    pub fn state_receiver(&self) -> watch::Receiver<PollerState> {
        self.state_rx.clone()
    }

    /// Request shutdown. Valid from any state; the loop transitions to
    /// `Stopped`. Safe to call more than once and concurrently with an
    /// in-flight poll round.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Wait for the background task to finish.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

impl<S: PlantSource + 'static> SourcePoller<S> {
    /// Create a poller over the given registry and source.
    pub fn new(registry: Arc<TagRegistry>, source: S, config: PollerConfig) -> Self {
        Self {
            registry,
            source,
            config,
        }
    }

    /// Spawn the polling loop. Updates are emitted on `updates`; the loop
    /// also stops when the receiving side of that channel is dropped.
    pub fn start(self, updates: mpsc::Sender<TagUpdate>) -> PollerHandle {
        let (state_tx, state_rx) = watch::channel(PollerState::Idle);
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(run_loop(
            self.registry,
            self.source,
            self.config,
            updates,
            state_tx,
            stop_rx,
        ));

        PollerHandle {
            state_rx,
            stop_tx,
            task,
        }
    }
}

async fn run_loop<S: PlantSource>(
    registry: Arc<TagRegistry>,
    mut source: S,
    config: PollerConfig,
    updates: mpsc::Sender<TagUpdate>,
    state_tx: watch::Sender<PollerState>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut backoff = config.backoff_initial;

    'lifecycle: loop {
        // Establish the source session, backing off between attempts.
        let _ = state_tx.send(PollerState::Connecting);
        loop {
            if *stop_rx.borrow() {
                break 'lifecycle;
            }
            match source.connect().await {
                Ok(()) => {
                    backoff = config.backoff_initial;
                    break;
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, retry_in = ?backoff,
                          "source connect failed");
                    let _ = state_tx.send(PollerState::Disconnected);
                    if sleep_or_stop(&mut stop_rx, backoff).await {
                        break 'lifecycle;
                    }
                    backoff = (backoff * 2).min(config.backoff_max);
                    let _ = state_tx.send(PollerState::Connecting);
                }
            }
        }

        let _ = state_tx.send(PollerState::Polling);
        info!(source = source.name(), tags = registry.len(), "polling started");

        let mut consecutive_failures: u32 = 0;
        let mut interval = tokio::time::interval(config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = stop_rx.changed() => {
                    // A closed stop channel means the handle is gone; treat
                    // it the same as an explicit stop.
                    if changed.is_err() || *stop_rx.borrow() {
                        break 'lifecycle;
                    }
                }
                _ = interval.tick() => {
                    let mut round_failed = false;

                    for tag in registry.all() {
                        match source.read(&tag.address).await {
                            Ok(value) => {
                                debug!(tag = %tag.name, value, "read");
                                let update = TagUpdate::now(&tag.name, value);
                                if updates.send(update).await.is_err() {
                                    info!("update channel closed, stopping poller");
                                    break 'lifecycle;
                                }
                            }
                            Err(e) => {
                                warn!(tag = %tag.name, error = %e, "read failed");
                                round_failed = true;
                                // Abandon the rest of this round; the
                                // session is suspect.
                                break;
                            }
                        }
                    }

                    if round_failed {
                        consecutive_failures += 1;
                        if consecutive_failures >= config.max_consecutive_failures {
                            warn!(source = source.name(), failures = consecutive_failures,
                                  "source considered down, reconnecting");
                            let _ = state_tx.send(PollerState::Disconnected);
                            if sleep_or_stop(&mut stop_rx, backoff).await {
                                break 'lifecycle;
                            }
                            backoff = (backoff * 2).min(config.backoff_max);
                            continue 'lifecycle;
                        }
                    } else {
                        consecutive_failures = 0;
                    }
                }
            }
        }
    }

    let _ = state_tx.send(PollerState::Stopped);
    info!("poller stopped");
}

/// Sleep for `duration`, returning early with `true` if stop was requested.
async fn sleep_or_stop(stop_rx: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = stop_rx.changed() => changed.is_err() || *stop_rx.borrow(),
    }
}
