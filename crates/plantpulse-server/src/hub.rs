//! The broadcast hub: fan-out of tag updates to subscribed sessions.
//!
//! The hub owns two pieces of shared state - the active-session set and the
//! last-known-value cache - behind a single mutex, so every publish is
//! serialized and per-tag delivery order is deterministic. Sessions receive
//! frames through their own unbounded channel; the socket write happens in
//! the connection task, so one slow client never delays the rest.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use plantpulse_core::{format_timestamp, TagRegistry, TagUpdate};
use plantpulse_protocol::{ServerMessage, SnapshotEntry, SnapshotFrame, TagFrame};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{AuthError, SessionAuthenticator};

/// Outbound frame channel for one session.
pub type FrameSender = mpsc::UnboundedSender<ServerMessage>;

/// One authenticated dashboard connection.
pub struct Session {
    /// Unique session id.
    pub id: Uuid,
    /// The principal the session token was issued to.
    pub principal: String,
    /// When the session was subscribed.
    pub created_at: DateTime<Utc>,
    tx: FrameSender,
}

struct CachedValue {
    value: f64,
    timestamp: DateTime<Utc>,
}

struct HubInner {
    sessions: HashMap<Uuid, Session>,
    last_values: HashMap<String, CachedValue>,
}

/// Fan-out core: delivers every published update to every active session
/// and serves a full snapshot to sessions as they join.
pub struct BroadcastHub {
    registry: Arc<TagRegistry>,
    auth: Arc<SessionAuthenticator>,
    stale_after: Duration,
    inner: Mutex<HubInner>,
}

impl BroadcastHub {
    /// Create a hub over the given registry. Values older than
    /// `stale_after` are flagged stale in outgoing frames.
    pub fn new(
        registry: Arc<TagRegistry>,
        auth: Arc<SessionAuthenticator>,
        stale_after: Duration,
    ) -> Self {
        Self {
            registry,
            auth,
            stale_after,
            inner: Mutex::new(HubInner {
                sessions: HashMap::new(),
                last_values: HashMap::new(),
            }),
        }
    }

    /// Validate the token and admit a new session.
    ///
    /// The full snapshot is queued before the session becomes eligible for
    /// live updates, so the first frame a client receives is always the
    /// snapshot.
    pub fn subscribe(&self, token: &str, tx: FrameSender) -> Result<Uuid, AuthError> {
        let principal = self.auth.validate(token)?;

        let mut inner = self.inner.lock().expect("hub state poisoned");
        let session = Session {
            id: Uuid::new_v4(),
            principal: principal.clone(),
            created_at: Utc::now(),
            tx,
        };
        let id = session.id;

        let snapshot = self.snapshot_locked(&inner);
        if session.tx.send(ServerMessage::Snapshot(snapshot)).is_err() {
            // Client vanished between upgrade and subscribe
            debug!(session = %id, "connection closed before snapshot delivery");
            return Ok(id);
        }

        inner.sessions.insert(id, session);
        info!(session = %id, principal = %principal, "session subscribed");
        Ok(id)
    }

    /// Remove a session. Idempotent: removing an absent session is a no-op.
    pub fn unsubscribe(&self, id: Uuid) {
        let removed = self
            .inner
            .lock()
            .expect("hub state poisoned")
            .sessions
            .remove(&id);
        if removed.is_some() {
            info!(session = %id, "session unsubscribed");
        }
    }

    /// Record an update and deliver it to every active session.
    ///
    /// Updates for unregistered tags are dropped and logged. A failed
    /// delivery drops that session only; the remaining sessions still
    /// receive the frame.
    pub fn publish(&self, update: TagUpdate) {
        let Some(tag) = self.registry.get(&update.tag) else {
            warn!(tag = %update.tag, "dropping update for unregistered tag");
            return;
        };

        if let Some(range) = tag.range {
            if !range.contains(update.value) {
                warn!(tag = %update.tag, value = update.value,
                      low = range.low, high = range.high,
                      "value outside expected range");
            }
        }

        let mut inner = self.inner.lock().expect("hub state poisoned");
        inner.last_values.insert(
            update.tag.clone(),
            CachedValue {
                value: update.value,
                timestamp: update.timestamp,
            },
        );

        let frame = ServerMessage::Update(TagFrame::from_update(
            &update,
            &tag.unit,
            self.is_stale(update.timestamp, Utc::now()),
        ));

        let mut dead = Vec::new();
        for (id, session) in &inner.sessions {
            if session.tx.send(frame.clone()).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            inner.sessions.remove(&id);
            warn!(session = %id, "dropping session after failed delivery");
        }
    }

    /// Number of active sessions.
    pub fn session_count(&self) -> usize {
        self.inner.lock().expect("hub state poisoned").sessions.len()
    }

    /// Last published value for a tag, if any.
    pub fn last_value(&self, tag: &str) -> Option<f64> {
        self.inner
            .lock()
            .expect("hub state poisoned")
            .last_values
            .get(tag)
            .map(|cached| cached.value)
    }

    fn snapshot_locked(&self, inner: &HubInner) -> SnapshotFrame {
        let now = Utc::now();
        let snapshot = self
            .registry
            .all()
            .iter()
            .map(|tag| match inner.last_values.get(&tag.name) {
                Some(cached) => SnapshotEntry {
                    tag: tag.name.clone(),
                    value: Some(cached.value),
                    unit: tag.unit.clone(),
                    timestamp: Some(format_timestamp(cached.timestamp)),
                    stale: self.is_stale(cached.timestamp, now),
                },
                None => SnapshotEntry {
                    tag: tag.name.clone(),
                    value: None,
                    unit: tag.unit.clone(),
                    timestamp: None,
                    stale: false,
                },
            })
            .collect();

        SnapshotFrame { snapshot }
    }

    fn is_stale(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(timestamp)
            .to_std()
            .map(|age| age > self.stale_after)
            .unwrap_or(false)
    }
}
