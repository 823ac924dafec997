// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide index of active stream controllers.
//!
//! Streams are keyed by `(team_id, thread_ts)` for thread commands and by
//! `(team_id, user_id)` for the at-most-one-per-user rule. That rule is
//! enforced with a reservation held from command acceptance until the
//! controller is registered, so two rapid starts cannot both pass the
//! check. Terminal controllers linger briefly so a late `retry` still
//! finds them.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use echothread_core::{EchoError, StreamId, TeamId, UserId};
use tracing::debug;

use crate::controller::{StreamController, StreamSnapshot};

type Key = (String, String);

#[derive(Default)]
struct Inner {
    by_thread: HashMap<Key, Arc<StreamController>>,
    by_user: HashMap<Key, Arc<StreamController>>,
    reservations: HashSet<Key>,
}

/// Registry of live and recently terminal streams.
pub struct StreamRegistry {
    inner: Mutex<Inner>,
    linger: Duration,
}

/// Holds a user's start slot between command acceptance and controller
/// registration. Dropping it without registering releases the slot.
pub struct StartReservation {
    registry: Arc<StreamRegistry>,
    key: Key,
    armed: bool,
}

impl Drop for StartReservation {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.registry.inner.lock().expect("registry poisoned");
            inner.reservations.remove(&self.key);
        }
    }
}

impl StreamRegistry {
    pub fn new(linger: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            linger,
        })
    }

    /// Claims the start slot for `(team, user)`.
    ///
    /// Fails with a user-visible [`EchoError::Integrity`] when the user
    /// already has a live stream or another start is in flight.
    pub fn reserve(
        self: &Arc<Self>,
        team: &TeamId,
        user: &UserId,
    ) -> Result<StartReservation, EchoError> {
        let key = (team.0.clone(), user.0.clone());
        let mut inner = self.inner.lock().expect("registry poisoned");
        if inner.reservations.contains(&key) {
            return Err(EchoError::Integrity(
                "you already have a stream starting; give it a moment".into(),
            ));
        }
        if let Some(existing) = inner.by_user.get(&key) {
            if existing.state().is_live() {
                return Err(EchoError::Integrity(
                    "you already have an active stream; stop it first with \
                     /youtube2thread-stop"
                        .into(),
                ));
            }
        }
        inner.reservations.insert(key.clone());
        Ok(StartReservation {
            registry: self.clone(),
            key,
            armed: true,
        })
    }

    /// Registers a controller under its reservation and starts the
    /// terminal-linger watcher.
    pub fn register(
        self: &Arc<Self>,
        mut reservation: StartReservation,
        controller: Arc<StreamController>,
    ) {
        {
            let mut inner = self.inner.lock().expect("registry poisoned");
            inner.reservations.remove(&reservation.key);
            inner.by_user.insert(reservation.key.clone(), controller.clone());
            inner.by_thread.insert(
                (
                    controller.team_id.0.clone(),
                    controller.thread.thread_ts.clone(),
                ),
                controller.clone(),
            );
        }
        reservation.armed = false;

        let registry = self.clone();
        tokio::spawn(async move {
            controller.wait_terminal().await;
            tokio::time::sleep(registry.linger).await;
            registry.evict(&controller);
        });
    }

    /// Removes a terminal controller's entries unless a retry has already
    /// replaced them.
    fn evict(&self, controller: &Arc<StreamController>) {
        let mut inner = self.inner.lock().expect("registry poisoned");
        let thread_key = (
            controller.team_id.0.clone(),
            controller.thread.thread_ts.clone(),
        );
        if inner
            .by_thread
            .get(&thread_key)
            .is_some_and(|c| Arc::ptr_eq(c, controller))
        {
            inner.by_thread.remove(&thread_key);
        }
        let user_key = (controller.team_id.0.clone(), controller.user_id.0.clone());
        if inner
            .by_user
            .get(&user_key)
            .is_some_and(|c| Arc::ptr_eq(c, controller))
        {
            inner.by_user.remove(&user_key);
        }
        debug!(stream_id = %controller.stream_id, "stream evicted after linger");
    }

    pub fn get_by_thread(&self, team: &TeamId, thread_ts: &str) -> Option<Arc<StreamController>> {
        let inner = self.inner.lock().expect("registry poisoned");
        inner
            .by_thread
            .get(&(team.0.clone(), thread_ts.to_string()))
            .cloned()
    }

    pub fn get_by_stream_id(&self, stream_id: &StreamId) -> Option<Arc<StreamController>> {
        let inner = self.inner.lock().expect("registry poisoned");
        inner
            .by_thread
            .values()
            .find(|c| c.stream_id == *stream_id)
            .cloned()
    }

    /// The user's live stream, if any.
    pub fn active_for_user(&self, team: &TeamId, user: &UserId) -> Option<Arc<StreamController>> {
        let inner = self.inner.lock().expect("registry poisoned");
        inner
            .by_user
            .get(&(team.0.clone(), user.0.clone()))
            .filter(|c| c.state().is_live())
            .cloned()
    }

    /// Snapshots for one workspace, or every workspace when `team` is
    /// `None`.
    pub fn snapshots(&self, team: Option<&TeamId>) -> Vec<StreamSnapshot> {
        let inner = self.inner.lock().expect("registry poisoned");
        let mut snapshots: Vec<StreamSnapshot> = inner
            .by_thread
            .values()
            .filter(|c| team.is_none_or(|t| c.team_id == *t))
            .map(|c| c.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        snapshots
    }

    /// Count of streams in a live state.
    pub fn active_count(&self) -> usize {
        let inner = self.inner.lock().expect("registry poisoned");
        inner
            .by_thread
            .values()
            .filter(|c| c.state().is_live())
            .count()
    }

    /// Signals stop to every live stream (process shutdown).
    pub fn stop_all(&self) -> usize {
        let inner = self.inner.lock().expect("registry poisoned");
        let mut stopped = 0;
        for controller in inner.by_thread.values() {
            if controller.state().is_live() {
                controller.stop();
                stopped += 1;
            }
        }
        stopped
    }

    /// Live controllers, for shutdown draining.
    pub fn live_controllers(&self) -> Vec<Arc<StreamController>> {
        let inner = self.inner.lock().expect("registry poisoned");
        inner
            .by_thread
            .values()
            .filter(|c| c.state().is_live())
            .cloned()
            .collect()
    }
}
