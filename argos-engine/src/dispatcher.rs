//! Concurrent multi-interface capture
//!
//! The dispatcher launches one [`CaptureSession`] task per interface and
//! tracks every in-flight task in a registry keyed by task id. The registry
//! is the only place task handles live: a task removes its own entry the
//! moment it resolves, and the rest are removed when [`CaptureDispatcher::cancel_all`] runs, or when the
//! `capture_many` future that launched them is dropped.

use argos_core::{Error, Packet, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::request::CaptureRequest;
use crate::session::CaptureSession;
use crate::stats::{DispatchStats, StatsAccumulator};

/// One in-flight capture session
#[derive(Debug)]
pub struct CaptureTaskHandle {
    pub id: Uuid,
    pub interface: String,
    pub started_at: DateTime<Utc>,
    task: JoinHandle<()>,
}

/// Outcome of a multi-interface capture.
///
/// Every requested interface has an entry. Interfaces whose capture failed
/// map to an empty sequence and are also listed in [`failures`](Self::failures).
#[derive(Debug, Default)]
pub struct CaptureResult {
    packets: BTreeMap<String, Vec<Packet>>,
    failures: BTreeMap<String, Error>,
}

impl CaptureResult {
    fn insert(&mut self, interface: String, packets: Vec<Packet>) {
        self.packets.insert(interface, packets);
    }

    fn insert_failure(&mut self, interface: String, error: Error) {
        self.packets.insert(interface.clone(), Vec::new());
        self.failures.insert(interface, error);
    }

    /// Packets captured on `interface`
    pub fn get(&self, interface: &str) -> Option<&[Packet]> {
        self.packets.get(interface).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &str> {
        self.packets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Packet])> {
        self.packets
            .iter()
            .map(|(name, packets)| (name.as_str(), packets.as_slice()))
    }

    /// Interfaces whose capture failed, with the cause
    pub fn failures(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.failures.iter().map(|(name, e)| (name.as_str(), e))
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_failed(&self, interface: &str) -> bool {
        self.failures.contains_key(interface)
    }

    pub fn total_packets(&self) -> usize {
        self.packets.values().map(Vec::len).sum()
    }

    pub fn into_packets(self) -> BTreeMap<String, Vec<Packet>> {
        self.packets
    }
}

impl Serialize for CaptureResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.packets.serialize(serializer)
    }
}

/// Aborts whatever a `capture_many` call still has in flight when its
/// future is dropped before completion
struct RoundGuard {
    tasks: Arc<DashMap<Uuid, CaptureTaskHandle>>,
    stats: StatsAccumulator,
    ids: Vec<Uuid>,
}

impl RoundGuard {
    fn disarm(mut self) {
        self.ids.clear();
    }
}

impl Drop for RoundGuard {
    fn drop(&mut self) {
        let mut aborted = 0;
        for id in self.ids.drain(..) {
            if let Some((_, handle)) = self.tasks.remove(&id) {
                handle.task.abort();
                aborted += 1;
            }
        }
        if aborted > 0 {
            self.stats.record_cancelled(aborted);
            debug!(tasks = aborted, "Aborted capture tasks of a dropped round");
        }
    }
}

/// Fans a capture request out over several interfaces
pub struct CaptureDispatcher {
    session: CaptureSession,
    tasks: Arc<DashMap<Uuid, CaptureTaskHandle>>,
    stats: StatsAccumulator,
}

impl CaptureDispatcher {
    pub fn new(session: CaptureSession) -> Self {
        Self {
            session,
            tasks: Arc::new(DashMap::new()),
            stats: StatsAccumulator::new(),
        }
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    /// Capture on every interface concurrently and wait for all of them.
    ///
    /// Duplicate names are captured once. A failing interface contributes an
    /// empty sequence and never affects its siblings.
    pub async fn capture_many<S: AsRef<str>>(
        &self,
        interfaces: &[S],
        request: &CaptureRequest,
    ) -> Result<CaptureResult> {
        if interfaces.is_empty() {
            return Err(Error::capture("No interfaces specified for capture"));
        }

        let mut seen = HashSet::new();
        let unique: Vec<String> = interfaces
            .iter()
            .map(|i| i.as_ref().to_string())
            .filter(|i| seen.insert(i.clone()))
            .collect();

        let mut guard = RoundGuard {
            tasks: Arc::clone(&self.tasks),
            stats: self.stats.clone(),
            ids: Vec::with_capacity(unique.len()),
        };
        let mut pending = Vec::with_capacity(unique.len());

        for interface in unique {
            let id = Uuid::now_v7();
            let (tx, rx) = oneshot::channel();
            let (registered_tx, registered) = oneshot::channel::<()>();
            let session = self.session.clone();
            let request = request.clone();
            let tasks = Arc::clone(&self.tasks);
            let name = interface.clone();

            self.stats.record_started();
            let task = tokio::spawn(async move {
                if registered.await.is_err() {
                    return;
                }
                let result = session.run(&name, &request).await;
                // Whoever removes the entry owns the outcome; cancel_all may
                // have claimed it already
                if tasks.remove(&id).is_some() {
                    let _ = tx.send(result);
                }
            });

            self.tasks.insert(
                id,
                CaptureTaskHandle {
                    id,
                    interface: interface.clone(),
                    started_at: Utc::now(),
                    task,
                },
            );
            guard.ids.push(id);
            let _ = registered_tx.send(());
            debug!(id = %id, interface = %interface, "Capture task launched");
            pending.push((id, interface, rx));
        }

        let mut result = CaptureResult::default();
        for (id, interface, rx) in pending {
            match rx.await {
                Ok(Ok(packets)) => {
                    self.stats.record_success(packets.len());
                    result.insert(interface, packets);
                }
                Ok(Err(e)) => {
                    self.stats.record_failure();
                    error!(interface = %interface, error = %e, "Capture failed, reporting no packets");
                    result.insert_failure(interface, e);
                }
                Err(_) if self.tasks.remove(&id).is_some() => {
                    // The task died without resolving
                    self.stats.record_failure();
                    error!(id = %id, interface = %interface, "Capture task ended without a result");
                    result.insert_failure(
                        interface.clone(),
                        Error::ExecutionFailed(format!("Capture task for {} ended without a result", interface)),
                    );
                }
                Err(_) => {
                    // Claimed by cancel_all, which already counted it
                    debug!(id = %id, interface = %interface, "Capture task cancelled");
                    result.insert_failure(
                        interface.clone(),
                        Error::Interrupted(format!("Capture on {} was cancelled", interface)),
                    );
                }
            }
        }
        guard.disarm();

        Ok(result)
    }

    /// Abort every outstanding task and wait for the aborts to settle.
    ///
    /// Returns the number of cancelled tasks. Safe to call repeatedly and
    /// with nothing outstanding.
    pub async fn cancel_all(&self) -> usize {
        let handles = self.drain();
        let cancelled = handles.len();

        for handle in &handles {
            handle.task.abort();
        }
        for handle in handles {
            // Cancellation errors are expected here
            let _ = handle.task.await;
        }

        if cancelled > 0 {
            self.stats.record_cancelled(cancelled);
            info!(tasks = cancelled, "Cancelled outstanding capture tasks");
        } else {
            debug!("No outstanding capture tasks to cancel");
        }
        cancelled
    }

    /// Abort every outstanding task without waiting
    pub fn abort_all(&self) -> usize {
        let handles = self.drain();
        for handle in &handles {
            handle.task.abort();
        }
        if !handles.is_empty() {
            self.stats.record_cancelled(handles.len());
        }
        handles.len()
    }

    fn drain(&self) -> Vec<CaptureTaskHandle> {
        let ids: Vec<Uuid> = self.tasks.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter_map(|id| self.tasks.remove(&id).map(|(_, handle)| handle))
            .collect()
    }

    /// Number of capture tasks in flight
    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }

    /// Interfaces currently being captured, oldest first
    pub fn outstanding_interfaces(&self) -> Vec<String> {
        let mut running: Vec<(DateTime<Utc>, String)> = self
            .tasks
            .iter()
            .map(|entry| (entry.started_at, entry.interface.clone()))
            .collect();
        running.sort();
        running.into_iter().map(|(_, name)| name).collect()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats.snapshot()
    }
}
