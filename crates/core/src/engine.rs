//! Engine facade.
//!
//! `QueueEngine` bundles the store, the operations service, the event bus
//! and the polling task behind one handle a driver (REST surface, CLI, a
//! test) can hold. All views are snapshots taken under a read lock;
//! nothing borrows into the store across an await point.

use crate::backend::QueueBackend;
use crate::config::CoreConfig;
use crate::events::{EventBus, QueueEvent};
use crate::model::{Doctor, QueueEntry, QueueStatus};
use crate::ops::QueueOperationsService;
use crate::planner;
use crate::poller::{self, DeltaTracker, PollerHandle, PollingController};
use crate::store::QueueStore;
use crate::triage::RiskAssessment;
use crate::{clock, QueueError, QueueResult};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, RwLock};

/// State shared between the facade, the operations service and the
/// polling task.
pub(crate) struct EngineState {
    pub(crate) store: RwLock<QueueStore>,
    /// Monotonic counter bumped on every confirmed local mutation; a poll
    /// snapshot taken before a bump is discarded rather than applied.
    pub(crate) version: AtomicU64,
    pub(crate) deltas: Mutex<DeltaTracker>,
    pub(crate) events: EventBus,
}

impl EngineState {
    pub(crate) fn new() -> Self {
        Self {
            store: RwLock::new(QueueStore::new()),
            version: AtomicU64::new(0),
            deltas: Mutex::new(DeltaTracker::new()),
            events: EventBus::new(),
        }
    }
}

/// A queue entry together with its triage assessment and any note
/// attached to the clinical reading.
#[derive(Debug, Clone, Serialize)]
pub struct TriagedEntry {
    pub entry: QueueEntry,
    pub assessment: RiskAssessment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinical_note: Option<String>,
}

/// Snapshot of the whole queue board, categorized the way the clinic
/// displays it.
#[derive(Debug, Clone, Serialize)]
pub struct QueueBoard {
    pub clinic_time: DateTime<FixedOffset>,
    pub waiting: Vec<TriagedEntry>,
    pub in_progress: Vec<TriagedEntry>,
    pub completed: Vec<TriagedEntry>,
    pub cancelled: Vec<TriagedEntry>,
    pub emergency: Vec<TriagedEntry>,
    pub next_for_consultation: Vec<TriagedEntry>,
    pub available_doctors: Vec<Doctor>,
}

/// The clinic queue and triage engine.
pub struct QueueEngine {
    backend: Arc<dyn QueueBackend>,
    config: Arc<CoreConfig>,
    state: Arc<EngineState>,
    ops: QueueOperationsService,
}

impl QueueEngine {
    pub fn new(backend: Arc<dyn QueueBackend>, config: Arc<CoreConfig>) -> Self {
        let state = Arc::new(EngineState::new());
        let ops = QueueOperationsService::new(
            backend.clone(),
            state.clone(),
            config.skip_positions(),
        );
        Self {
            backend,
            config,
            state,
            ops,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Subscribes to the notification events detected between refreshes.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.state.events.subscribe()
    }

    /// Spawns the periodic refresh task at the configured interval.
    pub fn spawn_poller(&self) -> PollerHandle {
        PollingController::new(
            self.backend.clone(),
            self.state.clone(),
            self.config.poll_interval(),
        )
        .spawn()
    }

    /// On-demand refresh. A snapshot discarded by the stale-poll guard is
    /// retried once immediately.
    pub async fn refresh(&self) -> QueueResult<()> {
        match poller::refresh_snapshot(self.backend.as_ref(), &self.state).await {
            Err(QueueError::StaleData) => {
                poller::refresh_snapshot(self.backend.as_ref(), &self.state).await
            }
            other => other,
        }
    }

    /// The full categorized board.
    pub async fn board(&self) -> QueueBoard {
        let store = self.state.store.read().await;

        let triaged = |entries: Vec<&QueueEntry>| -> Vec<TriagedEntry> {
            let mut list: Vec<TriagedEntry> = entries
                .into_iter()
                .map(|entry| TriagedEntry {
                    assessment: store.clinical().assess(entry.patient.patient_id),
                    clinical_note: store
                        .clinical()
                        .note(entry.patient.patient_id)
                        .map(str::to_string),
                    entry: entry.clone(),
                })
                .collect();
            list.sort_by_key(|t| t.entry.queue_number);
            list
        };

        let next: Vec<QueueEntry> = planner::next_for_consultation(&store);
        let next_triaged = next
            .iter()
            .map(|entry| TriagedEntry {
                assessment: store.clinical().assess(entry.patient.patient_id),
                clinical_note: store
                    .clinical()
                    .note(entry.patient.patient_id)
                    .map(str::to_string),
                entry: entry.clone(),
            })
            .collect();

        QueueBoard {
            clinic_time: clock::clinic_time(Utc::now()),
            waiting: triaged(store.by_status(QueueStatus::Waiting)),
            in_progress: triaged(store.by_status(QueueStatus::InProgress)),
            completed: triaged(store.by_status(QueueStatus::Completed)),
            cancelled: triaged(store.by_status(QueueStatus::Cancelled)),
            emergency: triaged(store.emergency_waiting()),
            next_for_consultation: next_triaged,
            available_doctors: store.available_doctors().into_iter().cloned().collect(),
        }
    }

    /// The waiting entries that should be seen next, in consultation
    /// order.
    pub async fn next_for_consultation(&self) -> Vec<QueueEntry> {
        let store = self.state.store.read().await;
        planner::next_for_consultation(&store)
    }

    pub async fn start_queue(&self) -> QueueResult<()> {
        self.ops.start_queue().await
    }

    pub async fn update_status(
        &self,
        queue_id: i64,
        status: QueueStatus,
        doctor_id: Option<i64>,
    ) -> QueueResult<()> {
        self.ops.update_status(queue_id, status, doctor_id).await
    }

    /// Skips a waiting entry back in the order, then refetches the queue
    /// to observe the server-side reorder.
    pub async fn skip(&self, queue_id: i64) -> QueueResult<()> {
        self.ops.skip(queue_id).await?;
        self.refresh().await
    }

    /// Moves a waiting emergency entry to the front, then refetches.
    pub async fn prioritize_emergency(&self, queue_id: i64) -> QueueResult<()> {
        self.ops.prioritize_emergency(queue_id).await?;
        self.refresh().await
    }

    pub async fn send_to_emergency(&self, queue_id: i64) -> QueueResult<()> {
        self.ops.send_to_emergency(queue_id).await
    }

    /// Triggers the service-side emergency recomputation, followed by a
    /// full refresh.
    pub async fn update_emergency_statuses(&self) -> QueueResult<()> {
        self.ops.update_emergency_statuses().await?;
        self.refresh().await
    }
}
