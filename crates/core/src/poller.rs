//! Periodic queue refresh.
//!
//! A repeating task re-synchronises the store from the external service:
//! today's queue, the duty roster, and one clinical reading per patient.
//! Count deltas between consecutive refreshes drive the notification
//! events. The task stops when its handle is shut down; in-flight
//! results are abandoned.

use crate::backend::QueueBackend;
use crate::clock;
use crate::engine::EngineState;
use crate::events::QueueEvent;
use crate::model::ClinicalMetric;
use crate::store::ClinicalIndex;
use crate::{QueueError, QueueResult};
use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Count-based delta detection between consecutive refreshes.
///
/// Events are derived from count comparisons, never from an identity
/// diff, and at most one event per category fires per refresh.
#[derive(Debug, Default)]
pub(crate) struct DeltaTracker {
    completed_pending: usize,
    in_progress: usize,
}

impl DeltaTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feeds the counts from a fresh snapshot and returns the events the
    /// transition produces: a completed-treatment event on a strict
    /// increase, and a consultation-started event when the in-progress
    /// count leaves zero.
    pub(crate) fn observe(&mut self, completed_pending: usize, in_progress: usize) -> Vec<QueueEvent> {
        let mut events = Vec::new();
        if completed_pending > self.completed_pending {
            events.push(QueueEvent::CompletedTreatment);
        }
        if self.in_progress == 0 && in_progress > 0 {
            events.push(QueueEvent::ConsultationStarted);
        }
        self.completed_pending = completed_pending;
        self.in_progress = in_progress;
        events
    }
}

/// Fetches a full snapshot and replaces the store with it.
///
/// Clinical readings are fetched concurrently, one per distinct patient;
/// a failed reading degrades that patient to the zero reading with the
/// fixed note and never fails the refresh. A snapshot that raced a local
/// mutation is discarded with `QueueError::StaleData`.
pub(crate) async fn refresh_snapshot(
    backend: &dyn QueueBackend,
    state: &EngineState,
) -> QueueResult<()> {
    let version_before = state.version.load(Ordering::SeqCst);
    let today = clock::clinic_today(Utc::now());

    let entries = backend.today_queues(today).await?;
    let doctors = backend.doctors_on_duty().await?;

    let patient_ids: BTreeSet<i64> = entries.iter().map(|e| e.patient.patient_id).collect();
    let lookups = join_all(
        patient_ids
            .iter()
            .map(|patient_id| backend.patient_metric(*patient_id)),
    )
    .await;

    let mut clinical = ClinicalIndex::new();
    for (patient_id, lookup) in patient_ids.iter().zip(lookups) {
        match lookup {
            Ok(metric) => clinical.insert(*patient_id, metric),
            Err(err) => {
                tracing::warn!(
                    patient_id,
                    error = %err,
                    "clinical lookup failed; treating reading as unavailable"
                );
                clinical.insert(*patient_id, ClinicalMetric::unavailable());
            }
        }
    }

    if state.version.load(Ordering::SeqCst) != version_before {
        return Err(QueueError::StaleData);
    }

    let mut store = state.store.write().await;
    store.load(entries, doctors, clinical);
    let completed_pending = store.completed_pending_checkup_count();
    let in_progress = store.in_progress_count();
    drop(store);

    let events = {
        let mut deltas = state.deltas.lock().expect("delta tracker lock poisoned");
        deltas.observe(completed_pending, in_progress)
    };
    for event in events {
        state.events.emit(event);
    }

    tracing::debug!(completed_pending, in_progress, "queue snapshot refreshed");
    Ok(())
}

/// The repeating refresh task.
pub struct PollingController {
    backend: Arc<dyn QueueBackend>,
    state: Arc<EngineState>,
    interval: Duration,
}

impl PollingController {
    pub(crate) fn new(
        backend: Arc<dyn QueueBackend>,
        state: Arc<EngineState>,
        interval: Duration,
    ) -> Self {
        Self {
            backend,
            state,
            interval,
        }
    }

    /// Spawns the polling loop. The first refresh runs immediately, then
    /// one per interval until the handle is shut down.
    pub fn spawn(self) -> PollerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match refresh_snapshot(self.backend.as_ref(), &self.state).await {
                            Ok(()) => {}
                            Err(QueueError::StaleData) => {
                                tracing::debug!("poll raced a local change; snapshot discarded");
                            }
                            Err(err) => {
                                tracing::warn!(error = %err, "queue poll failed; retrying next interval");
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::info!("queue polling stopped");
                        break;
                    }
                }
            }
        });

        PollerHandle {
            shutdown: shutdown_tx,
            handle,
        }
    }
}

/// Handle for stopping the polling loop.
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PollerHandle {
    /// Signals the loop to stop and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::model::QueueStatus;
    use crate::store::fixtures::{doctor, entry, metric};

    #[test]
    fn consultation_event_fires_only_when_leaving_zero() {
        let mut deltas = DeltaTracker::new();

        assert_eq!(deltas.observe(0, 2), vec![QueueEvent::ConsultationStarted]);
        assert_eq!(deltas.observe(0, 2), Vec::<QueueEvent>::new());
        assert_eq!(deltas.observe(0, 0), Vec::<QueueEvent>::new());
        assert_eq!(deltas.observe(0, 1), vec![QueueEvent::ConsultationStarted]);
    }

    #[test]
    fn completed_event_fires_on_strict_increase_only() {
        let mut deltas = DeltaTracker::new();

        assert_eq!(deltas.observe(1, 0), vec![QueueEvent::CompletedTreatment]);
        assert_eq!(deltas.observe(1, 0), Vec::<QueueEvent>::new());
        assert_eq!(deltas.observe(0, 0), Vec::<QueueEvent>::new());
        assert_eq!(deltas.observe(2, 0), vec![QueueEvent::CompletedTreatment]);
    }

    #[test]
    fn both_categories_can_fire_in_one_refresh() {
        let mut deltas = DeltaTracker::new();
        let events = deltas.observe(1, 1);
        assert_eq!(
            events,
            vec![QueueEvent::CompletedTreatment, QueueEvent::ConsultationStarted]
        );
    }

    #[tokio::test]
    async fn refresh_replaces_the_store_and_annotates_readings() {
        let backend = MockBackend::new();
        backend.set_snapshot(
            vec![
                entry(1, 1, QueueStatus::Waiting),
                entry(2, 2, QueueStatus::Waiting),
            ],
            vec![doctor(7, "Dr. Reyes")],
        );
        backend.set_metric(101, metric(75.0));
        backend.set_metric(102, metric(10.0));

        let state = EngineState::new();
        refresh_snapshot(&backend, &state)
            .await
            .expect("refresh should succeed");

        let store = state.store.read().await;
        assert_eq!(store.active_entries().count(), 2);
        assert_eq!(store.doctors().len(), 1);
        assert!(store.clinical().assess(101).is_emergency);
        assert!(!store.clinical().assess(102).is_emergency);
    }

    #[tokio::test]
    async fn failed_clinical_lookup_degrades_that_patient_only() {
        let backend = MockBackend::new();
        backend.set_snapshot(
            vec![
                entry(1, 1, QueueStatus::Waiting),
                entry(2, 2, QueueStatus::Waiting),
            ],
            vec![],
        );
        backend.set_metric(102, metric(85.0));
        backend.fail_metric_for(101);

        let state = EngineState::new();
        refresh_snapshot(&backend, &state)
            .await
            .expect("refresh should tolerate one failed lookup");

        let store = state.store.read().await;
        assert_eq!(store.clinical().percentage(101).value(), 0.0);
        assert_eq!(
            store.clinical().note(101),
            Some(ClinicalMetric::UNAVAILABLE_NOTE)
        );
        assert!(store.clinical().assess(102).is_emergency);
    }

    /// Delegates to a [`MockBackend`] and bumps the engine version while
    /// the snapshot is in flight, reproducing a staff action landing
    /// mid-poll.
    struct RacingBackend {
        inner: MockBackend,
        state: Arc<EngineState>,
    }

    #[async_trait::async_trait]
    impl QueueBackend for RacingBackend {
        async fn today_queues(
            &self,
            date: chrono::NaiveDate,
        ) -> crate::QueueResult<Vec<crate::model::QueueEntry>> {
            self.inner.today_queues(date).await
        }

        async fn doctors_on_duty(&self) -> crate::QueueResult<Vec<crate::model::Doctor>> {
            self.state.version.fetch_add(1, Ordering::SeqCst);
            self.inner.doctors_on_duty().await
        }

        async fn patient_metric(&self, patient_id: i64) -> crate::QueueResult<ClinicalMetric> {
            self.inner.patient_metric(patient_id).await
        }

        async fn update_queue_status(
            &self,
            queue_id: i64,
            status: QueueStatus,
            doctor_id: Option<i64>,
        ) -> crate::QueueResult<()> {
            self.inner.update_queue_status(queue_id, status, doctor_id).await
        }

        async fn skip_queue(&self, queue_id: i64, positions: u32) -> crate::QueueResult<()> {
            self.inner.skip_queue(queue_id, positions).await
        }

        async fn prioritize_emergency(&self, queue_id: i64) -> crate::QueueResult<()> {
            self.inner.prioritize_emergency(queue_id).await
        }

        async fn send_to_emergency(&self, queue_id: i64) -> crate::QueueResult<()> {
            self.inner.send_to_emergency(queue_id).await
        }

        async fn start_queue(&self) -> crate::QueueResult<()> {
            self.inner.start_queue().await
        }

        async fn update_emergency_statuses(&self) -> crate::QueueResult<()> {
            self.inner.update_emergency_statuses().await
        }
    }

    #[tokio::test]
    async fn snapshot_that_raced_a_local_change_is_discarded() {
        let state = Arc::new(EngineState::new());
        let inner = MockBackend::new();
        inner.set_snapshot(vec![entry(1, 1, QueueStatus::Waiting)], vec![]);
        let backend = RacingBackend {
            inner,
            state: state.clone(),
        };

        let err = refresh_snapshot(&backend, &state)
            .await
            .expect_err("raced snapshot should be discarded");
        assert!(matches!(err, QueueError::StaleData));

        let store = state.store.read().await;
        assert_eq!(store.active_entries().count(), 0, "store must stay untouched");
    }

    #[tokio::test]
    async fn polling_loop_refreshes_and_stops_on_shutdown() {
        let backend = Arc::new(MockBackend::new());
        backend.set_snapshot(vec![entry(1, 1, QueueStatus::Waiting)], vec![]);

        let state = Arc::new(EngineState::new());
        let poller = PollingController::new(
            backend.clone(),
            state.clone(),
            Duration::from_millis(10),
        );

        let handle = poller.spawn();
        tokio::time::sleep(Duration::from_millis(35)).await;
        handle.shutdown().await;

        let refreshes = backend
            .calls()
            .iter()
            .filter(|c| c.starts_with("today-queues"))
            .count();
        assert!(refreshes >= 2, "expected repeated polls, saw {refreshes}");

        let store = state.store.read().await;
        assert_eq!(store.active_entries().count(), 1);
    }
}
