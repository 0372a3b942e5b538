//! State-changing queue operations.
//!
//! Every operation validates its preconditions against the local snapshot
//! before any network call, asks the external service to perform the
//! write, and only then mirrors the confirmed change into the store.
//! A service failure leaves local state untouched and surfaces the
//! service-provided message; retry is by resubmission.

use crate::backend::QueueBackend;
use crate::engine::EngineState;
use crate::model::QueueStatus;
use crate::planner;
use crate::{QueueError, QueueResult};
use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Orchestrates the user-triggered queue transitions.
#[derive(Clone)]
pub struct QueueOperationsService {
    backend: Arc<dyn QueueBackend>,
    state: Arc<EngineState>,
    skip_positions: u32,
}

impl QueueOperationsService {
    pub(crate) fn new(
        backend: Arc<dyn QueueBackend>,
        state: Arc<EngineState>,
        skip_positions: u32,
    ) -> Self {
        Self {
            backend,
            state,
            skip_positions,
        }
    }

    /// Starts consultations for as many top-ranked waiting patients as
    /// there are free doctors.
    ///
    /// The external service performs the authoritative batch assignment;
    /// the same pairing is mirrored locally once the service confirms.
    ///
    /// # Errors
    ///
    /// `Validation` when nobody is waiting or every doctor is busy;
    /// `ServiceUnavailable` when the service rejects the batch, in which
    /// case nothing is changed locally.
    pub async fn start_queue(&self) -> QueueResult<()> {
        let planned = {
            let store = self.state.store.read().await;
            let planned = planner::plan_assignments(&store);
            if planned.is_empty() {
                return Err(QueueError::validation(
                    "nothing to start: no waiting patients or no available doctors",
                ));
            }
            planned
        };

        self.backend.start_queue().await?;

        let now = Utc::now();
        {
            let mut store = self.state.store.write().await;
            for (entry, doctor) in &planned {
                if let Err(err) = store.apply_status_change(
                    entry.queue_id,
                    QueueStatus::InProgress,
                    Some(doctor.doctor_id),
                    now,
                ) {
                    tracing::warn!(
                        queue_id = entry.queue_id,
                        error = %err,
                        "could not mirror batch start locally; next poll reconciles"
                    );
                }
            }
        }
        self.bump_version();
        tracing::info!(started = planned.len(), "queue consultations started");
        Ok(())
    }

    /// Requests a status transition for one entry.
    ///
    /// # Errors
    ///
    /// `Validation` when the entry does not exist locally or an
    /// `InProgress` transition names no doctor; `ServiceUnavailable` when
    /// the service rejects the write.
    pub async fn update_status(
        &self,
        queue_id: i64,
        status: QueueStatus,
        doctor_id: Option<i64>,
    ) -> QueueResult<()> {
        {
            let store = self.state.store.read().await;
            if store.entry(queue_id).is_none() {
                return Err(QueueError::validation(format!(
                    "queue entry {queue_id} not found"
                )));
            }
            if status == QueueStatus::InProgress && doctor_id.is_none() {
                return Err(QueueError::validation(
                    "starting a consultation requires a doctor",
                ));
            }
        }

        self.backend
            .update_queue_status(queue_id, status, doctor_id)
            .await?;

        let now = Utc::now();
        {
            let mut store = self.state.store.write().await;
            if let Err(err) = store.apply_status_change(queue_id, status, doctor_id, now) {
                tracing::warn!(
                    queue_id,
                    error = %err,
                    "could not mirror status change locally; next poll reconciles"
                );
            }
        }
        self.bump_version();
        tracing::info!(queue_id, %status, "queue status updated");
        Ok(())
    }

    /// Pushes a waiting entry back in the order.
    ///
    /// The reorder itself happens server-side; callers refetch the queue
    /// afterwards to observe the new order.
    pub async fn skip(&self, queue_id: i64) -> QueueResult<()> {
        self.require_waiting(queue_id, false).await?;
        self.backend
            .skip_queue(queue_id, self.skip_positions)
            .await?;
        self.bump_version();
        tracing::info!(queue_id, positions = self.skip_positions, "queue entry skipped");
        Ok(())
    }

    /// Moves a waiting emergency entry to the front of the waiting order.
    pub async fn prioritize_emergency(&self, queue_id: i64) -> QueueResult<()> {
        self.require_waiting(queue_id, true).await?;
        self.backend.prioritize_emergency(queue_id).await?;
        self.bump_version();
        tracing::info!(queue_id, "emergency patient prioritized");
        Ok(())
    }

    /// Hands a waiting emergency entry off to the emergency department.
    /// The entry leaves the active views immediately; the next poll
    /// confirms the handoff.
    pub async fn send_to_emergency(&self, queue_id: i64) -> QueueResult<()> {
        self.require_waiting(queue_id, true).await?;
        self.backend.send_to_emergency(queue_id).await?;

        {
            let mut store = self.state.store.write().await;
            if let Err(err) = store.mark_left_queue(queue_id) {
                tracing::warn!(
                    queue_id,
                    error = %err,
                    "could not retire entry locally; next poll reconciles"
                );
            }
        }
        self.bump_version();
        tracing::info!(queue_id, "patient sent to emergency department");
        Ok(())
    }

    /// Triggers the service-side bulk recomputation of emergency
    /// classifications. Callers follow up with a full refresh.
    pub async fn update_emergency_statuses(&self) -> QueueResult<()> {
        self.backend.update_emergency_statuses().await?;
        self.bump_version();
        tracing::info!("emergency status recomputation requested");
        Ok(())
    }

    async fn require_waiting(&self, queue_id: i64, must_be_emergency: bool) -> QueueResult<()> {
        let store = self.state.store.read().await;
        let entry = store.entry(queue_id).ok_or_else(|| {
            QueueError::validation(format!("queue entry {queue_id} not found"))
        })?;

        if entry.status != QueueStatus::Waiting || !entry.is_active() {
            return Err(QueueError::validation(format!(
                "queue entry {queue_id} is not waiting (status: {})",
                entry.status
            )));
        }

        if must_be_emergency && !store.clinical().assess(entry.patient.patient_id).is_emergency {
            return Err(QueueError::validation(format!(
                "queue entry {queue_id} is not classified as an emergency"
            )));
        }

        Ok(())
    }

    fn bump_version(&self) {
        self.state.version.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::engine::EngineState;
    use crate::store::fixtures::{doctor, entry, metric};
    use crate::store::ClinicalIndex;

    fn state_with(
        entries: Vec<crate::model::QueueEntry>,
        doctors: Vec<crate::model::Doctor>,
        readings: Vec<(i64, f64)>,
    ) -> Arc<EngineState> {
        let state = Arc::new(EngineState::new());
        let mut clinical = ClinicalIndex::new();
        for (patient_id, percentage) in readings {
            clinical.insert(patient_id, metric(percentage));
        }
        {
            let mut store = state.store.try_write().expect("fresh state is unlocked");
            store.load(entries, doctors, clinical);
        }
        state
    }

    fn service(backend: Arc<MockBackend>, state: Arc<EngineState>) -> QueueOperationsService {
        QueueOperationsService::new(backend, state, 5)
    }

    #[tokio::test]
    async fn skip_on_in_progress_entry_is_rejected_without_a_network_call() {
        let backend = Arc::new(MockBackend::new());
        let mut busy = entry(1, 1, QueueStatus::InProgress);
        busy.doctor_id = Some(7);
        let state = state_with(vec![busy], vec![], vec![]);
        let ops = service(backend.clone(), state);

        let err = ops.skip(1).await.expect_err("skip should be rejected");
        assert!(matches!(err, QueueError::Validation(_)));
        assert!(backend.calls().is_empty(), "no backend call expected");
    }

    #[tokio::test]
    async fn skip_on_waiting_entry_calls_the_service_with_the_distance() {
        let backend = Arc::new(MockBackend::new());
        let state = state_with(vec![entry(3, 3, QueueStatus::Waiting)], vec![], vec![]);
        let ops = service(backend.clone(), state.clone());

        ops.skip(3).await.expect("skip should succeed");
        assert_eq!(backend.calls(), vec!["skip-queue:3:5"]);
        assert_eq!(state.version.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn service_failure_surfaces_the_message_and_leaves_state_alone() {
        let backend = Arc::new(MockBackend::new());
        let state = state_with(vec![entry(3, 3, QueueStatus::Waiting)], vec![], vec![]);
        let ops = service(backend.clone(), state.clone());

        backend.fail_next_op("queue 3 was already reordered");
        let err = ops.skip(3).await.expect_err("skip should fail");
        assert_eq!(
            err.to_string(),
            "queue service unavailable: queue 3 was already reordered"
        );
        assert_eq!(state.version.load(Ordering::SeqCst), 0);

        let store = state.store.read().await;
        assert_eq!(
            store.entry(3).expect("entry remains").status,
            QueueStatus::Waiting
        );
    }

    #[tokio::test]
    async fn update_status_to_in_progress_requires_a_doctor() {
        let backend = Arc::new(MockBackend::new());
        let state = state_with(vec![entry(1, 1, QueueStatus::Waiting)], vec![], vec![]);
        let ops = service(backend.clone(), state);

        let err = ops
            .update_status(1, QueueStatus::InProgress, None)
            .await
            .expect_err("transition should be rejected");
        assert!(matches!(err, QueueError::Validation(_)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn update_status_mirrors_the_confirmed_transition() {
        let backend = Arc::new(MockBackend::new());
        let state = state_with(vec![entry(1, 1, QueueStatus::Waiting)], vec![], vec![]);
        let ops = service(backend.clone(), state.clone());

        ops.update_status(1, QueueStatus::InProgress, Some(7))
            .await
            .expect("transition should succeed");

        let store = state.store.read().await;
        let updated = store.entry(1).expect("entry should exist");
        assert_eq!(updated.status, QueueStatus::InProgress);
        assert_eq!(updated.doctor_id, Some(7));
        assert!(updated.start_time.is_some());
    }

    #[tokio::test]
    async fn prioritize_requires_an_emergency_classification() {
        let backend = Arc::new(MockBackend::new());
        let state = state_with(
            vec![entry(1, 1, QueueStatus::Waiting)],
            vec![],
            vec![(101, 20.0)],
        );
        let ops = service(backend.clone(), state);

        let err = ops
            .prioritize_emergency(1)
            .await
            .expect_err("non-emergency should be rejected");
        assert!(matches!(err, QueueError::Validation(_)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn send_to_emergency_retires_the_entry_locally() {
        let backend = Arc::new(MockBackend::new());
        let state = state_with(
            vec![entry(1, 1, QueueStatus::Waiting)],
            vec![],
            vec![(101, 80.0)],
        );
        let ops = service(backend.clone(), state.clone());

        ops.send_to_emergency(1)
            .await
            .expect("handoff should succeed");
        assert_eq!(backend.calls(), vec!["send-to-emergency:1"]);

        let store = state.store.read().await;
        assert_eq!(store.active_entries().count(), 0);
    }

    #[tokio::test]
    async fn start_queue_requires_waiting_patients_and_free_doctors() {
        let backend = Arc::new(MockBackend::new());
        let state = state_with(vec![], vec![doctor(1, "Dr. Reyes")], vec![]);
        let ops = service(backend.clone(), state);

        let err = ops
            .start_queue()
            .await
            .expect_err("empty queue should be rejected");
        assert!(matches!(err, QueueError::Validation(_)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn start_queue_mirrors_the_batch_assignment() {
        let backend = Arc::new(MockBackend::new());
        let state = state_with(
            vec![
                entry(10, 1, QueueStatus::Waiting),
                entry(20, 2, QueueStatus::Waiting),
            ],
            vec![doctor(7, "Dr. Reyes")],
            vec![(120, 80.0)],
        );
        let ops = service(backend.clone(), state.clone());

        ops.start_queue().await.expect("start should succeed");
        assert_eq!(backend.calls(), vec!["start-queue"]);

        let store = state.store.read().await;
        // Only one doctor was free, so only the critical patient started.
        let started = store.entry(20).expect("entry should exist");
        assert_eq!(started.status, QueueStatus::InProgress);
        assert_eq!(started.doctor_id, Some(7));
        assert_eq!(
            store.entry(10).expect("entry should exist").status,
            QueueStatus::Waiting
        );
    }
}
