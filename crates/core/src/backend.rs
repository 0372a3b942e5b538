//! Contract with the external queue/roster service.
//!
//! The service owns queue creation, the authoritative ordering and the
//! day's roster; the engine reads snapshots from it and requests
//! transitions through it. Authentication is the transport's concern and
//! does not appear here.

use crate::model::{ClinicalMetric, Doctor, QueueEntry, QueueStatus};
use crate::QueueResult;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Operations the external queue service exposes.
///
/// Implementations must be cheap to share behind an `Arc`; the engine
/// calls them from the polling task and operation handlers concurrently.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// The queue entries for the given clinic-local date.
    async fn today_queues(&self, date: NaiveDate) -> QueueResult<Vec<QueueEntry>>;

    /// The doctors on duty today.
    async fn doctors_on_duty(&self) -> QueueResult<Vec<Doctor>>;

    /// The fluid-overload reading for one patient.
    async fn patient_metric(&self, patient_id: i64) -> QueueResult<ClinicalMetric>;

    /// Requests a status transition for one queue entry.
    async fn update_queue_status(
        &self,
        queue_id: i64,
        status: QueueStatus,
        doctor_id: Option<i64>,
    ) -> QueueResult<()>;

    /// Pushes a waiting entry back by `positions` slots. The reorder is
    /// performed server-side; callers refetch afterwards.
    async fn skip_queue(&self, queue_id: i64, positions: u32) -> QueueResult<()>;

    /// Moves a waiting emergency entry to the front of the waiting order.
    async fn prioritize_emergency(&self, queue_id: i64) -> QueueResult<()>;

    /// Hands a waiting emergency entry off to the emergency department,
    /// removing it from the normal queue flow.
    async fn send_to_emergency(&self, queue_id: i64) -> QueueResult<()>;

    /// Starts consultations: the service assigns free doctors to the
    /// top-ranked waiting patients in one batch.
    async fn start_queue(&self) -> QueueResult<()>;

    /// Triggers a bulk recomputation of emergency classifications.
    async fn update_emergency_statuses(&self) -> QueueResult<()>;
}
