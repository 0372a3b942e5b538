//! In-memory snapshot of today's queue, roster and clinical readings.
//!
//! The external service is the sole source of truth; this store is a
//! read-through cache with a last-poll-wins refresh policy. `load`
//! replaces state wholesale, and `apply_status_change` applies the
//! optimistic local update after the service confirms a write.

use crate::model::{CheckupStatus, ClinicalMetric, Doctor, QueueEntry, QueueStatus};
use crate::triage::{self, RiskAssessment};
use crate::{QueueError, QueueResult};
use capdq_types::FluidOverload;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Per-patient clinical readings for the current snapshot.
#[derive(Debug, Clone, Default)]
pub struct ClinicalIndex {
    metrics: HashMap<i64, ClinicalMetric>,
}

impl ClinicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, patient_id: i64, metric: ClinicalMetric) {
        self.metrics.insert(patient_id, metric);
    }

    /// The recorded reading, or the zero reading for unknown patients.
    pub fn percentage(&self, patient_id: i64) -> FluidOverload {
        self.metrics
            .get(&patient_id)
            .map(|m| m.percentage)
            .unwrap_or(FluidOverload::ZERO)
    }

    pub fn note(&self, patient_id: i64) -> Option<&str> {
        self.metrics
            .get(&patient_id)
            .and_then(|m| m.note.as_deref())
    }

    /// Triage assessment for a patient, defaulting to Normal when no
    /// reading is recorded.
    pub fn assess(&self, patient_id: i64) -> RiskAssessment {
        triage::evaluate(self.percentage(patient_id))
    }
}

/// The day's queue entries and doctor roster.
#[derive(Debug, Default)]
pub struct QueueStore {
    entries: Vec<QueueEntry>,
    doctors: Vec<Doctor>,
    clinical: ClinicalIndex,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the snapshot wholesale. No merge logic: the poll result
    /// wins completely.
    pub fn load(
        &mut self,
        entries: Vec<QueueEntry>,
        doctors: Vec<Doctor>,
        clinical: ClinicalIndex,
    ) {
        self.entries = entries;
        self.doctors = doctors;
        self.clinical = clinical;
    }

    pub fn entry(&self, queue_id: i64) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.queue_id == queue_id)
    }

    pub fn doctors(&self) -> &[Doctor] {
        &self.doctors
    }

    pub fn clinical(&self) -> &ClinicalIndex {
        &self.clinical
    }

    /// All entries still participating in active views, i.e. everything
    /// not completed at checkup level.
    pub fn active_entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter().filter(|e| e.is_active())
    }

    pub fn by_status(&self, status: QueueStatus) -> Vec<&QueueEntry> {
        self.active_entries()
            .filter(|e| e.status == status)
            .collect()
    }

    /// Waiting entries whose fluid-overload reading classifies them as an
    /// emergency.
    pub fn emergency_waiting(&self) -> Vec<&QueueEntry> {
        self.by_status(QueueStatus::Waiting)
            .into_iter()
            .filter(|e| self.clinical.assess(e.patient.patient_id).is_emergency)
            .collect()
    }

    /// Doctors with no in-progress consultation assigned to them.
    pub fn available_doctors(&self) -> Vec<&Doctor> {
        self.doctors
            .iter()
            .filter(|d| {
                !self.entries.iter().any(|e| {
                    e.status == QueueStatus::InProgress && e.doctor_id == Some(d.doctor_id)
                })
            })
            .collect()
    }

    /// Entries that finished treatment but have not yet been completed at
    /// checkup level. The poll delta on this count drives the
    /// completed-treatment notification.
    pub fn completed_pending_checkup_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == QueueStatus::Completed && e.is_active())
            .count()
    }

    pub fn in_progress_count(&self) -> usize {
        self.by_status(QueueStatus::InProgress).len()
    }

    /// Applies a confirmed status transition in place.
    ///
    /// Moving to `InProgress` stamps `start_time` and assigns the doctor;
    /// moving to `Completed` also completes the entry at checkup level,
    /// which retires it from active views.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Validation` when the entry does not exist, or
    /// when an `InProgress` transition arrives without a doctor.
    pub fn apply_status_change(
        &mut self,
        queue_id: i64,
        new_status: QueueStatus,
        doctor_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> QueueResult<()> {
        if new_status == QueueStatus::InProgress && doctor_id.is_none() {
            return Err(QueueError::validation(
                "starting a consultation requires a doctor",
            ));
        }

        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.queue_id == queue_id)
            .ok_or_else(|| QueueError::validation(format!("queue entry {queue_id} not found")))?;

        entry.status = new_status;
        match new_status {
            QueueStatus::InProgress => {
                entry.doctor_id = doctor_id;
                entry.start_time = Some(now);
            }
            QueueStatus::Completed => {
                entry.checkup_status = CheckupStatus::Completed;
            }
            QueueStatus::Waiting | QueueStatus::Cancelled => {}
        }

        Ok(())
    }

    /// Retires an entry from the active views without a status change,
    /// used when a patient is handed off to the emergency department.
    pub fn mark_left_queue(&mut self, queue_id: i64) -> QueueResult<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.queue_id == queue_id)
            .ok_or_else(|| QueueError::validation(format!("queue entry {queue_id} not found")))?;
        entry.checkup_status = CheckupStatus::Completed;
        Ok(())
    }
}
