//! Queue, roster and clinical-metric records.
//!
//! These mirror what the external queue service stores. The engine never
//! creates or deletes queue entries; it reads them, reclassifies status
//! and requests transitions. An entry leaves the active views either by
//! `status = Cancelled` or by checkup-level completion, never by deletion.

use capdq_types::FluidOverload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queue lifecycle status.
///
/// The effective lifecycle is `Waiting -> InProgress -> Completed`, with
/// `Waiting -> Cancelled` as the alternate exit. Skip and prioritize
/// change relative order only, not status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    InProgress,
    Completed,
    Cancelled,
}

impl QueueStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Waiting => "waiting",
            QueueStatus::InProgress => "in_progress",
            QueueStatus::Completed => "completed",
            QueueStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checkup-level completion, independent of [`QueueStatus`].
///
/// A patient can be completed at checkup level while the queue status
/// still says otherwise; such entries are archived-in-place and excluded
/// from every active view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckupStatus {
    Completed,
    NotCompleted,
}

impl CheckupStatus {
    pub fn is_completed(self) -> bool {
        matches!(self, CheckupStatus::Completed)
    }
}

/// Opaque link to the external patient record, with the display name the
/// queue board needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRef {
    pub patient_id: i64,
    pub display_name: String,
}

/// One patient's position and state in today's consultation queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Identifier assigned by the external queue service.
    pub queue_id: i64,
    /// Display and tie-break ordering; unique within a day.
    pub queue_number: u32,
    pub patient: PatientRef,
    pub status: QueueStatus,
    pub checkup_status: CheckupStatus,
    /// Set if and only if the entry is `InProgress`, or was historically
    /// for entries that passed through it on the way to `Completed`.
    pub doctor_id: Option<i64>,
    /// Set when the entry transitions to `InProgress`.
    pub start_time: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Whether the entry still participates in active views.
    pub fn is_active(&self) -> bool {
        !self.checkup_status.is_completed()
    }
}

/// A doctor on today's duty roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
    pub doctor_id: i64,
    pub name: String,
    pub specialization: String,
}

/// Per-patient clinical reading, looked up from the external service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClinicalMetric {
    pub percentage: FluidOverload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ClinicalMetric {
    pub const UNAVAILABLE_NOTE: &'static str = "Data temporarily unavailable";

    /// The degraded reading used when the per-patient lookup fails: the
    /// patient classifies as Normal and the refresh carries on.
    pub fn unavailable() -> Self {
        Self {
            percentage: FluidOverload::ZERO,
            note: Some(Self::UNAVAILABLE_NOTE.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&QueueStatus::InProgress).expect("serialize"),
            "\"in_progress\""
        );
        let back: QueueStatus = serde_json::from_str("\"waiting\"").expect("deserialize");
        assert_eq!(back, QueueStatus::Waiting);
    }

    #[test]
    fn checkup_completed_entries_are_not_active() {
        let entry = QueueEntry {
            queue_id: 1,
            queue_number: 4,
            patient: PatientRef {
                patient_id: 9,
                display_name: "A. Santos".into(),
            },
            status: QueueStatus::Waiting,
            checkup_status: CheckupStatus::Completed,
            doctor_id: None,
            start_time: None,
        };
        assert!(!entry.is_active());
    }

    #[test]
    fn unavailable_metric_reads_as_zero_with_note() {
        let metric = ClinicalMetric::unavailable();
        assert_eq!(metric.percentage.value(), 0.0);
        assert_eq!(metric.note.as_deref(), Some("Data temporarily unavailable"));
    }
}
