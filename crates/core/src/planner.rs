//! Next-for-consultation planning.
//!
//! Ranks waiting patients by triage priority (descending), breaking ties
//! by queue number (ascending), and caps the plan at the number of
//! doctors currently free. Queue numbers are unique within a day, so the
//! ordering is total.

use crate::model::{Doctor, QueueEntry};
use crate::store::QueueStore;

/// The waiting entries that should be seen next, in consultation order,
/// at most one per available doctor.
pub fn next_for_consultation(store: &QueueStore) -> Vec<QueueEntry> {
    let capacity = store.available_doctors().len();
    ranked_waiting(store)
        .into_iter()
        .take(capacity)
        .cloned()
        .collect()
}

/// Pairs each planned entry with the doctor who would take it.
///
/// The pairing is positional; the external service performs the
/// authoritative assignment, this mirror is only used for the optimistic
/// local update after a confirmed batch start.
pub fn plan_assignments(store: &QueueStore) -> Vec<(QueueEntry, Doctor)> {
    let doctors = store.available_doctors();
    ranked_waiting(store)
        .into_iter()
        .zip(doctors)
        .map(|(entry, doctor)| (entry.clone(), doctor.clone()))
        .collect()
}

fn ranked_waiting(store: &QueueStore) -> Vec<&QueueEntry> {
    let mut waiting = store.by_status(crate::model::QueueStatus::Waiting);
    waiting.sort_by(|a, b| {
        let pa = store.clinical().assess(a.patient.patient_id).priority;
        let pb = store.clinical().assess(b.patient.patient_id).priority;
        pb.cmp(&pa).then(a.queue_number.cmp(&b.queue_number))
    });
    waiting
}
