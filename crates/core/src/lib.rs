//! # CAPDQ Core
//!
//! Queue and emergency-triage engine for a CAPD clinic.
//!
//! This crate holds the pure scheduling/triage logic and the
//! orchestration around it:
//! - Triage of a patient's fluid-overload percentage into priority,
//!   advisory note and recommended PD solution
//! - An in-memory snapshot of today's queue and duty roster with
//!   filtered views
//! - Next-for-consultation planning bounded by free doctors
//! - Validated, optimistic queue operations against the external service
//! - A periodic refresh task with count-delta notification events
//!
//! **No transport concerns**: the HTTP client for the external service
//! lives in `capdq-client`, and the REST driver surface in `capdq-run`.

pub mod backend;
pub mod clock;
pub mod config;
pub mod engine;
pub mod events;
pub mod model;
pub mod ops;
pub mod planner;
pub mod poller;
pub mod store;
pub mod triage;

mod error;

pub use backend::QueueBackend;
pub use config::{CoreConfig, DEFAULT_POLL_INTERVAL, DEFAULT_SKIP_POSITIONS};
pub use engine::{QueueBoard, QueueEngine, TriagedEntry};
pub use error::{QueueError, QueueResult};
pub use events::QueueEvent;
pub use model::{
    CheckupStatus, ClinicalMetric, Doctor, PatientRef, QueueEntry, QueueStatus,
};
pub use poller::PollerHandle;
pub use triage::{evaluate, PriorityLabel, RiskAssessment, SolutionRecommendation};
