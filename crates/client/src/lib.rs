//! # CAPDQ Client
//!
//! HTTP implementation of the engine's [`QueueBackend`] contract against
//! the clinic's queue/roster REST service.
//!
//! Handles:
//! - JSON wire types and their mapping onto the engine's records
//! - Bearer-token pass-through (the token is issued elsewhere; this crate
//!   only attaches it)
//! - Surfacing service-provided error messages, with a generic fallback
//!
//! Timeouts live on the underlying `reqwest` client so no call can hang
//! indefinitely; every failure is reported as `ServiceUnavailable`.

use async_trait::async_trait;
use capdq_core::{
    CheckupStatus, ClinicalMetric, CoreConfig, Doctor, PatientRef, QueueBackend, QueueEntry,
    QueueError, QueueResult, QueueStatus,
};
use capdq_types::FluidOverload;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `QueueBackend` over the clinic's REST service.
pub struct HttpQueueBackend {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl HttpQueueBackend {
    /// Builds a client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` if the underlying HTTP client cannot
    /// be constructed.
    pub fn new(config: &CoreConfig) -> QueueResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| QueueError::service(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.backend_base_url().to_string(),
            bearer_token: config.bearer_token().as_str().to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> QueueResult<T> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.bearer_token)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;

        parse_success(response).await
    }

    async fn post_command<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> QueueResult<()> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.bearer_token)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        check_success(response).await.map(|_| ())
    }
}

#[async_trait]
impl QueueBackend for HttpQueueBackend {
    async fn today_queues(&self, date: NaiveDate) -> QueueResult<Vec<QueueEntry>> {
        let res: TodayQueuesRes = self
            .get_json("today-queues", &[("date", date.format("%Y-%m-%d").to_string())])
            .await?;
        Ok(res.queues.into_iter().map(QueueEntry::from).collect())
    }

    async fn doctors_on_duty(&self) -> QueueResult<Vec<Doctor>> {
        let res: DoctorsOnDutyRes = self.get_json("doctors-on-duty", &[]).await?;
        Ok(res.doctors.into_iter().map(Doctor::from).collect())
    }

    async fn patient_metric(&self, patient_id: i64) -> QueueResult<ClinicalMetric> {
        let path = format!("enhanced-patient-data/{patient_id}");
        let res: Result<EnhancedPatientDataRes, QueueError> = self.get_json(&path, &[]).await;
        match res {
            Ok(data) => Ok(data.into()),
            Err(err) => {
                tracing::debug!(patient_id, error = %err, "clinical metric fetch failed");
                Err(QueueError::ClinicalDataUnavailable { patient_id })
            }
        }
    }

    async fn update_queue_status(
        &self,
        queue_id: i64,
        status: QueueStatus,
        doctor_id: Option<i64>,
    ) -> QueueResult<()> {
        self.post_command(
            "update-queue-status",
            &UpdateQueueStatusReq {
                queue_id,
                status,
                doctor_id,
            },
        )
        .await
    }

    async fn skip_queue(&self, queue_id: i64, positions: u32) -> QueueResult<()> {
        self.post_command("skip-queue", &SkipQueueReq { queue_id, positions })
            .await
    }

    async fn prioritize_emergency(&self, queue_id: i64) -> QueueResult<()> {
        self.post_command("prioritize-emergency-patient", &QueueIdReq { queue_id })
            .await
    }

    async fn send_to_emergency(&self, queue_id: i64) -> QueueResult<()> {
        self.post_command("send-to-emergency", &QueueIdReq { queue_id })
            .await
    }

    async fn start_queue(&self) -> QueueResult<()> {
        self.post_command("start-queue", &serde_json::json!({})).await
    }

    async fn update_emergency_statuses(&self) -> QueueResult<()> {
        self.post_command("update-emergency-statuses", &serde_json::json!({}))
            .await
    }
}

fn transport_error(err: reqwest::Error) -> QueueError {
    QueueError::service(format!("request failed: {err}"))
}

async fn check_success(response: reqwest::Response) -> QueueResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    // Prefer the message the service put in the body, if it sent one.
    let message = response
        .json::<WireErrorRes>()
        .await
        .ok()
        .and_then(|e| e.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("queue service returned {status}"));

    Err(QueueError::service(message))
}

async fn parse_success<T: DeserializeOwned>(response: reqwest::Response) -> QueueResult<T> {
    let response = check_success(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| QueueError::service(format!("malformed service response: {e}")))
}

// Wire types, camelCase as the service sends them.

#[derive(Debug, Deserialize)]
struct WireErrorRes {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TodayQueuesRes {
    queues: Vec<WireQueueEntry>,
}

#[derive(Debug, Deserialize)]
struct DoctorsOnDutyRes {
    doctors: Vec<WireDoctor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireQueueEntry {
    queue_id: i64,
    queue_number: u32,
    patient_id: i64,
    #[serde(default)]
    patient_name: String,
    status: QueueStatus,
    #[serde(default = "default_checkup_status")]
    checkup_status: CheckupStatus,
    #[serde(default)]
    doctor_id: Option<i64>,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
}

fn default_checkup_status() -> CheckupStatus {
    CheckupStatus::NotCompleted
}

impl From<WireQueueEntry> for QueueEntry {
    fn from(wire: WireQueueEntry) -> Self {
        QueueEntry {
            queue_id: wire.queue_id,
            queue_number: wire.queue_number,
            patient: PatientRef {
                patient_id: wire.patient_id,
                display_name: wire.patient_name,
            },
            status: wire.status,
            checkup_status: wire.checkup_status,
            doctor_id: wire.doctor_id,
            start_time: wire.start_time,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDoctor {
    doctor_id: i64,
    name: String,
    #[serde(default)]
    specialization: String,
}

impl From<WireDoctor> for Doctor {
    fn from(wire: WireDoctor) -> Self {
        Doctor {
            doctor_id: wire.doctor_id,
            name: wire.name,
            specialization: wire.specialization,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnhancedPatientDataRes {
    #[serde(default)]
    percentage: Option<f64>,
    #[serde(default)]
    note: Option<String>,
}

impl From<EnhancedPatientDataRes> for ClinicalMetric {
    fn from(wire: EnhancedPatientDataRes) -> Self {
        ClinicalMetric {
            percentage: wire
                .percentage
                .map(FluidOverload::new)
                .unwrap_or(FluidOverload::ZERO),
            note: wire.note,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateQueueStatusReq {
    queue_id: i64,
    status: QueueStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    doctor_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SkipQueueReq {
    queue_id: i64,
    positions: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueueIdReq {
    queue_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_entry_wire_mapping_covers_optionals() {
        let json = r#"{
            "queues": [
                {
                    "queueId": 12,
                    "queueNumber": 4,
                    "patientId": 88,
                    "patientName": "A. Santos",
                    "status": "in_progress",
                    "checkupStatus": "not_completed",
                    "doctorId": 3,
                    "startTime": "2024-03-10T01:30:00Z"
                },
                {
                    "queueId": 13,
                    "queueNumber": 5,
                    "patientId": 89,
                    "status": "waiting"
                }
            ]
        }"#;

        let res: TodayQueuesRes = serde_json::from_str(json).expect("deserialize");
        let entries: Vec<QueueEntry> = res.queues.into_iter().map(QueueEntry::from).collect();

        assert_eq!(entries[0].queue_id, 12);
        assert_eq!(entries[0].status, QueueStatus::InProgress);
        assert_eq!(entries[0].doctor_id, Some(3));
        assert!(entries[0].start_time.is_some());

        assert_eq!(entries[1].patient.display_name, "");
        assert_eq!(entries[1].status, QueueStatus::Waiting);
        assert_eq!(entries[1].checkup_status, CheckupStatus::NotCompleted);
        assert_eq!(entries[1].doctor_id, None);
    }

    #[test]
    fn patient_data_without_percentage_reads_as_zero() {
        let res: EnhancedPatientDataRes =
            serde_json::from_str(r#"{"note": "no reading today"}"#).expect("deserialize");
        let metric = ClinicalMetric::from(res);
        assert_eq!(metric.percentage.value(), 0.0);
        assert_eq!(metric.note.as_deref(), Some("no reading today"));
    }

    #[test]
    fn status_update_request_omits_absent_doctor() {
        let without = serde_json::to_value(UpdateQueueStatusReq {
            queue_id: 9,
            status: QueueStatus::Cancelled,
            doctor_id: None,
        })
        .expect("serialize");
        assert_eq!(
            without,
            serde_json::json!({"queueId": 9, "status": "cancelled"})
        );

        let with = serde_json::to_value(UpdateQueueStatusReq {
            queue_id: 9,
            status: QueueStatus::InProgress,
            doctor_id: Some(2),
        })
        .expect("serialize");
        assert_eq!(
            with,
            serde_json::json!({"queueId": 9, "status": "in_progress", "doctorId": 2})
        );
    }

    #[test]
    fn doctor_wire_mapping_defaults_missing_specialization() {
        let res: DoctorsOnDutyRes = serde_json::from_str(
            r#"{"doctors": [{"doctorId": 1, "name": "Dr. Reyes"}]}"#,
        )
        .expect("deserialize");
        let doctors: Vec<Doctor> = res.doctors.into_iter().map(Doctor::from).collect();
        assert_eq!(doctors[0].doctor_id, 1);
        assert_eq!(doctors[0].specialization, "");
    }
}
