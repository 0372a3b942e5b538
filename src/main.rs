use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use capdq_client::HttpQueueBackend;
use capdq_core::{
    CoreConfig, DEFAULT_SKIP_POSITIONS, QueueEngine, QueueError, QueueStatus, TriagedEntry,
};
use capdq_types::NonEmptyText;

/// Application state shared across REST handlers.
///
/// Holds the queue engine; every handler is a thin mapping between HTTP
/// and an engine call.
#[derive(Clone)]
struct AppState {
    engine: Arc<QueueEngine>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        board,
        refresh,
        start_queue,
        recompute_emergencies,
        update_status,
        skip,
        prioritize,
        send_to_emergency
    ),
    components(schemas(
        HealthRes,
        BoardRes,
        QueueEntryRes,
        DoctorRes,
        OperationRes,
        UpdateStatusReq
    ))
)]
struct ApiDoc;

/// Main entry point for the CAPDQ queue engine.
///
/// Wires the configuration, the backend HTTP client, the polling task
/// and the REST driver surface, then serves until interrupted.
///
/// # Environment Variables
/// - `CAPDQ_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CAPDQ_BACKEND_URL`: base URL of the external queue service
///   (default: "http://localhost:8080/api")
/// - `CAPDQ_BEARER_TOKEN`: token attached to every backend call
/// - `CAPDQ_CLINIC_NAME`: clinic display name
/// - `CAPDQ_POLL_INTERVAL_SECS`: refresh interval (default: 30)
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("capdq=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("CAPDQ_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let backend_url = std::env::var("CAPDQ_BACKEND_URL")
        .unwrap_or_else(|_| "http://localhost:8080/api".into());
    let bearer_token =
        NonEmptyText::new(std::env::var("CAPDQ_BEARER_TOKEN").unwrap_or_else(|_| "dev-token".into()))?;
    let clinic_name =
        NonEmptyText::new(std::env::var("CAPDQ_CLINIC_NAME").unwrap_or_else(|_| "CAPD Clinic".into()))?;
    let poll_secs: u64 = std::env::var("CAPDQ_POLL_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);

    let config = Arc::new(CoreConfig::new(
        backend_url,
        bearer_token,
        clinic_name,
        Duration::from_secs(poll_secs),
        DEFAULT_SKIP_POSITIONS,
    )?);

    let backend = Arc::new(HttpQueueBackend::new(&config)?);
    let engine = Arc::new(QueueEngine::new(backend, config.clone()));

    tracing::info!("++ Starting CAPDQ REST on {}", rest_addr);
    tracing::info!(
        clinic = %config.clinic_name(),
        backend = config.backend_base_url(),
        poll_secs,
        "queue engine configured"
    );

    // One subscriber is always attached: the notification log. Sound or
    // toast frontends subscribe the same way.
    let mut notifications = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = notifications.recv().await {
            tracing::info!(?event, "queue notification");
        }
    });

    let poller = engine.spawn_poller();

    let app = Router::new()
        .route("/health", get(health))
        .route("/queue/board", get(board))
        .route("/queue/refresh", post(refresh))
        .route("/queue/start", post(start_queue))
        .route("/queue/recompute-emergencies", post(recompute_emergencies))
        .route("/queue/:queue_id/status", post(update_status))
        .route("/queue/:queue_id/skip", post(skip))
        .route("/queue/:queue_id/prioritize", post(prioritize))
        .route("/queue/:queue_id/send-to-emergency", post(send_to_emergency))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(AppState { engine });

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    poller.shutdown().await;
    Ok(())
}

#[derive(Serialize, ToSchema)]
struct HealthRes {
    ok: bool,
    message: String,
}

#[derive(Serialize, ToSchema)]
struct QueueEntryRes {
    queue_id: i64,
    queue_number: u32,
    patient_id: i64,
    patient_name: String,
    status: String,
    doctor_id: Option<i64>,
    start_time: Option<String>,
    is_emergency: bool,
    priority: u8,
    priority_label: String,
    advisory: String,
    solution_label: String,
    solution_guidance: String,
    clinical_note: Option<String>,
}

impl From<&TriagedEntry> for QueueEntryRes {
    fn from(triaged: &TriagedEntry) -> Self {
        QueueEntryRes {
            queue_id: triaged.entry.queue_id,
            queue_number: triaged.entry.queue_number,
            patient_id: triaged.entry.patient.patient_id,
            patient_name: triaged.entry.patient.display_name.clone(),
            status: triaged.entry.status.to_string(),
            doctor_id: triaged.entry.doctor_id,
            start_time: triaged.entry.start_time.map(|t| t.to_rfc3339()),
            is_emergency: triaged.assessment.is_emergency,
            priority: triaged.assessment.priority,
            priority_label: triaged.assessment.label.to_string(),
            advisory: triaged.assessment.advisory.to_string(),
            solution_label: triaged.assessment.solution.label.to_string(),
            solution_guidance: triaged.assessment.solution.guidance.to_string(),
            clinical_note: triaged.clinical_note.clone(),
        }
    }
}

#[derive(Serialize, ToSchema)]
struct DoctorRes {
    doctor_id: i64,
    name: String,
    specialization: String,
}

#[derive(Serialize, ToSchema)]
struct BoardRes {
    clinic_time: String,
    waiting: Vec<QueueEntryRes>,
    in_progress: Vec<QueueEntryRes>,
    completed: Vec<QueueEntryRes>,
    cancelled: Vec<QueueEntryRes>,
    emergency: Vec<QueueEntryRes>,
    next_for_consultation: Vec<QueueEntryRes>,
    available_doctors: Vec<DoctorRes>,
}

#[derive(Serialize, ToSchema)]
struct OperationRes {
    ok: bool,
    message: String,
}

#[derive(Deserialize, ToSchema)]
struct UpdateStatusReq {
    /// One of "waiting", "in_progress", "completed", "cancelled".
    status: String,
    doctor_id: Option<i64>,
}

fn entries(list: &[TriagedEntry]) -> Vec<QueueEntryRes> {
    list.iter().map(QueueEntryRes::from).collect()
}

fn operation_ok() -> Json<OperationRes> {
    Json(OperationRes {
        ok: true,
        message: "ok".into(),
    })
}

fn operation_err(err: QueueError) -> (StatusCode, Json<OperationRes>) {
    let status = match err {
        QueueError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        QueueError::StaleData => StatusCode::CONFLICT,
        QueueError::ServiceUnavailable(_) | QueueError::ClinicalDataUnavailable { .. } => {
            StatusCode::BAD_GATEWAY
        }
    };
    tracing::warn!(error = %err, "queue operation failed");
    (
        status,
        Json(OperationRes {
            ok: false,
            message: err.to_string(),
        }),
    )
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint used by monitoring and load balancers.
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "CAPDQ is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/queue/board",
    responses(
        (status = 200, description = "The categorized queue board", body = BoardRes)
    )
)]
/// The full queue board: every category, the consultation plan and the
/// free doctors, each entry annotated with its triage assessment.
async fn board(State(state): State<AppState>) -> Json<BoardRes> {
    let board = state.engine.board().await;
    Json(BoardRes {
        clinic_time: board.clinic_time.to_rfc3339(),
        waiting: entries(&board.waiting),
        in_progress: entries(&board.in_progress),
        completed: entries(&board.completed),
        cancelled: entries(&board.cancelled),
        emergency: entries(&board.emergency),
        next_for_consultation: entries(&board.next_for_consultation),
        available_doctors: board
            .available_doctors
            .iter()
            .map(|d| DoctorRes {
                doctor_id: d.doctor_id,
                name: d.name.clone(),
                specialization: d.specialization.clone(),
            })
            .collect(),
    })
}

#[utoipa::path(
    post,
    path = "/queue/refresh",
    responses(
        (status = 200, description = "Snapshot refreshed", body = OperationRes),
        (status = 502, description = "Queue service unavailable", body = OperationRes)
    )
)]
/// On-demand refresh from the queue service.
async fn refresh(
    State(state): State<AppState>,
) -> Result<Json<OperationRes>, (StatusCode, Json<OperationRes>)> {
    match state.engine.refresh().await {
        Ok(()) => Ok(operation_ok()),
        Err(err) => Err(operation_err(err)),
    }
}

#[utoipa::path(
    post,
    path = "/queue/start",
    responses(
        (status = 200, description = "Consultations started", body = OperationRes),
        (status = 422, description = "Nothing to start", body = OperationRes),
        (status = 502, description = "Queue service unavailable", body = OperationRes)
    )
)]
/// Starts consultations for the top-ranked waiting patients, one per
/// available doctor.
async fn start_queue(
    State(state): State<AppState>,
) -> Result<Json<OperationRes>, (StatusCode, Json<OperationRes>)> {
    match state.engine.start_queue().await {
        Ok(()) => Ok(operation_ok()),
        Err(err) => Err(operation_err(err)),
    }
}

#[utoipa::path(
    post,
    path = "/queue/recompute-emergencies",
    responses(
        (status = 200, description = "Recomputation triggered", body = OperationRes),
        (status = 502, description = "Queue service unavailable", body = OperationRes)
    )
)]
/// Asks the queue service to recompute emergency classifications, then
/// refreshes the snapshot.
async fn recompute_emergencies(
    State(state): State<AppState>,
) -> Result<Json<OperationRes>, (StatusCode, Json<OperationRes>)> {
    match state.engine.update_emergency_statuses().await {
        Ok(()) => Ok(operation_ok()),
        Err(err) => Err(operation_err(err)),
    }
}

#[utoipa::path(
    post,
    path = "/queue/{queue_id}/status",
    request_body = UpdateStatusReq,
    params(("queue_id" = i64, Path, description = "Queue entry identifier")),
    responses(
        (status = 200, description = "Status updated", body = OperationRes),
        (status = 400, description = "Unknown status value", body = OperationRes),
        (status = 422, description = "Precondition violated", body = OperationRes),
        (status = 502, description = "Queue service unavailable", body = OperationRes)
    )
)]
/// Requests a status transition for one queue entry.
async fn update_status(
    State(state): State<AppState>,
    Path(queue_id): Path<i64>,
    Json(req): Json<UpdateStatusReq>,
) -> Result<Json<OperationRes>, (StatusCode, Json<OperationRes>)> {
    let status = match req.status.as_str() {
        "waiting" => QueueStatus::Waiting,
        "in_progress" => QueueStatus::InProgress,
        "completed" => QueueStatus::Completed,
        "cancelled" => QueueStatus::Cancelled,
        other => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(OperationRes {
                    ok: false,
                    message: format!("unknown status: {other}"),
                }),
            ));
        }
    };

    match state
        .engine
        .update_status(queue_id, status, req.doctor_id)
        .await
    {
        Ok(()) => Ok(operation_ok()),
        Err(err) => Err(operation_err(err)),
    }
}

#[utoipa::path(
    post,
    path = "/queue/{queue_id}/skip",
    params(("queue_id" = i64, Path, description = "Queue entry identifier")),
    responses(
        (status = 200, description = "Entry skipped", body = OperationRes),
        (status = 422, description = "Entry is not waiting", body = OperationRes),
        (status = 502, description = "Queue service unavailable", body = OperationRes)
    )
)]
/// Pushes a waiting entry back in the order.
async fn skip(
    State(state): State<AppState>,
    Path(queue_id): Path<i64>,
) -> Result<Json<OperationRes>, (StatusCode, Json<OperationRes>)> {
    match state.engine.skip(queue_id).await {
        Ok(()) => Ok(operation_ok()),
        Err(err) => Err(operation_err(err)),
    }
}

#[utoipa::path(
    post,
    path = "/queue/{queue_id}/prioritize",
    params(("queue_id" = i64, Path, description = "Queue entry identifier")),
    responses(
        (status = 200, description = "Entry prioritized", body = OperationRes),
        (status = 422, description = "Entry is not a waiting emergency", body = OperationRes),
        (status = 502, description = "Queue service unavailable", body = OperationRes)
    )
)]
/// Moves a waiting emergency entry to the front of the order.
async fn prioritize(
    State(state): State<AppState>,
    Path(queue_id): Path<i64>,
) -> Result<Json<OperationRes>, (StatusCode, Json<OperationRes>)> {
    match state.engine.prioritize_emergency(queue_id).await {
        Ok(()) => Ok(operation_ok()),
        Err(err) => Err(operation_err(err)),
    }
}

#[utoipa::path(
    post,
    path = "/queue/{queue_id}/send-to-emergency",
    params(("queue_id" = i64, Path, description = "Queue entry identifier")),
    responses(
        (status = 200, description = "Patient handed off", body = OperationRes),
        (status = 422, description = "Entry is not a waiting emergency", body = OperationRes),
        (status = 502, description = "Queue service unavailable", body = OperationRes)
    )
)]
/// Hands a waiting emergency patient off to the emergency department.
async fn send_to_emergency(
    State(state): State<AppState>,
    Path(queue_id): Path<i64>,
) -> Result<Json<OperationRes>, (StatusCode, Json<OperationRes>)> {
    match state.engine.send_to_emergency(queue_id).await {
        Ok(()) => Ok(operation_ok()),
        Err(err) => Err(operation_err(err)),
    }
}
