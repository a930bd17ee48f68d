use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use draw_core::{Countdown, DrawError, DrawPhase, DrawResult, Participant};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod engine;
pub mod store;

pub use config::Config;
pub use engine::{DrawEngine, EngineError, Registration};
pub use store::{DrawStore, JsonStore, StoreError};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<DrawEngine>,
    config: Arc<Config>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Arc::new(JsonStore::in_memory()), Config::default())
    }
}

impl AppState {
    pub fn new(store: Arc<dyn DrawStore>, config: Config) -> Self {
        Self {
            engine: Arc::new(DrawEngine::new(store)),
            config: Arc::new(config),
        }
    }

    /// Opens the JSON store at `PERSIST_PATH` when configured, otherwise keeps
    /// everything in memory.
    pub async fn from_config(config: Config) -> Result<Self, StoreError> {
        let store = match &config.persist_path {
            Some(path) => JsonStore::open(path.clone()).await?,
            None => JsonStore::in_memory(),
        };
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn engine(&self) -> &DrawEngine {
        &self.engine
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/participants",
            get(list_participants).post(register_participant),
        )
        .route("/api/draw", post(run_draw).get(draw_status))
        .route("/api/my-assignment", post(my_assignment))
        .route("/api/event", get(event_info))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct ParticipantsResponse {
    participants: Vec<Participant>,
}

#[derive(Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
    #[serde(default)]
    phone: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    participant: Option<Participant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Serialize)]
struct DrawResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<Vec<DrawResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DrawStatusResponse {
    phase: DrawPhase,
    has_run: bool,
    drawn_at: Option<DateTime<Utc>>,
    results: Vec<DrawResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignmentRequest {
    user_id: String,
}

#[derive(Serialize)]
struct AssignmentResponse {
    assigned: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventResponse {
    draw_date: DateTime<Utc>,
    countdown: Countdown,
    draw_date_passed: bool,
    phase: DrawPhase,
    has_run: bool,
    participant_count: usize,
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(DrawResponse {
            success: false,
            results: None,
            message: Some(message.into()),
        }),
    )
        .into_response()
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let provided = headers
        .get("x-admin-password")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided != state.config.admin_password {
        return Err(failure(StatusCode::UNAUTHORIZED, "invalid admin password"));
    }
    Ok(())
}

/// Status code and user-facing message for an engine error. Internal details
/// stay in the logs.
fn error_status(err: &EngineError) -> (StatusCode, String) {
    match err {
        EngineError::Draw(DrawError::InsufficientParticipants { .. }) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        EngineError::Draw(DrawError::AlreadyDrawn) => (StatusCode::CONFLICT, err.to_string()),
        EngineError::Draw(DrawError::DuplicateParticipant { .. })
        | EngineError::Draw(DrawError::RetryLimitExceeded { .. }) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal error while performing the draw".to_string(),
        ),
        EngineError::Store(StoreError::DuplicateEmail(_)) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        EngineError::Store(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "could not save changes, please try again".to_string(),
        ),
        EngineError::InvalidRegistration(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        EngineError::RegistrationClosed => (StatusCode::CONFLICT, err.to_string()),
    }
}

async fn list_participants(State(state): State<AppState>) -> impl IntoResponse {
    Json(ParticipantsResponse {
        participants: state.engine.participants().await,
    })
}

async fn register_participant(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> impl IntoResponse {
    let registration = Registration {
        name: payload.name,
        email: payload.email,
        phone: payload.phone,
    };

    match state.engine.register(registration).await {
        Ok(participant) => (
            StatusCode::CREATED,
            Json(RegisterResponse {
                success: true,
                participant: Some(participant),
                message: None,
            }),
        )
            .into_response(),
        Err(err) => {
            let (status, message) = error_status(&err);
            if status.is_server_error() {
                tracing::error!("registration failed: {err}");
            }
            (
                status,
                Json(RegisterResponse {
                    success: false,
                    participant: None,
                    message: Some(message),
                }),
            )
                .into_response()
        }
    }
}

async fn run_draw(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Err(denied) = require_admin(&state, &headers) {
        return denied;
    }

    // The route never accepts a seed; draws are seeded from OS entropy.
    match state.engine.run_draw(None).await {
        Ok(results) => (
            StatusCode::OK,
            Json(DrawResponse {
                success: true,
                results: Some(results),
                message: None,
            }),
        )
            .into_response(),
        Err(err) => {
            let (status, message) = error_status(&err);
            if status.is_server_error() {
                tracing::error!("draw failed: {err}");
            }
            failure(status, message)
        }
    }
}

async fn draw_status(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(denied) = require_admin(&state, &headers) {
        return denied;
    }

    let draw_state = state.engine.state().await;
    (
        StatusCode::OK,
        Json(DrawStatusResponse {
            phase: draw_state.phase(),
            has_run: draw_state.has_run,
            drawn_at: draw_state.drawn_at,
            results: state.engine.results().await,
        }),
    )
        .into_response()
}

async fn my_assignment(
    State(state): State<AppState>,
    Json(payload): Json<AssignmentRequest>,
) -> impl IntoResponse {
    let assigned = state.engine.assignment_for(&payload.user_id).await;
    let message = assigned
        .is_none()
        .then(|| "assignment not available yet".to_string());
    Json(AssignmentResponse { assigned, message })
}

async fn event_info(State(state): State<AppState>) -> impl IntoResponse {
    let countdown = Countdown::until(state.config.draw_date, Utc::now());
    let draw_state = state.engine.state().await;
    Json(EventResponse {
        draw_date: state.config.draw_date,
        countdown,
        draw_date_passed: countdown.is_elapsed(),
        phase: draw_state.phase(),
        has_run: draw_state.has_run,
        participant_count: state.engine.participants().await.len(),
    })
}
