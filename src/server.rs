//! Local HTTP surface for the readings session.
//!
//! Exposes the published display state, lets a client request another
//! date, and serves the narration clip behind each audio handle.
//! Binds to 127.0.0.1 only.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::gemini::{ReadingsSource, SpeechSynthesizer};
use crate::orchestrator::{DisplayState, Orchestrator};

pub struct ApiState<R, S> {
    pub orchestrator: Arc<Orchestrator<R, S>>,
}

impl<R, S> Clone for ApiState<R, S> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
        }
    }
}

#[derive(Deserialize)]
struct PresentRequest {
    /// Defaults to today (local time).
    #[serde(default)]
    date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct SimpleResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SimpleResponse {
    fn ok(status: &str, date: NaiveDate) -> Self {
        Self {
            status: status.into(),
            date: Some(date),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            date: None,
            error: Some(message.into()),
        }
    }
}

/// Build the axum router.
pub fn router<R, S>(state: ApiState<R, S>) -> Router
where
    R: ReadingsSource + 'static,
    S: SpeechSynthesizer + 'static,
{
    Router::new()
        .route("/state", get(handle_state::<R, S>))
        .route("/present", post(handle_present::<R, S>))
        .route("/audio/{id}", get(handle_audio::<R, S>))
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve<R, S>(state: ApiState<R, S>, port: u16) -> std::io::Result<()>
where
    R: ReadingsSource + 'static,
    S: SpeechSynthesizer + 'static,
{
    let mut updates = state.orchestrator.subscribe();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let current = updates.borrow_and_update();
            info!("Display: {} [{}]", current.title, current.phase);
        }
    });

    let app = router(state);
    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Readings API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await
}

// --- Handlers ---

async fn handle_state<R, S>(State(state): State<ApiState<R, S>>) -> Json<DisplayState> {
    Json(state.orchestrator.state())
}

async fn handle_present<R, S>(
    State(state): State<ApiState<R, S>>,
    Json(req): Json<PresentRequest>,
) -> Json<SimpleResponse>
where
    R: ReadingsSource + 'static,
    S: SpeechSynthesizer + 'static,
{
    let date = req
        .date
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    info!("HTTP /present for {date}");

    // Fire-and-forget: clients poll /state
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        orchestrator.present(date).await;
    });

    Json(SimpleResponse::ok("loading", date))
}

async fn handle_audio<R, S>(
    State(state): State<ApiState<R, S>>,
    Path(id): Path<u64>,
) -> Response {
    match state.orchestrator.store().get(id) {
        Some(wav) => (
            [(header::CONTENT_TYPE, "audio/wav")],
            wav.as_ref().clone(),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(SimpleResponse::err(format!("no audio clip {id}"))),
        )
            .into_response(),
    }
}
