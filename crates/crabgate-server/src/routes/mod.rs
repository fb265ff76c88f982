pub mod auth;
pub mod connect;
pub mod gateway;
pub mod models;
pub mod profiles;
pub mod setup;

use std::convert::Infallible;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{Json, Router};
use futures_core::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crabgate_schema::{Error, ProgressEvent};

use crate::session;
use crate::state::AppState;
use crate::tickets::TicketPayload;

pub fn api_router(state: &AppState) -> Router<AppState> {
    let guarded = Router::new()
        .nest("/profiles", profiles::router())
        .nest("/gateway", gateway::router())
        .nest("/models", models::router())
        .nest("/setup", setup::router())
        .nest("/connect", connect::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_session,
        ));

    Router::new().nest("/auth", auth::router()).merge(guarded)
}

pub fn error_status(error: &Error) -> StatusCode {
    match error {
        Error::Validation(_) | Error::TicketExpired => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Auth => StatusCode::UNAUTHORIZED,
        Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        Error::Subprocess { .. }
        | Error::SubprocessTimeout { .. }
        | Error::SpawnFailed { .. }
        | Error::ConfigIo(_)
        | Error::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn action_response(result: crabgate_schema::Result<()>) -> (StatusCode, Json<ActionResponse>) {
    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(ActionResponse {
                success: true,
                error: None,
            }),
        ),
        Err(err) => (
            error_status(&err),
            Json(ActionResponse {
                success: false,
                error: Some(err.to_string()),
            }),
        ),
    }
}

/// Run a redeemed ticket's pipeline in a background task and relay its
/// progress as SSE. Dropping the stream (client disconnect) cancels the
/// pipeline through the token guard, which kills any child subprocess.
pub fn pipeline_stream(
    state: &AppState,
    payload: TicketPayload,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let manager = Arc::clone(&state.manager);
    let err_tx = tx.clone();
    let task_cancel = cancel.clone();

    tokio::spawn(async move {
        let result = match payload {
            TicketPayload::Setup(request) => manager.run_setup(&request, &tx, &task_cancel).await,
            TicketPayload::Connect(request) => {
                manager.run_connect(&request, &tx, &task_cancel).await
            }
        };
        if let Err(err) = result {
            tracing::warn!("streaming pipeline failed: {err}");
            let _ = err_tx.send(ProgressEvent::error(err.to_string()));
        }
    });

    let stream = async_stream::stream! {
        let _cancel_on_drop = cancel.drop_guard();
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            let data = serde_json::to_string(&event).unwrap_or_else(|_| String::from("{}"));
            yield Ok(Event::default().data(data));
            if terminal {
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
