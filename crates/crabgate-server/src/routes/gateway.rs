use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crabgate_schema::ProfileName;

use crate::routes::{action_response, ActionResponse};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/restart", post(restart))
}

#[derive(Debug, Deserialize)]
struct GatewayBody {
    profile: String,
}

async fn start(
    State(state): State<AppState>,
    Json(body): Json<GatewayBody>,
) -> (StatusCode, Json<ActionResponse>) {
    run(&state, &body.profile, Action::Start).await
}

async fn stop(
    State(state): State<AppState>,
    Json(body): Json<GatewayBody>,
) -> (StatusCode, Json<ActionResponse>) {
    run(&state, &body.profile, Action::Stop).await
}

async fn restart(
    State(state): State<AppState>,
    Json(body): Json<GatewayBody>,
) -> (StatusCode, Json<ActionResponse>) {
    run(&state, &body.profile, Action::Restart).await
}

enum Action {
    Start,
    Stop,
    Restart,
}

async fn run(state: &AppState, profile: &str, action: Action) -> (StatusCode, Json<ActionResponse>) {
    let name = match ProfileName::parse(profile) {
        Ok(name) => name,
        Err(err) => return action_response(Err(err)),
    };
    let result = match action {
        Action::Start => state.manager.start(&name).await,
        Action::Stop => state.manager.stop(&name).await,
        Action::Restart => state.manager.restart(&name).await,
    };
    action_response(result)
}
