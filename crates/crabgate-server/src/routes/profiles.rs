use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crabgate_schema::{Error, ProfileInfo, ProfileName};

use crate::routes::{action_response, ActionResponse};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_profiles))
        .route("/delete", post(delete_profile))
        .route("/model", post(change_model))
}

/// Every profile on the host with live status. A profile whose info read
/// fails mid-listing is skipped rather than failing the whole response.
async fn list_profiles(State(state): State<AppState>) -> Json<Vec<ProfileInfo>> {
    let mut items = Vec::new();
    for name in state.manager.list() {
        match state.manager.info(&name).await {
            Ok(info) => items.push(info),
            Err(err) => tracing::warn!(profile = %name, "skipping profile in listing: {err}"),
        }
    }
    Json(items)
}

#[derive(Debug, Deserialize)]
struct ProfileBody {
    profile: String,
}

async fn delete_profile(
    State(state): State<AppState>,
    Json(body): Json<ProfileBody>,
) -> (StatusCode, Json<ActionResponse>) {
    let name = match ProfileName::parse(&body.profile) {
        Ok(name) => name,
        Err(err) => return action_response(Err(err)),
    };
    action_response(state.manager.delete(&name).await)
}

#[derive(Debug, Deserialize)]
struct ChangeModelBody {
    profile: String,
    model_id: String,
}

async fn change_model(
    State(state): State<AppState>,
    Json(body): Json<ChangeModelBody>,
) -> (StatusCode, Json<ActionResponse>) {
    let name = match ProfileName::parse(&body.profile) {
        Ok(name) => name,
        Err(err) => return action_response(Err(err)),
    };
    if body.model_id.trim().is_empty() {
        return action_response(Err(Error::Validation("model_id must not be empty".into())));
    }
    action_response(state.manager.change_model(&name, body.model_id.trim()).await)
}
