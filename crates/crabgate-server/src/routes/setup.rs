use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crabgate_config::ChannelChoice;
use crabgate_gateway::SetupRequest;
use crabgate_schema::model_presets::MODEL_PRESETS;
use crabgate_schema::{Error, ProfileName, Result, CHANNEL_KINDS};

use crate::routes::{error_status, pipeline_stream};
use crate::state::AppState;
use crate::tickets::TicketPayload;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/prepare", post(prepare))
        .route("/stream", get(stream))
        .route("/status", get(status))
}

#[derive(Debug, Deserialize)]
pub struct SetupBody {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub channel_token: Option<String>,
    #[serde(default)]
    pub allowlist: Vec<String>,
}

fn default_profile() -> String {
    crabgate_schema::DEFAULT_PROFILE.to_string()
}

#[derive(Debug, Serialize)]
struct PrepareResponse {
    ticket: String,
}

/// Validate the submitted parameters and stash them behind a one-time
/// ticket; the sensitive payload never appears in the stream URL.
async fn prepare(
    State(state): State<AppState>,
    Json(body): Json<SetupBody>,
) -> std::result::Result<Json<PrepareResponse>, (StatusCode, Json<serde_json::Value>)> {
    let request = build_setup_request(body).map_err(reject)?;
    let ticket = state.tickets.put(TicketPayload::Setup(request));
    Ok(Json(PrepareResponse { ticket }))
}

fn build_setup_request(body: SetupBody) -> Result<SetupRequest> {
    let profile = ProfileName::parse(&body.profile)?;
    let model_id = body
        .model_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| MODEL_PRESETS[0].id.to_string());
    Ok(SetupRequest {
        profile,
        api_key: body.api_key.filter(|key| !key.is_empty()),
        model_id,
        channel: parse_channel(body.channel, body.channel_token, body.allowlist)?,
    })
}

pub(crate) fn parse_channel(
    kind: Option<String>,
    token: Option<String>,
    allowlist: Vec<String>,
) -> Result<Option<ChannelChoice>> {
    let Some(kind) = kind.filter(|k| !k.is_empty()) else {
        return Ok(None);
    };
    if !CHANNEL_KINDS.contains(&kind.as_str()) {
        return Err(Error::Validation(format!("unknown channel kind {kind:?}")));
    }
    Ok(Some(ChannelChoice {
        kind,
        token: token.filter(|t| !t.is_empty()),
        allowlist,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub ticket: String,
}

/// Redeem the ticket and stream pipeline progress. Redemption happens
/// before any work starts, so a concurrent replay of the same ticket can
/// never launch a second pipeline.
async fn stream(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> std::result::Result<
    Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>,
    (StatusCode, Json<serde_json::Value>),
> {
    let payload = state.tickets.redeem(&params.ticket).map_err(reject)?;
    if !matches!(payload, TicketPayload::Setup(_)) {
        return Err(reject(Error::Validation(
            "ticket was not issued for setup".into(),
        )));
    }
    Ok(pipeline_stream(&state, payload))
}

#[derive(Debug, Serialize)]
struct SetupStatus {
    needs_setup: bool,
    profiles: Vec<String>,
}

async fn status(State(state): State<AppState>) -> Json<SetupStatus> {
    let profiles: Vec<String> = state
        .manager
        .list()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    Json(SetupStatus {
        needs_setup: profiles.is_empty(),
        profiles,
    })
}

pub(crate) fn reject(err: Error) -> (StatusCode, Json<serde_json::Value>) {
    (
        error_status(&err),
        Json(serde_json::json!({"error": err.to_string()})),
    )
}
