use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crabgate_gateway::ConnectRequest;
use crabgate_schema::{Error, ProfileName, Result};

use crate::routes::setup::{parse_channel, reject, StreamParams};
use crate::routes::pipeline_stream;
use crate::state::AppState;
use crate::tickets::TicketPayload;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/prepare", post(prepare))
        .route("/stream", get(stream))
}

#[derive(Debug, Deserialize)]
pub struct ConnectBody {
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

#[derive(Debug, Serialize)]
struct PrepareResponse {
    ticket: String,
}

async fn prepare(
    State(state): State<AppState>,
    Json(body): Json<ConnectBody>,
) -> std::result::Result<Json<PrepareResponse>, (StatusCode, Json<serde_json::Value>)> {
    let request = build_connect_request(body).map_err(reject)?;
    let ticket = state.tickets.put(TicketPayload::Connect(request));
    Ok(Json(PrepareResponse { ticket }))
}

fn build_connect_request(body: ConnectBody) -> Result<ConnectRequest> {
    Ok(ConnectRequest {
        profile: ProfileName::parse(&body.profile)?,
        api_key: body.api_key.filter(|key| !key.is_empty()),
        model_id: body.model_id.filter(|id| !id.trim().is_empty()),
        channel: parse_channel(body.channel, body.channel_token, body.allowlist)?,
    })
}

async fn stream(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> std::result::Result<
    Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>,
    (StatusCode, Json<serde_json::Value>),
> {
    let payload = state.tickets.redeem(&params.ticket).map_err(reject)?;
    if !matches!(payload, TicketPayload::Connect(_)) {
        return Err(reject(Error::Validation(
            "ticket was not issued for connect".into(),
        )));
    }
    Ok(pipeline_stream(&state, payload))
}
