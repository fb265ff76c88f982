use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::{header, request::Parts};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::routes::error_status;
use crate::session::SESSION_COOKIE;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    token: String,
}

/// Peer address when the server was started with connect-info; loopback
/// otherwise (in-process router tests).
struct ClientIp(IpAddr);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        Ok(Self(ip))
    }
}

async fn login(
    State(state): State<AppState>,
    ClientIp(client): ClientIp,
    Json(body): Json<LoginRequest>,
) -> Response {
    match state.auth.login(&body.token, client) {
        Ok(session) => {
            let cookie = format!(
                "{SESSION_COOKIE}={session}; Path=/; HttpOnly; SameSite=Strict; Max-Age=604800"
            );
            (
                [(header::SET_COOKIE, cookie)],
                Json(serde_json::json!({"success": true})),
            )
                .into_response()
        }
        Err(err) => (
            error_status(&err),
            Json(serde_json::json!({"success": false, "error": err.to_string()})),
        )
            .into_response(),
    }
}
