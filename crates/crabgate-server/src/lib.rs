pub mod routes;
pub mod session;
pub mod state;
pub mod tickets;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .nest("/api", routes::api_router(&state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Unauthenticated landing payload: enough for a first-run client to tell
/// whether setup and login are needed, nothing more.
async fn index(State(state): State<AppState>) -> Json<serde_json::Value> {
    let needs_setup = state.manager.list().is_empty();
    Json(serde_json::json!({
        "name": "crabgate",
        "version": env!("CARGO_PKG_VERSION"),
        "needs_setup": needs_setup,
        "auth_required": state.auth.required(),
    }))
}

pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    tickets::spawn_sweeper(Arc::clone(&state.tickets));
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("crabgate control plane listening on {addr}");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
