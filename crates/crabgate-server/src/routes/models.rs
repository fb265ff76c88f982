use axum::routing::get;
use axum::{Json, Router};

use crabgate_schema::model_presets::{ModelPreset, MODEL_PRESETS};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_models))
}

async fn list_models() -> Json<&'static [ModelPreset]> {
    Json(MODEL_PRESETS)
}
