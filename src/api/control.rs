//! 统一控制端点
//!
//! POST /api/control `{scope: "service" | "system", service?, action}`

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::domain::Envelope;
use crate::error::{ApiError, ApiResult};
use crate::services::lifecycle::parse_system_action;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default)]
    pub service: Option<String>,
    pub action: String,
}

fn default_scope() -> String {
    "service".to_string()
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/control", post(control))
}

/// POST /api/control
///
/// service: `start` / `stop` / `restart` / `build`；system: 另外接受 `up` / `down`
async fn control(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ControlRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    info!(scope = %request.scope, action = %request.action, "Control request");

    match request.scope.as_str() {
        "service" => {
            let name = request
                .service
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ApiError::bad_request("Service name is required"))?;
            let report = state
                .controller
                .service_action(name, &request.action)
                .await?;
            Ok(Json(Envelope::new(report)).into_response())
        }
        "system" => {
            let action = parse_system_action(&request.action)?;
            let report = state.controller.system(action).await?;
            Ok(Json(Envelope::new(report)).into_response())
        }
        other => Err(ApiError::bad_request(format!("Invalid scope '{}'", other))),
    }
}
