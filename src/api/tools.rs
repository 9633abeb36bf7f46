//! 工具 API（adminer、phpmyadmin 等）

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::domain::{ActionReport, Envelope, Family, NamedEntity};
use crate::error::ApiResult;
use crate::state::AppState;

use super::{listed, services::entity_action};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tools", get(list_tools))
        .route("/api/tools/:name/:action", post(tool_action))
}

/// GET /api/tools
async fn list_tools(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Envelope<Vec<NamedEntity>>>> {
    let store = state.load_store().await?;
    Ok(listed(state.aggregator.tools(&store).await))
}

/// POST /api/tools/:name/{start,stop,restart,enable,disable}
async fn tool_action(
    State(state): State<Arc<AppState>>,
    Path((name, action)): Path<(String, String)>,
) -> ApiResult<Json<Envelope<ActionReport>>> {
    entity_action(&state, Family::Tool, &name, &action).await
}
