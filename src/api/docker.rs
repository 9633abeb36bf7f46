//! 容器运行时 API
//!
//! 包含 /api/docker/containers, /api/docker/stats 端点

use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;

use crate::domain::{ContainerSummary, Envelope};
use crate::error::ApiResult;
use crate::services::stats::{self, StatsSnapshot};
use crate::state::AppState;

use super::listed;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/docker/containers", get(list_containers))
        .route("/api/docker/stats", get(container_stats))
}

/// 列出所有受管容器（含已停止的）
///
/// GET /api/docker/containers
async fn list_containers(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Envelope<Vec<ContainerSummary>>>> {
    let containers = state.gateway.list_all(&state.config.container_prefix).await?;
    Ok(listed(containers))
}

/// GET /api/docker/stats
async fn container_stats(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Envelope<StatsSnapshot>>> {
    let snapshot = stats::collect(
        state.gateway.as_ref(),
        &state.config.container_prefix,
        &state.config.compose_project,
    )
    .await?;
    let count = snapshot.containers.len();
    Ok(Json(Envelope::new(snapshot).with_count(count)))
}
