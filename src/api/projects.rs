//! 项目 API
//!
//! 包含 /api/projects 及其生命周期、构建端点

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::domain::{ActionReport, Envelope, ProjectEntry};
use crate::error::ApiResult;
use crate::state::AppState;

use super::listed;

/// 创建项目路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/projects", get(list_projects))
        .route("/api/projects/:name/:action", post(project_action))
}

/// 列出项目目录下的所有项目（清单损坏的以降级条目返回）
///
/// GET /api/projects
async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Envelope<Vec<ProjectEntry>>>> {
    let store = state.load_store().await?;
    Ok(listed(state.aggregator.projects(&store).await))
}

/// 项目生命周期
///
/// POST /api/projects/:name/{start,stop,restart,build}
/// build 会先等待生成器写出 Dockerfile，超时返回 503
async fn project_action(
    State(state): State<Arc<AppState>>,
    Path((name, action)): Path<(String, String)>,
) -> ApiResult<Json<Envelope<ActionReport>>> {
    let report = state.controller.service_action(&name, &action).await?;
    Ok(Json(Envelope::new(report)))
}
