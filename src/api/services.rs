//! 服务 API
//!
//! 包含 /api/services 及其生命周期端点

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::domain::{ActionReport, ContainerAction, Envelope, Family, NamedEntity};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

use super::listed;

/// 创建服务路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/services", get(list_services))
        .route("/api/services/:name/:action", post(service_action))
}

/// 列出所有声明的服务
///
/// GET /api/services
async fn list_services(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Envelope<Vec<NamedEntity>>>> {
    let store = state.load_store().await?;
    Ok(listed(state.aggregator.services(&store).await))
}

/// POST /api/services/:name/{start,stop,restart,enable,disable}
async fn service_action(
    State(state): State<Arc<AppState>>,
    Path((name, action)): Path<(String, String)>,
) -> ApiResult<Json<Envelope<ActionReport>>> {
    entity_action(&state, Family::Service, &name, &action).await
}

/// Service / Tool 共用的动作分发
pub(super) async fn entity_action(
    state: &AppState,
    family: Family,
    name: &str,
    action: &str,
) -> ApiResult<Json<Envelope<ActionReport>>> {
    let controller = &state.controller;
    let report = match action {
        "start" => controller.container_action(name, ContainerAction::Start).await?,
        "stop" => controller.container_action(name, ContainerAction::Stop).await?,
        "restart" => controller.container_action(name, ContainerAction::Restart).await?,
        "enable" => controller.set_enabled(family, name, true).await?,
        "disable" => controller.set_enabled(family, name, false).await?,
        other => {
            return Err(ApiError::bad_request(format!(
                "Invalid action '{}' for {}",
                other,
                family.name()
            )))
        }
    };
    Ok(Json(Envelope::new(report)))
}
