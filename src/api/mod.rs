//! API 模块
//!
//! HTTP handlers 和路由组装

pub mod control;
pub mod docker;
pub mod health;
pub mod languages;
pub mod projects;
pub mod services;
pub mod tools;

use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::domain::Envelope;
use crate::state::AppState;

/// 构建完整的 API 路由
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .merge(health::router())
        // Entities
        .merge(services::router())
        .merge(tools::router())
        .merge(projects::router())
        // Control
        .merge(control::router())
        // Runtime
        .merge(docker::router())
        .merge(languages::router())
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 列表响应：`{success, data: [...], meta: {count}}`
pub(crate) fn listed<T: Serialize>(items: Vec<T>) -> Json<Envelope<Vec<T>>> {
    let count = items.len();
    Json(Envelope::new(items).with_count(count))
}
