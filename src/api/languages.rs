//! 支持的运行时语言

use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;

use crate::config::SupportedLanguages;
use crate::domain::Envelope;
use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/languages", get(supported_languages))
}

/// GET /api/languages
async fn supported_languages(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Envelope<SupportedLanguages>>> {
    let store = state.load_store().await?;
    let languages = store.supported_languages();
    let count = languages.languages.len();
    Ok(Json(Envelope::new(languages).with_count(count)))
}
