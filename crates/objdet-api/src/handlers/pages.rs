//! HTML pages.

use axum::extract::State;
use axum::response::Html;

use crate::presenter::render_index;
use crate::state::AppState;

/// Upload form.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let allowed = state.pipeline.validator().allowed_extensions();
    render_index(&allowed, state.config.max_upload_bytes)
}
