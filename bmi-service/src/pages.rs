use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::Html};
use std::sync::Arc;
use tracing::error;

async fn render(state: &AppState, template: &str) -> Result<Html<String>, StatusCode> {
    let path = state.templates_dir.join(template);
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Ok(Html(page)),
        Err(e) => {
            error!("Failed to render template {}: {}", path.display(), e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn home(State(state): State<Arc<AppState>>) -> Result<Html<String>, StatusCode> {
    render(&state, "index.html").await
}

pub async fn bmi_page(State(state): State<Arc<AppState>>) -> Result<Html<String>, StatusCode> {
    render(&state, "bmi.html").await
}

pub async fn about(State(state): State<Arc<AppState>>) -> Result<Html<String>, StatusCode> {
    render(&state, "about.html").await
}
