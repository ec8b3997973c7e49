pub use crate::api::bmi_distribution_handler;

use crate::pages;
use crate::state::AppState;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(pages::home))
        .route("/bmi", get(pages::bmi_page))
        .route("/about", get(pages::about))
        .route("/api/bmi-distribution", get(bmi_distribution_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
