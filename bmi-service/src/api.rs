use crate::query::{BmiDistributionRow, BmiQuery, StateFilter};
use crate::state::AppState;
use crate::store::{Connector, StoreError};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug, Default)]
pub struct DistributionParams {
    pub state: Option<String>,
}

impl DistributionParams {
    /// Picks the first `state` value; repeats are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let state = pairs
            .into_iter()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value);
        DistributionParams { state }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("state must be an integer")]
    InvalidState,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidState => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub async fn bmi_distribution_handler(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<BmiDistributionRow>>, ApiError> {
    let params = DistributionParams::from_pairs(pairs);
    debug!(state = ?params.state, "Received bmi-distribution request");

    let filter = StateFilter::parse(params.state.as_deref()).map_err(|_| {
        warn!(state = ?params.state, "Rejected non-integer state filter");
        ApiError::InvalidState
    })?;
    let query = BmiQuery::build(filter);

    match fetch_rows(state.connector.as_ref(), &query).await {
        Ok(rows) => Ok(Json(rows)),
        Err(e) => {
            error!(error = %e, state = ?query.state_code(), "Distribution query failed");
            Err(e.into())
        }
    }
}

/// Runs one query on a fresh connection. Once a connection is open it is
/// closed on every path before returning.
async fn fetch_rows(
    connector: &dyn Connector,
    query: &BmiQuery,
) -> Result<Vec<BmiDistributionRow>, StoreError> {
    let mut conn = connector.connect().await?;
    let result = conn.fetch_distribution(query).await;
    if let Err(e) = conn.close().await {
        warn!(error = %e, "Failed to close database connection");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::router;
    use crate::store::StoreConnection;
    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Clone, Copy)]
    enum Failure {
        Never,
        OnConnect,
        OnExecute,
    }

    type Events = Arc<Mutex<Vec<&'static str>>>;

    /// In-memory table of (_BMI5CAT, _STATE) rows that records connection
    /// lifecycle events.
    struct RecordingConnector {
        rows: Vec<(Option<i64>, i64)>,
        failure: Failure,
        events: Events,
    }

    struct RecordingConnection {
        rows: Vec<(Option<i64>, i64)>,
        failure: Failure,
        events: Events,
    }

    fn driver_error(msg: &str) -> StoreError {
        StoreError::Driver(sqlx::Error::Protocol(msg.to_string()))
    }

    #[async_trait]
    impl Connector for RecordingConnector {
        async fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
            self.events.lock().unwrap().push("connect");
            if let Failure::OnConnect = self.failure {
                return Err(driver_error("Can't connect to MySQL server"));
            }
            Ok(Box::new(RecordingConnection {
                rows: self.rows.clone(),
                failure: self.failure,
                events: self.events.clone(),
            }))
        }
    }

    #[async_trait]
    impl StoreConnection for RecordingConnection {
        async fn fetch_distribution(
            &mut self,
            query: &BmiQuery,
        ) -> Result<Vec<BmiDistributionRow>, StoreError> {
            self.events.lock().unwrap().push("cursor_open");
            let result = match self.failure {
                Failure::OnExecute => Err(driver_error("Table 'brfss.brfss_microdata' doesn't exist")),
                _ => {
                    let mut counts: BTreeMap<i64, i64> = BTreeMap::new();
                    for (category, state) in &self.rows {
                        if query.state_code().map_or(true, |code| code == *state) {
                            if let Some(c) = category {
                                *counts.entry(*c).or_default() += 1;
                            }
                        }
                    }
                    Ok(counts
                        .into_iter()
                        .map(|(c, n)| BmiDistributionRow {
                            category: Some(c),
                            count: n,
                        })
                        .collect())
                }
            };
            self.events.lock().unwrap().push("cursor_close");
            result
        }

        async fn close(&mut self) -> Result<(), StoreError> {
            self.events.lock().unwrap().push("close");
            Ok(())
        }
    }

    fn fixture_rows() -> Vec<(Option<i64>, i64)> {
        let mut rows = Vec::new();
        rows.extend(std::iter::repeat((Some(1), 6)).take(3));
        rows.extend(std::iter::repeat((Some(2), 36)).take(5));
        rows.extend(std::iter::repeat((None, 36)).take(2));
        rows
    }

    fn state_with(failure: Failure) -> (Arc<AppState>, Events) {
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let connector = RecordingConnector {
            rows: fixture_rows(),
            failure,
            events: events.clone(),
        };
        (
            Arc::new(AppState::new(Arc::new(connector), "templates")),
            events,
        )
    }

    async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = router(state).oneshot(req).await.expect("resp");
        let status = resp.status();
        let bytes = hyper::body::to_bytes(resp.into_body())
            .await
            .expect("bytes");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    #[tokio::test]
    async fn all_states_excludes_null_categories() {
        let (state, events) = state_with(Failure::Never);
        let (status, body) = get(state, "/api/bmi-distribution").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([{"_BMI5CAT": 1, "count": 3}, {"_BMI5CAT": 2, "count": 5}])
        );
        assert_eq!(
            *events.lock().unwrap(),
            vec!["connect", "cursor_open", "cursor_close", "close"]
        );
    }

    #[tokio::test]
    async fn state_filter_applies_before_grouping() {
        let (state, _events) = state_with(Failure::Never);
        let (status, body) = get(state, "/api/bmi-distribution?state=36").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{"_BMI5CAT": 2, "count": 5}]));
    }

    #[tokio::test]
    async fn empty_state_means_all_states() {
        let (state, _events) = state_with(Failure::Never);
        let (status, body) = get(state, "/api/bmi-distribution?state=").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn repeated_state_uses_first_value() {
        let (state, events) = state_with(Failure::Never);
        let (status, body) = get(state, "/api/bmi-distribution?state=36&state=6").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{"_BMI5CAT": 2, "count": 5}]));
        assert_eq!(events.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn repeated_state_with_bad_first_value_is_rejected() {
        let (state, events) = state_with(Failure::Never);
        let (status, body) = get(state, "/api/bmi-distribution?state=abc&state=36").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "state must be an integer"}));
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn params_ignore_unrelated_keys() {
        let params = DistributionParams::from_pairs(vec![
            ("year".to_string(), "2022".to_string()),
            ("state".to_string(), "6".to_string()),
        ]);
        assert_eq!(params.state.as_deref(), Some("6"));
        assert!(DistributionParams::from_pairs(Vec::new()).state.is_none());
    }

    #[tokio::test]
    async fn non_integer_state_is_rejected_without_connecting() {
        for bad in ["abc", "3.5", "%20", "%20%20", "36%3B%20DROP%20TABLE%20x"] {
            let (state, events) = state_with(Failure::Never);
            let (status, body) = get(state, &format!("/api/bmi-distribution?state={}", bad)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!({"error": "state must be an integer"}));
            assert!(events.lock().unwrap().is_empty(), "no connection for {}", bad);
        }
    }

    #[tokio::test]
    async fn execute_failure_returns_500_and_still_closes() {
        let (state, events) = state_with(Failure::OnExecute);
        let (status, body) = get(state, "/api/bmi-distribution?state=36").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let msg = body.get("error").and_then(|e| e.as_str()).expect("error field");
        assert!(msg.contains("doesn't exist"), "{}", msg);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["connect", "cursor_open", "cursor_close", "close"]
        );
    }

    #[tokio::test]
    async fn connect_failure_returns_500() {
        let (state, events) = state_with(Failure::OnConnect);
        let (status, body) = get(state, "/api/bmi-distribution").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.get("error").is_some());
        assert_eq!(*events.lock().unwrap(), vec!["connect"]);
    }

    #[tokio::test]
    async fn repeated_requests_return_identical_results() {
        let (state, events) = state_with(Failure::Never);
        let (_, first) = get(state.clone(), "/api/bmi-distribution?state=6").await;
        let (_, second) = get(state, "/api/bmi-distribution?state=6").await;
        assert_eq!(first, second);
        assert_eq!(first, json!([{"_BMI5CAT": 1, "count": 3}]));
        // one private connection per request
        let connects = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| **e == "connect")
            .count();
        assert_eq!(connects, 2);
    }

    #[tokio::test]
    async fn handler_can_be_called_directly() {
        let (state, _events) = state_with(Failure::Never);
        let pairs = vec![("state".to_string(), "x".to_string())];
        let err = bmi_distribution_handler(State(state), Query(pairs))
            .await
            .expect_err("invalid state");
        assert!(matches!(err, ApiError::InvalidState));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
