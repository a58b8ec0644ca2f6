//! HTTP surface
//!
//! - `GET /health` - service identity and journals waiting for commit
//! - `GET /metrics` - Prometheus text exposition of the ledger registry

use crate::{Error, Ledger, LedgerStore};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Health report
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `healthy` once the ledger is open
    pub status: &'static str,
    /// Configured service name
    pub service: String,
    /// Configured service version
    pub version: String,
    /// Journals staged and not yet committed
    pub staged_journals: usize,
}

/// Ledger error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        tracing::error!(error = %self.0, "Request failed");
        (status, self.0.to_string()).into_response()
    }
}

/// Routes over a shared ledger
pub fn router<S: LedgerStore + 'static>(ledger: Arc<Ledger<S>>) -> Router {
    Router::new()
        .route("/health", get(health_check::<S>))
        .route("/metrics", get(metrics_handler::<S>))
        .with_state(ledger)
}

async fn health_check<S: LedgerStore + 'static>(
    State(ledger): State<Arc<Ledger<S>>>,
) -> Json<HealthResponse> {
    let config = ledger.config();
    Json(HealthResponse {
        status: "healthy",
        service: config.service_name.clone(),
        version: config.service_version.clone(),
        staged_journals: ledger.journals().staged_journals().len(),
    })
}

async fn metrics_handler<S: LedgerStore + 'static>(
    State(ledger): State<Arc<Ledger<S>>>,
) -> Result<String, ApiError> {
    Ok(ledger.metrics().encode_text()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        types::{Alignment, NewJournal, NewTransaction},
        CommitMode, Config, InMemoryStore,
    };
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    fn test_ledger(config: Config) -> Arc<Ledger<InMemoryStore>> {
        let ledger = Ledger::in_memory(config).unwrap();
        ledger.exchange().set_exchange_value_of("USD", 1.0, "tester").unwrap();
        for (number, side) in [("A1", Alignment::Debit), ("A2", Alignment::Credit)] {
            let account = ledger
                .accounts()
                .new_account(number)
                .name(number)
                .description("api account")
                .currency("USD")
                .alignment(side)
                .created_by("tester")
                .build();
            ledger.accounts().persist_account(&account).unwrap();
        }
        Arc::new(ledger)
    }

    fn transfer(id: &str) -> NewJournal {
        NewJournal::new(id, "tester")
            .posting(NewTransaction::debit(format!("{}-D", id), "A1", 10))
            .posting(NewTransaction::credit(format!("{}-C", id), "A2", 10))
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let ledger = test_ledger(Config::default());
        ledger.journals().persist_journal(&transfer("J1")).unwrap();

        let response = router(ledger)
            .oneshot(request(Method::GET, "/metrics"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("ledger_journals_persisted_total 1"));
    }

    #[tokio::test]
    async fn test_health_reports_staged_journals() {
        let mut config = Config::default();
        config.journal.commit_mode_override = Some(CommitMode::Deferred);
        let ledger = test_ledger(config);
        ledger.journals().persist_journal(&transfer("J1")).unwrap();

        let response = router(ledger)
            .oneshot(request(Method::GET, "/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let health: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["staged_journals"], 1);
    }

    #[tokio::test]
    async fn test_unknown_routes_and_methods() {
        let ledger = test_ledger(Config::default());

        let response = router(ledger.clone())
            .oneshot(request(Method::POST, "/anything"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router(ledger)
            .oneshot(request(Method::POST, "/metrics"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
