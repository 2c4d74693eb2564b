//! Claim API routes.
//!
//! Endpoints (all JSON, all company-scoped):
//! - `POST /api/claims`               — submit a claim
//! - `POST /api/claims/{id}/decision` — record the active approver's decision
//! - `GET  /api/claims?mine=true`     — list company claims (optionally own)
//! - `GET  /api/claims/pending`       — the caller's approver inbox
//!
//! Authentication lives at the deployment edge; requests arrive with a
//! trusted identity in the `x-user-id`, `x-company-id`, and `x-user-role`
//! headers. The engine still authorizes every operation against that
//! identity.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use claimflow_core::domain::claim::{ClaimId, DecisionAction};
use claimflow_core::domain::company::CompanyId;
use claimflow_core::domain::user::{Role, UserId};
use claimflow_core::errors::EngineError;
use claimflow_engine::{ClaimService, Identity, SubmitClaimRequest};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ClaimService>,
}

pub fn router(service: Arc<ClaimService>) -> Router {
    Router::new()
        .route("/api/claims", post(submit_claim).get(list_claims))
        .route("/api/claims/pending", get(pending_claims))
        .route("/api/claims/{id}/decision", post(decide_claim))
        .with_state(AppState { service })
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub action: DecisionAction,
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub mine: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
    retry: bool,
}

fn engine_error_response(error: EngineError) -> Response {
    let status = match &error {
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::Authorization(_) => StatusCode::FORBIDDEN,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Conflict(_) => StatusCode::CONFLICT,
        EngineError::Upstream(_) => StatusCode::BAD_GATEWAY,
    };
    let body = ErrorBody { error: error.to_string(), kind: error.kind(), retry: error.retryable() };
    (status, Json(body)).into_response()
}

fn missing_identity_response(detail: &str) -> Response {
    let body = ErrorBody {
        error: format!("request identity is missing or malformed: {detail}"),
        kind: "authorization",
        retry: false,
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

fn identity_from_headers(headers: &HeaderMap) -> Result<Identity, Response> {
    let header = |name: &str| -> Result<String, Response> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| missing_identity_response(name))
    };

    let user_id = header("x-user-id")?;
    let company_id = header("x-company-id")?;
    let role_raw = header("x-user-role")?;
    let Some(role) = Role::parse(&role_raw) else {
        warn!(event_name = "api.identity.bad_role", role = %role_raw, "unparseable role header");
        return Err(missing_identity_response("x-user-role"));
    };

    Ok(Identity { user_id: UserId(user_id), company_id: CompanyId(company_id), role })
}

async fn submit_claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SubmitBody>,
) -> Response {
    let caller = match identity_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    let request = SubmitClaimRequest {
        amount: body.amount,
        currency: body.currency,
        category: body.category,
        description: body.description,
        spent_on: body.date,
    };
    match state.service.submit(&caller, request).await {
        Ok(claim) => (StatusCode::CREATED, Json(claim)).into_response(),
        Err(error) => engine_error_response(error),
    }
}

async fn decide_claim(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<DecisionBody>,
) -> Response {
    let caller = match identity_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    match state.service.decide(&caller, &ClaimId(id), body.action, body.comment).await {
        Ok(claim) => Json(claim).into_response(),
        Err(error) => engine_error_response(error),
    }
}

async fn list_claims(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Response {
    let caller = match identity_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    match state.service.list_claims(&caller, params.mine).await {
        Ok(claims) => Json(claims).into_response(),
        Err(error) => engine_error_response(error),
    }
}

async fn pending_claims(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let caller = match identity_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    match state.service.pending_inbox(&caller).await {
        Ok(claims) => Json(claims).into_response(),
        Err(error) => engine_error_response(error),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use tower::util::ServiceExt;

    use claimflow_core::audit::InMemoryAuditSink;
    use claimflow_core::domain::company::{Company, CompanyId};
    use claimflow_core::domain::policy::{ApprovalPolicy, PolicyId, SequenceStep};
    use claimflow_core::domain::user::{Role, User, UserId};
    use claimflow_core::fx::{FxCache, RateFetchError, RateFetcher, RateTable, SystemClock};
    use claimflow_db::repositories::{
        CompanyRepository, InMemoryClaimRepository, InMemoryCompanyRepository,
        InMemoryPolicyRepository, InMemoryUserRepository, PolicyRepository, UserRepository,
    };
    use claimflow_engine::ClaimService;

    use super::router;

    struct EmptyRateFetcher;

    #[async_trait::async_trait]
    impl RateFetcher for EmptyRateFetcher {
        async fn fetch(&self, base: &str) -> Result<RateTable, RateFetchError> {
            Ok(RateTable { base: base.to_string(), rates: HashMap::new() })
        }
    }

    async fn test_router() -> axum::Router {
        let companies = Arc::new(InMemoryCompanyRepository::default());
        let users = Arc::new(InMemoryUserRepository::default());
        let policies = Arc::new(InMemoryPolicyRepository::default());
        let claims = Arc::new(InMemoryClaimRepository::default());

        let now = Utc::now();
        companies
            .save(Company {
                id: CompanyId("co-1".to_string()),
                name: "Initech".to_string(),
                country: "United States".to_string(),
                currency_code: "USD".to_string(),
                manager_approver_first: false,
                approval_policy_id: Some(PolicyId("pol-1".to_string())),
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("save company");
        for (id, role) in [("u-emp", Role::Employee), ("u-mgr", Role::Manager)] {
            users
                .save(User {
                    id: UserId(id.to_string()),
                    company_id: CompanyId("co-1".to_string()),
                    name: format!("User {id}"),
                    email: format!("{id}@initech.test"),
                    role,
                    manager_id: None,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .expect("save user");
        }
        policies
            .save(ApprovalPolicy {
                id: PolicyId("pol-1".to_string()),
                company_id: CompanyId("co-1".to_string()),
                sequence: vec![SequenceStep::User(UserId("u-mgr".to_string()))],
                percent_threshold: None,
                specific_approver_ids: Vec::new(),
                hybrid_or: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("save policy");

        let fx = Arc::new(FxCache::new(Arc::new(EmptyRateFetcher), Arc::new(SystemClock)));
        let service = Arc::new(ClaimService::new(
            companies,
            users,
            policies,
            claims,
            fx,
            Arc::new(SystemClock),
            Arc::new(InMemoryAuditSink::default()),
        ));
        router(service)
    }

    fn submit_request(identity: bool) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/claims")
            .header("content-type", "application/json");
        if identity {
            builder = builder
                .header("x-user-id", "u-emp")
                .header("x-company-id", "co-1")
                .header("x-user-role", "EMPLOYEE");
        }
        builder
            .body(Body::from(
                r#"{"amount": "42.50", "currency": "USD", "category": "travel", "date": "2026-07-01"}"#,
            ))
            .expect("request builds")
    }

    #[tokio::test]
    async fn submission_without_identity_headers_is_unauthorized() {
        let app = test_router().await;
        let response = app.oneshot(submit_request(false)).await.expect("handler runs");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn submission_returns_the_created_claim() {
        let app = test_router().await;
        let response = app.oneshot(submit_request(true)).await.expect("handler runs");
        assert_eq!(response.status(), StatusCode::CREATED);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let claim: serde_json::Value = serde_json::from_slice(&bytes).expect("claim json");
        assert_eq!(claim["status"], "PENDING");
        assert_eq!(claim["currentStep"], 1);
        assert_eq!(claim["steps"][0]["approverId"], "u-mgr");
        assert_eq!(claim["amountOriginal"], serde_json::json!("42.50"));
    }

    #[tokio::test]
    async fn decision_flow_over_http_finalizes_the_claim() {
        let app = test_router().await;
        let response =
            app.clone().oneshot(submit_request(true)).await.expect("submission runs");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let claim: serde_json::Value = serde_json::from_slice(&bytes).expect("claim json");
        let id = claim["id"].as_str().expect("claim id").to_string();

        let decision = Request::builder()
            .method("POST")
            .uri(format!("/api/claims/{id}/decision"))
            .header("content-type", "application/json")
            .header("x-user-id", "u-mgr")
            .header("x-company-id", "co-1")
            .header("x-user-role", "MANAGER")
            .body(Body::from(r#"{"action": "APPROVE", "comment": "ok"}"#))
            .expect("request builds");
        let response = app.clone().oneshot(decision).await.expect("decision runs");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let decided: serde_json::Value = serde_json::from_slice(&bytes).expect("claim json");
        assert_eq!(decided["status"], "APPROVED");

        // A repeat decision hits a terminal claim: conflict with retry hint.
        let repeat = Request::builder()
            .method("POST")
            .uri(format!("/api/claims/{id}/decision"))
            .header("content-type", "application/json")
            .header("x-user-id", "u-mgr")
            .header("x-company-id", "co-1")
            .header("x-user-role", "MANAGER")
            .body(Body::from(r#"{"action": "REJECT"}"#))
            .expect("request builds");
        let response = app.oneshot(repeat).await.expect("repeat runs");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let error: serde_json::Value = serde_json::from_slice(&bytes).expect("error json");
        assert_eq!(error["kind"], "conflict");
        assert_eq!(error["retry"], true);
    }

    #[tokio::test]
    async fn employee_decisions_are_forbidden() {
        let app = test_router().await;
        let response =
            app.clone().oneshot(submit_request(true)).await.expect("submission runs");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let claim: serde_json::Value = serde_json::from_slice(&bytes).expect("claim json");
        let id = claim["id"].as_str().expect("claim id");

        let decision = Request::builder()
            .method("POST")
            .uri(format!("/api/claims/{id}/decision"))
            .header("content-type", "application/json")
            .header("x-user-id", "u-emp")
            .header("x-company-id", "co-1")
            .header("x-user-role", "EMPLOYEE")
            .body(Body::from(r#"{"action": "APPROVE"}"#))
            .expect("request builds");
        let response = app.oneshot(decision).await.expect("decision runs");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn pending_inbox_lists_active_assignments() {
        let app = test_router().await;
        app.clone().oneshot(submit_request(true)).await.expect("submission runs");

        let inbox = Request::builder()
            .method("GET")
            .uri("/api/claims/pending")
            .header("x-user-id", "u-mgr")
            .header("x-company-id", "co-1")
            .header("x-user-role", "MANAGER")
            .body(Body::empty())
            .expect("request builds");
        let response = app.oneshot(inbox).await.expect("inbox runs");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let claims: serde_json::Value = serde_json::from_slice(&bytes).expect("claims json");
        assert_eq!(claims.as_array().expect("array").len(), 1);
    }
}
