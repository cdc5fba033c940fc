use axum::{
    http::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN},
    http::{HeaderName, Method, Request, Response},
    routing::get,
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    normalize_path::NormalizePathLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Span;

use crate::api::auth;
use crate::api::exam;
use crate::api::handlers;
use crate::api::results;
use crate::api::summaries;
use crate::core::{config::Settings, state::AppState};

pub(crate) fn router(state: AppState) -> Router {
    let cors = build_cors_layer(state.settings());
    let api_v1_prefix = state.settings().api().api_v1_str.clone();
    let api_v1 = Router::new()
        .nest("/auth", auth::router())
        .nest("/exam", exam::router())
        .nest("/results", results::router())
        .nest("/summaries", summaries::router());

    let request_id_header = HeaderName::from_static("x-request-id");
    let request_id_header_for_span = request_id_header.clone();
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(move |request: &Request<_>| {
            let request_id = request
                .headers()
                .get(&request_id_header_for_span)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id
            )
        })
        .on_response(|response: &Response<axum::body::Body>, latency: Duration, _span: &Span| {
            let status_label = response.status().as_u16().to_string();
            metrics::counter!(
                "http_requests_total",
                "status" => status_label.clone()
            )
            .increment(1);
            metrics::histogram!(
                "http_request_duration_seconds",
                "status" => status_label
            )
            .record(latency.as_secs_f64());
        });

    let mut router: Router<AppState> = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz).head(handlers::healthz))
        .nest(&api_v1_prefix, api_v1)
        .layer(NormalizePathLayer::trim_trailing_slash())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(trace_layer)
        .layer(cors);

    if state.settings().telemetry().prometheus_enabled {
        router = router.route("/metrics", get(handlers::metrics));
    }

    router.with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins = settings
        .cors()
        .origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            ORIGIN,
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        // Wildcard origin cannot be combined with allow_credentials
        base.allow_origin(Any)
    } else {
        base.allow_credentials(true).allow_origin(AllowOrigin::list(origins))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::core::time;
    use crate::db::types::{QuestionKind, Role, TestState};
    use crate::repositories::exam_sessions::{self, ExamSession};
    use crate::test_support;

    #[tokio::test]
    async fn root_returns_service_name() {
        let ctx = test_support::setup_test_context().await;

        let response = test_support::json_request(&ctx.app, Method::GET, "/", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = test_support::read_json(response).await;
        assert_eq!(body["message"], "Contest API");
    }

    #[tokio::test]
    async fn login_issues_token_and_initializes_student_session() {
        let ctx = test_support::setup_test_context().await;
        test_support::insert_account(
            ctx.state.db(),
            "09016319",
            "pass-09016319",
            Role::Student,
            None,
        )
        .await;
        test_support::insert_student(&ctx.state, "09016319", "Alice", None).await;

        let payload = json!({"username": "09016319", "password": "pass-09016319"});
        let response =
            test_support::json_request(&ctx.app, Method::POST, "/api/v1/auth/login", None, Some(payload))
                .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = test_support::read_json(response).await;
        assert_eq!(body["token_type"], "bearer");
        assert_eq!(body["user"]["id"], "09016319");
        assert_eq!(body["user"]["test_state"], "not_tested");

        let session = exam_sessions::get(&ctx.state, "09016319").await.unwrap().unwrap();
        assert_eq!(session.state, TestState::NotTested);
    }

    #[tokio::test]
    async fn counselor_login_carries_the_department() {
        let ctx = test_support::setup_test_context().await;
        test_support::insert_account(
            ctx.state.db(),
            "counselor-09",
            "pass-counselor",
            Role::Counselor,
            Some(9),
        )
        .await;

        let payload = json!({"username": "counselor-09", "password": "pass-counselor"});
        let response =
            test_support::json_request(&ctx.app, Method::POST, "/api/v1/auth/login", None, Some(payload))
                .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = test_support::read_json(response).await;
        assert_eq!(body["user"]["department"], 9);
        assert!(body["user"].get("test_state").is_none());
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_unauthorized() {
        let ctx = test_support::setup_test_context().await;
        test_support::insert_account(
            ctx.state.db(),
            "09016319",
            "pass-09016319",
            Role::Student,
            None,
        )
        .await;

        let payload = json!({"username": "09016319", "password": "wrong"});
        let response =
            test_support::json_request(&ctx.app, Method::POST, "/api/v1/auth/login", None, Some(payload))
                .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn exam_flow_over_http_scores_exactly_once() {
        let ctx = test_support::setup_test_context().await;
        test_support::insert_question(ctx.state.db(), 1, QuestionKind::Choice, 2, 30).await;
        test_support::insert_question(ctx.state.db(), 2, QuestionKind::Choice, 1, 30).await;
        test_support::insert_question(ctx.state.db(), 101, QuestionKind::TrueFalse, 1, 40).await;
        test_support::insert_seed(&ctx.state, 1, vec![1, 2, 101]).await;
        test_support::insert_account(
            ctx.state.db(),
            "09016319",
            "pass-09016319",
            Role::Student,
            None,
        )
        .await;
        test_support::insert_student(&ctx.state, "09016319", "Alice", Some(1)).await;
        let token = test_support::bearer_token(&ctx.state, "09016319");

        // A session opened long enough ago that the window is satisfied.
        let session = ExamSession {
            state: TestState::Testing,
            seed_id: Some(1),
            begin_at: Some(time::unix_now() - 600),
        };
        exam_sessions::set(&ctx.state, "09016319", &session).await.unwrap();

        let payload = json!({
            "answers": [
                {"id": 1, "answer": 2},
                {"id": 2, "answer": 1},
                {"id": 101, "answer": 0}
            ]
        });
        let response = test_support::json_request(
            &ctx.app,
            Method::POST,
            "/api/v1/results",
            Some(&token),
            Some(payload.clone()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::read_json(response).await;
        assert_eq!(body["score"], 60);

        let repeat = test_support::json_request(
            &ctx.app,
            Method::POST,
            "/api/v1/results",
            Some(&token),
            Some(payload),
        )
        .await;
        assert_eq!(repeat.status(), StatusCode::FORBIDDEN);

        let result = test_support::json_request(
            &ctx.app,
            Method::GET,
            "/api/v1/results",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(result.status(), StatusCode::OK);
        let result = test_support::read_json(result).await;
        assert_eq!(result["score"], 60);
        assert_eq!(result["details"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn counselor_sees_only_their_own_department() {
        let ctx = test_support::setup_test_context().await;
        test_support::insert_account(
            ctx.state.db(),
            "counselor-09",
            "pass-counselor",
            Role::Counselor,
            Some(9),
        )
        .await;
        let token = test_support::bearer_token(&ctx.state, "counselor-09");

        let summary = test_support::json_request(
            &ctx.app,
            Method::GET,
            "/api/v1/summaries/department",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(summary.status(), StatusCode::OK);
        let summary = test_support::read_json(summary).await;
        assert_eq!(summary["department"], 9);
        assert_eq!(summary["tested_count"], 0);

        let foreign = test_support::json_request(
            &ctx.app,
            Method::GET,
            "/api/v1/results/10016321",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(foreign.status(), StatusCode::FORBIDDEN);

        let school = test_support::json_request(
            &ctx.app,
            Method::GET,
            "/api/v1/summaries/school",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(school.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn requests_without_a_token_are_unauthorized() {
        let ctx = test_support::setup_test_context().await;

        let response = test_support::json_request(
            &ctx.app,
            Method::POST,
            "/api/v1/exam/begin",
            None,
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
