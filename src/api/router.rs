use axum::{
    http::header::{HeaderValue, ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE, ORIGIN},
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

use crate::api::guards::{ACCESS_TOKEN_HEADER, EXAM_TOKEN_HEADER};
use crate::api::{auth, exams, handlers, session};
use crate::core::client::{CANVAS_FP_HEADER, FONTS_FP_HEADER, PLATFORM_HEADER, WEBGL_FP_HEADER};
use crate::core::{config::Settings, state::AppState};

pub(crate) fn router(state: AppState) -> Router {
    let cors = build_cors_layer(state.settings());
    let api_v1_prefix = state.settings().api().api_v1_str.clone();
    let api_v1 = Router::new()
        .nest("/auth", auth::router())
        .nest("/exams", exams::router())
        .nest("/exam", session::router());

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
        .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            ACCEPT_LANGUAGE,
            ORIGIN,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static(ACCESS_TOKEN_HEADER),
            HeaderName::from_static(EXAM_TOKEN_HEADER),
            HeaderName::from_static(PLATFORM_HEADER),
            HeaderName::from_static(CANVAS_FP_HEADER),
            HeaderName::from_static(WEBGL_FP_HEADER),
            HeaderName::from_static(FONTS_FP_HEADER),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        // Wildcard origin cannot be combined with allow_credentials
        base.allow_origin(Any)
    } else {
        base.allow_credentials(true)
            .allow_origin(AllowOrigin::list(origins))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::core::{config::Settings, metrics};
    use crate::db::types::Stage;
    use crate::test_support::{self, exam_request, json_request, read_json, TestContext};

    const PASSWORD: &str = "correct horse";

    fn seed(ctx: &TestContext) {
        ctx.stores.insert_examinee("EP1", "alice", "alice@example.com", PASSWORD, true);
        ctx.stores.insert_examinee("EP2", "bob", "bob@example.com", PASSWORD, true);
        ctx.stores.insert_paper("SP1", "Sales aptitude", 60, true);
        ctx.stores.insert_association("ESPA1", "EP1", "SP1");
    }

    async fn login(ctx: &TestContext, account: &str) -> String {
        let response = ctx
            .app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({"account": account, "password": PASSWORD})),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        body["accessToken"].as_str().expect("access token").to_string()
    }

    async fn start(ctx: &TestContext, access: &str) -> serde_json::Value {
        let response = ctx
            .app
            .clone()
            .oneshot(json_request(Method::POST, "/api/v1/exams/ESPA1/start", Some(access), None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        read_json(response).await
    }

    #[tokio::test]
    async fn root_returns_project_name() {
        let ctx = test_support::setup_test_context().await;

        let response = ctx
            .app
            .clone()
            .oneshot(json_request(Method::GET, "/", None, None))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        assert_eq!(json["message"], "Exam Session API");
        assert_eq!(json["api_prefix"], "/api/v1");
    }

    #[tokio::test]
    async fn metrics_disabled_returns_404() {
        let ctx = test_support::setup_test_context().await;

        let response = ctx
            .app
            .clone()
            .oneshot(json_request(Method::GET, "/metrics", None, None))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_enabled_returns_200() {
        let guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("PROMETHEUS_ENABLED", "1");
        let settings = Settings::load().expect("settings");
        std::env::set_var("PROMETHEUS_ENABLED", "0");

        metrics::init(&settings).expect("metrics init");
        let ctx = test_support::context_with_settings(settings, guard);

        let response = ctx
            .app
            .clone()
            .oneshot(json_request(Method::GET, "/metrics", None, None))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials_and_payloads() {
        let ctx = test_support::setup_test_context().await;
        seed(&ctx);

        let wrong = ctx
            .app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({"account": "alice@example.com", "password": "nope"})),
            ))
            .await
            .expect("response");
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.headers()["www-authenticate"], "Bearer");

        let malformed = ctx
            .app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({"account": "not-an-email", "password": PASSWORD})),
            ))
            .await
            .expect("response");
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
        assert!(ctx.stores.login_records().is_empty());
    }

    #[tokio::test]
    async fn exam_list_requires_access_token() {
        let ctx = test_support::setup_test_context().await;
        seed(&ctx);

        let anonymous = ctx
            .app
            .clone()
            .oneshot(json_request(Method::GET, "/api/v1/exams", None, None))
            .await
            .expect("response");
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let access = login(&ctx, "alice@example.com").await;
        let response = ctx
            .app
            .clone()
            .oneshot(json_request(Method::GET, "/api/v1/exams", Some(&access), None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body[0]["associationId"], "ESPA1");
        assert_eq!(body[0]["stage"], "not_started");
    }

    #[tokio::test]
    async fn full_session_flow_over_http() {
        let ctx = test_support::setup_test_context().await;
        seed(&ctx);
        let access = login(&ctx, "alice@example.com").await;

        let started = start(&ctx, &access).await;
        assert_eq!(started["totalDurationSeconds"], 3600);
        assert_eq!(started["remainingSeconds"], 3600);
        assert_eq!(started["usedSeconds"], 0);
        let exam_token = started["examToken"].as_str().expect("exam token").to_string();

        ctx.clock.advance(time::Duration::seconds(10));
        let heartbeat = ctx
            .app
            .clone()
            .oneshot(exam_request(
                Method::POST,
                "/api/v1/exam/heartbeat",
                &access,
                &exam_token,
                Some(json!({"answers": [{"questionId": "Q1", "selectedOptionSerials": ["2"]}]})),
            ))
            .await
            .expect("response");
        assert_eq!(heartbeat.status(), StatusCode::OK);
        assert_eq!(read_json(heartbeat).await["remainingSeconds"], 3590);

        let too_soon = ctx
            .app
            .clone()
            .oneshot(exam_request(
                Method::POST,
                "/api/v1/exam/heartbeat",
                &access,
                &exam_token,
                Some(json!({"answers": []})),
            ))
            .await
            .expect("response");
        assert_eq!(too_soon.status(), StatusCode::TOO_MANY_REQUESTS);

        let answers = ctx
            .app
            .clone()
            .oneshot(exam_request(Method::GET, "/api/v1/exam/answers", &access, &exam_token, None))
            .await
            .expect("response");
        assert_eq!(answers.status(), StatusCode::OK);
        let answers = read_json(answers).await;
        assert_eq!(answers["answers"][0]["questionId"], "Q1");
        assert_eq!(answers["answers"][0]["selectedOptionSerials"], json!(["2"]));

        let submit = ctx
            .app
            .clone()
            .oneshot(exam_request(
                Method::POST,
                "/api/v1/exam/submit",
                &access,
                &exam_token,
                Some(json!({})),
            ))
            .await
            .expect("response");
        assert_eq!(submit.status(), StatusCode::OK);
        assert_eq!(ctx.stores.association("ESPA1").expect("association").stage, Stage::Submitted);

        let again = ctx
            .app
            .clone()
            .oneshot(exam_request(
                Method::POST,
                "/api/v1/exam/submit",
                &access,
                &exam_token,
                Some(json!({})),
            ))
            .await
            .expect("response");
        assert_eq!(again.status(), StatusCode::CONFLICT);

        let events = ctx.events.wait_for(2).await;
        let submit_event =
            events.iter().find(|event| event.event_type == "submit").expect("submit event");
        assert_eq!(submit_event.client_ip, "10.1.2.3");
        assert_eq!(submit_event.user_agent, "exam-test-agent");
    }

    #[tokio::test]
    async fn exam_endpoints_require_matching_tokens() {
        let ctx = test_support::setup_test_context().await;
        seed(&ctx);
        let alice = login(&ctx, "alice@example.com").await;
        let bob = login(&ctx, "bob@example.com").await;
        let exam_token =
            start(&ctx, &alice).await["examToken"].as_str().expect("exam token").to_string();

        let missing_exam_token = ctx
            .app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/exam/heartbeat",
                Some(&alice),
                Some(json!({})),
            ))
            .await
            .expect("response");
        assert_eq!(missing_exam_token.status(), StatusCode::UNAUTHORIZED);

        let foreign_user = ctx
            .app
            .clone()
            .oneshot(exam_request(
                Method::POST,
                "/api/v1/exam/submit",
                &bob,
                &exam_token,
                Some(json!({})),
            ))
            .await
            .expect("response");
        assert_eq!(foreign_user.status(), StatusCode::UNAUTHORIZED);

        let swapped = ctx
            .app
            .clone()
            .oneshot(exam_request(
                Method::POST,
                "/api/v1/exam/submit",
                &exam_token,
                &alice,
                Some(json!({})),
            ))
            .await
            .expect("response");
        assert_eq!(swapped.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ctx.stores.association("ESPA1").expect("association").stage, Stage::InProgress);
    }

    #[tokio::test]
    async fn starting_someone_elses_exam_is_not_found() {
        let ctx = test_support::setup_test_context().await;
        seed(&ctx);
        let bob = login(&ctx, "bob@example.com").await;

        let response = ctx
            .app
            .clone()
            .oneshot(json_request(Method::POST, "/api/v1/exams/ESPA1/start", Some(&bob), None))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(ctx.stores.attempt("ESPA1").is_none());
    }

    #[tokio::test]
    async fn exam_questions_are_served_with_letter_serials() {
        let ctx = test_support::setup_test_context().await;
        seed(&ctx);
        ctx.stores.insert_question("Q1", "SP1", "Pick one", 0);
        ctx.stores.insert_option("O1", "Q1", "First", 0);
        ctx.stores.insert_option("O2", "Q1", "Second", 1);
        let access = login(&ctx, "alice@example.com").await;
        let exam_token =
            start(&ctx, &access).await["examToken"].as_str().expect("exam token").to_string();

        let response = ctx
            .app
            .clone()
            .oneshot(exam_request(Method::GET, "/api/v1/exam/questions", &access, &exam_token, None))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["questions"][0]["questionId"], "Q1");
        assert_eq!(body["questions"][0]["title"], "Pick one");
        assert_eq!(body["questions"][0]["options"][1]["questionOptionId"], "O2");
        assert_eq!(body["questions"][0]["options"][1]["serialNumber"], "B");

        let unscoped = ctx
            .app
            .clone()
            .oneshot(json_request(Method::GET, "/api/v1/exam/questions", Some(&access), None))
            .await
            .expect("response");
        assert_eq!(unscoped.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn oversized_answers_are_rejected_before_charging_time() {
        let ctx = test_support::setup_test_context().await;
        seed(&ctx);
        let access = login(&ctx, "alice@example.com").await;
        let exam_token =
            start(&ctx, &access).await["examToken"].as_str().expect("exam token").to_string();

        ctx.clock.advance(time::Duration::seconds(10));
        let response = ctx
            .app
            .clone()
            .oneshot(exam_request(
                Method::POST,
                "/api/v1/exam/heartbeat",
                &access,
                &exam_token,
                Some(json!({"answers": [{"questionId": "Q".repeat(65), "selectedOptionSerials": ["A"]}]})),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let attempt = ctx.stores.attempt("ESPA1").expect("attempt");
        assert_eq!(attempt.remaining_seconds, 3600);
        assert!(ctx.stores.answers(&attempt.id).is_empty());
    }

    #[tokio::test]
    async fn submit_while_locked_is_busy_with_retry_after() {
        let ctx = test_support::setup_test_context().await;
        seed(&ctx);
        let access = login(&ctx, "alice@example.com").await;
        let exam_token =
            start(&ctx, &access).await["examToken"].as_str().expect("exam token").to_string();
        ctx.locks.force(
            &crate::services::exam_session::submit_lock_key("ESPA1"),
            "lock-other",
            std::time::Duration::from_secs(5),
        );

        let response = ctx
            .app
            .clone()
            .oneshot(exam_request(
                Method::POST,
                "/api/v1/exam/submit",
                &access,
                &exam_token,
                Some(json!({})),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()["retry-after"], "1");
    }
}
