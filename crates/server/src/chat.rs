//! Chat page and input handler.
//!
//! Endpoints:
//! - `GET  /`                    — chat page (HTML)
//! - `POST /api/chat/message`    — append a user turn, run the crew, append the reply
//! - `GET  /api/chat/transcript` — the current session's transcript

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::{Datelike, Utc};
use compass_core::transcript::ChatTurn;
use compass_crew::KickoffInputs;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::bootstrap::Application;
use crate::session::establish;

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub reply: String,
    pub turns: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub turns: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

fn with_cookie(mut response: Response, cookie: Option<HeaderValue>) -> Response {
    if let Some(cookie) = cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

/// The kickoff inputs every user action supplies: the topic plus the current
/// year as a string.
pub fn kickoff_inputs(topic: &str) -> KickoffInputs {
    KickoffInputs::topic(topic).with("current_year", Utc::now().year().to_string())
}

pub async fn chat_page(State(app): State<Application>, headers: HeaderMap) -> Response {
    let (session_id, cookie) = establish(&app.sessions, &headers).await;
    let transcript = app.sessions.snapshot(session_id).await;

    let mut context = tera::Context::new();
    context.insert("turns", transcript.turns());
    context.insert("default_topic", &app.config.crew.default_topic);
    context.insert("report_available", &app.report_path().exists());

    match app.templates.render("chat.html", &context) {
        Ok(html) => with_cookie(Html(html).into_response(), cookie),
        Err(render_error) => {
            error!(
                event_name = "chat.page.render_failed",
                error = %render_error,
                "chat template failed to render"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("<h1>Compass</h1><p>template rendering failed</p>".to_string()),
            )
                .into_response()
        }
    }
}

pub async fn post_message(
    State(app): State<Application>,
    headers: HeaderMap,
    Json(request): Json<MessageRequest>,
) -> Response {
    let message = request.message.trim();
    if message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiError { error: "message must not be empty".to_string() }),
        )
            .into_response();
    }

    let (session_id, cookie) = establish(&app.sessions, &headers).await;
    info!(
        event_name = "chat.message.received",
        session_id = %session_id,
        message_chars = message.len(),
        "chat message received"
    );

    app.sessions.append_user(session_id, message).await;

    match app.crew.kickoff(kickoff_inputs(message)).await {
        Ok(output) => {
            app.sessions.append_assistant(session_id, &output.raw).await;
            let transcript = app.sessions.snapshot(session_id).await;
            let body = MessageResponse { reply: output.raw, turns: transcript.turns().to_vec() };
            with_cookie(Json(body).into_response(), cookie)
        }
        // The user turn stays recorded; only the reply is missing.
        Err(crew_error) => {
            error!(
                event_name = "chat.message.crew_failed",
                session_id = %session_id,
                error = %crew_error,
                "crew kickoff failed for chat message"
            );
            let body = ApiError { error: format!("Error running crew: {crew_error}") };
            with_cookie((StatusCode::BAD_GATEWAY, Json(body)).into_response(), cookie)
        }
    }
}

pub async fn get_transcript(State(app): State<Application>, headers: HeaderMap) -> Response {
    let (session_id, cookie) = establish(&app.sessions, &headers).await;
    let transcript = app.sessions.snapshot(session_id).await;

    let body = TranscriptResponse { turns: transcript.turns().to_vec() };
    with_cookie(Json(body).into_response(), cookie)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    use crate::bootstrap::test_support::mock_config;
    use crate::bootstrap::{bootstrap_with_config, router};

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be json")
    }

    #[tokio::test]
    async fn chat_page_renders_and_issues_a_session_cookie() {
        let dir = TempDir::new().expect("tempdir");
        let app = bootstrap_with_config(mock_config(dir.path())).await.expect("bootstrap");

        let response = router(app)
            .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .expect("first contact should set a session cookie")
            .to_str()
            .expect("ascii cookie");
        assert!(cookie.starts_with("compass_session="));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let html = String::from_utf8(bytes.to_vec()).expect("utf-8 html");
        assert!(html.contains("Compliance Analyst"));
        assert!(html.contains("Solutions Architect"));
    }

    #[tokio::test]
    async fn whitespace_only_message_is_rejected_without_touching_the_transcript() {
        let dir = TempDir::new().expect("tempdir");
        let app = bootstrap_with_config(mock_config(dir.path())).await.expect("bootstrap");
        let sessions = app.sessions.clone();

        let response = router(app)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat/message")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"message":"   "}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().expect("error string").contains("empty"));
        assert_eq!(sessions.len().await, 0);
    }

    #[tokio::test]
    async fn message_round_trip_appends_both_turns() {
        let dir = TempDir::new().expect("tempdir");
        let app = bootstrap_with_config(mock_config(dir.path())).await.expect("bootstrap");
        let service = router(app);

        let response = service
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat/message")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"message":"Compare GDPR vs CCPA requirements for data deletion."}"#,
                    ))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .expect("new session should set a cookie")
            .to_str()
            .expect("ascii cookie")
            .split(';')
            .next()
            .expect("cookie pair")
            .to_string();

        let body = body_json(response).await;
        assert!(!body["reply"].as_str().expect("reply").is_empty());
        let turns = body["turns"].as_array().expect("turns");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0]["role"], "user");
        assert_eq!(turns[1]["role"], "assistant");

        // The transcript endpoint sees the same session through the cookie.
        let response = service
            .oneshot(
                Request::builder()
                    .uri("/api/chat/transcript")
                    .header(COOKIE, cookie)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["turns"].as_array().expect("turns").len(), 2);
    }

    #[tokio::test]
    async fn crew_failure_keeps_the_user_turn_and_returns_the_error_string() {
        use std::sync::Arc;

        use async_trait::async_trait;
        use compass_crew::{
            CompletionRequest, Crew, CrewSpec, KickoffInputs, LlmClient, LlmError,
        };

        struct AlwaysFails;

        #[async_trait]
        impl LlmClient for AlwaysFails {
            async fn complete(
                &self,
                _request: &CompletionRequest,
            ) -> Result<String, LlmError> {
                Err(LlmError::Api { status: 401, message: "invalid api key".to_string() })
            }

            fn name(&self) -> &str {
                "always-fails"
            }
        }

        let dir = TempDir::new().expect("tempdir");
        let mut app =
            bootstrap_with_config(mock_config(dir.path())).await.expect("bootstrap");
        let spec = CrewSpec::load(None).expect("embedded definition");
        app.crew = Arc::new(Crew::new(spec, Arc::new(AlwaysFails), dir.path(), 0));
        let sessions = app.sessions.clone();

        // Sanity: the failing crew does fail directly too.
        assert!(app
            .crew
            .kickoff(KickoffInputs::topic("x").with("current_year", "2026"))
            .await
            .is_err());

        let service = router(app);
        let response = service
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat/message")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"message":"Does our plan comply with HIPAA?"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .expect("cookie should still be issued on failure")
            .to_str()
            .expect("ascii cookie")
            .split(';')
            .next()
            .expect("cookie pair")
            .to_string();
        let body = body_json(response).await;
        let error = body["error"].as_str().expect("error string");
        assert!(error.starts_with("Error running crew: "));
        assert!(error.contains("invalid api key"));
        assert_eq!(sessions.len().await, 1);

        // The user turn stays recorded; no assistant turn was appended.
        let response = service
            .oneshot(
                Request::builder()
                    .uri("/api/chat/transcript")
                    .header(COOKIE, cookie)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let body = body_json(response).await;
        let turns = body["turns"].as_array().expect("turns");
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0]["role"], "user");
    }
}
