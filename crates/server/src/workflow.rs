//! Full-workflow button and report download.
//!
//! Endpoints:
//! - `POST /api/workflow/run`  — run the crew against the configured topic
//! - `GET  /report/download`   — stream the generated report as an attachment
//!
//! The topic for a workflow run comes from the configuration (the `TOPIC`
//! environment variable is honored as an alias). The report is read if
//! present, never required: a run that produced no file still completes.

use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::bootstrap::Application;
use crate::chat::{kickoff_inputs, ApiError};

#[derive(Debug, Serialize)]
pub struct ReportPayload {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub status: &'static str,
    pub report: Option<ReportPayload>,
}

fn report_filename(app: &Application) -> String {
    app.report_path()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report.md".to_string())
}

pub async fn run_workflow(State(app): State<Application>) -> Response {
    let topic = app.config.crew.default_topic.clone();
    info!(
        event_name = "workflow.run.start",
        topic = %topic,
        "running full compliance workflow"
    );

    if let Err(crew_error) = app.crew.kickoff(kickoff_inputs(&topic)).await {
        error!(
            event_name = "workflow.run.failed",
            error = %crew_error,
            "crew kickoff failed for workflow run"
        );
        let body = ApiError { error: format!("Error running workflow: {crew_error}") };
        return (StatusCode::BAD_GATEWAY, Json(body)).into_response();
    }

    let report = match tokio::fs::read_to_string(app.report_path()).await {
        Ok(content) => {
            info!(
                event_name = "workflow.run.completed",
                report_chars = content.len(),
                "workflow completed with report"
            );
            Some(ReportPayload { filename: report_filename(&app), content })
        }
        Err(read_error) => {
            warn!(
                event_name = "workflow.report.missing",
                path = %app.report_path().display(),
                error = %read_error,
                "workflow completed but no report file was found"
            );
            None
        }
    };

    Json(WorkflowResponse { status: "completed", report }).into_response()
}

pub async fn download_report(State(app): State<Application>) -> Response {
    match tokio::fs::read_to_string(app.report_path()).await {
        Ok(content) => {
            let filename = report_filename(&app);
            (
                StatusCode::OK,
                [
                    (CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
                    (
                        CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{filename}\""),
                    ),
                ],
                content,
            )
                .into_response()
        }
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(ApiError { error: "report has not been generated yet".to_string() }),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::header::CONTENT_DISPOSITION;
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

    fn run_request() -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/workflow/run")
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn workflow_run_writes_and_returns_the_report() {
        let dir = TempDir::new().expect("tempdir");
        let app = bootstrap_with_config(mock_config(dir.path())).await.expect("bootstrap");

        let response =
            router(app).oneshot(run_request()).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["report"]["filename"], "report.md");
        assert!(!body["report"]["content"].as_str().expect("content").is_empty());
        assert!(dir.path().join("report.md").exists());
    }

    #[tokio::test]
    async fn workflow_run_tolerates_a_missing_report_file() {
        let dir = TempDir::new().expect("tempdir");
        let mut config = mock_config(dir.path());
        // Point the report path away from the file the crew writes.
        config.crew.report_path = dir.path().join("elsewhere.md");
        let app = bootstrap_with_config(config).await.expect("bootstrap");

        let response =
            router(app).oneshot(run_request()).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "completed");
        assert!(body["report"].is_null());
    }

    #[tokio::test]
    async fn download_is_an_attachment_once_the_report_exists() {
        let dir = TempDir::new().expect("tempdir");
        let app = bootstrap_with_config(mock_config(dir.path())).await.expect("bootstrap");
        let service = router(app);

        let response = service
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/report/download")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        service.clone().oneshot(run_request()).await.expect("workflow run");

        let response = service
            .oneshot(
                Request::builder()
                    .uri("/report/download")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .expect("attachment header")
            .to_str()
            .expect("ascii header");
        assert!(disposition.contains("attachment"));
        assert!(disposition.contains("report.md"));
    }
}
