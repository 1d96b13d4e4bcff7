use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use compass_crew::build_client;
use serde::Serialize;

use crate::bootstrap::Application;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub crew: HealthCheck,
    pub workspace: HealthCheck,
    pub checked_at: String,
}

pub async fn health(State(app): State<Application>) -> (StatusCode, Json<HealthResponse>) {
    let crew = crew_check(&app).await;
    let workspace = workspace_check(&app).await;
    let ready = crew.status == "ready" && workspace.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "compass-server runtime initialized".to_string(),
        },
        crew,
        workspace,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn crew_check(app: &Application) -> HealthCheck {
    match build_client(&app.config.llm).await {
        Ok(client) => HealthCheck {
            status: "ready",
            detail: format!("llm client `{}` constructed", client.name()),
        },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("llm client construction failed: {error}"),
        },
    }
}

async fn workspace_check(app: &Application) -> HealthCheck {
    let dir = app.config.crew.report_dir();
    let probe = dir.join(".compass_healthcheck");

    let result = async {
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(&probe, b"ok").await?;
        tokio::fs::remove_file(&probe).await
    }
    .await;

    match result {
        Ok(()) => HealthCheck {
            status: "ready",
            detail: format!("report directory `{}` is writable", dir.display()),
        },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("report directory `{}` is not writable: {error}", dir.display()),
        },
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::State;
    use axum::http::StatusCode;
    use compass_core::config::LlmProvider;
    use tempfile::TempDir;

    use crate::bootstrap::test_support::mock_config;
    use crate::bootstrap::bootstrap_with_config;
    use crate::health::health;

    #[tokio::test]
    async fn health_is_ready_with_the_mock_provider() {
        let dir = TempDir::new().expect("tempdir");
        let app = bootstrap_with_config(mock_config(dir.path())).await.expect("bootstrap");

        let (status, axum::Json(payload)) = health(State(app)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.service.status, "ready");
        assert_eq!(payload.crew.status, "ready");
        assert_eq!(payload.workspace.status, "ready");
    }

    #[tokio::test]
    async fn health_degrades_when_the_provider_cannot_be_built() {
        let dir = TempDir::new().expect("tempdir");
        let mut app = bootstrap_with_config(mock_config(dir.path())).await.expect("bootstrap");

        // Swap to a provider whose credentials are absent; the crew check
        // must degrade without taking the whole service down.
        let mut config = (*app.config).clone();
        config.llm.provider = LlmProvider::OpenAi;
        config.llm.api_key = None;
        app.config = std::sync::Arc::new(config);

        let (status, axum::Json(payload)) = health(State(app)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.crew.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }
}
