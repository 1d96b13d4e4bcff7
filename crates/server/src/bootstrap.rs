use std::path::Path;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use compass_core::config::{AppConfig, ConfigError, LoadOptions};
use compass_crew::{build_client, Crew, CrewSpec, LlmError, SpecError};
use tera::Tera;
use thiserror::Error;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::session::SessionStore;
use crate::{chat, health, workflow};

#[derive(Clone)]
pub struct Application {
    pub config: Arc<AppConfig>,
    pub crew: Arc<Crew>,
    pub sessions: SessionStore,
    pub templates: Arc<Tera>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Application {
    pub fn report_path(&self) -> &Path {
        &self.config.crew.report_path
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("crew definition failed to load: {0}")]
    Definition(#[from] SpecError),
    #[error("llm client construction failed: {0}")]
    Llm(#[from] LlmError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        provider = config.llm.provider.as_str(),
        "starting application bootstrap"
    );

    let spec = CrewSpec::load(config.crew.definition_path.as_deref())?;
    info!(
        event_name = "system.bootstrap.crew_loaded",
        agents = spec.agents.len(),
        tasks = spec.tasks.len(),
        "crew definition loaded"
    );

    let client = build_client(&config.llm).await?;
    info!(
        event_name = "system.bootstrap.llm_ready",
        provider = client.name(),
        model = %config.llm.model,
        "llm client constructed"
    );

    let crew = Crew::new(spec, client, config.crew.report_dir(), config.llm.max_retries);

    Ok(Application {
        config: Arc::new(config),
        crew: Arc::new(crew),
        sessions: SessionStore::new(),
        templates: init_templates(),
    })
}

/// Load templates from `templates/`, falling back to the copy compiled into
/// the binary so the server works from any working directory.
fn init_templates() -> Arc<Tera> {
    let mut tera = match Tera::new("templates/**/*.html") {
        Ok(tera) => tera,
        Err(error) => {
            warn!(
                event_name = "system.bootstrap.templates_fallback",
                error = %error,
                "failed to load templates from filesystem, using embedded copies"
            );
            Tera::default()
        }
    };

    if !tera.get_template_names().any(|name| name == "chat.html") {
        if let Err(error) =
            tera.add_raw_template("chat.html", include_str!("../../../templates/chat.html"))
        {
            warn!(
                event_name = "system.bootstrap.templates_fallback",
                error = %error,
                "embedded chat template failed to register"
            );
        }
    }

    Arc::new(tera)
}

pub fn router(app: Application) -> Router {
    Router::new()
        .route("/", get(chat::chat_page))
        .route("/api/chat/message", post(chat::post_message))
        .route("/api/chat/transcript", get(chat::get_transcript))
        .route("/api/workflow/run", post(workflow::run_workflow))
        .route("/report/download", get(workflow::download_report))
        .route("/health", get(health::health))
        .nest_service("/static", ServeDir::new("static"))
        .with_state(app)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    use compass_core::config::{AppConfig, LlmProvider};

    /// Config pointing the crew at the mock provider and a scratch report
    /// directory.
    pub(crate) fn mock_config(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.provider = LlmProvider::Mock;
        config.crew.report_path = dir.join("report.md");
        config
    }
}
