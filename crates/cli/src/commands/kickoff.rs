use chrono::{Datelike, Utc};
use compass_core::config::{AppConfig, LoadOptions};
use compass_crew::{build_client, Crew, CrewSpec, KickoffInputs};

use super::CommandResult;

/// Run the full pipeline once with the same inputs the workflow button uses.
pub fn run(topic: Option<String>, extra_inputs: Vec<String>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("kickoff", "config", error.to_string(), 1),
    };

    let topic = topic.unwrap_or_else(|| config.crew.default_topic.clone());
    let mut inputs =
        KickoffInputs::topic(&topic).with("current_year", Utc::now().year().to_string());
    for pair in &extra_inputs {
        match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                inputs = inputs.with(key.trim(), value);
            }
            _ => {
                return CommandResult::failure(
                    "kickoff",
                    "invalid_input",
                    format!("expected KEY=VALUE, got `{pair}`"),
                    2,
                );
            }
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "kickoff",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                1,
            );
        }
    };

    let outcome = runtime.block_on(async {
        let spec = CrewSpec::load(config.crew.definition_path.as_deref())
            .map_err(|error| ("crew_definition", error.to_string()))?;
        let client = build_client(&config.llm)
            .await
            .map_err(|error| ("llm_client", error.to_string()))?;
        let crew = Crew::new(spec, client, config.crew.report_dir(), config.llm.max_retries);

        crew.kickoff(inputs).await.map_err(|error| ("kickoff", error.to_string()))
    });

    match outcome {
        Ok(output) => {
            let mut text = output.raw;
            if config.crew.report_path.exists() {
                text.push_str(&format!(
                    "\n\nreport written to {}",
                    config.crew.report_path.display()
                ));
            }
            CommandResult { exit_code: 0, output: text }
        }
        Err((error_class, message)) => {
            CommandResult::failure("kickoff", error_class, message, 1)
        }
    }
}
