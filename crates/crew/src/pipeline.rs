//! Sequential kickoff executor.
//!
//! One [`Crew::kickoff`] call runs every task in definition order. Each task
//! resolves its agent, interpolates the kickoff inputs into the prompts,
//! feeds the outputs of earlier tasks in as context, and calls the
//! completion client with retry. Any provider failure aborts the run; the
//! caller displays the error message as-is.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use crate::llm::{complete_with_retry, CompletionRequest, LlmClient, LlmError};
use crate::spec::{interpolate, AgentSpec, CrewSpec, SpecError, TaskSpec};

/// Ordered string map handed to [`Crew::kickoff`].
///
/// The chat front-end always supplies `topic` and `current_year`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KickoffInputs {
    entries: Vec<(String, String)>,
}

impl KickoffInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topic(topic: impl Into<String>) -> Self {
        Self::new().with("topic", topic)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskReport {
    pub task_id: String,
    pub agent_role: String,
    pub output: String,
}

/// Result of one kickoff. `raw` is the final task's text, the field the
/// front-end renders; `tasks` preserves every intermediate output in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrewOutput {
    pub raw: String,
    pub tasks: Vec<TaskReport>,
}

#[derive(Debug, Error)]
pub enum CrewError {
    #[error(transparent)]
    Definition(#[from] SpecError),
    #[error("task `{task_id}` references unknown agent `{agent}`")]
    UnknownAgent { task_id: String, agent: String },
    #[error("task `{task_id}` failed: {source}")]
    Provider {
        task_id: String,
        #[source]
        source: LlmError,
    },
    #[error("refusing report file name `{0}`: plain file names only")]
    ReportFileName(String),
    #[error("could not write report `{path}`: {source}")]
    ReportWrite { path: PathBuf, source: std::io::Error },
}

pub struct Crew {
    spec: CrewSpec,
    client: Arc<dyn LlmClient>,
    report_dir: PathBuf,
    max_retries: u32,
}

impl Crew {
    pub fn new(
        spec: CrewSpec,
        client: Arc<dyn LlmClient>,
        report_dir: impl Into<PathBuf>,
        max_retries: u32,
    ) -> Self {
        Self { spec, client, report_dir: report_dir.into(), max_retries }
    }

    pub fn spec(&self) -> &CrewSpec {
        &self.spec
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    pub async fn kickoff(&self, inputs: KickoffInputs) -> Result<CrewOutput, CrewError> {
        info!(
            event_name = "crew.kickoff.start",
            provider = self.client.name(),
            topic = inputs.get("topic").unwrap_or("unknown"),
            task_count = self.spec.tasks.len(),
            "starting crew kickoff"
        );

        let mut reports: Vec<TaskReport> = Vec::with_capacity(self.spec.tasks.len());

        for task in &self.spec.tasks {
            let agent = self.spec.agent(&task.agent).ok_or_else(|| CrewError::UnknownAgent {
                task_id: task.id.clone(),
                agent: task.agent.clone(),
            })?;

            info!(
                event_name = "crew.task.start",
                task_id = %task.id,
                agent_role = %agent.role,
                "running crew task"
            );

            let request = build_request(task, agent, &inputs, &reports)?;
            let output = complete_with_retry(self.client.as_ref(), &request, self.max_retries)
                .await
                .map_err(|source| {
                    error!(
                        event_name = "crew.task.failed",
                        task_id = %task.id,
                        agent_role = %agent.role,
                        error = %source,
                        "crew task failed"
                    );
                    CrewError::Provider { task_id: task.id.clone(), source }
                })?;

            info!(
                event_name = "crew.task.completed",
                task_id = %task.id,
                agent_role = %agent.role,
                output_chars = output.len(),
                "crew task completed"
            );

            if let Some(file_name) = &task.output_file {
                self.write_report(file_name, &output).await?;
            }

            reports.push(TaskReport {
                task_id: task.id.clone(),
                agent_role: agent.role.clone(),
                output,
            });
        }

        // Validation guarantees at least one task.
        let raw = reports.last().map(|report| report.output.clone()).unwrap_or_default();

        info!(
            event_name = "crew.kickoff.completed",
            tasks_completed = reports.len(),
            output_chars = raw.len(),
            "crew kickoff completed"
        );

        Ok(CrewOutput { raw, tasks: reports })
    }

    async fn write_report(&self, file_name: &str, output: &str) -> Result<(), CrewError> {
        // Plain file names only; anything path-like could escape the
        // report directory.
        if file_name.trim().is_empty()
            || file_name.contains('/')
            || file_name.contains('\\')
            || file_name == "."
            || file_name == ".."
        {
            return Err(CrewError::ReportFileName(file_name.to_string()));
        }

        tokio::fs::create_dir_all(&self.report_dir).await.map_err(|source| {
            CrewError::ReportWrite { path: self.report_dir.clone(), source }
        })?;

        let path = self.report_dir.join(file_name);
        tokio::fs::write(&path, output)
            .await
            .map_err(|source| CrewError::ReportWrite { path: path.clone(), source })?;

        info!(
            event_name = "crew.report.written",
            path = %path.display(),
            report_chars = output.len(),
            "crew report written"
        );

        Ok(())
    }
}

fn build_request(
    task: &TaskSpec,
    agent: &AgentSpec,
    inputs: &KickoffInputs,
    previous: &[TaskReport],
) -> Result<CompletionRequest, CrewError> {
    let goal = interpolate(&agent.goal, inputs)?;
    let backstory = interpolate(&agent.backstory, inputs)?;
    let description = interpolate(&task.description, inputs)?;
    let expected_output = interpolate(&task.expected_output, inputs)?;

    let system = format!("You are {role}.\n\nGoal: {goal}\n\n{backstory}", role = agent.role);

    let mut user = format!("{description}\n\nExpected output: {expected_output}");
    if !previous.is_empty() {
        user.push_str("\n\nContext from earlier tasks:");
        for report in previous {
            user.push_str(&format!(
                "\n\n## {id} ({role})\n{output}",
                id = report.task_id,
                role = report.agent_role,
                output = report.output
            ));
        }
    }

    Ok(CompletionRequest { system, user })
}
