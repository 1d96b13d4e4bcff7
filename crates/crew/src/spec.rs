//! Crew definition: which agents exist and which tasks they run, in order.
//!
//! The definition lives in TOML (`config/crew.toml` by default, overridable
//! via `crew.definition_path`). A copy of the default definition is compiled
//! into the binary so the crew works from a bare checkout.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::pipeline::KickoffInputs;

const EMBEDDED_DEFINITION: &str = include_str!("../../../config/crew.toml");

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct AgentSpec {
    pub id: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct TaskSpec {
    pub id: String,
    pub agent: String,
    pub description: String,
    pub expected_output: String,
    #[serde(default)]
    pub output_file: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct CrewSpec {
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("could not read crew definition `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse crew definition: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("crew definition is invalid: {0}")]
    Validation(String),
    #[error("unresolved placeholder `{{{0}}}` in task template")]
    UnresolvedPlaceholder(String),
    #[error("unterminated placeholder in task template")]
    UnterminatedPlaceholder,
}

impl CrewSpec {
    pub fn from_toml(raw: &str) -> Result<Self, SpecError> {
        let spec: CrewSpec = toml::from_str(raw)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Load the definition from `path` when given, falling back to the
    /// embedded default otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, SpecError> {
        match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .map_err(|source| SpecError::ReadFile { path: path.to_path_buf(), source })?;
                Self::from_toml(&raw)
            }
            None => Self::from_toml(EMBEDDED_DEFINITION),
        }
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        if self.agents.is_empty() {
            return Err(SpecError::Validation("at least one agent is required".to_string()));
        }
        if self.tasks.is_empty() {
            return Err(SpecError::Validation("at least one task is required".to_string()));
        }

        let mut agent_ids = Vec::new();
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                return Err(SpecError::Validation("agent id must not be empty".to_string()));
            }
            if agent_ids.contains(&agent.id.as_str()) {
                return Err(SpecError::Validation(format!("duplicate agent id `{}`", agent.id)));
            }
            agent_ids.push(agent.id.as_str());
        }

        let mut task_ids = Vec::new();
        for task in &self.tasks {
            if task.id.trim().is_empty() {
                return Err(SpecError::Validation("task id must not be empty".to_string()));
            }
            if task_ids.contains(&task.id.as_str()) {
                return Err(SpecError::Validation(format!("duplicate task id `{}`", task.id)));
            }
            task_ids.push(task.id.as_str());

            if !agent_ids.contains(&task.agent.as_str()) {
                return Err(SpecError::Validation(format!(
                    "task `{}` references unknown agent `{}`",
                    task.id, task.agent
                )));
            }
        }

        Ok(())
    }

    pub fn agent(&self, id: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|agent| agent.id == id)
    }
}

/// Replace `{placeholder}` tokens with values from the kickoff inputs.
///
/// `{{` and `}}` escape to literal braces, mirroring the task templates the
/// definition file carries (`{topic}`, `{current_year}`).
pub fn interpolate(template: &str, inputs: &KickoffInputs) -> Result<String, SpecError> {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if matches!(chars.peek(), Some('{')) => {
                chars.next();
                output.push('{');
            }
            '}' if matches!(chars.peek(), Some('}')) => {
                chars.next();
                output.push('}');
            }
            '{' => {
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(next) => key.push(next),
                        None => return Err(SpecError::UnterminatedPlaceholder),
                    }
                }
                match inputs.get(&key) {
                    Some(value) => output.push_str(value),
                    None => return Err(SpecError::UnresolvedPlaceholder(key)),
                }
            }
            other => output.push(other),
        }
    }

    Ok(output)
}
