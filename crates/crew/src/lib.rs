//! The compliance crew: a sequential multi-agent LLM pipeline.
//!
//! Callers hand a [`Crew`] a map of kickoff inputs (the front-end always
//! supplies `topic` and `current_year`) and receive the final task's text
//! back. Everything in between — agent definitions, task ordering, prompt
//! assembly, provider calls, report writing — stays behind the single
//! [`Crew::kickoff`] call.
//!
//! # Modules
//!
//! - `spec` — the crew definition (agents and tasks) loaded from TOML
//! - `llm` — the pluggable completion client seam and its providers
//! - `pipeline` — the sequential kickoff executor

pub mod llm;
pub mod pipeline;
pub mod spec;

pub use llm::{build_client, CompletionRequest, LlmClient, LlmError, ScriptedClient};
pub use pipeline::{Crew, CrewError, CrewOutput, KickoffInputs, TaskReport};
pub use spec::{AgentSpec, CrewSpec, SpecError, TaskSpec};
