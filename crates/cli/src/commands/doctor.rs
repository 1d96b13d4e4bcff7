use std::fs;

use compass_core::config::{AppConfig, LoadOptions};
use compass_crew::{build_client, CrewSpec};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_crew_definition(&config));
            checks.push(check_llm_client(&config));
            checks.push(check_report_directory(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["crew_definition", "llm_client_readiness", "report_directory"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_crew_definition(config: &AppConfig) -> DoctorCheck {
    match CrewSpec::load(config.crew.definition_path.as_deref()) {
        Ok(spec) => DoctorCheck {
            name: "crew_definition",
            status: CheckStatus::Pass,
            details: format!("{} agents, {} tasks", spec.agents.len(), spec.tasks.len()),
        },
        Err(error) => DoctorCheck {
            name: "crew_definition",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_llm_client(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "llm_client_readiness",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    match runtime.block_on(build_client(&config.llm)) {
        Ok(client) => DoctorCheck {
            name: "llm_client_readiness",
            status: CheckStatus::Pass,
            details: format!("llm client `{}` constructed", client.name()),
        },
        Err(error) => DoctorCheck {
            name: "llm_client_readiness",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_report_directory(config: &AppConfig) -> DoctorCheck {
    let dir = config.crew.report_dir();
    let probe = dir.join(".compass_doctor");

    let result = fs::create_dir_all(&dir)
        .and_then(|()| fs::write(&probe, b"ok"))
        .and_then(|()| fs::remove_file(&probe));

    match result {
        Ok(()) => DoctorCheck {
            name: "report_directory",
            status: CheckStatus::Pass,
            details: format!("report directory `{}` is writable", dir.display()),
        },
        Err(error) => DoctorCheck {
            name: "report_directory",
            status: CheckStatus::Fail,
            details: format!("report directory `{}` is not writable: {error}", dir.display()),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
