//! CLI presentation: text and json formatters per command.

use crate::client::PrimaryStatus;
use crate::config::AuditConfig;
use crate::error::ApiError;
use crate::quota::QuotaDecision;
use crate::report::ReportState;
use crate::types::{QuotaState, ReportJob};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde_json::json;

/// Format a section heading with bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn job_id(job: &ReportJob) -> String {
    job.id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// One line per published state change, for `report --watch`.
pub fn format_progress_line(state: &ReportState) -> String {
    format!(
        "[{}] primary: {} ({} {}) | dependent: {} ({} {})",
        state.updated_at.format("%H:%M:%S"),
        state.primary.phase,
        state.primary.job.status,
        state.primary.job.progress,
        state.dependent.phase,
        state.dependent.job.status,
        state.dependent.job.progress,
    )
}

pub fn format_report_text(state: &ReportState) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n\n",
        format_section_heading(&format!("Report for hub {}", state.hub))
    ));

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Stage", "Phase", "Status", "Progress", "Job", "Outcome"]);
    let primary_outcome = match (&state.primary.failure, &state.primary.bundle) {
        (Some(failure), _) => failure.user_message(),
        (None, Some(bundle)) => format!("fetched {}", bundle.fetched_at.format("%Y-%m-%d %H:%M:%S")),
        (None, None) => "-".to_string(),
    };
    table.add_row(vec![
        "primary".to_string(),
        state.primary.phase.to_string(),
        state.primary.job.status.to_string(),
        state.primary.job.progress.to_string(),
        job_id(&state.primary.job),
        primary_outcome,
    ]);
    let dependent_outcome = match (&state.dependent.failure, &state.dependent.bundle) {
        (Some(failure), _) => failure.user_message(),
        (None, Some(bundle)) => match &bundle.note {
            Some(note) => note.clone(),
            None => format!("fetched {}", bundle.fetched_at.format("%Y-%m-%d %H:%M:%S")),
        },
        (None, None) => "-".to_string(),
    };
    table.add_row(vec![
        "dependent".to_string(),
        state.dependent.phase.to_string(),
        state.dependent.job.status.to_string(),
        state.dependent.job.progress.to_string(),
        job_id(&state.dependent.job),
        dependent_outcome,
    ]);
    out.push_str(&format!("{}\n", table));

    if let Some(warning) = &state.warning {
        out.push_str(&format!("\n{}\n", warning.yellow().bold()));
    }
    for failure in [&state.primary.failure, &state.dependent.failure]
        .into_iter()
        .flatten()
    {
        out.push_str(&format!("\n{} {}\n", "error:".red(), failure));
    }
    out
}

pub fn format_report_json(state: &ReportState) -> Result<String, ApiError> {
    Ok(serde_json::to_string_pretty(state)?)
}

pub fn format_status_text(hub: &str, status: &PrimaryStatus) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Hub", "Job", "Status", "Progress", "Generation required"]);
    table.add_row(vec![
        hub.to_string(),
        status
            .job_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string()),
        status.status.to_string(),
        status.progress.to_string(),
        if status.generation_required { "yes" } else { "no" }.to_string(),
    ]);
    format!("{}\n", table)
}

pub fn format_status_json(status: &PrimaryStatus) -> Result<String, ApiError> {
    Ok(serde_json::to_string_pretty(status)?)
}

pub fn format_quota_text(quota: &QuotaState, decision: &QuotaDecision) -> String {
    let mut out = format!(
        "Credits: {} of {} remaining\n",
        quota.remaining, quota.total
    );
    match decision {
        QuotaDecision::Allowed(_) => {
            out.push_str(&format!("{}\n", "Report generation allowed".green()));
        }
        QuotaDecision::Denied(reason) => {
            out.push_str(&format!(
                "{}\n",
                format!("Report generation blocked: {}", reason).yellow().bold()
            ));
        }
    }
    out
}

pub fn format_quota_json(quota: &QuotaState, decision: &QuotaDecision) -> Result<String, ApiError> {
    let denied = match decision {
        QuotaDecision::Allowed(_) => None,
        QuotaDecision::Denied(reason) => Some(reason),
    };
    Ok(serde_json::to_string_pretty(&json!({
        "remaining": quota.remaining,
        "total": quota.total,
        "allowed": decision.is_allowed(),
        "denied": denied,
    }))?)
}

/// Effective configuration, session token masked.
pub fn format_config(config: &AuditConfig, format: &str) -> Result<String, ApiError> {
    let shown = config.redacted();
    match format {
        "json" => Ok(serde_json::to_string_pretty(&shown)?),
        "toml" => toml::to_string_pretty(&shown).map_err(|e| ApiError::Serialization(e.to_string())),
        other => Err(ApiError::ConfigError(format!(
            "Unknown config format '{}' (expected toml or json)",
            other
        ))),
    }
}
