//! CLI route: single route table and run context. Dispatches to the report
//! services and presentation.

use crate::cli::output::CommandOutput;
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_config, format_progress_line, format_quota_json, format_quota_text,
    format_report_json, format_report_text, format_status_json, format_status_text,
};
use crate::client::{HttpJobClient, JobClient};
use crate::config::{AuditConfig, ConfigLoader};
use crate::error::ApiError;
use crate::quota::QuotaGate;
use crate::report::{Orchestrator, PrimaryPhase};
use crate::types::{Hub, HubId, JobId, Session};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Runtime context for CLI execution: effective config and credential.
/// Built from workspace path and optional config path using ConfigLoader only.
pub struct RunContext {
    config: AuditConfig,
    session: Option<Session>,
    workspace_root: PathBuf,
}

impl RunContext {
    /// Create run context from workspace root, optional config path and
    /// optional session override.
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        session: Option<String>,
    ) -> Result<Self, ApiError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };

        config.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;

        let session = session
            .or_else(|| config.client.session_token.clone())
            .filter(|token| !token.trim().is_empty())
            .map(Session::new);

        Ok(Self {
            config,
            session,
            workspace_root,
        })
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &PathBuf {
        &self.workspace_root
    }

    fn session(&self) -> Result<Session, ApiError> {
        self.session.clone().ok_or_else(|| {
            ApiError::ConfigError(
                "No session token: pass --session or set HUB_AUDIT_SESSION".to_string(),
            )
        })
    }

    fn client(&self) -> Result<Arc<dyn JobClient>, ApiError> {
        Ok(Arc::new(HttpJobClient::new(&self.config.client)?))
    }

    /// Execute a command. `cancel` stops any polling in progress.
    pub async fn execute(
        &self,
        command: &Commands,
        cancel: CancellationToken,
    ) -> Result<CommandOutput, ApiError> {
        let start = Instant::now();
        let result = match command {
            Commands::Report {
                hub,
                primary_job,
                dependent_job,
                format,
                watch,
            } => {
                let hub = report_hub(hub, primary_job.as_deref(), dependent_job.as_deref())?;
                self.handle_report(hub, format, *watch, cancel).await
            }
            Commands::Status { hub, format } => self.handle_status(hub, format).await,
            Commands::Quota { format } => self.handle_quota(format).await,
            Commands::Config { format } => {
                format_config(&self.config, format).map(CommandOutput::ok)
            }
        };
        debug!(duration_ms = start.elapsed().as_millis(), "Command finished");
        result
    }

    async fn handle_report(
        &self,
        hub: Hub,
        format: &str,
        watch: bool,
        cancel: CancellationToken,
    ) -> Result<CommandOutput, ApiError> {

        let orchestrator = Orchestrator::new(
            self.client()?,
            self.session()?,
            self.config.polling.clone(),
        )
        .with_cancellation(cancel);

        let mut updates = orchestrator.subscribe();
        let mut watching = watch;
        let run = orchestrator.run(&hub);
        tokio::pin!(run);
        let state = loop {
            tokio::select! {
                state = &mut run => break state,
                changed = updates.changed(), if watching => {
                    if changed.is_ok() {
                        println!("{}", format_progress_line(&updates.borrow_and_update()));
                    } else {
                        watching = false;
                    }
                }
            }
        };

        info!(
            hub_id = %state.hub,
            primary = %state.primary.phase,
            dependent = %state.dependent.phase,
            "Report command finished"
        );
        let text = match format {
            "json" => format_report_json(&state)?,
            _ => format_report_text(&state),
        };
        if state.primary.phase == PrimaryPhase::Failed {
            Ok(CommandOutput::failed(text))
        } else {
            Ok(CommandOutput::ok(text))
        }
    }

    async fn handle_status(&self, hub: &str, format: &str) -> Result<CommandOutput, ApiError> {
        let hub_id = parse_hub(hub)?;
        let status = self
            .client()?
            .check_primary_status(&self.session()?, &hub_id)
            .await?;
        let text = match format {
            "json" => format_status_json(&status)?,
            _ => format_status_text(hub_id.as_str(), &status),
        };
        Ok(CommandOutput::ok(text))
    }

    async fn handle_quota(&self, format: &str) -> Result<CommandOutput, ApiError> {
        let quota = self.client()?.check_quota(&self.session()?).await?;
        let decision = QuotaGate::new().evaluate(&quota);
        let text = match format {
            "json" => format_quota_json(&quota, &decision)?,
            _ => format_quota_text(&quota, &decision),
        };
        Ok(CommandOutput::ok(text))
    }
}

/// Hub for a report run, carrying any job references the caller still holds.
fn report_hub(
    raw: &str,
    primary_job: Option<&str>,
    dependent_job: Option<&str>,
) -> Result<Hub, ApiError> {
    let mut hub = Hub::new(parse_hub(raw)?);
    if let Some(job) = primary_job.map(str::trim).filter(|job| !job.is_empty()) {
        hub = hub.with_primary_job(JobId::new(job));
    }
    if let Some(job) = dependent_job.map(str::trim).filter(|job| !job.is_empty()) {
        hub = hub.with_dependent_job(JobId::new(job));
    }
    Ok(hub)
}

fn parse_hub(raw: &str) -> Result<HubId, ApiError> {
    HubId::parse(raw).ok_or_else(|| ApiError::InvalidHub(raw.to_string()))
}
