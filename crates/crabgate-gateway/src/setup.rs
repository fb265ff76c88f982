//! The profile setup pipeline and the lighter connect flow.
//!
//! Setup is a linear state machine per invocation; every stage can fall
//! into `Failed` by returning an error, which the caller reports as the
//! stream's terminal error event. Progress events go out over an unbounded
//! channel so emission never blocks the pipeline.

use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crabgate_config::{store, ChannelChoice, GatewayConfig, GenerateParams};
use crabgate_schema::{Error, ProfileName, ProgressEvent, Result};

use crate::process::{OnboardArgs, ServiceAction};
use crate::Manager;

pub type ProgressSender = UnboundedSender<ProgressEvent>;

/// Onboarding output advances the bar in fixed steps up to this ceiling;
/// the tail of the range is reserved for reconciliation and service work.
const ONBOARD_CEILING: u8 = 80;
const ONBOARD_STEP: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    Init,
    DirectoryReady,
    ConfigWritten,
    Onboarding,
    Reconciled,
    ServiceInstalled,
    Started,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SetupRequest {
    pub profile: ProfileName,
    pub api_key: Option<String>,
    pub model_id: String,
    pub channel: Option<ChannelChoice>,
}

#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub profile: ProfileName,
    pub api_key: Option<String>,
    pub model_id: Option<String>,
    pub channel: Option<ChannelChoice>,
}

#[derive(Debug, Clone)]
pub struct SetupOutcome {
    pub port: u16,
    pub config_path: PathBuf,
}

fn emit(progress: &ProgressSender, event: ProgressEvent) {
    // The receiver disappears when the client drops the stream; the
    // cancellation token is what actually stops the pipeline.
    let _ = progress.send(event);
}

fn enter(stage: &mut SetupStage, next: SetupStage) {
    tracing::debug!(from = ?*stage, to = ?next, "setup stage");
    *stage = next;
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

impl Manager {
    /// Create or re-run setup for a profile end to end: port and directory,
    /// config generation and merge, subprocess onboarding, post-onboarding
    /// reconciliation, then best-effort service install and start.
    pub async fn run_setup(
        &self,
        request: &SetupRequest,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<SetupOutcome> {
        let mut stage = SetupStage::Init;
        let dir = store::profile_dir(self.home(), &request.profile);

        // Re-running setup keeps the profile's existing port; only a fresh
        // profile allocates.
        let existing = store::read(&dir)?;
        let port = existing
            .as_ref()
            .and_then(GatewayConfig::port)
            .unwrap_or_else(|| self.next_available_port());
        emit(progress, ProgressEvent::tick(5, format!("Using port {port}")));

        std::fs::create_dir_all(&dir)?;
        enter(&mut stage, SetupStage::DirectoryReady);
        emit(progress, ProgressEvent::tick(10, "Profile directory ready"));
        ensure_active(cancel)?;

        let generated = GatewayConfig::generate(&GenerateParams {
            port,
            api_key: request.api_key.clone(),
            model_id: request.model_id.clone(),
            channel: request.channel.clone(),
        });
        let merged = GatewayConfig::merge(&existing.unwrap_or_default(), &generated);
        store::write(&dir, &merged)?;
        enter(&mut stage, SetupStage::ConfigWritten);
        emit(progress, ProgressEvent::tick(15, "Configuration written"));
        ensure_active(cancel)?;

        enter(&mut stage, SetupStage::Onboarding);
        let mut percent = 20u8;
        emit(progress, ProgressEvent::tick(percent, "Onboarding gateway"));
        let result = self
            .runner()
            .onboard(
                &OnboardArgs {
                    profile: request.profile.clone(),
                    port,
                },
                |line| {
                    let line = line.trim();
                    if line.is_empty() {
                        return;
                    }
                    percent = percent.saturating_add(ONBOARD_STEP).min(ONBOARD_CEILING);
                    emit(progress, ProgressEvent::tick(percent, line));
                },
                cancel,
            )
            .await;
        if let Err(err) = result {
            enter(&mut stage, SetupStage::Failed);
            return Err(err);
        }

        // The subprocess rewrites the document as it pleases; merge our
        // generated values back on top and repair the channel toggle it is
        // known to leave disabled.
        let after = store::read(&dir)?.unwrap_or_default();
        let mut reconciled = GatewayConfig::merge(&after, &generated);
        if let Some(choice) = &request.channel {
            reconciled.force_channel_enabled(&choice.kind);
        }
        store::write(&dir, &reconciled)?;
        enter(&mut stage, SetupStage::Reconciled);
        emit(progress, ProgressEvent::tick(85, "Configuration reconciled"));
        ensure_active(cancel)?;

        // A written, correct configuration with a not-yet-running service is
        // still a successful setup; service failures become warnings.
        match self
            .runner()
            .control(&request.profile, ServiceAction::Install)
            .await
        {
            Ok(()) => {
                enter(&mut stage, SetupStage::ServiceInstalled);
                emit(progress, ProgressEvent::tick(90, "Service installed"));
                match self
                    .runner()
                    .control(&request.profile, ServiceAction::Start)
                    .await
                {
                    Ok(()) => {
                        enter(&mut stage, SetupStage::Started);
                        emit(progress, ProgressEvent::tick(95, "Gateway started"));
                    }
                    Err(err) => {
                        tracing::warn!(profile = %request.profile, "gateway start failed: {err}");
                        emit(
                            progress,
                            ProgressEvent::tick(95, format!("Warning: gateway not started: {err}")),
                        );
                    }
                }
            }
            Err(err) => {
                tracing::warn!(profile = %request.profile, "service install failed: {err}");
                emit(
                    progress,
                    ProgressEvent::tick(90, format!("Warning: service not installed: {err}")),
                );
            }
        }

        enter(&mut stage, SetupStage::Done);
        let config_path = store::config_path(&dir);
        emit(
            progress,
            ProgressEvent::done(port, config_path.display().to_string()),
        );
        Ok(SetupOutcome { port, config_path })
    }

    /// Update an existing profile's credentials, model, or channel and
    /// bounce its service. No onboarding subprocess is involved.
    pub async fn run_connect(
        &self,
        request: &ConnectRequest,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<SetupOutcome> {
        let dir = store::profile_dir(self.home(), &request.profile);
        let base = store::read(&dir)?.ok_or_else(|| {
            Error::NotFound(format!("profile {} has no configuration", request.profile))
        })?;
        let port = base.port().ok_or_else(|| {
            Error::Validation(format!("profile {} has no configured port", request.profile))
        })?;
        emit(
            progress,
            ProgressEvent::tick(10, "Loaded profile configuration"),
        );
        ensure_active(cancel)?;

        let mut merged = base;
        if request.api_key.is_some() || request.channel.is_some() {
            let model_id = merged
                .model_id()
                .or_else(|| request.model_id.clone())
                .ok_or_else(|| {
                    Error::Validation(format!(
                        "profile {} has no configured model",
                        request.profile
                    ))
                })?;
            let overlay = GatewayConfig::generate(&GenerateParams {
                port,
                api_key: request.api_key.clone(),
                model_id,
                channel: request.channel.clone(),
            });
            merged = GatewayConfig::merge(&merged, &overlay);
        }
        if let Some(model_id) = &request.model_id {
            merged = GatewayConfig::merge(&merged, &GatewayConfig::model_overlay(model_id));
        }
        store::write(&dir, &merged)?;
        emit(progress, ProgressEvent::tick(45, "Configuration updated"));
        ensure_active(cancel)?;

        if let Err(err) = self
            .runner()
            .control(&request.profile, ServiceAction::Install)
            .await
        {
            tracing::warn!(profile = %request.profile, "service install during connect failed: {err}");
        }
        match self
            .runner()
            .control(&request.profile, ServiceAction::Restart)
            .await
        {
            Ok(()) => emit(progress, ProgressEvent::tick(85, "Gateway restarted")),
            Err(err) => {
                tracing::warn!(profile = %request.profile, "gateway restart failed: {err}");
                emit(
                    progress,
                    ProgressEvent::tick(85, format!("Warning: gateway not restarted: {err}")),
                );
            }
        }

        let config_path = store::config_path(&dir);
        emit(
            progress,
            ProgressEvent::done(port, config_path.display().to_string()),
        );
        Ok(SetupOutcome { port, config_path })
    }
}
