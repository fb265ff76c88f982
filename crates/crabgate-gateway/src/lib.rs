pub mod ports;
pub mod process;
pub mod registry;
pub mod setup;

use std::path::{Path, PathBuf};

use crabgate_config::{store, GatewayConfig};
use crabgate_schema::{Error, ProfileInfo, ProfileName, Result};

pub use process::{ClawdRunner, OnboardArgs, ServiceAction};
pub use setup::{ConnectRequest, ProgressSender, SetupOutcome, SetupRequest, SetupStage};

/// Owns everything needed to manage gateway profiles on this host: the
/// operator home directory the profile directories hang off, and the
/// external `clawd` binary used for service control and onboarding.
#[derive(Debug, Clone)]
pub struct Manager {
    home: PathBuf,
    runner: ClawdRunner,
}

impl Manager {
    pub fn new(home: PathBuf, clawd_binary: PathBuf) -> Self {
        Self {
            home,
            runner: ClawdRunner::new(clawd_binary),
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn runner(&self) -> &ClawdRunner {
        &self.runner
    }

    pub fn list(&self) -> Vec<ProfileName> {
        registry::list(&self.home)
    }

    pub async fn info(&self, name: &ProfileName) -> Result<ProfileInfo> {
        registry::info(&self.home, name).await
    }

    pub fn next_available_port(&self) -> u16 {
        ports::next_available_port(&self.home)
    }

    /// Start the profile's gateway. Service registration is attempted first
    /// because it may not exist yet; a registration failure is downgraded to
    /// a warning since the unit frequently already exists.
    pub async fn start(&self, name: &ProfileName) -> Result<()> {
        self.require_profile(name)?;
        if let Err(err) = self.runner.control(name, ServiceAction::Install).await {
            tracing::warn!(profile = %name, "service install before start failed: {err}");
        }
        self.runner.control(name, ServiceAction::Start).await
    }

    pub async fn stop(&self, name: &ProfileName) -> Result<()> {
        self.require_profile(name)?;
        self.runner.control(name, ServiceAction::Stop).await
    }

    pub async fn restart(&self, name: &ProfileName) -> Result<()> {
        self.require_profile(name)?;
        if let Err(err) = self.runner.control(name, ServiceAction::Install).await {
            tracing::warn!(profile = %name, "service install before restart failed: {err}");
        }
        self.runner.control(name, ServiceAction::Restart).await
    }

    /// Uninstall the service registration (best effort) and remove the
    /// profile directory. After this, `list` no longer reports the profile
    /// and its port is free for reallocation.
    pub async fn delete(&self, name: &ProfileName) -> Result<()> {
        let dir = self.require_profile(name)?;
        if let Err(err) = self.runner.control(name, ServiceAction::Uninstall).await {
            tracing::warn!(profile = %name, "service uninstall during delete failed: {err}");
        }
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    /// Swap the configured model: replaces the provider's model list and the
    /// primary reference through a config merge, leaving credentials and
    /// unknown fields untouched.
    pub async fn change_model(&self, name: &ProfileName, model_id: &str) -> Result<()> {
        let dir = self.require_profile(name)?;
        let base = store::read(&dir)?
            .ok_or_else(|| Error::NotFound(format!("no configuration for profile {name}")))?;
        let merged = GatewayConfig::merge(&base, &GatewayConfig::model_overlay(model_id));
        store::write(&dir, &merged)?;
        Ok(())
    }

    fn require_profile(&self, name: &ProfileName) -> Result<PathBuf> {
        let dir = store::profile_dir(&self.home, name);
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("profile {name}")));
        }
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn operations_on_unknown_profile_report_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let manager = Manager::new(tmp.path().to_path_buf(), PathBuf::from("clawd"));
        let ghost = ProfileName::parse("ghost").unwrap();

        let err = manager.delete(&ghost).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let err = manager
            .change_model(&ghost, "claude-sonnet-4-5-20250929")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
