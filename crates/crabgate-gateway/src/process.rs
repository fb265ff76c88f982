//! Invocation of the external `clawd` control binary.
//!
//! Two modes: short synchronous service-control calls with a hard timeout,
//! and the long-running onboarding subprocess whose merged output is
//! surfaced line-by-line and which must die immediately on cancellation.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crabgate_schema::{Error, ProfileName, Result};

const CONTROL_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Install,
    Start,
    Stop,
    Restart,
    Uninstall,
}

impl ServiceAction {
    fn arg(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Uninstall => "uninstall",
        }
    }
}

/// Flags passed to the onboarding subprocess.
#[derive(Debug, Clone)]
pub struct OnboardArgs {
    pub profile: ProfileName,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ClawdRunner {
    binary: PathBuf,
}

impl ClawdRunner {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    fn label(&self, tail: &str) -> String {
        let name = self
            .binary
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("clawd");
        format!("{name} {tail}")
    }

    /// Synchronous service-control call. Non-zero exit and timeout are both
    /// recoverable errors the caller may decide to ignore.
    pub async fn control(&self, profile: &ProfileName, action: ServiceAction) -> Result<()> {
        let label = self.label(&format!("service {}", action.arg()));

        let mut cmd = Command::new(&self.binary);
        cmd.arg("service")
            .arg(action.arg())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !profile.is_default() {
            cmd.arg("--profile").arg(profile.as_str());
        }

        let output = match tokio::time::timeout(CONTROL_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(Error::SpawnFailed {
                    command: label,
                    source,
                })
            }
            Err(_) => return Err(Error::SubprocessTimeout { command: label }),
        };

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            tracing::debug!(
                command = %label,
                code,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "service control call failed"
            );
            return Err(Error::Subprocess {
                command: label,
                code,
            });
        }
        Ok(())
    }

    /// Run `clawd onboard` for a profile, feeding every line of its merged
    /// output to `on_line`. Cancelling the token kills the child
    /// immediately and resolves to `Error::Cancelled`.
    pub async fn onboard(
        &self,
        args: &OnboardArgs,
        mut on_line: impl FnMut(&str),
        cancel: &CancellationToken,
    ) -> Result<()> {
        let label = self.label("onboard");

        let mut cmd = Command::new(&self.binary);
        cmd.arg("onboard")
            .arg("--install")
            .arg("--no-prompt")
            .arg("--port")
            .arg(args.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !args.profile.is_default() {
            cmd.arg("--profile").arg(args.profile.as_str());
        }

        let mut child = cmd.spawn().map_err(|source| Error::SpawnFailed {
            command: label.clone(),
            source,
        })?;

        let mut stdout = lines_of(child.stdout.take(), &label)?;
        let mut stderr = lines_of(child.stderr.take(), &label)?;
        let mut stdout_open = true;
        let mut stderr_open = true;

        while stdout_open || stderr_open {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    return Err(Error::Cancelled);
                }
                line = stdout.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => on_line(&line),
                    _ => stdout_open = false,
                },
                line = stderr.next_line(), if stderr_open => match line {
                    Ok(Some(line)) => on_line(&line),
                    _ => stderr_open = false,
                },
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(Error::Cancelled);
            }
            status = child.wait() => status.map_err(|source| Error::SpawnFailed {
                command: label.clone(),
                source,
            })?,
        };

        if !status.success() {
            return Err(Error::Subprocess {
                command: label,
                code: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

fn lines_of<R>(pipe: Option<R>, label: &str) -> Result<Lines<BufReader<R>>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let pipe = pipe.ok_or_else(|| Error::SpawnFailed {
        command: label.to_string(),
        source: std::io::Error::other("child pipe was not captured"),
    })?;
    Ok(BufReader::new(pipe).lines())
}
