//! Profile discovery and status reporting.
//!
//! Nothing is cached: every listing reconstructs state from disk plus a
//! live TCP probe against the profile's configured port.

use std::path::Path;
use std::time::Duration;

use tokio::net::TcpStream;

use crabgate_config::store;
use crabgate_schema::{model_presets, Error, ProfileInfo, ProfileName, ProfileStatus, Result};

const PROBE_TIMEOUT: Duration = Duration::from_millis(800);

/// All profiles on this host: the default profile first when its directory
/// exists, then named profiles in filesystem enumeration order.
pub fn list(home: &Path) -> Vec<ProfileName> {
    let mut names = Vec::new();

    let default = ProfileName::default_profile();
    if store::profile_dir(home, &default).is_dir() {
        names.push(default);
    }

    if let Ok(entries) = std::fs::read_dir(home) {
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name == store::DEFAULT_DIR {
                continue;
            }
            if let Some(name) = store::profile_name_from_dir(file_name) {
                names.push(name);
            }
        }
    }

    names
}

/// Identity, configured model and channel, and live/dead status for one
/// profile. Config read failures and probe failures degrade to empty
/// fields and `stopped`; only a missing profile is an error.
pub async fn info(home: &Path, name: &ProfileName) -> Result<ProfileInfo> {
    let dir = store::profile_dir(home, name);
    if !dir.is_dir() {
        return Err(Error::NotFound(format!("profile {name}")));
    }

    let config = match store::read(&dir) {
        Ok(config) => config.unwrap_or_default(),
        Err(err) => {
            tracing::warn!(profile = %name, "config read failed during info: {err}");
            Default::default()
        }
    };

    let model_id = config.model_id().unwrap_or_default();
    let model = model_presets::display_name(&model_id).to_string();
    let channel = config
        .first_enabled_channel()
        .unwrap_or_default()
        .to_string();

    let port = config.port();
    let status = match port {
        Some(port) if probe(port).await => ProfileStatus::Running,
        _ => ProfileStatus::Stopped,
    };

    Ok(ProfileInfo {
        name: name.to_string(),
        port,
        status,
        model,
        model_id,
        channel,
    })
}

/// Bounded-timeout connect to the loopback port the profile claims.
async fn probe(port: u16) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    )
}
