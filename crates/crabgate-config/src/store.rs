//! On-disk layout and read/write of profile configuration documents.
//!
//! The default profile owns `<home>/.clawd`; a named profile owns
//! `<home>/.clawd-<name>`. Each directory holds one `clawd.json`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crabgate_schema::{ProfileName, Result};

use crate::document::GatewayConfig;

pub const CONFIG_FILE: &str = "clawd.json";
pub const DEFAULT_DIR: &str = ".clawd";
const NAMED_DIR_PREFIX: &str = ".clawd-";

pub fn profile_dir(home: &Path, name: &ProfileName) -> PathBuf {
    if name.is_default() {
        home.join(DEFAULT_DIR)
    } else {
        home.join(format!("{NAMED_DIR_PREFIX}{name}"))
    }
}

pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Inverse of [`profile_dir`] over a directory file name. The unsuffixed
/// default directory maps to the default profile.
pub fn profile_name_from_dir(file_name: &str) -> Option<ProfileName> {
    if file_name == DEFAULT_DIR {
        return Some(ProfileName::default_profile());
    }
    let name = file_name.strip_prefix(NAMED_DIR_PREFIX)?;
    ProfileName::parse(name).ok()
}

/// Read a profile's document. A missing file is `Ok(None)`; a document that
/// no longer parses is also `Ok(None)` so a corrupt write by the external
/// binary never wedges the manager.
pub fn read(dir: &Path) -> Result<Option<GatewayConfig>> {
    let path = config_path(dir);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    match serde_json::from_str(&raw) {
        Ok(config) => Ok(Some(config)),
        Err(err) => {
            tracing::warn!(path = %path.display(), "unparseable config treated as absent: {err}");
            Ok(None)
        }
    }
}

pub fn write(dir: &Path, config: &GatewayConfig) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let raw = serde_json::to_string_pretty(config)
        .map_err(|err| std::io::Error::new(ErrorKind::InvalidData, err))?;
    std::fs::write(config_path(dir), raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ChannelChoice, GenerateParams};

    #[test]
    fn default_and_named_dirs_follow_convention() {
        let home = Path::new("/home/op");
        let default = ProfileName::default_profile();
        let work = ProfileName::parse("work").unwrap();
        assert_eq!(profile_dir(home, &default), home.join(".clawd"));
        assert_eq!(profile_dir(home, &work), home.join(".clawd-work"));
    }

    #[test]
    fn dir_names_round_trip() {
        assert!(profile_name_from_dir(".clawd").unwrap().is_default());
        assert_eq!(
            profile_name_from_dir(".clawd-work").unwrap().as_str(),
            "work"
        );
        assert!(profile_name_from_dir(".clawdbackup").is_none());
        assert!(profile_name_from_dir("other").is_none());
    }

    #[test]
    fn read_missing_returns_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(read(&tmp.path().join(".clawd")).unwrap().is_none());
    }

    #[test]
    fn read_corrupt_returns_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join(".clawd");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(config_path(&dir), "{not json").unwrap();
        assert!(read(&dir).unwrap().is_none());
    }

    #[test]
    fn write_then_read_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join(".clawd-work");
        let config = GatewayConfig::generate(&GenerateParams {
            port: 18791,
            api_key: None,
            model_id: "claude-haiku-4-5-20251001".into(),
            channel: Some(ChannelChoice {
                kind: "discord".into(),
                token: None,
                allowlist: vec![],
            }),
        });
        write(&dir, &config).unwrap();
        let loaded = read(&dir).unwrap().unwrap();
        assert_eq!(loaded, config);
    }
}
