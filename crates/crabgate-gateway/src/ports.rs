//! Port assignment across profiles.

use std::collections::BTreeSet;
use std::path::Path;

use crabgate_config::store;

use crate::registry;

/// Default gateway port; the first profile on a host gets this.
pub const BASE_PORT: u16 = 18789;

/// Smallest port ≥ [`BASE_PORT`] not configured by any known profile.
///
/// Ports are never recycled proactively: a deleted profile frees its port
/// simply by no longer appearing in the scan. There is no reservation step
/// between this scan and the config write, so two concurrent creations can
/// race to the same port; accepted for a single-operator tool.
pub fn next_available_port(home: &Path) -> u16 {
    let mut taken = BTreeSet::new();
    for name in registry::list(home) {
        let dir = store::profile_dir(home, &name);
        if let Ok(Some(config)) = store::read(&dir) {
            if let Some(port) = config.port() {
                taken.insert(port);
            }
        }
    }
    smallest_free(&taken)
}

fn smallest_free(taken: &BTreeSet<u16>) -> u16 {
    let mut candidate = BASE_PORT;
    while taken.contains(&candidate) {
        candidate += 1;
    }
    candidate
}
