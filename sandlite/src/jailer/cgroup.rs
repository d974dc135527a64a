//! Cgroup v2 probe and setup stub.
//!
//! The sandbox caps resources with rlimits (see [`super::rlimit`]); cgroup
//! v2 enforcement is a future extension. The supervisor still calls
//! [`setup_cgroup`] before every clone so the seam stays wired, but no
//! controller limits are installed and nothing is written under
//! `/sys/fs/cgroup`.

use std::path::Path;

use sandlite_shared::errors::SandResult;

/// Base path for the cgroup v2 filesystem.
const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Check if cgroup v2 is available and the unified hierarchy is used.
pub fn is_cgroup_v2_available() -> bool {
    let cgroup_root = Path::new(CGROUP_ROOT);
    if !cgroup_root.exists() {
        return false;
    }

    // cgroup.controllers only exists on the v2 unified hierarchy
    cgroup_root.join("cgroup.controllers").exists()
}

/// Placeholder for cgroup-based enforcement. Always succeeds; installs
/// nothing.
pub fn setup_cgroup(name: &str) -> SandResult<()> {
    if !is_cgroup_v2_available() {
        tracing::debug!(name, "cgroup v2 not available; skipping cgroup setup");
        return Ok(());
    }

    tracing::debug!(
        name,
        "cgroup v2 detected; enforcement not implemented, no limits installed"
    );
    Ok(())
}
