//! CLI definition and argument parsing for sandlite-cli.
//!
//! Two positional forms are accepted:
//!
//! ```text
//! sandlite <rootfs> <profile> <cmd> [args...]     (form A)
//! sandlite <rootfs> <cmd> [args...]               (form B)
//! ```
//!
//! The first word after `<rootfs>` is treated as a profile iff it parses
//! as one of the three profile tokens; otherwise form B applies and the
//! profile is discovered from the environment or the policy file (see
//! [`crate::policy_source`]).

use std::path::PathBuf;

use clap::{Args, Parser};

use sandlite::{Profile, ResourceLimits, SandboxRequest};
use sandlite_shared::errors::{SandError, SandResult};

use crate::policy_source;

#[derive(Parser, Debug)]
#[command(
    name = "sandlite",
    author,
    version,
    about = "Run a command inside a one-shot Linux sandbox"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    /// Directory that becomes the sandbox root filesystem
    pub rootfs: PathBuf,

    /// Optional profile token (open|restricted|locked) followed by the
    /// command to run inside the sandbox
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

// ============================================================================
// GLOBAL FLAGS
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct GlobalFlags {
    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Turn parsed arguments into a core request.
///
/// Resource caps always come from the `SANDBOX_RLIMIT_*` environment;
/// the profile comes from the explicit token (form A) or from discovery
/// (form B). An explicit-but-invalid discovered token is fatal: the
/// front end never downgrades an expressed policy to a default.
pub fn build_request(cli: &Cli) -> SandResult<SandboxRequest> {
    let (profile, argv) = match cli.command[0].parse::<Profile>() {
        Ok(profile) => (profile, cli.command[1..].to_vec()),
        Err(_) => (policy_source::discover()?, cli.command.clone()),
    };

    if argv.is_empty() {
        return Err(SandError::Config(
            "missing command to run inside the sandbox".into(),
        ));
    }

    Ok(SandboxRequest::new(cli.rootfs.clone(), argv, profile).with_caps(ResourceLimits::from_env()))
}
