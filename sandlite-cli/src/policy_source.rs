//! Profile discovery for form-B invocations (no explicit profile token).
//!
//! Discovery order:
//!
//! 1. the `SANDBOX_SECCOMP_MODE` environment variable,
//! 2. the first line of `/etc/sandbox_policy` (one ASCII token terminated
//!    by end-of-line or end-of-file, trailing newline trimmed),
//! 3. the default profile, `open`.
//!
//! A source that *is* present but carries an unparsable token is a fatal
//! policy error: substituting a default for an explicitly configured (but
//! broken) policy would silently change the containment level.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use sandlite::Profile;
use sandlite_shared::errors::{SandError, SandResult};

/// Environment variable naming the profile.
pub const PROFILE_ENV: &str = "SANDBOX_SECCOMP_MODE";

/// System-wide policy file consulted when the environment is silent.
pub const POLICY_FILE: &str = "/etc/sandbox_policy";

/// Profile used when no source yields a token.
pub const DEFAULT_PROFILE: Profile = Profile::Open;

/// Discover the profile from the process environment and policy file.
pub fn discover() -> SandResult<Profile> {
    discover_with(|name| std::env::var(name).ok(), Path::new(POLICY_FILE))
}

/// Discovery with injectable sources (testable variant).
pub fn discover_with<F>(lookup: F, policy_file: &Path) -> SandResult<Profile>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = lookup(PROFILE_ENV) {
        tracing::debug!(source = PROFILE_ENV, token = %token, "profile from environment");
        return token.parse();
    }

    if let Some(token) = read_policy_file(policy_file)? {
        tracing::debug!(source = %policy_file.display(), token = %token, "profile from policy file");
        return token.parse();
    }

    tracing::debug!(profile = %DEFAULT_PROFILE, "no policy source found; using default");
    Ok(DEFAULT_PROFILE)
}

/// Read the first line of the policy file. `Ok(None)` when the file does
/// not exist; any other read failure is an error.
fn read_policy_file(path: &Path) -> SandResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(
            contents.lines().next().unwrap_or_default().to_string(),
        )),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SandError::Config(format!(
            "failed to read policy file {}: {}",
            path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn policy_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn environment_wins_over_everything() {
        let file = policy_file("locked\n");
        let profile = discover_with(|_| Some("restricted".into()), file.path()).unwrap();
        assert_eq!(profile, Profile::Restricted);
    }

    #[test]
    fn invalid_environment_token_is_fatal() {
        let err = discover_with(|_| Some("paranoid".into()), Path::new("/nonexistent")).unwrap_err();
        assert!(matches!(err, SandError::Policy(_)), "got {:?}", err);
    }

    #[test]
    fn policy_file_first_line_is_used() {
        let file = policy_file("locked\n");
        let profile = discover_with(no_env, file.path()).unwrap();
        assert_eq!(profile, Profile::Locked);
    }

    #[test]
    fn policy_file_without_trailing_newline_is_accepted() {
        let file = policy_file("restricted");
        let profile = discover_with(no_env, file.path()).unwrap();
        assert_eq!(profile, Profile::Restricted);
    }

    #[test]
    fn only_the_first_line_counts() {
        let file = policy_file("open\nlocked\n");
        let profile = discover_with(no_env, file.path()).unwrap();
        assert_eq!(profile, Profile::Open);
    }

    #[test]
    fn garbage_policy_file_is_fatal() {
        let file = policy_file("everything-goes\n");
        let err = discover_with(no_env, file.path()).unwrap_err();
        assert!(matches!(err, SandError::Policy(_)), "got {:?}", err);
    }

    #[test]
    fn empty_policy_file_is_fatal() {
        // A present-but-empty file is an expressed (broken) policy, not
        // an absent one.
        let file = policy_file("");
        let err = discover_with(no_env, file.path()).unwrap_err();
        assert!(matches!(err, SandError::Policy(_)), "got {:?}", err);
    }

    #[test]
    fn missing_sources_fall_back_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no_policy_here");
        let profile = discover_with(no_env, &missing).unwrap();
        assert_eq!(profile, Profile::Open);
    }
}
