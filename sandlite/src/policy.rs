//! Syscall-filter profiles and the policy resolver.
//!
//! A [`Profile`] selects one of three named seccomp policies. The resolver
//! accepts exactly the tokens `open`, `restricted` and `locked`
//! (case-sensitive ASCII, no trimming); anything else is a policy error.
//! The core never substitutes a default; callers that want a fallback
//! must decide for themselves before building a request.

use std::fmt;
use std::str::FromStr;

use sandlite_shared::errors::SandError;

/// Named syscall-filter policy applied to the sandboxed child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// No filter is installed. The child runs with the kernel's full
    /// syscall surface.
    Open,

    /// Deny-by-default (`EPERM`) with the common allow-list plus the
    /// networking allow-list.
    Restricted,

    /// Deny-by-default (`EPERM`) with only the common allow-list.
    /// Mount, trace and reboot-family syscalls are denied explicitly.
    Locked,
}

impl Profile {
    /// Canonical token for this profile, as accepted by the resolver.
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Open => "open",
            Profile::Restricted => "restricted",
            Profile::Locked => "locked",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = SandError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "open" => Ok(Profile::Open),
            "restricted" => Ok(Profile::Restricted),
            "locked" => Ok(Profile::Locked),
            _ => Err(SandError::Policy(format!(
                "unrecognized profile {:?} (expected \"open\", \"restricted\" or \"locked\")",
                token
            ))),
        }
    }
}
