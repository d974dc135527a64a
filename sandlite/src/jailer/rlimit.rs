//! Resource caps via POSIX rlimits.
//!
//! Caps are applied to the current process and inherited across exec, so
//! the child initializer installs them right before the seccomp filter.
//! Soft and hard limits are pinned to the same value; once lowered, a
//! hard limit cannot be raised again.
//!
//! Caps can be sourced from the environment:
//!
//! ```text
//! SANDBOX_RLIMIT_AS       address-space cap (bytes)
//! SANDBOX_RLIMIT_DATA     data-segment cap (bytes)
//! SANDBOX_RLIMIT_CPU      CPU-time cap (seconds)
//! SANDBOX_RLIMIT_NOFILE   max open descriptors
//! SANDBOX_RLIMIT_NPROC    max processes
//! ```
//!
//! Malformed values are reported as cap-parse errors and the resource is
//! left unchanged.

use std::fmt;

use nix::sys::resource::{Resource, setrlimit};

use sandlite_shared::errors::{SandError, SandResult};

/// The resources the sandbox can cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Total virtual address space, bytes (`RLIMIT_AS`).
    AddressSpace,
    /// Data segment, bytes (`RLIMIT_DATA`).
    DataSegment,
    /// CPU time, seconds (`RLIMIT_CPU`).
    CpuSeconds,
    /// Open file descriptors (`RLIMIT_NOFILE`).
    OpenFiles,
    /// Processes/threads for the real uid (`RLIMIT_NPROC`).
    Processes,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::AddressSpace,
        ResourceKind::DataSegment,
        ResourceKind::CpuSeconds,
        ResourceKind::OpenFiles,
        ResourceKind::Processes,
    ];

    /// Environment variable this cap is sourced from.
    pub const fn env_var(self) -> &'static str {
        match self {
            ResourceKind::AddressSpace => "SANDBOX_RLIMIT_AS",
            ResourceKind::DataSegment => "SANDBOX_RLIMIT_DATA",
            ResourceKind::CpuSeconds => "SANDBOX_RLIMIT_CPU",
            ResourceKind::OpenFiles => "SANDBOX_RLIMIT_NOFILE",
            ResourceKind::Processes => "SANDBOX_RLIMIT_NPROC",
        }
    }

    /// Kernel resource name, for logs.
    pub const fn name(self) -> &'static str {
        match self {
            ResourceKind::AddressSpace => "RLIMIT_AS",
            ResourceKind::DataSegment => "RLIMIT_DATA",
            ResourceKind::CpuSeconds => "RLIMIT_CPU",
            ResourceKind::OpenFiles => "RLIMIT_NOFILE",
            ResourceKind::Processes => "RLIMIT_NPROC",
        }
    }

    fn resource(self) -> Resource {
        match self {
            ResourceKind::AddressSpace => Resource::RLIMIT_AS,
            ResourceKind::DataSegment => Resource::RLIMIT_DATA,
            ResourceKind::CpuSeconds => Resource::RLIMIT_CPU,
            ResourceKind::OpenFiles => Resource::RLIMIT_NOFILE,
            ResourceKind::Processes => Resource::RLIMIT_NPROC,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-resource caps for a sandboxed child. `None` = inherit from parent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    pub address_space: Option<u64>,
    pub data_segment: Option<u64>,
    pub cpu_seconds: Option<u64>,
    pub open_files: Option<u64>,
    pub processes: Option<u64>,
}

impl ResourceLimits {
    pub fn get(&self, kind: ResourceKind) -> Option<u64> {
        match kind {
            ResourceKind::AddressSpace => self.address_space,
            ResourceKind::DataSegment => self.data_segment,
            ResourceKind::CpuSeconds => self.cpu_seconds,
            ResourceKind::OpenFiles => self.open_files,
            ResourceKind::Processes => self.processes,
        }
    }

    pub fn set(&mut self, kind: ResourceKind, value: u64) {
        let slot = match kind {
            ResourceKind::AddressSpace => &mut self.address_space,
            ResourceKind::DataSegment => &mut self.data_segment,
            ResourceKind::CpuSeconds => &mut self.cpu_seconds,
            ResourceKind::OpenFiles => &mut self.open_files,
            ResourceKind::Processes => &mut self.processes,
        };
        *slot = Some(value);
    }

    pub fn is_empty(&self) -> bool {
        ResourceKind::ALL.iter().all(|&kind| self.get(kind).is_none())
    }

    /// The caps that are actually set, as `(kind, value)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (ResourceKind, u64)> + '_ {
        ResourceKind::ALL
            .iter()
            .filter_map(move |&kind| self.get(kind).map(|value| (kind, value)))
    }

    /// Read caps from the `SANDBOX_RLIMIT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Read caps with a custom variable lookup (testable variant).
    pub fn from_env_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut limits = Self::default();
        for kind in ResourceKind::ALL {
            let Some(raw) = lookup(kind.env_var()) else {
                continue;
            };
            match parse_cap(kind, &raw) {
                Ok(value) => limits.set(kind, value),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring resource cap");
                }
            }
        }
        limits
    }
}

fn parse_cap(kind: ResourceKind, raw: &str) -> SandResult<u64> {
    raw.parse::<u64>().map_err(|_| {
        SandError::CapParse(format!(
            "{}={:?} is not an unsigned base-10 integer",
            kind.env_var(),
            raw
        ))
    })
}

/// Install every present cap on the current process, soft = hard.
///
/// A failure on an individual resource is logged and skipped: callers may
/// legitimately request caps tighter than the parent's hard limits, and a
/// partially capped sandbox beats no sandbox at all.
pub fn apply(limits: &ResourceLimits) {
    for (kind, value) in limits.entries() {
        match setrlimit(kind.resource(), value, value) {
            Ok(()) => tracing::debug!(resource = %kind, value, "applied resource cap"),
            Err(e) => tracing::warn!(
                resource = %kind,
                value,
                error = %e,
                "failed to apply resource cap; continuing"
            ),
        }
    }
}
