//! Jailer module: the sandlite containment pipeline.
//!
//! The jailer turns an ordinary child process into a sandboxed one. The
//! supervisor (this module) runs in the parent; everything else runs in
//! the child between clone entry and exec.
//!
//! # Architecture
//!
//! ```text
//! jailer/
//! ├── mod.rs      (SandboxRequest, supervisor: clone/wait, ExitReport)
//! ├── child.rs    (child initializer sequence)
//! ├── seccomp.rs  (syscall-name resolver + filter builder)
//! ├── rlimit.rs   (resource caps, SANDBOX_RLIMIT_* parsing)
//! └── cgroup.rs   (cgroup v2 probe, no-op setup stub)
//! ```
//!
//! # Containment Layers
//!
//! 1. **Namespace isolation** - fresh UTS, mount and PID namespaces via clone
//! 2. **Root replacement** - chroot into the requested rootfs
//! 3. **Private /proc** - mounted after the PID namespace is entered
//! 4. **Resource caps** - rlimits, soft pinned to hard
//! 5. **Seccomp filtering** - one of three named profiles, loaded last
//!
//! The order is security-critical: the filter is installed as the final
//! step before exec so the initializer's own syscalls (sethostname,
//! chroot, mount, setrlimit) never have to appear on the allow-list.
//!
//! # Memory-safety invariant
//!
//! The clone stack and the marshalled argument block are owned by the
//! parent for their entire lifetime. The child reads them through shared
//! (COW) pages but never frees them; the parent releases both exactly
//! once, strictly after `wait` has reaped the child.

use std::ffi::CString;
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use nix::errno::Errno;
use nix::sched::{self, CloneFlags};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;

use sandlite_shared::errors::{SandError, SandResult};

use crate::policy::Profile;

mod child;
pub mod cgroup;
pub mod rlimit;
pub mod seccomp;

pub use rlimit::{ResourceKind, ResourceLimits};

/// Hostname set inside the child's UTS namespace.
pub const SANDBOX_HOSTNAME: &str = "sandbox";

/// Exit code the child uses for any pre-exec setup failure, as opposed to
/// whatever the target program itself exits with.
pub const SETUP_FAILURE_CODE: i32 = 1;

/// Clone-stack size. 1 MiB covers the child initializer comfortably; no
/// user code ever runs on this stack because the child execs.
const CHILD_STACK_SIZE: usize = 1024 * 1024;

// ============================================================================
// SandboxRequest
// ============================================================================

/// Immutable description of one sandboxed execution.
///
/// Built by the caller, consumed by [`run`]. The request is marshalled
/// into NUL-terminated strings before the clone so the child performs no
/// allocation of its own.
#[derive(Debug, Clone)]
pub struct SandboxRequest {
    /// Directory that becomes the child's root filesystem. Must be
    /// resolvable from the parent's namespace view; the child resolves it
    /// a second time at chroot.
    pub rootfs: PathBuf,

    /// Command to execute; `argv[0]` is the program, located via PATH
    /// search inside the new root.
    pub argv: Vec<String>,

    /// Syscall-filter profile.
    pub profile: Profile,

    /// Per-resource caps; absent entries are inherited from the parent.
    pub caps: ResourceLimits,
}

impl SandboxRequest {
    /// Create a request with no resource caps.
    pub fn new(rootfs: impl Into<PathBuf>, argv: Vec<String>, profile: Profile) -> Self {
        Self {
            rootfs: rootfs.into(),
            argv,
            profile,
            caps: ResourceLimits::default(),
        }
    }

    /// Set resource caps (builder pattern).
    pub fn with_caps(mut self, caps: ResourceLimits) -> Self {
        self.caps = caps;
        self
    }

    fn validate(&self) -> SandResult<()> {
        if self.argv.is_empty() {
            return Err(SandError::Config(
                "argv must name a program to execute".into(),
            ));
        }
        if !self.rootfs.is_dir() {
            return Err(SandError::Config(format!(
                "rootfs {} is not a directory reachable from the parent",
                self.rootfs.display()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// ExitReport
// ============================================================================

/// How the sandboxed child ended.
///
/// Setup failures inside the child surface as `Exited(SETUP_FAILURE_CODE)`;
/// nothing else crosses the namespace boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReport {
    /// The child exited normally with the given code.
    Exited(i32),

    /// The child was terminated by the given signal.
    Signaled(i32),
}

impl ExitReport {
    /// True for a clean zero exit.
    pub fn success(&self) -> bool {
        matches!(self, ExitReport::Exited(0))
    }

    /// Collapse the report into a process exit code: the child's own code,
    /// or 128 + signal for signal deaths (shell convention).
    pub fn code(&self) -> i32 {
        match self {
            ExitReport::Exited(code) => *code,
            ExitReport::Signaled(signal) => 128 + *signal,
        }
    }

    fn from_wait(status: WaitStatus) -> SandResult<Self> {
        match status {
            WaitStatus::Exited(_, code) => Ok(ExitReport::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Ok(ExitReport::Signaled(signal as i32)),
            other => Err(SandError::Internal(format!(
                "unexpected wait status for child: {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReport::Exited(code) => write!(f, "exit code {}", code),
            ExitReport::Signaled(signal) => write!(f, "terminated by signal {}", signal),
        }
    }
}

// ============================================================================
// Marshalled argument block
// ============================================================================

/// Arguments marshalled for the child before the clone.
///
/// Everything the initializer touches is prepared here, in the parent, as
/// NUL-terminated strings plus a NULL-terminated pointer array for exec;
/// the child reads the block positionally through COW pages and performs
/// no allocation of its own between clone entry and exec.
#[derive(Debug)]
pub(crate) struct ChildPayload {
    pub(crate) rootfs: CString,
    pub(crate) program: CString,
    /// Owning storage for the exec argument strings; must stay alive as
    /// long as the pointer array below.
    #[allow(dead_code)]
    argv: Vec<CString>,
    /// NULL-terminated pointers into `argv`, in exec order. CString heap
    /// buffers are stable, so these stay valid for the payload's lifetime.
    pub(crate) argv_ptrs: Vec<*const libc::c_char>,
    pub(crate) profile: Profile,
    pub(crate) caps: ResourceLimits,
}

impl ChildPayload {
    fn marshal(request: &SandboxRequest) -> SandResult<Self> {
        let rootfs = CString::new(request.rootfs.as_os_str().as_bytes())
            .map_err(|_| SandError::Config("rootfs path contains a NUL byte".into()))?;
        let argv = request
            .argv
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| SandError::Config("argv contains a NUL byte".into()))?;
        // validate() has already rejected an empty argv
        let program = argv
            .first()
            .cloned()
            .ok_or_else(|| SandError::Config("argv must name a program to execute".into()))?;
        let argv_ptrs = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(std::ptr::null()))
            .collect();
        Ok(Self {
            rootfs,
            program,
            argv,
            argv_ptrs,
            profile: request.profile,
            caps: request.caps.clone(),
        })
    }

    #[cfg(test)]
    fn argv(&self) -> &[CString] {
        &self.argv
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Parent-side record for a cloned child: its pid plus the stack buffer
/// the kernel handed to the child.
struct ChildHandle {
    pid: Pid,
    /// Owned clone stack. The kernel was given its top address; releasing
    /// it while the child runs would pull the stack out from under it, so
    /// it is kept here until the child has been reaped.
    _stack: Vec<u8>,
}

impl ChildHandle {
    /// Block until the child is reaped. Signals delivered to the parent do
    /// not abandon the child: the wait is retried on EINTR.
    fn wait(&self) -> SandResult<WaitStatus> {
        loop {
            match waitpid(self.pid, None) {
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    return Err(SandError::Internal(format!(
                        "waitpid({}): {}",
                        self.pid, e
                    )));
                }
                Ok(status) => return Ok(status),
            }
        }
    }
}

/// Run one sandboxed execution to completion.
///
/// Clones a child into fresh UTS, mount and PID namespaces, lets the child
/// initializer do the containment work (the module docs describe the
/// ordering), blocks until the child is reaped, and reports how it ended.
///
/// The supervisor is strictly single-threaded and assumes it is called
/// from a single-threaded process: the child inherits copies of every
/// process-wide lock, so a lock held by another thread at clone time
/// would never be released in the child.
///
/// # Errors
///
/// Returns an error for a malformed request or a failed clone. Failures
/// *inside* the child never propagate as errors; they come back as
/// `ExitReport::Exited(1)` with diagnostics on the child's stderr.
pub fn run(request: &SandboxRequest) -> SandResult<ExitReport> {
    request.validate()?;
    let payload = ChildPayload::marshal(request)?;

    // Extension seam: probes for cgroup v2 but installs no limits today.
    cgroup::setup_cgroup(SANDBOX_HOSTNAME)?;

    let mut stack = vec![0u8; CHILD_STACK_SIZE];
    let flags = CloneFlags::CLONE_NEWUTS | CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWPID;

    tracing::info!(
        rootfs = %request.rootfs.display(),
        profile = %request.profile,
        "cloning sandboxed child"
    );

    // SAFETY: the stack buffer and the marshalled payload both outlive the
    // child: they are moved into/held alongside the ChildHandle and only
    // released after wait() has reaped the child below.
    let pid = unsafe {
        sched::clone(
            Box::new(|| child::run(&payload)),
            &mut stack,
            flags,
            Some(libc::SIGCHLD),
        )
    }
    .map_err(|e| SandError::Clone(format!("clone with {:?}: {}", flags, e)))?;

    let handle = ChildHandle { pid, _stack: stack };
    tracing::debug!(pid = %handle.pid, "child cloned, waiting");

    let status = handle.wait()?;
    let report = ExitReport::from_wait(status)?;
    tracing::info!(pid = %handle.pid, %report, "sandboxed child reaped");

    // The child is gone; the stack and the marshalled block are released
    // here, exactly once.
    drop(handle);
    drop(payload);

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;
    use std::io::Write;

    fn request(argv: &[&str]) -> SandboxRequest {
        SandboxRequest::new("/", argv.iter().map(|s| s.to_string()).collect(), Profile::Open)
    }

    #[test]
    fn empty_argv_is_rejected() {
        let err = run(&request(&[])).unwrap_err();
        assert!(matches!(err, SandError::Config(_)), "got {:?}", err);
    }

    #[test]
    fn rootfs_must_be_a_directory() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a rootfs").unwrap();
        let req = SandboxRequest::new(
            file.path(),
            vec!["/bin/true".to_string()],
            Profile::Open,
        );
        let err = run(&req).unwrap_err();
        assert!(matches!(err, SandError::Config(_)), "got {:?}", err);
    }

    #[test]
    fn marshal_rejects_interior_nul() {
        let req = request(&["/bin/echo", "bad\0arg"]);
        let err = ChildPayload::marshal(&req).unwrap_err();
        assert!(matches!(err, SandError::Config(_)), "got {:?}", err);
    }

    #[test]
    fn marshal_snapshots_argv_in_order() {
        let req = request(&["/bin/echo", "hello", "world"]);
        let payload = ChildPayload::marshal(&req).unwrap();
        assert_eq!(payload.program.to_str().unwrap(), "/bin/echo");
        let argv: Vec<&str> = payload.argv().iter().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(argv, ["/bin/echo", "hello", "world"]);
        // exec pointer array mirrors argv and is NULL-terminated
        assert_eq!(payload.argv_ptrs.len(), payload.argv().len() + 1);
        assert!(payload.argv_ptrs.last().unwrap().is_null());
    }

    #[test]
    fn exit_report_translates_normal_exit() {
        let status = WaitStatus::Exited(Pid::from_raw(42), 7);
        let report = ExitReport::from_wait(status).unwrap();
        assert_eq!(report, ExitReport::Exited(7));
        assert_eq!(report.code(), 7);
        assert!(!report.success());
    }

    #[test]
    fn exit_report_translates_signal_death() {
        let status = WaitStatus::Signaled(Pid::from_raw(42), Signal::SIGKILL, false);
        let report = ExitReport::from_wait(status).unwrap();
        assert_eq!(report, ExitReport::Signaled(9));
        assert_eq!(report.code(), 137);
        assert!(!report.success());
    }

    #[test]
    fn exit_report_zero_is_success() {
        let report = ExitReport::Exited(0);
        assert!(report.success());
        assert_eq!(report.code(), 0);
    }
}
