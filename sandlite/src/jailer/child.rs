//! Child-side initializer: the fixed sequence between clone entry and exec.
//!
//! Runs on the clone stack, inside the fresh namespaces, with the parent's
//! address space shared COW. Every fatal failure exits with
//! [`SETUP_FAILURE_CODE`](super::SETUP_FAILURE_CODE) and a diagnostic on
//! the inherited stderr; nothing else crosses the namespace boundary.

use std::convert::Infallible;

use nix::mount::{MsFlags, mount};
use nix::unistd;

use sandlite_shared::errors::{SandError, SandResult};

use super::{ChildPayload, SANDBOX_HOSTNAME, SETUP_FAILURE_CODE, rlimit, seccomp};

/// Clone entry point. Returns the child's exit code on setup failure; on
/// success the process image has been replaced and this never returns.
pub(super) fn run(payload: &ChildPayload) -> isize {
    match init(payload) {
        Ok(never) => match never {},
        Err(e) => {
            // stderr is inherited from the parent; the exit code is the
            // only signal that crosses the namespace boundary.
            eprintln!("sandlite: {}", e);
            SETUP_FAILURE_CODE as isize
        }
    }
}

fn init(payload: &ChildPayload) -> SandResult<Infallible> {
    // 1. Hostname. The fresh UTS namespace is active from the child's
    //    first instruction, so this never touches the parent's name.
    unistd::sethostname(SANDBOX_HOSTNAME)
        .map_err(|e| SandError::Setup(format!("sethostname: {}", e)))?;

    // 2. Root pivot. The rootfs path is resolved a second time here, in
    //    the child's own mount-namespace view.
    unistd::chroot(payload.rootfs.as_c_str())
        .map_err(|e| SandError::Setup(format!("chroot {:?}: {}", payload.rootfs, e)))?;
    unistd::chdir("/").map_err(|e| SandError::Setup(format!("chdir /: {}", e)))?;

    // 3. Fresh /proc, reflecting only the new PID namespace. The inherited
    //    mount tree is made private first: on hosts with shared root
    //    propagation the proc mount would otherwise leak back into the
    //    parent's namespace.
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| SandError::Setup(format!("remount / private: {}", e)))?;
    mount(
        Some("proc"),
        "/proc",
        Some("proc"),
        MsFlags::empty(),
        None::<&str>,
    )
    .map_err(|e| SandError::Setup(format!("mount /proc: {}", e)))?;

    // 4. Resource caps, before the filter: filter installation must never
    //    itself be rate-limited, and memory caps then cover the loader's
    //    own allocations. Individual cap failures are logged, not fatal.
    rlimit::apply(&payload.caps);

    // 5. Seccomp, last privileged step: the mount/chroot/setrlimit calls
    //    above never have to appear on the allow-list.
    seccomp::build_and_load(payload.profile)?;

    // 6. PATH-search exec inside the new root. The argument array was
    //    NULL-terminated by the parent at marshal time; nothing is
    //    allocated here between clone entry and exec.
    // SAFETY: program and argv_ptrs are NUL/NULL-terminated and outlive
    // this call; on success the process image is replaced.
    unsafe {
        libc::execvp(payload.program.as_ptr(), payload.argv_ptrs.as_ptr());
    }
    // execvp only returns on failure.
    Err(SandError::Setup(format!(
        "exec {:?}: {}",
        payload.program,
        std::io::Error::last_os_error()
    )))
}
