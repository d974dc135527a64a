//! Seccomp BPF filter builder for the three sandbox profiles.
//!
//! Filters are compiled with the `seccompiler` crate from tables of
//! syscall *names*. Names are resolved to kernel numbers at runtime (see
//! [`resolve`]), so a policy written against kernel N still builds on
//! kernel N-k: a name the running architecture does not know is simply
//! omitted from the allow-list and stays covered by the default action.
//!
//! ## Profile semantics
//!
//! | Profile | Default action | Rules |
//! |---|---|---|
//! | `open` | n/a | no filter is installed |
//! | `restricted` | `Errno(EPERM)` | common allow-list + networking allow-list |
//! | `locked` | `Errno(EPERM)` | common allow-list only; deny-list struck out |
//!
//! Rule assembly order: allow rules first, then the deny-list strikes,
//! then one atomic load. Once loaded the filter applies to this thread
//! and every descendant and cannot be revoked; the compiled program is
//! dropped right after the load.

use std::collections::BTreeMap;
use std::io;

use libc::c_long;
use seccompiler::{BpfProgram, SeccompAction, SeccompFilter, SeccompRule};

use sandlite_shared::errors::{SandError, SandResult};

use crate::policy::Profile;

/// Syscalls any dynamically linked program needs to start and run basic
/// I/O under a deny-by-default filter.
///
/// Legacy spellings (`open`, `poll`, `fork`, ...) only exist on x86_64;
/// on other architectures they fail to resolve and are omitted, which is
/// fine because those kernels only ever see the `*at`/modern spellings.
pub const COMMON_SYSCALLS: &[&str] = &[
    // === Dynamic-linker startup / memory management ===
    "mmap",
    "mprotect",
    "munmap",
    "brk",
    "arch_prctl",
    "prctl",
    "rseq",
    "set_tid_address",
    "set_robust_list",
    "getrandom",
    "prlimit64",
    // === File and descriptor basics ===
    "read",
    "write",
    "pread64",
    "pwrite64",
    "readv",
    "writev",
    "close",
    "open",
    "openat",
    "lseek",
    "fstat",
    "newfstatat",
    "statx",
    "stat",
    "lstat",
    "access",
    "faccessat",
    "faccessat2", // newer glibc probes this before falling back to faccessat
    "readlink",
    "readlinkat",
    "fcntl",
    "getdents64",
    "getcwd",
    "chdir",
    "ioctl",
    "pipe",
    "pipe2",
    "mknod",
    "mknodat",
    // === Process creation / exec / termination ===
    "clone",
    "clone3",
    "fork",
    "vfork",
    "execve",
    "execveat",
    "wait4",
    "exit",
    "exit_group",
    "kill",
    // === Identity and time queries ===
    "getpid",
    "getppid",
    "gettid",
    "getuid",
    "geteuid",
    "getgid",
    "getegid",
    "uname",
    "clock_gettime",
    "gettimeofday",
    "nanosleep",
    // === Signals ===
    "rt_sigaction",
    "rt_sigprocmask",
    "rt_sigreturn",
    "sigaltstack",
    // === Threading ===
    "futex",
    // === I/O multiplexing ===
    "poll",
    "ppoll",
    "epoll_create1",
    "epoll_wait",
    "epoll_ctl",
];

/// Additional syscalls allowed under the `restricted` profile only.
pub const NETWORK_SYSCALLS: &[&str] = &[
    "socket",
    "connect",
    "bind",
    "listen",
    "accept",
    "accept4",
    "sendto",
    "recvfrom",
    "sendmsg",
    "recvmsg",
    "socketpair",
    "dup",
    "dup2",
    "dup3",
];

/// Syscalls the `locked` profile denies explicitly. They are struck from
/// the rule map after assembly, so the default deny keeps covering them
/// even if a future edit adds one of these names to the common table.
pub const DENIED_SYSCALLS: &[&str] = &["mount", "umount2", "ptrace", "reboot", "kexec_load"];

// ============================================================================
// Syscall-name resolver
// ============================================================================

/// Map a syscall name to its number on the running architecture.
///
/// Returns `None` for names the architecture does not provide (for
/// example `fstatat64` on x86_64, where the same entry is spelled
/// `newfstatat`); the filter builder treats that as "omit the rule", not
/// as an error.
pub fn resolve(name: &str) -> Option<c_long> {
    let portable = match name {
        // Memory management
        "brk" => libc::SYS_brk,
        "mmap" => libc::SYS_mmap,
        "munmap" => libc::SYS_munmap,
        "mprotect" => libc::SYS_mprotect,

        // File operations
        "read" => libc::SYS_read,
        "write" => libc::SYS_write,
        "pread64" => libc::SYS_pread64,
        "pwrite64" => libc::SYS_pwrite64,
        "readv" => libc::SYS_readv,
        "writev" => libc::SYS_writev,
        "openat" => libc::SYS_openat,
        "close" => libc::SYS_close,
        "lseek" => libc::SYS_lseek,
        "fstat" => libc::SYS_fstat,
        "newfstatat" => libc::SYS_newfstatat,
        "statx" => libc::SYS_statx,
        "faccessat" => libc::SYS_faccessat,
        "faccessat2" => libc::SYS_faccessat2,
        "readlinkat" => libc::SYS_readlinkat,
        "fcntl" => libc::SYS_fcntl,
        "getdents64" => libc::SYS_getdents64,
        "getcwd" => libc::SYS_getcwd,
        "chdir" => libc::SYS_chdir,
        "ioctl" => libc::SYS_ioctl,
        "pipe2" => libc::SYS_pipe2,
        "mknodat" => libc::SYS_mknodat,
        "dup" => libc::SYS_dup,
        "dup3" => libc::SYS_dup3,

        // Process lifecycle
        "clone" => libc::SYS_clone,
        "clone3" => libc::SYS_clone3,
        "execve" => libc::SYS_execve,
        "execveat" => libc::SYS_execveat,
        "wait4" => libc::SYS_wait4,
        "exit" => libc::SYS_exit,
        "exit_group" => libc::SYS_exit_group,
        "kill" => libc::SYS_kill,

        // Threading / tid handling
        "futex" => libc::SYS_futex,
        "set_tid_address" => libc::SYS_set_tid_address,
        "set_robust_list" => libc::SYS_set_robust_list,
        "rseq" => libc::SYS_rseq,

        // Signals
        "rt_sigaction" => libc::SYS_rt_sigaction,
        "rt_sigprocmask" => libc::SYS_rt_sigprocmask,
        "rt_sigreturn" => libc::SYS_rt_sigreturn,
        "sigaltstack" => libc::SYS_sigaltstack,

        // Identity and time
        "getpid" => libc::SYS_getpid,
        "getppid" => libc::SYS_getppid,
        "gettid" => libc::SYS_gettid,
        "getuid" => libc::SYS_getuid,
        "geteuid" => libc::SYS_geteuid,
        "getgid" => libc::SYS_getgid,
        "getegid" => libc::SYS_getegid,
        "uname" => libc::SYS_uname,
        "clock_gettime" => libc::SYS_clock_gettime,
        "gettimeofday" => libc::SYS_gettimeofday,
        "nanosleep" => libc::SYS_nanosleep,

        // I/O multiplexing
        "ppoll" => libc::SYS_ppoll,
        "epoll_create1" => libc::SYS_epoll_create1,
        "epoll_ctl" => libc::SYS_epoll_ctl,

        // Misc
        "prctl" => libc::SYS_prctl,
        "prlimit64" => libc::SYS_prlimit64,
        "getrandom" => libc::SYS_getrandom,

        // Networking
        "socket" => libc::SYS_socket,
        "socketpair" => libc::SYS_socketpair,
        "connect" => libc::SYS_connect,
        "bind" => libc::SYS_bind,
        "listen" => libc::SYS_listen,
        "accept" => libc::SYS_accept,
        "accept4" => libc::SYS_accept4,
        "sendto" => libc::SYS_sendto,
        "recvfrom" => libc::SYS_recvfrom,
        "sendmsg" => libc::SYS_sendmsg,
        "recvmsg" => libc::SYS_recvmsg,

        // Privileged operations (resolved so the deny-list can strike them)
        "mount" => libc::SYS_mount,
        "umount2" => libc::SYS_umount2,
        "ptrace" => libc::SYS_ptrace,
        "reboot" => libc::SYS_reboot,
        "kexec_load" => libc::SYS_kexec_load,

        other => return resolve_arch(other),
    };
    Some(portable)
}

/// Legacy syscalls that only exist on x86_64.
#[cfg(target_arch = "x86_64")]
fn resolve_arch(name: &str) -> Option<c_long> {
    Some(match name {
        "open" => libc::SYS_open,
        "stat" => libc::SYS_stat,
        "lstat" => libc::SYS_lstat,
        "access" => libc::SYS_access,
        "readlink" => libc::SYS_readlink,
        "poll" => libc::SYS_poll,
        "epoll_wait" => libc::SYS_epoll_wait,
        "pipe" => libc::SYS_pipe,
        "mknod" => libc::SYS_mknod,
        "fork" => libc::SYS_fork,
        "vfork" => libc::SYS_vfork,
        "dup2" => libc::SYS_dup2,
        "arch_prctl" => libc::SYS_arch_prctl,
        _ => return None,
    })
}

#[cfg(not(target_arch = "x86_64"))]
fn resolve_arch(_name: &str) -> Option<c_long> {
    None
}

/// Get the target architecture for seccomp filter compilation.
fn target_arch() -> seccompiler::TargetArch {
    #[cfg(target_arch = "x86_64")]
    {
        seccompiler::TargetArch::x86_64
    }
    #[cfg(target_arch = "aarch64")]
    {
        seccompiler::TargetArch::aarch64
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        compile_error!("Unsupported architecture for seccomp")
    }
}

// ============================================================================
// Filter builder
// ============================================================================

/// Assemble the rule map for a profile. `None` means "install no filter".
fn rule_map(profile: Profile) -> Option<BTreeMap<i64, Vec<SeccompRule>>> {
    let names: Vec<&str> = match profile {
        Profile::Open => return None,
        Profile::Restricted => COMMON_SYSCALLS
            .iter()
            .chain(NETWORK_SYSCALLS)
            .copied()
            .collect(),
        Profile::Locked => COMMON_SYSCALLS.to_vec(),
    };

    // Empty rule vector = allow the syscall unconditionally.
    let mut rules: BTreeMap<i64, Vec<SeccompRule>> = BTreeMap::new();
    let mut omitted = Vec::new();
    for name in names {
        match resolve(name) {
            Some(nr) => {
                rules.insert(nr as i64, vec![]);
            }
            None => omitted.push(name),
        }
    }
    if !omitted.is_empty() {
        tracing::debug!(
            syscalls = ?omitted,
            "unresolvable syscalls omitted from allow-list; they stay covered by the default action"
        );
    }

    if profile == Profile::Locked {
        for name in DENIED_SYSCALLS {
            if let Some(nr) = resolve(name)
                && rules.remove(&(nr as i64)).is_some()
            {
                tracing::warn!(
                    syscall = name,
                    "denied syscall found on the allow-list; struck out"
                );
            }
        }
    }

    Some(rules)
}

/// Compile the profile's filter to BPF bytecode. `Ok(None)` for `open`.
fn build_program(profile: Profile) -> SandResult<Option<BpfProgram>> {
    let Some(rules) = rule_map(profile) else {
        return Ok(None);
    };

    tracing::debug!(
        profile = %profile,
        allowed = rules.len(),
        "building seccomp filter"
    );

    let filter = SeccompFilter::new(
        rules,
        SeccompAction::Errno(libc::EPERM as u32), // default: fail with EPERM
        SeccompAction::Allow,                     // matched syscalls pass through
        target_arch(),
    )
    .map_err(|e| SandError::Seccomp(format!("failed to create seccomp filter: {}", e)))?;

    let program: BpfProgram = filter
        .try_into()
        .map_err(|e: seccompiler::BackendError| {
            SandError::Seccomp(format!("failed to compile seccomp filter to BPF: {}", e))
        })?;

    Ok(Some(program))
}

/// Compile and install the filter for `profile` on the current thread.
///
/// Applies to every descendant of this thread. For the `open` profile
/// this is a successful no-op and no filter is attached. Once this
/// returns `Ok` for a filtering profile the restriction is permanent.
pub fn build_and_load(profile: Profile) -> SandResult<()> {
    let Some(program) = build_program(profile)? else {
        tracing::info!(profile = %profile, "no syscall restrictions requested");
        return Ok(());
    };

    tracing::debug!(
        profile = %profile,
        instructions = program.len(),
        "loading seccomp filter"
    );

    install(&program)
    // `program` is dropped on return; a loaded filter cannot be revoked.
}

/// Install a compiled program via `seccomp(2)` with denied-syscall audit
/// logging, falling back to a plain load on kernels without the flag.
fn install(program: &BpfProgram) -> SandResult<()> {
    // An unprivileged process may only install a filter after giving up
    // the ability to regain privileges across exec.
    if unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) } != 0 {
        return Err(SandError::Seccomp(format!(
            "prctl(PR_SET_NO_NEW_PRIVS): {}",
            io::Error::last_os_error()
        )));
    }

    let fprog = libc::sock_fprog {
        len: program.len() as u16,
        filter: program.as_ptr() as *mut libc::sock_filter,
    };

    // SECCOMP_FILTER_FLAG_LOG surfaces denied syscalls in the kernel audit
    // log so operators can diagnose blocked calls without loosening policy.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_seccomp,
            libc::SECCOMP_SET_MODE_FILTER,
            libc::SECCOMP_FILTER_FLAG_LOG,
            &fprog as *const libc::sock_fprog,
        )
    };
    if rc == 0 {
        return Ok(());
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EINVAL) {
        // Kernel predates SECCOMP_FILTER_FLAG_LOG.
        tracing::debug!("kernel rejected SECCOMP_FILTER_FLAG_LOG; loading without audit logging");
        return seccompiler::apply_filter(program)
            .map_err(|e| SandError::Seccomp(format!("failed to apply seccomp filter: {}", e)));
    }

    Err(SandError::Seccomp(format!(
        "seccomp(SECCOMP_SET_MODE_FILTER): {}",
        err
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn resolves_common_syscalls() {
        for name in ["read", "write", "mmap", "execve", "exit_group"] {
            assert!(resolve(name).is_some(), "{} should resolve", name);
        }
    }

    #[test]
    fn unknown_names_resolve_to_none() {
        assert!(resolve("nonexistent_syscall").is_none());
        assert!(resolve("").is_none());
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn arch_aliasing_picks_the_native_spelling() {
        // The 32-bit spelling of the statx family does not exist here;
        // the 64-bit one does.
        assert!(resolve("fstatat64").is_none());
        assert!(resolve("newfstatat").is_some());
        assert!(resolve("open").is_some());
    }

    #[test]
    fn open_profile_has_no_rule_map() {
        assert!(rule_map(Profile::Open).is_none());
        assert!(build_program(Profile::Open).unwrap().is_none());
    }

    #[test]
    fn restricted_allows_networking_and_locked_does_not() {
        let socket = resolve("socket").unwrap() as i64;
        let restricted = rule_map(Profile::Restricted).unwrap();
        let locked = rule_map(Profile::Locked).unwrap();
        assert!(restricted.contains_key(&socket));
        assert!(!locked.contains_key(&socket));
    }

    #[test]
    fn both_filtering_profiles_allow_startup_syscalls() {
        for profile in [Profile::Restricted, Profile::Locked] {
            let rules = rule_map(profile).unwrap();
            for name in ["read", "write", "execve", "brk", "exit_group"] {
                let nr = resolve(name).unwrap() as i64;
                assert!(rules.contains_key(&nr), "{:?} must allow {}", profile, name);
            }
        }
    }

    #[test]
    fn denied_syscalls_never_appear_in_locked_rules() {
        let rules = rule_map(Profile::Locked).unwrap();
        for name in DENIED_SYSCALLS {
            if let Some(nr) = resolve(name) {
                assert!(
                    !rules.contains_key(&(nr as i64)),
                    "locked profile must not allow {}",
                    name
                );
            }
        }
    }

    #[test]
    fn allow_and_deny_tables_do_not_overlap() {
        let common: HashSet<&str> = COMMON_SYSCALLS.iter().copied().collect();
        let network: HashSet<&str> = NETWORK_SYSCALLS.iter().copied().collect();
        let denied: HashSet<&str> = DENIED_SYSCALLS.iter().copied().collect();
        assert!(common.intersection(&denied).next().is_none());
        assert!(network.intersection(&denied).next().is_none());
    }

    #[test]
    fn filtering_profiles_compile_to_bpf() {
        for profile in [Profile::Restricted, Profile::Locked] {
            let program = build_program(profile).unwrap().unwrap();
            assert!(!program.is_empty(), "{:?} program should not be empty", profile);
        }
    }

    #[test]
    fn most_common_syscalls_resolve_on_this_architecture() {
        let resolved = COMMON_SYSCALLS
            .iter()
            .filter(|name| resolve(name).is_some())
            .count();
        // A handful of legacy spellings may be missing per-arch; the bulk
        // of the table must resolve or the sandbox would be unusable.
        assert!(
            resolved * 10 >= COMMON_SYSCALLS.len() * 8,
            "only {}/{} syscalls resolved",
            resolved,
            COMMON_SYSCALLS.len()
        );
    }
}
