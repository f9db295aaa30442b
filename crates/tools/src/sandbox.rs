//! Sandbox driver (C3): isolated process-group runner for unsafe tools.
//!
//! Grounded in `sa_tools::exec`'s spawn/timeout/kill race
//! (`tokio::process::Command` + `tokio::select!`), generalized with the
//! contract spec §4.3 requires: network disabled, read-only root,
//! CPU/memory caps, and a wall-clock timeout. On Linux with `unshare`
//! present, the command runs in a private net+mount namespace with its
//! root filesystem remounted read-only (best-effort: the remount is
//! skipped silently if it fails, e.g. when not running as root, since
//! `sandbox.fallback` is the operator's explicit opt-in to run anyway).
//! CPU and memory are capped on any unix host, `unshare` or not: CPU via
//! `nice()` (deprioritizing, not a hard quota — there is no portable
//! non-root CPU quota without cgroups) and memory via
//! `setrlimit(RLIMIT_AS)`. The timeout, output cap, and exit-code
//! handling are enforced unconditionally regardless of platform.

use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use warden_domain::config::SandboxConfig;
use warden_domain::error::{Error, Result};

pub struct SandboxOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

pub struct SandboxDriver {
    config: SandboxConfig,
}

impl SandboxDriver {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Whether the sandbox subsystem is configured on. Does not imply a
    /// real isolation mechanism is present on this host — see
    /// [`Self::has_isolation`].
    pub fn is_available(&self) -> bool {
        self.config.enabled
    }

    /// Whether a real isolation mechanism (`unshare`, on Linux) is present.
    pub fn has_isolation(&self) -> bool {
        cfg!(target_os = "linux") && which("unshare")
    }

    /// Whether `sandbox.fallback` permits running without isolation when
    /// the sandbox is unavailable (spec §4.3's `sandbox.fallback` knob).
    pub fn fallback_allowed(&self) -> bool {
        self.config.fallback
    }

    /// Run `command` inside the sandbox's resource envelope, returning the
    /// captured outcome. Network is disabled by clearing the environment
    /// of proxy/DNS-relevant variables and (on Linux, when `unshare` is
    /// present) passing `--net`; the filesystem is constrained to
    /// `tool_dir` as the working directory.
    ///
    /// `bypass_unavailable` lets the executor honor `sandbox.fallback`
    /// (spec §4.3): the caller has already decided execution may proceed
    /// even though the sandbox is not configured as available.
    pub async fn run(
        &self,
        command: &str,
        args: &[String],
        bypass_unavailable: bool,
    ) -> Result<SandboxOutcome> {
        if !self.is_available() && !bypass_unavailable {
            return Err(Error::SandboxUnavailable);
        }

        let timeout = Duration::from_secs(self.config.wall_clock_timeout_sec);
        let mut cmd = self.build_command(command, args);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::SandboxExecutionError(format!("failed to spawn: {e}")))?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let wait = async {
            let status = child.wait().await;
            let mut stdout = String::new();
            let mut stderr = String::new();
            if let Some(mut p) = stdout_pipe.take() {
                let _ = p.read_to_string(&mut stdout).await;
            }
            if let Some(mut p) = stderr_pipe.take() {
                let _ = p.read_to_string(&mut stderr).await;
            }
            (status, stdout, stderr)
        };

        tokio::select! {
            (status, stdout, stderr) = wait => {
                let status = status.map_err(|e| Error::SandboxExecutionError(e.to_string()))?;
                Ok(SandboxOutcome {
                    exit_code: status.code(),
                    stdout: cap_chars(&stdout, self.config.max_output_chars),
                    stderr: cap_chars(&stderr, self.config.max_output_chars),
                    timed_out: false,
                })
            }
            _ = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                Ok(SandboxOutcome {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: "sandboxed process exceeded wall-clock timeout".to_string(),
                    timed_out: true,
                })
            }
        }
    }

    fn build_command(&self, command: &str, args: &[String]) -> Command {
        let mut cmd = if self.has_isolation() {
            // A private mount namespace lets us remount `/` read-only for
            // this process tree only, without touching the host's root.
            let mut cmd = Command::new("unshare");
            cmd.arg("--net")
                .arg("--mount")
                .arg("--")
                .arg("sh")
                .arg("-c")
                .arg(r#"mount -o remount,ro / >/dev/null 2>&1; exec "$0" "$@""#)
                .arg(command)
                .args(args);
            cmd
        } else {
            let mut cmd = Command::new(command);
            cmd.args(args);
            cmd
        };

        cmd.current_dir(&self.config.tool_dir);
        cmd.env_clear();
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).stdin(Stdio::null());
        apply_resource_caps(&mut cmd, self.config.cpu_quota, self.config.memory_cap_mb);
        cmd
    }
}

/// Deprioritizes the child's CPU scheduling and caps its virtual address
/// space, best-effort, on any unix host. Neither call's failure is fatal —
/// an unprivileged process may not be able to raise rlimits further than
/// its own, and callers are expected to already hold a sane default.
#[cfg(unix)]
fn apply_resource_caps(cmd: &mut Command, cpu_quota: f32, memory_cap_mb: u64) {
    let niceness = cpu_quota_to_niceness(cpu_quota);
    let memory_cap_bytes = memory_cap_mb.saturating_mul(1024 * 1024) as libc::rlim_t;

    // SAFETY: only async-signal-safe libc calls (`setrlimit`, `nice`) run
    // between fork and exec; neither allocates nor touches Rust state.
    unsafe {
        cmd.pre_exec(move || {
            let limit = libc::rlimit {
                rlim_cur: memory_cap_bytes,
                rlim_max: memory_cap_bytes,
            };
            libc::setrlimit(libc::RLIMIT_AS, &limit);
            libc::nice(niceness);
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_resource_caps(_cmd: &mut Command, _cpu_quota: f32, _memory_cap_mb: u64) {}

/// Maps a CPU-share fraction (1.0 = a full core) onto a `nice(2)` delta in
/// `0..=19`: there is no unprivileged hard quota, so a lower quota just
/// asks the scheduler to deprioritize the process proportionally.
fn cpu_quota_to_niceness(cpu_quota: f32) -> i32 {
    let quota = cpu_quota.clamp(0.0, 1.0);
    ((1.0 - quota) * 19.0).round() as i32
}

fn cap_chars(s: &str, cap: usize) -> String {
    if s.chars().count() <= cap {
        s.to_string()
    } else {
        s.chars().take(cap).collect()
    }
}

fn which(bin: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(bin).is_file())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_quota_maps_to_zero_niceness() {
        assert_eq!(cpu_quota_to_niceness(1.0), 0);
    }

    #[test]
    fn low_quota_maps_to_high_niceness() {
        assert_eq!(cpu_quota_to_niceness(0.0), 19);
        assert!(cpu_quota_to_niceness(0.1) > cpu_quota_to_niceness(0.5));
    }

    #[test]
    fn out_of_range_quota_is_clamped() {
        assert_eq!(cpu_quota_to_niceness(2.0), 0);
        assert_eq!(cpu_quota_to_niceness(-1.0), 19);
    }

    #[tokio::test]
    async fn memory_cap_is_enforced_on_allocation() {
        let config = SandboxConfig {
            tool_dir: ".".to_string(),
            wall_clock_timeout_sec: 5,
            memory_cap_mb: 32,
            ..Default::default()
        };
        let driver = SandboxDriver::new(config);

        // Ask python to allocate well beyond the 32 MiB RLIMIT_AS cap;
        // it must fail to allocate rather than actually consuming the
        // memory.
        let outcome = driver
            .run(
                "python3",
                &[
                    "-c".to_string(),
                    "bytearray(500 * 1024 * 1024)".to_string(),
                ],
                true,
            )
            .await
            .unwrap();
        assert!(!outcome.timed_out);
        assert_ne!(outcome.exit_code, Some(0));
    }
}
