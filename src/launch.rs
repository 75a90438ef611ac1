use crate::error::BootstrapError;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

pub const START_ARGS: [&str; 3] = ["server", "start", "-d"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchReadiness {
    /// The readiness check passed before the deadline.
    Ready,
    /// The deadline passed without a failure; readiness is left to the
    /// service provider check.
    Assumed,
}

/// Starts `executable` in the background with null stdio and polls
/// `is_ready` until it passes or `ready_timeout` elapses. A child that exits
/// with a failure status before that is reported as a launch error.
pub fn launch_detached<F>(
    executable: &Path,
    args: &[&str],
    ready_timeout: Duration,
    poll_interval: Duration,
    is_ready: F,
) -> Result<LaunchReadiness, BootstrapError>
where
    F: Fn() -> bool,
{
    let mut cmd = Command::new(executable);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    detach(&mut cmd);
    let mut child = cmd.spawn().map_err(|err| {
        BootstrapError::ProcessLaunch(format!("failed to run {}: {err}", executable.display()))
    })?;
    tracing::info!(
        executable = %executable.display(),
        pid = child.id(),
        "runtime process started"
    );

    let deadline = Instant::now() + ready_timeout;
    let mut exited = false;
    loop {
        if is_ready() {
            return Ok(LaunchReadiness::Ready);
        }
        if !exited {
            if let Some(status) = child.try_wait()? {
                if !status.success() {
                    return Err(BootstrapError::ProcessLaunch(format!(
                        "{} exited before becoming ready ({status})",
                        executable.display()
                    )));
                }
                // `server start -d` forks the daemon and returns.
                exited = true;
            }
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(poll_interval.min(deadline - now));
    }
    tracing::warn!(
        executable = %executable.display(),
        waited_ms = ready_timeout.as_millis() as u64,
        "runtime did not answer within the grace period; continuing"
    );
    Ok(LaunchReadiness::Assumed)
}

#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(windows)]
fn detach(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_cmd: &mut Command) {}
