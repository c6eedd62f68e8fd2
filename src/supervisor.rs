//! Keeps a distributed training run alive. Multi-GPU VITS training falls over for reasons that
//! are transient more often than not (NCCL hiccups, a dataloader OOM, someone else's job getting
//! the node rebooted), so instead of babysitting it we wrap the `torchrun` launch in a
//! supervise-and-relaunch loop: wait for the child, and on any non-zero exit clean up whatever
//! it left behind, pause, and launch again. A clean exit is the only way out of the loop unless
//! an operator caps the retries.
//!
//! Cleanup kills the process group of the child we actually spawned. An earlier incarnation of
//! this tooling grepped the process table for the config path and killed whatever matched, which
//! worked until an editor holding the config file open matched too.
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default port handed to `--master_port`, chosen once to dodge our cluster's common ranges.
pub const DEFAULT_MASTER_PORT: u16 = 10902;

/// Default pause between a crash and the relaunch, long enough for the GPUs to actually free
/// their memory.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);

/// What a single launch-and-wait attempt resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Exit code 0, the only terminal success.
    Success,
    /// Non-zero exit, launch failure, or an unexpected wait error. The loop cleans up and goes
    /// round again.
    CleanupAndRetry,
}

/// Supervises a `torchrun` training job for one config.
pub struct Supervisor {
    launcher: PathBuf,
    config: PathBuf,
    num_gpus: u32,
    master_port: u16,
    retry_delay: Duration,
    /// `None` retries forever, which is the behaviour operators have come to rely on for
    /// overnight runs. A cap exists for when the crash cause might be permanent.
    max_retries: Option<u32>,
}

impl Supervisor {
    pub fn new(config: impl Into<PathBuf>, num_gpus: u32) -> Self {
        Self {
            launcher: PathBuf::from("torchrun"),
            config: config.into(),
            num_gpus,
            master_port: DEFAULT_MASTER_PORT,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retries: None,
        }
    }

    /// Replaces the `torchrun` binary, mainly so tests can point at a stub script.
    pub fn with_launcher(mut self, launcher: impl Into<PathBuf>) -> Self {
        self.launcher = launcher.into();
        self
    }

    pub fn with_master_port(mut self, port: u16) -> Self {
        self.master_port = port;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_max_retries(mut self, max: Option<u32>) -> Self {
        self.max_retries = max;
        self
    }

    /// The training run is identified by the directory the config sits in, e.g.
    /// `configs/my_model/config.json` trains `my_model`.
    pub fn model_name(&self) -> String {
        self.config
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| {
                warn!("Could not derive a model name from the config path, using default_model");
                "default_model".to_string()
            })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.launcher);
        cmd.arg(format!("--nproc_per_node={}", self.num_gpus))
            .arg(format!("--master_port={}", self.master_port))
            .arg("train.py")
            .arg("--c")
            .arg(&self.config)
            .arg("--model")
            .arg(self.model_name());
        // Give the job its own process group so cleanup can take out the whole torchrun tree,
        // workers included, via the one pid we hold.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }

    /// Launches the job and blocks until it exits. Any failure mode maps to `CleanupAndRetry`,
    /// a clean exit to `Success`.
    fn attempt(&self) -> RunState {
        let mut cmd = self.command();
        info!("Starting training: {:?}", cmd);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to launch training: {}", e);
                return RunState::CleanupAndRetry;
            }
        };

        match child.wait() {
            Ok(status) if status.success() => RunState::Success,
            Ok(status) => {
                error!("Training crashed ({}), will resume", describe_exit(&status));
                cleanup(&mut child);
                RunState::CleanupAndRetry
            }
            Err(e) => {
                error!("Unexpected error waiting on training: {}", e);
                cleanup(&mut child);
                RunState::CleanupAndRetry
            }
        }
    }

    /// Runs the supervision loop until the job exits cleanly, returning how many retries were
    /// needed. Errors only when a retry cap is configured and exhausted.
    pub fn run(&self) -> anyhow::Result<u32> {
        let mut retries = 0;
        loop {
            if self.attempt() == RunState::Success {
                info!("Training finished successfully after {} retries", retries);
                return Ok(retries);
            }

            if let Some(max) = self.max_retries {
                if retries >= max {
                    anyhow::bail!("training failed after {} retries, giving up", retries);
                }
            }
            retries += 1;
            info!(
                "Waiting {:?} before restart (retry {})",
                self.retry_delay, retries
            );
            thread::sleep(self.retry_delay);
        }
    }
}

fn describe_exit(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "killed by signal".to_string(),
    }
}

/// Force-kills whatever is left of the child's process group. "Already gone" is the expected
/// case, since we only get here after the launcher itself exited.
fn cleanup(child: &mut Child) {
    #[cfg(unix)]
    {
        let pgid = child.id() as i32;
        // SIGKILL the group; ESRCH just means everything already died with the launcher.
        let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
        if rc == 0 {
            warn!("Killed leftover processes in group {}", pgid);
        }
    }
    // Reap if anything was still pending, ignoring "no child" errors.
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    /// Writes an executable shell script and returns its path along with the tempdir keeping it
    /// alive.
    fn script(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launcher.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        (dir, path)
    }

    fn supervisor(launcher: &Path) -> Supervisor {
        Supervisor::new("configs/test_model/config.json", 1)
            .with_launcher(launcher)
            .with_retry_delay(Duration::ZERO)
    }

    #[test]
    fn model_name_from_config_parent() {
        let sup = Supervisor::new("configs/my_model/config.json", 4);
        assert_eq!(sup.model_name(), "my_model");

        let sup = Supervisor::new("config.json", 4);
        assert_eq!(sup.model_name(), "default_model");
    }

    #[test]
    fn clean_exit_is_success() {
        let (_dir, launcher) = script("exit 0");
        let sup = supervisor(&launcher);
        assert_eq!(sup.attempt(), RunState::Success);
        assert_eq!(sup.run().unwrap(), 0);
    }

    #[test]
    fn crash_goes_through_cleanup_and_retry() {
        let (_dir, launcher) = script("exit 1");
        let sup = supervisor(&launcher);
        assert_eq!(sup.attempt(), RunState::CleanupAndRetry);
    }

    #[test]
    fn recovers_after_transient_crash() {
        // Fails on the first run, succeeds once the marker file exists
        let (dir, launcher) = script("test -f \"$0.ran\" && exit 0; touch \"$0.ran\"; exit 1");
        let sup = supervisor(&launcher);
        let retries = sup.run().unwrap();
        assert_eq!(retries, 1);
        drop(dir);
    }

    #[test]
    fn retry_cap_is_honoured() {
        let (_dir, launcher) = script("exit 2");
        let sup = supervisor(&launcher).with_max_retries(Some(2));
        assert!(sup.run().is_err());
    }

    #[test]
    fn launch_failure_retries_rather_than_panics() {
        let sup = Supervisor::new("configs/test_model/config.json", 1)
            .with_launcher("/definitely/not/torchrun")
            .with_retry_delay(Duration::ZERO)
            .with_max_retries(Some(1));
        assert!(sup.run().is_err());
    }
}
