use super::probe::connect_with_retries;
use crate::error::{MeasureError, Result};
use crate::lease::LeaderLease;
use crate::metrics::DogstatsdClient;
use crate::timing::{jittered, Timing};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Prefix of the variables the daemon reads its configuration from.
const DAEMON_ENV_PREFIX: &str = "DD_";

/// How to launch the daemon for one fingerprint.
#[derive(Debug, Clone)]
pub struct DaemonSpec {
    pub binary: PathBuf,
    pub socket: PathBuf,
    pub api_key: String,
    /// Extra daemon environment; applied last so it can override the defaults
    pub config: BTreeMap<String, String>,
    /// Keep the daemon's stdout/stderr and log file
    pub debug: bool,
}

impl DaemonSpec {
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("start");

        // The daemon's configuration is exactly what the fingerprint covers.
        for (key, _) in std::env::vars_os() {
            if key.to_string_lossy().starts_with(DAEMON_ENV_PREFIX) {
                cmd.env_remove(&key);
            }
        }

        cmd.env("DD_DOGSTATSD_SOCKET", &self.socket);
        cmd.env("DD_API_KEY", &self.api_key);
        cmd.stdin(Stdio::null());

        if self.debug {
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
        } else {
            cmd.env("DD_LOG_FILE", "/dev/null");
            cmd.stdout(Stdio::null());
            cmd.stderr(Stdio::null());
        }

        for (key, value) in &self.config {
            cmd.env(key, value);
        }

        // Outlive job-control signals sent to the leader's process group.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

/// Starts (when leading) and connects to the fingerprint's daemon.
pub struct Supervisor {
    spec: DaemonSpec,
    constant_tags: Vec<String>,
    timing: Timing,
}

impl Supervisor {
    pub fn new(spec: DaemonSpec, constant_tags: Vec<String>, timing: Timing) -> Self {
        Self {
            spec,
            constant_tags,
            timing,
        }
    }

    pub fn spec(&self) -> &DaemonSpec {
        &self.spec
    }

    /// Reuse a live daemon if one answers, otherwise start one (leader) or
    /// wait for one (follower), then probe again.
    pub async fn start_and_connect(&self, lease: &mut LeaderLease) -> Result<DogstatsdClient> {
        if self.spec.socket.exists() {
            if let Some(client) = self.probe().await {
                return Ok(client);
            }
        }

        if lease.is_leader() {
            self.restart_daemon(lease).await?;
        } else {
            debug!("Waiting for the leader to start the daemon");
            tokio::time::sleep(jittered(self.timing.wait_to_start, self.timing.jitter)).await;
        }

        self.probe()
            .await
            .ok_or_else(|| MeasureError::DaemonUnreachable {
                socket: self.spec.socket.clone(),
            })
    }

    async fn probe(&self) -> Option<DogstatsdClient> {
        connect_with_retries(
            &self.spec.socket,
            &self.constant_tags,
            self.timing.connect_attempts,
            self.timing.connect_spacing,
            self.timing.jitter,
        )
        .await
    }

    async fn restart_daemon(&self, lease: &mut LeaderLease) -> Result<()> {
        if let Some(pid) = lease.previous_pid() {
            // Holding the lease means no live process depends on this daemon.
            if pid != std::process::id() {
                info!(pid, "Killing previous Dogstatsd");
                if !kill_process(pid) {
                    debug!(pid, "Previous Dogstatsd already gone");
                }
                tokio::time::sleep(jittered(self.timing.kill_grace, self.timing.jitter)).await;
            }
        }

        let pid = self.launch().await?;
        lease.record_pid(pid)?;
        Ok(())
    }

    /// Spawn the daemon and make sure it survives the settle period.
    async fn launch(&self) -> Result<u32> {
        info!(binary = %self.spec.binary.display(), "Starting Dogstatsd");
        let mut child = self.spec.command().spawn()?;
        let pid = child.id().ok_or_else(|| MeasureError::DaemonExited {
            binary: self.spec.binary.clone(),
            code: None,
        })?;
        debug!(pid, "Dogstatsd spawned");

        tokio::time::sleep(self.timing.settle).await;

        match child.try_wait()? {
            None => {
                debug!(pid, "Dogstatsd seems to have started ok - still running");
                Ok(pid)
            }
            Some(status) => {
                warn!(pid, code = ?status.code(), "Dogstatsd did not start properly");
                Err(MeasureError::DaemonExited {
                    binary: self.spec.binary.clone(),
                    code: status.code(),
                })
            }
        }
    }
}

#[cfg(unix)]
fn kill_process(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: kill(2) with a positive pid only signals that process.
    unsafe { libc::kill(pid, libc::SIGKILL) == 0 }
}

#[cfg(not(unix))]
fn kill_process(_pid: u32) -> bool {
    false
}
