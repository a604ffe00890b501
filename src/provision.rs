use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::error::{MeasureError, Result};
use crate::fingerprint::BINARY_NAME;
use crate::timing::{jittered, Timing};

/// (os, arch) as reported by `std::env::consts` → file name under the download base.
const BINARIES: &[((&str, &str), &str)] = &[
    (("macos", "aarch64"), "dogstatsd-darwin-arm64"),
    (("linux", "x86_64"), "dogstatsd-linux-amd64"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub os: String,
    pub arch: String,
}

impl Target {
    pub fn new(os: &str, arch: &str) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    pub fn current() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Download file name, if a binary is published for this target.
    pub fn asset_name(&self) -> Option<&'static str> {
        BINARIES
            .iter()
            .find(|((os, arch), _)| *os == self.os && *arch == self.arch)
            .map(|(_, name)| *name)
    }
}

/// Keeps a fresh, executable daemon binary at a well-known path.
pub struct BinaryProvisioner {
    install_path: PathBuf,
    target: Target,
    download_base: String,
    timing: Timing,
}

impl BinaryProvisioner {
    pub fn new(install_path: &Path, target: Target, download_base: &str, timing: Timing) -> Self {
        Self {
            install_path: install_path.to_path_buf(),
            target,
            download_base: download_base.to_string(),
            timing,
        }
    }

    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    /// Make sure a usable binary exists.
    ///
    /// A fresh binary needs no network. Otherwise the leader downloads one while
    /// a follower waits a while and assumes the leader got there.
    pub async fn ensure_binary(&self, is_leader: bool) -> Result<()> {
        if self.is_fresh() {
            return Ok(());
        }

        if !is_leader {
            debug!("Waiting for the leader to download a Dogstatsd binary");
            tokio::time::sleep(jittered(self.timing.wait_to_download, self.timing.jitter)).await;
            return Ok(());
        }

        let url = self.download_url()?;
        self.download(&url).await
    }

    /// Whether the installed binary exists and is younger than the freshness threshold.
    pub fn is_fresh(&self) -> bool {
        let modified = match fs::metadata(&self.install_path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => {
                debug!(path = %self.install_path.display(), "Dogstatsd binary not found");
                return false;
            }
        };

        let fresh = is_fresh_at(modified, SystemTime::now(), self.timing.max_binary_age);
        debug!(
            path = %self.install_path.display(),
            fresh,
            "Dogstatsd binary found"
        );
        fresh
    }

    pub fn download_url(&self) -> Result<String> {
        debug!(os = %self.target.os, arch = %self.target.arch, "System profile");
        let asset = self
            .target
            .asset_name()
            .ok_or_else(|| MeasureError::UnsupportedPlatform {
                os: self.target.os.clone(),
                arch: self.target.arch.clone(),
            })?;
        Ok(format!("{}{}", self.download_base, asset))
    }

    async fn download(&self, url: &str) -> Result<()> {
        info!(url, "Downloading Dogstatsd");
        let client = reqwest::Client::builder()
            .user_agent("measure-provisioner")
            .build()?;

        let attempts = self.timing.download_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match self.download_once(&client, url).await {
                Ok(()) => {
                    info!(path = %self.install_path.display(), "Dogstatsd is now available");
                    return Ok(());
                }
                Err(e) if e.is_permanent() => return Err(e),
                Err(e) => {
                    debug!(attempt = attempt + 1, error = %e, "Downloading Dogstatsd failed");
                    last_error = e.to_string();
                    if attempt + 1 < attempts {
                        let backoff = self.timing.download_backoff * 2u32.saturating_pow(attempt);
                        tokio::time::sleep(jittered(backoff, self.timing.jitter)).await;
                    }
                }
            }
        }

        warn!(attempts, error = %last_error, "Giving up on Dogstatsd download");
        Err(MeasureError::DownloadFailed {
            attempts,
            reason: last_error,
        })
    }

    async fn download_once(&self, client: &reqwest::Client, url: &str) -> Result<()> {
        let response = client.get(url).send().await?;
        let status = response.status();

        if status.is_client_error() {
            return Err(MeasureError::DownloadRejected {
                status: status.as_u16(),
            });
        }
        let response = response.error_for_status()?;
        let bytes = response.bytes().await?;

        self.install(&bytes)
    }

    /// Write next to the install path, mark executable, then rename into place
    /// so concurrent readers never see a partial file.
    fn install(&self, bytes: &[u8]) -> Result<()> {
        let dir = self
            .install_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = tempfile::Builder::new()
            .prefix(BINARY_NAME)
            .tempfile_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o755))?;
        }

        tmp.persist(&self.install_path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Fresh means strictly younger than `max_age`. A timestamp in the future counts as fresh.
pub fn is_fresh_at(modified: SystemTime, now: SystemTime, max_age: Duration) -> bool {
    match now.duration_since(modified) {
        Ok(age) => age < max_age,
        Err(_) => true,
    }
}
