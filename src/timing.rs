use std::time::Duration;

const DOWNLOAD_ATTEMPTS: u32 = 5;
const CONNECT_ATTEMPTS: u32 = 10;
const DOGSTATSD_MAX_AGE: Duration = Duration::from_secs(24 * 3600);

/// Retry counts and waits used while provisioning and connecting.
///
/// Every loop is attempt-bounded; waits get up to `jitter` of random extra
/// time so concurrently started processes don't retry in lockstep.
#[derive(Debug, Clone)]
pub struct Timing {
    pub download_attempts: u32,
    /// Backoff before retry `n` is `download_backoff * 2^n`
    pub download_backoff: Duration,
    pub connect_attempts: u32,
    pub connect_spacing: Duration,
    /// Follower wait while the leader downloads the binary
    pub wait_to_download: Duration,
    /// Follower wait while the leader starts the daemon
    pub wait_to_start: Duration,
    /// Wait after launching the daemon before checking it is still alive
    pub settle: Duration,
    /// Wait after killing a previous daemon
    pub kill_grace: Duration,
    pub jitter: Duration,
    pub max_binary_age: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            download_attempts: DOWNLOAD_ATTEMPTS,
            download_backoff: Duration::from_secs(1),
            connect_attempts: CONNECT_ATTEMPTS,
            connect_spacing: Duration::from_secs(1),
            wait_to_download: Duration::from_secs(7),
            wait_to_start: Duration::from_secs(3),
            settle: Duration::from_secs(1),
            kill_grace: Duration::from_secs(1),
            jitter: Duration::from_secs(1),
            max_binary_age: DOGSTATSD_MAX_AGE,
        }
    }
}

/// `base` plus a uniformly random share of `jitter`.
pub fn jittered(base: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return base;
    }
    base + jitter.mul_f64(rand::random::<f64>())
}
