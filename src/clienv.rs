use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvVar {
    DdApiKey,
    MetaflowRuntimeName,
    AwsBatchJobId,
    MetaflowKubernetesPodId,
    MeasureConfigDir,
    MeasureRuntimeDir,
    MeasureDownloadBase,
    MeasureLog,
    MeasureStatsdSocket,
    User,
    Username,
}

impl EnvVar {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DdApiKey => "DD_API_KEY",
            Self::MetaflowRuntimeName => "METAFLOW_RUNTIME_NAME",
            Self::AwsBatchJobId => "AWS_BATCH_JOB_ID",
            Self::MetaflowKubernetesPodId => "METAFLOW_KUBERNETES_POD_ID",
            Self::MeasureConfigDir => "MEASURE_CONFIG_DIR",
            Self::MeasureRuntimeDir => "MEASURE_RUNTIME_DIR",
            Self::MeasureDownloadBase => "MEASURE_DOWNLOAD_BASE",
            Self::MeasureLog => "MEASURE_LOG",
            Self::MeasureStatsdSocket => "MEASURE_STATSD_SOCKET",
            Self::User => "USER",
            Self::Username => "USERNAME",
        }
    }
}

/// Env vars whose presence marks a container that is torn down right after the task.
pub const DISPOSABLE_CONTAINER_MARKERS: [EnvVar; 2] =
    [EnvVar::AwsBatchJobId, EnvVar::MetaflowKubernetesPodId];

const FALLBACK_CONFIG_DIR: &str = "~/.config";
const MEASURE_SUBDIR: &str = "measure";
const DEFAULT_RUNTIME_NAME: &str = "dev";
pub const DEFAULT_DOWNLOAD_BASE: &str = "https://outerbounds-metaflow-public.s3.us-west-2.amazonaws.com/";

/// Non-empty value of an env var.
pub fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Measure config directory ($MEASURE_CONFIG_DIR or ~/.config/measure)
pub fn config_dir() -> PathBuf {
    let dir = env_opt(EnvVar::MeasureConfigDir.as_str())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from(FALLBACK_CONFIG_DIR))
                .join(MEASURE_SUBDIR)
        });
    tracing::trace!(dir = %dir.display(), "Resolved config directory");
    dir
}

/// Directory holding lease files, sockets and the daemon binary
/// ($MEASURE_RUNTIME_DIR or the system temp dir)
pub fn runtime_dir() -> PathBuf {
    let dir = env_opt(EnvVar::MeasureRuntimeDir.as_str())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    tracing::trace!(dir = %dir.display(), "Resolved runtime directory");
    dir
}

/// Daemon download base URL ($MEASURE_DOWNLOAD_BASE or the public bucket)
pub fn download_base() -> String {
    let url = env_opt(EnvVar::MeasureDownloadBase.as_str())
        .unwrap_or_else(|| DEFAULT_DOWNLOAD_BASE.to_string());
    tracing::trace!(url = %url, "Download base URL");
    url
}

/// Daemon API key from the environment ($DD_API_KEY)
pub fn api_key() -> Option<String> {
    let key = env_opt(EnvVar::DdApiKey.as_str());
    tracing::trace!(present = key.is_some(), "DD_API_KEY env var");
    key
}

/// Pipeline runtime name ($METAFLOW_RUNTIME_NAME or "dev")
pub fn runtime_name() -> String {
    env_opt(EnvVar::MetaflowRuntimeName.as_str())
        .unwrap_or_else(|| DEFAULT_RUNTIME_NAME.to_string())
}

/// Current user name ($USER, then $USERNAME)
pub fn username() -> Option<String> {
    env_opt(EnvVar::User.as_str()).or_else(|| env_opt(EnvVar::Username.as_str()))
}

/// Tracing filter ($MEASURE_LOG)
pub fn log_filter() -> Option<String> {
    env_opt(EnvVar::MeasureLog.as_str())
}

/// Whether the process runs in a container that dies with the task.
pub fn is_disposable_container() -> bool {
    is_disposable_with(|name| std::env::var_os(name).is_some())
}

pub(crate) fn is_disposable_with(is_set: impl Fn(&str) -> bool) -> bool {
    let disposable = DISPOSABLE_CONTAINER_MARKERS
        .iter()
        .any(|var| is_set(var.as_str()));
    tracing::trace!(disposable, "Disposable container check");
    disposable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposable_markers() {
        assert!(is_disposable_with(|name| name == "AWS_BATCH_JOB_ID"));
        assert!(is_disposable_with(|name| name == "METAFLOW_KUBERNETES_POD_ID"));
        assert!(!is_disposable_with(|name| name == "HOME"));
        assert!(!is_disposable_with(|_| false));
    }
}
