use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeasureError {
    #[error("api_key missing. Specify api_key in the measure config or the DD_API_KEY environment variable")]
    MissingApiKey,

    #[error("Dogstatsd binary is not available for your system ({os}, {arch})")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Could not download Dogstatsd binary (code {status}). Not retrying")]
    DownloadRejected { status: u16 },

    #[error("Downloading Dogstatsd binary failed after {attempts} attempts: {reason}")]
    DownloadFailed { attempts: u32, reason: String },

    #[error("Could not start the daemon {binary}: exited with {code:?}")]
    DaemonExited { binary: PathBuf, code: Option<i32> },

    #[error("Could not establish connection to dogstatsd at {socket}")]
    DaemonUnreachable { socket: PathBuf },

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}

impl MeasureError {
    /// Whether retrying the same operation could succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::MissingApiKey
                | Self::UnsupportedPlatform { .. }
                | Self::DownloadRejected { .. }
                | Self::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MeasureError>;
