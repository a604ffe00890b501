pub mod clienv;
pub mod daemon;
pub mod error;
pub mod fingerprint;
pub mod hooks;
pub mod lease;
pub mod metrics;
pub mod provision;
pub mod session;
pub mod shutdown;
pub mod timing;
pub mod user_config;

pub use error::{MeasureError, Result};
pub use hooks::{StepContext, StepMetrics};
pub use metrics::{MeasurementBackend, Registry, TimeDistribution};
pub use session::{Session, SessionOptions, SessionSettings};
pub use user_config::MeasureConfig;
