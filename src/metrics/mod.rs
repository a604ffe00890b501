//! Process-wide metrics facade.
//!
//! Any code in the process can emit metrics through the free functions here
//! without holding a handle. Calls fan out to every registered backend; with no
//! backend registered they do nothing and never fail.
//!
//! ```no_run
//! use measure::metrics::{self, TimeDistribution};
//!
//! metrics::increment("mftest.test_metric", 1, &[]);
//! {
//!     let _timer = TimeDistribution::new("mftest.slow_operation", &["custom_tag"], "ms");
//!     // timed work
//! }
//! metrics::gauge("mftest.my_gauge", 42.0, &[]);
//! ```

pub mod dogstatsd;

pub use dogstatsd::DogstatsdClient;

use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Instant;

/// A metrics sink.
pub trait MeasurementBackend: Send + Sync {
    fn gauge(&self, name: &str, value: f64, tags: &[&str]);
    fn increment(&self, name: &str, value: i64, tags: &[&str]);
    fn decrement(&self, name: &str, value: i64, tags: &[&str]);
    fn distribution(&self, name: &str, value: f64, tags: &[&str]);

    /// Push out anything buffered.
    fn flush(&self) {}
}

/// Append-only set of backends.
#[derive(Default)]
pub struct Registry {
    backends: RwLock<Vec<Arc<dyn MeasurementBackend>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, backend: Arc<dyn MeasurementBackend>) {
        let mut backends = self
            .backends
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        backends.push(backend);
        tracing::debug!(count = backends.len(), "Registered measurement backend");
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn MeasurementBackend>> {
        self.backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn gauge(&self, name: &str, value: f64, tags: &[&str]) {
        for backend in self.snapshot() {
            backend.gauge(name, value, tags);
        }
    }

    pub fn increment(&self, name: &str, value: i64, tags: &[&str]) {
        for backend in self.snapshot() {
            backend.increment(name, value, tags);
        }
    }

    pub fn decrement(&self, name: &str, value: i64, tags: &[&str]) {
        for backend in self.snapshot() {
            backend.decrement(name, value, tags);
        }
    }

    pub fn distribution(&self, name: &str, value: f64, tags: &[&str]) {
        for backend in self.snapshot() {
            backend.distribution(name, value, tags);
        }
    }

    pub fn flush(&self) {
        for backend in self.snapshot() {
            backend.flush();
        }
    }

    /// Start timing a block; see [`TimeDistribution`].
    pub fn time_distribution<'r>(
        &'r self,
        name: &str,
        tags: &[&str],
        resolution: impl Into<Resolution>,
    ) -> TimeDistribution<'r> {
        TimeDistribution::with_registry(self, name, tags, resolution.into())
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// The registry behind the free functions.
pub fn global() -> &'static Registry {
    GLOBAL.get_or_init(Registry::new)
}

pub fn register_backend(backend: Arc<dyn MeasurementBackend>) {
    global().register(backend);
}

pub fn gauge(name: &str, value: f64, tags: &[&str]) {
    global().gauge(name, value, tags);
}

pub fn increment(name: &str, value: i64, tags: &[&str]) {
    global().increment(name, value, tags);
}

pub fn decrement(name: &str, value: i64, tags: &[&str]) {
    global().decrement(name, value, tags);
}

pub fn distribution(name: &str, value: f64, tags: &[&str]) {
    global().distribution(name, value, tags);
}

pub fn flush() {
    global().flush();
}

/// Unit for [`TimeDistribution`] samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Millis,
    Seconds,
    Minutes,
    /// Unrecognized unit; reported 1:1 in seconds.
    Unscaled,
}

impl Resolution {
    /// Multiplier applied to elapsed seconds.
    pub fn scale(self) -> f64 {
        match self {
            Self::Millis => 1000.0,
            Self::Seconds => 1.0,
            Self::Minutes => 1.0 / 60.0,
            Self::Unscaled => 1.0,
        }
    }
}

impl From<&str> for Resolution {
    fn from(unit: &str) -> Self {
        match unit {
            "ms" => Self::Millis,
            "s" => Self::Seconds,
            "m" => Self::Minutes,
            _ => Self::Unscaled,
        }
    }
}

/// Reports the elapsed time of its scope as one distribution sample.
///
/// The sample is emitted from `Drop`, so it is sent exactly once however the
/// scope ends, early return and unwinding included.
pub struct TimeDistribution<'r> {
    registry: &'r Registry,
    name: String,
    tags: Vec<String>,
    resolution: Resolution,
    start: Instant,
}

impl TimeDistribution<'static> {
    /// Time against the global registry.
    pub fn new(name: &str, tags: &[&str], resolution: impl Into<Resolution>) -> Self {
        Self::with_registry(global(), name, tags, resolution.into())
    }
}

impl<'r> TimeDistribution<'r> {
    fn with_registry(
        registry: &'r Registry,
        name: &str,
        tags: &[&str],
        resolution: Resolution,
    ) -> Self {
        Self {
            registry,
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            resolution,
            start: Instant::now(),
        }
    }
}

impl Drop for TimeDistribution<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed().as_secs_f64();
        let value = (self.resolution.scale() * elapsed).round();
        let tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
        self.registry.distribution(&self.name, value, &tags);
    }
}
