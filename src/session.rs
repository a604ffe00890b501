//! One worker's daemon session: fingerprint → lease → binary → daemon → backend.
//!
//! [`Session::start`] never fails. Every problem ends in a warning on stderr
//! and a registry without the daemon backend, so metrics calls become no-ops
//! and the task itself carries on.
//!
//! The session owns the leader lease. Keep it alive for the whole task: dropping
//! it releases leadership to another process.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::clienv;
use crate::daemon::{DaemonSpec, Supervisor};
use crate::error::{MeasureError, Result};
use crate::fingerprint::{Fingerprint, LeasePaths};
use crate::lease::LeaderLease;
use crate::metrics::{DogstatsdClient, Registry};
use crate::provision::{BinaryProvisioner, Target};
use crate::timing::Timing;
use crate::user_config::MeasureConfig;

/// What the daemon is configured with and how chatty we are.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub api_key: Option<String>,
    /// Constant tags attached to every metric sent to the daemon
    pub tags: Vec<String>,
    pub daemon_config: BTreeMap<String, String>,
    pub verbose: bool,
    pub debug_daemon: bool,
}

impl SessionOptions {
    pub fn from_config(config: &MeasureConfig, tags: Vec<String>) -> Self {
        Self {
            api_key: config.resolved_api_key(),
            tags,
            daemon_config: config.daemon_config.clone(),
            verbose: config.verbose,
            debug_daemon: config.debug_daemon,
        }
    }
}

/// Where shared files live, which binary to fetch and how long to wait.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub root: PathBuf,
    pub target: Target,
    pub download_base: String,
    pub timing: Timing,
}

impl SessionSettings {
    pub fn from_env() -> Self {
        Self {
            root: clienv::runtime_dir(),
            target: Target::current(),
            download_base: clienv::download_base(),
            timing: Timing::default(),
        }
    }
}

/// User-facing output: diagnostics on stdout when verbose, warnings on stderr.
#[derive(Debug, Clone, Copy)]
struct Reporter {
    verbose: bool,
}

impl Reporter {
    fn log(&self, msg: &str) {
        if self.verbose {
            println!("[@measure] {msg}");
        }
    }

    fn warn(&self, msg: &str) {
        eprintln!("MEASURE WARNING: {msg}. Metrics are not sent to the daemon!");
    }
}

pub struct Session {
    reporter: Reporter,
    fingerprint: Option<Fingerprint>,
    paths: Option<LeasePaths>,
    lease: Option<LeaderLease>,
    connected: bool,
}

impl Session {
    /// Bring up (or join) the shared daemon and register it with `registry`.
    pub async fn start(options: SessionOptions, settings: &SessionSettings, registry: &Registry) -> Self {
        let mut session = Self {
            reporter: Reporter {
                verbose: options.verbose,
            },
            fingerprint: None,
            paths: None,
            lease: None,
            connected: false,
        };

        let Some(api_key) = options.api_key.clone().filter(|k| !k.is_empty()) else {
            session.reporter.warn(&MeasureError::MissingApiKey.to_string());
            return session;
        };

        match session.connect(&api_key, &options, settings).await {
            Ok(client) => {
                session.reporter.log("Dogstatsd ready!");
                registry.register(Arc::new(client));
                session.connected = true;
            }
            Err(e) => {
                tracing::debug!(error = %e, permanent = e.is_permanent(), "Session degraded to no-op");
                session.reporter.warn(&e.to_string());
                session
                    .reporter
                    .log("Measurements not sent to the daemon due to previous errors");
            }
        }
        session
    }

    async fn connect(
        &mut self,
        api_key: &str,
        options: &SessionOptions,
        settings: &SessionSettings,
    ) -> Result<DogstatsdClient> {
        let fingerprint = Fingerprint::compute(api_key, &options.daemon_config);
        self.reporter
            .log(&format!("The ID of this Dogstatsd is {fingerprint}"));
        let paths = LeasePaths::new(&settings.root, &fingerprint);
        self.fingerprint = Some(fingerprint);
        self.paths = Some(paths.clone());

        let lease = LeaderLease::acquire(&paths.lease)?;
        self.reporter.log(if lease.is_leader() {
            "I am the leader"
        } else {
            "I am not the leader"
        });
        let lease = self.lease.insert(lease);

        let provisioner = BinaryProvisioner::new(
            &paths.binary,
            settings.target.clone(),
            &settings.download_base,
            settings.timing.clone(),
        );
        provisioner.ensure_binary(lease.is_leader()).await?;

        let spec = DaemonSpec {
            binary: paths.binary.clone(),
            socket: paths.socket.clone(),
            api_key: api_key.to_string(),
            config: options.daemon_config.clone(),
            debug: options.debug_daemon,
        };
        let supervisor = Supervisor::new(spec, options.tags.clone(), settings.timing.clone());
        supervisor.start_and_connect(lease).await
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    pub fn paths(&self) -> Option<&LeasePaths> {
        self.paths.as_ref()
    }

    pub fn is_leader(&self) -> bool {
        self.lease.as_ref().is_some_and(LeaderLease::is_leader)
    }

    /// Whether a daemon backend was registered.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Socket of the connected daemon.
    pub fn socket_path(&self) -> Option<&PathBuf> {
        self.paths
            .as_ref()
            .filter(|_| self.connected)
            .map(|p| &p.socket)
    }
}
