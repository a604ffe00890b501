//! Shared DogStatsD daemon supervision
//!
//! One daemon runs per config fingerprint per host. Whichever process holds
//! the fingerprint's lease is responsible for (re)starting it; everyone else
//! waits and connects.
//!
//! ```text
//!   worker A (leader)          worker B (follower)
//!   ────────────────           ───────────────────
//!   socket live? ──yes──┐      socket live? ──yes──┐
//!        │ no           │           │ no           │
//!   kill recorded pid   │      wait for leader     │
//!   spawn `<bin> start` │           │              │
//!   still alive? record │           │              │
//!        │              │           │              │
//!   probe socket ◄──────┘      probe socket ◄──────┘
//!        │                          │
//!   DogstatsdClient            DogstatsdClient
//! ```

pub mod probe;
pub mod supervisor;

pub use probe::{connect_with_retries, is_daemon_alive};
pub use supervisor::{DaemonSpec, Supervisor};
