//! End-to-end session behaviour against fake daemons.
//!
//! A "daemon" here is a shell script installed as the daemon binary plus a
//! datagram socket bound by the test, standing in for the real DogStatsD.

use measure::fingerprint::{Fingerprint, LeasePaths};
use measure::lease::read_recorded_pid;
use measure::provision::Target;
use measure::session::{Session, SessionOptions, SessionSettings};
use measure::timing::Timing;
use measure::Registry;
use serial_test::serial;
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;

const API_KEY: &str = "test-key";

fn options() -> SessionOptions {
    SessionOptions {
        api_key: Some(API_KEY.to_string()),
        tags: vec!["env:test".to_string()],
        ..Default::default()
    }
}

fn settings(root: &Path, target: Target) -> SessionSettings {
    SessionSettings {
        root: root.to_path_buf(),
        target,
        download_base: "http://127.0.0.1:1/".to_string(),
        timing: Timing {
            download_attempts: 1,
            download_backoff: Duration::ZERO,
            connect_attempts: 40,
            connect_spacing: Duration::from_millis(50),
            wait_to_download: Duration::from_millis(20),
            wait_to_start: Duration::from_millis(200),
            settle: Duration::from_millis(150),
            kill_grace: Duration::from_millis(50),
            jitter: Duration::from_millis(10),
            ..Timing::default()
        },
    }
}

fn paths(root: &Path) -> LeasePaths {
    LeasePaths::new(root, &Fingerprint::compute(API_KEY, &BTreeMap::<String, String>::new()))
}

fn install_script(path: &Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// Bind the daemon socket after `delay`, the way a starting daemon would.
fn bind_later(socket: PathBuf, delay: Duration) -> JoinHandle<UnixDatagram> {
    std::thread::spawn(move || {
        std::thread::sleep(delay);
        let socket = UnixDatagram::bind(&socket).unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        socket
    })
}

fn kill(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[tokio::test]
#[serial]
async fn unsupported_platform_leaves_facade_empty() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::new();

    let session = Session::start(
        options(),
        &settings(dir.path(), Target::new("plan9", "mips")),
        &registry,
    )
    .await;

    assert!(session.is_leader());
    assert!(!session.is_connected());
    assert!(registry.is_empty());
    assert!(!paths(dir.path()).binary.exists());

    registry.increment("x", 1, &[]);
}

#[tokio::test]
#[serial]
async fn live_socket_takes_fast_path() {
    let dir = tempfile::tempdir().unwrap();
    let paths = paths(dir.path());
    fs::write(&paths.binary, b"fresh").unwrap();
    let daemon = UnixDatagram::bind(&paths.socket).unwrap();
    daemon
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    let registry = Registry::new();
    let session = Session::start(
        options(),
        &settings(dir.path(), Target::current()),
        &registry,
    )
    .await;

    assert!(session.is_connected());
    assert_eq!(session.socket_path(), Some(&paths.socket));
    assert_eq!(registry.len(), 1);
    assert_eq!(read_recorded_pid(&paths.lease), None);

    registry.increment("x", 1, &[]);
    registry.flush();

    let mut buf = [0u8; 512];
    let n = daemon.recv(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"x:1|c|#env:test");
}

#[tokio::test]
#[serial]
async fn concurrent_sessions_share_one_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let paths = paths(dir.path());
    install_script(&paths.binary, "exec sleep 30");
    let binder = bind_later(paths.socket.clone(), Duration::from_millis(400));

    let settings = settings(dir.path(), Target::current());
    let leader_registry = Registry::new();
    let follower_registry = Registry::new();

    let (a, b) = tokio::join!(
        Session::start(options(), &settings, &leader_registry),
        Session::start(options(), &settings, &follower_registry),
    );
    let daemon = binder.join().unwrap();

    assert_eq!([a.is_leader(), b.is_leader()].iter().filter(|l| **l).count(), 1);
    assert!(a.is_connected());
    assert!(b.is_connected());
    assert_eq!(a.socket_path(), Some(&paths.socket));
    assert_eq!(a.socket_path(), b.socket_path());
    assert_eq!(leader_registry.len(), 1);
    assert_eq!(follower_registry.len(), 1);

    let pid = read_recorded_pid(&paths.lease).expect("leader records the daemon pid");

    follower_registry.gauge("g", 3.0, &["who:follower"]);
    follower_registry.flush();
    let mut buf = [0u8; 512];
    let n = daemon.recv(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"g:3|g|#who:follower,env:test");

    kill(pid);
}

#[tokio::test]
#[serial]
async fn daemon_exiting_at_launch_degrades_everyone() {
    let dir = tempfile::tempdir().unwrap();
    let paths = paths(dir.path());
    install_script(&paths.binary, "exit 3");

    let mut settings = settings(dir.path(), Target::current());
    settings.timing.connect_attempts = 3;
    let leader_registry = Registry::new();
    let follower_registry = Registry::new();

    let (a, b) = tokio::join!(
        Session::start(options(), &settings, &leader_registry),
        Session::start(options(), &settings, &follower_registry),
    );

    assert!(a.is_leader() ^ b.is_leader());
    assert!(!a.is_connected());
    assert!(!b.is_connected());
    assert!(leader_registry.is_empty());
    assert!(follower_registry.is_empty());
    assert_eq!(read_recorded_pid(&paths.lease), None);
}

#[tokio::test]
#[serial]
async fn new_leader_replaces_recorded_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let paths = paths(dir.path());
    install_script(&paths.binary, "exec sleep 30");

    let mut stale = std::process::Command::new("sleep").arg("30").spawn().unwrap();
    fs::write(&paths.lease, stale.id().to_string()).unwrap();
    let binder = bind_later(paths.socket.clone(), Duration::from_millis(300));

    let registry = Registry::new();
    let session = Session::start(
        options(),
        &settings(dir.path(), Target::current()),
        &registry,
    )
    .await;
    let _daemon = binder.join().unwrap();

    assert!(session.is_leader());
    assert!(session.is_connected());

    let status = stale.wait().unwrap();
    assert!(!status.success());

    let pid = read_recorded_pid(&paths.lease).unwrap();
    assert_ne!(pid, stale.id());
    kill(pid);
}
