use crate::metrics::DogstatsdClient;
use crate::timing::jittered;
use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Connect a throwaway datagram socket to the daemon's path.
///
/// Nothing is sent; a successful connect means something is bound there.
pub fn is_daemon_alive(socket: &Path) -> io::Result<()> {
    let probe = UnixDatagram::unbound()?;
    probe.connect(socket)
}

/// Probe up to `attempts` times and hand back a client bound to the socket.
pub async fn connect_with_retries(
    socket: &Path,
    constant_tags: &[String],
    attempts: u32,
    spacing: Duration,
    jitter: Duration,
) -> Option<DogstatsdClient> {
    for attempt in 1..=attempts {
        debug!(socket = %socket.display(), attempt, "Trying to connect the daemon");
        let connected = is_daemon_alive(socket)
            .and_then(|()| DogstatsdClient::connect(socket, constant_tags.to_vec()));

        match connected {
            Ok(client) => {
                debug!(socket = %socket.display(), "Connection ok");
                return Some(client);
            }
            Err(e) => debug!(error = %e, "Could not connect the daemon"),
        }

        if attempt < attempts {
            tokio::time::sleep(jittered(spacing, jitter)).await;
        }
    }
    None
}
