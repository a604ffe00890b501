use super::MeasurementBackend;
use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Largest datagram the daemon accepts on its unix socket.
pub const MAX_PAYLOAD: usize = 8192;

/// Local-daemon backend speaking the DogStatsD text format over a unix datagram socket.
///
/// Lines are packed into datagrams of at most [`MAX_PAYLOAD`] bytes and sent
/// when the next line would not fit or on [`flush`](MeasurementBackend::flush).
#[derive(Debug)]
pub struct DogstatsdClient {
    socket: UnixDatagram,
    path: PathBuf,
    constant_tags: Vec<String>,
    buffer: Mutex<String>,
}

impl DogstatsdClient {
    pub fn connect(path: &Path, constant_tags: Vec<String>) -> io::Result<Self> {
        let socket = UnixDatagram::unbound()?;
        socket.connect(path)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            path: path.to_path_buf(),
            constant_tags,
            buffer: Mutex::new(String::with_capacity(MAX_PAYLOAD)),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.path
    }

    pub fn constant_tags(&self) -> &[String] {
        &self.constant_tags
    }

    fn submit(&self, name: &str, value: &str, kind: &str, tags: &[&str]) {
        let line = format_line(name, value, kind, tags, &self.constant_tags);
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);

        if !buffer.is_empty() && buffer.len() + 1 + line.len() > MAX_PAYLOAD {
            self.send(&buffer);
            buffer.clear();
        }
        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(&line);
    }

    fn send(&self, payload: &str) {
        if let Err(e) = self.socket.send(payload.as_bytes()) {
            debug!(socket = %self.path.display(), error = %e, "Dropped metrics datagram");
        }
    }
}

impl MeasurementBackend for DogstatsdClient {
    fn gauge(&self, name: &str, value: f64, tags: &[&str]) {
        self.submit(name, &value.to_string(), "g", tags);
    }

    fn increment(&self, name: &str, value: i64, tags: &[&str]) {
        self.submit(name, &value.to_string(), "c", tags);
    }

    fn decrement(&self, name: &str, value: i64, tags: &[&str]) {
        // Widened so i64::MIN negates without overflow.
        self.submit(name, &(-i128::from(value)).to_string(), "c", tags);
    }

    fn distribution(&self, name: &str, value: f64, tags: &[&str]) {
        self.submit(name, &value.to_string(), "d", tags);
    }

    fn flush(&self) {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        if !buffer.is_empty() {
            self.send(&buffer);
            buffer.clear();
        }
    }
}

impl Drop for DogstatsdClient {
    fn drop(&mut self) {
        self.flush();
    }
}

/// `name:value|kind|#tag,...` with per-call tags before constant tags.
fn format_line(name: &str, value: &str, kind: &str, tags: &[&str], constant: &[String]) -> String {
    let mut line = format!("{name}:{value}|{kind}");
    let mut all = tags
        .iter()
        .copied()
        .chain(constant.iter().map(String::as_str))
        .peekable();
    if all.peek().is_some() {
        line.push_str("|#");
        line.push_str(&all.collect::<Vec<_>>().join(","));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener(dir: &Path) -> (UnixDatagram, PathBuf) {
        let path = dir.join("statsd.sock");
        let socket = UnixDatagram::bind(&path).unwrap();
        socket
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        (socket, path)
    }

    fn recv(socket: &UnixDatagram) -> String {
        let mut buf = vec![0u8; MAX_PAYLOAD * 2];
        let n = socket.recv(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[test]
    fn test_format_line() {
        assert_eq!(format_line("x", "1", "c", &[], &[]), "x:1|c");
        assert_eq!(
            format_line("x", "2.5", "g", &["a:1"], &["env:prod".to_string()]),
            "x:2.5|g|#a:1,env:prod"
        );
        assert_eq!(
            format_line("x", "3", "d", &[], &["b".to_string()]),
            "x:3|d|#b"
        );
    }

    #[test]
    fn test_buffered_until_flush() {
        let dir = tempfile::tempdir().unwrap();
        let (server, path) = listener(dir.path());
        let client = DogstatsdClient::connect(&path, vec!["host:a".to_string()]).unwrap();

        client.increment("jobs", 1, &[]);
        client.decrement("slots", 2, &["pool:x"]);
        client.gauge("load", 42.0, &[]);
        client.distribution("latency", 2000.0, &[]);
        client.flush();

        assert_eq!(
            recv(&server),
            "jobs:1|c|#host:a\nslots:-2|c|#pool:x,host:a\nload:42|g|#host:a\nlatency:2000|d|#host:a"
        );
    }

    #[test]
    fn test_decrement_extremes() {
        let dir = tempfile::tempdir().unwrap();
        let (server, path) = listener(dir.path());
        let client = DogstatsdClient::connect(&path, Vec::new()).unwrap();

        client.decrement("x", i64::MIN, &[]);
        client.decrement("y", i64::MAX, &[]);
        client.decrement("z", -3, &[]);
        client.flush();

        assert_eq!(
            recv(&server),
            "x:9223372036854775808|c\ny:-9223372036854775807|c\nz:3|c"
        );
    }

    #[test]
    fn test_full_buffer_sends_early() {
        let dir = tempfile::tempdir().unwrap();
        let (server, path) = listener(dir.path());
        let client = DogstatsdClient::connect(&path, Vec::new()).unwrap();

        let name = "n".repeat(1000);
        for _ in 0..10 {
            client.increment(&name, 1, &[]);
        }

        let first = recv(&server);
        assert!(first.len() <= MAX_PAYLOAD);
        assert_eq!(first.lines().count(), 8);

        client.flush();
        assert_eq!(recv(&server).lines().count(), 2);
    }

    #[test]
    fn test_connect_fails_without_listener() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DogstatsdClient::connect(&dir.path().join("missing.sock"), Vec::new()).is_err());
    }
}
