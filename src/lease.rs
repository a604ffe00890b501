//! Leader lease: one flock per fingerprint decides which of the concurrently
//! running processes provisions and supervises the shared daemon.
//!
//! The lock is scoped to the open descriptor held inside [`LeaderLease`]. It is
//! never unlocked explicitly; closing the descriptor (dropping the lease or
//! exiting the process) is what releases it, so a crashed leader hands over to
//! the next process without any cleanup protocol.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct LeaderLease {
    file: File,
    path: PathBuf,
    leader: bool,
    previous_pid: Option<u32>,
}

impl LeaderLease {
    /// Try to become leader for the lease at `path` without blocking.
    ///
    /// Losing the race is not an error: the lease is returned in follower mode.
    pub fn acquire(path: &Path) -> io::Result<Self> {
        // Create without truncating so a pid recorded by a crashed leader survives.
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }

        let previous_pid = read_recorded_pid(path);

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let leader = match file.try_lock_exclusive() {
            Ok(()) => true,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Lease held elsewhere");
                false
            }
        };

        debug!(
            path = %path.display(),
            leader,
            previous_pid = ?previous_pid,
            "Lease acquired"
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            leader,
            previous_pid,
        })
    }

    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// Daemon pid recorded by an earlier leader, if any. May be long dead.
    pub fn previous_pid(&self) -> Option<u32> {
        self.previous_pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the recorded daemon pid. Followers never write.
    pub fn record_pid(&mut self, pid: u32) -> io::Result<()> {
        if !self.leader {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "only the lease leader may record a daemon pid",
            ));
        }
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        write!(self.file, "{pid}")?;
        self.file.flush()?;
        self.previous_pid = Some(pid);
        debug!(path = %self.path.display(), pid, "Recorded daemon pid");
        Ok(())
    }
}

/// Parse the pid stored in a lease file. Missing, empty or corrupt content is `None`.
pub fn read_recorded_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|pid| *pid > 0)
}
