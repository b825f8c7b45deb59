//! Listening endpoint for one provider kind
//!
//! The socket file is owned by a guard: it is removed when the guard drops,
//! on every exit path, and only once.

use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tokio::net::UnixListener;
use tracing::{info, warn};

use conduit_common::socket::socket_path;
use conduit_common::Error;

/// Permissions of the socket file; trust is scoped by file access
pub const SOCKET_MODE: u32 = 0o660;

/// Removes the socket file when dropped
#[derive(Debug)]
pub struct SocketGuard {
    path: PathBuf,
}

impl SocketGuard {
    /// Path of the guarded socket
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => info!(socket = %self.path.display(), "removed provider socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(socket = %self.path.display(), error = %e, "failed to remove provider socket"),
        }
    }
}

/// Bound socket for one provider kind
#[derive(Debug)]
pub struct ProviderListener {
    listener: UnixListener,
    guard: SocketGuard,
    kind: String,
}

impl ProviderListener {
    /// Bind `<dir>/<kind>.sock`
    ///
    /// Creates the directory if needed. A socket file left behind by an
    /// unclean shutdown is removed; a socket with a live listener behind it
    /// is an error, so two processes never serve the same kind.
    pub fn bind(dir: impl AsRef<Path>, kind: &str) -> Result<Self, Error> {
        let dir = dir.as_ref();
        let path = socket_path(dir, kind)?;

        fs::create_dir_all(dir).map_err(|e| Error::io("create socket directory", e))?;
        remove_stale(&path)?;

        let listener = UnixListener::bind(&path).map_err(|e| Error::io("bind", e))?;
        let guard = SocketGuard { path };
        fs::set_permissions(guard.path(), Permissions::from_mode(SOCKET_MODE))
            .map_err(|e| Error::io("set socket permissions", e))?;

        info!(provider = %kind, socket = %guard.path().display(), "listening");
        Ok(Self {
            listener,
            guard,
            kind: kind.to_string(),
        })
    }

    /// Socket path
    pub fn path(&self) -> &Path {
        self.guard.path()
    }

    /// Provider kind served on this socket
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Split into the listener and the guard owning the socket file
    pub fn into_parts(self) -> (UnixListener, SocketGuard) {
        (self.listener, self.guard)
    }
}

fn remove_stale(path: &Path) -> Result<(), Error> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io("inspect socket path", e)),
    };
    if !metadata.file_type().is_socket() {
        return Err(Error::configuration(format!(
            "{} exists and is not a socket",
            path.display()
        )));
    }
    if std::os::unix::net::UnixStream::connect(path).is_ok() {
        return Err(Error::configuration(format!(
            "{} is already served by another process",
            path.display()
        )));
    }
    warn!(socket = %path.display(), "removing stale provider socket");
    fs::remove_file(path).map_err(|e| Error::io("remove stale socket", e))
}
