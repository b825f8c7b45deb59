//! Endpoint naming
//!
//! Every provider kind listens on `<socket_dir>/<kind>.sock`. The bridge and
//! the shell both derive the path from here so they always agree.

use std::path::{Path, PathBuf};

use crate::error::Error;

/// Default directory holding provider sockets
pub const DEFAULT_SOCKET_DIR: &str = "/var/run/conduit";

/// Environment variable overriding [`DEFAULT_SOCKET_DIR`]
pub const SOCKET_DIR_ENV: &str = "CONDUIT_SOCKET_DIR";

/// Socket file extension
pub const SOCKET_EXTENSION: &str = "sock";

// sockaddr_un.sun_path is 108 bytes including the trailing NUL
const MAX_SOCKET_PATH: usize = 107;

/// Socket directory from the environment, or the default
pub fn socket_dir_from_env() -> PathBuf {
    std::env::var_os(SOCKET_DIR_ENV)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_DIR))
}

/// Check a provider kind is usable as a socket file name
///
/// Kinds are lowercase DNS-label style: `[a-z0-9-]+`, not starting or
/// ending with `-`.
pub fn validate_kind(kind: &str) -> Result<(), Error> {
    let valid_chars = kind
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if kind.is_empty() || !valid_chars || kind.starts_with('-') || kind.ends_with('-') {
        return Err(Error::configuration_for_field(
            "provider",
            format!("invalid provider kind {kind:?}: must match [a-z0-9-]+"),
        ));
    }
    Ok(())
}

/// Endpoint path for a provider kind
pub fn socket_path(dir: impl AsRef<Path>, kind: &str) -> Result<PathBuf, Error> {
    validate_kind(kind)?;
    let path = dir
        .as_ref()
        .join(kind)
        .with_extension(SOCKET_EXTENSION);

    if path.as_os_str().len() > MAX_SOCKET_PATH {
        return Err(Error::configuration_for_field(
            "socket_dir",
            format!(
                "socket path {} exceeds {MAX_SOCKET_PATH} bytes",
                path.display()
            ),
        ));
    }
    Ok(path)
}
