//! Out-of-process index server
//!
//! The daemon keeps a crawled index in memory so a priming cursor can stay
//! open across searches while the client process comes and goes.
//!
//! Architecture:
//! - `searchprime daemon run`: crawls the configured roots, listens on a Unix socket
//! - [`RemoteBackend`]: a `SearchBackend` whose cursors live on the daemon
//! - Protocol: length-prefixed JSON, one socket per cursor-owning connection

mod client;
pub mod daemon;
pub mod protocol;

pub use client::RemoteBackend;
pub use daemon::IndexServer;

use std::path::PathBuf;

/// Get the socket path for the index server
/// Uses a per-user runtime directory for security
pub fn get_socket_path() -> PathBuf {
    runtime_path("searchprime.sock")
}

/// Get the PID file path for the daemon
pub fn get_pid_path() -> PathBuf {
    runtime_path("searchprime.pid")
}

fn runtime_path(file_name: &str) -> PathBuf {
    // Try XDG_RUNTIME_DIR first (most secure, tmpfs-backed)
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(file_name);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".local").join("run").join(file_name);
    }

    // Last resort: /tmp with user ID
    let uid = unsafe { libc::getuid() };
    let (stem, ext) = file_name.rsplit_once('.').unwrap_or((file_name, ""));
    PathBuf::from(format!("/tmp/{}-{}.{}", stem, uid, ext))
}

/// Check if the daemon is running
pub fn is_daemon_running() -> bool {
    let Ok(pid_str) = std::fs::read_to_string(get_pid_path()) else {
        return false;
    };

    match pid_str.trim().parse::<i32>() {
        // kill(pid, 0) only probes for existence
        Ok(pid) => unsafe { libc::kill(pid, 0) == 0 },
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_paths_share_directory() {
        let socket = get_socket_path();
        let pid = get_pid_path();
        assert_eq!(socket.parent(), pid.parent());
        assert!(socket.to_string_lossy().contains("searchprime"));
        assert_eq!(socket.extension().and_then(|e| e.to_str()), Some("sock"));
    }
}
