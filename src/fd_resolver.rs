//! FD → connection resolver: walks a process's `/proc/<pid>/fd` directory
//! and maps each socket-backed descriptor back to a connection by inode.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;

use log::trace;

use crate::connection::ConnectionTable;
use crate::error::NetprocError;
use crate::tuple::Tuple;

/// Refresh the set of connections owned by `pid`. Non-socket fds, broken
/// symlinks, and an unreadable fd directory (another user's process) all
/// silently yield no connections rather than an error.
pub fn resolve_connections(pid: i32, connections: &ConnectionTable) -> Vec<Tuple> {
    let fd_dir = format!("/proc/{}/fd", pid);
    let entries = match fs::read_dir(&fd_dir) {
        Ok(entries) => entries,
        Err(source) => {
            if source.kind() == ErrorKind::PermissionDenied {
                trace!(
                    "{}",
                    NetprocError::PermissionDenied { path: fd_dir.clone() }
                );
            }
            return Vec::new();
        }
    };

    let mut seen_inodes = HashSet::new();
    let mut owned = Vec::new();

    for entry in entries {
        let Ok(entry) = entry else { continue };
        let Ok(target) = fs::read_link(entry.path()) else {
            continue;
        };
        let Some(inode) = socket_inode(target.to_string_lossy().as_ref()) else {
            continue;
        };
        if !seen_inodes.insert(inode) {
            continue; // duplicate fd (dup()) pointing at the same socket
        }
        if let Some(conn) = connections.get_by_inode(inode) {
            owned.push(conn.lock().unwrap().tuple);
        }
    }

    owned
}

/// Extract `N` from a symlink target of the form `socket:[N]`.
fn socket_inode(target: &str) -> Option<u64> {
    let inner = target.strip_prefix("socket:[")?.strip_suffix(']')?;
    inner.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_socket_targets() {
        assert_eq!(socket_inode("socket:[20911]"), Some(20911));
    }

    #[test]
    fn rejects_non_socket_targets() {
        assert_eq!(socket_inode("/dev/null"), None);
        assert_eq!(socket_inode("pipe:[123]"), None);
        assert_eq!(socket_inode("socket:[not-a-number]"), None);
    }

    #[test]
    fn unreadable_fd_directory_yields_empty_list() {
        let table = ConnectionTable::new();
        // pid 1 is very unlikely to be readable by a non-root test runner,
        // and a nonexistent pid's fd dir simply doesn't exist either way.
        let owned = resolve_connections(i32::MAX, &table);
        assert!(owned.is_empty());
    }
}
