//! Process table: enumerates `/proc`, tracks live processes, and owns
//! each process's view of the connections it currently holds open.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::debug;

use crate::connection::ConnectionTable;
use crate::error::{NetprocError, Result};
use crate::fd_resolver::resolve_connections;
use crate::netstat::NetStat;
use crate::tuple::Tuple;

const PROCESS_DIR: &str = "/proc";
const CMDLINE_DISPLAY_LIMIT: usize = 512;

#[derive(Debug, Clone)]
pub struct Process {
    pub pid: i32,
    pub command: String,
    pub connections: Vec<Tuple>,
    pub stat: NetStat,
    pub active: bool,
}

pub struct ProcessTable {
    processes: HashMap<i32, Process>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            processes: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn get(&self, pid: i32) -> Option<&Process> {
        self.processes.get(&pid)
    }

    pub fn foreach(&self, mut visitor: impl FnMut(&Process)) {
        for process in self.processes.values() {
            visitor(process);
        }
    }

    pub fn foreach_mut(&mut self, mut visitor: impl FnMut(&mut Process)) {
        for process in self.processes.values_mut() {
            visitor(process);
        }
    }

    /// Enumerate `/proc`, refresh every numeric pid directory found, then
    /// evict anything no longer present. `connections` is the table the
    /// FD resolver consults.
    pub fn update(&mut self, connections: &ConnectionTable) -> Result<()> {
        let pids = numeric_entries(Path::new(PROCESS_DIR)).map_err(|source| NetprocError::Io {
            path: PROCESS_DIR.to_string(),
            source,
        })?;

        for pid in pids {
            let entry = self.processes.entry(pid).or_insert_with(|| Process {
                pid,
                command: read_command(pid),
                connections: Vec::new(),
                stat: NetStat::default(),
                active: false,
            });
            entry.active = true;
            entry.connections = resolve_connections(pid, connections);
        }

        let before = self.processes.len();
        self.processes.retain(|_, p| {
            let keep = p.active;
            p.active = false;
            keep
        });
        if self.processes.len() != before {
            debug!(
                "evicted {} process(es) no longer present",
                before - self.processes.len()
            );
        }

        Ok(())
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl ProcessTable {
    /// Insert a process record directly, bypassing `/proc` enumeration.
    /// Used by other modules' tests to exercise aggregation logic without
    /// depending on the test runner's own process tree.
    pub(crate) fn insert_for_test(&mut self, process: Process) {
        self.processes.insert(process.pid, process);
    }
}

/// List the numeric (pid) entries of a directory. A directory that
/// disappears mid-iteration is not an error; missing entries are simply
/// absent from the result.
fn numeric_entries(dir: &Path) -> std::io::Result<Vec<i32>> {
    let mut pids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        if let Some(name) = entry.file_name().to_str() {
            if let Ok(pid) = name.parse::<i32>() {
                pids.push(pid);
            }
        }
    }
    Ok(pids)
}

/// `cmdline` with embedded NULs turned into spaces, trimmed, and truncated;
/// falls back to `comm` for processes that report an empty cmdline (kernel
/// threads), and finally to a bare `PID <n>` label.
fn read_command(pid: i32) -> String {
    let base = format!("{}/{}", PROCESS_DIR, pid);

    if let Ok(raw) = fs::read_to_string(format!("{}/cmdline", base)) {
        let joined: String = raw
            .split('\0')
            .filter(|arg| !arg.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !joined.is_empty() {
            return truncate(joined);
        }
    }

    if let Ok(comm) = fs::read_to_string(format!("{}/comm", base)) {
        let comm = comm.trim();
        if !comm.is_empty() {
            return format!("[{}]", comm);
        }
    }

    format!("PID {}", pid)
}

fn truncate(mut s: String) -> String {
    if s.len() > CMDLINE_DISPLAY_LIMIT {
        s.truncate(CMDLINE_DISPLAY_LIMIT);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_limit() {
        let long = "x".repeat(CMDLINE_DISPLAY_LIMIT + 100);
        assert_eq!(truncate(long).len(), CMDLINE_DISPLAY_LIMIT);
    }

    #[test]
    fn numeric_entries_ignores_non_pid_names() {
        let dir = std::env::temp_dir().join(format!("netproc-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::create_dir_all(dir.join("123")).unwrap();
        fs::create_dir_all(dir.join("self")).unwrap();
        fs::create_dir_all(dir.join("456")).unwrap();

        let mut pids = numeric_entries(&dir).unwrap();
        pids.sort();
        assert_eq!(pids, vec![123, 456]);

        fs::remove_dir_all(&dir).unwrap();
    }
}
