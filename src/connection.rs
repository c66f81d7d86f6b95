//! Connection table: tracks live TCP/UDP connections, parses the kernel
//! connection files, maintains a dual index (by inode, by tuple), and ages
//! out entries a scan no longer observes.

use std::io::{BufRead, BufReader};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::error::{NetprocError, Result};
use crate::hash_index::RefIndex;
use crate::netstat::NetStat;
use crate::tuple::{Protocol, Tuple};

const TCP_ESTABLISHED: u8 = 0x01;
const TCP_TIME_WAIT: u8 = 0x06;
const TCP_LISTEN: u8 = 0x0A;

#[derive(Debug, Clone)]
pub struct Connection {
    pub tuple: Tuple,
    pub inode: u64,
    pub state: u8,
    pub stat: NetStat,
    pub active: bool,
    pub last_seen_tick: u64,
}

impl Connection {
    pub fn state_name(&self) -> &'static str {
        match self.state {
            TCP_ESTABLISHED => "ESTABLISHED",
            0x02 => "SYN_SENT",
            0x03 => "SYN_RECV",
            0x04 => "FIN_WAIT1",
            0x05 => "FIN_WAIT2",
            TCP_TIME_WAIT => "TIME_WAIT",
            0x07 => "CLOSE",
            0x08 => "CLOSE_WAIT",
            0x09 => "LAST_ACK",
            TCP_LISTEN => "LISTEN",
            0x0B => "CLOSING",
            _ => "UNKNOWN",
        }
    }
}

pub struct ConnectionTable {
    by_inode: RefIndex<u64, Connection>,
    by_tuple: RefIndex<Tuple, Connection>,
    tick: u64,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self {
            by_inode: RefIndex::new(),
            by_tuple: RefIndex::new(),
            tick: 0,
        }
    }

    pub fn get_by_inode(&self, inode: u64) -> Option<Arc<Mutex<Connection>>> {
        self.by_inode.get(&inode)
    }

    pub fn get_by_tuple(&self, tuple: &Tuple) -> Option<Arc<Mutex<Connection>>> {
        self.by_tuple.get(tuple)
    }

    pub fn len(&self) -> usize {
        self.by_inode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_inode.is_empty()
    }

    pub fn foreach(&self, mut visitor: impl FnMut(&Arc<Mutex<Connection>>)) {
        self.by_inode.foreach(|_, v| visitor(v));
    }

    /// Refresh from the kernel connection files for the requested
    /// protocols. `paths` maps a protocol family to the path to read
    /// (e.g. `/proc/net/tcp`), letting tests and IPv4/IPv6 callers reuse
    /// the same entry point.
    pub fn update(&mut self, sources: &[(Protocol, &str)]) -> Result<()> {
        self.tick += 1;

        for (protocol, path) in sources {
            let file = std::fs::File::open(path).map_err(|source| NetprocError::Io {
                path: path.to_string(),
                source,
            })?;
            let reader = BufReader::new(file);
            self.update_from_reader(reader, *protocol, path)?;
        }

        self.age_out();
        Ok(())
    }

    fn update_from_reader(
        &mut self,
        reader: impl BufRead,
        protocol: Protocol,
        path: &str,
    ) -> Result<()> {
        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| NetprocError::Io {
                path: path.to_string(),
                source,
            })?;
            if i == 0 {
                continue; // header
            }
            if line.trim().is_empty() {
                continue;
            }

            let parsed = parse_line(&line, protocol).ok_or_else(|| NetprocError::Parse {
                path: path.to_string(),
                line: line.clone(),
            })?;

            if parsed.state == TCP_TIME_WAIT || parsed.state == TCP_LISTEN {
                continue;
            }

            if let Some(existing) = self.by_inode.get(&parsed.inode) {
                let mut conn = existing.lock().unwrap();
                conn.active = true;
                conn.last_seen_tick = self.tick;
                continue;
            }

            let conn = Connection {
                tuple: parsed.tuple,
                inode: parsed.inode,
                state: parsed.state,
                stat: NetStat::default(),
                active: true,
                last_seen_tick: self.tick,
            };
            self.insert(conn);
        }
        Ok(())
    }

    fn insert(&mut self, conn: Connection) {
        let inode = conn.inode;
        let tuple = conn.tuple;
        let record = Arc::new(Mutex::new(conn));
        self.by_inode.set(inode, record.clone());
        self.by_tuple.set(tuple, record);
    }

    /// Single-pass aging: anything not marked active this round is dropped
    /// from both indexes; everything else is reset for the next scan.
    fn age_out(&mut self) {
        let mut dead_inodes = Vec::new();
        let mut dead_tuples = Vec::new();

        self.by_inode.foreach(|inode, record| {
            let mut conn = record.lock().unwrap();
            if conn.active {
                conn.active = false;
            } else {
                dead_inodes.push(*inode);
                dead_tuples.push(conn.tuple);
            }
        });

        for inode in &dead_inodes {
            self.by_inode.remove(inode);
        }
        for tuple in &dead_tuples {
            self.by_tuple.remove(tuple);
        }

        if !dead_inodes.is_empty() {
            debug!("aged out {} dead connection(s)", dead_inodes.len());
        }
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}

struct ParsedLine {
    tuple: Tuple,
    state: u8,
    inode: u64,
}

/// Parse one data row of `/proc/net/{tcp,tcp6,udp,udp6}`.
///
/// Columns (whitespace separated): `sl local_address rem_address st
/// tx_queue:rx_queue tr:tm->when retrnsmt uid timeout inode ...`. Addresses
/// are hex, host-endian per 32-bit group; IPv4 is 8 hex chars, IPv6 is 32.
fn parse_line(line: &str, protocol: Protocol) -> Option<ParsedLine> {
    let mut fields = line.split_whitespace();
    fields.next()?; // sl

    let local = fields.next()?;
    let (local_ip, local_port) = parse_addr_port(local)?;

    let remote = fields.next()?;
    let (remote_ip, remote_port) = parse_addr_port(remote)?;

    let state = u8::from_str_radix(fields.next()?, 16).ok()?;

    fields.next()?; // tx_queue:rx_queue
    fields.next()?; // tr:tm->when
    fields.next()?; // retrnsmt
    fields.next()?; // uid
    fields.next()?; // timeout

    let inode = fields.next()?.parse::<u64>().ok()?;

    Some(ParsedLine {
        tuple: Tuple::new(local_ip, local_port, remote_ip, remote_port, protocol),
        state,
        inode,
    })
}

fn parse_addr_port(field: &str) -> Option<(IpAddr, u16)> {
    let (addr_hex, port_hex) = field.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    let addr = parse_hex_addr(addr_hex)?;
    Some((addr, port))
}

fn parse_hex_addr(hex: &str) -> Option<IpAddr> {
    match hex.len() {
        8 => {
            let raw = u32::from_str_radix(hex, 16).ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(raw.to_le_bytes())))
        }
        32 => {
            let mut bytes = [0u8; 16];
            for group in 0..4 {
                let chunk = &hex[group * 8..group * 8 + 8];
                let word = u32::from_str_radix(chunk, 16).ok()?;
                bytes[group * 4..group * 4 + 4].copy_from_slice(&word.to_le_bytes());
            }
            Some(IpAddr::V6(Ipv6Addr::from(bytes)))
        }
        _ => {
            warn!("unexpected address field width: {}", hex.len());
            None
        }
    }
}
