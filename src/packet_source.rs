//! External packet-capture collaborator. Spawns one capture thread per
//! up, non-virtual interface and feeds decoded TCP/UDP frames into the
//! shared pipeline's `observe_packet`. Grounded in the interface-discovery
//! and Ethernet/IPv4/IPv6/TCP/UDP parsing cascade `chadthrottle`'s
//! `monitor.rs` already implements.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info};
use pnet::datalink::{self, Channel, NetworkInterface};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;

use crate::scan::SharedPipeline;
use crate::tuple::Protocol;

/// Spawn a capture thread for each matching interface. Returns the join
/// handles so the caller can keep them alive for the process lifetime;
/// threads run until `shutdown` is observed true.
pub fn spawn_capture_threads(
    pipeline: SharedPipeline,
    only_interface: Option<&str>,
    shutdown: Arc<AtomicBool>,
) -> Vec<thread::JoinHandle<()>> {
    let interfaces = find_interfaces(only_interface);
    info!("starting packet capture on {} interface(s)", interfaces.len());

    interfaces
        .into_iter()
        .map(|interface| {
            let pipeline = pipeline.clone();
            let shutdown = shutdown.clone();
            let name = interface.name.clone();
            thread::spawn(move || {
                if let Err(err) = capture_on_interface(interface, pipeline, shutdown) {
                    error!("packet capture error on {}: {}", name, err);
                }
            })
        })
        .collect()
}

fn find_interfaces(only_interface: Option<&str>) -> Vec<NetworkInterface> {
    datalink::interfaces()
        .into_iter()
        .filter(|iface| iface.is_up() && !iface.ips.is_empty())
        .filter(|iface| only_interface.map_or(true, |name| iface.name == name))
        .collect()
}

fn capture_on_interface(
    interface: NetworkInterface,
    pipeline: SharedPipeline,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let name = interface.name.clone();
    let (_, mut rx) = match datalink::channel(&interface, Default::default()) {
        Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
        Ok(_) => return Err(anyhow::anyhow!("unsupported channel type on {}", name)),
        Err(err) => return Err(anyhow::anyhow!("failed to open channel on {}: {}", name, err)),
    };

    while !shutdown.load(Ordering::Relaxed) {
        match rx.next() {
            Ok(frame) => {
                if let Err(err) = process_frame(frame, &pipeline) {
                    debug!("dropped unparseable frame on {}: {}", name, err);
                }
            }
            Err(err) => {
                error!("packet receive error on {}: {}", name, err);
                thread::sleep(Duration::from_millis(100));
            }
        }
    }
    Ok(())
}

fn process_frame(frame: &[u8], pipeline: &SharedPipeline) -> Result<()> {
    let ethernet = EthernetPacket::new(frame).context("truncated ethernet frame")?;
    match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => {
            if let Some(ipv4) = Ipv4Packet::new(ethernet.payload()) {
                process_ipv4(&ipv4, frame.len(), pipeline);
            }
        }
        EtherTypes::Ipv6 => {
            if let Some(ipv6) = Ipv6Packet::new(ethernet.payload()) {
                process_ipv6(&ipv6, frame.len(), pipeline);
            }
        }
        _ => {}
    }
    Ok(())
}

fn process_ipv4(ipv4: &Ipv4Packet, frame_len: usize, pipeline: &SharedPipeline) {
    let src = IpAddr::V4(ipv4.get_source());
    let dst = IpAddr::V4(ipv4.get_destination());
    match ipv4.get_next_level_protocol() {
        IpNextHeaderProtocols::Tcp => {
            if let Some(tcp) = TcpPacket::new(ipv4.payload()) {
                observe(pipeline, src, tcp.get_source(), dst, tcp.get_destination(), Protocol::Tcp, frame_len);
            }
        }
        IpNextHeaderProtocols::Udp => {
            if let Some(udp) = UdpPacket::new(ipv4.payload()) {
                observe(pipeline, src, udp.get_source(), dst, udp.get_destination(), Protocol::Udp, frame_len);
            }
        }
        _ => {}
    }
}

fn process_ipv6(ipv6: &Ipv6Packet, frame_len: usize, pipeline: &SharedPipeline) {
    let src = IpAddr::V6(ipv6.get_source());
    let dst = IpAddr::V6(ipv6.get_destination());
    match ipv6.get_next_header() {
        IpNextHeaderProtocols::Tcp => {
            if let Some(tcp) = TcpPacket::new(ipv6.payload()) {
                observe(pipeline, src, tcp.get_source(), dst, tcp.get_destination(), Protocol::Tcp, frame_len);
            }
        }
        IpNextHeaderProtocols::Udp => {
            if let Some(udp) = UdpPacket::new(ipv6.payload()) {
                observe(pipeline, src, udp.get_source(), dst, udp.get_destination(), Protocol::Udp, frame_len);
            }
        }
        _ => {}
    }
}

#[allow(clippy::too_many_arguments)]
fn observe(
    pipeline: &SharedPipeline,
    src_ip: IpAddr,
    src_port: u16,
    dst_ip: IpAddr,
    dst_port: u16,
    protocol: Protocol,
    frame_len: usize,
) {
    let mut guard = match pipeline.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.observe_packet(src_ip, src_port, dst_ip, dst_port, protocol, frame_len as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_interfaces_filters_by_name_when_requested() {
        // Can't assume any specific interface exists in a test sandbox;
        // just confirm the name filter never returns an interface that
        // doesn't match when one is requested.
        let filtered = find_interfaces(Some("definitely-not-a-real-iface"));
        assert!(filtered.is_empty());
    }
}
