//! Public address discovery for completion URLs.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use cq_core::config::ServerConfig;

/// Host used in completion URLs: the configured `public_host`, else the
/// primary local IPv4, else loopback.
pub fn public_host(server: &ServerConfig) -> String {
    if let Some(host) = server.public_host.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
        return host.to_string();
    }
    match primary_ipv4() {
        Some(ip) => ip.to_string(),
        None => {
            tracing::warn!("No non-loopback IPv4 address found; completion URLs will use 127.0.0.1");
            Ipv4Addr::LOCALHOST.to_string()
        }
    }
}

/// `http://<public_host>:<port>`.
pub fn public_base_url(server: &ServerConfig) -> String {
    format!("http://{}:{}", public_host(server), server.port)
}

/// Address the OS would route outbound traffic from. Connecting a UDP
/// socket sends no packets.
fn primary_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}
