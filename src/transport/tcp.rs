//! TCP transport: client mode (`connect`) and server mode (`serve`,
//! accepting exactly one connection), mirroring `ModemSocketCom`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use log::info;
use tokio::net::{TcpListener, TcpStream};

use crate::constants::DEFAULT_TCP_PORT;
use crate::error::Result;

use super::Transport;

const SERVER_ACCEPT_TIMEOUT: Duration = Duration::from_secs(1);

impl Transport {
    /// Connects to a modem-over-TCP forwarder as a client.
    pub fn connect_tcp(host: impl Into<String>, port: Option<u16>) -> Result<Transport> {
        let host = host.into();
        let port = port.unwrap_or(DEFAULT_TCP_PORT);
        info!("Connecting via TCP to {}:{}", host, port);
        Transport::spawn_with_init(None, move || async move {
            let stream = TcpStream::connect((host.as_str(), port)).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        })
    }

    /// Listens for and accepts a single inbound connection, acting as the
    /// modem-side TCP server.
    pub fn serve_tcp(host: impl Into<String>, port: Option<u16>) -> Result<Transport> {
        let host = host.into();
        let port = port.unwrap_or(DEFAULT_TCP_PORT);
        info!("Opening server via TCP at {}:{}", host, port);
        Transport::spawn_with_init(None, move || async move {
            let listener = TcpListener::bind((host.as_str(), port)).await?;
            loop {
                match tokio::time::timeout(SERVER_ACCEPT_TIMEOUT, listener.accept()).await {
                    Ok(Ok((stream, addr))) => {
                        stream.set_nodelay(true)?;
                        info!("Connection from {} established", addr);
                        return Ok(stream);
                    }
                    Ok(Err(e)) => return Err(e),
                    Err(_) => continue, // accept() timed out, keep waiting
                }
            }
        })
    }
}

/// Probes every address in `third_octet_range` on `base.base.base.X:port`
/// for an open modem-over-TCP port, returning the ones that answered.
///
/// The original implementation probes sequentially; here each candidate is
/// probed on its own thread and results are collected back into the
/// original, deterministic address order rather than completion order, per
/// the redesign calling for a faster-but-still-reproducible scan.
pub fn scan(base: Ipv4Addr, third_octet_range: std::ops::RangeInclusive<u8>, port: u16) -> Vec<IpAddr> {
    let octets = base.octets();
    let candidates: Vec<Ipv4Addr> = third_octet_range
        .map(|o| Ipv4Addr::new(octets[0], octets[1], octets[2], o))
        .collect();

    let handles: Vec<_> = candidates
        .iter()
        .copied()
        .map(|ip| {
            std::thread::spawn(move || {
                let addr = SocketAddr::new(IpAddr::V4(ip), port);
                std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(100))
                    .map(|_| ip)
                    .ok()
            })
        })
        .collect();

    handles
        .into_iter()
        .filter_map(|h| h.join().ok().flatten())
        .map(IpAddr::V4)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_preserves_candidate_order_for_reachable_hosts() {
        // Loopback always answers nothing on an unused high port; this
        // just exercises that scan() doesn't panic and returns a subset
        // of the probed range.
        let found = scan(Ipv4Addr::new(127, 0, 0, 1), 1..=3, 65000);
        assert!(found.len() <= 3);
    }
}
