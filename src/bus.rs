//! Command bus transports.
//!
//! Two datagram flavors over UDP: [`FanoutBus`] for the primary
//! command-and-control channel (one logical sender, every subscriber gets
//! every frame) and [`PeerBus`] for point-to-point channels with source
//! address filtering (the hack-payload link). The blocking receive with
//! timeout is the only suspension point a coordinator has.

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::protocol::{Frame, MAX_WIRE_FRAME_LEN};

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid bus address `{0}`")]
    InvalidAddress(String),
}

/// Frame transport shared by every coordinator.
///
/// `recv` blocks for at most `timeout` and returns `Ok(None)` on expiry;
/// malformed and filtered datagrams are dropped inside the call and never
/// surface to the poll loop.
pub trait Bus: Send {
    fn send(&mut self, frame: &Frame) -> Result<(), BusError>;
    fn recv(&mut self, timeout: Duration) -> Result<Option<Frame>, BusError>;
}

fn resolve(addr: &str) -> Result<SocketAddr, BusError> {
    addr.to_socket_addrs()
        .map_err(|_| BusError::InvalidAddress(addr.to_string()))?
        .next()
        .ok_or_else(|| BusError::InvalidAddress(addr.to_string()))
}

fn parse_ip(addr: &str) -> Result<IpAddr, BusError> {
    addr.parse()
        .map_err(|_| BusError::InvalidAddress(addr.to_string()))
}

/// Receive one frame from `socket`, waiting out `timeout` across filtered
/// and malformed datagrams. `admit` decides per source address.
fn recv_filtered(
    socket: &UdpSocket,
    timeout: Duration,
    mut admit: impl FnMut(IpAddr) -> bool,
) -> Result<Option<Frame>, BusError> {
    let deadline = Instant::now() + timeout.max(Duration::from_millis(1));
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        socket.set_read_timeout(Some(remaining))?;
        let mut buf = [0u8; MAX_WIRE_FRAME_LEN];
        match socket.recv_from(&mut buf) {
            Ok((len, src)) => {
                if !admit(src.ip()) {
                    debug!(%src, "dropping frame from filtered source");
                    continue;
                }
                match Frame::from_wire(&buf[..len]) {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(err) => {
                        warn!(%src, %err, raw_len = len, "dropping malformed datagram");
                        continue;
                    }
                }
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Fan-out transport: every `send` delivers the frame to all subscribers.
#[derive(Debug)]
pub struct FanoutBus {
    socket: UdpSocket,
    subscribers: Vec<SocketAddr>,
}

impl FanoutBus {
    /// Bind the local endpoint and resolve the subscriber set. Failure here
    /// is fatal to the owning coordinator.
    pub fn new(bind: &str, subscribers: &[String]) -> Result<Self, BusError> {
        let socket = UdpSocket::bind(bind)?;
        let subscribers = subscribers
            .iter()
            .map(|s| resolve(s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            socket,
            subscribers,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BusError> {
        Ok(self.socket.local_addr()?)
    }
}

impl Bus for FanoutBus {
    fn send(&mut self, frame: &Frame) -> Result<(), BusError> {
        let mut buf = [0u8; MAX_WIRE_FRAME_LEN];
        let len = frame.to_wire(&mut buf);
        for subscriber in &self.subscribers {
            self.socket.send_to(&buf[..len], subscriber)?;
        }
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Frame>, BusError> {
        recv_filtered(&self.socket, timeout, |_| true)
    }
}

/// Point-to-point transport with an explicit bind address, a single peer for
/// sends, and optional source filtering on receives.
#[derive(Debug)]
pub struct PeerBus {
    socket: UdpSocket,
    peer: SocketAddr,
    /// When present, only these source addresses are admitted.
    allowlist: Option<Vec<IpAddr>>,
    /// Legacy deny filter, applied after the allow-list.
    denylist: Vec<IpAddr>,
}

impl PeerBus {
    pub fn new(
        bind: &str,
        peer: &str,
        allowlist: Option<&[String]>,
        denylist: &[String],
    ) -> Result<Self, BusError> {
        let socket = UdpSocket::bind(bind)?;
        let peer = resolve(peer)?;
        let allowlist = allowlist
            .map(|list| list.iter().map(|a| parse_ip(a)).collect::<Result<_, _>>())
            .transpose()?;
        let denylist = denylist
            .iter()
            .map(|a| parse_ip(a))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            socket,
            peer,
            allowlist,
            denylist,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BusError> {
        Ok(self.socket.local_addr()?)
    }

    fn admits(&self, src: IpAddr) -> bool {
        if let Some(allow) = &self.allowlist {
            if !allow.contains(&src) {
                return false;
            }
        }
        !self.denylist.contains(&src)
    }
}

impl Bus for PeerBus {
    fn send(&mut self, frame: &Frame) -> Result<(), BusError> {
        let mut buf = [0u8; MAX_WIRE_FRAME_LEN];
        let len = frame.to_wire(&mut buf);
        self.socket.send_to(&buf[..len], self.peer)?;
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Frame>, BusError> {
        recv_filtered(&self.socket, timeout, |src| self.admits(src))
    }
}
