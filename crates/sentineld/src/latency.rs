//! ICMP echo latency probing
//!
//! Every probe opens its own raw ICMPv4 socket, sends one echo request and
//! reads replies until one matches the request's identifier, sequence number
//! and target address, or the read deadline passes. The identifier is the
//! process id; the sequence number comes from an [`IcmpSequence`] shared by
//! all probes of a prober, so concurrent probes never reuse a pair.
//!
//! Opening a raw socket needs CAP_NET_RAW (or root). Without it every probe
//! fails with [`SentinelError::Socket`]; the daemon keeps running.

use crate::error::{Result, SentinelError};
use async_trait::async_trait;
use pnet_packet::Packet;
use pnet_packet::icmp::echo_reply::EchoReplyPacket;
use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet_packet::icmp::{self, IcmpCode, IcmpPacket, IcmpTypes};
use pnet_packet::ipv4::Ipv4Packet;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Payload carried by every request
const ECHO_PAYLOAD: &[u8] = b"sentinel-ping";
/// Receive buffer size (one Ethernet MTU)
const RECV_BUFFER_SIZE: usize = 1500;
/// Smallest read timeout handed to the socket; a zero timeout is rejected
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Process-wide echo sequence counter
///
/// Incremented atomically by every probe; only the low 16 bits go on the wire.
#[derive(Debug, Default)]
pub struct IcmpSequence(AtomicU32);

impl IcmpSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting after `value` (the next call returns `value + 1`)
    pub fn starting_at(value: u32) -> Self {
        Self(AtomicU32::new(value))
    }

    /// Next sequence number, truncated to 16 bits
    pub fn next(&self) -> u16 {
        (self.0.fetch_add(1, Ordering::Relaxed).wrapping_add(1) & 0xFFFF) as u16
    }
}

/// Something that can measure round-trip latency to an address.
#[async_trait]
pub trait LatencyProbe: Send + Sync {
    /// Round-trip time in milliseconds.
    async fn probe(&self, ip: IpAddr, timeout: Duration) -> Result<u64>;
}

/// Raw-socket ICMPv4 echo prober
#[derive(Debug, Clone)]
pub struct IcmpProber {
    identifier: u16,
    sequence: Arc<IcmpSequence>,
}

impl IcmpProber {
    /// Create a prober with its own sequence counter
    pub fn new() -> Self {
        Self::with_sequence(Arc::new(IcmpSequence::new()))
    }

    /// Create a prober sharing an existing sequence counter
    pub fn with_sequence(sequence: Arc<IcmpSequence>) -> Self {
        Self {
            identifier: (std::process::id() & 0xFFFF) as u16,
            sequence,
        }
    }

    /// Echo identifier used on the wire
    pub fn identifier(&self) -> u16 {
        self.identifier
    }
}

impl Default for IcmpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LatencyProbe for IcmpProber {
    async fn probe(&self, ip: IpAddr, timeout: Duration) -> Result<u64> {
        let IpAddr::V4(target) = ip else {
            return Err(SentinelError::UnsupportedAddress(ip));
        };

        let request = EchoRequest {
            target,
            identifier: self.identifier,
            sequence: self.sequence.next(),
            timeout,
        };

        tokio::task::spawn_blocking(move || request.send_and_wait())
            .await
            .map_err(|e| SentinelError::Socket(io::Error::other(e)))?
    }
}

/// One outstanding echo request
#[derive(Debug, Clone, Copy)]
struct EchoRequest {
    target: Ipv4Addr,
    identifier: u16,
    sequence: u16,
    timeout: Duration,
}

impl EchoRequest {
    /// Send the request and wait for its reply on the current thread.
    fn send_and_wait(&self) -> Result<u64> {
        // std's wrapper gives safe `&mut [u8]` receives; the descriptor stays a raw ICMP socket
        let socket: UdpSocket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
            .map_err(SentinelError::Socket)?
            .into();

        let packet = build_echo_request(self.identifier, self.sequence, ECHO_PAYLOAD);

        let start = Instant::now();
        socket
            .send_to(&packet, SocketAddrV4::new(self.target, 0))
            .map_err(SentinelError::Socket)?;
        let deadline = Instant::now() + self.timeout;

        self.await_reply(start, deadline, |buffer, wait| {
            socket.set_read_timeout(Some(wait))?;
            let (len, peer) = socket.recv_from(buffer)?;
            let peer = match peer {
                SocketAddr::V4(addr) => Some(*addr.ip()),
                SocketAddr::V6(_) => None,
            };
            Ok((len, peer))
        })
    }

    /// Read replies through `recv` until one matches or `deadline` passes.
    ///
    /// `recv` fills the buffer, waiting at most the given duration, and
    /// returns the byte count and the sender.
    fn await_reply<R>(&self, start: Instant, deadline: Instant, mut recv: R) -> Result<u64>
    where
        R: FnMut(&mut [u8], Duration) -> io::Result<(usize, Option<Ipv4Addr>)>,
    {
        let timed_out = || SentinelError::Timeout {
            ip: IpAddr::V4(self.target),
            timeout: self.timeout,
        };

        let mut buffer = [0u8; RECV_BUFFER_SIZE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out());
            }

            let (len, peer) = match recv(&mut buffer, remaining.max(MIN_READ_TIMEOUT)) {
                Ok(received) => received,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    return Err(timed_out());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SentinelError::Socket(e)),
            };

            let packet = &buffer[..len.min(buffer.len())];
            if !accept_reply(packet, peer, self.identifier, self.sequence, self.target) {
                continue;
            }

            let elapsed = start.elapsed();
            let latency_ms = elapsed.as_millis() as u64;
            debug!(
                ip = %self.target,
                latency_ms,
                latency_us = elapsed.as_micros() as u64,
                "Echo reply received"
            );
            return Ok(latency_ms);
        }
    }
}

/// Decide whether a received packet answers the request `(identifier, sequence)` to `target`.
///
/// Anything that is not an echo reply, carries another identifier or sequence
/// number, or comes from another (or an unknown) sender is discarded.
pub fn accept_reply(
    packet: &[u8],
    peer: Option<Ipv4Addr>,
    identifier: u16,
    sequence: u16,
    target: Ipv4Addr,
) -> bool {
    let Some((reply_id, reply_seq)) = parse_echo_reply(packet) else {
        return false;
    };
    if reply_id != identifier || reply_seq != sequence {
        trace!(reply_id, reply_seq, "Discarding echo reply for another probe");
        return false;
    }
    match peer {
        Some(peer) if peer == target => true,
        other => {
            trace!(peer = ?other, %target, "Discarding echo reply from unexpected peer");
            false
        }
    }
}

/// Build an ICMP echo request with a valid checksum.
pub fn build_echo_request(identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; MutableEchoRequestPacket::minimum_packet_size() + payload.len()];
    let mut request =
        MutableEchoRequestPacket::new(&mut buffer).expect("buffer too small for echo request");
    request.set_icmp_type(IcmpTypes::EchoRequest);
    request.set_icmp_code(IcmpCode::new(0));
    request.set_identifier(identifier);
    request.set_sequence_number(sequence);
    request.set_payload(payload);

    let checksum =
        icmp::checksum(&IcmpPacket::new(request.packet()).expect("buffer too small for ICMP header"));
    request.set_checksum(checksum);
    buffer
}

/// Extract `(identifier, sequence)` from an echo reply.
///
/// Raw IPv4 sockets deliver the IP header in front of the ICMP message; it is
/// skipped when present. Returns `None` for anything that is not an echo reply.
pub fn parse_echo_reply(packet: &[u8]) -> Option<(u16, u16)> {
    match packet.first() {
        Some(first) if first >> 4 == 4 => {
            let ip = Ipv4Packet::new(packet)?;
            // Slice by header length; some kernels rewrite total_length on raw sockets
            let header_len = usize::from(ip.get_header_length()) * 4;
            echo_reply_fields(packet.get(header_len..)?)
        }
        Some(_) => echo_reply_fields(packet),
        None => None,
    }
}

fn echo_reply_fields(icmp_bytes: &[u8]) -> Option<(u16, u16)> {
    let header = IcmpPacket::new(icmp_bytes)?;
    if header.get_icmp_type() != IcmpTypes::EchoReply || header.get_icmp_code() != IcmpCode::new(0) {
        return None;
    }
    let reply = EchoReplyPacket::new(icmp_bytes)?;
    Some((reply.get_identifier(), reply.get_sequence_number()))
}
