//! Rate-limited UDP request/response channel to a single endpoint

use crate::error::TransportError;
use log::{debug, trace};
use shared::MAX_PACKET_SIZE;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::{sleep_until, Instant};

/// Extra spacing added on top of the nominal rate so clock skew never
/// trips the remote rate limiter
const RATE_LIMIT_MARGIN: Duration = Duration::from_secs(1);

/// A connected UDP socket with per-call deadlines and send pacing
///
/// Each channel is owned by exactly one caller, so its limiter only paces
/// that caller's requests.
pub struct DatagramChannel {
    socket: Option<UdpSocket>,
    peer: SocketAddr,
    timeout: Duration,
    min_interval: Duration,
    next_send: Option<Instant>,
    buffer: Box<[u8; MAX_PACKET_SIZE]>,
}

impl DatagramChannel {
    /// Binds an ephemeral local socket and connects it to `addr`
    pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self, TransportError> {
        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| TransportError::Connection { addr, source })?;
        socket
            .connect(addr)
            .await
            .map_err(|source| TransportError::Connection { addr, source })?;

        debug!("Opened datagram channel to {}", addr);

        Ok(Self {
            socket: Some(socket),
            peer: addr,
            timeout,
            min_interval: Duration::ZERO,
            next_send: None,
            buffer: Box::new([0u8; MAX_PACKET_SIZE]),
        })
    }

    /// Resolves `host` ("name:port") and connects to its first address
    pub async fn dial(host: &str, timeout: Duration) -> Result<Self, TransportError> {
        let resolve_error = |source: io::Error| TransportError::Resolve {
            host: host.to_string(),
            source,
        };

        let addr = lookup_host(host)
            .await
            .map_err(resolve_error)?
            .next()
            .ok_or_else(|| {
                resolve_error(io::Error::new(
                    io::ErrorKind::NotFound,
                    "no addresses returned",
                ))
            })?;
        Self::connect(addr, timeout).await
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Sets the deadline applied to every later send and receive
    ///
    /// A zero duration disables deadlines.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Spaces consecutive sends by `60s / requests_per_minute + 1s`
    ///
    /// Zero disables rate limiting.
    pub fn set_rate_limit(&mut self, requests_per_minute: u32) {
        self.min_interval = if requests_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(60) / requests_per_minute + RATE_LIMIT_MARGIN
        };
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Sends one datagram once the rate limiter allows it
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.enforce_rate_limit().await;

        let result = match self.socket.as_ref() {
            Some(socket) => with_deadline(self.timeout, socket.send(bytes)).await,
            None => Err(TransportError::Closed),
        };

        self.record_next_send();
        trace!("Sent {} bytes to {}", bytes.len(), self.peer);

        // UDP writes are all or nothing
        result.map(|_| ())
    }

    /// Receives a single datagram of at most [`MAX_PACKET_SIZE`] bytes
    pub async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        let result = match self.socket.as_ref() {
            Some(socket) => with_deadline(self.timeout, socket.recv(&mut self.buffer[..])).await,
            None => Err(TransportError::Closed),
        };

        self.record_next_send();

        let len = result?;
        trace!("Received {} bytes from {}", len, self.peer);
        Ok(self.buffer[..len].to_vec())
    }

    /// Releases the socket; calling it again has no effect
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("Closed datagram channel to {}", self.peer);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    async fn enforce_rate_limit(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        if let Some(next) = self.next_send {
            sleep_until(next).await;
        }
    }

    fn record_next_send(&mut self) {
        if !self.min_interval.is_zero() {
            self.next_send = Some(Instant::now() + self.min_interval);
        }
    }
}

async fn with_deadline<T, F>(timeout: Duration, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = io::Result<T>>,
{
    if timeout.is_zero() {
        return Ok(fut.await?);
    }
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(TransportError::Timeout(timeout)),
    }
}
