// src/client.rs
//! StatsD client used by the profiler middleware.
//!
//! The middleware only needs one operation from a metric client: report a
//! duration under a name. [`TimingClient`] is that seam, so the middleware
//! can run against a real [`cadence::StatsdClient`] or an in-memory double.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use cadence::{NopMetricSink, StatsdClient, Timed, UdpMetricSink};

use crate::error::{ProfilerError, Result};

/// Something that can record a named timing.
///
/// Implementations must never block the caller for long and must swallow
/// their own failures: instrumentation is best-effort.
pub trait TimingClient: Send + Sync + 'static {
    fn timing(&self, name: &str, elapsed: Duration);
}

impl TimingClient for StatsdClient {
    fn timing(&self, name: &str, elapsed: Duration) {
        if let Err(e) = self.time(name, elapsed) {
            tracing::debug!(metric = name, error = %e, "failed to send timing");
        }
    }
}

/// Turns Go-style `:port` addresses into loopback addresses.
pub fn normalize_address(address: &str) -> String {
    if address.starts_with(':') {
        format!("127.0.0.1{}", address)
    } else {
        address.to_string()
    }
}

fn resolve(address: &str) -> Result<SocketAddr> {
    let normalized = normalize_address(address);
    if !normalized.contains(':') {
        return Err(ProfilerError::InvalidAddress(address.to_string()));
    }

    normalized
        .to_socket_addrs()
        .map_err(|_| ProfilerError::InvalidAddress(address.to_string()))?
        .next()
        .ok_or_else(|| ProfilerError::InvalidAddress(address.to_string()))
}

/// Build a StatsD client sending over a non-blocking UDP socket.
///
/// The client has no prefix: metric names are sent exactly as given.
pub fn statsd_client(address: &str) -> Result<StatsdClient> {
    let target = resolve(address)?;
    let bind_addr = if target.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };

    let socket = UdpSocket::bind(bind_addr)?;
    socket.set_nonblocking(true)?;

    let sink = UdpMetricSink::from(target, socket)?;
    Ok(StatsdClient::from_sink("", sink))
}

/// A client that discards everything. Used when the real one can't be built.
pub fn noop_client() -> StatsdClient {
    StatsdClient::from_sink("", NopMetricSink)
}
