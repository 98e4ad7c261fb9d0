//! Port negotiation
//!
//! The listening socket is bound on the caller's thread so the port is
//! known before the server task starts. A busy port moves on to the next
//! one; an address the host cannot use moves on to the next host and,
//! once the hosts run out, to the other address family.

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use tracing::{debug, info, warn};

use crate::error::{ServerError, ServerResult};

const IPV6_HOSTS: [&str; 3] = ["::", "localhost", "::1"];
const IPV4_HOSTS: [&str; 3] = ["0.0.0.0", "localhost", "127.0.0.1"];

#[cfg(target_os = "linux")]
const EAFNOSUPPORT: i32 = 97;
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
const EAFNOSUPPORT: i32 = 47;
#[cfg(windows)]
const EAFNOSUPPORT: i32 = 10047;
#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    windows
)))]
const EAFNOSUPPORT: i32 = -1;

fn family_unsupported(err: &io::Error) -> bool {
    err.kind() == ErrorKind::AddrNotAvailable || err.raw_os_error() == Some(EAFNOSUPPORT)
}

/// Resolve `host` to an address of the wanted family
fn resolve(host: &str, port: u16, ipv6: bool) -> io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .find(|addr| addr.is_ipv6() == ipv6)
        .ok_or_else(|| {
            io::Error::new(
                ErrorKind::AddrNotAvailable,
                format!("{} has no usable address", host),
            )
        })
}

fn bind(host: &str, port: u16, ipv6: bool) -> io::Result<TcpListener> {
    TcpListener::bind(resolve(host, port, ipv6)?)
}

/// Bind a listener, starting at `port`
///
/// Returns the listener and the port it was given. Port 0 asks the OS for
/// any free port.
pub fn listen(port: u16, ipv6: bool, retries: u32) -> ServerResult<(TcpListener, u16)> {
    let start = port;
    let mut port = port;
    let mut ipv6 = ipv6;
    let mut host_index = 0;

    for _ in 0..retries.max(1) {
        let hosts = if ipv6 { &IPV6_HOSTS } else { &IPV4_HOSTS };
        let host = hosts[host_index];
        match bind(host, port, ipv6) {
            Ok(listener) => {
                let bound = listener.local_addr().map_err(ServerError::Bind)?.port();
                info!(host, port = bound, "listening");
                return Ok((listener, bound));
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                debug!(port, "port in use");
                port = port.checked_add(1).ok_or(ServerError::PortExhausted { start, retries })?;
            }
            Err(e) if family_unsupported(&e) => {
                debug!(host, ipv6, "address unavailable: {}", e);
                host_index += 1;
                if host_index >= hosts.len() {
                    ipv6 = !ipv6;
                    host_index = 0;
                }
            }
            Err(e) => {
                warn!(host, port, "socket open failed: {}", e);
            }
        }
    }
    warn!(start, retries, "failed to open socket, max retries reached");
    Err(ServerError::PortExhausted { start, retries })
}
