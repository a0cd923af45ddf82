//! Socket tuning applied uniformly to every socket rinetd opens.
//!
//! Grounded in `syssocket_setsockopt` in
//! `examples/original_source/src/config.h`/`config.cpp`: every stream and
//! datagram socket gets the same IPv4 TOS and fragmentation hints, and every
//! stream socket additionally gets TCP Fast Open. All of this is best-effort
//! -- a platform that doesn't support an option should not fail socket
//! creation, it should just skip that option, matching the original's
//! `boost::system::error_code` (ignored) pattern.

use std::net::SocketAddr;

use socket2::SockRef;
use tracing::trace;

use crate::util::IPV4_TOS;

/// Apply the common tuning (§4.4) to a socket that has already been bound (or
/// is about to be), given the address it is/will be bound to. This is
/// applied to listening sockets, accepted ingress sockets, stream egress
/// sockets, and datagram sockets alike.
///
/// The "family" used to decide whether to apply IPv4-only options is taken
/// from `bound_addr`. If the caller could not determine the socket's local
/// endpoint (e.g. the query itself failed), it should pass an IPv4 address
/// here, matching the original's documented fallback of defaulting to the
/// IPv4 branch when `local_endpoint()` fails.
pub fn tune_common(socket: SockRef<'_>, bound_addr: SocketAddr) {
	if bound_addr.is_ipv4() {
		if let Err(err) = socket.set_tos(IPV4_TOS) {
			trace!(%err, "could not set IP_TOS, continuing without it");
		}

		apply_pmtud_hint(&socket);
	}

	apply_nosigpipe(&socket);
}

/// Enable TCP Fast Open on a stream socket, ignoring errors on platforms
/// where it is unavailable (§4.4).
pub fn enable_tcp_fast_open_connect(socket: SockRef<'_>) {
	#[cfg(target_os = "linux")]
	{
		if let Err(err) = socket.set_tcp_fastopen_connect(true) {
			trace!(%err, "could not enable TCP_FASTOPEN_CONNECT, continuing without it");
		}
	}
	#[cfg(not(target_os = "linux"))]
	{
		let _ = socket;
	}
}

/// Enable TCP Fast Open on a listening socket, ignoring errors on platforms
/// where it is unavailable (§4.4).
pub fn enable_tcp_fast_open_listen(socket: SockRef<'_>) {
	#[cfg(any(target_os = "linux", target_os = "freebsd"))]
	{
		if let Err(err) = socket.set_tcp_fastopen(511) {
			trace!(%err, "could not enable TCP_FASTOPEN, continuing without it");
		}
	}
	#[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
	{
		let _ = socket;
	}
}

#[cfg(target_os = "linux")]
fn apply_pmtud_hint(socket: &SockRef<'_>) {
	if let Err(err) = socket.set_mtu_discover_v4(socket2::MtuDiscover::Want) {
		trace!(%err, "could not set IP_MTU_DISCOVER, continuing without it");
	}
}

#[cfg(not(target_os = "linux"))]
fn apply_pmtud_hint(_socket: &SockRef<'_>) {}

#[cfg(any(target_vendor = "apple"))]
fn apply_nosigpipe(socket: &SockRef<'_>) {
	if let Err(err) = socket.set_nosigpipe(true) {
		trace!(%err, "could not set SO_NOSIGPIPE, continuing without it");
	}
}

#[cfg(not(any(target_vendor = "apple")))]
fn apply_nosigpipe(_socket: &SockRef<'_>) {}

/// Query a socket's local address, falling back to the IPv4 wildcard address
/// if the query fails, matching the original's "safely default to the v4
/// branch" fallback for family detection.
///
/// Callers build the [`SockRef`] themselves (`SockRef::from(&stream)`) since
/// `socket2`'s blanket conversions differ between Unix (`AsRawFd`) and
/// Windows (`AsRawSocket`) and there is no single portable bound a generic
/// helper here could name.
pub fn local_addr_or_v4_fallback(socket: SockRef<'_>) -> SocketAddr {
	socket
		.local_addr()
		.ok()
		.and_then(|addr| addr.as_socket())
		.unwrap_or_else(|| SocketAddr::new(std::net::Ipv4Addr::UNSPECIFIED.into(), 0))
}
