//! Address-family-agnostic representation of a `(host, port)` endpoint.
//!
//! The original `rinetd` represents a host as a tagged union of a 32-bit IPv4
//! address and a 16-byte IPv6 address (see `ip_address` in
//! `examples/original_source/src/config.h`). [`std::net::IpAddr`] is already
//! exactly that discriminated union, so [`Address`] is a thin newtype around
//! it whose only job is owning the parsing rules the original's
//! `parse_address` applies (rejecting the IPv4 `INADDR_NONE` sentinel) that
//! `IpAddr::from_str` alone does not enforce.

use std::{
	fmt::{Display, Formatter, Result as FmtResult},
	net::{IpAddr, Ipv4Addr, SocketAddr},
	str::FromStr,
};

/// The IPv4 `INADDR_NONE` sentinel (`255.255.255.255`). `inet_addr` (and
/// therefore the original `rinetd`'s host parser) returns this value both for
/// the literal all-ones address and for a malformed address string, so the
/// original rejects it outright rather than risk silently misinterpreting a
/// parse failure as a legitimate host. This implementation parses with
/// [`Ipv4Addr::from_str`], which does not conflate the two cases, but still
/// rejects the literal sentinel for compatibility with the original's
/// behavior.
const INADDR_NONE: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 255);

/// An error returned when a textual address cannot be parsed into an
/// [`Address`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
	/// The text is neither a valid IPv4 nor a valid IPv6 literal.
	#[error("not a valid IPv4 or IPv6 address")]
	Invalid,
	/// The text parsed as the IPv4 `INADDR_NONE` sentinel, which is rejected.
	#[error("address is the IPv4 INADDR_NONE sentinel (255.255.255.255)")]
	InaddrNone,
}

/// An address-family-agnostic host, either IPv4 or IPv6.
///
/// # String representation
/// Parsed from (and rendered as) a plain textual IPv4 or IPv6 literal, with
/// no surrounding brackets for IPv6 (brackets are added only when an
/// [`Address`] is combined with a port, see [`Display`] on the `(Address,
/// u16)` helpers in this module).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(IpAddr);

impl Address {
	/// Parse a textual IPv4 or IPv6 address into an [`Address`].
	///
	/// # Errors
	/// Returns [`AddressParseError::Invalid`] if `text` is neither a valid
	/// IPv4 nor IPv6 literal, or [`AddressParseError::InaddrNone`] if it
	/// parses as the IPv4 `INADDR_NONE` sentinel.
	pub fn parse(text: &str) -> Result<Self, AddressParseError> {
		let ip = IpAddr::from_str(text).map_err(|_| AddressParseError::Invalid)?;

		if ip == IpAddr::V4(INADDR_NONE) {
			return Err(AddressParseError::InaddrNone);
		}

		Ok(Self(ip))
	}

	/// The IPv4 wildcard address (`0.0.0.0`).
	#[must_use]
	pub const fn wildcard_v4() -> Self {
		Self(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
	}

	/// The IPv6 wildcard address (`::`).
	#[must_use]
	pub const fn wildcard_v6() -> Self {
		Self(IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED))
	}

	/// The wildcard address of the same family as `self`.
	#[must_use]
	pub const fn wildcard_of_same_family(self) -> Self {
		if self.0.is_ipv4() {
			Self::wildcard_v4()
		} else {
			Self::wildcard_v6()
		}
	}

	/// Whether this address is an IPv4 address.
	#[must_use]
	pub const fn is_ipv4(self) -> bool {
		self.0.is_ipv4()
	}

	/// The underlying [`IpAddr`].
	#[must_use]
	pub const fn ip(self) -> IpAddr {
		self.0
	}

	/// Combine this address with a port into a [`SocketAddr`].
	#[must_use]
	pub const fn with_port(self, port: u16) -> SocketAddr {
		SocketAddr::new(self.0, port)
	}
}

impl From<IpAddr> for Address {
	fn from(ip: IpAddr) -> Self {
		Self(ip)
	}
}

impl Display for Address {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		Display::fmt(&self.0, f)
	}
}

/// Render a [`SocketAddr`] in the `host:port` form used throughout rinetd's
/// log records, e.g. `127.0.0.1:8080` or `[::1]:8080`.
#[must_use]
pub fn socket_addr_to_string(addr: SocketAddr) -> String {
	addr.to_string()
}
