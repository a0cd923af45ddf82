//! Miscellaneous statics and constants used throughout rinetd.

/// Size of each of a stream [`Connection`][crate::forward::stream::Connection]'s
/// two I/O buffers.
pub const STREAM_BUFFER_SIZE: usize = 16384;

/// Size of a [`DatagramForwarder`][crate::forward::datagram::DatagramForwarder]'s
/// shared receive buffer.
pub const DATAGRAM_BUFFER_SIZE: usize = 65535;

/// TCP listen backlog applied to every stream acceptor.
pub const LISTEN_BACKLOG: i32 = 511;

/// Seconds of inactivity after which a datagram Tunnel is aged out.
pub const DATAGRAM_IDLE_TIMEOUT_SECS: u64 = 72;

/// Interval at which a [`DatagramForwarder`][crate::forward::datagram::DatagramForwarder]
/// sweeps its NAT table for idle Tunnels.
pub const AGING_SWEEP_INTERVAL_SECS: u64 = 10;

/// Hard deadline for a stream Connection's egress `connect()`.
pub const CONNECT_TIMEOUT_SECS: u64 = 5;

/// `IP_TOS` value applied to IPv4 sockets ("prioritized interactive"),
/// preserved for compatibility with the original `rinetd`.
pub const IPV4_TOS: u32 = 0x68;

/// A string representation of this crate's version. In debug builds, this is
/// in the form of `[full semver crate version]+debug`. In release builds
/// this gets shortened to `MAJOR.MINOR`.
pub const VERSION: &str = if cfg!(debug_assertions) {
	concat!(env!("CARGO_PKG_VERSION"), "+debug")
} else {
	concat!(
		env!("CARGO_PKG_VERSION_MAJOR"),
		".",
		env!("CARGO_PKG_VERSION_MINOR")
	)
};

/// The version banner printed by `-v`/`--version`, matching the original
/// `rinetd` binary's output exactly.
pub const VERSION_BANNER: &str = "rinetd 0.73 by supersocksr";

/// Help text printed by `-h`/`--help`.
pub const HELP: &str = r#"Usage: rinetd [OPTION]
  -c, --conf-file FILE   read configuration from FILE
  -h, --help             display this help
  -v, --version          display version number

Most options are controlled through the
configuration file. See the rinetd(8)
manpage for more information.
"#;
