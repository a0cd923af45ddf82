//! rinetd configuration handling.
//!
//! rinetd configuration files are UTF-8, line-oriented, and use a small
//! directive grammar described in [`parse`] rather than a general-purpose
//! format like TOML or YAML (unlike the sibling `links` redirector server,
//! whose configuration is layered and structured) — this matches the
//! original `rinetd.conf` format byte for byte, see
//! `examples/original_source/src/config.cpp`.

mod parse;

use std::{
	env, fmt,
	path::{Path, PathBuf},
};

use tracing::{debug, warn};

pub use self::parse::DirectiveError;
use crate::address::Address;

/// The transport mode of a [`ListenRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
	/// Connection-oriented TCP forwarding.
	Stream,
	/// Connectionless UDP forwarding.
	Datagram,
}

impl fmt::Display for Transport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Stream => "tcp",
			Self::Datagram => "udp",
		})
	}
}

/// One forwarding rule: a transport mode plus a local and a remote endpoint.
///
/// Immutable for the daemon's lifetime; rules are parsed once at startup and
/// never mutated (rinetd has no hot-reload, see the crate's Non-goals).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenRule {
	/// Whether this rule forwards TCP streams or UDP datagrams.
	pub transport: Transport,
	/// The address this rule's listener binds to.
	pub local_addr: Address,
	/// The port this rule's listener binds to.
	pub local_port: u16,
	/// The address this rule forwards to.
	pub remote_addr: Address,
	/// The port this rule forwards to.
	pub remote_port: u16,
}

impl ListenRule {
	/// The local bind address as a human-readable `host:port` string, used in
	/// log records and diagnostics.
	#[must_use]
	pub fn local_endpoint_string(&self) -> String {
		self.local_addr.with_port(self.local_port).to_string()
	}

	/// The remote forwarding address as a human-readable `host:port` string.
	#[must_use]
	pub fn remote_endpoint_string(&self) -> String {
		self.remote_addr.with_port(self.remote_port).to_string()
	}
}

/// The fully loaded rinetd configuration: an ordered list of rules plus an
/// optional log file path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
	/// All successfully parsed and validated rules, in file order. Rules that
	/// failed to parse or validate are silently absent (see [`parse`]).
	pub rules: Vec<ListenRule>,
	/// The `logfile` directive's value, if the config file set one. The last
	/// `logfile` directive in the file wins.
	pub log_file: Option<PathBuf>,
}

impl Config {
	/// Parse a configuration from its raw text contents.
	///
	/// Per §6 of the specification, unparsable or out-of-range directives are
	/// silently dropped rather than causing the whole load to fail; this
	/// function therefore never fails on its own. Returning an empty
	/// [`Config`] (no rules) is a valid, if useless, result -- callers
	/// failing the whole daemon when zero rules survive (per §7's "Config
	/// parse/validate" policy) is the bootstrap adaptor's responsibility, not
	/// this parser's.
	#[must_use]
	pub fn from_str(text: &str) -> Self {
		let mut rules = Vec::new();
		let mut log_file = None;

		for (lineno, raw_line) in text.split(['\r', '\n']).enumerate() {
			match parse::parse_line(raw_line) {
				Ok(Some(parse::Directive::Rule(rule))) => rules.push(rule),
				Ok(Some(parse::Directive::LogFile(path))) => log_file = Some(path),
				Ok(None) => {}
				Err(err) => {
					debug!(line = lineno + 1, %err, "dropping unparsable configuration line");
				}
			}
		}

		Self { rules, log_file }
	}

	/// Load a configuration from a file path.
	///
	/// # Errors
	/// Returns an error if the file could not be read (it does not need to
	/// exist to be a valid *empty* configuration from [`from_str`]'s point of
	/// view, but it does need to exist to be read at all).
	pub fn load_from(path: &Path) -> anyhow::Result<Self> {
		let text = std::fs::read_to_string(path)
			.map_err(|err| anyhow::anyhow!("could not read configuration file {path:?}: {err}"))?;

		let config = Self::from_str(&text);
		debug!(path = ?path, rules = config.rules.len(), "configuration loaded");
		Ok(config)
	}

	/// The platform-specific default configuration file path, used when no
	/// `-c`/`--conf-file` argument is given: `/etc/rinetd.conf` on Unix,
	/// `<current directory>\rinetd.conf` on Windows, matching `read_config`
	/// in `examples/original_source/src/config.cpp`.
	#[must_use]
	pub fn default_path() -> PathBuf {
		if cfg!(windows) {
			env::current_dir()
				.unwrap_or_else(|_| PathBuf::from("."))
				.join("rinetd.conf")
		} else {
			PathBuf::from("/etc/rinetd.conf")
		}
	}

	/// Load the configuration from `path`, or from [`Config::default_path`]
	/// if `path` is `None`.
	///
	/// # Errors
	/// Returns an error under the same conditions as [`Config::load_from`].
	pub fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
		let path = path.unwrap_or_else(Self::default_path);
		let config = Self::load_from(&path)?;

		if config.rules.is_empty() {
			warn!(path = ?path, "configuration file contains no valid rules");
		}

		Ok(config)
	}
}
