//! The rinetd configuration directive grammar.
//!
//! Grounded directly in `parse_config` in
//! `examples/original_source/src/config.cpp`: each line is reduced to a
//! comment-stripped, trimmed string, then matched against three directive
//! shapes (`.../tcp`, `.../udp`, `logfile ...`). Anything else -- including a
//! line that looks almost right -- is silently dropped, matching the
//! original's behavior of simply `continue`-ing past sscanf failures.

use std::path::PathBuf;

use crate::{
	address::{Address, AddressParseError},
	config::{ListenRule, Transport},
};

/// An error describing why a configuration line did not become a directive.
///
/// The caller (`Config::from_str`) treats every variant identically (drop the
/// line, keep going, per §7 of the specification); the distinction exists so
/// configuration-loading tests can assert on *why* a line was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectiveError {
	/// The line did not match the shape of any recognized directive.
	#[error("line did not match any recognized directive")]
	Unrecognized,
	/// A port number fell outside the valid `1..=65535` range.
	#[error("port {0} is outside the valid 1..=65535 range")]
	PortOutOfRange(u32),
	/// A host token was not a valid address.
	#[error("invalid host address: {0}")]
	InvalidAddress(#[from] AddressParseError),
}

/// A single parsed directive.
pub(super) enum Directive {
	/// A `.../tcp` or `.../udp` forwarding rule.
	Rule(ListenRule),
	/// A `logfile <path>` directive.
	LogFile(PathBuf),
}

/// Parse one configuration line.
///
/// Returns `Ok(None)` for blank or comment-only lines, `Ok(Some(directive))`
/// for a recognized and valid directive, and `Err` for anything else (which
/// the caller drops, per the policy in §7 of the specification).
pub(super) fn parse_line(raw_line: &str) -> Result<Option<Directive>, DirectiveError> {
	let line = strip_comment(raw_line).trim();

	if line.is_empty() {
		return Ok(None);
	}

	let tokens: Vec<&str> = line.split_whitespace().collect();

	if tokens.first() == Some(&"logfile") {
		return match tokens.get(1) {
			Some(path) if !path.is_empty() => Ok(Some(Directive::LogFile(PathBuf::from(*path)))),
			_ => Err(DirectiveError::Unrecognized),
		};
	}

	if tokens.len() < 4 {
		return Err(DirectiveError::Unrecognized);
	}

	let local = port_and_suffix(tokens[1]).ok_or(DirectiveError::Unrecognized)?;
	let remote = port_and_suffix(tokens[3]).ok_or(DirectiveError::Unrecognized)?;

	let transport = match (local.1, remote.1) {
		("tcp", "tcp") => Transport::Stream,
		("udp", "udp") => Transport::Datagram,
		_ => return Err(DirectiveError::Unrecognized),
	};

	let local_port = validate_port(local.0)?;
	let remote_port = validate_port(remote.0)?;

	let local_addr = Address::parse(tokens[0])?;
	let remote_addr = Address::parse(tokens[2])?;

	Ok(Some(Directive::Rule(ListenRule {
		transport,
		local_addr,
		local_port,
		remote_addr,
		remote_port,
	})))
}

/// Strip a `#` comment from a line. A `#` as the first character comments out
/// the whole line; elsewhere, it truncates the line at that column.
fn strip_comment(line: &str) -> &str {
	match line.find('#') {
		Some(0) => "",
		Some(idx) => &line[..idx],
		None => line,
	}
}

/// Split a `<digits>/<suffix>` token, e.g. `"8080/tcp"` -> `(8080, "tcp")`.
fn port_and_suffix(token: &str) -> Option<(u32, &str)> {
	let (digits, suffix) = token.split_once('/')?;

	if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
		return None;
	}

	digits.parse::<u32>().ok().map(|port| (port, suffix))
}

fn validate_port(port: u32) -> Result<u16, DirectiveError> {
	if port == 0 || port > 65535 {
		return Err(DirectiveError::PortOutOfRange(port));
	}

	Ok(port as u16)
}
