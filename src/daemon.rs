//! Daemon lifecycle: turning a loaded [`Config`] into live forwarders, and
//! tearing them all down on shutdown.
//!
//! Grounded in `links/src/bin/server.rs`'s listener-vector pattern (`let mut
//! listeners = Vec::new(); for addr in config.listeners() { ... }`) but
//! without the file-watcher reload loop, since rinetd has no hot-reload
//! (Non-goal). Shutdown is modeled on `Listener::drop` in `links/src/server.rs`:
//! dropping a forwarder aborts its background task(s).

use std::sync::Arc;

use tracing::info;

use crate::{
	config::Config,
	forward::Forwarder,
	log::{self, LogSink},
};

/// A running daemon: every forwarder started from a loaded configuration,
/// plus the log sink they share.
pub struct Daemon {
	forwarders: Vec<Forwarder>,
	_log_sink: Option<Arc<dyn LogSink>>,
}

impl Daemon {
	/// Start one forwarder per rule in `config`. Rules whose forwarder
	/// fails to start are skipped (logged, not fatal) per §7.
	pub async fn start(config: Config) -> Self {
		let log_sink = match config.log_file.as_deref() {
			Some(path) => log::build_sink(Some(path)).await,
			None => None,
		};

		let mut forwarders = Vec::with_capacity(config.rules.len());

		for rule in config.rules {
			if let Some(forwarder) = Forwarder::start(rule, log_sink.clone()).await {
				forwarders.push(forwarder);
			}
		}

		info!(live_forwarders = forwarders.len(), "rinetd startup complete");

		Self {
			forwarders,
			_log_sink: log_sink,
		}
	}

	/// The number of forwarders currently running.
	#[must_use]
	pub fn forwarder_count(&self) -> usize {
		self.forwarders.len()
	}

	/// Stop every forwarder. Consuming `self` drops each [`Forwarder`],
	/// which aborts its background task(s) and closes its sockets.
	pub fn shutdown(self) {
		info!("rinetd shutting down");
		drop(self.forwarders);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{address::Address, config::{ListenRule, Transport}};

	#[tokio::test(flavor = "multi_thread")]
	async fn mixed_rules_yields_exactly_the_valid_forwarders() {
		let config = Config {
			rules: vec![
				ListenRule {
					transport: Transport::Stream,
					local_addr: Address::parse("127.0.0.1").unwrap(),
					local_port: 0,
					remote_addr: Address::parse("127.0.0.1").unwrap(),
					remote_port: 1,
				},
				ListenRule {
					transport: Transport::Datagram,
					local_addr: Address::parse("127.0.0.1").unwrap(),
					local_port: 0,
					remote_addr: Address::parse("127.0.0.1").unwrap(),
					remote_port: 1,
				},
			],
			log_file: None,
		};

		let daemon = Daemon::start(config).await;
		assert_eq!(daemon.forwarder_count(), 2);
		daemon.shutdown();
	}
}
