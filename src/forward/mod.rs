//! Forwarders: the live objects that implement configured rules.
//!
//! A [`Forwarder`] owns exactly one rule's worth of sockets and state and is
//! driven entirely by its own background task(s); the only thing the
//! bootstrap adaptor holds onto afterwards is the handle needed to stop it.

pub mod datagram;
pub mod stream;

use std::sync::Arc;

use tracing::warn;

use crate::{config::ListenRule, log::LogSink};

/// A running forwarder for one [`ListenRule`], regardless of transport.
#[derive(Debug)]
pub enum Forwarder {
	/// A TCP stream forwarder.
	Stream(stream::StreamForwarder),
	/// A UDP datagram forwarder.
	Datagram(datagram::DatagramForwarder),
}

impl Forwarder {
	/// Start a forwarder for `rule`. Returns `None` (after logging a
	/// warning) if the listening/ingress socket could not be bound -- per
	/// §7, a bind failure marks this one forwarder inert and does not
	/// affect the others.
	pub async fn start(rule: ListenRule, log_sink: Option<Arc<dyn LogSink>>) -> Option<Self> {
		let endpoint = rule.local_endpoint_string();

		let result = match rule.transport {
			crate::config::Transport::Stream => {
				stream::StreamForwarder::start(rule, log_sink)
					.await
					.map(Self::Stream)
			}
			crate::config::Transport::Datagram => {
				datagram::DatagramForwarder::start(rule).await.map(Self::Datagram)
			}
		};

		match result {
			Ok(forwarder) => Some(forwarder),
			Err(err) => {
				warn!(%endpoint, %err, "forwarder failed to start, skipping this rule");
				None
			}
		}
	}
}
