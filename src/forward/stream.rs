//! TCP stream forwarding: the acceptor (§4.1) and the per-connection state
//! machine (§4.2).
//!
//! Grounded in `Listener`/`Acceptor` in `links/src/server.rs` for the overall
//! shape (a socket bound with `socket2`, handed to a `tokio::net::TcpListener`,
//! driven by a spawned accept loop whose `JoinHandle` is aborted on drop) and
//! in `examples/original_source/src/tcp_forward.hpp` for the connection state
//! machine itself (`OPENING -> CONNECTING -> RELAYING -> CLOSED`, the 5 s
//! connect timer, and the `syn`/`open` log records).

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use socket2::{Domain, SockRef, Socket, Type};
use tokio::{
	net::{TcpListener, TcpSocket, TcpStream},
	task::JoinHandle,
	time::timeout,
};
use tracing::{debug, trace, warn};

use crate::{
	config::ListenRule,
	log::{format_record, EventKind, LogSink},
	socket::{enable_tcp_fast_open_connect, enable_tcp_fast_open_listen, local_addr_or_v4_fallback, tune_common},
	util::{CONNECT_TIMEOUT_SECS, LISTEN_BACKLOG, STREAM_BUFFER_SIZE},
};

/// A running TCP forwarder for one rule: a bound listener plus an accept
/// loop that spawns one [`Connection`] per accepted socket.
///
/// Connections are not tracked in this struct -- each is an independent
/// spawned task that owns its own sockets and tears itself down. Dropping a
/// `StreamForwarder` aborts the accept loop (so no new Connections are
/// created) but does not reach into already-spawned Connections, matching
/// §4.1's "existing Connections proceed independently".
#[derive(Debug)]
pub struct StreamForwarder {
	rule: ListenRule,
	local_addr: SocketAddr,
	accept_loop: JoinHandle<()>,
}

impl StreamForwarder {
	/// Bind the listener for `rule` and start accepting connections.
	///
	/// # Errors
	/// Returns an error if the listening socket could not be created,
	/// tuned, bound, or set to listen.
	pub async fn start(rule: ListenRule, log_sink: Option<Arc<dyn LogSink>>) -> io::Result<Self> {
		let bind_addr = rule.local_addr.with_port(rule.local_port);

		let socket = Socket::new(Domain::for_address(bind_addr), Type::STREAM, None)?;
		socket.set_reuse_address(true)?;
		socket.set_nonblocking(true)?;
		tune_common(SockRef::from(&socket), bind_addr);
		enable_tcp_fast_open_listen(SockRef::from(&socket));
		socket.bind(&bind_addr.into())?;
		socket.listen(LISTEN_BACKLOG)?;

		let local_addr = socket
			.local_addr()?
			.as_socket()
			.unwrap_or(bind_addr);

		let listener = TcpListener::from_std(socket.into())?;
		debug!(%local_addr, transport = "tcp", "forwarder listening");

		let accept_rule = rule.clone();
		let accept_loop = tokio::spawn(accept_loop(listener, accept_rule, log_sink));

		Ok(Self {
			rule,
			local_addr,
			accept_loop,
		})
	}

	/// The rule this forwarder implements.
	#[must_use]
	pub const fn rule(&self) -> &ListenRule {
		&self.rule
	}

	/// The listener's actual bound local address. Differs from
	/// `rule().local_port` when the rule requested an ephemeral port (0),
	/// which is how tests bind without colliding on a fixed port.
	#[must_use]
	pub const fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}
}

impl Drop for StreamForwarder {
	fn drop(&mut self) {
		self.accept_loop.abort();
	}
}

async fn accept_loop(listener: TcpListener, rule: ListenRule, log_sink: Option<Arc<dyn LogSink>>) {
	loop {
		match listener.accept().await {
			Ok((stream, source_endpoint)) => {
				trace!(%source_endpoint, "accepted connection");
				let rule = rule.clone();
				let log_sink = log_sink.clone();
				tokio::spawn(async move {
					Connection::run(stream, source_endpoint, rule, log_sink).await;
				});
			}
			Err(err) => {
				warn!(%err, "error accepting stream connection");
			}
		}
	}
}

/// One accepted stream flow: the ingress socket, an egress socket connected
/// to the rule's remote endpoint, and the full-duplex relay between them.
///
/// There is no persistent `Connection` value -- the state machine of §4.2 is
/// expressed directly as the control flow of [`Connection::run`], since each
/// state transition here is a point of no return (there is no going back to
/// `OPENING` from `CONNECTING`, etc).
struct Connection;

impl Connection {
	async fn run(
		ingress: TcpStream,
		source_endpoint: SocketAddr,
		rule: ListenRule,
		log_sink: Option<Arc<dyn LogSink>>,
	) {
		tune_common(SockRef::from(&ingress), rule.local_addr.with_port(rule.local_port));

		let remote_addr = rule.remote_addr.with_port(rule.remote_port);

		let egress_socket = match if remote_addr.is_ipv4() {
			TcpSocket::new_v4()
		} else {
			TcpSocket::new_v6()
		} {
			Ok(socket) => socket,
			Err(err) => {
				warn!(%err, "could not create egress socket");
				return;
			}
		};

		tune_common(SockRef::from(&egress_socket), remote_addr);
		enable_tcp_fast_open_connect(SockRef::from(&egress_socket));

		log_record(&log_sink, EventKind::Syn, &rule, source_endpoint, remote_addr).await;

		let connect = timeout(
			Duration::from_secs(CONNECT_TIMEOUT_SECS),
			egress_socket.connect(remote_addr),
		);

		let egress = match connect.await {
			Ok(Ok(stream)) => stream,
			Ok(Err(err)) => {
				trace!(%source_endpoint, %remote_addr, %err, "egress connect failed");
				return;
			}
			Err(_elapsed) => {
				trace!(%source_endpoint, %remote_addr, "egress connect timed out");
				return;
			}
		};

		let nat_addr = local_addr_or_v4_fallback(SockRef::from(&egress));
		log_record(&log_sink, EventKind::Open, &rule, source_endpoint, nat_addr).await;

		relay(ingress, egress).await;
	}
}

async fn log_record(
	log_sink: &Option<Arc<dyn LogSink>>,
	kind: EventKind,
	rule: &ListenRule,
	source_endpoint: SocketAddr,
	egress_local_or_remote: SocketAddr,
) {
	let Some(sink) = log_sink else { return };

	let record = format_record(
		kind,
		source_endpoint,
		&rule.remote_endpoint_string(),
		egress_local_or_remote,
		&rule.local_endpoint_string(),
	);
	sink.write_record(&record).await;
}

/// Full-duplex relay between two already-connected sockets (§4.2's
/// "Relaying" state). Each direction is an independently spawned task with
/// its own 16384-byte buffer; the first direction to hit EOF or an error
/// tears down both.
async fn relay(ingress: TcpStream, egress: TcpStream) {
	let (ingress_read, ingress_write) = ingress.into_split();
	let (egress_read, egress_write) = egress.into_split();

	let mut forward = tokio::spawn(pump(ingress_read, egress_write));
	let mut backward = tokio::spawn(pump(egress_read, ingress_write));

	tokio::select! {
		_ = &mut forward => {
			backward.abort();
			let _ = backward.await;
		}
		_ = &mut backward => {
			forward.abort();
			let _ = forward.await;
		}
	}
}

async fn pump(
	mut read_half: tokio::net::tcp::OwnedReadHalf,
	mut write_half: tokio::net::tcp::OwnedWriteHalf,
) {
	use tokio::io::{AsyncReadExt, AsyncWriteExt};

	let mut buf = vec![0_u8; STREAM_BUFFER_SIZE];

	loop {
		let bytes = match read_half.read(&mut buf).await {
			Ok(0) | Err(_) => break,
			Ok(n) => n,
		};

		if write_half.write_all(&buf[..bytes]).await.is_err() {
			break;
		}
	}

	let _ = write_half.shutdown().await;
}
