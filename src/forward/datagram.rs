//! UDP datagram forwarding: the per-rule NAT table (§4.3) and its aging
//! sweep.
//!
//! Grounded in `examples/original_source/src/udp_forward.hpp`'s
//! `udp_forward`/`udp_tunnel` pair for the overall shape (one ingress socket
//! shared by all sources, one ephemeral egress socket per observed source,
//! a periodic sweep evicting idle tunnels) and in `links/src/server.rs`'s
//! `Listener` for the Rust idiom of owning a background task via a
//! `JoinHandle` that is aborted on drop.

use std::{collections::HashMap, io, net::SocketAddr, sync::Arc, time::Duration};

use socket2::{Domain, SockRef, Socket, Type};
use tokio::{
	net::UdpSocket,
	sync::Mutex,
	task::JoinHandle,
	time::{self, Instant},
};
use tracing::{debug, trace, warn};

use crate::{
	config::ListenRule,
	socket::tune_common,
	util::{AGING_SWEEP_INTERVAL_SECS, DATAGRAM_BUFFER_SIZE, DATAGRAM_IDLE_TIMEOUT_SECS},
};

/// One NAT-table entry: an ephemeral egress socket and the last time
/// traffic was observed from its source, in either direction.
#[derive(Debug)]
struct TunnelEntry {
	socket: Arc<UdpSocket>,
	egress_task: JoinHandle<()>,
	last_activity: Instant,
}

/// Whether a tunnel's `last_activity` makes it eligible for eviction at
/// `now` (§4.3's aging sweep condition).
///
/// Because `last_activity` and `now` are both drawn from the same monotonic
/// clock ([`Instant`]), the original's "`last_activity_ms > now`" backwards-
/// clock guard is structurally unreachable here and is intentionally
/// omitted -- see the crate's design notes.
fn is_aged_out(last_activity: Instant, now: Instant) -> bool {
	now.saturating_duration_since(last_activity) >= Duration::from_secs(DATAGRAM_IDLE_TIMEOUT_SECS)
}

/// A running UDP forwarder for one rule.
#[derive(Debug)]
pub struct DatagramForwarder {
	rule: ListenRule,
	local_addr: SocketAddr,
	tunnels: Arc<Mutex<HashMap<String, TunnelEntry>>>,
	ingress_task: JoinHandle<()>,
	aging_task: JoinHandle<()>,
}

impl DatagramForwarder {
	/// Bind the ingress socket for `rule` and start forwarding.
	///
	/// # Errors
	/// Returns an error if the ingress socket could not be created, tuned,
	/// or bound.
	pub async fn start(rule: ListenRule) -> io::Result<Self> {
		let bind_addr = rule.local_addr.with_port(rule.local_port);

		let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, None)?;
		socket.set_reuse_address(true)?;
		socket.set_nonblocking(true)?;
		tune_common(SockRef::from(&socket), bind_addr);
		socket.bind(&bind_addr.into())?;

		let local_addr = socket.local_addr()?.as_socket().unwrap_or(bind_addr);
		let ingress = Arc::new(UdpSocket::from_std(socket.into())?);
		debug!(%local_addr, transport = "udp", "forwarder listening");

		let tunnels: Arc<Mutex<HashMap<String, TunnelEntry>>> = Arc::new(Mutex::new(HashMap::new()));

		let ingress_task = tokio::spawn(ingress_loop(
			Arc::clone(&ingress),
			rule.clone(),
			Arc::clone(&tunnels),
		));
		let aging_task = tokio::spawn(aging_loop(Arc::clone(&tunnels)));

		Ok(Self {
			rule,
			local_addr,
			tunnels,
			ingress_task,
			aging_task,
		})
	}

	/// The rule this forwarder implements.
	#[must_use]
	pub const fn rule(&self) -> &ListenRule {
		&self.rule
	}

	/// The ingress socket's actual bound local address.
	#[must_use]
	pub const fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}

	/// The number of live NAT-table entries (Tunnels) right now. Exposed for
	/// tests exercising §8's "Tunnel count for the rule becomes N" and aging
	/// properties; the forwarding path itself never needs its own count.
	pub async fn tunnel_count(&self) -> usize {
		self.tunnels.lock().await.len()
	}
}

impl Drop for DatagramForwarder {
	fn drop(&mut self) {
		self.ingress_task.abort();
		self.aging_task.abort();
	}
}

async fn ingress_loop(
	ingress: Arc<UdpSocket>,
	rule: ListenRule,
	tunnels: Arc<Mutex<HashMap<String, TunnelEntry>>>,
) {
	let mut buf = vec![0_u8; DATAGRAM_BUFFER_SIZE];
	let remote_addr = rule.remote_addr.with_port(rule.remote_port);

	loop {
		let (len, source) = match ingress.recv_from(&mut buf).await {
			Ok(pair) => pair,
			Err(err) => {
				warn!(%err, "error receiving ingress datagram");
				continue;
			}
		};

		if len == 0 {
			continue;
		}

		let key = source.to_string();

		// Looked up and, if necessary, created without holding the table
		// lock across the `.await` inside `open_tunnel` -- `ingress_loop`
		// only ever processes one datagram at a time, so there is no
		// concurrent writer to race against between the lookup and the
		// later update/removal below.
		let existing = tunnels.lock().await.get(&key).map(|entry| Arc::clone(&entry.socket));

		let egress_socket = match existing {
			Some(socket) => socket,
			None => match open_tunnel(&rule, source, Arc::clone(&ingress), Arc::clone(&tunnels), key.clone()).await {
				Some(socket) => socket,
				None => continue,
			},
		};

		match egress_socket.send_to(&buf[..len], remote_addr).await {
			Ok(_) => {
				if let Some(entry) = tunnels.lock().await.get_mut(&key) {
					entry.last_activity = Instant::now();
				}
			}
			Err(err) if is_fatal_send_error(&err) => {
				trace!(%key, %err, "fatal send error, aborting tunnel");
				if let Some(entry) = tunnels.lock().await.remove(&key) {
					entry.egress_task.abort();
				}
			}
			Err(err) => {
				trace!(%key, %err, "transient send error, dropping datagram");
			}
		}
	}
}

/// Create and register a new tunnel for `source`, returning its egress
/// socket on success. Returns `None` (dropping the triggering datagram) if
/// the tunnel could not be created, per §4.3.
async fn open_tunnel(
	rule: &ListenRule,
	source: SocketAddr,
	ingress: Arc<UdpSocket>,
	tunnels: Arc<Mutex<HashMap<String, TunnelEntry>>>,
	key: String,
) -> Option<Arc<UdpSocket>> {
	let wildcard = rule.remote_addr.wildcard_of_same_family().with_port(0);

	let socket = Socket::new(Domain::for_address(wildcard), Type::DGRAM, None).ok()?;
	socket.set_nonblocking(true).ok()?;
	tune_common(SockRef::from(&socket), wildcard);
	socket.bind(&wildcard.into()).ok()?;

	let egress = Arc::new(UdpSocket::from_std(socket.into()).ok()?);
	trace!(%source, "opened new datagram tunnel");

	let egress_task = tokio::spawn(egress_loop(Arc::clone(&egress), ingress, source, key.clone(), Arc::clone(&tunnels)));

	let socket_handle = Arc::clone(&egress);
	tunnels.lock().await.insert(
		key,
		TunnelEntry {
			socket: egress,
			egress_task,
			last_activity: Instant::now(),
		},
	);

	Some(socket_handle)
}

/// The reverse direction of a tunnel: anything received on the egress
/// socket is forwarded back to the original source, unconditionally (§4.3's
/// "effectively symmetric NAT state, not a firewall" note).
async fn egress_loop(
	egress: Arc<UdpSocket>,
	ingress: Arc<UdpSocket>,
	source: SocketAddr,
	key: String,
	tunnels: Arc<Mutex<HashMap<String, TunnelEntry>>>,
) {
	let mut buf = vec![0_u8; DATAGRAM_BUFFER_SIZE];

	loop {
		let len = match egress.recv(&mut buf).await {
			Ok(len) => len,
			Err(err) if is_fatal_send_error(&err) => {
				trace!(%key, %err, "fatal receive error, tunnel ending");
				tunnels.lock().await.remove(&key);
				return;
			}
			Err(_) => continue,
		};

		match ingress.send_to(&buf[..len], source).await {
			Ok(_) => {
				if let Some(entry) = tunnels.lock().await.get_mut(&key) {
					entry.last_activity = Instant::now();
				}
			}
			Err(err) => trace!(%key, %err, "transient error replying to source"),
		}
	}
}

async fn aging_loop(tunnels: Arc<Mutex<HashMap<String, TunnelEntry>>>) {
	let mut ticker = time::interval(Duration::from_secs(AGING_SWEEP_INTERVAL_SECS));
	ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

	loop {
		ticker.tick().await;
		let now = Instant::now();
		let mut table = tunnels.lock().await;

		let expired: Vec<String> = table
			.iter()
			.filter(|(_, entry)| is_aged_out(entry.last_activity, now))
			.map(|(key, _)| key.clone())
			.collect();

		for key in expired {
			if let Some(entry) = table.remove(&key) {
				trace!(%key, "evicting idle tunnel");
				entry.egress_task.abort();
			}
		}
	}
}

/// Classify a send/receive error per §4.3: only the socket-fatal `errno`
/// set named there (`EBADF`, `ENOENT`, `ENOTSOCK`, `ENODEV`, `EIO`,
/// `ENETDOWN`, `ENETUNREACH`, `EHOSTDOWN`, `EHOSTUNREACH`) aborts the
/// tunnel; everything else, including `EACCES`/`EPERM` and `EPIPE`, is
/// transient and just drops the datagram.
fn is_fatal_send_error(err: &io::Error) -> bool {
	matches!(err.kind(), io::ErrorKind::NotFound)
		|| matches!(err.raw_os_error(), Some(errno) if is_fatal_errno(errno))
}

#[cfg(target_os = "linux")]
fn is_fatal_errno(errno: i32) -> bool {
	matches!(
		errno,
		libc::EBADF
			| libc::ENOENT
			| libc::ENOTSOCK
			| libc::ENODEV
			| libc::EIO
			| libc::ENETDOWN
			| libc::ENETUNREACH
			| libc::EHOSTDOWN
			| libc::EHOSTUNREACH
	)
}

#[cfg(not(target_os = "linux"))]
const fn is_fatal_errno(_errno: i32) -> bool {
	false
}
