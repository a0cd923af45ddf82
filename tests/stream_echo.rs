//! End-to-end stream forwarding: a client talks to rinetd, rinetd relays to
//! a loopback echo server, and the bytes come back unchanged.

use std::net::Ipv4Addr;

use rinetd::{
	address::Address,
	config::{ListenRule, Transport},
	forward::Forwarder,
	log,
};
use tokio::{
	io::{AsyncReadExt, AsyncWriteExt},
	net::{TcpListener, TcpStream},
};

async fn spawn_echo_server() -> std::net::SocketAddr {
	let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
	let addr = listener.local_addr().unwrap();

	tokio::spawn(async move {
		if let Ok((mut stream, _)) = listener.accept().await {
			let mut buf = [0_u8; 1024];
			while let Ok(n) = stream.read(&mut buf).await {
				if n == 0 || stream.write_all(&buf[..n]).await.is_err() {
					break;
				}
			}
		}
	});

	addr
}

#[tokio::test(flavor = "multi_thread")]
async fn client_receives_its_own_bytes_back_through_the_forwarder() {
	let remote = spawn_echo_server().await;

	let rule = ListenRule {
		transport: Transport::Stream,
		local_addr: Address::parse("127.0.0.1").unwrap(),
		local_port: 0,
		remote_addr: Address::parse(&remote.ip().to_string()).unwrap(),
		remote_port: remote.port(),
	};

	let forwarder = Forwarder::start(rule, None)
		.await
		.expect("forwarder should start on an ephemeral port");

	let Forwarder::Stream(stream_forwarder) = &forwarder else {
		panic!("expected a stream forwarder");
	};
	let local_addr = stream_forwarder.local_addr();

	let mut client = TcpStream::connect(local_addr).await.unwrap();
	client.write_all(b"hello").await.unwrap();
	client.shutdown().await.unwrap();

	let mut received = Vec::new();
	client.read_to_end(&mut received).await.unwrap();
	assert_eq!(received, b"hello");
}

/// Spec scenario 1: the log must contain one `syn` and one `open` line
/// naming the configured remote and the configured listener endpoint.
#[tokio::test(flavor = "multi_thread")]
async fn completed_connection_logs_one_syn_and_one_open_line() {
	let remote = spawn_echo_server().await;
	let log_path = std::env::temp_dir().join(format!(
		"rinetd-stream-echo-log-test-{:?}.log",
		std::thread::current().id()
	));
	let _ = tokio::fs::remove_file(&log_path).await;

	let rule = ListenRule {
		transport: Transport::Stream,
		local_addr: Address::parse("127.0.0.1").unwrap(),
		local_port: 0,
		remote_addr: Address::parse(&remote.ip().to_string()).unwrap(),
		remote_port: remote.port(),
	};
	let configured_remote = rule.remote_endpoint_string();
	// Captured before the rule is moved into the forwarder: column 6 of a
	// log record is the rule's *configured* listener endpoint (§4.5), which
	// for an ephemeral (port 0) rule differs from the socket's actual bound
	// port reported by `local_addr()` below.
	let configured_local = rule.local_endpoint_string();

	let sink = log::build_sink(Some(&log_path)).await;
	let forwarder = Forwarder::start(rule, sink)
		.await
		.expect("forwarder should start on an ephemeral port");
	let Forwarder::Stream(stream_forwarder) = &forwarder else {
		panic!("expected a stream forwarder");
	};
	let local_addr = stream_forwarder.local_addr();

	let mut client = TcpStream::connect(local_addr).await.unwrap();
	client.write_all(b"hello").await.unwrap();
	let mut buf = [0_u8; 5];
	client.read_exact(&mut buf).await.unwrap();
	drop(client);

	// Give the (non-blocking, background-threaded) log writer a moment to
	// drain before reading the file back.
	tokio::time::sleep(std::time::Duration::from_millis(100)).await;
	drop(forwarder);

	let contents = tokio::fs::read_to_string(&log_path).await.unwrap();
	let lines: Vec<&str> = contents.lines().filter(|line| !line.is_empty()).collect();

	assert_eq!(lines.len(), 2, "exactly one syn and one open record: {contents:?}");
	assert!(lines[0].contains("syn"), "first record should be the syn transition: {lines:?}");
	assert!(lines[1].contains("open"), "second record should be the open transition: {lines:?}");
	assert!(lines[0].contains(&configured_remote), "{lines:?}");
	assert!(lines[0].contains(&configured_local), "{lines:?}");
	assert!(lines[1].contains(&configured_remote), "{lines:?}");
	assert!(lines[1].contains(&configured_local), "{lines:?}");

	let _ = tokio::fs::remove_file(&log_path).await;
}
