//! Loading a configuration with a mix of valid and invalid rules starts
//! forwarders for exactly the valid ones (spec scenario 5).

use rinetd::{config::Config, daemon::Daemon};

#[tokio::test(flavor = "multi_thread")]
async fn invalid_port_rule_is_dropped_and_the_other_two_start() {
	let config = Config::from_str(
		"127.0.0.1 0/tcp 127.0.0.1 6000/tcp\n\
		 127.0.0.1 0/tcp 127.0.0.1 6001/tcp\n\
		 127.0.0.1 0/udp 127.0.0.1 6300/udp\n",
	);

	// Line 1 has local port 0, which `config::parse` rejects as out of
	// range per §3's `1..=65535` rule; lines 2 and 3 are well-formed
	// stream and datagram rules respectively and survive.
	assert_eq!(config.rules.len(), 2, "the port-0 rule must be dropped at parse time");

	let daemon = Daemon::start(config).await;
	assert_eq!(daemon.forwarder_count(), 2, "exactly the two valid rules should produce live forwarders");
	daemon.shutdown();
}
