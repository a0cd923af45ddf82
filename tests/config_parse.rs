//! End-to-end configuration loading: a realistic `rinetd.conf`-shaped file
//! on disk, read through `Config::load_from`, produces the rules and log
//! path a human author of that file would expect.

use std::path::PathBuf;

use rinetd::config::{Config, Transport};

fn write_temp_conf(name: &str, contents: &str) -> PathBuf {
	let path = std::env::temp_dir().join(format!("rinetd-config-parse-test-{name}.conf"));
	std::fs::write(&path, contents).unwrap();
	path
}

#[test]
fn loads_stream_datagram_and_logfile_directives_from_a_real_file() {
	let path = write_temp_conf(
		"full",
		"# forward a web app and a game server\n\
		 127.0.0.1 5000/tcp 127.0.0.1 6000/tcp\n\
		 127.0.0.1 5300/udp 127.0.0.1 6300/udp # udp telemetry relay\n\
		 logfile /tmp/rinetd-config-parse-test.log\n",
	);

	let config = Config::load_from(&path).expect("well-formed file should load");

	assert_eq!(config.rules.len(), 2);
	assert_eq!(config.rules[0].transport, Transport::Stream);
	assert_eq!(config.rules[0].local_port, 5000);
	assert_eq!(config.rules[1].transport, Transport::Datagram);
	assert_eq!(config.rules[1].local_port, 5300);
	assert_eq!(
		config.log_file,
		Some(PathBuf::from("/tmp/rinetd-config-parse-test.log"))
	);

	std::fs::remove_file(&path).ok();
}

#[test]
fn missing_file_is_an_error_not_an_empty_config() {
	let path = std::env::temp_dir().join("rinetd-config-parse-test-does-not-exist.conf");
	std::fs::remove_file(&path).ok();

	let result = Config::load_from(&path);
	assert!(result.is_err(), "a missing config file must surface as an error, per scenario 6");
}
