//! The rinetd binary: CLI parsing, logging setup, configuration loading, and
//! the signal-driven run loop.
//!
//! Grounded in `links/src/bin/server.rs`'s `main()` for the overall shape
//! (a temporary startup subscriber, `pico_args::Arguments::from_env()`,
//! building a `tokio` multi-threaded runtime by hand and driving everything
//! through it) and in `examples/original_source/src/main.cpp` for the CLI
//! surface, the default config path decision, and the process-priority
//! tuning this binary carries forward on Linux.

use std::process::ExitCode;

use anyhow::Context;
use pico_args::Arguments;
use rinetd::{config::Config, daemon::Daemon, util};
use tokio::{runtime::Builder, signal};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> ExitCode {
	let subscriber = FmtSubscriber::builder()
		.with_level(true)
		.with_max_level(if cfg!(debug_assertions) {
			Level::DEBUG
		} else {
			Level::INFO
		})
		.finish();
	tracing::subscriber::set_global_default(subscriber)
		.expect("setting tracing default subscriber failed");

	let mut args = Arguments::from_env();

	if args.contains(["-h", "--help"]) {
		println!("{}", util::HELP);
		return ExitCode::SUCCESS;
	}

	if args.contains(["-v", "--version"]) {
		println!("{}", util::VERSION_BANNER);
		return ExitCode::SUCCESS;
	}

	let conf_file: Option<std::path::PathBuf> = match args.opt_value_from_str(["-c", "--conf-file"]) {
		Ok(path) => path,
		Err(err) => {
			error!(%err, "invalid -c/--conf-file argument");
			return ExitCode::from(255);
		}
	};

	adjust_process_priority();

	info!(version = util::VERSION, "rinetd starting");

	let runtime = match Builder::new_multi_thread().enable_all().build() {
		Ok(runtime) => runtime,
		Err(err) => {
			error!(%err, "failed to build async runtime");
			return ExitCode::FAILURE;
		}
	};

	match runtime.block_on(run(conf_file)) {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			error!(%err, "rinetd exiting due to configuration error");
			ExitCode::from(255)
		}
	}
}

async fn run(conf_file: Option<std::path::PathBuf>) -> anyhow::Result<()> {
	let config = Config::load(conf_file).context("while loading configuration")?;

	if config.rules.is_empty() {
		anyhow::bail!("no valid rules in configuration, nothing to forward");
	}

	let daemon = Daemon::start(config).await;

	wait_for_shutdown_signal().await;

	daemon.shutdown();
	info!("rinetd stopped");
	Ok(())
}

/// Waits for either Ctrl-C or, on Unix, `SIGTERM`. `SIGHUP` is deliberately
/// not registered: rinetd has no hot-reload to trigger, and treating it as
/// a terminate signal would diverge from the original's `do_signal`, which
/// special-cases `SIGHUP` as a no-op.
async fn wait_for_shutdown_signal() {
	#[cfg(unix)]
	{
		let mut terminate = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(stream) => stream,
			Err(err) => {
				error!(%err, "failed to install SIGTERM handler, waiting on Ctrl-C only");
				let _ = signal::ctrl_c().await;
				return;
			}
		};

		tokio::select! {
			_ = signal::ctrl_c() => {}
			_ = terminate.recv() => {}
		}
	}

	#[cfg(not(unix))]
	{
		let _ = signal::ctrl_c().await;
	}
}

/// Best-effort protection against the OOM killer, the externally visible
/// half of the original's `adjust_2_max_priority` (see
/// `examples/original_source/src/main.cpp`). The original writes `-17` to
/// the legacy `/proc/<pid>/oom_adj`; this writes the modern equivalent,
/// `/proc/self/oom_score_adj`, to its most-protected value. Failure is
/// logged and ignored -- a container or restricted environment may not
/// allow this write, and rinetd should still run.
#[cfg(target_os = "linux")]
fn adjust_process_priority() {
	if let Err(err) = std::fs::write("/proc/self/oom_score_adj", "-1000") {
		tracing::debug!(%err, "could not adjust oom_score_adj, continuing without it");
	}
}

#[cfg(not(target_os = "linux"))]
const fn adjust_process_priority() {}
