//! The stream-forwarding event log (§4.5/§4.6).
//!
//! This is a data-plane artifact, separate from the `tracing` control-plane
//! output emitted elsewhere in the crate: it is the `rinetd.log`-format
//! record of every `syn`/`open` transition, meant to be parsed by operators
//! the way the original's `write_log`/`open_log` pair in
//! `examples/original_source/src/config.cpp` produces it.

use std::{io::Write as _, net::SocketAddr, path::Path, sync::Arc};

use async_trait::async_trait;
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};
use tokio::{io::AsyncWriteExt, sync::Mutex};
use tracing::trace;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};

const TIMESTAMP_FORMAT: &[FormatItem<'_>] =
	format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// The kind of stream-forwarding event a log record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
	/// Emitted on the `OPENING -> CONNECTING` transition.
	Syn,
	/// Emitted on the `CONNECTING -> RELAYING` transition.
	Open,
}

impl EventKind {
	/// The 5-character, space-padded column 2 value.
	const fn padded(self) -> &'static str {
		match self {
			Self::Syn => "syn  ",
			Self::Open => "open ",
		}
	}
}

/// Render one log record (§4.5), not including the `[timestamp]` prefix or
/// line terminator -- those are added by the sink, since they depend on the
/// moment of the actual write, not of record construction.
///
/// Column widths follow `examples/original_source/src/tcp_forward.hpp`'s
/// `wirte_log`: columns 3 and 5 (the configured remote, and the egress
/// socket's local endpoint) are always padded to 46 characters regardless of
/// family. Column 1 (the original source endpoint) is padded to 21 for an
/// IPv4 source and 46 for an IPv6 source, per the specification's explicit
/// column-1 rule, which is more specific than the original (the original
/// pads column 1 to a fixed 21, having only ever been run against IPv4
/// listeners).
#[must_use]
pub fn format_record(
	kind: EventKind,
	source_endpoint: SocketAddr,
	configured_remote: &str,
	nat_endpoint: SocketAddr,
	configured_local: &str,
) -> String {
	let column1_width = if source_endpoint.is_ipv4() { 21 } else { 46 };

	format!(
		"{:<c1$}{}{:<46}nat {:<46}{}",
		source_endpoint.to_string(),
		kind.padded(),
		configured_remote,
		nat_endpoint.to_string(),
		configured_local,
		c1 = column1_width,
	)
}

fn bracket_with_timestamp(record: &str) -> String {
	let now = OffsetDateTime::now_utc();
	let stamp = now
		.format(TIMESTAMP_FORMAT)
		.unwrap_or_else(|_| "0000-00-00 00:00:00".to_owned());
	format!("[{stamp}]{record}\r\n")
}

/// Abstracts the two log-write modes of §4.6.
///
/// Both implementations are best-effort: a write failure is logged via
/// `tracing` and otherwise swallowed, since the specification requires that
/// log-write failure never affect the forwarding path.
#[async_trait]
pub trait LogSink: std::fmt::Debug + Send + Sync {
	/// Append one already-formatted record (without timestamp or
	/// terminator) to the sink.
	async fn write_record(&self, record: &str);
}

/// A sink that opens, appends to, and closes the log file around every
/// write. Used when no persistent descriptor could be obtained at startup.
#[derive(Debug)]
pub struct PerWriteFileSink {
	path: std::path::PathBuf,
}

impl PerWriteFileSink {
	#[must_use]
	pub fn new(path: impl AsRef<Path>) -> Self {
		Self {
			path: path.as_ref().to_path_buf(),
		}
	}
}

#[async_trait]
impl LogSink for PerWriteFileSink {
	async fn write_record(&self, record: &str) {
		let line = bracket_with_timestamp(record);

		let result = async {
			let mut file = tokio::fs::OpenOptions::new()
				.create(true)
				.append(true)
				.open(&self.path)
				.await?;
			file.write_all(line.as_bytes()).await?;
			file.flush().await
		}
		.await;

		if let Err(err) = result {
			trace!(path = ?self.path, %err, "failed to write log record");
		}
	}
}

/// A sink backed by a long-lived, already-open file descriptor, opened in
/// append mode at construction so every write lands at end-of-file without a
/// separate seek. Writes go through a [`tracing_appender`] non-blocking
/// writer: `write_record`'s caller never waits on the actual disk I/O, only
/// on a channel send to the writer's background thread, which is what §4.6
/// means by "non-blocking asynchronous append" for this mode. Serialized by
/// an internal mutex since multiple Connections may log concurrently and
/// `NonBlocking`'s `Write` impl takes `&mut self`.
pub struct PersistentDescriptorSink {
	writer: Mutex<NonBlocking>,
	// Dropping this stops the background flush thread, so it must live as
	// long as the sink does even though nothing ever reads it directly.
	_guard: WorkerGuard,
}

impl std::fmt::Debug for PersistentDescriptorSink {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PersistentDescriptorSink").finish_non_exhaustive()
	}
}

impl PersistentDescriptorSink {
	/// Open `path` for append. Returns `None` if the path could not be
	/// opened, in which case the caller should fall back to
	/// [`PerWriteFileSink`].
	pub async fn open(path: impl AsRef<Path>) -> Option<Self> {
		let path = path.as_ref().to_path_buf();
		let file = tokio::task::spawn_blocking(move || {
			std::fs::OpenOptions::new().create(true).append(true).open(&path)
		})
		.await
		.ok()?
		.ok()?;

		let (writer, guard) = tracing_appender::non_blocking(file);
		Some(Self {
			writer: Mutex::new(writer),
			_guard: guard,
		})
	}
}

#[async_trait]
impl LogSink for PersistentDescriptorSink {
	async fn write_record(&self, record: &str) {
		let line = bracket_with_timestamp(record);
		let mut writer = self.writer.lock().await;

		if let Err(err) = writer.write_all(line.as_bytes()) {
			trace!(%err, "failed to write log record");
		}
	}
}

/// Build the log sink for a loaded configuration's `log_file`, if any,
/// preferring a persistent descriptor and falling back to per-write opens.
pub async fn build_sink(path: Option<&Path>) -> Option<Arc<dyn LogSink>> {
	let path = path?;

	if let Some(sink) = PersistentDescriptorSink::open(path).await {
		return Some(Arc::new(sink));
	}

	trace!(?path, "could not open persistent log descriptor, falling back to per-write opens");
	Some(Arc::new(PerWriteFileSink::new(path)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn formats_ipv4_source_with_21_wide_column1() {
		let record = format_record(
			EventKind::Syn,
			"203.0.113.1:4000".parse().unwrap(),
			"127.0.0.1:6000",
			"127.0.0.1:54321".parse().unwrap(),
			"127.0.0.1:5000",
		);

		assert!(record.starts_with("203.0.113.1:4000    "));
		assert_eq!(&record[21..26], "syn  ");
	}

	#[test]
	fn formats_ipv6_source_with_46_wide_column1() {
		let record = format_record(
			EventKind::Open,
			"[::1]:4000".parse().unwrap(),
			"127.0.0.1:6000",
			"127.0.0.1:54321".parse().unwrap(),
			"127.0.0.1:5000",
		);

		assert_eq!(&record[46..51], "open ");
	}

	#[test]
	fn columns_3_and_5_are_always_46_wide() {
		let record = format_record(
			EventKind::Open,
			"203.0.113.1:4000".parse().unwrap(),
			"127.0.0.1:6000",
			"127.0.0.1:54321".parse().unwrap(),
			"127.0.0.1:5000",
		);

		let after_kind = &record[26..];
		assert_eq!(&after_kind[46..50], "nat ");
		let nat_field = &after_kind[50..];
		assert_eq!(&nat_field[46..], "127.0.0.1:5000");
	}

	#[tokio::test]
	async fn per_write_sink_appends_across_calls() {
		let dir = std::env::temp_dir().join(format!("rinetd-log-test-{:?}", std::thread::current().id()));
		let path = dir.with_extension("log");
		let _ = tokio::fs::remove_file(&path).await;

		let sink = PerWriteFileSink::new(&path);
		sink.write_record("first").await;
		sink.write_record("second").await;

		let contents = tokio::fs::read_to_string(&path).await.unwrap();
		assert!(contents.contains("first"));
		assert!(contents.contains("second"));

		let _ = tokio::fs::remove_file(&path).await;
	}

	#[tokio::test]
	async fn persistent_descriptor_sink_appends_across_calls() {
		let path = std::env::temp_dir().join(format!(
			"rinetd-persistent-log-test-{:?}.log",
			std::thread::current().id()
		));
		let _ = tokio::fs::remove_file(&path).await;

		let sink = PersistentDescriptorSink::open(&path)
			.await
			.expect("opening a writable temp path should succeed");
		sink.write_record("first").await;
		sink.write_record("second").await;

		// The worker thread drains its channel asynchronously; drop the
		// sink (and its WorkerGuard) to force a final flush before reading.
		drop(sink);
		tokio::time::sleep(std::time::Duration::from_millis(50)).await;

		let contents = tokio::fs::read_to_string(&path).await.unwrap();
		assert!(contents.contains("first"));
		assert!(contents.contains("second"));

		let _ = tokio::fs::remove_file(&path).await;
	}
}
