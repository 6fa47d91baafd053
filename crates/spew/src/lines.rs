use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Longest line accepted, newline included.
pub const MAX_LINE: usize = 64 * 1024;

/// Splits a byte stream into `\n`-terminated lines.
pub struct LineReader<R> {
	inner: BufReader<R>,
	buf: Vec<u8>,
	limit: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
	pub fn new(reader: R) -> Self {
		Self::with_limit(reader, MAX_LINE)
	}

	pub fn with_limit(reader: R, limit: usize) -> Self {
		Self {
			inner: BufReader::new(reader),
			buf: Vec::new(),
			limit,
		}
	}

	/// Next line including its trailing newline, or `None` at end of stream.
	/// A final line without a newline is still returned. A line longer than
	/// the limit is an `InvalidData` error.
	///
	/// Not cancel safe: dropping the future discards a partially read line.
	pub async fn next_line(&mut self) -> io::Result<Option<String>> {
		self.buf.clear();
		let n = (&mut self.inner)
			.take(self.limit as u64)
			.read_until(b'\n', &mut self.buf)
			.await?;
		if n == 0 {
			return Ok(None);
		}
		if n == self.limit && self.buf.last() != Some(&b'\n') {
			return Err(io::Error::new(
				io::ErrorKind::InvalidData,
				format!("line longer than {} bytes", self.limit),
			));
		}
		Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
	}
}

/// Reads lines on a separate task and hands them over one at a time.
///
/// The channel closes at end of stream. A read failure is sent as the last
/// item. Cancellation stops the task without sending anything further.
pub fn spawn_line_reader<R>(reader: R, cancel: CancellationToken) -> mpsc::Receiver<io::Result<String>>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	let (tx, rx) = mpsc::channel(1);
	tokio::spawn(async move {
		let mut lines = LineReader::new(reader);
		loop {
			let item = tokio::select! {
				biased;
				_ = cancel.cancelled() => return,
				line = lines.next_line() => line,
			};
			let item = match item {
				Ok(Some(line)) => Ok(line),
				Ok(None) => return,
				Err(e) => Err(e),
			};
			let failed = item.is_err();
			tokio::select! {
				biased;
				_ = cancel.cancelled() => return,
				sent = tx.send(item) => {
					if sent.is_err() || failed {
						return;
					}
				}
			}
		}
	});
	rx
}
