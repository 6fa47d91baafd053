//! Source drivers.
//!
//! A driver turns one [`SourceSpec`] into a stream of [`ValueRecord`]s on the
//! supervisor's value channel, or a single [`RunError`] on its error channel.
//! Drivers stop without sending anything once the run is cancelled, and never
//! leave their subprocess behind.

use std::process::Stdio;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::command::{run_command, shell_command, CommandError, GroupChild};
use crate::error::RunError;
use crate::lines::spawn_line_reader;
use crate::types::{SourceSpec, ValueRecord};

const EXIT_WAIT: Duration = Duration::from_millis(200);

/// Sending half of the supervisor's channels, bound to one source.
#[derive(Clone)]
pub struct Emitter {
	name: String,
	values: mpsc::Sender<ValueRecord>,
	errors: mpsc::Sender<RunError>,
	cancel: CancellationToken,
}

impl Emitter {
	pub fn new(
		name: impl Into<String>,
		values: mpsc::Sender<ValueRecord>,
		errors: mpsc::Sender<RunError>,
		cancel: CancellationToken,
	) -> Self {
		Self {
			name: name.into(),
			values,
			errors,
			cancel,
		}
	}

	pub fn cancel(&self) -> &CancellationToken {
		&self.cancel
	}

	/// Delivers a value. Returns `false` once the run is over.
	pub async fn emit(&self, value: String) -> bool {
		let record = ValueRecord {
			name: self.name.clone(),
			value,
		};
		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => false,
			sent = self.values.send(record) => sent.is_ok(),
		}
	}

	/// Reports a fatal error unless the run is already over.
	pub async fn fail(&self, error: RunError) {
		tracing::debug!("source {} failed: {}", self.name, error);
		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => {}
			_ = self.errors.send(error) => {}
		}
	}
}

/// Runs the command now and then once per `period`. A tick that comes due
/// while the command is still running is skipped.
pub async fn run_timer(spec: &SourceSpec, period: Duration, emitter: &Emitter) {
	tracing::debug!("starting timer source {} every {:?}", spec.name, period);
	let mut ticker = interval_at(Instant::now() + period, period);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

	loop {
		match run_command(spec, emitter.cancel()).await {
			Ok(output) => {
				if !emitter.emit(output).await {
					return;
				}
			}
			Err(CommandError::Cancelled) => return,
			Err(e) => {
				if let Some(error) = e.into_run_error(spec) {
					emitter.fail(error).await;
				}
				return;
			}
		}

		tokio::select! {
			biased;
			_ = emitter.cancel().cancelled() => return,
			_ = ticker.tick() => {}
		}
	}
}

/// Runs one long-lived command and emits every stdout line.
///
/// Any stderr line, a read failure, or the end of stdout is fatal. Stderr
/// closing on its own is not.
pub async fn run_listener(spec: &SourceSpec, emitter: &Emitter) {
	let mut cmd = shell_command(spec);
	cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
	let mut child = match GroupChild::spawn(&mut cmd) {
		Ok(c) => c,
		Err(error) => {
			emitter
				.fail(RunError::Spawn {
					name: spec.name.clone(),
					script: spec.script.clone(),
					error,
				})
				.await;
			return;
		}
	};
	tracing::debug!("listener {} running as pid {:?}", spec.name, child.id());

	let result = listen(spec, &mut child, emitter).await;
	// Usually stdout closed because the process is exiting. If it is still
	// running, the status after terminate() would be our own signal.
	let exited = if matches!(result, Err(ListenEnd::StdoutClosed)) {
		match tokio::time::timeout(EXIT_WAIT, child.child.wait()).await {
			Ok(Ok(status)) => Some(status),
			_ => None,
		}
	} else {
		None
	};
	let status = child.terminate().await;
	tracing::debug!("listener {} reaped: {:?}", spec.name, status);

	match result {
		Ok(()) => {}
		Err(ListenEnd::Error(error)) => emitter.fail(error).await,
		Err(ListenEnd::StdoutClosed) => {
			emitter
				.fail(RunError::Exited {
					name: spec.name.clone(),
					script: spec.script.clone(),
					status: exited,
				})
				.await
		}
	}
}

enum ListenEnd {
	Error(RunError),
	StdoutClosed,
}

async fn listen(spec: &SourceSpec, child: &mut GroupChild, emitter: &Emitter) -> Result<(), ListenEnd> {
	let pipe_error = |stream: &str| {
		ListenEnd::Error(RunError::Pipe {
			name: spec.name.clone(),
			script: spec.script.clone(),
			error: std::io::Error::other(format!("no {} handle", stream)),
		})
	};
	let stdout = child.child.stdout.take().ok_or_else(|| pipe_error("stdout"))?;
	let stderr = child.child.stderr.take().ok_or_else(|| pipe_error("stderr"))?;

	// Readers stop with the driver, not with the whole run.
	let readers = emitter.cancel().child_token();
	let _stop_readers = readers.clone().drop_guard();
	let mut stdout_lines = spawn_line_reader(stdout, readers.clone());
	let mut stderr_lines = spawn_line_reader(stderr, readers);
	let mut stderr_open = true;

	let read_error = |error: std::io::Error| {
		ListenEnd::Error(RunError::Read {
			name: spec.name.clone(),
			script: spec.script.clone(),
			error,
		})
	};

	loop {
		tokio::select! {
			biased;
			_ = emitter.cancel().cancelled() => return Ok(()),
			line = stderr_lines.recv(), if stderr_open => match line {
				Some(Ok(line)) => {
					return Err(ListenEnd::Error(RunError::Stderr {
						name: spec.name.clone(),
						script: spec.script.clone(),
						line,
					}));
				}
				Some(Err(e)) => return Err(read_error(e)),
				None => stderr_open = false,
			},
			line = stdout_lines.recv() => match line {
				Some(Ok(line)) => {
					if !emitter.emit(line).await {
						return Ok(());
					}
				}
				Some(Err(e)) => return Err(read_error(e)),
				None => return Err(ListenEnd::StdoutClosed),
			},
		}
	}
}
