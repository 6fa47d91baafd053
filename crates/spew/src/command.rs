//! Shell command execution.
//!
//! Every command runs as `/bin/sh -c <script>` in a fresh process group so
//! that a whole pipeline can be torn down with one signal.

use std::fs::File;
use std::io;
use std::os::fd::OwnedFd;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::error::RunError;
use crate::types::SourceSpec;

pub const SHELL: &str = "/bin/sh";

const KILL_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub enum CommandError {
	Cancelled,
	Spawn(io::Error),
	Pipe(io::Error),
	Read(io::Error),
	Failed { status: ExitStatus, output: String },
}

impl CommandError {
	/// Attaches the source to the failure. Cancellation is not a failure.
	pub fn into_run_error(self, spec: &SourceSpec) -> Option<RunError> {
		let name = spec.name.clone();
		let script = spec.script.clone();
		match self {
			CommandError::Cancelled => None,
			CommandError::Spawn(error) => Some(RunError::Spawn { name, script, error }),
			CommandError::Pipe(error) => Some(RunError::Pipe { name, script, error }),
			CommandError::Read(error) => Some(RunError::Read { name, script, error }),
			CommandError::Failed { status, output } => Some(RunError::CommandFailed {
				name,
				script,
				status,
				output,
			}),
		}
	}
}

pub fn shell_command(spec: &SourceSpec) -> Command {
	let mut cmd = Command::new(SHELL);
	cmd.args(["-c", &spec.script])
		.envs(&spec.env)
		.stdin(Stdio::null())
		.process_group(0)
		.kill_on_drop(true);
	cmd
}

/// A child process leading its own process group.
pub struct GroupChild {
	pub child: Child,
	pgid: Option<u32>,
}

impl GroupChild {
	pub fn spawn(cmd: &mut Command) -> io::Result<Self> {
		let child = cmd.spawn()?;
		let pgid = child.id();
		Ok(Self { child, pgid })
	}

	pub fn id(&self) -> Option<u32> {
		self.pgid
	}

	/// SIGKILLs whatever is left in the group, e.g. jobs the script put in
	/// the background.
	pub fn kill_group(&self) {
		if let Some(pgid) = self.pgid {
			signal_group(pgid, nix::sys::signal::Signal::SIGKILL);
		}
	}

	/// SIGTERM the group, escalate to SIGKILL after a grace period, and reap
	/// the leader.
	pub async fn terminate(&mut self) -> Option<ExitStatus> {
		let Some(pgid) = self.pgid else {
			return self.child.wait().await.ok();
		};
		signal_group(pgid, nix::sys::signal::Signal::SIGTERM);
		match tokio::time::timeout(KILL_GRACE, self.child.wait()).await {
			Ok(Ok(status)) => Some(status),
			_ => {
				tracing::debug!("process group {} ignored SIGTERM, killing", pgid);
				signal_group(pgid, nix::sys::signal::Signal::SIGKILL);
				self.child.wait().await.ok()
			}
		}
	}
}

fn signal_group(pgid: u32, signal: nix::sys::signal::Signal) {
	use nix::sys::signal::killpg;
	use nix::unistd::Pid;
	let _ = killpg(Pid::from_raw(pgid as i32), signal);
}

/// Runs a source's script to completion and returns its combined
/// stdout/stderr. A non-zero exit yields [`CommandError::Failed`] with
/// whatever was captured. Anything the script leaves running in its process
/// group is killed once the shell exits. On cancellation the process group
/// is killed and nothing is returned.
pub async fn run_command(spec: &SourceSpec, cancel: &CancellationToken) -> Result<String, CommandError> {
	// One pipe for both streams keeps their interleaving intact.
	let (reader, writer) = io::pipe().map_err(CommandError::Pipe)?;
	let mut cmd = shell_command(spec);
	cmd.stdout(writer.try_clone().map_err(CommandError::Pipe)?)
		.stderr(writer);
	let spawned = GroupChild::spawn(&mut cmd);
	// The command keeps copies of the write end; they must go before reading
	// or EOF never arrives.
	drop(cmd);
	let mut child = spawned.map_err(CommandError::Spawn)?;

	let mut reader = match pipe::Receiver::from_file(File::from(OwnedFd::from(reader))) {
		Ok(r) => r,
		Err(e) => {
			child.terminate().await;
			return Err(CommandError::Pipe(e));
		}
	};

	let mut output = Vec::new();
	let finished = tokio::select! {
		biased;
		_ = cancel.cancelled() => None,
		result = async {
			reader.read_to_end(&mut output).await?;
			child.child.wait().await
		} => Some(result),
	};

	let status = match finished {
		None => {
			child.terminate().await;
			return Err(CommandError::Cancelled);
		}
		Some(Err(e)) => {
			child.terminate().await;
			return Err(CommandError::Read(e));
		}
		Some(Ok(status)) => status,
	};
	child.kill_group();

	let output = String::from_utf8_lossy(&output).into_owned();
	if status.success() {
		Ok(output)
	} else {
		Err(CommandError::Failed { status, output })
	}
}
