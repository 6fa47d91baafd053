//! Error types for loading a config and for running it.
//!
//! [`ConfigError`] covers everything that can be rejected before a single
//! command runs. [`RunError`] covers failures once sources are live; every
//! one of them aborts the whole run.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("could not read config file {}: {source}", .path.display())]
	Read {
		path: PathBuf,
		source: io::Error,
	},

	#[error("could not parse config file: {0}")]
	Parse(#[from] toml::de::Error),

	#[error("source #{index} has an empty name")]
	EmptyName { index: usize },

	#[error("duplicate source name: {name}")]
	DuplicateName { name: String },

	#[error("source {name}: {error}")]
	SourceType {
		name: String,
		#[source]
		error: SourceTypeError,
	},
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceTypeError {
	#[error("unsupported source type: {0:?}")]
	Unknown(String),

	#[error("timer needs a duration, e.g. \"timer:5s\"")]
	MissingDuration,

	#[error("could not parse duration({value}): {reason}")]
	InvalidDuration { value: String, reason: String },
}

#[derive(Debug, Error)]
pub enum RunError {
	#[error("could not parse template: {0}")]
	Template(#[source] minijinja::Error),

	#[error("could not render template: {0}")]
	Render(#[source] minijinja::Error),

	#[error("could not write output: {0}")]
	Output(#[source] io::Error),

	#[error("{name}: could not start command ({script}): {error}")]
	Spawn {
		name: String,
		script: String,
		#[source]
		error: io::Error,
	},

	#[error("{name}: could not connect to command's output ({script}): {error}")]
	Pipe {
		name: String,
		script: String,
		#[source]
		error: io::Error,
	},

	#[error("{name}: could not run command({script}): {status}: {output:?}")]
	CommandFailed {
		name: String,
		script: String,
		status: ExitStatus,
		output: String,
	},

	#[error("{name}: could not read from command ({script}): {error}")]
	Read {
		name: String,
		script: String,
		#[source]
		error: io::Error,
	},

	#[error("{name}: stderr detected when running command ({script}): {line:?}")]
	Stderr {
		name: String,
		script: String,
		line: String,
	},

	#[error("{name}: command stopped producing output ({script}): {}", describe_exit(.status))]
	Exited {
		name: String,
		script: String,
		status: Option<ExitStatus>,
	},
}

fn describe_exit(status: &Option<ExitStatus>) -> String {
	match status {
		Some(status) => status.to_string(),
		None => "still running".to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stderr_error_names_source_and_line() {
		let err = RunError::Stderr {
			name: "vol".into(),
			script: "amixer".into(),
			line: "boom\n".into(),
		};
		assert_eq!(
			err.to_string(),
			"vol: stderr detected when running command (amixer): \"boom\\n\""
		);
	}

	#[test]
	fn exited_without_status_reads_naturally() {
		let err = RunError::Exited {
			name: "clock".into(),
			script: "date".into(),
			status: None,
		};
		assert!(err.to_string().ends_with("still running"));
	}

	#[test]
	fn source_type_error_wraps_reason() {
		let err = ConfigError::SourceType {
			name: "cpu".into(),
			error: SourceTypeError::Unknown("polling".into()),
		};
		assert_eq!(err.to_string(), "source cpu: unsupported source type: \"polling\"");
	}
}
