use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::parse_duration;
use crate::error::SourceTypeError;

/// A validated config: the template source plus its sources, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
	pub template: String,
	pub sources: Vec<SourceSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
	pub name: String,
	pub kind: SourceKind,
	pub script: String,
	pub env: HashMap<String, String>,
}

impl SourceSpec {
	pub fn new(name: impl Into<String>, kind: SourceKind, script: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			kind,
			script: script.into(),
			env: HashMap::new(),
		}
	}
}

/// How a source produces values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
	/// Run once before the render loop starts.
	Once,
	/// Run immediately, then again every period.
	Timer(Duration),
	/// Run one long-lived command and take every stdout line as a value.
	Listen,
}

impl FromStr for SourceKind {
	type Err = SourceTypeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		match s.split_once(':') {
			Some(("timer", value)) => {
				let value = value.trim();
				if value.is_empty() {
					return Err(SourceTypeError::MissingDuration);
				}
				let period = parse_duration(value).map_err(|reason| {
					SourceTypeError::InvalidDuration {
						value: value.to_string(),
						reason,
					}
				})?;
				if period.is_zero() {
					return Err(SourceTypeError::InvalidDuration {
						value: value.to_string(),
						reason: "timer period must be positive".to_string(),
					});
				}
				Ok(SourceKind::Timer(period))
			}
			Some(_) => Err(SourceTypeError::Unknown(s.to_string())),
			None => match s {
				"once" => Ok(SourceKind::Once),
				"listen" => Ok(SourceKind::Listen),
				"timer" => Err(SourceTypeError::MissingDuration),
				other => Err(SourceTypeError::Unknown(other.to_string())),
			},
		}
	}
}

impl fmt::Display for SourceKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SourceKind::Once => f.write_str("once"),
			SourceKind::Timer(period) => write!(f, "timer:{:?}", period),
			SourceKind::Listen => f.write_str("listen"),
		}
	}
}

/// One observed update from a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRecord {
	pub name: String,
	pub value: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_each_kind() {
		assert_eq!("once".parse::<SourceKind>(), Ok(SourceKind::Once));
		assert_eq!(" listen ".parse::<SourceKind>(), Ok(SourceKind::Listen));
		assert_eq!(
			"timer:5s".parse::<SourceKind>(),
			Ok(SourceKind::Timer(Duration::from_secs(5)))
		);
		assert_eq!(
			"timer:1m30s".parse::<SourceKind>(),
			Ok(SourceKind::Timer(Duration::from_secs(90)))
		);
	}

	#[test]
	fn rejects_unknown_and_substring_matches() {
		assert_eq!(
			"polling".parse::<SourceKind>(),
			Err(SourceTypeError::Unknown("polling".into()))
		);
		assert!(matches!(
			"oncely".parse::<SourceKind>(),
			Err(SourceTypeError::Unknown(_))
		));
		assert!(matches!(
			"listen:fast".parse::<SourceKind>(),
			Err(SourceTypeError::Unknown(_))
		));
		assert!(matches!("Once".parse::<SourceKind>(), Err(SourceTypeError::Unknown(_))));
	}

	#[test]
	fn timer_needs_a_positive_duration() {
		assert_eq!("timer".parse::<SourceKind>(), Err(SourceTypeError::MissingDuration));
		assert_eq!("timer:".parse::<SourceKind>(), Err(SourceTypeError::MissingDuration));
		assert!(matches!(
			"timer:soon".parse::<SourceKind>(),
			Err(SourceTypeError::InvalidDuration { .. })
		));
		assert!(matches!(
			"timer:0s".parse::<SourceKind>(),
			Err(SourceTypeError::InvalidDuration { .. })
		));
	}

	#[test]
	fn display_round_trips_through_parse() {
		let kind = SourceKind::Timer(Duration::from_millis(250));
		assert_eq!(kind.to_string(), "timer:250ms");
		assert_eq!(kind.to_string().parse::<SourceKind>(), Ok(kind));
	}
}
