use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::render::field_name;
use crate::types::{Config, SourceKind, SourceSpec};

#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
	template: String,
	#[serde(default)]
	sources: Vec<SourceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct SourceEntry {
	name: String,
	#[serde(rename = "type")]
	kind: String,
	script: String,
	#[serde(default)]
	env: HashMap<String, String>,
}

impl Config {
	pub fn load(path: &Path) -> Result<Config, ConfigError> {
		let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		Config::from_toml(&content)
	}

	pub fn from_toml(content: &str) -> Result<Config, ConfigError> {
		let file: ConfigFile = toml::from_str(content)?;

		let mut seen = HashSet::new();
		let mut sources = Vec::with_capacity(file.sources.len());
		for (index, entry) in file.sources.into_iter().enumerate() {
			if entry.name.trim().is_empty() {
				return Err(ConfigError::EmptyName { index });
			}
			// Names that map to the same template field would overwrite each other.
			if !seen.insert(field_name(&entry.name)) {
				return Err(ConfigError::DuplicateName { name: entry.name });
			}
			let kind: SourceKind = entry.kind.parse().map_err(|error| ConfigError::SourceType {
				name: entry.name.clone(),
				error,
			})?;
			sources.push(SourceSpec {
				name: entry.name,
				kind,
				script: entry.script,
				env: entry.env,
			});
		}

		Ok(Config {
			template: file.template,
			sources,
		})
	}
}

const NANOS_PER_UNIT: &[(&str, u128)] = &[
	("ns", 1),
	("us", 1_000),
	("µs", 1_000),
	("μs", 1_000),
	("ms", 1_000_000),
	("s", 1_000_000_000),
	("m", 60 * 1_000_000_000),
	("h", 60 * 60 * 1_000_000_000),
];

/// Parses a duration such as `300ms`, `1.5h` or `1m30s`.
///
/// The grammar is a sequence of decimal numbers, each with an optional
/// fraction and a mandatory unit. A bare `0` is accepted. Signs are not.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
	if input == "0" {
		return Ok(Duration::ZERO);
	}
	if input.is_empty() {
		return Err("empty duration".to_string());
	}
	if input.starts_with('-') || input.starts_with('+') {
		return Err("signed durations are not supported".to_string());
	}

	let mut rest = input;
	let mut total: u128 = 0;
	while !rest.is_empty() {
		let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
		let (int_digits, after_int) = rest.split_at(int_len);

		let (frac_digits, after_number) = match after_int.strip_prefix('.') {
			Some(after_dot) => {
				let frac_len = after_dot
					.find(|c: char| !c.is_ascii_digit())
					.unwrap_or(after_dot.len());
				after_dot.split_at(frac_len)
			}
			None => ("", after_int),
		};
		if int_digits.is_empty() && frac_digits.is_empty() {
			return Err(format!("expected a number in {:?}", input));
		}

		let unit_len = after_number
			.find(|c: char| c.is_ascii_digit() || c == '.')
			.unwrap_or(after_number.len());
		let (unit, after_unit) = after_number.split_at(unit_len);
		if unit.is_empty() {
			return Err(format!("missing unit in {:?}", input));
		}
		let scale = NANOS_PER_UNIT
			.iter()
			.find(|(name, _)| *name == unit)
			.map(|(_, scale)| *scale)
			.ok_or_else(|| format!("unknown unit {:?} in {:?}", unit, input))?;

		let whole: u128 = if int_digits.is_empty() {
			0
		} else {
			int_digits
				.parse()
				.map_err(|_| format!("number too large in {:?}", input))?
		};
		let mut nanos = whole
			.checked_mul(scale)
			.ok_or_else(|| format!("duration out of range: {:?}", input))?;

		// Digits past nanosecond precision cannot change the result.
		let frac_digits = &frac_digits[..frac_digits.len().min(18)];
		if !frac_digits.is_empty() {
			let numerator: u128 = frac_digits
				.parse()
				.map_err(|_| format!("bad fraction in {:?}", input))?;
			let denominator = 10u128.pow(frac_digits.len() as u32);
			nanos += numerator * scale / denominator;
		}

		total = total
			.checked_add(nanos)
			.ok_or_else(|| format!("duration out of range: {:?}", input))?;
		rest = after_unit;
	}

	let total = u64::try_from(total).map_err(|_| format!("duration out of range: {:?}", input))?;
	Ok(Duration::from_nanos(total))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::SourceTypeError;

	#[test]
	fn parses_durations() {
		assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
		assert_eq!(parse_duration("100ms"), Ok(Duration::from_millis(100)));
		assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
		assert_eq!(parse_duration("1.5h"), Ok(Duration::from_secs(5400)));
		assert_eq!(parse_duration(".5s"), Ok(Duration::from_millis(500)));
		assert_eq!(parse_duration("2h45m"), Ok(Duration::from_secs(9900)));
		assert_eq!(parse_duration("10us"), Ok(Duration::from_micros(10)));
		assert_eq!(parse_duration("10µs"), Ok(Duration::from_micros(10)));
		assert_eq!(parse_duration("7ns"), Ok(Duration::from_nanos(7)));
		assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
	}

	#[test]
	fn rejects_bad_durations() {
		for input in ["", "5", "s", "5x", "-5s", "+5s", "1m30", ".s", "5 s"] {
			assert!(parse_duration(input).is_err(), "accepted {:?}", input);
		}
	}

	#[test]
	fn loads_sources_in_order() {
		let config = Config::from_toml(
			r#"
template = "{{ .Clock }} | {{ .Host }}\n"

[[sources]]
name = "host"
type = "once"
script = "hostname"

[[sources]]
name = "clock"
type = "timer:1s"
script = "date +%T"
env = { TZ = "UTC" }

[[sources]]
name = "events"
type = "listen"
script = "tail -f /tmp/events"
"#,
		)
		.unwrap();

		assert_eq!(config.template, "{{ .Clock }} | {{ .Host }}\n");
		let names: Vec<&str> = config.sources.iter().map(|s| s.name.as_str()).collect();
		assert_eq!(names, ["host", "clock", "events"]);
		assert_eq!(config.sources[0].kind, SourceKind::Once);
		assert_eq!(config.sources[1].kind, SourceKind::Timer(Duration::from_secs(1)));
		assert_eq!(config.sources[1].env.get("TZ").map(String::as_str), Some("UTC"));
		assert_eq!(config.sources[2].kind, SourceKind::Listen);
	}

	#[test]
	fn unknown_type_is_rejected_at_load() {
		let err = Config::from_toml(
			r#"
template = "x"

[[sources]]
name = "ok"
type = "once"
script = "true"

[[sources]]
name = "bad"
type = "polling"
script = "true"
"#,
		)
		.unwrap_err();
		match err {
			ConfigError::SourceType { name, error } => {
				assert_eq!(name, "bad");
				assert_eq!(error, SourceTypeError::Unknown("polling".into()));
			}
			other => panic!("unexpected error: {}", other),
		}
	}

	#[test]
	fn rejects_duplicate_and_empty_names() {
		let dup = Config::from_toml(
			r#"
template = "x"
sources = [
	{ name = "a", type = "once", script = "true" },
	{ name = "a", type = "once", script = "true" },
]
"#,
		);
		assert!(matches!(dup, Err(ConfigError::DuplicateName { .. })));

		let same_field = Config::from_toml(
			r#"
template = "{{ .Cpu }}"
sources = [
	{ name = "cpu", type = "once", script = "true" },
	{ name = "Cpu", type = "once", script = "true" },
]
"#,
		);
		match same_field {
			Err(ConfigError::DuplicateName { name }) => assert_eq!(name, "Cpu"),
			other => panic!("unexpected result: {:?}", other.map(|c| c.sources.len())),
		}

		let empty = Config::from_toml(
			r#"
template = "x"
sources = [{ name = " ", type = "once", script = "true" }]
"#,
		);
		assert!(matches!(empty, Err(ConfigError::EmptyName { index: 0 })));
	}

	#[test]
	fn missing_template_is_a_parse_error() {
		let err = Config::from_toml("sources = []").unwrap_err();
		assert!(matches!(err, ConfigError::Parse(_)));
	}

	#[test]
	fn missing_file_reports_path() {
		let err = Config::load(Path::new("/nonexistent/spew.toml")).unwrap_err();
		assert!(err.to_string().contains("/nonexistent/spew.toml"));
	}
}
