//! Template rendering.
//!
//! Templates may reference fields Go-style (`{{ .Clock }}`) or plainly
//! (`{{ Clock }}`); the former is rewritten to the latter before the template
//! is compiled.

use std::collections::BTreeMap;
use std::io::{BufWriter, Write};

use minijinja::Environment;

use crate::error::RunError;

const TEMPLATE_NAME: &str = "spew";

/// Latest value of every source that has reported, keyed by field name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValueTable {
	values: BTreeMap<String, String>,
}

impl ValueTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Stores `value` under the field name derived from `source`.
	pub fn update(&mut self, source: &str, value: &str) {
		self.values.insert(field_name(source), sanitize(value));
	}

	pub(crate) fn len(&self) -> usize {
		self.values.len()
	}
}

/// Strips every `\n` and `\r`.
pub fn sanitize(value: &str) -> String {
	value.chars().filter(|c| !matches!(c, '\n' | '\r')).collect()
}

/// Template field for a source: first character uppercased, rest untouched.
pub fn field_name(source: &str) -> String {
	let mut chars = source.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().chain(chars).collect(),
		None => String::new(),
	}
}

/// Drops the leading dot of field references inside `{{ ... }}` tags.
pub fn translate_field_refs(template: &str) -> String {
	let mut out = String::with_capacity(template.len());
	let mut rest = template;
	while let Some(start) = rest.find("{{") {
		let (before, tag_and_after) = rest.split_at(start);
		out.push_str(before);
		let Some(len) = tag_and_after.find("}}") else {
			rest = tag_and_after;
			break;
		};
		let (tag, after) = tag_and_after.split_at(len);
		let mut prev: Option<char> = None;
		let mut chars = tag.chars().peekable();
		while let Some(c) = chars.next() {
			let starts_ref = c == '.'
				&& chars.peek().is_some_and(|n| n.is_alphabetic() || *n == '_')
				&& !prev.is_some_and(|p| p.is_alphanumeric() || matches!(p, '_' | ')' | ']' | '.'));
			if !starts_ref {
				out.push(c);
			}
			prev = Some(c);
		}
		rest = after;
	}
	out.push_str(rest);
	out
}

/// Compiled template bound to an output sink.
pub struct Renderer<'source, W: Write> {
	env: Environment<'source>,
	out: BufWriter<W>,
	renders: u64,
}

impl<'source, W: Write> Renderer<'source, W> {
	/// `source` must already have gone through [`translate_field_refs`].
	pub fn new(source: &'source str, out: W) -> Result<Self, RunError> {
		let mut env = Environment::new();
		env.set_keep_trailing_newline(true);
		env.add_template(TEMPLATE_NAME, source)
			.map_err(RunError::Template)?;
		Ok(Self {
			env,
			out: BufWriter::new(out),
			renders: 0,
		})
	}

	/// Executes the template against `table` and flushes the result.
	pub fn render(&mut self, table: &ValueTable) -> Result<(), RunError> {
		let template = self
			.env
			.get_template(TEMPLATE_NAME)
			.map_err(RunError::Render)?;
		let rendered = template.render(&table.values).map_err(RunError::Render)?;
		self.out
			.write_all(rendered.as_bytes())
			.map_err(RunError::Output)?;
		self.out.flush().map_err(RunError::Output)?;
		self.renders += 1;
		tracing::trace!("render #{} with {} fields", self.renders, table.len());
		Ok(())
	}

	pub fn renders(&self) -> u64 {
		self.renders
	}
}
