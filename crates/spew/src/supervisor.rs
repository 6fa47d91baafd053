use std::io::Write;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::command::{run_command, CommandError};
use crate::error::RunError;
use crate::render::{translate_field_refs, Renderer, ValueTable};
use crate::source::{run_listener, run_timer, Emitter};
use crate::types::{Config, SourceKind};

const VALUE_CHANNEL_CAPACITY: usize = 16;

/// Runs every source of a config and re-renders the template on each update.
pub struct Supervisor {
	config: Config,
}

impl Supervisor {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Runs until `cancel` fires (returns `Ok`) or any source, the template
	/// or the output fails (returns that error).
	///
	/// All producers are cancelled and their processes reaped before this
	/// returns.
	pub async fn run<W: Write>(&self, out: W, cancel: CancellationToken) -> Result<(), RunError> {
		let token = cancel.child_token();
		let _cancel_on_drop = token.clone().drop_guard();
		let mut producers = JoinSet::new();

		let result = self.render_loop(out, &token, &mut producers).await;

		token.cancel();
		while producers.join_next().await.is_some() {}
		tracing::debug!("all sources stopped");
		result
	}

	async fn render_loop<W: Write>(
		&self,
		out: W,
		token: &CancellationToken,
		producers: &mut JoinSet<()>,
	) -> Result<(), RunError> {
		let source = translate_field_refs(&self.config.template);
		let mut renderer = Renderer::new(&source, out)?;
		let mut table = ValueTable::new();

		let (values_tx, mut values_rx) = mpsc::channel(VALUE_CHANNEL_CAPACITY);
		let (errors_tx, mut errors_rx) = mpsc::channel(1);

		for spec in &self.config.sources {
			match spec.kind {
				SourceKind::Once => {
					let output = match run_command(spec, token).await {
						Ok(output) => output,
						Err(CommandError::Cancelled) => return Ok(()),
						Err(e) => {
							return match e.into_run_error(spec) {
								Some(error) => Err(error),
								None => Ok(()),
							};
						}
					};
					table.update(&spec.name, &output);
					renderer.render(&table)?;
				}
				SourceKind::Timer(period) => {
					let spec = spec.clone();
					let emitter = Emitter::new(&spec.name, values_tx.clone(), errors_tx.clone(), token.clone());
					producers.spawn(async move { run_timer(&spec, period, &emitter).await });
				}
				SourceKind::Listen => {
					let spec = spec.clone();
					let emitter = Emitter::new(&spec.name, values_tx.clone(), errors_tx.clone(), token.clone());
					producers.spawn(async move { run_listener(&spec, &emitter).await });
				}
			}
		}
		tracing::debug!(
			"{} sources set up, {} running",
			self.config.sources.len(),
			producers.len()
		);

		// The senders stay alive here, so neither channel closes while waiting.
		loop {
			tokio::select! {
				biased;
				_ = token.cancelled() => return Ok(()),
				Some(error) = errors_rx.recv() => return Err(error),
				Some(record) = values_rx.recv() => {
					table.update(&record.name, &record.value);
					renderer.render(&table)?;
				}
			}
		}
	}
}
