use std::path::{Path, PathBuf};

use owo_colors::OwoColorize;
use spew::{Config, Supervisor};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, PartialEq)]
enum Invocation {
	Run(PathBuf),
	Help,
	Version,
	Usage,
}

fn parse_args(args: &[String]) -> Invocation {
	match args.first().map(|s| s.as_str()) {
		None => Invocation::Usage,
		Some("--help" | "-h") => Invocation::Help,
		Some("--version" | "-V") => Invocation::Version,
		Some(path) => Invocation::Run(PathBuf::from(path)),
	}
}

#[tokio::main]
async fn main() {
	let args: Vec<String> = std::env::args().skip(1).collect();

	let path = match parse_args(&args) {
		Invocation::Help => {
			print_usage();
			return;
		}
		Invocation::Version => {
			println!("spew {}", env!("CARGO_PKG_VERSION"));
			return;
		}
		Invocation::Usage => {
			print_usage();
			std::process::exit(1);
		}
		Invocation::Run(path) => path,
	};

	init_tracing();

	if let Err(e) = run(&path).await {
		eprintln!("{} {}", "error:".red().bold(), e);
		std::process::exit(1);
	}
}

fn print_usage() {
	eprintln!("{} {}: status-line generator", "spew".bold(), env!("CARGO_PKG_VERSION"));
	eprintln!();
	eprintln!("usage: {} <config-file>", "spew".bold());
	eprintln!();
	eprintln!("{}", "config".cyan().bold());
	eprintln!("  template = \"{{{{ .Clock }}}}\\n\"");
	eprintln!();
	eprintln!("  [[sources]]");
	eprintln!("  name = \"clock\"");
	eprintln!("  type = \"timer:1s\"        # once | listen | timer:<duration>");
	eprintln!("  script = \"date +%T\"");
	eprintln!();
	eprintln!("{}", "environment".cyan().bold());
	eprintln!("  SPEW_LOG                 log filter for stderr (default: warn)");
}

fn init_tracing() {
	let filter = EnvFilter::try_from_env("SPEW_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}

async fn run(path: &Path) -> Result<(), String> {
	let config = Config::load(path).map_err(|e| e.to_string())?;
	tracing::info!(
		"loaded {} with {} sources",
		path.display(),
		config.sources.len()
	);

	let cancel = CancellationToken::new();
	cancel_on_signal(cancel.clone());

	Supervisor::new(config)
		.run(std::io::stdout(), cancel)
		.await
		.map_err(|e| e.to_string())
}

fn cancel_on_signal(cancel: CancellationToken) {
	tokio::spawn(async move {
		match signal(SignalKind::terminate()) {
			Ok(mut term) => {
				tokio::select! {
					_ = tokio::signal::ctrl_c() => {}
					_ = term.recv() => {}
				}
			}
			Err(e) => {
				tracing::warn!("could not listen for SIGTERM: {}", e);
				let _ = tokio::signal::ctrl_c().await;
			}
		}
		tracing::info!("shutting down");
		cancel.cancel();
	});
}
