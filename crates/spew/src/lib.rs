//! # spew
//!
//! Status-line generator for bar-style UIs.
//!
//! A config names a template and a set of shell-command sources. Each source
//! reports values (once, on a timer, or line by line from a long-running
//! command), and every new value re-renders the template to the output.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use spew::{Config, Supervisor};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = Config::from_toml(r#"
//! template = "{{ .Host }} {{ .Clock }}\n"
//!
//! [[sources]]
//! name = "host"
//! type = "once"
//! script = "hostname"
//!
//! [[sources]]
//! name = "clock"
//! type = "timer:1s"
//! script = "date +%T"
//! "#)
//! .unwrap();
//!
//! Supervisor::new(config)
//!     .run(std::io::stdout(), CancellationToken::new())
//!     .await
//!     .unwrap();
//! # }
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod lines;
pub mod render;
pub mod source;
pub mod supervisor;
pub mod types;

pub use error::{ConfigError, RunError, SourceTypeError};
pub use render::{sanitize, ValueTable};
pub use supervisor::Supervisor;
pub use types::*;
