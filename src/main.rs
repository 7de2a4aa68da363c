#![doc = include_str!("../README.md")]
#![warn(
    clippy::pedantic,
    clippy::missing_docs_in_private_items,
    missing_docs,
    rust_2018_idioms
)]

use axum::{Router, extract::DefaultBodyLimit, routing::post};
use std::{ffi::OsStr, sync::Arc};
use tokio::net::TcpListener;

mod config;
pub mod lineardoc;
mod pages;

/// Global application state.
struct ServiceState {
    /// Compiled removable-section rules, shared read-only across workers.
    rules: Arc<lineardoc::RemovableRules>,
    /// The sentence segmenter driving the pipeline.
    segmenter: lineardoc::Segmenter,
}

/// Global application state, shareable across threads.
type AppState = Arc<ServiceState>;

/// The request body ceiling. Parsoid renderings of long articles run to a
/// few megabytes; anything near this limit is garbage in.
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Errors that may occur when parsing arguments.
#[derive(Debug, thiserror::Error)]
enum ArgsError {
    /// Extra unknown junk on the command line.
    #[error("unknown arguments: {}", _0.display())]
    Extra(std::ffi::OsString),
    /// Some other parsing error.
    #[error(transparent)]
    Pico(#[from] pico_args::Error),
}

/// Command-line arguments.
struct Args {
    /// The bind address for the web server.
    bind: String,
    /// The path to the removable-sections rules file, if not built in.
    config_path: Option<String>,
}

impl Args {
    /// Tries to create an [`Args`] from the given command line arguments and
    /// environment variables.
    fn new() -> Result<Args, ArgsError> {
        let mut args = pico_args::Arguments::from_env();
        let bind = args
            .opt_value_from_str("--bind")?
            .unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let config_path = args
            .opt_value_from_str("--config")?
            .or_else(|| std::env::var("LINEARDOC_CONFIG").ok());

        let rest = args.finish();
        if !rest.is_empty() {
            return Err(ArgsError::Extra(rest.join(OsStr::new(" "))));
        }

        Ok(Self { bind, config_path })
    }
}

/// Command line usage instructions.
fn usage() {
    let exe = std::env::args().next().unwrap_or_default();
    eprintln!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    eprintln!("Usage: {exe} [options]\n");
    eprintln!("Options:");
    eprintln!("  --bind: Web server bind (default: 127.0.0.1:8080)");
    eprintln!("  --config: Removable-sections rules file (default: built in)");
    eprintln!("\nor, use environment variables:");
    eprintln!("  LINEARDOC_CONFIG");
}

/// Builds the state and serves until told otherwise.
#[tokio::main]
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let args = match Args::new() {
        Ok(args) => args,
        Err(err) => {
            usage();
            return Err(err)?;
        }
    };

    log::info!("Starting up lineardoc-rs ...");

    let config = if let Some(path) = &args.config_path {
        let config = config::Config::from_file(path)?;
        log::info!("Loaded removable-section rules from {path}");
        config
    } else {
        log::info!("Using built-in removable-section rules");
        config::Config::builtin()
    };
    log::info!(
        "Rules: {} classes, {} typeofs, {} templates",
        config.removable_sections.classes.len(),
        config.removable_sections.rdfa.len(),
        config.removable_sections.templates.len()
    );

    let state = AppState::new(ServiceState {
        rules: config.compile()?,
        segmenter: lineardoc::Segmenter::default(),
    });

    let app = Router::new()
        .route("/", post(pages::segment))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state);

    let listener = TcpListener::bind(&args.bind).await?;
    log::info!("Listening at {}", args.bind);

    axum::serve(listener, app).await.map_err(Into::into)
}

/// Uses the [`Display`](core::fmt::Display) formatter for an error even when
/// the [`Debug`](core::fmt::Debug) formatter is requested.
struct DisplayError(Box<dyn std::error::Error>);

impl core::fmt::Debug for DisplayError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl<E: Into<Box<dyn std::error::Error>>> From<E> for DisplayError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

fn main() -> Result<(), DisplayError> {
    run().map_err(Into::into)
}
