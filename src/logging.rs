//! Log setup: compact lines on stderr, plain lines in `framechanger.log`.
//!
//! The level comes from `RUST_LOG` (default `info`).

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging(log_file: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_writer(std::io::stderr).with_target(false).compact();

    let file = log_file
        .parent()
        .map(std::fs::create_dir_all)
        .transpose()
        .and_then(|_| OpenOptions::new().create(true).append(true).open(log_file));

    match file {
        Ok(file) => {
            let file_layer = fmt::layer().with_writer(Mutex::new(file)).with_ansi(false);
            tracing_subscriber::registry().with(filter).with(console).with(file_layer).init();
        }
        Err(e) => {
            tracing_subscriber::registry().with(filter).with(console).init();
            tracing::warn!("could not open log file {}: {e}", log_file.display());
        }
    }
}
