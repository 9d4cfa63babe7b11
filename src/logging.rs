// Console + optional file logging via tracing-subscriber.
//
// RUST_LOG wins over the level passed on the command line.
use chrono::Local;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. Returns the log file path when file
/// logging is enabled.
pub fn init(level: &str, log_dir: Option<&Path>) -> io::Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .compact();

    let (file_layer, log_path) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let path = dir.join(format!(
                "part_history_{}.log",
                Local::now().format("%Y%m%d_%H%M%S")
            ));
            let file = File::create(&path)?;
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    // A second init (e.g. from tests) is harmless; keep the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init();

    Ok(log_path)
}
