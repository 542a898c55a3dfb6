//! Logger setup for the device emulator.

use log::LevelFilter;

/// Initializes the logger with the `env_logger` crate.
///
/// The `-d` debug flag raises the default filter to Debug; an explicit
/// `RUST_LOG` still takes precedence either way.
pub fn init_logger(debug: bool) {
    let default_level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_level.as_str()),
    )
    .init();
}
