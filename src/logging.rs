//! Logger setup for hosts embedding the engine

use log::LevelFilter;

/// Level for a verbosity count: 0 warn, 1 info, 2 debug, more trace.
/// `quiet` wins and only lets errors through.
pub fn level_filter(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install `env_logger` at the level for `verbose`/`quiet`.
///
/// Does nothing if a logger is already installed.
pub fn init(verbose: u8, quiet: bool) {
    let result = env_logger::Builder::new()
        .filter_level(level_filter(verbose, quiet))
        .format_timestamp(None)
        .try_init();
    if result.is_err() {
        log::debug!("Logger already initialized");
    }
}
