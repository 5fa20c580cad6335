pub use slog::{crit, debug, error, info, o, trace, warn, Discard, Drain, Logger};

use sloggers::{Build, Config, LoggerConfig};

/// A logger that swallows everything. Default for objects constructed without
/// an explicit parent logger.
#[inline]
pub fn null() -> Logger {
    Logger::root(Discard, o!())
}

/// Builds a debug-level terminal logger writing to stderr.
pub fn terminal() -> Logger {
    use sloggers::terminal::{Destination, TerminalLoggerBuilder};
    use sloggers::types::Severity;

    let mut builder = TerminalLoggerBuilder::new();
    builder.level(Severity::Debug);
    builder.destination(Destination::Stderr);

    builder.build().unwrap_or_else(|_| null())
}

/// Builds a logger from a TOML configuration snippet, e.g.
///
/// ```toml
/// type = "terminal"
/// level = "debug"
/// destination = "stderr"
/// ```
pub fn from_toml(config: &str) -> Option<Logger> {
    let config: LoggerConfig = serdeconv::from_toml_str(config).ok()?;
    config.build_logger().ok()
}
