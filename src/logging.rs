//! Diagnostic output via `tracing`.
//!
//! Logs go to stderr so that cue text printed on stdout stays readable.
//! `RUST_LOG` takes precedence over the verbosity flag when set.

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for(verbosity).as_str().to_lowercase()));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_for(0), Level::WARN);
        assert_eq!(level_for(1), Level::INFO);
        assert_eq!(level_for(2), Level::DEBUG);
        assert_eq!(level_for(9), Level::TRACE);
    }

    #[test]
    fn init_twice_does_not_panic() {
        init(0);
        init(2);
    }
}
