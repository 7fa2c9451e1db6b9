//! Log output setup.

use tracing::level_filters::LevelFilter;

/// Installs the global subscriber writing to stderr.
///
/// Does nothing if a subscriber is already installed.
pub fn init(level: LevelFilter) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
