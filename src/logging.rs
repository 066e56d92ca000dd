use tracing::Level;

/// Log level for a count of `-v` flags. Progress messages show by default.
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global fmt subscriber writing to stderr, so report output on
/// stdout stays clean.
pub fn init(verbosity: u8) {
    tracing_subscriber::fmt()
        .with_max_level(level_for(verbosity))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
