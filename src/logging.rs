// src/logging.rs
//! Log output setup

use tracing_subscriber::EnvFilter;

/// Filter directive for a `-v`/`-q` count: negative is silent, 0 info,
/// 1 debug, 2 and up trace.
pub fn level_directive(verbosity: i8) -> &'static str {
    match verbosity {
        i8::MIN..=-1 => "off",
        0 => "gps_relay=info",
        1 => "gps_relay=debug",
        _ => "gps_relay=trace",
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the verbosity count.
pub fn init(verbosity: i8) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::builder().from_env_lossy()
    } else {
        EnvFilter::builder().parse_lossy(level_directive(verbosity))
    };

    let _ = tracing_subscriber::fmt::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(
            "%Y-%m-%d %H:%M:%S%.3f".to_string(),
        ))
        .try_init();
}
