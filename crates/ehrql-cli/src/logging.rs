//! `tracing`/`tracing-subscriber` wiring (spec §1 ambient stack): a
//! single stderr writer whose level follows `-v`/`-q` flags, with
//! `RUST_LOG`/`LOG_LEVEL` left free to override.

use clap_verbosity_flag::{Verbosity, WarnLevel};
use tracing_subscriber::EnvFilter;

/// Build an `EnvFilter` from `-v`/`-q` flags, honoring `RUST_LOG`/
/// `LOG_LEVEL` overrides when set.
pub fn init(verbosity: &Verbosity<WarnLevel>) {
    let level = std::env::var("LOG_LEVEL").ok().unwrap_or_else(|| verbosity.tracing_level_filter().to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
