pub mod api;
pub mod config;
pub mod core;

/// Install the `env_logger` backend (`RUST_LOG`, default `info`). Safe to
/// call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
