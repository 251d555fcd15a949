/// Initializes the `env_logger` backend for the `log` facade
///
/// Logs go to stderr so they never mix with command output on stdout.
///
/// Log level is Debug in development builds and Info in production builds;
/// `RUST_LOG` overrides both.
pub fn init() {
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Keep dependencies (reqwest, hyper) quiet unless asked for
    let default_filter = format!("warn,onboard={level},onboard_lib={level},onboard_ollama={level}");

    let result = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter),
    )
    .format_timestamp_millis()
    .try_init();

    if let Err(e) = result {
        eprintln!("Logger already initialized: {}", e);
    }
}
