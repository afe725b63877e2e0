//! Global tracing setup.
//!
//! The teacher initializes a JSON `tracing_subscriber` for production and a
//! human-readable one for local development (`Qovery-engine/Cargo.toml`'s
//! `# logger` dependency block: `tracing` + `tracing-subscriber` with the
//! `json` feature). Hydra does the same, gated by `HYDRA_LOG_FORMAT`
//! (`json` | `pretty`, default `pretty`).

use tracing_subscriber::EnvFilter;

/// Initializes the global subscriber. Safe to call once at process start;
/// subsequent calls are ignored (mirrors `tracing_subscriber`'s own
/// set-once-global semantics via `try_init`).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("HYDRA_LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(err) = result {
        eprintln!("tracing subscriber already initialized: {err}");
    }
}
