//! Tracing setup for the binary.
//!
//! - `WORDMASTER_LOG` holds the filter directives (default `warn,wordmaster=info`).
//! - `WORDMASTER_LOG_FORMAT=json` switches to structured output.
//!
//! Logs go to stderr so they never mix with command output.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn,wordmaster=info";

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("WORDMASTER_LOG")
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    match std::env::var("WORDMASTER_LOG_FORMAT").as_deref() {
        Ok("json") => {
            builder.json().init();
        }
        _ => {
            builder.init();
        }
    }
}
