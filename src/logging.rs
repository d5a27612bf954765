//! Subscriber setup for the `rag` binary.
//!
//! Library code only emits `tracing` events. The binary calls [`init`] once
//! after loading the configuration. `RUST_LOG` wins over `[logging].level`.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| anyhow!("invalid log filter '{}': {}", config.level, e))?;

    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);

    let result = if config.json {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.with_target(false).try_init()
    };

    result.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}
