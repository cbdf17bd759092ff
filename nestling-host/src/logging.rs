//! Logging setup for hosts embedding the companion.

use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

use nestling_core::config::GeneralConfig;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `config.log_level` is used. With
/// `config.json_logs` every event is one JSON object per line.
///
/// # Errors
/// Fails if the level is not a valid filter or a subscriber is already set.
pub fn init(config: &GeneralConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_level_is_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = GeneralConfig {
            log_level: "nestling=verbose".to_string(),
            json_logs: false,
        };
        assert!(init(&config).is_err());
    }
}
