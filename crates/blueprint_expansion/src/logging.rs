use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::ExpansionConfig;

/// Install a global fmt subscriber. `RUST_LOG` wins over the configured level.
pub fn init(config: &ExpansionConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(&config.log_level).with_context(|| format!("Invalid log level '{}'", config.log_level))
    })?;

    Registry::default()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!(
        max_expansion_passes = config.max_expansion_passes,
        vm_max_steps = config.vm_max_steps,
        "Blueprint expansion logging initialised"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_once() {
        let config = ExpansionConfig::default();
        // The global subscriber can only be installed once per process
        let first = init(&config);
        if first.is_ok() {
            assert!(init(&config).is_err());
        }
    }
}
