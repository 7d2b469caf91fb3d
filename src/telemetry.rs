use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` overrides `settings.level` when set. Formats are `json`
/// (default), `pretty` and `compact`. Returns `false` if a subscriber was
/// already installed, which makes repeated calls from tests harmless.
pub fn init_tracing(settings: &LoggingSettings) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    let installed = match settings.format.as_str() {
        "pretty" => subscriber.pretty().try_init().is_ok(),
        "compact" => subscriber.compact().try_init().is_ok(),
        _ => subscriber.json().try_init().is_ok(),
    };

    if installed {
        tracing::debug!("Tracing initialized (level: {}, format: {})", settings.level, settings.format);
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let settings = LoggingSettings {
            level: "debug".to_string(),
            format: "compact".to_string(),
        };
        init_tracing(&settings);
        assert!(!init_tracing(&settings));
    }
}
