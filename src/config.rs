use std::env;
use std::time::Duration;

/// Engine tunables. Host processes typically build this once at startup,
/// either with defaults or from `AUTOMOD_*` environment variables.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How long deleted-message snapshots are retained for recall.
    pub snipe_retention_secs: u64,
    /// Upper bound on one failure's concurrent action dispatch.
    pub action_timeout: Duration,
    /// Per-domain budget for the links check's best-effort lookups.
    pub dns_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snipe_retention_secs: 300,
            action_timeout: Duration::from_secs(10),
            dns_timeout: Duration::from_secs(2),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// Load from the environment, falling back to defaults. Reads a `.env`
    /// file first if one is present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            snipe_retention_secs: env_u64(
                "AUTOMOD_SNIPE_RETENTION_SECS",
                defaults.snipe_retention_secs,
            ),
            action_timeout: Duration::from_secs(env_u64(
                "AUTOMOD_ACTION_TIMEOUT_SECS",
                defaults.action_timeout.as_secs(),
            )),
            dns_timeout: Duration::from_secs(env_u64(
                "AUTOMOD_DNS_TIMEOUT_SECS",
                defaults.dns_timeout.as_secs(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.snipe_retention_secs, 300);
        assert!(config.action_timeout > config.dns_timeout);
    }

    #[test]
    fn malformed_env_values_fall_back() {
        std::env::set_var("AUTOMOD_SNIPE_RETENTION_SECS", "not-a-number");
        let config = EngineConfig::from_env();
        assert_eq!(config.snipe_retention_secs, 300);
        std::env::remove_var("AUTOMOD_SNIPE_RETENTION_SECS");
    }
}
