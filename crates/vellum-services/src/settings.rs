use std::time::Duration;
use vellum_core::{Config, MAX_TRASH_RETENTION_DAYS};

/// Runtime policy for the services, derived from [`Config`] or built directly in tests.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub upload_url_ttl: Duration,
    pub download_url_ttl: Duration,
    /// Must stay below `download_url_ttl` so a cached record never carries an expired URL.
    pub cache_ttl: Duration,
    pub trash_retention: chrono::Duration,
    pub version_max_attempts: u32,
    pub quota_enforcement: bool,
    pub purge_interval: Duration,
    pub purge_batch_size: i64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            upload_url_ttl: Duration::from_secs(15 * 60),
            download_url_ttl: Duration::from_secs(60 * 60),
            cache_ttl: Duration::from_secs(10 * 60),
            trash_retention: chrono::Duration::days(30),
            version_max_attempts: 16,
            quota_enforcement: false,
            purge_interval: Duration::from_secs(60 * 60),
            purge_batch_size: 100,
        }
    }
}

impl LifecycleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            upload_url_ttl: Duration::from_secs(config.upload_url_ttl_secs()),
            download_url_ttl: Duration::from_secs(config.download_url_ttl_secs()),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs()),
            trash_retention: chrono::Duration::days(
                config.trash_retention_days().clamp(1, MAX_TRASH_RETENTION_DAYS),
            ),
            version_max_attempts: config.version_max_attempts(),
            quota_enforcement: config.quota_enforcement(),
            purge_interval: Duration::from_secs(config.trash_purge_interval_secs()),
            purge_batch_size: config.trash_purge_batch_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vellum_core::LifecycleConfig;

    #[test]
    fn settings_follow_config() {
        let vars: HashMap<&str, &str> = [
            ("DATABASE_URL", "postgres://localhost/vellum"),
            ("TRASH_RETENTION_DAYS", "7"),
            ("VERSION_MAX_ATTEMPTS", "4"),
            ("QUOTA_ENFORCEMENT", "true"),
        ]
        .into_iter()
        .collect();
        let config = Config(Box::new(
            LifecycleConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap(),
        ));

        let settings = LifecycleSettings::from_config(&config);
        assert_eq!(settings.trash_retention, chrono::Duration::days(7));
        assert_eq!(settings.version_max_attempts, 4);
        assert!(settings.quota_enforcement);
        assert_eq!(settings.download_url_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn oversized_retention_is_clamped_instead_of_overflowing() {
        let vars: HashMap<&str, &str> = [
            ("DATABASE_URL", "postgres://localhost/vellum"),
            ("TRASH_RETENTION_DAYS", "9223372036854775807"),
        ]
        .into_iter()
        .collect();
        let config = Config(Box::new(
            LifecycleConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap(),
        ));

        let settings = LifecycleSettings::from_config(&config);
        assert_eq!(
            settings.trash_retention,
            chrono::Duration::days(MAX_TRASH_RETENTION_DAYS)
        );
    }
}
