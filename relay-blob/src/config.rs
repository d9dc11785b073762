use std::time::Duration;

use relay_core::RelayConfigSnapshot;

/// Layout and lifetimes for staged blobs
#[derive(Debug, Clone)]
pub struct StagingConfig {
    /// Root under which devices upload their own files.
    pub device_folder: String,

    /// Root under which the relay stages oversized request bodies.
    pub server_folder: String,

    /// Sub-folder marking relay-owned blobs, both under `server_folder` and
    /// inside device-uploaded trees.
    pub server_sub_folder: String,

    /// Lifetime of the read URL handed to a device.
    pub read_access_ttl: Duration,

    /// Concurrent deletes during a sweep.
    pub sweep_concurrency: usize,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            device_folder: "device-uploads".to_string(),
            server_folder: "server-uploads".to_string(),
            server_sub_folder: "RestApi".to_string(),
            read_access_ttl: Duration::from_secs(20 * 60),
            sweep_concurrency: 8,
        }
    }
}

impl StagingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `storage.*` and `cleanup.max_concurrency`, keeping defaults for
    /// anything missing.
    pub fn from_snapshot(config: &RelayConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            device_folder: config.get_string_or("storage.device_folder", &defaults.device_folder),
            server_folder: config.get_string_or("storage.server_folder", &defaults.server_folder),
            server_sub_folder: config
                .get_string_or("storage.server_sub_folder", &defaults.server_sub_folder),
            read_access_ttl: config
                .get_u64("storage.read_access_ttl")
                .map(Duration::from_secs)
                .unwrap_or(defaults.read_access_ttl),
            sweep_concurrency: config
                .get_usize("cleanup.max_concurrency")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.sweep_concurrency),
        }
    }

    pub fn with_device_folder(mut self, folder: impl Into<String>) -> Self {
        self.device_folder = folder.into();
        self
    }

    pub fn with_server_folder(mut self, folder: impl Into<String>) -> Self {
        self.server_folder = folder.into();
        self
    }

    pub fn with_server_sub_folder(mut self, folder: impl Into<String>) -> Self {
        self.server_sub_folder = folder.into();
        self
    }

    pub fn with_read_access_ttl(mut self, ttl: Duration) -> Self {
        self.read_access_ttl = ttl;
        self
    }

    pub fn with_sweep_concurrency(mut self, concurrency: usize) -> Self {
        self.sweep_concurrency = concurrency.max(1);
        self
    }
}

/// When and how aggressively the periodic sweep runs
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Blobs older than this are deleted.
    pub expiration: Duration,

    /// Time between two sweeps.
    pub interval: Duration,

    pub disabled: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            expiration: Duration::from_secs(7 * 24 * 60 * 60),
            interval: Duration::from_secs(7 * 24 * 60 * 60),
            disabled: false,
        }
    }
}

impl CleanupConfig {
    /// Read `cleanup.expiration_minutes`, `cleanup.interval` (seconds) and
    /// `cleanup.disabled`.
    pub fn from_snapshot(config: &RelayConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            expiration: config
                .get_u64("cleanup.expiration_minutes")
                .and_then(|minutes| minutes.checked_mul(60))
                .map(Duration::from_secs)
                .unwrap_or(defaults.expiration),
            interval: config
                .get_u64("cleanup.interval")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
            disabled: config.get_bool("cleanup.disabled").unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::RelayConfig;

    #[test]
    fn snapshot_overrides_selected_fields() {
        let mut config = RelayConfig::new();
        config.set("storage.server_sub_folder", "Relay");
        config.set("storage.read_access_ttl", "60");
        config.set("cleanup.max_concurrency", "0");
        config.set("cleanup.expiration_minutes", "1440");

        let snap = config.snapshot();
        let staging = StagingConfig::from_snapshot(&snap);
        assert_eq!(staging.server_sub_folder, "Relay");
        assert_eq!(staging.device_folder, "device-uploads");
        assert_eq!(staging.read_access_ttl, Duration::from_secs(60));
        assert_eq!(staging.sweep_concurrency, 8);

        let cleanup = CleanupConfig::from_snapshot(&snap);
        assert_eq!(cleanup.expiration, Duration::from_secs(24 * 60 * 60));
        assert_eq!(cleanup.interval, Duration::from_secs(604_800));
        assert!(!cleanup.disabled);
    }

    #[test]
    fn overflowing_expiration_falls_back_to_default() {
        let mut config = RelayConfig::new();
        config.set("cleanup.expiration_minutes", u64::MAX.to_string());

        let cleanup = CleanupConfig::from_snapshot(&config.snapshot());
        assert_eq!(cleanup.expiration, CleanupConfig::default().expiration);
    }
}
