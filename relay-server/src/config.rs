use relay_core::{RelayConfig, ENV_PREFIX};

/// Defaults for every key the server reads. Environment values loaded
/// afterwards take precedence.
const DEFAULTS: &[(&str, &str)] = &[
    ("http.host", "127.0.0.1"),
    ("http.port", "3030"),
    ("device.method_name", "RestApi"),
    ("device.response_timeout", "30"),
    ("device.message_size_threshold", "65536"),
    ("storage.backend", "s3"),
    ("storage.bucket", "cloud-relay"),
    ("storage.device_folder", "device-uploads"),
    ("storage.server_folder", "server-uploads"),
    ("storage.server_sub_folder", "RestApi"),
    ("storage.read_access_ttl", "1200"),
    ("cleanup.expiration_minutes", "10080"),
    ("cleanup.interval", "604800"),
    ("cleanup.disabled", "false"),
    ("cleanup.max_concurrency", "8"),
];

/// Build the server configuration from `RELAY__*` environment variables.
pub fn config() -> RelayConfig {
    from_vars(std::env::vars())
}

pub fn from_vars<I>(vars: I) -> RelayConfig
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut config = RelayConfig::new();
    config.load_from_iter(ENV_PREFIX, vars);
    for (key, value) in DEFAULTS {
        config.set_default(*key, *value);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_overrides_defaults() {
        let config = from_vars([
            ("RELAY__HTTP__PORT".to_string(), "8080".to_string()),
            ("RELAY__DEVICE__ENDPOINT".to_string(), "https://hub.local".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ]);
        let snapshot = config.snapshot();

        assert_eq!(snapshot.get("http.port"), Some("8080"));
        assert_eq!(snapshot.get("http.host"), Some("127.0.0.1"));
        assert_eq!(snapshot.get("device.endpoint"), Some("https://hub.local"));
        assert_eq!(snapshot.get_u64("cleanup.expiration_minutes"), Some(7 * 24 * 60));
        assert_eq!(snapshot.get_bool("cleanup.disabled"), Some(false));
        assert!(!config.has("unrelated"));
    }
}
