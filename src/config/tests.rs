#[cfg(test)]
mod tests {
    use crate::config::CoordinationConfig;
    use crate::sharding::ShardKeyStrategy;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = CoordinationConfig::default();

        assert!(config.embedded);
        assert_eq!(config.root_path, "/cluster");
        assert_eq!(config.shard_count, 10);
        assert_eq!(config.namespace().root(), "/cluster");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let raw = r#"
            embedded = false
            store_url = "http://10.0.0.5:2181"
            root_path = "search/"
            shard_key_strategy = "value_hash"
        "#;

        let config = CoordinationConfig::from_toml_str(raw).unwrap();

        assert!(!config.embedded);
        assert_eq!(config.store_url, "http://10.0.0.5:2181");
        assert_eq!(config.namespace().root(), "/search");
        assert_eq!(config.shard_key_strategy, ShardKeyStrategy::ValueHash);
        assert_eq!(config.session_timeout_ms, 6_000);
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        assert!(CoordinationConfig::from_toml_str("shard_count = \"many\"").is_err());
        assert!(CoordinationConfig::from_toml_str("shard_count = 0").is_err());
    }

    #[test]
    fn test_overrides_by_variable_name() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("COORD_EMBEDDED", "false"),
            ("COORD_SESSION_TIMEOUT_MS", "2500"),
            ("COORD_POLL_WAIT_MS", "200"),
            ("COORD_SHARD_COUNT", "4"),
        ]);

        let config = CoordinationConfig::default()
            .with_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert!(!config.embedded);
        assert_eq!(config.session_timeout_ms, 2500);
        assert_eq!(config.shard_count, 4);
        assert_eq!(config.bind_addr, "127.0.0.1:2181");
    }

    #[test]
    fn test_malformed_override_names_the_variable() {
        let err = CoordinationConfig::default()
            .with_overrides(|key| (key == "COORD_SHARD_COUNT").then(|| "x".to_string()))
            .unwrap_err();

        assert!(err.to_string().contains("COORD_SHARD_COUNT"));
    }

    #[test]
    fn test_non_slash_separator_is_rejected() {
        // ARRANGE
        let mut config = CoordinationConfig::default();
        config.path_separator = '.';

        // ACT / ASSERT: Rejected directly, from TOML and from the environment
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("path_separator"));
        assert!(CoordinationConfig::from_toml_str("path_separator = \".\"").is_err());
        assert!(CoordinationConfig::default()
            .with_overrides(|key| (key == "COORD_PATH_SEPARATOR").then(|| ".".to_string()))
            .is_err());
        assert!(CoordinationConfig::default()
            .with_overrides(|key| (key == "COORD_PATH_SEPARATOR").then(|| "/".to_string()))
            .is_ok());
    }
}
