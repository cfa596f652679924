//! Loading the shipped configuration and its failure modes

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;
    use tabular_import::config::Config;
    use tabular_import::utils::error::ImportError;
    use tempfile::NamedTempFile;

    const EXAMPLE: &str = include_str!("../../config/imports.yaml.example");

    #[test]
    fn test_example_config_parses() {
        let config = Config::from_yaml_str(EXAMPLE).unwrap();

        assert_eq!(config.server().port, 8000);
        assert!(config.storage().database.enabled);
        assert!(!config.storage().redis.enabled);

        let import = config.import();
        assert_eq!(import.batch_size, 100);
        assert_eq!(import.max_attempts, 3);
        assert_eq!(import.batch_timeout(), Duration::from_secs(300));
        assert_eq!(import.retry_backoff(), Duration::from_millis(500));
        assert_eq!(import.persist_step_percent, 5);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = Config::from_yaml_str("import:\n  batch_size: 25\n").unwrap();
        let defaults = Config::default();

        assert_eq!(config.import().batch_size, 25);
        assert_eq!(config.import().max_attempts, defaults.import().max_attempts);
        assert_eq!(config.server().port, defaults.server().port);
        assert!(!config.storage().database.enabled);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for yaml in [
            "import:\n  batch_size: 0\n",
            "import:\n  persist_step_percent: 0\n",
            "import:\n  worker_concurrency: 0\n",
            "server:\n  port: 0\n",
            "storage:\n  redis:\n    enabled: true\n    url: not a url\n",
        ] {
            let err = Config::from_yaml_str(yaml).unwrap_err();
            assert!(matches!(err, ImportError::Config(_)), "{yaml}: {err}");
        }
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        let err = Config::from_yaml_str("import: [batch_size").unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[tokio::test]
    async fn test_round_trip_through_file() {
        let original = Config::from_yaml_str(EXAMPLE).unwrap();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(original.to_yaml().unwrap().as_bytes()).unwrap();

        let loaded = Config::from_file(file.path()).await.unwrap();
        assert_eq!(loaded.import().batch_size, original.import().batch_size);
        assert_eq!(loaded.storage().database.url, original.storage().database.url);
        assert_eq!(loaded.logging().level, original.logging().level);
    }
}
