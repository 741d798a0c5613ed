use super::types::ServerConfig;
use std::fs;
use std::path::Path;

const VALID_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
const VALID_FORMATS: [&str; 2] = ["compact", "json"];

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let mut config: ServerConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

        config.finalize()?;

        Ok(config)
    }

    /// Normalize and validate configuration.
    pub fn finalize(&mut self) -> anyhow::Result<()> {
        self.logging.level = self.logging.level.to_lowercase();
        self.logging.format = self.logging.format.to_lowercase();

        self.validate()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node.project.trim().is_empty() {
            return Err(anyhow::anyhow!("node.project cannot be empty"));
        }

        let realtime = &self.realtime;
        if realtime.worker_count == 0 {
            return Err(anyhow::anyhow!("realtime.worker_count must be at least 1"));
        }
        if realtime.channel_capacity == 0 {
            return Err(anyhow::anyhow!("realtime.channel_capacity must be at least 1"));
        }
        if realtime.quorum_timeout_secs == 0 {
            return Err(anyhow::anyhow!("realtime.quorum_timeout_secs must be at least 1"));
        }
        if realtime.pending_sweep_interval_secs == 0 {
            return Err(anyhow::anyhow!(
                "realtime.pending_sweep_interval_secs must be at least 1"
            ));
        }

        if self.cluster.alive_nodes == 0 {
            return Err(anyhow::anyhow!("cluster.alive_nodes must be at least 1"));
        }

        if !VALID_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                VALID_LEVELS.join(", ")
            ));
        }

        if !VALID_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                VALID_FORMATS.join(", ")
            ));
        }

        for (target, level) in &self.logging.targets {
            if !VALID_LEVELS.contains(&level.as_str()) {
                return Err(anyhow::anyhow!(
                    "Invalid log level '{}' for target '{}'. Must be one of: {}",
                    level,
                    target,
                    VALID_LEVELS.join(", ")
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.realtime.enabled);
        assert_eq!(config.realtime.channel_capacity, 5);
        assert_eq!(config.realtime.quorum_timeout_secs, 10);
    }

    #[test]
    fn test_missing_realtime_section_is_disabled() {
        let config = ServerConfig::from_toml_str("[node]\nproject = \"shop\"\n").unwrap();
        assert_eq!(config.node.project, "shop");
        assert!(!config.realtime.enabled);
    }

    #[test]
    fn test_realtime_section_overrides() {
        let config = ServerConfig::from_toml_str(
            r#"
            [realtime]
            enabled = true
            worker_count = 3

            [logging]
            level = "DEBUG"
            targets = { skyfeed_realtime = "trace" }
            "#,
        )
        .unwrap();

        assert!(config.realtime.enabled);
        assert_eq!(config.realtime.worker_count, 3);
        assert_eq!(config.realtime.channel_capacity, 5);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = ServerConfig::default();
        config.realtime.worker_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = ServerConfig::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.logging.targets.insert("skyfeed_bus".to_string(), "loud".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cluster]\nalive_nodes = 3").unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.cluster.alive_nodes, 3);

        assert!(ServerConfig::from_file("/nonexistent/skyfeed.toml").is_err());
    }
}
