use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use swb_core::errors::ConfigError;
use swb_core::PairingConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub bind_addr: String,
    /// Identity and paired-client records.
    pub key_file: PathBuf,

    // Logging
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub log_json: bool,

    pub pairing: PairingConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7722".to_string(),
            key_file: PathBuf::from("swb-keys.json"),
            log_level: "info".to_string(),
            log_file: None,
            log_json: false,
            pairing: PairingConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;

        let config: AgentConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("SWB_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(path) = std::env::var("SWB_KEY_FILE") {
            config.key_file = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("SWB_LOG_FILE") {
            config.log_file = Some(PathBuf::from(path));
        }
        if let Ok(json) = std::env::var("SWB_LOG_JSON") {
            config.log_json = matches!(json.as_str(), "1" | "true" | "yes");
        }
        if let Ok(secs) = std::env::var("SWB_PAIRING_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.pairing.pairing_timeout_secs = secs;
            }
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = level;
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr.parse::<SocketAddr>().map_err(|e| {
            ConfigError::ValidationError(format!("bind_addr {:?}: {}", self.bind_addr, e))
        })?;
        if self.key_file.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError("key_file must be set".to_string()));
        }
        if let Some(log_file) = &self.log_file {
            if log_file.file_name().is_none() {
                return Err(ConfigError::ValidationError(
                    "log_file must name a file".to_string(),
                ));
            }
        }
        self.pairing.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        AgentConfig::default().validate().unwrap();
    }

    #[test]
    fn test_load_toml_with_pairing_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            r#"
bind_addr = "0.0.0.0:9000"
key_file = "/var/lib/swb/keys.json"
log_json = true

[pairing]
pairing_timeout_secs = 90
max_clients = 2
"#,
        )
        .unwrap();

        let config = AgentConfig::load_from_file(&path).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert!(config.log_json);
        assert_eq!(config.pairing.pairing_timeout_secs, 90);
        assert_eq!(config.pairing.max_clients, 2);
        assert_eq!(config.pairing.pin_digits, 6);
    }

    #[test]
    fn test_missing_file() {
        let err = AgentConfig::load_from_file(Path::new("/nonexistent/agent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_bad_bind_addr_rejected() {
        let config = AgentConfig { bind_addr: "localhost".into(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_invalid_pairing_section_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "[pairing]\npin_digits = 2\n").unwrap();
        assert!(matches!(
            AgentConfig::load_from_file(&path),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
