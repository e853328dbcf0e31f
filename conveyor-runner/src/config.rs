//! Runner configuration
//!
//! Defines where the container engine lives, where job updates go and how
//! long a job may run.

use std::path::PathBuf;
use std::time::Duration;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the container engine executable (e.g., "docker")
    pub docker_path: PathBuf,

    /// Path to a standalone compose executable
    ///
    /// When unset, compose commands run as `<docker_path> compose ...`.
    pub docker_compose_path: Option<PathBuf>,

    /// Base URL of the job update endpoint; updates are only logged when unset
    pub update_url: Option<String>,

    /// Maximum wall-clock time for the whole job
    pub time_limit: Option<Duration>,
}

impl Config {
    /// Creates a new configuration with defaults for everything but the engine path
    pub fn new(docker_path: impl Into<PathBuf>) -> Self {
        Self {
            docker_path: docker_path.into(),
            docker_compose_path: None,
            update_url: None,
            time_limit: None,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.docker_path.as_os_str().is_empty() {
            anyhow::bail!("docker_path cannot be empty");
        }

        if let Some(path) = &self.docker_compose_path {
            if path.as_os_str().is_empty() {
                anyhow::bail!("docker_compose_path cannot be empty when set");
            }
        }

        if let Some(url) = &self.update_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("update_url must start with http:// or https://");
            }
        }

        if let Some(limit) = self.time_limit {
            if limit.is_zero() {
                anyhow::bail!("time_limit must be greater than 0");
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.docker_path, PathBuf::from("docker"));
        assert!(config.docker_compose_path.is_none());
        assert!(config.update_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.docker_path = PathBuf::new();
        assert!(config.validate().is_err());

        config.docker_path = PathBuf::from("/usr/bin/docker");
        config.update_url = Some("amqp://bus".to_string());
        assert!(config.validate().is_err());

        config.update_url = Some("https://updates.local".to_string());
        assert!(config.validate().is_ok());

        config.time_limit = Some(Duration::ZERO);
        assert!(config.validate().is_err());

        config.time_limit = Some(Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_compose_path_rejected() {
        let mut config = Config::default();
        config.docker_compose_path = Some(PathBuf::new());
        assert!(config.validate().is_err());
    }
}
