//! Process configuration: a YAML file overridden field-by-field by
//! environment variables, per §6 of the specification.
//!
//! Mirrors the ancestor Python implementation's `load_config()`: read YAML
//! (if a config file is present), then walk a fixed env-var map and coerce
//! each override to the field's existing type.

use errors::*;

use directories::ProjectDirs;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "AUDIOBIBLIO_";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_url: String,
    pub library_dir: String,
    pub download_dir: String,
    pub crawl_interval_minutes: i64,
    pub download_interval_minutes: i64,
    pub availability_interval_hours: i64,
    pub rate_limit_rps: f64,
    pub rate_limit_burst: u32,
    pub library_manager_url: Option<String>,
    pub library_manager_api_key: Option<String>,
    pub link_grabber_host: Option<String>,
    pub link_grabber_port: Option<u16>,
    pub web_host: String,
    pub web_port: u16,
    pub num_connections: u32,
    pub num_workers: u32,
}

impl Default for Config {
    fn default() -> Config {
        let dirs = ProjectDirs::from("", "", "audiobiblio");
        let data_dir = dirs
            .as_ref()
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        Config {
            db_url: format!(
                "postgres://localhost/audiobiblio"
            ),
            library_dir: data_dir.join("library").to_string_lossy().into_owned(),
            download_dir: data_dir.join("downloads").to_string_lossy().into_owned(),
            crawl_interval_minutes: 60,
            download_interval_minutes: 5,
            availability_interval_hours: 6,
            rate_limit_rps: 0.5,
            rate_limit_burst: 2,
            library_manager_url: None,
            library_manager_api_key: None,
            link_grabber_host: None,
            link_grabber_port: None,
            web_host: "127.0.0.1".to_owned(),
            web_port: 8080,
            num_connections: 5,
            num_workers: 5,
        }
    }
}

impl Config {
    /// Loads configuration from the default per-user config path (if it
    /// exists), then applies environment variable overrides. Does not error
    /// if no config file is present -- defaults plus env is a valid
    /// configuration on its own.
    pub fn load() -> Result<Config> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_file(&path)?
        } else {
            Config::default()
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "audiobiblio")
            .map(|d| d.config_dir().join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml"))
    }

    pub fn load_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Applies `AUDIOBIBLIO_*` environment overrides, one per field, mirroring
    /// the ancestor's `env_map` coercion-by-existing-type approach.
    fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = env::var(format!("{}DB_URL", ENV_PREFIX)) {
            self.db_url = v;
        }
        if let Ok(v) = env::var(format!("{}LIBRARY_DIR", ENV_PREFIX)) {
            self.library_dir = v;
        }
        if let Ok(v) = env::var(format!("{}DOWNLOAD_DIR", ENV_PREFIX)) {
            self.download_dir = v;
        }
        if let Ok(v) = env::var(format!("{}CRAWL_INTERVAL_MINUTES", ENV_PREFIX)) {
            self.crawl_interval_minutes = v.parse().chain_err(|| "invalid CRAWL_INTERVAL_MINUTES")?;
        }
        if let Ok(v) = env::var(format!("{}DOWNLOAD_INTERVAL_MINUTES", ENV_PREFIX)) {
            self.download_interval_minutes =
                v.parse().chain_err(|| "invalid DOWNLOAD_INTERVAL_MINUTES")?;
        }
        if let Ok(v) = env::var(format!("{}AVAILABILITY_INTERVAL_HOURS", ENV_PREFIX)) {
            self.availability_interval_hours = v
                .parse()
                .chain_err(|| "invalid AVAILABILITY_INTERVAL_HOURS")?;
        }
        if let Ok(v) = env::var(format!("{}RATE_LIMIT_RPS", ENV_PREFIX)) {
            self.rate_limit_rps = v.parse().chain_err(|| "invalid RATE_LIMIT_RPS")?;
        }
        if let Ok(v) = env::var(format!("{}RATE_LIMIT_BURST", ENV_PREFIX)) {
            self.rate_limit_burst = v.parse().chain_err(|| "invalid RATE_LIMIT_BURST")?;
        }
        if let Ok(v) = env::var(format!("{}LIBRARY_MANAGER_URL", ENV_PREFIX)) {
            self.library_manager_url = Some(v);
        }
        if let Ok(v) = env::var(format!("{}LIBRARY_MANAGER_API_KEY", ENV_PREFIX)) {
            self.library_manager_api_key = Some(v);
        }
        if let Ok(v) = env::var(format!("{}LINK_GRABBER_HOST", ENV_PREFIX)) {
            self.link_grabber_host = Some(v);
        }
        if let Ok(v) = env::var(format!("{}LINK_GRABBER_PORT", ENV_PREFIX)) {
            self.link_grabber_port = Some(v.parse().chain_err(|| "invalid LINK_GRABBER_PORT")?);
        }
        if let Ok(v) = env::var(format!("{}WEB_HOST", ENV_PREFIX)) {
            self.web_host = v;
        }
        if let Ok(v) = env::var(format!("{}WEB_PORT", ENV_PREFIX)) {
            self.web_port = v.parse().chain_err(|| "invalid WEB_PORT")?;
        }
        if let Ok(v) = env::var(format!("{}NUM_CONNECTIONS", ENV_PREFIX)) {
            self.num_connections = v.parse().chain_err(|| "invalid NUM_CONNECTIONS")?;
        }
        if let Ok(v) = env::var(format!("{}NUM_WORKERS", ENV_PREFIX)) {
            self.num_workers = v.parse().chain_err(|| "invalid NUM_WORKERS")?;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.db_url.trim().is_empty() {
            return Err(ErrorKind::ConfigMissing("db_url".to_owned()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use config::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_override() {
        let mut config = Config::default();
        env::set_var(format!("{}RATE_LIMIT_RPS", ENV_PREFIX), "1.5");
        env::set_var(format!("{}NUM_WORKERS", ENV_PREFIX), "9");
        config.apply_env().unwrap();
        assert_eq!(1.5, config.rate_limit_rps);
        assert_eq!(9, config.num_workers);
        env::remove_var(format!("{}RATE_LIMIT_RPS", ENV_PREFIX));
        env::remove_var(format!("{}NUM_WORKERS", ENV_PREFIX));
    }
}
