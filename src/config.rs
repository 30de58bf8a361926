use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::SessionCode;
use crate::error::HarvestError;

pub const DEFAULT_CONFIG_FILE: &str = "jacow-harvest.json";
pub const DEFAULT_BASE_URL: &str = "https://proceedings.jacow.org/srf2019/";

/// On-disk shape of `jacow-harvest.json`. Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub conference: Option<String>,
    #[serde(default)]
    pub listing_path: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub min_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub backoff_base_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub sessions: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub download: Option<bool>,
    #[serde(default)]
    pub save_page_text: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub base_url: Url,
    pub conference: String,
    pub listing_path: String,
    pub output_dir: Utf8PathBuf,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts per request, first one included.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub timeout: Duration,
    pub sessions: Vec<SessionCode>,
    pub limit: Option<usize>,
    pub download: bool,
    pub save_page_text: bool,
}

impl HarvestConfig {
    pub fn listing_url(&self) -> Result<Url, HarvestError> {
        self.base_url
            .join(&self.listing_path)
            .map_err(|err| HarvestError::InvalidConfig(format!("listing path: {err}")))
    }

    pub fn session_url(&self, code: &SessionCode) -> Result<Url, HarvestError> {
        let path = format!("html/{}.htm", code.as_str().to_lowercase());
        self.base_url
            .join(&path)
            .map_err(|err| HarvestError::InvalidConfig(format!("session url {path}: {err}")))
    }
}

/// Settings that come from the command line and win over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub output_dir: Option<String>,
    pub sessions: Vec<String>,
    pub limit: Option<usize>,
    pub no_download: bool,
    pub save_page_text: bool,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the given file, or `jacow-harvest.json` when it exists, or falls
    /// back to the built-in SRF2019 defaults.
    pub fn resolve(path: Option<&str>) -> Result<HarvestConfig, HarvestError> {
        Self::resolve_with(path, ConfigOverrides::default())
    }

    pub fn resolve_with(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<HarvestConfig, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let mut config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
            serde_json::from_str::<Config>(&content)
                .map_err(|err| HarvestError::ConfigParse(err.to_string()))?
        };

        if let Some(output_dir) = overrides.output_dir {
            config.output_dir = Some(output_dir);
        }
        if !overrides.sessions.is_empty() {
            config.sessions = overrides.sessions;
        }
        if overrides.limit.is_some() {
            config.limit = overrides.limit;
        }
        if overrides.no_download {
            config.download = Some(false);
        }
        if overrides.save_page_text {
            config.save_page_text = Some(true);
        }

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<HarvestConfig, HarvestError> {
        let raw_url = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !raw_url.ends_with('/') {
            return Err(HarvestError::InvalidConfig(format!(
                "base_url must end with '/': {raw_url}"
            )));
        }
        let base_url = Url::parse(&raw_url)
            .map_err(|err| HarvestError::InvalidConfig(format!("base_url {raw_url}: {err}")))?;

        let conference = config.conference.unwrap_or_else(|| "SRF2019".to_string());
        if conference.trim().is_empty() {
            return Err(HarvestError::InvalidConfig(
                "conference must not be empty".to_string(),
            ));
        }

        let min_delay = config.min_delay_ms.unwrap_or(1000);
        let max_delay = config.max_delay_ms.unwrap_or(2000);
        if min_delay > max_delay {
            return Err(HarvestError::InvalidConfig(format!(
                "min_delay_ms ({min_delay}) exceeds max_delay_ms ({max_delay})"
            )));
        }

        let max_retries = config.max_retries.unwrap_or(3);
        if max_retries == 0 {
            return Err(HarvestError::InvalidConfig(
                "max_retries must be at least 1".to_string(),
            ));
        }

        let sessions = config
            .sessions
            .iter()
            .map(|value| SessionCode::normalize(value))
            .collect::<Result<Vec<_>, HarvestError>>()?;

        let output_dir = config
            .output_dir
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| Utf8PathBuf::from(format!("{conference}_Data")));

        Ok(HarvestConfig {
            base_url,
            listing_path: config
                .listing_path
                .unwrap_or_else(|| "html/sessi0n1.htm".to_string()),
            conference,
            output_dir,
            min_delay: Duration::from_millis(min_delay),
            max_delay: Duration::from_millis(max_delay),
            max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms.unwrap_or(1000)),
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(30)),
            sessions,
            limit: config.limit,
            download: config.download.unwrap_or(true),
            save_page_text: config.save_page_text.unwrap_or(false),
        })
    }
}
