//! LeadSync configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main LeadSync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// CRM API configuration
    pub crm: CrmConfig,

    /// Spreadsheet configuration
    pub sheets: SheetsConfig,

    /// Cache configuration
    pub cache: CacheConfig,

    /// Lead selection and row formatting
    pub export: ExportConfig,

    /// Retry policy for upstream calls
    pub retry: RetryConfig,

    /// Interval for `leadsync watch`
    pub schedule: ScheduleConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that required environment variables and ids are set.
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        self.crm.get_api_key().context("CRM API key not found")?;
        self.sheets.get_token().context("Spreadsheet access token not found")?;
        if self.sheets.spreadsheet_id.trim().is_empty() {
            return Err(eyre::eyre!("sheets.spreadsheet-id is not set"));
        }
        self.export.validate()?;
        Ok(())
    }

    /// Load configuration
    ///
    /// An explicit path must load. Otherwise the first readable file among
    /// [`Config::search_paths`] wins, and defaults apply when none does.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::search_paths().iter().filter(|p| p.exists()) {
            match Self::load_from_file(candidate) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!(path = %candidate.display(), error = %e, "Skipping unreadable config"),
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// `./.leadsync.yml`, then `<config_dir>/leadsync/leadsync.yml`
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".leadsync.yml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("leadsync").join("leadsync.yml"));
        }
        paths
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// CRM API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Prefix of a lead's web page; the lead id is appended
    #[serde(rename = "lead-url")]
    pub lead_url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.okocrm.com/v2".to_string(),
            api_key_env: "OKOCRM_API_KEY".to_string(),
            lead_url: "https://app.okocrm.com/leads/".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl CrmConfig {
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).context(format!("Environment variable {} is not set", self.api_key_env))
    }
}

/// Spreadsheet configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Target spreadsheet document id
    #[serde(rename = "spreadsheet-id")]
    pub spreadsheet_id: String,

    /// Environment variable containing an OAuth access token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// Title of the sheet new monthly sheets are cloned from
    #[serde(rename = "template-title")]
    pub template_title: String,

    /// Minimum spacing between write calls in milliseconds
    #[serde(rename = "write-interval-ms")]
    pub write_interval_ms: u64,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sheets.googleapis.com/v4".to_string(),
            spreadsheet_id: String::new(),
            token_env: "GOOGLE_SHEETS_TOKEN".to_string(),
            template_title: "Шаблон".to_string(),
            // 60 writes per minute per user is the API quota
            write_interval_ms: 1_100,
            timeout_ms: 30_000,
        }
    }
}

impl SheetsConfig {
    pub fn get_token(&self) -> Result<String> {
        std::env::var(&self.token_env).context(format!("Environment variable {} is not set", self.token_env))
    }

    pub fn write_interval(&self) -> Duration {
        Duration::from_millis(self.write_interval_ms)
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache file location
    pub path: PathBuf,

    /// Lifetime of every cached upstream response in seconds
    #[serde(rename = "ttl-secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/leadsync on Linux)
        let path = dirs::data_dir()
            .map(|d| d.join("leadsync"))
            .unwrap_or_else(|| PathBuf::from("storage"))
            .join("cache.json");

        Self { path, ttl_secs: 30 * 60 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Lead selection and row formatting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Only leads that arrived at their stage within this many days are exported
    #[serde(rename = "lookback-days")]
    pub lookback_days: u32,

    /// Stop paging after this many pages; zero or negative means no limit
    #[serde(rename = "max-pages")]
    pub max_pages: i64,

    /// Stage names whose leads are exported (matched trimmed, case-insensitive)
    pub stages: Vec<String>,

    /// IANA time zone used for the cutoff, dates and sheet names
    pub timezone: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            max_pages: 0,
            stages: vec!["Полис оформлен".to_string(), "Оплачено".to_string()],
            timezone: "Europe/Moscow".to_string(),
        }
    }
}

/// Longest accepted `export.lookback-days`
pub const MAX_LOOKBACK_DAYS: u32 = 3660;

impl ExportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(eyre::eyre!(
                "export.lookback-days is {}, at most {} is allowed",
                self.lookback_days,
                MAX_LOOKBACK_DAYS
            ));
        }
        self.timezone()?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| eyre::eyre!("Invalid export.timezone '{}': {}", self.timezone, e))
    }

    /// Page ceiling, `None` when disabled
    pub fn page_limit(&self) -> Option<u32> {
        if self.max_pages <= 0 {
            None
        } else {
            Some(u32::try_from(self.max_pages).unwrap_or(u32::MAX))
        }
    }
}

/// Retry policy for upstream calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Number of retries after the first attempt
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, doubled on every further retry
    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> crate::retry::RetryPolicy {
        crate::retry::RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

/// Interval for `leadsync watch`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Seconds between the end of one cycle and the start of the next
    #[serde(rename = "interval-secs")]
    pub interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { interval_secs: 10 * 60 }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.crm.base_url, "https://api.okocrm.com/v2");
        assert_eq!(config.cache.ttl(), Duration::from_secs(1800));
        assert_eq!(config.export.lookback_days, 30);
        assert_eq!(config.export.page_limit(), None);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.cache.path.ends_with("cache.json"));
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
crm:
  api-key-env: MY_CRM_KEY
  lead-url: https://example.okocrm.com/leads/
  timeout-ms: 5000

sheets:
  spreadsheet-id: 1AbCdEf
  template-title: Template
  write-interval-ms: 250

cache:
  path: /tmp/leadsync/cache.json
  ttl-secs: 60

export:
  lookback-days: 7
  max-pages: 20
  stages:
    - Won
    - " Paid "
  timezone: Europe/Berlin

retry:
  max-attempts: 5
  base-delay-ms: 200

schedule:
  interval-secs: 900

log-level: debug
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.crm.api_key_env, "MY_CRM_KEY");
        assert_eq!(config.crm.timeout_ms, 5000);
        assert_eq!(config.sheets.spreadsheet_id, "1AbCdEf");
        assert_eq!(config.sheets.write_interval(), Duration::from_millis(250));
        assert_eq!(config.cache.path, PathBuf::from("/tmp/leadsync/cache.json"));
        assert_eq!(config.export.lookback_days, 7);
        assert_eq!(config.export.page_limit(), Some(20));
        assert_eq!(config.export.stages, vec!["Won".to_string(), " Paid ".to_string()]);
        assert_eq!(config.export.timezone().unwrap(), chrono_tz::Europe::Berlin);
        assert_eq!(config.retry.base_delay_ms, 200);
        assert_eq!(config.schedule.interval(), Duration::from_secs(900));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
sheets:
  spreadsheet-id: doc-1
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.sheets.spreadsheet_id, "doc-1");

        // Defaults for unspecified
        assert_eq!(config.sheets.token_env, "GOOGLE_SHEETS_TOKEN");
        assert_eq!(config.sheets.template_title, "Шаблон");
        assert_eq!(config.export.timezone, "Europe/Moscow");
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_negative_page_ceiling_disables_limit() {
        let config = ExportConfig {
            max_pages: -1,
            ..Default::default()
        };
        assert_eq!(config.page_limit(), None);
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let config = ExportConfig {
            timezone: "Mars/Olympus".to_string(),
            ..Default::default()
        };
        assert!(config.timezone().is_err());
    }

    #[test]
    fn test_lookback_bounds() {
        let mut config = ExportConfig {
            lookback_days: MAX_LOOKBACK_DAYS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.lookback_days = 200_000_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lookback-days"));
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("leadsync.yml");
        fs::write(&path, "export:\n  lookback-days: 3\nlog-level: warn\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.export.lookback_days, 3);
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("warn"));

        let missing = temp.path().join("absent.yml");
        assert!(Config::load(Some(&missing)).is_err());
        assert_eq!(Config::load_log_level(Some(&missing)), None);
    }

    #[test]
    fn test_search_paths_prefer_local_file() {
        let paths = Config::search_paths();
        assert_eq!(paths[0], PathBuf::from(".leadsync.yml"));
        assert!(paths.iter().skip(1).all(|p| p.ends_with("leadsync/leadsync.yml")));
    }

    fn env_config(suffix: &str) -> Config {
        let mut config = Config::default();
        config.crm.api_key_env = format!("LEADSYNC_TEST_CRM_KEY_{}", suffix);
        config.sheets.token_env = format!("LEADSYNC_TEST_SHEETS_TOKEN_{}", suffix);
        config.sheets.spreadsheet_id = "doc-1".to_string();
        config
    }

    #[test]
    #[serial]
    fn test_validate_requires_secrets() {
        let config = env_config("MISSING");
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("LEADSYNC_TEST_CRM_KEY_MISSING"));
    }

    #[test]
    #[serial]
    fn test_validate_accepts_complete_config() {
        let config = env_config("SET");
        // SAFETY: serialized with the other environment tests
        unsafe {
            std::env::set_var(&config.crm.api_key_env, "key");
            std::env::set_var(&config.sheets.token_env, "token");
        }

        assert!(config.validate().is_ok());

        let mut no_document = config.clone();
        no_document.sheets.spreadsheet_id = " ".to_string();
        assert!(no_document.validate().is_err());

        let mut long_lookback = config.clone();
        long_lookback.export.lookback_days = u32::MAX;
        assert!(long_lookback.validate().is_err());

        unsafe {
            std::env::remove_var(&config.crm.api_key_env);
            std::env::remove_var(&config.sheets.token_env);
        }
    }
}
