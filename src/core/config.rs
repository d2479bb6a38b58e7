use crate::core::errors::{ConfigError, ConfigResult};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Name of the per-user settings sub-directory
const SETTINGS_SUBDIR: &str = "manga-translator";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
    /// Optional log file; relative paths resolve inside the settings directory
    pub log_file: Option<PathBuf>,
}

/// Translation provider selected by `TRANSLATION_SERVICE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranslationService {
    Google,
    DeepL,
}

impl TranslationService {
    /// Name used in config and as the cache record's service key
    pub fn name(&self) -> &'static str {
        match self {
            TranslationService::Google => "google",
            TranslationService::DeepL => "deepL",
        }
    }
}

impl fmt::Display for TranslationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TranslationService {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "google" => Ok(TranslationService::Google),
            "deepL" | "deepl" => Ok(TranslationService::DeepL),
            other => Err(ConfigError::UnknownService(other.to_string())),
        }
    }
}

/// Translation configuration
///
/// May be blank: it is validated per page load, not at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationConfig {
    pub selected_service: String,
    pub source_language: String,
    pub target_language: String,
    pub google_api_key: String,
    pub deepl_api_key: String,
    pub vision_api_key: String,
}

/// Validated view of [`TranslationConfig`] for one page load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationSettings {
    pub service: TranslationService,
    pub source_language: String,
    pub target_language: String,
    pub credential: String,
}

impl TranslationConfig {
    pub fn is_blank(&self) -> bool {
        *self == TranslationConfig::default()
    }

    /// Resolve the selected service and its credential.
    pub fn validate(&self) -> ConfigResult<TranslationSettings> {
        if self.is_blank() || self.selected_service.trim().is_empty() {
            return Err(ConfigError::Missing);
        }

        let service: TranslationService = self.selected_service.parse()?;

        if self.source_language.trim().is_empty() {
            return Err(ConfigError::BlankField("SOURCE_LANGUAGE"));
        }
        if self.target_language.trim().is_empty() {
            return Err(ConfigError::BlankField("TARGET_LANGUAGE"));
        }

        let credential = match service {
            TranslationService::Google => &self.google_api_key,
            TranslationService::DeepL => &self.deepl_api_key,
        };
        if credential.trim().is_empty() {
            return Err(ConfigError::MissingCredential(service.name().to_string()));
        }

        Ok(TranslationSettings {
            service,
            source_language: self.source_language.trim().to_string(),
            target_language: self.target_language.trim().to_string(),
            credential: credential.trim().to_string(),
        })
    }
}

/// API client configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub timeout: Duration,
    pub max_retries: u32,
}

/// Page pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of pages after the current one loaded in the background
    pub preload_pages: usize,
    pub load_timeout: Duration,
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub settings_dir: PathBuf,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub translation: TranslationConfig,
    pub api: ApiConfig,
    pub pipeline: PipelineConfig,
    pub cache: CacheConfig,
}

impl Config {
    pub fn new() -> ConfigResult<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> ConfigResult<Self> {
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        let settings_dir = match env::var("SETTINGS_DIR").ok().filter(|s| !s.trim().is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .or_else(dirs::home_dir)
                .map(|p| p.join(SETTINGS_SUBDIR))
                .ok_or(ConfigError::NoSettingsDir)?,
        };

        let google_api_key = env::var("GOOGLE_API_KEY").unwrap_or_default();

        Ok(Self {
            server: ServerConfig {
                port: parse_var("SERVER_PORT")?.unwrap_or(1420),
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                log_level,
                log_file: env::var("LOG_FILE")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .map(PathBuf::from),
            },
            translation: TranslationConfig {
                selected_service: env::var("TRANSLATION_SERVICE").unwrap_or_default(),
                source_language: env::var("SOURCE_LANGUAGE").unwrap_or_else(|_| "ja".to_string()),
                target_language: env::var("TARGET_LANGUAGE").unwrap_or_else(|_| "en".to_string()),
                vision_api_key: env::var("VISION_API_KEY")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| google_api_key.clone()),
                google_api_key,
                deepl_api_key: env::var("DEEPL_API_KEY").unwrap_or_default(),
            },
            api: ApiConfig {
                timeout: Duration::from_secs(parse_var("API_TIMEOUT_SECONDS")?.unwrap_or(60)),
                max_retries: parse_var("MAX_RETRIES")?.unwrap_or(3),
            },
            pipeline: PipelineConfig {
                preload_pages: parse_var("PRELOAD_PAGES")?.unwrap_or(2),
                load_timeout: Duration::from_secs(parse_var("LOAD_TIMEOUT_SECONDS")?.unwrap_or(120)),
            },
            cache: CacheConfig { settings_dir },
        })
    }

    fn validate(&self) -> ConfigResult<()> {
        // The translation section is checked per page load so a blank
        // config fails pages, not startup.
        if self.pipeline.load_timeout.is_zero() {
            return Err(ConfigError::InvalidLoadTimeout);
        }

        if self.cache.settings_dir.as_os_str().is_empty() {
            return Err(ConfigError::NoSettingsDir);
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    /// Log file path, resolved against the settings directory
    pub fn log_file(&self) -> Option<PathBuf> {
        self.server.log_file.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                self.cache.settings_dir.join(p)
            }
        })
    }

    pub fn settings_dir(&self) -> &Path {
        &self.cache.settings_dir
    }

    pub fn preload_pages(&self) -> usize {
        self.pipeline.preload_pages
    }

    pub fn load_timeout(&self) -> Duration {
        self.pipeline.load_timeout
    }

    pub fn api_timeout(&self) -> Duration {
        self.api.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.api.max_retries
    }
}

/// Parse an optional environment variable, failing on malformed values.
fn parse_var<T: FromStr>(name: &str) -> ConfigResult<Option<T>> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarError(format!("{}={}", name, raw))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn google_config() -> TranslationConfig {
        TranslationConfig {
            selected_service: "google".to_string(),
            source_language: "ja".to_string(),
            target_language: "en".to_string(),
            google_api_key: "g-key".to_string(),
            deepl_api_key: String::new(),
            vision_api_key: "g-key".to_string(),
        }
    }

    #[test]
    fn test_blank_config_is_missing() {
        let err = TranslationConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing));
    }

    #[test]
    fn test_unset_environment_is_missing() {
        // Languages fall back to ja/en, so the section is not default-blank
        let cfg = TranslationConfig {
            source_language: "ja".to_string(),
            target_language: "en".to_string(),
            ..TranslationConfig::default()
        };
        assert!(!cfg.is_blank());
        assert!(matches!(cfg.validate().unwrap_err(), ConfigError::Missing));
    }

    #[test]
    fn test_valid_google_config() {
        let settings = google_config().validate().unwrap();
        assert_eq!(settings.service, TranslationService::Google);
        assert_eq!(settings.credential, "g-key");
        assert_eq!(settings.source_language, "ja");
    }

    #[test]
    fn test_unknown_service_rejected() {
        let mut cfg = google_config();
        cfg.selected_service = "babelfish".to_string();
        assert!(matches!(
            cfg.validate().unwrap_err(),
            ConfigError::UnknownService(s) if s == "babelfish"
        ));
    }

    #[test]
    fn test_missing_credential_for_selected_service() {
        let mut cfg = google_config();
        cfg.selected_service = "deepL".to_string();
        assert!(matches!(
            cfg.validate().unwrap_err(),
            ConfigError::MissingCredential(s) if s == "deepL"
        ));
    }

    #[test]
    fn test_blank_language_rejected() {
        let mut cfg = google_config();
        cfg.target_language = "  ".to_string();
        assert!(matches!(
            cfg.validate().unwrap_err(),
            ConfigError::BlankField("TARGET_LANGUAGE")
        ));
    }

    #[test]
    fn test_service_names_round_trip() {
        for service in [TranslationService::Google, TranslationService::DeepL] {
            assert_eq!(service.name().parse::<TranslationService>().unwrap(), service);
        }
    }
}
