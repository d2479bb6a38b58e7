// Error types for the page pipeline
//
// Using thiserror for ergonomic error definitions with:
// - Source error chaining
// - Type-safe error matching
// - Messages that can be shown to the reader as a page status

use std::time::Duration;
use thiserror::Error;

/// Remote API transport errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Circuit breaker is open, API is unavailable")]
    CircuitOpen,

    #[error("Invalid JSON in API response: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl ApiError {
    /// True for 401/403 responses and Google's 400 `API_KEY_INVALID`
    pub fn is_unauthorized(&self) -> bool {
        match self {
            ApiError::Status { status: 401 | 403, .. } => true,
            ApiError::Status { status: 400, body } => body.contains("API_KEY_INVALID"),
            _ => false,
        }
    }

    /// 4xx other than 429: the request was rejected, the API itself is up
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ApiError::Status { status, .. } if (400..500).contains(status) && *status != 429
        )
    }
}

/// Text detection errors
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Vision API credentials are missing or invalid. Set VISION_API_KEY (or GOOGLE_API_KEY) to a valid key")]
    InvalidCredentials,

    #[error("Vision API returned an error ({code}): {message}")]
    Service { code: i32, message: String },

    #[error("Text detection request failed: {0}")]
    Api(#[from] ApiError),
}

/// Translation service errors
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("{service} credentials are missing or invalid")]
    InvalidCredentials { service: String },

    #[error("Translation request failed: {0}")]
    Api(#[from] ApiError),

    #[error("Translator returned {got} strings for {expected} inputs")]
    LengthMismatch { expected: usize, got: usize },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("No translator registered for service '{0}'")]
    NoTranslator(String),
}

/// Result cache storage errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to load cache from {path}: {source}")]
    LoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to save cache to {path}: {source}")]
    SaveFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Cache file {path} is corrupt: {source}")]
    DeserializationFailed {
        path: String,
        source: serde_json::Error,
    },

    #[error("Cache serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Cache directory creation failed: {0}")]
    DirectoryCreationFailed(std::io::Error),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Your config is either blank or doesn't exist (config missing). Set TRANSLATION_SERVICE, SOURCE_LANGUAGE, TARGET_LANGUAGE and the matching API key")]
    Missing,

    #[error("Your config does not have a valid selected service: '{0}' (expected 'google' or 'deepL')")]
    UnknownService(String),

    #[error("No API key configured for translation service '{0}'")]
    MissingCredential(String),

    #[error("{0} must not be blank")]
    BlankField(&'static str),

    #[error("Load timeout must be > 0 seconds")]
    InvalidLoadTimeout,

    #[error("Could not determine a settings directory (set SETTINGS_DIR)")]
    NoSettingsDir,

    #[error("Environment variable parsing failed: {0}")]
    EnvVarError(String),
}

/// Page pipeline errors
///
/// Everything that can fail a page load ends up here and is rendered into the
/// page's status message.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error("Cache operation failed: {0}")]
    Cache(#[from] CacheError),

    #[error("timeout: page load did not finish within {0:?}")]
    Timeout(Duration),

    #[error("No images provided")]
    NoPages,
}

pub type ApiResult<T> = Result<T, ApiError>;
pub type DetectionResult<T> = Result<T, DetectionError>;
pub type TranslationResult<T> = Result<T, TranslationError>;
pub type CacheResult<T> = Result<T, CacheError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_detection() {
        let err = ApiError::Status {
            status: 403,
            body: "forbidden".to_string(),
        };
        assert!(err.is_unauthorized());

        let err = ApiError::Status {
            status: 500,
            body: String::new(),
        };
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_google_invalid_key_is_unauthorized() {
        let err = ApiError::Status {
            status: 400,
            body: r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT","details":[{"reason":"API_KEY_INVALID"}]}}"#.to_string(),
        };
        assert!(err.is_unauthorized());
        assert!(err.is_client_error());

        let err = ApiError::Status {
            status: 400,
            body: "Bad image data.".to_string(),
        };
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_client_error_excludes_throttling_and_server_errors() {
        for (status, expected) in [(404, true), (429, false), (503, false)] {
            let err = ApiError::Status {
                status,
                body: String::new(),
            };
            assert_eq!(err.is_client_error(), expected, "status {}", status);
        }
        assert!(!ApiError::CircuitOpen.is_client_error());
    }

    #[test]
    fn test_pipeline_error_messages_are_readable() {
        let err: PipelineError = ConfigError::Missing.into();
        assert!(err.to_string().contains("config missing"));

        let err = PipelineError::Timeout(Duration::from_secs(5));
        assert!(err.to_string().starts_with("timeout"));
    }
}
