pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::{Config, TranslationConfig, TranslationService, TranslationSettings};
pub use errors::{
    ApiError, CacheError, ConfigError, DetectionError, PipelineError, TranslationError,
};
pub use types::{
    BlockColor, CacheRecord, DetectedText, Dimensions, PageImage, TextBlock, Vertex,
};
