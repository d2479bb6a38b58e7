// Library exports for the manga page translator
//
// core: settings, errors and shared types
// services: result cache, remote detection/translation and the adapter over them
// orchestration: page state machine and the page pipeline

pub mod core;
pub mod middleware;
pub mod orchestration;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::{Config, TranslationConfig, TranslationService, TranslationSettings},
    errors::{CacheError, ConfigError, DetectionError, PipelineError, TranslationError},
    types::{BlockColor, CacheRecord, PageImage, TextBlock, Vertex},
};

pub use middleware::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use orchestration::{Page, PageLoader, PagePipeline, PageStatus, RedrawSignal};

pub use services::{ApiClient, CacheLookup, ResultCache, TextAdapter, TextDetector, Translator};

pub use utils::{fingerprint, Metrics};
