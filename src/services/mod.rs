pub mod adapter;
pub mod api_client;
pub mod cache;
pub mod detection;
pub mod translation;

// Re-export commonly used services
pub use adapter::TextAdapter;
pub use api_client::ApiClient;
pub use cache::{CacheLookup, ResultCache, CACHE_FILE_NAME};
pub use detection::{GoogleVisionDetector, TextDetector};
pub use translation::{DeepLTranslator, GoogleTranslator, Translator};
