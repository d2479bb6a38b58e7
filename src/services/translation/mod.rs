// Translation services - Google Cloud Translation v2 and DeepL

pub mod deepl;
pub mod google;

use async_trait::async_trait;

use crate::core::config::TranslationService;
use crate::core::errors::TranslationResult;

pub use deepl::DeepLTranslator;
pub use google::GoogleTranslator;

/// Translates a batch of strings in one request.
///
/// The result has the same length and order as `texts`.
#[async_trait]
pub trait Translator: Send + Sync {
    fn service(&self) -> TranslationService;

    async fn translate(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
        credential: &str,
    ) -> TranslationResult<Vec<String>>;
}
