use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::core::config::{TranslationService, TranslationSettings};
use crate::core::errors::{DetectionResult, TranslationError, TranslationResult};
use crate::core::types::TextBlock;
use crate::services::detection::TextDetector;
use crate::services::translation::Translator;
use crate::utils::Metrics;

/// Glue between page loads and the remote capabilities.
///
/// Turns detector output into ordered [`TextBlock`]s and fills their
/// `translated` field from the translator selected by the page's settings.
pub struct TextAdapter {
    detector: Arc<dyn TextDetector>,
    translators: HashMap<TranslationService, Arc<dyn Translator>>,
    metrics: Option<Metrics>,
}

impl TextAdapter {
    pub fn new(detector: Arc<dyn TextDetector>, metrics: Option<Metrics>) -> Self {
        Self {
            detector,
            translators: HashMap::new(),
            metrics,
        }
    }

    /// Register a translator under the service it reports
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translators.insert(translator.service(), translator);
        self
    }

    /// Detect text blocks, numbering them in detection order.
    #[instrument(skip(self, image_bytes), fields(bytes = image_bytes.len()))]
    pub async fn detect(
        &self,
        image_bytes: &[u8],
        language_hint: &str,
    ) -> DetectionResult<Vec<TextBlock>> {
        info!("Detecting text");
        let start = Instant::now();
        let detected = self.detector.detect(image_bytes, language_hint).await;

        if let Some(ref m) = self.metrics {
            m.record_detection_duration(start.elapsed());
        }

        let blocks: Vec<TextBlock> = detected?
            .into_iter()
            .enumerate()
            .map(|(ordinal, region)| TextBlock::from_detection(ordinal, region))
            .collect();

        debug!("Detected {} text blocks", blocks.len());
        Ok(blocks)
    }

    /// Translate every block in one batch.
    ///
    /// Only `translated` changes; ordinal, text, geometry and colour are kept.
    /// A short or long result fails the whole batch.
    #[instrument(skip(self, blocks, settings), fields(blocks = blocks.len(), service = %settings.service))]
    pub async fn translate(
        &self,
        mut blocks: Vec<TextBlock>,
        settings: &TranslationSettings,
    ) -> TranslationResult<Vec<TextBlock>> {
        if blocks.is_empty() {
            return Ok(blocks);
        }

        let translator = self
            .translators
            .get(&settings.service)
            .ok_or_else(|| TranslationError::NoTranslator(settings.service.to_string()))?;

        info!("Using {} translation service", settings.service);

        let texts: Vec<String> = blocks.iter().map(|b| b.text.clone()).collect();
        let start = Instant::now();
        let translated = translator
            .translate(
                &texts,
                &settings.source_language,
                &settings.target_language,
                &settings.credential,
            )
            .await;

        if let Some(ref m) = self.metrics {
            m.record_translation_duration(start.elapsed());
        }

        let translated = translated?;
        if translated.len() != blocks.len() {
            return Err(TranslationError::LengthMismatch {
                expected: blocks.len(),
                got: translated.len(),
            });
        }

        for (block, text) in blocks.iter_mut().zip(translated) {
            block.translated = text;
        }
        Ok(blocks)
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::core::errors::DetectionError;
    use crate::core::types::{DetectedText, Vertex};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Returns fixed regions and counts calls
    pub(crate) struct FakeDetector {
        pub regions: Vec<String>,
        pub calls: AtomicUsize,
        pub delay: Duration,
        pub fail: bool,
    }

    impl FakeDetector {
        pub fn new(regions: &[&str]) -> Self {
            Self {
                regions: regions.iter().map(|s| s.to_string()).collect(),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: false,
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextDetector for FakeDetector {
        async fn detect(
            &self,
            _image_bytes: &[u8],
            _language_hint: &str,
        ) -> DetectionResult<Vec<DetectedText>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(DetectionError::InvalidCredentials);
            }
            Ok(self
                .regions
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    let x = i as i32 * 100;
                    DetectedText {
                        text: text.clone(),
                        vertices: [
                            Vertex::new(x, 0),
                            Vertex::new(x + 50, 0),
                            Vertex::new(x + 50, 80),
                            Vertex::new(x, 80),
                        ],
                    }
                })
                .collect())
        }
    }

    /// Translates by tagging each string with the service name
    pub(crate) struct FakeTranslator {
        pub service: TranslationService,
        pub calls: AtomicUsize,
        pub drop_last: AtomicBool,
    }

    impl FakeTranslator {
        pub fn new(service: TranslationService) -> Self {
            Self {
                service,
                calls: AtomicUsize::new(0),
                drop_last: AtomicBool::new(false),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Return one string fewer than asked for
        pub fn set_drop_last(&self, drop_last: bool) {
            self.drop_last.store(drop_last, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Translator for FakeTranslator {
        fn service(&self) -> TranslationService {
            self.service
        }

        async fn translate(
            &self,
            texts: &[String],
            _source_language: &str,
            _target_language: &str,
            _credential: &str,
        ) -> TranslationResult<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut out: Vec<String> = texts
                .iter()
                .map(|t| format!("{}:{}", self.service, t))
                .collect();
            if self.drop_last.load(Ordering::SeqCst) {
                out.pop();
            }
            Ok(out)
        }
    }
}
