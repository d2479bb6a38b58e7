// Page: one image and its load state machine

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::core::config::TranslationConfig;
use crate::core::errors::{PipelineError, PipelineResult};
use crate::core::types::{Dimensions, PageImage, TextBlock};
use crate::services::adapter::TextAdapter;
use crate::services::cache::{CacheLookup, ResultCache};
use crate::utils::Metrics;

pub const DETECTING_MESSAGE: &str = "Detecting text...";
pub const TRANSLATING_MESSAGE: &str = "Translating text...";
pub const DONE_MESSAGE: &str = "Done!";

/// Load status of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PageStatus {
    Idle,
    Loading,
    Done { ok: bool },
}

/// Fire-and-forget redraw notification.
///
/// A generation counter bumped on every page status change. Renderers
/// subscribe and re-read whatever state they display.
#[derive(Clone)]
pub struct RedrawSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl RedrawSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn notify(&self) {
        self.tx.send_modify(|generation| *generation += 1);
    }

    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

impl Default for RedrawSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a page load needs, shared by all pages
pub struct PageLoader {
    pub config: TranslationConfig,
    pub cache: Arc<ResultCache>,
    pub adapter: Arc<TextAdapter>,
    pub metrics: Option<Metrics>,
    pub redraw: RedrawSignal,
    pub load_timeout: Duration,
}

struct PageState {
    status: PageStatus,
    message: String,
    blocks: Vec<TextBlock>,
}

/// Render-side view of a page
#[derive(Debug, Clone, Serialize)]
pub struct PageSnapshot {
    pub index: usize,
    pub source: String,
    pub fingerprint: String,
    pub dimensions: Dimensions,
    pub status: PageStatus,
    pub message: String,
    /// Present only once the page is done
    pub blocks: Option<Vec<TextBlock>>,
}

pub struct Page {
    index: usize,
    image: PageImage,
    state: RwLock<PageState>,
}

impl Page {
    pub fn new(index: usize, image: PageImage) -> Self {
        Self {
            index,
            image,
            state: RwLock::new(PageState {
                status: PageStatus::Idle,
                message: String::new(),
                blocks: Vec::new(),
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn image(&self) -> &PageImage {
        &self.image
    }

    pub fn status(&self) -> PageStatus {
        self.state.read().status
    }

    pub fn message(&self) -> String {
        self.state.read().message.clone()
    }

    /// Blocks, readable only once the page is done
    pub fn blocks(&self) -> Option<Vec<TextBlock>> {
        let state = self.state.read();
        match state.status {
            PageStatus::Done { .. } => Some(state.blocks.clone()),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> PageSnapshot {
        let state = self.state.read();
        PageSnapshot {
            index: self.index,
            source: self.image.source.clone(),
            fingerprint: self.image.fingerprint.clone(),
            dimensions: self.image.dimensions,
            status: state.status,
            message: state.message.clone(),
            blocks: match state.status {
                PageStatus::Done { .. } => Some(state.blocks.clone()),
                _ => None,
            },
        }
    }

    /// Claim the Idle -> Loading transition. Only the first caller gets true.
    pub fn begin_load(&self, redraw: &RedrawSignal) -> bool {
        {
            let mut state = self.state.write();
            if state.status != PageStatus::Idle {
                return false;
            }
            state.status = PageStatus::Loading;
            state.message = "Loading...".to_string();
        }
        redraw.notify();
        true
    }

    /// Load the page if it is still Idle; a no-op otherwise.
    pub async fn load(&self, loader: &PageLoader) {
        if self.begin_load(&loader.redraw) {
            self.run_load(loader).await;
        }
    }

    /// Drive a claimed load to Done. Call only after `begin_load` returned true.
    #[instrument(skip(self, loader), fields(page = self.index, source = %self.image.source))]
    pub async fn run_load(&self, loader: &PageLoader) {
        let result = match tokio::time::timeout(loader.load_timeout, self.fetch_blocks(loader)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout(loader.load_timeout)),
        };

        let ok = result.is_ok();
        {
            let mut state = self.state.write();
            match result {
                Ok(blocks) => {
                    info!("Page {} done with {} blocks", self.index + 1, blocks.len());
                    state.blocks = blocks;
                    state.message = DONE_MESSAGE.to_string();
                }
                Err(e) => {
                    error!("Page {} failed: {}", self.index + 1, e);
                    state.blocks = Vec::new();
                    state.message = e.to_string();
                }
            }
            state.status = PageStatus::Done { ok };
        }

        if let Some(ref m) = loader.metrics {
            m.record_page_loaded(ok);
        }
        loader.redraw.notify();
    }

    fn set_progress(&self, message: &str, redraw: &RedrawSignal) {
        self.state.write().message = message.to_string();
        redraw.notify();
    }

    async fn fetch_blocks(&self, loader: &PageLoader) -> PipelineResult<Vec<TextBlock>> {
        let settings = loader.config.validate()?;
        let service = settings.service.name();
        let fingerprint = &self.image.fingerprint;

        let (blocks, translate_only) = match loader.cache.lookup(fingerprint, service).await? {
            CacheLookup::Hit(blocks) => return Ok(blocks),
            partial => partial.into_parts(),
        };

        let blocks = if translate_only {
            blocks
        } else {
            self.set_progress(DETECTING_MESSAGE, &loader.redraw);
            let detected = loader
                .adapter
                .detect(&self.image.image_bytes, &settings.source_language)
                .await?;
            if detected.is_empty() {
                warn!("No text found on page {}", self.index + 1);
            }
            detected
        };

        self.set_progress(TRANSLATING_MESSAGE, &loader.redraw);
        let blocks = loader.adapter.translate(blocks, &settings).await?;

        loader
            .cache
            .insert(fingerprint, service, blocks.clone())
            .await?;

        Ok(blocks)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::services::adapter::fakes::FakeDetector;

    #[tokio::test]
    async fn test_load_detects_translates_and_caches() {
        let h = harness(config("google"), FakeDetector::new(&["猫", "犬"])).await;
        let page = Page::new(0, image("a"));

        page.load(&h.loader).await;

        assert_eq!(page.status(), PageStatus::Done { ok: true });
        assert_eq!(page.message(), DONE_MESSAGE);
        let blocks = page.blocks().unwrap();
        assert_eq!(blocks[0].translated, "google:猫");
        assert_eq!(blocks[1].translated, "google:犬");

        let cached = h
            .loader
            .cache
            .lookup(&page.image().fingerprint, "google")
            .await
            .unwrap();
        assert_eq!(cached, CacheLookup::Hit(blocks));
    }

    #[tokio::test]
    async fn test_second_load_is_noop() {
        let h = harness(config("google"), FakeDetector::new(&["猫"])).await;
        let page = Page::new(0, image("a"));

        page.load(&h.loader).await;
        let first = page.snapshot();
        page.load(&h.loader).await;
        let second = page.snapshot();

        assert_eq!(h.detector.calls(), 1);
        assert_eq!(h.google.calls(), 1);
        assert_eq!(first.status, second.status);
        assert_eq!(first.message, second.message);
        assert_eq!(first.blocks, second.blocks);
    }

    #[tokio::test]
    async fn test_begin_load_claims_once() {
        let h = harness(config("google"), FakeDetector::new(&[])).await;
        let page = Page::new(0, image("a"));

        assert!(page.begin_load(&h.loader.redraw));
        assert!(!page.begin_load(&h.loader.redraw));
        assert_eq!(page.status(), PageStatus::Loading);
        assert!(page.blocks().is_none());
    }

    #[tokio::test]
    async fn test_blank_config_fails_fast() {
        let h = harness(TranslationConfig::default(), FakeDetector::new(&["猫"])).await;
        let page = Page::new(0, image("a"));

        page.load(&h.loader).await;

        assert_eq!(page.status(), PageStatus::Done { ok: false });
        assert!(page.message().contains("config missing"));
        assert_eq!(h.detector.calls(), 0);
    }

    #[tokio::test]
    async fn test_detection_error_becomes_page_message() {
        let mut detector = FakeDetector::new(&["猫"]);
        detector.fail = true;
        let h = harness(config("google"), detector).await;
        let page = Page::new(0, image("a"));

        page.load(&h.loader).await;

        assert_eq!(page.status(), PageStatus::Done { ok: false });
        assert!(page.message().contains("credentials"));
        assert_eq!(h.google.calls(), 0);
        assert!(h.loader.cache.records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_translation_failure_caches_nothing() {
        let h = harness(config("google"), FakeDetector::new(&["猫", "犬"])).await;
        h.google.set_drop_last(true);
        let page = Page::new(0, image("a"));

        page.load(&h.loader).await;

        assert_eq!(page.status(), PageStatus::Done { ok: false });
        assert_eq!(page.blocks(), Some(Vec::new()));
        assert_eq!(h.detector.calls(), 1);
        assert!(h.loader.cache.records().await.unwrap().is_empty());

        // A later load of the same image starts again from detection
        h.google.set_drop_last(false);
        let retry = Page::new(1, image("a"));
        retry.load(&h.loader).await;
        assert_eq!(retry.status(), PageStatus::Done { ok: true });
        assert_eq!(h.detector.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_request_message_hides_credential() {
        use crate::services::api_client::ApiClient;
        use crate::services::detection::GoogleVisionDetector;

        let mut h = harness(config("google"), FakeDetector::new(&[])).await;
        let client = ApiClient::with_limits(Duration::from_secs(2), 0, None, None).unwrap();
        // Nothing listens on port 1
        let detector = GoogleVisionDetector::new(client, "SECRETKEY123")
            .with_endpoint("http://127.0.0.1:1/v1/images:annotate");
        let loader = Arc::get_mut(&mut h.loader).unwrap();
        loader.config.vision_api_key = "SECRETKEY123".to_string();
        loader.adapter = Arc::new(TextAdapter::new(Arc::new(detector), None));
        let page = Page::new(0, image("a"));

        page.load(&h.loader).await;

        assert_eq!(page.status(), PageStatus::Done { ok: false });
        assert!(!page.message().is_empty());
        assert!(!page.message().contains("SECRETKEY123"));
        assert!(!serde_json::to_string(&page.snapshot())
            .unwrap()
            .contains("SECRETKEY123"));
    }

    #[tokio::test]
    async fn test_no_text_is_a_successful_empty_page() {
        let h = harness(config("deepL"), FakeDetector::new(&[])).await;
        let page = Page::new(0, image("blank"));

        page.load(&h.loader).await;

        assert_eq!(page.status(), PageStatus::Done { ok: true });
        assert_eq!(page.blocks(), Some(Vec::new()));
        assert_eq!(h.deepl.calls(), 0);
    }

    #[tokio::test]
    async fn test_translation_only_reuse_keeps_identity() {
        let h = harness(config("deepL"), FakeDetector::new(&["一", "二", "三"])).await;
        let img = image("x");

        let detected = h.loader.adapter.detect(b"x", "ja").await.unwrap();
        h.loader
            .cache
            .insert(&img.fingerprint, "google", detected.clone())
            .await
            .unwrap();

        let page = Page::new(0, img);
        page.load(&h.loader).await;

        // Only the seeding call above reached the detector
        assert_eq!(h.detector.calls(), 1);
        assert_eq!(h.deepl.calls(), 1);
        let blocks = page.blocks().unwrap();
        for (before, after) in detected.iter().zip(&blocks) {
            assert_eq!(before.ordinal, after.ordinal);
            assert_eq!(before.color, after.color);
            assert_eq!(after.translated, format!("deepL:{}", before.text));
        }
    }

    #[tokio::test]
    async fn test_hung_load_times_out() {
        let mut detector = FakeDetector::new(&["猫"]);
        detector.delay = Duration::from_secs(30);
        let mut h = harness(config("google"), detector).await;
        Arc::get_mut(&mut h.loader).unwrap().load_timeout = Duration::from_millis(50);
        let page = Page::new(0, image("a"));

        page.load(&h.loader).await;

        assert_eq!(page.status(), PageStatus::Done { ok: false });
        assert!(page.message().starts_with("timeout"));
    }

    #[tokio::test]
    async fn test_corrupt_cache_surfaces_as_page_error() {
        let h = harness(config("google"), FakeDetector::new(&["猫"])).await;
        let path = h.loader.cache.path().await;
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let broken = Page::new(0, image("a"));
        broken.load(&h.loader).await;
        assert_eq!(broken.status(), PageStatus::Done { ok: false });
        assert!(broken.message().contains("Cache"));

        // Other pages are unaffected once the store is readable again
        tokio::fs::write(&path, b"[]").await.unwrap();
        let healthy = Page::new(1, image("b"));
        healthy.load(&h.loader).await;
        assert_eq!(healthy.status(), PageStatus::Done { ok: true });
    }

    #[tokio::test]
    async fn test_status_changes_bump_redraw() {
        let h = harness(config("google"), FakeDetector::new(&["猫"])).await;
        let page = Page::new(0, image("a"));
        let before = h.loader.redraw.generation();

        page.load(&h.loader).await;

        // Loading, detecting, translating, done
        assert_eq!(h.loader.redraw.generation(), before + 4);
    }
}
