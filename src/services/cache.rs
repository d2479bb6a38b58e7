use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::core::errors::{CacheError, CacheResult};
use crate::core::types::{CacheRecord, TextBlock};
use crate::utils::Metrics;

/// File name of the result cache inside the settings directory
pub const CACHE_FILE_NAME: &str = "mtl-cache.json";

/// Outcome of a cache lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Fully cached for this service, no work needed
    Hit(Vec<TextBlock>),
    /// Detected under another service; redo translation only
    TranslationOnly(Vec<TextBlock>),
    /// Unknown image; detect and translate
    Miss,
}

impl CacheLookup {
    /// `(blocks, reuse_translation_only)`
    pub fn into_parts(self) -> (Vec<TextBlock>, bool) {
        match self {
            CacheLookup::Hit(blocks) => (blocks, false),
            CacheLookup::TranslationOnly(blocks) => (blocks, true),
            CacheLookup::Miss => (Vec::new(), false),
        }
    }
}

/// Whole-file JSON store. Every access reads the full record set and every
/// insert rewrites it.
struct CacheFile {
    path: PathBuf,
}

impl CacheFile {
    fn display(&self) -> String {
        self.path.display().to_string()
    }

    /// Read all records; a missing file reads as an empty set.
    async fn read(&self) -> CacheResult<Vec<CacheRecord>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(CacheError::LoadFailed {
                    path: self.display(),
                    source,
                })
            }
        };

        serde_json::from_slice(&data).map_err(|source| CacheError::DeserializationFailed {
            path: self.display(),
            source,
        })
    }

    /// Rewrite the whole store: temp file, then atomic rename.
    async fn write(&self, records: &[CacheRecord]) -> CacheResult<()> {
        let json = serde_json::to_vec(records)?;
        let tmp_path = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|source| CacheError::SaveFailed {
                path: tmp_path.display().to_string(),
                source,
            })?;

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|source| CacheError::SaveFailed {
                path: self.display(),
                source,
            })
    }
}

/// Persistent (fingerprint, service) -> text blocks store.
///
/// Constructed once at startup and shared by `Arc`. Lookups share the lock;
/// inserts hold it exclusively across their read-modify-write so concurrent
/// page loads never lose each other's records.
pub struct ResultCache {
    file: RwLock<CacheFile>,
    metrics: Option<Metrics>,
}

impl ResultCache {
    /// Open (or create) the cache file inside `settings_dir`.
    pub async fn open(settings_dir: &Path, metrics: Option<Metrics>) -> CacheResult<Self> {
        tokio::fs::create_dir_all(settings_dir)
            .await
            .map_err(CacheError::DirectoryCreationFailed)?;

        let file = CacheFile {
            path: settings_dir.join(CACHE_FILE_NAME),
        };

        if !file.path.exists() {
            debug!("Cache file {} not found, creating it", file.display());
            file.write(&[]).await?;
        }

        // Fail at startup on a corrupt store rather than on every page
        let records = file.read().await?;
        info!(
            "Result cache at {} holds {} records",
            file.display(),
            records.len()
        );
        if let Some(ref m) = metrics {
            m.update_cache_records(records.len());
        }

        Ok(Self {
            file: RwLock::new(file),
            metrics,
        })
    }

    pub async fn path(&self) -> PathBuf {
        self.file.read().await.path.clone()
    }

    /// Find blocks for an image.
    ///
    /// An exact (fingerprint, service) match wins; otherwise any record for
    /// the fingerprint under another service is returned for translation-only
    /// reuse.
    #[instrument(skip(self, fingerprint), fields(fingerprint = %fingerprint))]
    pub async fn lookup(&self, fingerprint: &str, service: &str) -> CacheResult<CacheLookup> {
        let records = {
            let file = self.file.read().await;
            file.read().await?
        };

        let mut existing = None;
        for record in records {
            if record.fingerprint != fingerprint {
                continue;
            }
            if record.service == service {
                info!("Image found in cache, skipping API requests.");
                if let Some(ref m) = self.metrics {
                    m.record_cache_hit();
                }
                return Ok(CacheLookup::Hit(record.blocks));
            }
            // Last match wins, as the newest record for the image
            existing = Some(record.blocks);
        }

        match existing {
            Some(blocks) => {
                info!("Image text found in cache, performing translation requests");
                if let Some(ref m) = self.metrics {
                    m.record_cache_partial_hit();
                }
                Ok(CacheLookup::TranslationOnly(blocks))
            }
            None => {
                info!("Image not found in cache, performing API requests");
                if let Some(ref m) = self.metrics {
                    m.record_cache_miss();
                }
                Ok(CacheLookup::Miss)
            }
        }
    }

    /// Store blocks for (fingerprint, service) and persist the record set.
    ///
    /// An existing record for the same pair is replaced, so the store holds
    /// at most one record per pair even when two pages with identical
    /// content finish concurrently. Returns true if a record was replaced.
    #[instrument(skip(self, fingerprint, blocks), fields(fingerprint = %fingerprint, blocks = blocks.len()))]
    pub async fn insert(
        &self,
        fingerprint: &str,
        service: &str,
        blocks: Vec<TextBlock>,
    ) -> CacheResult<bool> {
        let file = self.file.write().await;
        debug!("Adding new image to cache. blake3:{}", fingerprint);

        let mut records = file.read().await?;
        let record = CacheRecord {
            fingerprint: fingerprint.to_string(),
            service: service.to_string(),
            blocks,
        };

        let replaced = match records
            .iter_mut()
            .find(|r| r.fingerprint == fingerprint && r.service == service)
        {
            Some(existing) => {
                *existing = record;
                true
            }
            None => {
                records.push(record);
                false
            }
        };

        file.write(&records).await?;

        if let Some(ref m) = self.metrics {
            m.update_cache_records(records.len());
        }

        Ok(replaced)
    }

    /// All persisted records, in insertion order
    pub async fn records(&self) -> CacheResult<Vec<CacheRecord>> {
        let file = self.file.read().await;
        file.read().await
    }

    /// Record count and file size in bytes
    pub async fn stats(&self) -> CacheResult<(usize, u64)> {
        let file = self.file.read().await;
        let records = file.read().await?.len();
        let size_bytes = tokio::fs::metadata(&file.path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        Ok((records, size_bytes))
    }
}
