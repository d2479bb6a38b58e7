use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error, instrument};

use super::Translator;
use crate::core::config::TranslationService;
use crate::core::errors::{TranslationError, TranslationResult};
use crate::services::api_client::ApiClient;

const GOOGLE_TRANSLATE_URL: &str = "https://translation.googleapis.com/language/translate/v2";
const GOOGLE_API_KEY_HEADER: &str = "X-Goog-Api-Key";

/// Google Cloud Translation (basic edition, v2)
pub struct GoogleTranslator {
    api_client: ApiClient,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

impl GoogleTranslator {
    pub fn new(api_client: ApiClient) -> Self {
        Self { api_client }
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    fn service(&self) -> TranslationService {
        TranslationService::Google
    }

    #[instrument(skip(self, texts, credential), fields(texts = texts.len()))]
    async fn translate(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
        credential: &str,
    ) -> TranslationResult<Vec<String>> {
        if credential.trim().is_empty() {
            return Err(TranslationError::InvalidCredentials {
                service: self.service().to_string(),
            });
        }

        let body = serde_json::json!({
            "q": texts,
            "source": source_language,
            "target": target_language,
            "format": "text",
        });

        let response = self
            .api_client
            .post_json(
                GOOGLE_TRANSLATE_URL,
                &body,
                &[(GOOGLE_API_KEY_HEADER, credential.trim())],
            )
            .await
            .map_err(|e| {
                error!("Google translate: {}", e);
                if e.is_unauthorized() {
                    TranslationError::InvalidCredentials {
                        service: self.service().to_string(),
                    }
                } else {
                    TranslationError::Api(e)
                }
            })?;

        let translated = parse_response(response)?;
        debug!("Translated {} strings", translated.len());
        Ok(translated)
    }
}

fn parse_response(value: serde_json::Value) -> TranslationResult<Vec<String>> {
    let response: TranslateResponse = serde_json::from_value(value)
        .map_err(|e| TranslationError::InvalidResponse(e.to_string()))?;

    Ok(response
        .data
        .translations
        .into_iter()
        .map(|t| t.translated_text)
        .collect())
}
