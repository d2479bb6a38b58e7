use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error, instrument};

use super::Translator;
use crate::core::config::TranslationService;
use crate::core::errors::{TranslationError, TranslationResult};
use crate::services::api_client::ApiClient;

const DEEPL_PRO_URL: &str = "https://api.deepl.com/v2/translate";
const DEEPL_FREE_URL: &str = "https://api-free.deepl.com/v2/translate";

pub struct DeepLTranslator {
    api_client: ApiClient,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

impl DeepLTranslator {
    pub fn new(api_client: ApiClient) -> Self {
        Self { api_client }
    }
}

/// Free-plan keys end in ":fx" and only work against the free endpoint
fn endpoint_for(auth_key: &str) -> &'static str {
    if auth_key.ends_with(":fx") {
        DEEPL_FREE_URL
    } else {
        DEEPL_PRO_URL
    }
}

#[async_trait]
impl Translator for DeepLTranslator {
    fn service(&self) -> TranslationService {
        TranslationService::DeepL
    }

    #[instrument(skip(self, texts, credential), fields(texts = texts.len()))]
    async fn translate(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
        credential: &str,
    ) -> TranslationResult<Vec<String>> {
        let auth_key = credential.trim();
        if auth_key.is_empty() {
            return Err(TranslationError::InvalidCredentials {
                service: self.service().to_string(),
            });
        }

        let body = serde_json::json!({
            "text": texts,
            "source_lang": source_language.to_uppercase(),
            "target_lang": target_language.to_uppercase(),
        });
        let auth = format!("DeepL-Auth-Key {}", auth_key);

        let response = self
            .api_client
            .post_json(
                endpoint_for(auth_key),
                &body,
                &[("Authorization", auth.as_str())],
            )
            .await
            .map_err(|e| {
                error!("DeepL translate: {}", e);
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
    Ok(response.translations.into_iter().map(|t| t.text).collect())
}
