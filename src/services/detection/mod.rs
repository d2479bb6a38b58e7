// Text detection - Google Cloud Vision document text detection

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use serde::Deserialize;
use tracing::{debug, error, info, instrument};

use crate::core::errors::{DetectionError, DetectionResult};
use crate::core::types::{DetectedText, Vertex};
use crate::services::api_client::ApiClient;

const VISION_API_URL: &str = "https://vision.googleapis.com/v1/images:annotate";
const GOOGLE_API_KEY_HEADER: &str = "X-Goog-Api-Key";

/// Finds text regions in an encoded image.
///
/// Returns regions in reading order as reported by the backend. An image
/// without text yields an empty list, not an error.
#[async_trait]
pub trait TextDetector: Send + Sync {
    async fn detect(
        &self,
        image_bytes: &[u8],
        language_hint: &str,
    ) -> DetectionResult<Vec<DetectedText>>;
}

/// Detector backed by the Vision `images:annotate` REST endpoint
pub struct GoogleVisionDetector {
    api_client: ApiClient,
    api_key: String,
    endpoint: String,
}

impl GoogleVisionDetector {
    pub fn new(api_client: ApiClient, api_key: impl Into<String>) -> Self {
        Self {
            api_client,
            api_key: api_key.into(),
            endpoint: VISION_API_URL.to_string(),
        }
    }

    /// Point at another `images:annotate` endpoint, e.g. a regional one
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl TextDetector for GoogleVisionDetector {
    #[instrument(skip(self, image_bytes), fields(bytes = image_bytes.len()))]
    async fn detect(
        &self,
        image_bytes: &[u8],
        language_hint: &str,
    ) -> DetectionResult<Vec<DetectedText>> {
        if self.api_key.trim().is_empty() {
            return Err(DetectionError::InvalidCredentials);
        }

        let request_body = serde_json::json!({
            "requests": [{
                "image": { "content": general_purpose::STANDARD.encode(image_bytes) },
                "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }],
                "imageContext": { "languageHints": [language_hint] }
            }]
        });

        let response = self
            .api_client
            .post_json(
                &self.endpoint,
                &request_body,
                &[(GOOGLE_API_KEY_HEADER, self.api_key.trim())],
            )
            .await
            .map_err(|e| {
                error!("DetectDocumentText: {}", e);
                if e.is_unauthorized() {
                    DetectionError::InvalidCredentials
                } else {
                    DetectionError::Api(e)
                }
            })?;

        let response: AnnotateResponse = serde_json::from_value(response)
            .map_err(|e| DetectionError::Api(e.into()))?;

        organize_annotation(response)
    }
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    full_text_annotation: Option<TextAnnotation>,
    error: Option<Status>,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
    #[serde(default)]
    pages: Vec<AnnotatedPage>,
}

#[derive(Debug, Deserialize)]
struct AnnotatedPage {
    #[serde(default)]
    blocks: Vec<AnnotatedBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotatedBlock {
    bounding_box: Option<BoundingPoly>,
    #[serde(default)]
    paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Deserialize)]
struct BoundingPoly {
    #[serde(default)]
    vertices: Vec<ApiVertex>,
}

// Vision omits zero coordinates
#[derive(Debug, Deserialize)]
struct ApiVertex {
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
}

#[derive(Debug, Deserialize)]
struct Paragraph {
    #[serde(default)]
    words: Vec<Word>,
}

#[derive(Debug, Deserialize)]
struct Word {
    #[serde(default)]
    symbols: Vec<Symbol>,
}

#[derive(Debug, Deserialize)]
struct Symbol {
    #[serde(default)]
    text: String,
}

/// Flatten pages -> blocks into one region per block; block text is the
/// concatenation of its symbols.
fn organize_annotation(response: AnnotateResponse) -> DetectionResult<Vec<DetectedText>> {
    let Some(image_response) = response.responses.into_iter().next() else {
        info!("No text found");
        return Ok(Vec::new());
    };

    if let Some(status) = image_response.error {
        if status.code != 0 {
            return Err(DetectionError::Service {
                code: status.code,
                message: status.message,
            });
        }
    }

    let Some(annotation) = image_response.full_text_annotation else {
        info!("No text found");
        return Ok(Vec::new());
    };
    info!(text = %annotation.text, "Detected Text");

    let regions: Vec<DetectedText> = annotation
        .pages
        .into_iter()
        .flat_map(|page| page.blocks)
        .map(|block| DetectedText {
            text: block
                .paragraphs
                .iter()
                .flat_map(|p| &p.words)
                .flat_map(|w| &w.symbols)
                .map(|s| s.text.as_str())
                .collect(),
            vertices: quad(block.bounding_box),
        })
        .collect();

    debug!("Organized annotation into {} blocks", regions.len());
    Ok(regions)
}

fn quad(bounding_box: Option<BoundingPoly>) -> [Vertex; 4] {
    let mut corners = [Vertex::default(); 4];
    if let Some(poly) = bounding_box {
        for (corner, v) in corners.iter_mut().zip(poly.vertices) {
            *corner = Vertex::new(v.x, v.y);
        }
    }
    corners
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(value: serde_json::Value) -> DetectionResult<Vec<DetectedText>> {
        organize_annotation(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_blocks_concatenate_symbols() {
        let regions = parse(serde_json::json!({
            "responses": [{
                "fullTextAnnotation": {
                    "text": "おはようございます",
                    "pages": [{
                        "blocks": [
                            {
                                "boundingBox": { "vertices": [
                                    {"x": 10, "y": 5}, {"x": 40}, {"x": 40, "y": 90}, {"y": 90}
                                ]},
                                "paragraphs": [
                                    { "words": [
                                        { "symbols": [{"text": "お"}, {"text": "は"}] },
                                        { "symbols": [{"text": "よう"}] }
                                    ]},
                                    { "words": [ { "symbols": [{"text": "!"}] } ] }
                                ]
                            },
                            {
                                "boundingBox": { "vertices": [
                                    {"x": 1, "y": 1}, {"x": 2, "y": 1}, {"x": 2, "y": 2}, {"x": 1, "y": 2}
                                ]},
                                "paragraphs": [ { "words": [ { "symbols": [{"text": "猫"}] } ] } ]
                            }
                        ]
                    }]
                }
            }]
        }))
        .unwrap();

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].text, "おはよう!");
        assert_eq!(
            regions[0].vertices,
            [
                Vertex::new(10, 5),
                Vertex::new(40, 0),
                Vertex::new(40, 90),
                Vertex::new(0, 90)
            ]
        );
        assert_eq!(regions[1].text, "猫");
    }

    #[test]
    fn test_missing_annotation_is_no_text() {
        let regions = parse(serde_json::json!({ "responses": [{}] })).unwrap();
        assert!(regions.is_empty());

        let regions = parse(serde_json::json!({})).unwrap();
        assert!(regions.is_empty());
    }

    #[test]
    fn test_error_status_is_reported() {
        let err = parse(serde_json::json!({
            "responses": [{ "error": { "code": 3, "message": "Bad image data." } }]
        }))
        .unwrap_err();

        assert!(matches!(err, DetectionError::Service { code: 3, .. }));
    }
}
