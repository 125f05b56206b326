use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::moderation::{ClassificationError, ToxicityClassifier, ToxicityVerdict};

/// Client for the toxicity classification service.
///
/// Scoring is two calls: detect the dominant language of the text, then ask
/// for toxicity in that language. Only the first result segment is used.
pub struct HttpToxicityClassifier {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpToxicityClassifier {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClassificationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassificationError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ClassificationError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let mut request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassificationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ClassificationError::Decode(e.to_string()))
    }

    async fn detect_dominant_language(&self, text: &str) -> Result<String, ClassificationError> {
        let response: LanguageResponse = self
            .post("/detect-dominant-language", &LanguageRequest { text })
            .await?;

        response
            .languages
            .into_iter()
            .next()
            .and_then(|l| l.language_code)
            .filter(|code| !code.is_empty())
            .ok_or(ClassificationError::NoDominantLanguage)
    }
}

fn map_transport_error(e: reqwest::Error) -> ClassificationError {
    if e.is_timeout() {
        ClassificationError::Request(format!("timed out: {}", e))
    } else {
        ClassificationError::Request(e.to_string())
    }
}

#[async_trait]
impl ToxicityClassifier for HttpToxicityClassifier {
    async fn classify(&self, text: &str) -> Result<ToxicityVerdict, ClassificationError> {
        let language_code = self.detect_dominant_language(text).await?;

        let response: ToxicContentResponse = self
            .post(
                "/detect-toxic-content",
                &ToxicContentRequest {
                    text_segments: vec![TextSegment { text }],
                    language_code: &language_code,
                },
            )
            .await?;

        let result = response
            .result_list
            .into_iter()
            .next()
            .ok_or(ClassificationError::EmptyResult)?;

        if !(0.0..=1.0).contains(&result.toxicity) {
            return Err(ClassificationError::InvalidScore(result.toxicity));
        }

        Ok(ToxicityVerdict {
            score: result.toxicity,
            labels: result.labels.into_iter().map(|l| l.name).collect(),
        })
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Serialize)]
struct LanguageRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct LanguageResponse {
    #[serde(default)]
    languages: Vec<DominantLanguage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DominantLanguage {
    language_code: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToxicContentRequest<'a> {
    text_segments: Vec<TextSegment<'a>>,
    language_code: &'a str,
}

#[derive(Serialize)]
struct TextSegment<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToxicContentResponse {
    #[serde(default)]
    result_list: Vec<ToxicContentResult>,
}

#[derive(Deserialize)]
struct ToxicContentResult {
    toxicity: f64,
    #[serde(default)]
    labels: Vec<ToxicLabel>,
}

#[derive(Deserialize)]
struct ToxicLabel {
    name: String,
}
