use super::moderation_models::ToxicityVerdict;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("Classifier request failed: {0}")]
    Request(String),

    #[error("Classifier API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Unreadable classifier response: {0}")]
    Decode(String),

    #[error("No dominant language detected")]
    NoDominantLanguage,

    #[error("Classifier returned no result")]
    EmptyResult,

    #[error("Toxicity score {0} is outside [0, 1]")]
    InvalidScore(f64),

    #[error("Classifier did not answer within {0:?}")]
    Timeout(Duration),
}

/// Port to the external toxicity classification service.
#[async_trait]
pub trait ToxicityClassifier: Send + Sync {
    /// Score a text. Labels keep the order the service returned them in.
    async fn classify(&self, text: &str) -> Result<ToxicityVerdict, ClassificationError>;
}

#[async_trait]
impl<T: ToxicityClassifier + ?Sized> ToxicityClassifier for Arc<T> {
    async fn classify(&self, text: &str) -> Result<ToxicityVerdict, ClassificationError> {
        (**self).classify(text).await
    }
}
