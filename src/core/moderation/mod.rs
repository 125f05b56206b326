// Core moderation module - the asynchronous moderation pipeline.
// Ports (ContentStore, ToxicityClassifier) live here, adapters live in infra.

pub mod batch_consumer;
pub mod content_store;
pub mod decision_engine;
pub mod envelope;
pub mod moderation_models;
pub mod toxicity_classifier;

pub use batch_consumer::*;
pub use content_store::*;
pub use decision_engine::DecisionEngine;
pub use moderation_models::*;
pub use toxicity_classifier::*;
