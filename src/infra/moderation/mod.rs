// Adapters for the moderation ports.

pub mod http_classifier;
pub mod in_memory;
pub mod sqlite_content_store;

pub use http_classifier::HttpToxicityClassifier;
pub use in_memory::InMemoryContentStore;
pub use sqlite_content_store::SqliteContentStore;
