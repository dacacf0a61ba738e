pub mod enrichment;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod scheduler;

pub use enrichment::LlmListingEnricher;
pub use pipeline::{IngestError, IngestSettings, IngestionPipeline};
