//! A Rust library for turning wide-format HOA fee dumps into a model-ready
//! feature table, with checkpointing, reference price imputation and
//! alignment to a fixed training schema.

pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod pipeline;
pub mod reshape;
pub mod utils;

// Re-export the most common types for easier use
// Core types
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use features::price::PriceReference;
pub use features::TRAINING_COLUMNS;
pub use pipeline::Pipeline;

// Arrow types
pub use arrow::datatypes::Schema as ArrowSchema;
pub use arrow::record_batch::RecordBatch;
