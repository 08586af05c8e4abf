// src/lib.rs
// Public library surface for integration tests and the binary.

pub mod app;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;

pub use crate::config::{load_config_default, load_config_from, IngestConfig};
pub use crate::error::{DeliveryError, ExtractError, FetchError};
pub use crate::ingest::types::{NormalizedItem, RawItem, SourceKind};
pub use crate::ingest::{CycleReport, SourcePipeline};
