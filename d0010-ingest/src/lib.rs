pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod parse;
pub mod pipeline;
pub mod repository;
pub mod sources;
pub mod validation;

pub use pipeline::{AbortCause, ImportError, ImportSettings, ImportStatus, ImportSummary, Importer};
