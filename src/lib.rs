pub mod config;
pub mod data;
pub mod emit;
pub mod error;
pub mod neural;
pub mod pipeline;
pub mod quant;
pub mod report;
pub mod rule;
pub mod runtime;

// Re-exports used by the CLI, tests and benches
pub use config::PipelineConfig;
pub use error::{Error, FormatError, QuantError, Result};
pub use pipeline::{run, PipelineOutcome};
pub use quant::QuantizedModel;
pub use runtime::{PolicyRuntime, Reading};
