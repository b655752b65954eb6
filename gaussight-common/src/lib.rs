//! GaussSight Common Library
//!
//! Shared types for turning database result sets into metric samples:
//!
//! - [`value`] - Column values and their coercion to numbers and label text
//! - [`encoding`] - Label text validation and charset transcoding
//! - [`definition`] - Query definitions and column role resolution
//! - [`sample`] - Metric samples, server identity and non-fatal sample errors
//! - [`loader`] - Query-definition loading (file or directory merge)
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`naming`] - Prometheus name sanitizing
//! - [`error`] - Error types

pub mod config;
pub mod definition;
pub mod encoding;
pub mod error;
pub mod loader;
pub mod naming;
pub mod sample;
pub mod value;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, load_config, parse_config};
pub use definition::{
    ColumnDescriptor, ColumnRole, ColumnSpec, ColumnUsage, DefinitionError, QueryDefinition,
    QueryDefinitionSpec, Statement,
};
pub use encoding::{Charset, CharsetMap, validate_and_fix};
pub use error::{Error, Result};
pub use loader::{load_definitions, parse_definitions};
pub use naming::{build_metric_name, sanitize_label_name, sanitize_metric_name};
pub use sample::{ConstLabels, MetricSample, SampleDesc, SampleError, ServerIdentity, ValueType};
pub use value::{DbValue, coerce_to_number, coerce_to_text};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_current_span(false))
            .with(filter)
            .try_init(),
    };

    result.map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))
}
