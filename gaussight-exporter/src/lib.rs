//! Prometheus exporter for GaussDB and PostgreSQL-compatible databases.
//!
//! Each scrape of the HTTP endpoint runs the loaded query definitions
//! against the target and maps every result row to samples.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │    Database     │<────│     Scraper     │<────│   HTTP Server   │
//! │   (PgTarget)    │     │ (definitions)   │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file:
//!
//! ```bash
//! gaussight-exporter --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod collector;
pub mod config;
pub mod executor;
pub mod http;
pub mod registry;
pub mod render;
pub mod row;
pub mod source;
pub mod target;
pub mod version;

pub use collector::{QueryFilter, ScrapeError, ScrapeReport, ScrapeStats, Scraper, SharedScraper};
pub use config::ExporterConfig;
pub use executor::{ExecuteError, ExecutionOutcome, execute};
pub use http::HttpServer;
pub use registry::{DefinitionRegistry, DefinitionTable, ReloadError};
pub use source::{QuerySource, ResultSet, ServerInfo, SourceError};
pub use target::PgTarget;
pub use version::{DatabaseVersion, parse_version};
