//! Scrape orchestration: run the active definitions against the target and
//! gather their samples plus the exporter's own metrics.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream;
use parking_lot::RwLock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use gaussight_common::{
    CharsetMap, MetricSample, QueryDefinition, SampleDesc, ServerIdentity, ValueType,
    sanitize_metric_name,
};

use crate::config::{ExporterConfig, FilterConfig};
use crate::executor::{ExecutionOutcome, execute};
use crate::registry::DefinitionRegistry;
use crate::row::RowContext;
use crate::source::{QuerySource, ServerInfo, SourceError};

/// Scrape-fatal errors.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Target {server} unavailable: {source}")]
    Unavailable {
        server: String,
        #[source]
        source: SourceError,
    },
}

/// Filter over definition names.
pub struct QueryFilter {
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
}

impl QueryFilter {
    /// Create a new filter from configuration.
    pub fn new(config: &FilterConfig) -> Self {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .filter_map(|p| glob::Pattern::new(p).ok())
                .collect()
        };

        Self {
            include: compile(&config.include_queries),
            exclude: compile(&config.exclude_queries),
        }
    }

    /// Check if a definition should be scraped.
    ///
    /// `collect` restricts the scrape to the named definitions when non-empty.
    pub fn should_include(&self, name: &str, collect: &[String]) -> bool {
        if !collect.is_empty() && !collect.iter().any(|c| c == name) {
            return false;
        }

        if !self.include.is_empty() && !self.include.iter().any(|p| p.matches(name)) {
            return false;
        }

        !self.exclude.iter().any(|p| p.matches(name))
    }
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self::new(&FilterConfig::default())
    }
}

/// Scrape settings taken from the configuration.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub timeout: Duration,
    pub parallel: usize,
    pub time_as_string: bool,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            parallel: 5,
            time_as_string: false,
        }
    }
}

/// Cumulative scrape statistics.
#[derive(Debug, Clone, Default)]
pub struct ScrapeStats {
    /// Scrapes attempted.
    pub scrapes_total: u64,
    /// Scrapes that reached the target.
    pub scrapes_succeeded: u64,
    /// Non-fatal column and label errors.
    pub sample_errors_total: u64,
    /// Definitions that produced nothing because of a fatal error.
    pub query_failures_total: u64,
    /// Scrapes cut short by the deadline.
    pub deadline_exceeded_total: u64,
    /// Samples in the last successful scrape, excluding built-ins.
    pub last_scrape_samples: u64,
    pub last_scrape_duration: Duration,
}

/// Outcome of one scrape.
#[derive(Debug, Clone, Default)]
pub struct ScrapeReport {
    /// Definition samples followed by built-in samples.
    pub samples: Vec<MetricSample>,
    pub definitions: usize,
    pub failed: usize,
    pub sample_errors: usize,
    pub deadline_exceeded: bool,
    pub duration: Duration,
}

struct BuiltinDescs {
    up: Arc<SampleDesc>,
    version: Arc<SampleDesc>,
    scrape_duration: Arc<SampleDesc>,
    last_scrape_samples: Arc<SampleDesc>,
    scrape_errors: Arc<SampleDesc>,
    query_failures: Arc<SampleDesc>,
    scrapes: Arc<SampleDesc>,
}

impl BuiltinDescs {
    fn new(namespace: &str) -> Self {
        let desc = |suffix: &str, help: &str, value_type: ValueType, labels: &[&str]| {
            let name = if namespace.is_empty() {
                suffix.to_string()
            } else {
                format!("{}_{}", namespace, suffix)
            };
            Arc::new(SampleDesc {
                name: sanitize_metric_name(&name),
                help: help.to_string(),
                label_names: labels.iter().map(|l| l.to_string()).collect(),
                value_type,
            })
        };

        Self {
            up: desc("up", "Whether the database is reachable", ValueType::Gauge, &[]),
            version: desc(
                "version",
                "Database version",
                ValueType::Gauge,
                &["short_version"],
            ),
            scrape_duration: desc(
                "exporter_scrape_duration_seconds",
                "Duration of the last scrape",
                ValueType::Gauge,
                &[],
            ),
            last_scrape_samples: desc(
                "exporter_last_scrape_samples",
                "Samples produced by the last scrape",
                ValueType::Gauge,
                &[],
            ),
            scrape_errors: desc(
                "exporter_scrape_errors_total",
                "Non-fatal column and label errors",
                ValueType::Counter,
                &[],
            ),
            query_failures: desc(
                "exporter_query_failures_total",
                "Query definitions that failed",
                ValueType::Counter,
                &[],
            ),
            scrapes: desc(
                "exporter_scrapes_total",
                "Scrapes attempted",
                ValueType::Counter,
                &[],
            ),
        }
    }
}

/// Runs scrapes against one target.
pub struct Scraper {
    source: Arc<dyn QuerySource>,
    registry: Arc<DefinitionRegistry>,
    server: ServerIdentity,
    settings: ScrapeSettings,
    filter: QueryFilter,
    charsets: RwLock<CharsetMap>,
    server_info: RwLock<Option<ServerInfo>>,
    builtins: BuiltinDescs,
    stats: RwLock<ScrapeStats>,
}

impl Scraper {
    /// Create a scraper from the exporter configuration.
    pub fn new(
        source: Arc<dyn QuerySource>,
        registry: Arc<DefinitionRegistry>,
        config: &ExporterConfig,
    ) -> Self {
        let server =
            ServerIdentity::with_labels(source.address(), &config.prometheus.default_labels);
        let settings = ScrapeSettings {
            timeout: config.scrape.timeout(),
            parallel: config.scrape.parallel.max(1),
            time_as_string: config.scrape.time_to_string,
        };

        Self {
            source,
            registry,
            server,
            settings,
            filter: QueryFilter::new(&config.filters),
            charsets: RwLock::new(config.encoding.charset_map()),
            server_info: RwLock::new(None),
            builtins: BuiltinDescs::new(&config.prometheus.namespace),
            stats: RwLock::new(ScrapeStats::default()),
        }
    }

    pub fn server(&self) -> &ServerIdentity {
        &self.server
    }

    pub fn registry(&self) -> &Arc<DefinitionRegistry> {
        &self.registry
    }

    /// Get scrape statistics.
    pub fn stats(&self) -> ScrapeStats {
        self.stats.read().clone()
    }

    /// Whether any scrape has reached the target.
    pub fn has_scraped(&self) -> bool {
        self.stats.read().scrapes_succeeded > 0
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.read().clone()
    }

    /// Query server facts and merge discovered database charsets.
    ///
    /// Configured charsets keep precedence over discovered ones.
    pub async fn refresh_server_info(&self) -> Result<ServerInfo, SourceError> {
        let info = self.source.server_info().await?;

        self.charsets
            .write()
            .extend_missing(info.charsets.iter().cloned());
        *self.server_info.write() = Some(info.clone());

        info!(
            server = %self.server.address(),
            version = %info.version.as_ref().map(|v| v.to_string()).unwrap_or_else(|| info.raw_version.clone()),
            in_recovery = info.in_recovery,
            database = %info.database,
            "Discovered server"
        );
        Ok(info)
    }

    /// Run one scrape.
    ///
    /// `collect` restricts the scrape to the named definitions when non-empty.
    pub async fn scrape(&self, collect: &[String]) -> Result<ScrapeReport, ScrapeError> {
        let start = Instant::now();
        let deadline = tokio::time::Instant::from_std(start) + self.settings.timeout;
        self.stats.write().scrapes_total += 1;

        let ping = tokio::time::timeout_at(deadline, self.source.ping())
            .await
            .unwrap_or(Err(SourceError::Timeout(self.settings.timeout)));
        if let Err(e) = ping {
            warn!(server = %self.server.address(), error = %e, "Target unreachable");
            return Err(ScrapeError::Unavailable {
                server: self.server.address().to_string(),
                source: e,
            });
        }

        let discovered = self.server_info.read().is_some();
        if !discovered {
            let discovery = tokio::time::timeout_at(deadline, self.refresh_server_info())
                .await
                .unwrap_or(Err(SourceError::Timeout(self.settings.timeout)));
            if let Err(e) = discovery {
                warn!(server = %self.server.address(), error = %e, "Server discovery failed");
            }
        }

        let table = self.registry.snapshot();
        let definitions: Vec<&Arc<QueryDefinition>> = table
            .iter()
            .filter(|d| self.filter.should_include(d.name(), collect))
            .collect();
        for name in collect {
            if table.get(name).is_none() {
                debug!(query = %name, "Requested definition not loaded");
            }
        }

        let charsets = self.charsets.read().clone();
        let cancel = CancellationToken::new();
        let source = self.source.as_ref();

        let runs: Vec<_> = definitions
            .iter()
            .map(|def| {
                let ctx = RowContext {
                    definition: def,
                    server: &self.server,
                    charsets: &charsets,
                    time_as_string: self.settings.time_as_string,
                };
                let cancel = &cancel;
                async move { (def.name(), execute(ctx, source, cancel).await) }
            })
            .collect();
        let runs = stream::iter(runs)
            .buffer_unordered(self.settings.parallel)
            .collect::<Vec<_>>();
        tokio::pin!(runs);

        let mut deadline_exceeded = false;
        let results = tokio::select! {
            results = &mut runs => results,
            _ = tokio::time::sleep_until(deadline) => {
                deadline_exceeded = true;
                warn!(
                    server = %self.server.address(),
                    timeout = ?self.settings.timeout,
                    "Scrape deadline exceeded, cancelling remaining queries"
                );
                cancel.cancel();
                runs.await
            }
        };

        let mut report = ScrapeReport {
            definitions: results.len(),
            deadline_exceeded,
            ..Default::default()
        };
        for (name, result) in results {
            match result {
                Ok(ExecutionOutcome {
                    samples,
                    errors,
                    cancelled,
                    duration,
                    ..
                }) => {
                    trace!(query = %name, samples = samples.len(), duration = ?duration, cancelled, "Definition scraped");
                    report.sample_errors += errors.len();
                    report.samples.extend(samples);
                }
                Err(e) => {
                    error!(query = %name, error = %e, "Query definition failed");
                    report.failed += 1;
                }
            }
        }

        report.duration = start.elapsed();
        let stats = {
            let mut stats = self.stats.write();
            stats.scrapes_succeeded += 1;
            stats.sample_errors_total += report.sample_errors as u64;
            stats.query_failures_total += report.failed as u64;
            if deadline_exceeded {
                stats.deadline_exceeded_total += 1;
            }
            stats.last_scrape_samples = report.samples.len() as u64;
            stats.last_scrape_duration = report.duration;
            stats.clone()
        };

        debug!(
            definitions = report.definitions,
            failed = report.failed,
            samples = report.samples.len(),
            errors = report.sample_errors,
            duration = ?report.duration,
            "Scrape finished"
        );

        let builtins = self.builtin_samples(&stats);
        report.samples.extend(builtins);
        Ok(report)
    }

    fn builtin_samples(&self, stats: &ScrapeStats) -> Vec<MetricSample> {
        let b = &self.builtins;
        let labels = self.server.labels();
        let mut samples = Vec::with_capacity(7);

        let mut push = |desc: &Arc<SampleDesc>, value: f64, label_values: Vec<String>| {
            match MetricSample::new(desc.clone(), labels.clone(), value, label_values) {
                Ok(s) => samples.push(s),
                Err(e) => warn!(error = %e, "Cannot build exporter metric"),
            }
        };

        push(&b.up, 1.0, Vec::new());
        if let Some(version) = self.server_info.read().as_ref().and_then(|i| i.version.clone()) {
            push(&b.version, 1.0, vec![version.short()]);
        }
        push(
            &b.scrape_duration,
            stats.last_scrape_duration.as_secs_f64(),
            Vec::new(),
        );
        push(
            &b.last_scrape_samples,
            stats.last_scrape_samples as f64,
            Vec::new(),
        );
        push(&b.scrape_errors, stats.sample_errors_total as f64, Vec::new());
        push(
            &b.query_failures,
            stats.query_failures_total as f64,
            Vec::new(),
        );
        push(&b.scrapes, stats.scrapes_total as f64, Vec::new());

        samples
    }
}

/// Scraper shared between handlers and signal tasks.
pub type SharedScraper = Arc<Scraper>;
