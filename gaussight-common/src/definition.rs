//! Query definitions: SQL statements plus per-column role annotations.
//!
//! A [`QueryDefinitionSpec`] is the deserialized form. [`QueryDefinition::build`]
//! checks it and precomputes one [`ColumnDescriptor`] per declared column so that
//! rows never re-derive metric metadata.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::naming::{build_metric_name, sanitize_label_name};
use crate::sample::{ConstLabels, SERVER_LABEL, SampleDesc, ServerIdentity, ValueType};

/// Highest priority a definition may carry.
pub const MAX_PRIORITY: u32 = 999;

/// Statement status that enables execution.
pub const STATUS_ENABLE: &str = "enable";

/// Statement status that disables execution.
pub const STATUS_DISABLE: &str = "disable";

/// Health-check failures of a query definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("Query definition has an empty name")]
    EmptyName,

    #[error("Query {query} has no statements")]
    NoStatements { query: String },

    #[error("Query {query} statement #{index} has empty SQL")]
    EmptySql { query: String, index: usize },

    #[error("Query {query} statement #{index} has unknown status '{status}'")]
    UnknownStatus {
        query: String,
        index: usize,
        status: String,
    },

    #[error("Query {query} statement #{index} has invalid timeout {timeout}")]
    InvalidTimeout {
        query: String,
        index: usize,
        timeout: String,
    },

    #[error("Query {query} declares column {column} more than once")]
    DuplicateColumn { query: String, column: String },

    #[error("Query {query} column {column} has an empty name")]
    EmptyColumn { query: String, column: usize },

    #[error("Query {query} priority {priority} out of range 0..={max}", max = MAX_PRIORITY)]
    PriorityOutOfRange { query: String, priority: u32 },

    #[error("Query {query} label columns {first} and {second} both map to label {label}")]
    LabelCollision {
        query: String,
        first: String,
        second: String,
        label: String,
    },

    #[error("Query {query} label column {column} uses reserved label {label}")]
    ReservedLabel {
        query: String,
        column: String,
        label: String,
    },

    #[error("Query {query} db_name_label {column} is not a declared column")]
    UnknownDbNameLabel { query: String, column: String },

    #[error("Query {query} columns {first} and {second} both map to metric {metric}")]
    MetricCollision {
        query: String,
        first: String,
        second: String,
        metric: String,
    },
}

/// Semantic role of a declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnUsage {
    Label,
    Discard,
    Counter,
    Gauge,
    Untyped,
    Histogram,
    MappedMetric,
}

impl ColumnUsage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnUsage::Label => "LABEL",
            ColumnUsage::Discard => "DISCARD",
            ColumnUsage::Counter => "COUNTER",
            ColumnUsage::Gauge => "GAUGE",
            ColumnUsage::Untyped => "UNTYPED",
            ColumnUsage::Histogram => "HISTOGRAM",
            ColumnUsage::MappedMetric => "MAPPEDMETRIC",
        }
    }

    /// Value type for numeric usages, `None` for everything else.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            ColumnUsage::Counter => Some(ValueType::Counter),
            ColumnUsage::Gauge => Some(ValueType::Gauge),
            ColumnUsage::Untyped => Some(ValueType::Untyped),
            _ => None,
        }
    }
}

impl FromStr for ColumnUsage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LABEL" => Ok(ColumnUsage::Label),
            "DISCARD" => Ok(ColumnUsage::Discard),
            "COUNTER" => Ok(ColumnUsage::Counter),
            "GAUGE" => Ok(ColumnUsage::Gauge),
            "UNTYPED" => Ok(ColumnUsage::Untyped),
            "HISTOGRAM" => Ok(ColumnUsage::Histogram),
            "MAPPEDMETRIC" => Ok(ColumnUsage::MappedMetric),
            other => Err(format!("unknown column usage: {}", other)),
        }
    }
}

impl TryFrom<String> for ColumnUsage {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnUsage> for String {
    fn from(value: ColumnUsage) -> Self {
        value.as_str().to_string()
    }
}

/// One SQL statement variant of a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Variant name, for logs.
    #[serde(default)]
    pub name: String,

    /// SQL text.
    pub sql: String,

    /// `"enable"` or `"disable"` (case-insensitive).
    #[serde(default = "default_status")]
    pub status: String,

    /// Optional statement timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

fn default_status() -> String {
    STATUS_ENABLE.to_string()
}

impl Statement {
    /// Create an enabled statement.
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            status: default_status(),
            timeout: None,
        }
    }

    /// Mark the statement disabled.
    pub fn disabled(mut self) -> Self {
        self.status = STATUS_DISABLE.to_string();
        self
    }

    /// Set the statement timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.as_secs_f64());
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.status.eq_ignore_ascii_case(STATUS_ENABLE)
    }

    fn has_known_status(&self) -> bool {
        self.is_enabled() || self.status.eq_ignore_ascii_case(STATUS_DISABLE)
    }

    /// Statement timeout; zero or negative means none.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
            .filter(|t| *t > 0.0)
            .and_then(|t| Duration::try_from_secs_f64(t).ok())
    }

    fn has_valid_timeout(&self) -> bool {
        match self.timeout {
            Some(t) if t > 0.0 => Duration::try_from_secs_f64(t).is_ok(),
            Some(t) => !t.is_nan(),
            None => true,
        }
    }
}

/// Declared column in a definition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Result column name.
    pub name: String,

    pub usage: ColumnUsage,

    /// HELP text.
    #[serde(default)]
    pub description: String,

    /// Require well-formed UTF-8 for label text from this column.
    #[serde(default)]
    pub check_utf8: bool,

    /// Alternative name used to build the metric name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, usage: ColumnUsage) -> Self {
        Self {
            name: name.into(),
            usage,
            description: String::new(),
            check_utf8: false,
            rename: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_check_utf8(mut self) -> Self {
        self.check_utf8 = true;
        self
    }

    pub fn with_rename(mut self, rename: impl Into<String>) -> Self {
        self.rename = Some(rename.into());
        self
    }
}

/// Deserialized query definition, before checking.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryDefinitionSpec {
    /// Human description.
    #[serde(default)]
    pub desc: String,

    /// SQL statement variants.
    #[serde(default)]
    pub queries: Vec<Statement>,

    /// Column declarations.
    #[serde(default)]
    pub metrics: Vec<ColumnSpec>,

    /// Column carrying the database name a row belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name_label: Option<String>,

    /// Merge priority; 0 lets the loader assign one.
    #[serde(default)]
    pub priority: u32,
}

/// Pre-built metadata for one declared column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub usage: ColumnUsage,
    pub check_utf8: bool,
    /// Sample descriptor; present for numeric usages only.
    pub sample: Option<Arc<SampleDesc>>,
}

/// Role of one result column, resolved against a definition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnRole<'a> {
    /// Declared numeric column: emit one sample.
    Value {
        descriptor: &'a ColumnDescriptor,
        sample: &'a Arc<SampleDesc>,
        const_labels: &'a ConstLabels,
    },
    Label(&'a ColumnDescriptor),
    Discard,
    Histogram,
    MappedMetric,
    /// Not declared by the definition.
    Undeclared,
}

/// A checked query definition with precomputed column descriptors.
///
/// Immutable once built; shared read-only by concurrent scrapes.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDefinition {
    name: String,
    spec: QueryDefinitionSpec,
    label_names: Arc<[String]>,
    label_columns: Vec<String>,
    columns: HashMap<String, ColumnDescriptor>,
}

impl QueryDefinition {
    /// Check a spec and precompute its column descriptors.
    pub fn build(name: impl Into<String>, spec: QueryDefinitionSpec) -> Result<Self, DefinitionError> {
        let name = name.into();
        validate(&name, &spec)?;

        let label_columns: Vec<String> = spec
            .metrics
            .iter()
            .filter(|c| c.usage == ColumnUsage::Label)
            .map(|c| c.name.clone())
            .collect();
        let label_names: Arc<[String]> = label_columns
            .iter()
            .map(|c| sanitize_label_name(c))
            .collect();

        let columns = spec
            .metrics
            .iter()
            .map(|c| {
                let sample = c.usage.value_type().map(|value_type| {
                    Arc::new(SampleDesc {
                        name: metric_name(&name, c),
                        help: if c.description.is_empty() {
                            c.name.clone()
                        } else {
                            c.description.clone()
                        },
                        label_names: label_names.clone(),
                        value_type,
                    })
                });
                let descriptor = ColumnDescriptor {
                    name: c.name.clone(),
                    usage: c.usage,
                    check_utf8: c.check_utf8,
                    sample,
                };
                (c.name.clone(), descriptor)
            })
            .collect();

        Ok(Self {
            name,
            spec,
            label_names,
            label_columns,
            columns,
        })
    }

    /// Health-check predicate, run again before each execution.
    pub fn check(&self) -> Result<(), DefinitionError> {
        validate(&self.name, &self.spec)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &str {
        &self.spec.desc
    }

    pub fn priority(&self) -> u32 {
        self.spec.priority
    }

    /// Copy of this definition with another priority.
    pub fn with_priority(&self, priority: u32) -> Result<Self, DefinitionError> {
        let mut spec = self.spec.clone();
        spec.priority = priority;
        Self::build(self.name.clone(), spec)
    }

    pub fn statements(&self) -> &[Statement] {
        &self.spec.queries
    }

    pub fn enabled_statements(&self) -> impl Iterator<Item = &Statement> {
        self.spec.queries.iter().filter(|s| s.is_enabled())
    }

    /// Label column names as they appear in the result set, in declared order.
    pub fn label_columns(&self) -> &[String] {
        &self.label_columns
    }

    /// Exposed label names, in declared order.
    pub fn label_names(&self) -> &Arc<[String]> {
        &self.label_names
    }

    pub fn db_name_label(&self) -> Option<&str> {
        self.spec.db_name_label.as_deref()
    }

    pub fn descriptor(&self, column: &str) -> Option<&ColumnDescriptor> {
        self.columns.get(column)
    }

    pub fn spec(&self) -> &QueryDefinitionSpec {
        &self.spec
    }

    /// Resolve the role of a result column.
    ///
    /// Numeric columns carry the server identity as constant labels.
    pub fn resolve_column<'a>(&'a self, column: &str, server: &'a ServerIdentity) -> ColumnRole<'a> {
        let Some(descriptor) = self.columns.get(column) else {
            return ColumnRole::Undeclared;
        };

        match (descriptor.usage, &descriptor.sample) {
            (ColumnUsage::Label, _) => ColumnRole::Label(descriptor),
            (ColumnUsage::Discard, _) => ColumnRole::Discard,
            (ColumnUsage::Histogram, _) => ColumnRole::Histogram,
            (ColumnUsage::MappedMetric, _) => ColumnRole::MappedMetric,
            (_, Some(sample)) => ColumnRole::Value {
                descriptor,
                sample,
                const_labels: server.labels(),
            },
            (_, None) => ColumnRole::Undeclared,
        }
    }
}

fn metric_name(definition: &str, column: &ColumnSpec) -> String {
    let column_name = column
        .rename
        .as_deref()
        .filter(|r| !r.is_empty())
        .unwrap_or(&column.name);
    build_metric_name(definition, column_name)
}

fn validate(name: &str, spec: &QueryDefinitionSpec) -> Result<(), DefinitionError> {
    if name.trim().is_empty() {
        return Err(DefinitionError::EmptyName);
    }

    if spec.queries.is_empty() {
        return Err(DefinitionError::NoStatements {
            query: name.to_string(),
        });
    }

    for (index, statement) in spec.queries.iter().enumerate() {
        if statement.sql.trim().is_empty() {
            return Err(DefinitionError::EmptySql {
                query: name.to_string(),
                index,
            });
        }
        if !statement.has_known_status() {
            return Err(DefinitionError::UnknownStatus {
                query: name.to_string(),
                index,
                status: statement.status.clone(),
            });
        }
        if !statement.has_valid_timeout() {
            return Err(DefinitionError::InvalidTimeout {
                query: name.to_string(),
                index,
                timeout: statement.timeout.map(|t| t.to_string()).unwrap_or_default(),
            });
        }
    }

    if spec.priority > MAX_PRIORITY {
        return Err(DefinitionError::PriorityOutOfRange {
            query: name.to_string(),
            priority: spec.priority,
        });
    }

    let mut seen = HashSet::new();
    let mut metrics: HashMap<String, &str> = HashMap::new();
    let mut labels: HashMap<String, &str> = HashMap::new();
    for (index, column) in spec.metrics.iter().enumerate() {
        if column.name.is_empty() {
            return Err(DefinitionError::EmptyColumn {
                query: name.to_string(),
                column: index,
            });
        }
        if !seen.insert(column.name.as_str()) {
            return Err(DefinitionError::DuplicateColumn {
                query: name.to_string(),
                column: column.name.clone(),
            });
        }
        if column.usage == ColumnUsage::Label {
            let label = sanitize_label_name(&column.name);
            if label == SERVER_LABEL {
                return Err(DefinitionError::ReservedLabel {
                    query: name.to_string(),
                    column: column.name.clone(),
                    label,
                });
            }
            if let Some(first) = labels.insert(label.clone(), &column.name) {
                return Err(DefinitionError::LabelCollision {
                    query: name.to_string(),
                    first: first.to_string(),
                    second: column.name.clone(),
                    label,
                });
            }
        }
        if column.usage.value_type().is_some() {
            let metric = metric_name(name, column);
            if let Some(first) = metrics.insert(metric.clone(), &column.name) {
                return Err(DefinitionError::MetricCollision {
                    query: name.to_string(),
                    first: first.to_string(),
                    second: column.name.clone(),
                    metric,
                });
            }
        }
    }

    if let Some(db_label) = &spec.db_name_label
        && !seen.contains(db_label.as_str())
    {
        return Err(DefinitionError::UnknownDbNameLabel {
            query: name.to_string(),
            column: db_label.clone(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg_database() -> QueryDefinitionSpec {
        QueryDefinitionSpec {
            desc: "per-database statistics".to_string(),
            queries: vec![Statement::new(
                "pg_database",
                "SELECT datname, numbackends FROM pg_stat_database",
            )],
            metrics: vec![
                ColumnSpec::new("datname", ColumnUsage::Label).with_check_utf8(),
                ColumnSpec::new("numbackends", ColumnUsage::Gauge).with_description("backends"),
                ColumnSpec::new("xact_commit", ColumnUsage::Counter).with_rename("commits"),
                ColumnSpec::new("oid", ColumnUsage::Discard),
            ],
            db_name_label: Some("datname".to_string()),
            priority: 0,
        }
    }

    #[test]
    fn test_build_precomputes_descriptors() {
        let def = QueryDefinition::build("pg_database", pg_database()).unwrap();

        assert_eq!(def.label_columns(), &["datname".to_string()]);
        assert_eq!(def.label_names().as_ref(), &["datname".to_string()]);

        let numbackends = def.descriptor("numbackends").unwrap();
        let sample = numbackends.sample.as_ref().unwrap();
        assert_eq!(sample.name, "pg_database_numbackends");
        assert_eq!(sample.help, "backends");
        assert_eq!(sample.value_type, ValueType::Gauge);

        let commits = def.descriptor("xact_commit").unwrap();
        let sample = commits.sample.as_ref().unwrap();
        assert_eq!(sample.name, "pg_database_commits");
        assert_eq!(sample.help, "xact_commit");
        assert_eq!(sample.value_type, ValueType::Counter);

        assert!(def.descriptor("datname").unwrap().sample.is_none());
    }

    #[test]
    fn test_resolve_column_roles() {
        let def = QueryDefinition::build("pg_database", pg_database()).unwrap();
        let server = ServerIdentity::new("db:5432");

        match def.resolve_column("numbackends", &server) {
            ColumnRole::Value {
                sample,
                const_labels,
                ..
            } => {
                assert_eq!(sample.name, "pg_database_numbackends");
                assert_eq!(const_labels[0].1, "db:5432");
            }
            other => panic!("unexpected role: {:?}", other),
        }

        assert!(matches!(
            def.resolve_column("datname", &server),
            ColumnRole::Label(_)
        ));
        assert_eq!(def.resolve_column("oid", &server), ColumnRole::Discard);
        assert_eq!(
            def.resolve_column("unknown", &server),
            ColumnRole::Undeclared
        );
        // Exact name match only.
        assert_eq!(
            def.resolve_column("NUMBACKENDS", &server),
            ColumnRole::Undeclared
        );
    }

    #[test]
    fn test_histogram_and_mapped_roles() {
        let mut spec = pg_database();
        spec.metrics.push(ColumnSpec::new("le", ColumnUsage::Histogram));
        spec.metrics.push(ColumnSpec::new("state", ColumnUsage::MappedMetric));
        let def = QueryDefinition::build("pg_database", spec).unwrap();
        let server = ServerIdentity::new("db:5432");

        assert_eq!(def.resolve_column("le", &server), ColumnRole::Histogram);
        assert_eq!(def.resolve_column("state", &server), ColumnRole::MappedMetric);
    }

    #[test]
    fn test_check_rejects_empty_name() {
        assert_eq!(
            QueryDefinition::build("  ", pg_database()).unwrap_err(),
            DefinitionError::EmptyName
        );
    }

    #[test]
    fn test_check_rejects_no_statements() {
        let mut spec = pg_database();
        spec.queries.clear();
        assert!(matches!(
            QueryDefinition::build("q", spec).unwrap_err(),
            DefinitionError::NoStatements { .. }
        ));
    }

    #[test]
    fn test_check_rejects_empty_sql_and_status() {
        let mut spec = pg_database();
        spec.queries.push(Statement::new("blank", "   "));
        assert_eq!(
            QueryDefinition::build("q", spec).unwrap_err(),
            DefinitionError::EmptySql {
                query: "q".to_string(),
                index: 1
            }
        );

        let mut spec = pg_database();
        spec.queries[0].status = "paused".to_string();
        assert!(matches!(
            QueryDefinition::build("q", spec).unwrap_err(),
            DefinitionError::UnknownStatus { .. }
        ));
    }

    #[test]
    fn test_check_rejects_duplicate_column() {
        let mut spec = pg_database();
        spec.metrics.push(ColumnSpec::new("numbackends", ColumnUsage::Counter));
        assert!(matches!(
            QueryDefinition::build("q", spec).unwrap_err(),
            DefinitionError::DuplicateColumn { .. }
        ));
    }

    #[test]
    fn test_check_rejects_metric_collision() {
        let mut spec = pg_database();
        spec.metrics
            .push(ColumnSpec::new("backends", ColumnUsage::Gauge).with_rename("numbackends"));
        assert!(matches!(
            QueryDefinition::build("q", spec).unwrap_err(),
            DefinitionError::MetricCollision { .. }
        ));
    }

    #[test]
    fn test_check_rejects_priority_and_db_label() {
        let mut spec = pg_database();
        spec.priority = 1000;
        assert!(matches!(
            QueryDefinition::build("q", spec).unwrap_err(),
            DefinitionError::PriorityOutOfRange { .. }
        ));

        let mut spec = pg_database();
        spec.db_name_label = Some("dbname".to_string());
        assert!(matches!(
            QueryDefinition::build("q", spec).unwrap_err(),
            DefinitionError::UnknownDbNameLabel { .. }
        ));
    }

    #[test]
    fn test_enabled_statements() {
        let mut spec = pg_database();
        spec.queries
            .push(Statement::new("legacy", "SELECT 1 AS numbackends").disabled());
        spec.queries[0].status = "ENABLE".to_string();
        let def = QueryDefinition::build("pg_database", spec).unwrap();

        let enabled: Vec<_> = def.enabled_statements().map(|s| s.name.as_str()).collect();
        assert_eq!(enabled, vec!["pg_database"]);
        assert!(def.check().is_ok());
    }

    #[test]
    fn test_statement_timeout() {
        let s = Statement::new("q", "SELECT 1").with_timeout(Duration::from_millis(1500));
        assert_eq!(s.timeout(), Some(Duration::from_millis(1500)));

        let mut s = Statement::new("q", "SELECT 1");
        s.timeout = Some(0.0);
        assert_eq!(s.timeout(), None);

        s.timeout = Some(1e20);
        assert_eq!(s.timeout(), None);
    }

    #[test]
    fn test_check_rejects_out_of_range_timeout() {
        for timeout in [1e20, f64::INFINITY, f64::NAN] {
            let mut spec = pg_database();
            spec.queries[0].timeout = Some(timeout);
            assert!(matches!(
                QueryDefinition::build("q", spec).unwrap_err(),
                DefinitionError::InvalidTimeout { index: 0, .. }
            ));
        }

        let mut spec = pg_database();
        spec.queries[0].timeout = Some(-1.0);
        assert!(QueryDefinition::build("q", spec).is_ok());
    }

    #[test]
    fn test_check_rejects_sanitized_label_collision() {
        let mut spec = pg_database();
        spec.metrics.push(ColumnSpec::new("wait-event", ColumnUsage::Label));
        spec.metrics.push(ColumnSpec::new("wait_event", ColumnUsage::Label));

        assert_eq!(
            QueryDefinition::build("q", spec).unwrap_err(),
            DefinitionError::LabelCollision {
                query: "q".to_string(),
                first: "wait-event".to_string(),
                second: "wait_event".to_string(),
                label: "wait_event".to_string(),
            }
        );
    }

    #[test]
    fn test_check_rejects_server_label_column() {
        let mut spec = pg_database();
        spec.metrics.push(ColumnSpec::new("server", ColumnUsage::Label));

        assert!(matches!(
            QueryDefinition::build("q", spec).unwrap_err(),
            DefinitionError::ReservedLabel { .. }
        ));
    }

    #[test]
    fn test_parse_spec_json5() {
        let json5 = r#"
        {
            desc: "locks",
            queries: [{ name: "pg_lock", sql: "SELECT mode, count FROM x", timeout: 2 }],
            metrics: [
                { name: "mode", usage: "label" },
                { name: "count", usage: "Gauge", description: "lock count" },
            ],
        }
        "#;
        let spec: QueryDefinitionSpec = json5::from_str(json5).unwrap();

        assert_eq!(spec.queries[0].status, "enable");
        assert_eq!(spec.queries[0].timeout(), Some(Duration::from_secs(2)));
        assert_eq!(spec.metrics[0].usage, ColumnUsage::Label);
        assert_eq!(spec.metrics[1].usage, ColumnUsage::Gauge);

        let bad = r#"{ queries: [{ sql: "SELECT 1" }], metrics: [{ name: "x", usage: "SUMMARY" }] }"#;
        assert!(json5::from_str::<QueryDefinitionSpec>(bad).is_err());
    }

    #[test]
    fn test_column_usage_roundtrip_names() {
        for usage in [
            ColumnUsage::Label,
            ColumnUsage::Discard,
            ColumnUsage::Counter,
            ColumnUsage::Gauge,
            ColumnUsage::Untyped,
            ColumnUsage::Histogram,
            ColumnUsage::MappedMetric,
        ] {
            assert_eq!(usage.as_str().parse::<ColumnUsage>(), Ok(usage));
        }
    }
}
