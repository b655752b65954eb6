use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::naming::sanitize_label_name;

/// Constant labels shared by every sample of one target.
pub type ConstLabels = Arc<[(String, String)]>;

/// Label carrying the monitored server address.
pub const SERVER_LABEL: &str = "server";

/// Sample value type, as exposed to Prometheus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Counter,
    Gauge,
    Untyped,
}

impl ValueType {
    /// Get the TYPE comment string for Prometheus exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Counter => "counter",
            ValueType::Gauge => "gauge",
            ValueType::Untyped => "untyped",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of one monitored target (`host:port`), attached to every sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    address: String,
    labels: ConstLabels,
}

impl ServerIdentity {
    /// Identity with only the `server` label.
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_labels(address, &HashMap::new())
    }

    /// Identity with the `server` label plus user-supplied constant labels.
    ///
    /// Extra labels are sanitized and sorted; an extra `server` label is ignored.
    pub fn with_labels(address: impl Into<String>, extra: &HashMap<String, String>) -> Self {
        let address = address.into();
        let mut labels = vec![(SERVER_LABEL.to_string(), address.clone())];

        let mut extra: Vec<(String, String)> = extra
            .iter()
            .map(|(k, v)| (sanitize_label_name(k), v.clone()))
            .filter(|(k, _)| k != SERVER_LABEL)
            .collect();
        extra.sort_by(|a, b| a.0.cmp(&b.0));
        extra.dedup_by(|a, b| a.0 == b.0);
        labels.extend(extra);

        Self {
            address,
            labels: labels.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn labels(&self) -> &ConstLabels {
        &self.labels
    }
}

/// Pre-built metadata for every sample produced from one column.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleDesc {
    /// Full metric name.
    pub name: String,
    /// HELP text.
    pub help: String,
    /// Variable label names, in the definition's declared order.
    pub label_names: Arc<[String]>,
    /// Value type of the samples.
    pub value_type: ValueType,
}

/// One telemetry data point produced by a scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    desc: Arc<SampleDesc>,
    const_labels: ConstLabels,
    value: f64,
    label_values: Vec<String>,
}

impl MetricSample {
    /// Build a sample, checking the label values against the descriptor.
    pub fn new(
        desc: Arc<SampleDesc>,
        const_labels: ConstLabels,
        value: f64,
        label_values: Vec<String>,
    ) -> Result<Self, SampleError> {
        if label_values.len() != desc.label_names.len() {
            return Err(SampleError::LabelCardinality {
                metric: desc.name.clone(),
                expected: desc.label_names.len(),
                actual: label_values.len(),
            });
        }

        if let Some(name) = desc
            .label_names
            .iter()
            .find(|n| const_labels.iter().any(|(k, _)| k == *n))
        {
            return Err(SampleError::LabelConflict {
                metric: desc.name.clone(),
                label: name.clone(),
            });
        }

        Ok(Self {
            desc,
            const_labels,
            value,
            label_values,
        })
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn help(&self) -> &str {
        &self.desc.help
    }

    pub fn value_type(&self) -> ValueType {
        self.desc.value_type
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn desc(&self) -> &Arc<SampleDesc> {
        &self.desc
    }

    pub fn label_names(&self) -> &[String] {
        &self.desc.label_names
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    pub fn const_labels(&self) -> &ConstLabels {
        &self.const_labels
    }

    /// All labels: constant labels first, then variable labels.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.const_labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(
                self.desc
                    .label_names
                    .iter()
                    .zip(self.label_values.iter())
                    .map(|(k, v)| (k.as_str(), v.as_str())),
            )
    }
}

/// Non-fatal error for a single column or label of a row.
///
/// These never abort a row or a scrape; they are logged and counted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("Unexpected value parsing column {column} of {metric}: {value}")]
    UnexpectedValue {
        metric: String,
        column: String,
        value: String,
    },

    #[error("Cannot decode label {label} of {query}: unsupported {kind} value")]
    LabelDecode {
        query: String,
        label: String,
        kind: String,
    },

    #[error("Label column {label} of {query} is missing from the result set")]
    MissingLabel { query: String, label: String },

    #[error("Label {label} of {query} is not valid text in the database encoding")]
    LabelEncoding { query: String, label: String },

    #[error("Sample {metric} expects {expected} label values, got {actual}")]
    LabelCardinality {
        metric: String,
        expected: usize,
        actual: usize,
    },

    #[error("Sample {metric} label {label} collides with a constant label")]
    LabelConflict { metric: String, label: String },
}

impl SampleError {
    /// Column or label the error refers to.
    pub fn column(&self) -> Option<&str> {
        match self {
            SampleError::UnexpectedValue { column, .. } => Some(column),
            SampleError::LabelDecode { label, .. }
            | SampleError::MissingLabel { label, .. }
            | SampleError::LabelEncoding { label, .. } => Some(label),
            SampleError::LabelConflict { label, .. } => Some(label),
            SampleError::LabelCardinality { .. } => None,
        }
    }
}
