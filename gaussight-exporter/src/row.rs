//! Row processing: one result row in, samples and non-fatal errors out.

use std::collections::HashMap;

use tracing::{debug, trace};

use gaussight_common::{
    CharsetMap, ColumnRole, DbValue, MetricSample, QueryDefinition, SampleError, ServerIdentity,
    coerce_to_number, coerce_to_text, validate_and_fix,
};

/// Everything constant across the rows of one definition execution.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub definition: &'a QueryDefinition,
    pub server: &'a ServerIdentity,
    pub charsets: &'a CharsetMap,
    /// Render timestamp labels as RFC3339 instead of epoch millis.
    pub time_as_string: bool,
}

/// Samples and non-fatal errors produced from rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowOutcome {
    pub samples: Vec<MetricSample>,
    pub errors: Vec<SampleError>,
}

impl RowOutcome {
    pub fn extend(&mut self, other: RowOutcome) {
        self.samples.extend(other.samples);
        self.errors.extend(other.errors);
    }
}

/// Map column names to their position in a row.
pub fn column_index(columns: &[String]) -> HashMap<&str, usize> {
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect()
}

/// Turn one row into samples.
///
/// Labels are resolved first, in the definition's declared order; a label
/// that cannot be decoded becomes `""`. Then every declared numeric column
/// yields one sample. An unparseable value skips only that column.
pub fn process_row(
    ctx: &RowContext<'_>,
    columns: &[String],
    index: &HashMap<&str, usize>,
    row: &[DbValue],
) -> RowOutcome {
    let definition = ctx.definition;
    let mut outcome = RowOutcome::default();

    let database = definition
        .db_name_label()
        .and_then(|column| index.get(column))
        .and_then(|&i| row.get(i))
        .and_then(|value| coerce_to_text(value, ctx.time_as_string))
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

    let labels = resolve_labels(ctx, index, row, database.as_deref(), &mut outcome.errors);

    for (column, value) in columns.iter().zip(row) {
        let (sample, const_labels) = match definition.resolve_column(column, ctx.server) {
            ColumnRole::Value {
                sample,
                const_labels,
                ..
            } => (sample, const_labels),
            ColumnRole::Undeclared => {
                trace!(query = %definition.name(), column = %column, "Skipping undeclared column");
                continue;
            }
            ColumnRole::Label(_)
            | ColumnRole::Discard
            | ColumnRole::Histogram
            | ColumnRole::MappedMetric => continue,
        };

        let (number, ok) = coerce_to_number(value);
        if !ok {
            outcome.errors.push(SampleError::UnexpectedValue {
                metric: sample.name.clone(),
                column: column.clone(),
                value: value.to_string(),
            });
            continue;
        }

        match MetricSample::new(sample.clone(), const_labels.clone(), number, labels.clone()) {
            Ok(s) => outcome.samples.push(s),
            Err(e) => outcome.errors.push(e),
        }
    }

    outcome
}

fn resolve_labels(
    ctx: &RowContext<'_>,
    index: &HashMap<&str, usize>,
    row: &[DbValue],
    database: Option<&str>,
    errors: &mut Vec<SampleError>,
) -> Vec<String> {
    let definition = ctx.definition;

    definition
        .label_columns()
        .iter()
        .map(|label| {
            let Some(value) = index.get(label.as_str()).and_then(|&i| row.get(i)) else {
                errors.push(SampleError::MissingLabel {
                    query: definition.name().to_string(),
                    label: label.clone(),
                });
                return String::new();
            };

            let Some(text) = coerce_to_text(value, ctx.time_as_string) else {
                errors.push(SampleError::LabelDecode {
                    query: definition.name().to_string(),
                    label: label.clone(),
                    kind: value.kind().to_string(),
                });
                return String::new();
            };

            let check_utf8 = definition
                .descriptor(label)
                .is_some_and(|d| d.check_utf8);
            let was_empty = text.is_empty();
            let fixed = validate_and_fix(text, check_utf8, database, ctx.charsets);
            if fixed.is_empty() && !was_empty {
                debug!(
                    query = %definition.name(),
                    label = %label,
                    database = database.unwrap_or(""),
                    "Label text degraded to empty"
                );
                errors.push(SampleError::LabelEncoding {
                    query: definition.name().to_string(),
                    label: label.clone(),
                });
            }
            fixed
        })
        .collect()
}
