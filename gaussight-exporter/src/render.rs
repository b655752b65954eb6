//! Prometheus text exposition (format 0.0.4).

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;

use tracing::warn;

use gaussight_common::{MetricSample, ValueType};

/// Content type of the rendered output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

struct Family<'a> {
    help: &'a str,
    value_type: ValueType,
    series: Vec<&'a MetricSample>,
    seen: HashSet<Vec<(&'a str, &'a str)>>,
}

/// Render samples grouped into families, sorted by name.
///
/// Within a family the first sample of a label set wins; samples whose
/// type differs from the family's first-seen type are dropped.
pub fn render(samples: &[MetricSample]) -> String {
    let mut families: BTreeMap<&str, Family<'_>> = BTreeMap::new();
    let mut duplicates = 0usize;
    let mut conflicts = 0usize;

    for sample in samples {
        let family = families.entry(sample.name()).or_insert_with(|| Family {
            help: sample.help(),
            value_type: sample.value_type(),
            series: Vec::new(),
            seen: HashSet::new(),
        });

        if family.value_type != sample.value_type() {
            conflicts += 1;
            warn!(
                metric = %sample.name(),
                expected = %family.value_type,
                actual = %sample.value_type(),
                "Dropping sample with conflicting type"
            );
            continue;
        }

        if !family.seen.insert(sample.labels().collect()) {
            duplicates += 1;
            continue;
        }
        family.series.push(sample);
    }

    if duplicates > 0 || conflicts > 0 {
        warn!(duplicates, conflicts, "Dropped samples while rendering");
    }

    let mut output = String::with_capacity(samples.len() * 96);
    for (name, family) in &families {
        writeln!(output, "# HELP {} {}", name, escape_help(family.help)).ok();
        writeln!(output, "# TYPE {} {}", name, family.value_type.as_str()).ok();
        for sample in &family.series {
            writeln!(
                output,
                "{}{} {}",
                name,
                format_labels(sample),
                format_value(sample.value())
            )
            .ok();
        }
    }

    output
}

fn format_labels(sample: &MetricSample) -> String {
    let parts: Vec<String> = sample
        .labels()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    if parts.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", parts.join(","))
    }
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape HELP text: backslash and newline only.
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}
