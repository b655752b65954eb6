//! Execution of one query definition against a source.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use gaussight_common::{DbValue, DefinitionError, MetricSample, SampleError, Statement};

use crate::row::{RowContext, RowOutcome, column_index, process_row};
use crate::source::{QuerySource, ResultSet, SourceError};

/// Failures that void a whole definition for one scrape.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("Definition check failed: {0}")]
    Definition(#[from] DefinitionError),

    #[error("All {count} statements of {query} failed, last error: {last}")]
    AllStatementsFailed {
        query: String,
        count: usize,
        last: SourceError,
    },
}

/// Result of executing one definition.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub samples: Vec<MetricSample>,
    /// Non-fatal column and label errors.
    pub errors: Vec<SampleError>,
    pub statements_run: usize,
    pub statements_failed: usize,
    pub rows: usize,
    /// Cancellation fired before all statements ran.
    pub cancelled: bool,
    pub duration: Duration,
}

/// Run every enabled statement of a definition and map the rows to samples.
///
/// A failing statement is logged and skipped; its siblings still run. Rows
/// of all statements are concatenated and resolved against the column list
/// of the last statement that succeeded. When `cancel` fires, remaining
/// statements are skipped and rows already fetched are still processed.
pub async fn execute(
    ctx: RowContext<'_>,
    source: &dyn QuerySource,
    cancel: &CancellationToken,
) -> Result<ExecutionOutcome, ExecuteError> {
    let start = Instant::now();
    let definition = ctx.definition;
    definition.check()?;

    let mut outcome = ExecutionOutcome::default();
    let mut columns: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<DbValue>> = Vec::new();
    let mut last_error = None;

    for statement in definition.enabled_statements() {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                outcome.cancelled = true;
                break;
            }
            result = run_statement(source, statement) => result,
        };

        outcome.statements_run += 1;
        match result {
            Ok(set) => {
                debug!(
                    query = %definition.name(),
                    statement = %statement.name,
                    rows = set.rows.len(),
                    "Statement executed"
                );
                columns = set.columns;
                rows.extend(set.rows);
            }
            Err(e) => {
                error!(
                    query = %definition.name(),
                    statement = %statement.name,
                    error = %e,
                    "Statement failed"
                );
                outcome.statements_failed += 1;
                last_error = Some(e);
            }
        }
    }

    if outcome.statements_run > 0
        && outcome.statements_failed == outcome.statements_run
        && let Some(last) = last_error
    {
        return Err(ExecuteError::AllStatementsFailed {
            query: definition.name().to_string(),
            count: outcome.statements_failed,
            last,
        });
    }

    let index = column_index(&columns);
    let mut mapped = RowOutcome::default();
    for row in &rows {
        mapped.extend(process_row(&ctx, &columns, &index, row));
    }

    for e in &mapped.errors {
        warn!(query = %definition.name(), error = %e, "Non-fatal sample error");
    }

    outcome.rows = rows.len();
    outcome.samples = mapped.samples;
    outcome.errors = mapped.errors;
    outcome.duration = start.elapsed();
    Ok(outcome)
}

async fn run_statement(
    source: &dyn QuerySource,
    statement: &Statement,
) -> Result<ResultSet, SourceError> {
    match statement.timeout() {
        Some(limit) => tokio::time::timeout(limit, source.query(&statement.sql))
            .await
            .map_err(|_| SourceError::Timeout(limit))?,
        None => source.query(&statement.sql).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gaussight_common::{
        CharsetMap, ColumnSpec, ColumnUsage, QueryDefinition, QueryDefinitionSpec,
        ServerIdentity,
    };
    use std::collections::HashMap;

    use crate::source::ServerInfo;

    #[derive(Default)]
    struct FakeSource {
        results: HashMap<String, Result<ResultSet, SourceError>>,
        delay: Option<Duration>,
    }

    impl FakeSource {
        fn with(mut self, sql: &str, result: Result<ResultSet, SourceError>) -> Self {
            self.results.insert(sql.to_string(), result);
            self
        }
    }

    #[async_trait]
    impl QuerySource for FakeSource {
        fn address(&self) -> &str {
            "fake:5432"
        }

        async fn query(&self, sql: &str) -> Result<ResultSet, SourceError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.results
                .get(sql)
                .cloned()
                .unwrap_or_else(|| Err(SourceError::Query(format!("no result for {}", sql))))
        }

        async fn ping(&self) -> Result<(), SourceError> {
            Ok(())
        }

        async fn server_info(&self) -> Result<ServerInfo, SourceError> {
            Ok(ServerInfo::default())
        }
    }

    fn set(columns: &[&str], rows: Vec<Vec<DbValue>>) -> ResultSet {
        ResultSet::new(columns.iter().map(|s| s.to_string()).collect(), rows)
    }

    fn definition(statements: Vec<Statement>) -> QueryDefinition {
        QueryDefinition::build(
            "pg_database",
            QueryDefinitionSpec {
                queries: statements,
                metrics: vec![
                    ColumnSpec::new("datname", ColumnUsage::Label),
                    ColumnSpec::new("numbackends", ColumnUsage::Gauge),
                ],
                ..Default::default()
            },
        )
        .unwrap()
    }

    async fn run(
        def: &QueryDefinition,
        source: &FakeSource,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, ExecuteError> {
        let server = ServerIdentity::new(source.address());
        let charsets = CharsetMap::default();
        let ctx = RowContext {
            definition: def,
            server: &server,
            charsets: &charsets,
            time_as_string: false,
        };
        execute(ctx, source, cancel).await
    }

    #[tokio::test]
    async fn test_disabled_statement_is_not_run() {
        let def = definition(vec![
            Statement::new("current", "SELECT a"),
            Statement::new("legacy", "SELECT b").disabled(),
        ]);
        let source = FakeSource::default()
            .with(
                "SELECT a",
                Ok(set(
                    &["datname", "numbackends"],
                    vec![vec!["postgres".into(), 3i64.into()]],
                )),
            )
            .with(
                "SELECT b",
                Ok(set(
                    &["datname", "numbackends"],
                    vec![vec!["legacy".into(), 9i64.into()]],
                )),
            );

        let out = run(&def, &source, &CancellationToken::new()).await.unwrap();

        assert_eq!(out.statements_run, 1);
        assert_eq!(out.samples.len(), 1);
        assert_eq!(out.samples[0].label_values(), &["postgres".to_string()]);
        assert_eq!(out.samples[0].value(), 3.0);
    }

    #[tokio::test]
    async fn test_failed_statement_does_not_stop_siblings() {
        let def = definition(vec![
            Statement::new("broken", "SELECT broken"),
            Statement::new("ok", "SELECT ok"),
        ]);
        let source = FakeSource::default()
            .with("SELECT broken", Err(SourceError::Query("syntax error".into())))
            .with(
                "SELECT ok",
                Ok(set(
                    &["datname", "numbackends"],
                    vec![
                        vec!["a".into(), 1i64.into()],
                        vec!["b".into(), 2i64.into()],
                    ],
                )),
            );

        let out = run(&def, &source, &CancellationToken::new()).await.unwrap();

        assert_eq!(out.statements_run, 2);
        assert_eq!(out.statements_failed, 1);
        assert_eq!(out.rows, 2);
        assert_eq!(out.samples.len(), 2);
    }

    #[tokio::test]
    async fn test_all_statements_failed() {
        let def = definition(vec![Statement::new("broken", "SELECT broken")]);
        let source = FakeSource::default()
            .with("SELECT broken", Err(SourceError::Query("syntax error".into())));

        let err = run(&def, &source, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExecuteError::AllStatementsFailed { count: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_rows_concatenated_with_last_columns() {
        let def = definition(vec![
            Statement::new("first", "SELECT 1"),
            Statement::new("second", "SELECT 2"),
        ]);
        let source = FakeSource::default()
            .with(
                "SELECT 1",
                Ok(set(
                    &["datname", "numbackends"],
                    vec![vec!["a".into(), 1i64.into()]],
                )),
            )
            .with(
                "SELECT 2",
                Ok(set(
                    &["datname", "numbackends"],
                    vec![vec!["b".into(), 2i64.into()]],
                )),
            );

        let out = run(&def, &source, &CancellationToken::new()).await.unwrap();
        let labels: Vec<_> = out
            .samples
            .iter()
            .map(|s| s.label_values()[0].clone())
            .collect();

        assert_eq!(labels, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_statement_timeout() {
        let def = definition(vec![
            Statement::new("slow", "SELECT slow").with_timeout(Duration::from_millis(20)),
        ]);
        let source = FakeSource {
            delay: Some(Duration::from_millis(500)),
            ..Default::default()
        }
        .with("SELECT slow", Ok(set(&["numbackends"], vec![])));

        let err = run(&def, &source, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ExecuteError::AllStatementsFailed { last, .. } => {
                assert!(matches!(last, SourceError::Timeout(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let def = definition(vec![Statement::new("q", "SELECT 1")]);
        let source = FakeSource::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let out = run(&def, &source, &cancel).await.unwrap();

        assert!(out.cancelled);
        assert_eq!(out.statements_run, 0);
        assert!(out.samples.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_mid_statement() {
        let def = definition(vec![
            Statement::new("q1", "SELECT 1"),
            Statement::new("q2", "SELECT 2"),
        ]);
        let source = FakeSource {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let out = run(&def, &source, &cancel).await.unwrap();

        assert!(out.cancelled);
        assert_eq!(out.statements_run, 0);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_no_enabled_statements_yields_nothing() {
        let def = definition(vec![Statement::new("q", "SELECT 1").disabled()]);
        let source = FakeSource::default();

        let out = run(&def, &source, &CancellationToken::new()).await.unwrap();

        assert_eq!(out.statements_run, 0);
        assert!(out.samples.is_empty());
        assert!(!out.cancelled);
    }

    #[test]
    fn test_check_error_message() {
        let err = ExecuteError::from(DefinitionError::NoStatements {
            query: "pg_database".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Definition check failed: Query pg_database has no statements"
        );
    }
}
