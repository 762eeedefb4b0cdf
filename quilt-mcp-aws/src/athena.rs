// quilt-mcp-aws/src/athena.rs
// ============================================================================
// Module: Athena Query Lifecycle
// Description: Workgroup discovery, submission, polling, result pagination.
// Purpose: Run catalog-routed SQL with cancellation-aware polling.
// Dependencies: aws-sdk-athena, quilt-mcp-core, tokio
// ============================================================================

//! ## Overview
//! The lifecycle is: resolve workgroup (explicit, configured default, then
//! first ENABLED workgroup), submit with the catalog and schema passed through
//! `QueryExecutionContext`, poll with exponential backoff until terminal,
//! then paginate typed results. Hyphenated database names make a `USE`
//! prefix unparseable on some engines, so the context parameters are the only
//! routing mechanism; submitted SQL is never rewritten.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use aws_sdk_athena::error::ProvideErrorMetadata;
use aws_sdk_athena::types::QueryExecutionContext;
use aws_sdk_athena::types::QueryExecutionState;
use aws_sdk_athena::types::ResultConfiguration;
use aws_sdk_athena::types::WorkGroupState;
use aws_sdk_athena::Client;
use quilt_mcp_core::ErrorKind;
use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use serde::Deserialize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Initial polling backoff.
const POLL_INITIAL: Duration = Duration::from_millis(200);
/// Polling backoff cap.
const POLL_CAP: Duration = Duration::from_secs(5);
/// Default page size when fetching results.
const RESULT_PAGE_SIZE: i32 = 1000;
/// Default data catalog when none is supplied.
pub const DEFAULT_DATA_CATALOG: &str = "AwsDataCatalog";

// ============================================================================
// SECTION: Query Shapes
// ============================================================================

/// One Athena query submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AthenaQuerySpec {
    /// SQL text, submitted verbatim.
    pub sql: String,
    /// Explicit workgroup; discovery applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workgroup: Option<String>,
    /// Data catalog routed via the execution context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    /// Database (schema) routed via the execution context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Result staging location override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_location: Option<String>,
}

/// Terminal query states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    /// Query completed successfully.
    Succeeded,
    /// Query failed; the reason travels in the envelope.
    Failed,
    /// Query was cancelled upstream.
    Cancelled,
}

/// One result column with the engine-reported type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Engine-reported type label.
    pub column_type: String,
}

/// Paginated, typed query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResults {
    /// Execution identifier.
    pub execution_id: String,
    /// Result columns in order.
    pub columns: Vec<ColumnInfo>,
    /// Rows as stringly-typed cells; `None` is SQL NULL.
    pub rows: Vec<Vec<Option<String>>>,
    /// True when the row limit truncated the result.
    pub truncated: bool,
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Athena lifecycle runner bound to one client.
#[derive(Debug, Clone)]
pub struct AthenaRunner {
    /// Underlying Athena client.
    client: Client,
    /// Configured default workgroup.
    default_workgroup: Option<String>,
}

impl AthenaRunner {
    /// Builds a runner.
    #[must_use]
    pub fn new(client: Client, default_workgroup: Option<String>) -> Self {
        Self {
            client,
            default_workgroup,
        }
    }

    /// Builds a runner for one request following the credential chain.
    ///
    /// # Errors
    ///
    /// Returns `AUTH_NO_CREDENTIALS` when strict mode leaves no usable
    /// credentials.
    pub async fn for_request(
        ctx: &quilt_mcp_core::RequestContext,
        options: &crate::s3::S3Options,
        default_workgroup: Option<String>,
    ) -> OpsResult<Self> {
        let shared = crate::s3::shared_config(ctx, options).await?;
        Ok(Self::new(Client::new(&shared), default_workgroup))
    }

    /// Resolves the workgroup: explicit, configured default, first ENABLED.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` when no enabled workgroup exists.
    pub async fn resolve_workgroup(&self, explicit: Option<&str>) -> OpsResult<String> {
        if let Some(workgroup) = explicit {
            return Ok(workgroup.to_string());
        }
        if let Some(workgroup) = &self.default_workgroup {
            return Ok(workgroup.clone());
        }
        let output = self
            .client
            .list_work_groups()
            .send()
            .await
            .map_err(|err| map_athena_error(err, "list workgroups"))?;
        output
            .work_groups()
            .iter()
            .find(|wg| wg.state() == Some(&WorkGroupState::Enabled))
            .and_then(|wg| wg.name())
            .map(str::to_string)
            .ok_or_else(|| {
                OpsError::not_found("no enabled Athena workgroup is visible")
                    .with_fix_hint("pass an explicit `workgroup` argument")
            })
    }

    /// Submits a query and returns the execution id.
    ///
    /// The catalog and database travel in `QueryExecutionContext`; the SQL is
    /// submitted exactly as given, never prefixed with `USE`.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when submission fails.
    pub async fn start(&self, spec: &AthenaQuerySpec) -> OpsResult<String> {
        let workgroup = self.resolve_workgroup(spec.workgroup.as_deref()).await?;
        let context = QueryExecutionContext::builder()
            .catalog(spec.catalog.as_deref().unwrap_or(DEFAULT_DATA_CATALOG))
            .set_database(spec.database.clone())
            .build();
        let mut request = self
            .client
            .start_query_execution()
            .query_string(&spec.sql)
            .work_group(workgroup)
            .query_execution_context(context);
        if let Some(location) = &spec.output_location {
            request = request.result_configuration(
                ResultConfiguration::builder().output_location(location).build(),
            );
        }
        let output =
            request.send().await.map_err(|err| map_athena_error(err, "start query"))?;
        output
            .query_execution_id()
            .map(str::to_string)
            .ok_or_else(|| OpsError::internal("Athena returned no execution id"))
    }

    /// Polls an execution until terminal, honoring cancellation.
    ///
    /// Backoff starts at 200 ms and doubles to a 5 s cap; cancellation is
    /// observed within one backoff interval.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope on failure, upstream cancellation, or
    /// client cancellation.
    pub async fn wait_terminal(
        &self,
        execution_id: &str,
        cancel: &CancellationToken,
    ) -> OpsResult<QueryState> {
        let mut backoff = POLL_INITIAL;
        loop {
            let output = self
                .client
                .get_query_execution()
                .query_execution_id(execution_id)
                .send()
                .await
                .map_err(|err| map_athena_error(err, "get query execution"))?;
            let execution = output.query_execution().ok_or_else(|| {
                OpsError::not_found(format!("query execution {execution_id} not found"))
            })?;
            let status = execution.status();
            let state = status.and_then(|s| s.state());
            if state == Some(&QueryExecutionState::Succeeded) {
                return Ok(QueryState::Succeeded);
            }
            if state == Some(&QueryExecutionState::Failed) {
                let reason = status
                    .and_then(|s| s.state_change_reason())
                    .unwrap_or("query failed")
                    .to_string();
                return Err(map_failure_reason(&reason));
            }
            if state == Some(&QueryExecutionState::Cancelled) {
                return Err(OpsError::new(
                    ErrorKind::UpstreamUnavailable,
                    "query was cancelled upstream",
                ));
            }
            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(OpsError::new(ErrorKind::Timeout, "query polling cancelled")
                        .with_cause("client disconnected"));
                }
                () = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(POLL_CAP);
        }
    }

    /// Fetches typed results after a terminal SUCCEEDED state.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when result pagination fails.
    pub async fn results(&self, execution_id: &str, max_rows: usize) -> OpsResult<QueryResults> {
        let mut columns: Vec<ColumnInfo> = Vec::new();
        let mut rows: Vec<Vec<Option<String>>> = Vec::new();
        let mut next_token: Option<String> = None;
        let mut first_page = true;
        let mut truncated = false;
        loop {
            let mut request = self
                .client
                .get_query_results()
                .query_execution_id(execution_id)
                .max_results(RESULT_PAGE_SIZE);
            if let Some(token) = &next_token {
                request = request.next_token(token);
            }
            let output =
                request.send().await.map_err(|err| map_athena_error(err, "get query results"))?;
            if let Some(result_set) = output.result_set() {
                if first_page {
                    columns = result_set
                        .result_set_metadata()
                        .map(|meta| {
                            meta.column_info()
                                .iter()
                                .map(|column| ColumnInfo {
                                    name: column.name().to_string(),
                                    column_type: column.r#type().to_string(),
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                }
                for (index, row) in result_set.rows().iter().enumerate() {
                    // Athena repeats the header as the first row of the first page.
                    if first_page && index == 0 && row_is_header(row, &columns) {
                        continue;
                    }
                    if rows.len() >= max_rows {
                        truncated = true;
                        break;
                    }
                    rows.push(
                        row.data()
                            .iter()
                            .map(|datum| datum.var_char_value().map(str::to_string))
                            .collect(),
                    );
                }
            }
            first_page = false;
            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() || truncated {
                break;
            }
        }
        Ok(QueryResults {
            execution_id: execution_id.to_string(),
            columns,
            rows,
            truncated,
        })
    }

    /// Runs the full lifecycle: submit, poll, fetch.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope at whichever stage fails first.
    pub async fn execute(
        &self,
        spec: &AthenaQuerySpec,
        cancel: &CancellationToken,
        max_rows: usize,
    ) -> OpsResult<QueryResults> {
        let execution_id = self.start(spec).await?;
        self.wait_terminal(&execution_id, cancel).await?;
        self.results(&execution_id, max_rows).await
    }

    /// Lists visible workgroups with their states.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the listing fails.
    pub async fn workgroups(&self) -> OpsResult<Vec<(String, String)>> {
        let output = self
            .client
            .list_work_groups()
            .send()
            .await
            .map_err(|err| map_athena_error(err, "list workgroups"))?;
        Ok(output
            .work_groups()
            .iter()
            .filter_map(|wg| {
                Some((
                    wg.name()?.to_string(),
                    wg.state().map(|state| state.as_str().to_string()).unwrap_or_default(),
                ))
            })
            .collect())
    }

    /// Lists databases in a data catalog.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the listing fails.
    pub async fn databases(&self, catalog: &str) -> OpsResult<Vec<String>> {
        let mut names = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut request = self.client.list_databases().catalog_name(catalog);
            if let Some(token) = &next_token {
                request = request.next_token(token);
            }
            let output =
                request.send().await.map_err(|err| map_athena_error(err, "list databases"))?;
            names.extend(output.database_list().iter().map(|db| db.name().to_string()));
            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }
        Ok(names)
    }

    /// Lists recent query executions in a workgroup.
    ///
    /// # Errors
    ///
    /// Returns the mapped envelope when the listing fails.
    pub async fn history(&self, workgroup: &str, limit: usize) -> OpsResult<Vec<String>> {
        let output = self
            .client
            .list_query_executions()
            .work_group(workgroup)
            .max_results(i32::try_from(limit).unwrap_or(50))
            .send()
            .await
            .map_err(|err| map_athena_error(err, "list query executions"))?;
        Ok(output.query_execution_ids().to_vec())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true when a result row repeats the column header labels.
fn row_is_header(row: &aws_sdk_athena::types::Row, columns: &[ColumnInfo]) -> bool {
    if columns.is_empty() {
        return false;
    }
    let data = row.data();
    data.len() == columns.len()
        && data
            .iter()
            .zip(columns)
            .all(|(datum, column)| datum.var_char_value() == Some(column.name.as_str()))
}

/// Maps a failure reason string to an error kind.
fn map_failure_reason(reason: &str) -> OpsError {
    let lowered = reason.to_ascii_lowercase();
    let kind = if lowered.contains("access denied") || lowered.contains("not authorized") {
        ErrorKind::PermissionDenied
    } else if lowered.contains("does not exist") || lowered.contains("not found") {
        ErrorKind::NotFound
    } else if lowered.contains("syntax") || lowered.contains("mismatched input") {
        ErrorKind::ValidationFailed
    } else {
        ErrorKind::UpstreamUnavailable
    };
    OpsError::new(kind, format!("query failed: {reason}"))
}

/// Maps an Athena SDK failure into the uniform envelope.
fn map_athena_error<E, R>(err: aws_sdk_athena::error::SdkError<E, R>, operation: &str) -> OpsError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    if matches!(&err, aws_sdk_athena::error::SdkError::TimeoutError(_)) {
        return OpsError::new(ErrorKind::Timeout, format!("{operation} timed out"));
    }
    let code = err.code().unwrap_or_default();
    let message = err.message().unwrap_or("request failed").to_string();
    let kind = match code {
        "InvalidRequestException" => ErrorKind::ValidationFailed,
        "AccessDeniedException" => ErrorKind::PermissionDenied,
        "ResourceNotFoundException" => ErrorKind::NotFound,
        "TooManyRequestsException" | "InternalServerException" => ErrorKind::UpstreamUnavailable,
        _ => ErrorKind::UpstreamUnavailable,
    };
    OpsError::new(kind, format!("{operation} failed: {message}")).with_cause(format!("{code}"))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use quilt_mcp_core::ErrorKind;

    use super::map_failure_reason;
    use super::AthenaQuerySpec;

    #[test]
    fn spec_round_trips_without_mutating_sql() {
        let spec: AthenaQuerySpec = serde_json::from_value(serde_json::json!({
            "sql": "SELECT 1",
            "catalog": "AwsDataCatalog",
            "database": "udp-spec",
        }))
        .expect("spec");
        assert_eq!(spec.sql, "SELECT 1");
        assert!(!spec.sql.starts_with("USE"));
        assert_eq!(spec.database.as_deref(), Some("udp-spec"));
    }

    #[test]
    fn failure_reasons_classify_by_content() {
        assert_eq!(
            map_failure_reason("Access Denied when writing results").kind,
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            map_failure_reason("Table awsdatacatalog.db.t does not exist").kind,
            ErrorKind::NotFound
        );
        assert_eq!(
            map_failure_reason("SYNTAX_ERROR: mismatched input 'FORM'").kind,
            ErrorKind::ValidationFailed
        );
        assert_eq!(
            map_failure_reason("internal engine fault").kind,
            ErrorKind::UpstreamUnavailable
        );
    }
}
