//! Columnar analytics store: the [`Warehouse`] trait, the BigQuery REST
//! backend, and the at-least-once [`insert_rows`] helper.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use refinery_shared::{Record, RefineryError, Result, RetryPolicy};

use crate::auth::TokenSource;
use crate::schema::TableSchema;

/// A row ready to send, with an insert id that stays fixed across retries.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRow {
    pub insert_id: String,
    pub row: Record,
}

impl PendingRow {
    pub fn new(row: Record) -> Self {
        Self {
            insert_id: Uuid::now_v7().to_string(),
            row,
        }
    }
}

/// A row the store (or local validation) refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// Index into the rows passed to [`insert_rows`].
    pub index: usize,
    pub message: String,
}

/// Outcome of an [`insert_rows`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub attempted: usize,
    pub inserted: usize,
    pub row_errors: Vec<RowError>,
}

/// Streaming row inserts into one table.
///
/// `Err` means the whole request failed (transport, auth, 5xx) and may be
/// retried. Per-row rejections come back as `Ok(errors)` with indices into
/// `rows`.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn insert(
        &self,
        table: &str,
        schema: &TableSchema,
        rows: &[PendingRow],
    ) -> Result<Vec<RowError>>;
}

/// Project, validate, and insert `rows` into `table`.
///
/// Transport failures retry the whole batch under `policy` (the rows keep
/// their insert ids, so the store can drop duplicates). Row-level errors are
/// logged and returned, never retried.
#[instrument(skip_all, fields(table = %table, rows = rows.len()))]
pub async fn insert_rows(
    warehouse: &dyn Warehouse,
    table: &str,
    schema: &TableSchema,
    rows: &[Record],
    policy: &RetryPolicy,
) -> Result<InsertReport> {
    let mut report = InsertReport {
        attempted: rows.len(),
        ..Default::default()
    };

    // Local validation first; positions map pending rows back to caller indices.
    let mut pending = Vec::with_capacity(rows.len());
    let mut positions = Vec::with_capacity(rows.len());
    for (index, raw) in rows.iter().enumerate() {
        let row = schema.select(raw);
        match schema.validate(&row) {
            Ok(()) => {
                pending.push(PendingRow::new(row));
                positions.push(index);
            }
            Err(message) => report.row_errors.push(RowError { index, message }),
        }
    }

    if pending.is_empty() {
        log_row_errors(table, &report.row_errors);
        return Ok(report);
    }

    let mut attempt = 0;
    let remote_errors = loop {
        match warehouse.insert(table, schema, &pending).await {
            Ok(errors) => break errors,
            Err(e) if !policy.is_last(attempt) => {
                warn!(attempt = attempt + 1, error = %e, "insert failed, retrying");
                policy.pause(attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    };

    report.inserted = pending.len().saturating_sub(remote_errors.len());
    for err in remote_errors {
        let index = positions.get(err.index).copied().unwrap_or(err.index);
        report.row_errors.push(RowError {
            index,
            message: err.message,
        });
    }
    report.row_errors.sort_by_key(|e| e.index);

    log_row_errors(table, &report.row_errors);
    info!(
        inserted = report.inserted,
        errors = report.row_errors.len(),
        "rows inserted"
    );
    Ok(report)
}

fn log_row_errors(table: &str, errors: &[RowError]) {
    for err in errors {
        warn!(table, index = err.index, message = %err.message, "row rejected");
    }
}

// ---------------------------------------------------------------------------
// BigQuery
// ---------------------------------------------------------------------------

/// BigQuery `tabledata.insertAll` over REST.
pub struct BigQueryWarehouse {
    client: Client,
    endpoint: String,
    project: String,
    dataset: String,
    tokens: Arc<TokenSource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct InsertErrorEntry {
    index: usize,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl BigQueryWarehouse {
    pub fn new(
        client: Client,
        endpoint: &str,
        project: &str,
        dataset: &str,
        tokens: Arc<TokenSource>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project: project.to_string(),
            dataset: dataset.to_string(),
            tokens,
        }
    }

    fn insert_url(&self, table: &str) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/datasets/{}/tables/{}/insertAll",
            self.endpoint, self.project, self.dataset, table
        )
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn insert(
        &self,
        table: &str,
        _schema: &TableSchema,
        rows: &[PendingRow],
    ) -> Result<Vec<RowError>> {
        let body = json!({
            "kind": "bigquery#tableDataInsertAllRequest",
            "skipInvalidRows": true,
            "ignoreUnknownValues": false,
            "rows": rows
                .iter()
                .map(|r| json!({"insertId": r.insert_id, "json": Value::Object(r.row.clone())}))
                .collect::<Vec<_>>(),
        });

        let token = self.tokens.token().await?;
        let url = self.insert_url(table);
        debug!(%url, rows = rows.len(), "insertAll");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| RefineryError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RefineryError::api(status.as_u16(), format!("insertAll {table}: {text}")));
        }

        let parsed: InsertAllResponse = response
            .json()
            .await
            .map_err(|e| RefineryError::parse(format!("insertAll response: {e}")))?;

        Ok(parsed
            .insert_errors
            .into_iter()
            .map(|entry| RowError {
                index: entry.index,
                message: entry
                    .errors
                    .iter()
                    .map(|e| {
                        format!(
                            "{}: {}",
                            e.reason.as_deref().unwrap_or("invalid"),
                            e.message.as_deref().unwrap_or("")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("; "),
            })
            .collect())
    }
}
