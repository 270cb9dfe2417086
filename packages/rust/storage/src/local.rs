//! libSQL-backed [`Warehouse`] for offline runs and tests.
//!
//! Each schema becomes one SQLite table, created on first insert. Timestamps
//! and dates are stored as TEXT, booleans as INTEGER 0/1.

use std::path::Path;

use async_trait::async_trait;
use libsql::{Connection, Database, Value as SqlValue, params};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use refinery_shared::{Record, RefineryError, Result};

use crate::schema::{FieldType, Mode, TableSchema};
use crate::warehouse::{PendingRow, RowError, Warehouse};

/// A local analytics store in a single libSQL file.
pub struct LocalWarehouse {
    #[allow(dead_code)]
    db: Database,
    conn: Mutex<Connection>,
}

impl LocalWarehouse {
    /// Open or create the database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RefineryError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| RefineryError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| RefineryError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn: Mutex::new(conn),
        })
    }

    /// Number of rows in `table` (0 if it was never created).
    pub async fn count(&self, table: &str) -> Result<u64> {
        let conn = self.conn.lock().await;
        if !table_exists(&conn, table).await? {
            return Ok(0);
        }

        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let mut rows = conn
            .query(&sql, params![])
            .await
            .map_err(|e| RefineryError::Storage(format!("count {table}: {e}")))?;
        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map(|n| n as u64)
                .map_err(|e| RefineryError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(RefineryError::Storage(e.to_string())),
        }
    }

    /// All rows of `table` as JSON records, in insertion order.
    pub async fn rows(&self, table: &str, schema: &TableSchema) -> Result<Vec<Record>> {
        let conn = self.conn.lock().await;
        let columns = schema
            .columns()
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {columns} FROM {} ORDER BY rowid", quote_ident(table));
        let mut rows = conn
            .query(&sql, params![])
            .await
            .map_err(|e| RefineryError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| RefineryError::Storage(format!("read {table}: {e}")))?
        {
            let mut record = Record::new();
            for (i, field) in schema.fields.iter().enumerate() {
                let value = row
                    .get_value(i as i32)
                    .map_err(|e| RefineryError::Storage(e.to_string()))?;
                record.insert(field.name.to_string(), from_sql(value, field.field_type));
            }
            results.push(record);
        }
        Ok(results)
    }

    async fn ensure_table(&self, conn: &Connection, table: &str, schema: &TableSchema) -> Result<()> {
        conn.execute_batch(&create_table_sql(table, schema))
            .await
            .map_err(|e| RefineryError::Storage(format!("create {table}: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl Warehouse for LocalWarehouse {
    async fn insert(
        &self,
        table: &str,
        schema: &TableSchema,
        rows: &[PendingRow],
    ) -> Result<Vec<RowError>> {
        let conn = self.conn.lock().await;
        self.ensure_table(&conn, table, schema).await?;

        let columns: Vec<String> = std::iter::once("insert_id")
            .chain(schema.columns())
            .map(quote_ident)
            .collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut errors = Vec::new();
        for (index, pending) in rows.iter().enumerate() {
            let mut values = vec![SqlValue::Text(pending.insert_id.clone())];
            for field in schema.fields {
                values.push(to_sql(pending.row.get(field.name).unwrap_or(&Value::Null)));
            }
            if let Err(e) = conn.execute(&sql, libsql::params_from_iter(values)).await {
                errors.push(RowError {
                    index,
                    message: e.to_string(),
                });
            }
        }
        debug!(table, rows = rows.len(), errors = errors.len(), "local insert");
        Ok(errors)
    }
}

async fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let mut rows = conn
        .query(
            "SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            params![table],
        )
        .await
        .map_err(|e| RefineryError::Storage(e.to_string()))?;
    let row = rows
        .next()
        .await
        .map_err(|e| RefineryError::Storage(e.to_string()))?;
    Ok(row.is_some())
}

fn create_table_sql(table: &str, schema: &TableSchema) -> String {
    let mut columns = vec!["insert_id TEXT PRIMARY KEY".to_string()];
    for field in schema.fields {
        let sql_type = match field.field_type {
            FieldType::String | FieldType::Timestamp | FieldType::Date => "TEXT",
            FieldType::Integer | FieldType::Boolean => "INTEGER",
            FieldType::Float => "REAL",
        };
        let not_null = if field.mode == Mode::Required {
            " NOT NULL"
        } else {
            ""
        };
        columns.push(format!("{} {sql_type}{not_null}", quote_ident(field.name)));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        quote_ident(table),
        columns.join(", ")
    )
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(value: SqlValue, field_type: FieldType) -> Value {
    match (value, field_type) {
        (SqlValue::Null, _) => Value::Null,
        (SqlValue::Integer(i), FieldType::Boolean) => Value::Bool(i != 0),
        (SqlValue::Integer(i), _) => Value::from(i),
        (SqlValue::Real(f), _) => Value::from(f),
        (SqlValue::Text(s), _) => Value::String(s),
        (SqlValue::Blob(b), _) => Value::String(String::from_utf8_lossy(&b).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CLEARBIT_PERSON_SCHEMA, TAGS_HISTORY_SCHEMA};
    use crate::warehouse::insert_rows;
    use refinery_shared::RetryPolicy;
    use serde_json::json;
    use uuid::Uuid;

    async fn test_warehouse() -> LocalWarehouse {
        let tmp = std::env::temp_dir().join(format!("refinery_test_{}.db", Uuid::now_v7()));
        LocalWarehouse::open(&tmp).await.expect("open local warehouse")
    }

    fn tag_row(tag: &str) -> Record {
        match json!({
            "refinery_id": "r1",
            "refined_at": "2018-11-02T13:45:00Z",
            "refined_date": "2018-11-02",
            "domain": "example.com",
            "url": "http://www.example.com",
            "tag": tag,
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn create_table_sql_marks_required_columns() {
        let sql = create_table_sql("tags", &TAGS_HISTORY_SCHEMA);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"tags\""));
        assert!(sql.contains("\"tag\" TEXT NOT NULL"));
        assert!(sql.contains("insert_id TEXT PRIMARY KEY"));
    }

    #[tokio::test]
    async fn insert_and_read_back() {
        let warehouse = test_warehouse().await;
        let rows = vec![tag_row("B2B"), tag_row("SAAS")];
        let report = insert_rows(
            &warehouse,
            "tags_history",
            &TAGS_HISTORY_SCHEMA,
            &rows,
            &RetryPolicy::immediate(1),
        )
        .await
        .expect("insert");

        assert_eq!(report.inserted, 2);
        assert_eq!(warehouse.count("tags_history").await.unwrap(), 2);

        let stored = warehouse.rows("tags_history", &TAGS_HISTORY_SCHEMA).await.unwrap();
        assert_eq!(stored[0]["tag"], "B2B");
        assert_eq!(stored[1]["tag"], "SAAS");
    }

    #[tokio::test]
    async fn count_of_missing_table_is_zero() {
        let warehouse = test_warehouse().await;
        assert_eq!(warehouse.count("never_created").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn broken_table_is_an_error_not_zero() {
        let warehouse = test_warehouse().await;
        warehouse
            .conn
            .lock()
            .await
            .execute_batch(
                "CREATE TABLE gone (x INTEGER); \
                 CREATE VIEW stale AS SELECT x FROM gone; \
                 DROP TABLE gone;",
            )
            .await
            .unwrap();

        let err = warehouse.count("stale").await.unwrap_err();
        assert!(matches!(err, RefineryError::Storage(_)));
        assert!(err.to_string().contains("count stale"));
    }

    #[tokio::test]
    async fn booleans_and_numbers_round_trip() {
        let warehouse = test_warehouse().await;
        let mut row = CLEARBIT_PERSON_SCHEMA.select(&tag_row("unused"));
        row.insert("fuzzy_match".into(), json!(true));
        row.insert("latitude".into(), json!(33.45));
        row.insert("github_followers".into(), json!(12));

        insert_rows(
            &warehouse,
            "person",
            &CLEARBIT_PERSON_SCHEMA,
            &[row],
            &RetryPolicy::immediate(1),
        )
        .await
        .expect("insert");

        let stored = warehouse.rows("person", &CLEARBIT_PERSON_SCHEMA).await.unwrap();
        assert_eq!(stored[0]["fuzzy_match"], true);
        assert_eq!(stored[0]["latitude"], 33.45);
        assert_eq!(stored[0]["github_followers"], 12);
        assert_eq!(stored[0]["bio"], Value::Null);
    }
}
