use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgArguments, PgPool, Row as _};
use std::collections::BTreeSet;

use crate::database::store::{Row, Store, StoreError, Table};
use crate::filter::filter::validate_identifier;
use crate::filter::{Filter, FilterData};

/// `Store` backed by Postgres. Rows are moved in and out as JSON
/// (`row_to_json` / `jsonb_populate_recordset`) so column types are resolved by
/// the database rather than by the handlers.
pub struct PgStore {
    pool: PgPool,
    log_queries: bool,
}

impl PgStore {
    pub fn new(pool: PgPool, log_queries: bool) -> Self {
        Self { pool, log_queries }
    }

    async fn fetch_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        if self.log_queries {
            tracing::debug!(sql, params = ?params, "store query");
        }

        let mut q = sqlx::query(sql);
        for p in params.iter() {
            q = bind_param(q, p);
        }
        let rows = q.fetch_all(&self.pool).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            match row.try_get::<Value, _>("row")? {
                Value::Object(map) => out.push(map),
                other => {
                    return Err(StoreError::Backend(format!("unexpected row format: {}", other)));
                }
            }
        }
        Ok(out)
    }

    fn where_sql(table: Table, where_clause: Value, starting_param_index: usize) -> Result<(String, Vec<Value>), StoreError> {
        let mut filter = Filter::new(table.as_str())?;
        filter.where_clause(where_clause)?;
        let sql = filter.to_where_sql(starting_param_index)?;
        Ok((sql.query, sql.params))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn select(&self, table: Table, filter_data: FilterData) -> Result<Vec<Row>, StoreError> {
        let mut filter = Filter::new(table.as_str())?;
        filter.assign(filter_data)?;
        let sql = filter.to_sql()?;

        let query = format!("SELECT row_to_json(t) AS row FROM ({}) t", sql.query);
        self.fetch_rows(&query, &sql.params).await
    }

    async fn insert(&self, table: Table, rows: Vec<Row>) -> Result<Vec<Row>, StoreError> {
        if rows.is_empty() {
            return Ok(vec![]);
        }

        let columns = quoted_columns(&rows)?;
        if columns.is_empty() {
            return Err(StoreError::InvalidQuery("No columns to insert".to_string()));
        }

        let query = format!(
            "WITH written AS (\
                INSERT INTO \"{table}\" ({cols}) \
                SELECT {cols} FROM jsonb_populate_recordset(NULL::\"{table}\", $1) \
                RETURNING *\
            ) SELECT row_to_json(written) AS row FROM written",
            table = table.as_str(),
            cols = columns.join(", "),
        );

        let payload = Value::Array(rows.into_iter().map(Value::Object).collect());
        self.fetch_rows(&query, std::slice::from_ref(&payload)).await
    }

    async fn update(&self, table: Table, where_clause: Value, patch: Row) -> Result<Vec<Row>, StoreError> {
        let columns = quoted_columns(std::slice::from_ref(&patch))?;
        if columns.is_empty() {
            return Err(StoreError::InvalidQuery("No columns to update".to_string()));
        }

        let assignments: Vec<String> = columns
            .iter()
            .map(|c| format!("{c} = (SELECT {c} FROM jsonb_populate_record(NULL::\"{t}\", $1))", c = c, t = table.as_str()))
            .collect();
        let (predicate, where_params) = Self::where_sql(table, where_clause, 1)?;

        let query = format!(
            "WITH written AS (\
                UPDATE \"{table}\" SET {set} WHERE {predicate} RETURNING *\
            ) SELECT row_to_json(written) AS row FROM written",
            table = table.as_str(),
            set = assignments.join(", "),
            predicate = predicate,
        );

        let mut params = Vec::with_capacity(where_params.len() + 1);
        params.push(Value::Object(patch));
        params.extend(where_params);
        self.fetch_rows(&query, &params).await
    }

    async fn delete(&self, table: Table, where_clause: Value) -> Result<u64, StoreError> {
        let (predicate, params) = Self::where_sql(table, where_clause, 0)?;
        let query = format!("DELETE FROM \"{}\" WHERE {}", table.as_str(), predicate);
        if self.log_queries {
            tracing::debug!(sql = %query, params = ?params, "store delete");
        }

        let mut q = sqlx::query(&query);
        for p in params.iter() {
            q = bind_param(q, p);
        }
        let result = q.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Union of column names across `rows`, validated and quoted.
fn quoted_columns(rows: &[Row]) -> Result<Vec<String>, StoreError> {
    let mut names = BTreeSet::new();
    for row in rows {
        for key in row.keys() {
            validate_identifier(key)?;
            names.insert(key.as_str());
        }
    }
    Ok(names.into_iter().map(|n| format!("\"{}\"", n)).collect())
}

fn bind_param<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s.as_str()),
        // Arrays only reach here as recordset payloads; both bind as JSONB
        Value::Array(_) | Value::Object(_) => q.bind(v),
    }
}
