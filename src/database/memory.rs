//! In-process `Store` used for local demo runs (`STORE_BACKEND=memory`) and tests.
//!
//! It understands the same where-clause language as the SQL builder and can be
//! told which columns a table has, which tables are missing and which tables
//! reject writes, so the schema-variant fallbacks can be exercised without a
//! database.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::database::store::{Row, Store, StoreError, Table};
use crate::filter::filter_order::FilterOrder;
use crate::filter::{FilterData, FilterOp, SortDirection};

#[derive(Default)]
struct Schema {
    columns: HashMap<Table, BTreeSet<String>>,
    missing_tables: HashSet<Table>,
    read_only: HashSet<Table>,
}

pub struct MemoryStore {
    tables: RwLock<HashMap<Table, Vec<Row>>>,
    schema: RwLock<Schema>,
    clock: Mutex<DateTime<Utc>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            schema: RwLock::new(Schema::default()),
            clock: Mutex::new(Utc::now()),
        }
    }

    /// Restrict `table` to the given columns. Writes or filters naming any
    /// other column fail the way Postgres does.
    pub fn with_columns(self, table: Table, columns: &[&str]) -> Self {
        if let Ok(mut schema) = self.schema.write() {
            schema.columns.insert(table, columns.iter().map(|c| c.to_string()).collect());
        }
        self
    }

    /// Every operation on `table` fails with "relation does not exist".
    pub fn without_table(self, table: Table) -> Self {
        if let Ok(mut schema) = self.schema.write() {
            schema.missing_tables.insert(table);
        }
        self
    }

    /// Writes to `table` fail with a permission error; reads still work.
    pub fn with_read_only(self, table: Table) -> Self {
        if let Ok(mut schema) = self.schema.write() {
            schema.read_only.insert(table);
        }
        self
    }

    /// Insert rows as-is (generated columns are still filled in).
    pub fn seed(&self, table: Table, rows: Vec<Value>) {
        let stamped: Vec<Row> = rows
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .map(|row| self.stamp(table, row))
            .collect();
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables.entry(table).or_default().extend(stamped);
    }

    /// Snapshot of a table's rows in insertion order.
    pub fn rows(&self, table: Table) -> Vec<Row> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables.get(&table).cloned().unwrap_or_default()
    }

    /// A small catalog and flag set for running the API without a database.
    pub fn with_demo_data(self) -> Self {
        let apparel = Uuid::new_v4().to_string();
        let gadgets = Uuid::new_v4().to_string();
        let tees = Uuid::new_v4().to_string();

        self.seed(Table::Categories, vec![
            json!({ "id": apparel, "name": "Apparel", "description": "Clothing and streetwear", "display_order": 1, "is_hidden": false }),
            json!({ "id": gadgets, "name": "Gadgets", "description": "Small electronics", "display_order": 2, "is_hidden": false }),
        ]);
        self.seed(Table::Subcategories, vec![
            json!({ "id": tees, "category_id": apparel, "name": "T-Shirts", "display_order": 1 }),
        ]);
        self.seed(Table::Products, vec![
            json!({ "name": "Classic Tee", "description": "Cotton crew neck tee", "price": 650, "stock": 40, "category_id": apparel, "subcategory_id": tees, "image_url": null, "rating": 4.4, "is_elite_drop": false }),
            json!({ "name": "Limited Hoodie", "description": "Numbered heavyweight hoodie", "price": 1800, "stock": 5, "category_id": apparel, "image_url": null, "rating": 4.9, "is_elite_drop": true }),
            json!({ "name": "Wireless Earbuds", "description": "Noise cancelling earbuds", "price": 3200, "stock": 12, "category_id": gadgets, "image_url": null, "rating": 4.1, "is_elite_drop": false }),
        ]);
        self.seed(Table::MasterConfig, vec![
            json!({ "feature_key": "squad_buys_enabled", "is_enabled": true, "metadata": { "description": "Group buying with discounts" } }),
            json!({ "feature_key": "partial_cod_enabled", "is_enabled": true, "metadata": { "description": "50% prepay, 50% on delivery" } }),
            json!({ "feature_key": "ai_search_enabled", "is_enabled": false, "metadata": { "description": "AI-powered product search" } }),
            json!({ "feature_key": "elite_drops_enabled", "is_enabled": true, "metadata": { "description": "Premium product drops" } }),
        ]);
        self
    }

    fn next_timestamp(&self) -> String {
        let mut last = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        let next = if now > *last { now } else { *last + Duration::microseconds(1) };
        *last = next;
        next.to_rfc3339()
    }

    fn stamp(&self, table: Table, mut row: Row) -> Row {
        if table.key_column() == "id" && !row.contains_key("id") {
            row.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        if !row.contains_key("created_at") {
            row.insert("created_at".to_string(), Value::String(self.next_timestamp()));
        }
        if matches!(table, Table::Products | Table::Orders) && !row.contains_key("updated_at") {
            let created = row.get("created_at").cloned().unwrap_or(Value::Null);
            row.insert("updated_at".to_string(), created);
        }
        row
    }

    fn check_table(&self, table: Table) -> Result<(), StoreError> {
        let schema = self.schema.read().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        if schema.missing_tables.contains(&table) {
            return Err(StoreError::Backend(format!("relation \"{}\" does not exist", table)));
        }
        Ok(())
    }

    fn check_writable(&self, table: Table) -> Result<(), StoreError> {
        let schema = self.schema.read().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        if schema.read_only.contains(&table) {
            return Err(StoreError::Backend(format!("permission denied for table {}", table)));
        }
        Ok(())
    }

    fn check_write_columns(&self, table: Table, row: &Row) -> Result<(), StoreError> {
        let schema = self.schema.read().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        if let Some(columns) = schema.columns.get(&table) {
            for key in row.keys() {
                if !columns.contains(key) {
                    return Err(StoreError::Backend(format!(
                        "column \"{}\" of relation \"{}\" does not exist",
                        key, table
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_read_columns<'a>(&self, table: Table, names: impl IntoIterator<Item = &'a String>) -> Result<(), StoreError> {
        let schema = self.schema.read().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        if let Some(columns) = schema.columns.get(&table) {
            for name in names {
                if name != "*" && !columns.contains(name) {
                    return Err(StoreError::Backend(format!("column \"{}\" does not exist", name)));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn select(&self, table: Table, filter: FilterData) -> Result<Vec<Row>, StoreError> {
        self.check_table(table)?;

        let where_clause = filter.where_clause.unwrap_or(Value::Null);
        let mut referenced = Vec::new();
        collect_columns(&where_clause, &mut referenced);
        self.check_read_columns(table, referenced.iter())?;
        if let Some(select) = &filter.select {
            self.check_read_columns(table, select.iter())?;
        }
        let order = match &filter.order {
            Some(spec) => FilterOrder::validate_and_parse(spec)?,
            None => vec![],
        };

        let mut matched = Vec::new();
        {
            let tables = self.tables.read().map_err(|e| StoreError::Unavailable(e.to_string()))?;
            for row in tables.get(&table).map(|v| v.as_slice()).unwrap_or(&[]) {
                if matches_where(row, &where_clause)? {
                    matched.push(row.clone());
                }
            }
        }

        if !order.is_empty() {
            matched.sort_by(|a, b| {
                for info in &order {
                    let ord = compare_for_sort(a.get(&info.column), b.get(&info.column), info.sort);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let limit = filter.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        let page = matched.into_iter().skip(offset).take(limit);

        let rows = match filter.select.filter(|cols| !cols.iter().any(|c| c == "*")) {
            Some(cols) => page
                .map(|row| {
                    cols.iter()
                        .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                        .collect::<Map<String, Value>>()
                })
                .collect(),
            None => page.collect(),
        };
        Ok(rows)
    }

    async fn insert(&self, table: Table, rows: Vec<Row>) -> Result<Vec<Row>, StoreError> {
        self.check_table(table)?;
        self.check_writable(table)?;
        for row in &rows {
            self.check_write_columns(table, row)?;
        }

        let stamped: Vec<Row> = rows.into_iter().map(|row| self.stamp(table, row)).collect();
        let mut tables = self.tables.write().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        tables.entry(table).or_default().extend(stamped.iter().cloned());
        Ok(stamped)
    }

    async fn update(&self, table: Table, where_clause: Value, patch: Row) -> Result<Vec<Row>, StoreError> {
        self.check_table(table)?;
        self.check_writable(table)?;
        if patch.is_empty() {
            return Err(StoreError::InvalidQuery("No columns to update".to_string()));
        }
        self.check_write_columns(table, &patch)?;

        let mut tables = self.tables.write().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let mut updated = Vec::new();
        for row in tables.entry(table).or_default().iter_mut() {
            if matches_where(row, &where_clause)? {
                for (k, v) in &patch {
                    row.insert(k.clone(), v.clone());
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: Table, where_clause: Value) -> Result<u64, StoreError> {
        self.check_table(table)?;
        self.check_writable(table)?;

        let mut tables = self.tables.write().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let rows = tables.entry(table).or_default();
        // Match every row first so a bad clause leaves the table untouched
        let matched = rows
            .iter()
            .map(|row| matches_where(row, &where_clause))
            .collect::<Result<Vec<bool>, _>>()?;
        let removed = matched.iter().filter(|m| **m).count() as u64;
        let mut matched = matched.into_iter();
        rows.retain(|_| !matched.next().unwrap_or(false));
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn collect_columns(where_data: &Value, out: &mut Vec<String>) {
    if let Value::Object(obj) = where_data {
        for (key, value) in obj {
            if key.starts_with('$') {
                match value {
                    Value::Array(items) => items.iter().for_each(|v| collect_columns(v, out)),
                    other => collect_columns(other, out),
                }
            } else {
                out.push(key.clone());
            }
        }
    }
}

fn matches_where(row: &Row, where_data: &Value) -> Result<bool, StoreError> {
    let obj = match where_data {
        Value::Null => return Ok(true),
        Value::Object(obj) => obj,
        _ => return Err(StoreError::InvalidQuery("WHERE must be an object".to_string())),
    };

    for (key, value) in obj {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for v in as_clause_list(key, value)? {
                    all &= matches_where(row, v)?;
                }
                all
            }
            "$or" => {
                let mut any = false;
                for v in as_clause_list(key, value)? {
                    any |= matches_where(row, v)?;
                }
                any
            }
            "$not" => !matches_where(row, value)?,
            k if k.starts_with('$') => {
                return Err(StoreError::InvalidQuery(format!("Unsupported operator: {}", k)));
            }
            column => {
                let actual = row.get(column).unwrap_or(&Value::Null);
                match value {
                    Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
                        let mut all = true;
                        for (op_key, operand) in ops {
                            let op = FilterOp::parse(op_key)
                                .ok_or_else(|| StoreError::InvalidQuery(format!("Unsupported operator: {}", op_key)))?;
                            all &= apply_op(actual, op, operand)?;
                        }
                        all
                    }
                    _ => apply_op(actual, FilterOp::Eq, value)?,
                }
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn as_clause_list<'a>(op: &str, value: &'a Value) -> Result<&'a Vec<Value>, StoreError> {
    value
        .as_array()
        .ok_or_else(|| StoreError::InvalidQuery(format!("{} requires array", op)))
}

fn apply_op(actual: &Value, op: FilterOp, operand: &Value) -> Result<bool, StoreError> {
    Ok(match op {
        FilterOp::Eq => values_equal(actual, operand),
        FilterOp::Ne => {
            if operand.is_null() {
                !actual.is_null()
            } else {
                !actual.is_null() && !values_equal(actual, operand)
            }
        }
        FilterOp::Gt => compare_values(actual, operand) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(compare_values(actual, operand), Some(Ordering::Greater | Ordering::Equal)),
        FilterOp::Lt => compare_values(actual, operand) == Some(Ordering::Less),
        FilterOp::Lte => matches!(compare_values(actual, operand), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::Like | FilterOp::ILike => {
            let pattern = operand
                .as_str()
                .ok_or_else(|| StoreError::InvalidQuery("LIKE pattern must be a string".to_string()))?;
            match as_text(actual) {
                Some(text) if op == FilterOp::ILike => like_match(&text.to_lowercase(), &pattern.to_lowercase()),
                Some(text) => like_match(&text, pattern),
                None => false,
            }
        }
        FilterOp::In | FilterOp::NIn => {
            let candidates = operand
                .as_array()
                .ok_or_else(|| StoreError::InvalidQuery("$in/$nin requires an array".to_string()))?;
            let found = candidates.iter().any(|c| values_equal(actual, c));
            if op == FilterOp::In { found } else { !actual.is_null() && !found }
        }
        FilterOp::Between => {
            let bounds = operand
                .as_array()
                .filter(|b| b.len() == 2)
                .ok_or_else(|| StoreError::InvalidQuery("$between requires exactly 2 values".to_string()))?;
            matches!(compare_values(actual, &bounds[0]), Some(Ordering::Greater | Ordering::Equal))
                && matches!(compare_values(actual, &bounds[1]), Some(Ordering::Less | Ordering::Equal))
        }
    })
}

/// Text form of a scalar, mirroring a `::text` cast.
fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (_, Value::String(s)) => as_text(actual).as_deref() == Some(s.as_str()),
        (_, Value::Number(_)) => match (as_number(actual), as_number(expected)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => actual == expected,
    }
}

fn compare_values(actual: &Value, operand: &Value) -> Option<Ordering> {
    if actual.is_null() || operand.is_null() {
        return None;
    }
    if operand.is_number() || actual.is_number() {
        let (a, b) = (as_number(actual)?, as_number(operand)?);
        return a.partial_cmp(&b);
    }
    Some(as_text(actual)?.cmp(&as_text(operand)?))
}

fn compare_for_sort(a: Option<&Value>, b: Option<&Value>, sort: SortDirection) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        // NULLS LAST in both directions
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ord = match (as_number(a), as_number(b)) {
                (Some(x), Some(y)) if a.is_number() || b.is_number() => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => as_text(a).cmp(&as_text(b)),
            };
            if sort == SortDirection::Desc { ord.reverse() } else { ord }
        }
    }
}

/// SQL LIKE: `%` matches any run, `_` matches one character.
fn like_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut ti, mut pi) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || (p[pi] != '%' && p[pi] == t[ti])) {
            ti += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star_p, star_t)) = backtrack {
            pi = star_p + 1;
            ti = star_t + 1;
            backtrack = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}
