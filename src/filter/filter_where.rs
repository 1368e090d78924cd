use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter::validate_identifier;
use super::types::FilterOp;

/// Translates a JSON where clause into a parameterized SQL predicate.
///
/// Comparisons against string parameters cast the column to text so uuid and
/// enum columns can be matched with plain bound strings.
pub struct FilterWhere {
    param_values: Vec<Value>,
    param_index: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
        }
    }

    /// Returns the predicate and its parameters. Placeholders start at
    /// `starting_param_index + 1`.
    pub fn generate(where_data: &Value, starting_param_index: usize) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = Self::new(starting_param_index);
        let clause = filter_where.build(where_data)?;
        Ok((clause, filter_where.param_values))
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn build(&mut self, where_data: &Value) -> Result<String, FilterError> {
        let obj = match where_data {
            Value::Null => return Ok("1=1".to_string()),
            Value::Object(obj) => obj,
            _ => return Err(FilterError::InvalidWhereClause("Unsupported WHERE format".to_string())),
        };

        let mut conditions = vec![];
        for (key, value) in obj {
            if key.starts_with('$') {
                conditions.push(self.parse_logical_operator(key, value)?);
            } else {
                conditions.extend(self.parse_field_condition(key, value)?);
            }
        }

        if conditions.is_empty() {
            Ok("1=1".to_string())
        } else {
            Ok(conditions.join(" AND "))
        }
    }

    fn parse_logical_operator(&mut self, op: &str, value: &Value) -> Result<String, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                if arr.is_empty() {
                    return Ok(if op == "$and" { "1=1" } else { "1=0" }.to_string());
                }
                let mut sql_parts = Vec::with_capacity(arr.len());
                for v in arr {
                    sql_parts.push(format!("({})", self.build(v)?));
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                Ok(format!("({})", sql_parts.join(joiner)))
            }
            "$not" => Ok(format!("NOT ({})", self.build(value)?)),
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(&mut self, field: &str, value: &Value) -> Result<Vec<String>, FilterError> {
        validate_identifier(field)?;

        match value {
            Value::Object(obj) if is_operator_object(obj) => {
                let mut out = Vec::with_capacity(obj.len());
                for (op_key, op_val) in obj {
                    let operator = FilterOp::parse(op_key)
                        .ok_or_else(|| FilterError::UnsupportedOperator(op_key.to_string()))?;
                    out.push(self.build_sql_condition(field, operator, op_val)?);
                }
                Ok(out)
            }
            // Implicit equality: { field: value }
            _ => Ok(vec![self.build_sql_condition(field, FilterOp::Eq, value)?]),
        }
    }

    fn build_sql_condition(&mut self, column: &str, operator: FilterOp, data: &Value) -> Result<String, FilterError> {
        let quoted = format!("\"{}\"", column);
        let sql = match operator {
            FilterOp::Eq => {
                if data.is_null() {
                    format!("{} IS NULL", quoted)
                } else {
                    let placeholder = self.param(data.clone());
                    format!("{} = {}", column_for(&quoted, data), placeholder)
                }
            }
            FilterOp::Ne => {
                if data.is_null() {
                    format!("{} IS NOT NULL", quoted)
                } else {
                    let placeholder = self.param(data.clone());
                    format!("{} <> {}", column_for(&quoted, data), placeholder)
                }
            }
            FilterOp::Gt => self.comparison(&quoted, ">", data),
            FilterOp::Gte => self.comparison(&quoted, ">=", data),
            FilterOp::Lt => self.comparison(&quoted, "<", data),
            FilterOp::Lte => self.comparison(&quoted, "<=", data),
            FilterOp::Like => {
                let placeholder = self.param(data.clone());
                format!("{}::text LIKE {}", quoted, placeholder)
            }
            FilterOp::ILike => {
                let placeholder = self.param(data.clone());
                format!("{}::text ILIKE {}", quoted, placeholder)
            }
            FilterOp::In | FilterOp::NIn => {
                let values = data
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData("$in/$nin requires an array".to_string()))?;
                if values.is_empty() {
                    return Ok(if operator == FilterOp::In { "1=0" } else { "1=1" }.to_string());
                }
                let column = column_for(&quoted, &values[0]);
                let params: Vec<String> = values.iter().map(|v| self.param(v.clone())).collect();
                let keyword = if operator == FilterOp::In { "IN" } else { "NOT IN" };
                format!("{} {} ({})", column, keyword, params.join(", "))
            }
            FilterOp::Between => {
                let values = data
                    .as_array()
                    .filter(|v| v.len() == 2)
                    .ok_or_else(|| FilterError::InvalidOperatorData("$between requires exactly 2 values".to_string()))?;
                let column = column_for(&quoted, &values[0]);
                let low = self.param(values[0].clone());
                let high = self.param(values[1].clone());
                format!("{} BETWEEN {} AND {}", column, low, high)
            }
        };
        Ok(sql)
    }

    fn comparison(&mut self, quoted: &str, op: &str, data: &Value) -> String {
        let placeholder = self.param(data.clone());
        format!("{} {} {}", column_for(quoted, data), op, placeholder)
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

fn is_operator_object(obj: &Map<String, Value>) -> bool {
    !obj.is_empty() && obj.keys().all(|k| k.starts_with('$'))
}

fn column_for(quoted: &str, data: &Value) -> String {
    if data.is_string() {
        format!("{}::text", quoted)
    } else {
        quoted.to_string()
    }
}
