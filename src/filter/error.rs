use thiserror::Error;

/// Rejections raised while turning a where/order/limit request into SQL or
/// evaluating it in memory. Surfaced to callers as `StoreError::InvalidQuery`.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid table: {0}")]
    InvalidTable(String),

    #[error("Invalid column: {0}")]
    InvalidColumn(String),

    #[error("Invalid where clause: {0}")]
    InvalidWhereClause(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Invalid operand: {0}")]
    InvalidOperatorData(String),

    #[error("Invalid paging: {0}")]
    InvalidPaging(String),
}
