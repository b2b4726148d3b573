use thiserror::Error;

/// Structural problems in a filter document. Fields with disallowed names are
/// not errors; they are dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Filter group `{0}` must be an object")]
    InvalidGroup(String),

    #[error("Condition for `{0}` must be an object")]
    InvalidCondition(String),

    #[error("Condition for `{0}` has no operator")]
    MissingOperator(String),

    #[error("Unknown operator `{operator}` for `{field}`")]
    UnknownOperator { field: String, operator: String },

    #[error("Unsupported value for `{0}`: arrays and objects cannot be bound")]
    UnsupportedValue(String),

    #[error("Filter nesting exceeds {0} levels")]
    TooDeep(usize),
}
