use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("report selects no display, aggregation or calculation fields")]
    NoFieldsSelected,
    #[error("unknown field reference `{reference}`")]
    UnknownFieldReference { reference: String },
    #[error("invalid expression `{expr}`: {reason}")]
    ExpressionSyntax { expr: String, reason: String },
    #[error("calculation `{calculation}` references `{field}`, which is neither grouped nor aggregated")]
    UngroupedFieldReference { calculation: String, field: String },
    #[error("field `{field_id}` does not exist in form `{form_id}`")]
    InvalidIdentifier { form_id: String, field_id: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("grouping key mismatch: {0}")]
    GroupingMismatch(String),
    #[error("numeric coercion failed: {0}")]
    NumericCoercion(String),
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("malformed value path: {0}")]
    MalformedValuePath(String),
    #[error("expression syntax error: {0}")]
    ExpressionSyntax(String),
    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ExecError {
    #[error("record `{record_id}` row {row_index}: {reason}")]
    MalformedValuePath {
        record_id: String,
        row_index: usize,
        reason: String,
    },
    #[error("aggregate column `{column}` overflowed to a non-finite value")]
    NumericOverflow { column: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error, PartialEq)]
pub enum ReportError {
    #[error("report `{report_id}` not found")]
    ReportNotFound { report_id: String },
    #[error("user `{user_id}` may not access report `{report_id}`")]
    AccessDenied { report_id: String, user_id: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Execution(#[from] ExecError),
}

impl From<StoreError> for ReportError {
    fn from(err: StoreError) -> Self {
        Self::Execution(ExecError::Store(err))
    }
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("invalid engine config: {0}")]
    Parse(#[from] toml::de::Error),
}
