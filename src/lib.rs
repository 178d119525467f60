pub mod access;
pub mod aggregate;
pub mod calc;
pub mod compile;
mod compile_expr;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod obs;
pub mod plan;
pub mod postprocess;
pub mod resolve;
pub mod runtime;
pub mod store;
pub mod types;
pub mod value;

pub use access::{can_access_report, normalize_access_rules, AccessPolicy, AccessRules};
pub use compile::{PlanRequest, ReportPlanner, SimplePlanner};
pub use compile_expr::{parse_expression, BinaryOp, ExprAst};
pub use config::{EngineConfig, UnresolvedReferencePolicy};
pub use diagnostics::{translate, Diagnostic, ErrorKind};
pub use error::{ConfigError, ConfigLoadError, ExecError, ReportError, StoreError};
pub use obs::{ExecutionObserver, NoopObserver, Stage, TracingObserver};
pub use runtime::{Engine, ReportEngine};
pub use store::{FormCatalog, MemoryStore, RecordStore, ReportStore};
pub use types::{
    AggregateFunc, Aggregation, Calculation, Field, FilterOp, Form, Record, Report, ReportConfig,
    ReportFilter, ReportOutput, RequesterContext, ResultRow, SelectedField, SortDirection,
    SortOrder, ValueType,
};
pub use value::Scalar;

#[cfg(test)]
mod tests;
