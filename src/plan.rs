use crate::compile_expr::BinaryOp;
use crate::types::{AggregateFunc, FilterOp, FormId, SiteId, SortDirection, ValueType};
use crate::value::Scalar;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// One output row per row-object, projecting display columns.
    Raw,
    /// Group, then compute aggregate columns.
    Aggregate,
    /// Materialize the `Aggregate` result, then evaluate calculations over it.
    ///
    /// A calculation may reference an aggregate, which only exists once the
    /// grouping pass has finished.
    AggregateThenCalculate,
}

impl ExecMode {
    #[inline]
    pub const fn select(has_aggregations: bool, has_calculations: bool) -> Self {
        match (has_aggregations, has_calculations) {
            (false, _) => Self::Raw,
            (true, false) => Self::Aggregate,
            (true, true) => Self::AggregateThenCalculate,
        }
    }

    #[inline]
    pub const fn is_grouped(self) -> bool {
        !matches!(self, Self::Raw)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Aggregate => "aggregate",
            Self::AggregateThenCalculate => "aggregate_then_calculate",
        }
    }
}

/// How to read one logical field out of a row-object.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldAccessor {
    /// Candidate storage keys, first non-blank match wins.
    pub keys: Arc<[String]>,
    pub value_type: ValueType,
    /// Per-form formula used when a derived field has no stored value.
    pub derivations: Vec<(FormId, CalcExpr)>,
}

impl FieldAccessor {
    pub fn plain(keys: impl Into<Arc<[String]>>, value_type: ValueType) -> Self {
        Self {
            keys: keys.into(),
            value_type,
            derivations: Vec::new(),
        }
    }

    pub fn derivation_for(&self, form_id: &str) -> Option<&CalcExpr> {
        self.derivations
            .iter()
            .find(|(id, _)| id == form_id)
            .map(|(_, expr)| expr)
    }
}

/// Value-accessor form of a calculation or field formula.
#[derive(Debug, Clone, PartialEq)]
pub enum CalcExpr {
    Number(f64),
    /// Materialized aggregate column, null reads as 0.
    Aggregate(String),
    /// Grouping column of the materialized set, null reads as 0.
    Grouping(String),
    /// Raw row value, null reads as 0.
    Raw(Box<FieldAccessor>),
    Neg(Box<CalcExpr>),
    Binary {
        op: BinaryOp,
        lhs: Box<CalcExpr>,
        rhs: Box<CalcExpr>,
    },
}

impl CalcExpr {
    #[cfg(test)]
    pub(crate) fn references_aggregate(&self) -> bool {
        match self {
            Self::Aggregate(_) => true,
            Self::Number(_) | Self::Grouping(_) | Self::Raw(_) => false,
            Self::Neg(expr) => expr.references_aggregate(),
            Self::Binary { lhs, rhs, .. } => lhs.references_aggregate() || rhs.references_aggregate(),
        }
    }
}

/// Display column; the grouping key in grouped modes.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupingKey {
    pub column: String,
    pub accessor: FieldAccessor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateDescriptor {
    pub column: String,
    /// Only rows submitted against this form contribute.
    pub form_id: FormId,
    pub field_id: String,
    pub field_name: String,
    pub func: AggregateFunc,
    pub accessor: FieldAccessor,
    /// SUM over a headcount-like field is rounded after summation.
    pub round_to_integer: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalculationPlan {
    pub column: String,
    pub source: String,
    pub expr: CalcExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterPlan {
    pub accessor: FieldAccessor,
    /// Forms defining the filtered field; rows of other forms pass through.
    pub forms: Vec<FormId>,
    pub op: FilterOp,
    pub operand: Scalar,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub mode: ExecMode,
    /// Active participating forms, in selection order.
    pub form_ids: Vec<FormId>,
    /// Applied before any grouping.
    pub site_filter: Option<SiteId>,
    pub filters: Vec<FilterPlan>,
    pub grouping: Vec<GroupingKey>,
    pub aggregates: Vec<AggregateDescriptor>,
    pub calculations: Vec<CalculationPlan>,
    pub sort: Vec<SortKey>,
    /// Output columns: grouping, then aggregates, then calculations.
    pub columns: Vec<String>,
}

impl QueryPlan {
    pub fn grouping_columns(&self) -> Vec<&str> {
        self.grouping.iter().map(|g| g.column.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanManifest {
    pub mode: ExecMode,
    pub form_count: usize,
    pub grouping_count: usize,
    pub aggregate_count: usize,
    pub calculation_count: usize,
    pub filter_count: usize,
    /// Aggregations that duplicated an earlier (form, field, function).
    pub alias_count: usize,
    /// Sort orders naming no output column.
    pub ignored_sort_count: usize,
    pub compile_time_us: u64,
}

impl PlanManifest {
    #[inline]
    pub fn summary_line(&self) -> String {
        format!(
            "mode={} forms={} grouping={} aggregates={} calculations={} filters={} aliases={} ignored_sorts={} compile_us={}",
            self.mode.as_str(),
            self.form_count,
            self.grouping_count,
            self.aggregate_count,
            self.calculation_count,
            self.filter_count,
            self.alias_count,
            self.ignored_sort_count,
            self.compile_time_us
        )
    }
}
