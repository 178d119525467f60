use crate::value::Scalar;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

pub type FormId = String;
pub type FieldId = String;
pub type UserId = String;
pub type SiteId = String;
pub type ReportId = String;

/// One output row: column name -> value.
pub type ResultRow = BTreeMap<String, Scalar>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueType {
    Text,
    Number,
    Date,
    #[serde(alias = "textarea", alias = "long_text")]
    LongText,
    #[serde(alias = "calculated", alias = "formula")]
    Derived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    pub value_type: ValueType,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Formula over other field display names of the same form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivation_expression: Option<String>,
}

impl Field {
    pub fn new(id: impl Into<String>, name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value_type,
            active: true,
            derivation_expression: None,
        }
    }

    pub fn derived(id: impl Into<String>, name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            derivation_expression: Some(expr.into()),
            ..Self::new(id, name, ValueType::Derived)
        }
    }

    pub fn archived(mut self) -> Self {
        self.active = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    pub id: FormId,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Form {
    pub fn new(id: impl Into<String>, name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            active: true,
            archived: false,
            fields,
        }
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.active && !self.archived
    }
}

/// A batch submission: one user action storing several row-objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub form_id: FormId,
    pub site_id: SiteId,
    pub user_id: UserId,
    /// Row-objects as submitted; keys are field ids or (legacy) display names.
    #[serde(default)]
    pub batch_rows: Vec<JsonValue>,
    /// Field list as it existed at submission time.
    #[serde(default)]
    pub field_snapshot: Vec<Field>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFunc {
    #[serde(alias = "sum")]
    Sum,
    #[serde(alias = "avg")]
    Avg,
    #[serde(alias = "count")]
    Count,
    #[serde(alias = "max")]
    Max,
    #[serde(alias = "min")]
    Min,
}

impl AggregateFunc {
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Count => "count",
            Self::Max => "max",
            Self::Min => "min",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedField {
    pub form_id: FormId,
    pub field_id: FieldId,
    pub field_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    pub form_id: FormId,
    pub field_id: FieldId,
    pub field_name: String,
    pub function: AggregateFunc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calculation {
    pub name: String,
    pub expression: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    #[serde(alias = "=", alias = "==")]
    Eq,
    #[serde(alias = "!=")]
    Ne,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Gte,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Lte,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportFilter {
    /// Field id or display name.
    pub field: String,
    pub operator: FilterOp,
    pub value: JsonValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ASC", alias = "ascending")]
    Asc,
    #[serde(alias = "DESC", alias = "descending")]
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    /// Output column name, selected field id, or aggregated field id.
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Persisted report definition; exchanged as-is with the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportConfig {
    pub selected_forms: Vec<FormId>,
    pub selected_fields: Vec<SelectedField>,
    pub aggregations: Vec<Aggregation>,
    pub calculations: Vec<Calculation>,
    pub filters: Vec<ReportFilter>,
    pub sort_orders: Vec<SortOrder>,
    /// Stored as-is; see [`crate::access::normalize_access_rules`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_rules: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: ReportId,
    pub name: String,
    pub creator_id: UserId,
    #[serde(default)]
    pub config: ReportConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequesterContext {
    pub user_id: UserId,
    pub role: String,
    /// Set when the requester may only see one site's records.
    #[serde(default)]
    pub site_id: Option<SiteId>,
}

impl RequesterContext {
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: role.into(),
            site_id: None,
        }
    }

    pub fn at_site(mut self, site_id: impl Into<String>) -> Self {
        self.site_id = Some(site_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportOutput {
    pub report: Report,
    pub columns: Vec<String>,
    pub data: Vec<ResultRow>,
    pub total: usize,
}

fn default_true() -> bool {
    true
}
