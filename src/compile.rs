use crate::aggregate::{grouping_fields, plan_aggregations, AggregationManifest};
use crate::calc::{cross_form_accessor, rewrite, RewriteScope};
use crate::config::EngineConfig;
use crate::error::ConfigError;
use crate::plan::{
    CalculationPlan, ExecMode, FilterPlan, GroupingKey, PlanManifest, QueryPlan, SortKey,
};
use crate::resolve::{FieldResolver, FormFields};
use crate::types::{Aggregation, ReportConfig, SelectedField};
use crate::value::Scalar;
use std::time::Instant;

/// Inputs of one planning pass.
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub config: &'a ReportConfig,
    /// Active participating forms with their full field catalogs.
    pub forms: &'a [FormFields],
    /// Site the requester is restricted to, if any.
    pub site_filter: Option<&'a str>,
}

pub trait ReportPlanner {
    fn compile(&self, req: &PlanRequest<'_>) -> Result<(QueryPlan, PlanManifest), ConfigError>;
}

#[derive(Debug, Clone, Default)]
pub struct SimplePlanner {
    options: EngineConfig,
}

impl SimplePlanner {
    pub fn new(options: EngineConfig) -> Self {
        Self { options }
    }
}

impl ReportPlanner for SimplePlanner {
    fn compile(&self, req: &PlanRequest<'_>) -> Result<(QueryPlan, PlanManifest), ConfigError> {
        let config = req.config;
        if config.selected_fields.is_empty()
            && config.aggregations.is_empty()
            && config.calculations.is_empty()
        {
            return Err(ConfigError::NoFieldsSelected);
        }
        let started_at = Instant::now();

        let in_scope = |form_id: &str| req.forms.iter().any(|f| f.form_id == form_id);
        let selected: Vec<SelectedField> = config
            .selected_fields
            .iter()
            .filter(|f| in_scope(f.form_id.as_str()))
            .cloned()
            .collect();
        let aggregations: Vec<Aggregation> = config
            .aggregations
            .iter()
            .filter(|a| in_scope(a.form_id.as_str()))
            .cloned()
            .collect();

        let mut resolver = FieldResolver::new(req.forms);
        validate_selected_fields(&selected, &resolver)?;

        let agg_plan = plan_aggregations(&aggregations, &resolver, &self.options)?;
        let mode = ExecMode::select(
            !agg_plan.descriptors.is_empty(),
            !config.calculations.is_empty(),
        );

        let grouping = build_grouping(&selected, &aggregations, &mut resolver)?;
        let mut columns: Vec<String> = grouping.iter().map(|g| g.column.clone()).collect();
        columns.extend(agg_plan.descriptors.iter().map(|d| d.column.clone()));

        let calculations = {
            let scope = RewriteScope {
                mode,
                manifest: &agg_plan.manifest,
                grouping: &grouping,
                policy: self.options.unresolved_reference,
            };
            let mut out = Vec::with_capacity(config.calculations.len());
            for calc in &config.calculations {
                let column = calc.name.trim();
                let clash = if column.is_empty() {
                    Some("calculation has no name".to_string())
                } else if columns.iter().any(|c| c == column) {
                    Some(format!("calculation name collides with column `{column}`"))
                } else {
                    None
                };
                if let Some(reason) = clash {
                    return Err(ConfigError::ExpressionSyntax {
                        expr: calc.expression.clone(),
                        reason,
                    });
                }
                out.push(CalculationPlan {
                    column: column.to_string(),
                    source: calc.expression.clone(),
                    expr: rewrite(column, &calc.expression, &scope, &mut resolver)?,
                });
                columns.push(column.to_string());
            }
            out
        };
        let filters = build_filters(config, req.forms, &mut resolver)?;

        if columns.is_empty() {
            return Err(ConfigError::NoFieldsSelected);
        }

        let mut sort = Vec::with_capacity(config.sort_orders.len());
        let mut ignored_sort_count = 0;
        for order in &config.sort_orders {
            match sort_column(&order.field, &columns, &selected, &agg_plan.manifest) {
                Some(column) => sort.push(SortKey {
                    column,
                    direction: order.direction,
                }),
                None => ignored_sort_count += 1,
            }
        }

        let plan = QueryPlan {
            mode,
            form_ids: req.forms.iter().map(|f| f.form_id.clone()).collect(),
            site_filter: req.site_filter.map(str::to_string),
            filters,
            grouping,
            aggregates: agg_plan.descriptors,
            calculations,
            sort,
            columns,
        };
        let manifest = PlanManifest {
            mode,
            form_count: plan.form_ids.len(),
            grouping_count: plan.grouping.len(),
            aggregate_count: plan.aggregates.len(),
            calculation_count: plan.calculations.len(),
            filter_count: plan.filters.len(),
            alias_count: agg_plan.alias_count,
            ignored_sort_count,
            compile_time_us: started_at.elapsed().as_micros() as u64,
        };
        Ok((plan, manifest))
    }
}

/// Field ids must exist in the catalog before they are used as storage keys.
fn validate_selected_fields(
    selected: &[SelectedField],
    resolver: &FieldResolver<'_>,
) -> Result<(), ConfigError> {
    for field in selected {
        let known = resolver
            .form(&field.form_id)
            .and_then(|form| form.field_by_id(&field.field_id))
            .is_some();
        if !known {
            return Err(ConfigError::InvalidIdentifier {
                form_id: field.form_id.clone(),
                field_id: field.field_id.clone(),
            });
        }
    }
    Ok(())
}

/// One key per distinct display name: same-named fields of different forms
/// merge into a single column.
fn build_grouping(
    selected: &[SelectedField],
    aggregations: &[Aggregation],
    resolver: &mut FieldResolver<'_>,
) -> Result<Vec<GroupingKey>, ConfigError> {
    let mut grouping: Vec<GroupingKey> = Vec::new();
    for field in grouping_fields(selected, aggregations) {
        let column = display_name(field, resolver);
        if let Some(existing) = grouping.iter_mut().find(|g| g.column == column) {
            if !existing.accessor.keys.contains(&field.field_id) {
                let mut keys = existing.accessor.keys.to_vec();
                keys.push(field.field_id.clone());
                existing.accessor.keys = keys.into();
            }
            continue;
        }
        let accessor = cross_form_accessor(resolver, &column, Some(&field.field_id))?;
        grouping.push(GroupingKey { column, accessor });
    }
    Ok(grouping)
}

fn display_name(field: &SelectedField, resolver: &FieldResolver<'_>) -> String {
    if !field.field_name.trim().is_empty() {
        return field.field_name.trim().to_string();
    }
    resolver
        .form(&field.form_id)
        .and_then(|form| form.field_by_id(&field.field_id))
        .map_or_else(|| field.field_id.clone(), |f| f.name.clone())
}

fn build_filters(
    config: &ReportConfig,
    forms: &[FormFields],
    resolver: &mut FieldResolver<'_>,
) -> Result<Vec<FilterPlan>, ConfigError> {
    let mut filters = Vec::with_capacity(config.filters.len());
    for filter in &config.filters {
        let hit = resolver
            .lookup(&filter.field)
            .ok_or_else(|| ConfigError::UnknownFieldReference {
                reference: filter.field.clone(),
            })?;
        let name = hit.field.name.clone();
        let id = hit.field.id.clone();
        let accessor = cross_form_accessor(resolver, &name, Some(&id))?;
        let defining = forms
            .iter()
            .filter(|form| form.field_by_name(&name).is_some() || form.field_by_id(&id).is_some())
            .map(|form| form.form_id.clone())
            .collect();
        filters.push(FilterPlan {
            operand: Scalar::from_json(&filter.value)
                .unwrap_or(Scalar::Missing)
                .typed(accessor.value_type),
            accessor,
            forms: defining,
            op: filter.operator,
        });
    }
    Ok(filters)
}

/// Sort orders may name an output column, a selected field id or an
/// aggregated field id.
fn sort_column(
    field: &str,
    columns: &[String],
    selected: &[SelectedField],
    manifest: &AggregationManifest,
) -> Option<String> {
    if columns.iter().any(|c| c == field) {
        return Some(field.to_string());
    }
    if let Some(column) = manifest.column_for(field) {
        return Some(column.to_string());
    }
    selected
        .iter()
        .find(|f| f.field_id == field)
        .map(|f| f.field_name.trim().to_string())
        .filter(|name| columns.contains(name))
}
