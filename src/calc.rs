//! Rewrites calculation and field formulas into value-accessor expressions.
//!
//! A reference is resolved against the aggregation manifest first (the
//! calculation then reads the materialized aggregate column), then against the
//! field catalog (raw row value, or the grouping column in grouped modes).
//! Every reference reads NULL as 0.

use crate::aggregate::AggregationManifest;
use crate::compile_expr::{parse_expression, ExprAst};
use crate::config::UnresolvedReferencePolicy;
use crate::error::{ConfigError, ExecError};
use crate::plan::{CalcExpr, ExecMode, FieldAccessor, GroupingKey};
use crate::resolve::{FieldResolver, FormFields};
use crate::types::{Field, ValueType};

pub struct RewriteScope<'a> {
    pub mode: ExecMode,
    pub manifest: &'a AggregationManifest,
    pub grouping: &'a [GroupingKey],
    pub policy: UnresolvedReferencePolicy,
}

pub fn rewrite(
    calculation: &str,
    expression: &str,
    scope: &RewriteScope<'_>,
    resolver: &mut FieldResolver<'_>,
) -> Result<CalcExpr, ConfigError> {
    let ast = parse_expression(expression)?;
    lower(&ast, &mut |token| {
        lower_reference(calculation, token, scope, resolver)
    })
}

fn lower_reference(
    calculation: &str,
    token: &str,
    scope: &RewriteScope<'_>,
    resolver: &mut FieldResolver<'_>,
) -> Result<CalcExpr, ConfigError> {
    if scope.mode.is_grouped() {
        if let Some(column) = scope.manifest.column_for(token) {
            return Ok(CalcExpr::Aggregate(column.to_string()));
        }
        if let Some(key) = find_grouping(scope.grouping, token) {
            return Ok(CalcExpr::Grouping(key.column.clone()));
        }
        if let Some(hit) = resolver.lookup(token) {
            return match find_grouping(scope.grouping, &hit.field.name) {
                Some(key) => Ok(CalcExpr::Grouping(key.column.clone())),
                None => Err(ConfigError::UngroupedFieldReference {
                    calculation: calculation.to_string(),
                    field: token.to_string(),
                }),
            };
        }
    } else {
        if let Some(key) = find_grouping(scope.grouping, token) {
            return Ok(CalcExpr::Raw(Box::new(key.accessor.clone())));
        }
        if let Some(hit) = resolver.lookup(token) {
            let name = hit.field.name.clone();
            let id = hit.field.id.clone();
            let accessor = cross_form_accessor(resolver, &name, Some(&id))?;
            return Ok(CalcExpr::Raw(Box::new(accessor)));
        }
    }
    match scope.policy {
        UnresolvedReferencePolicy::Reject => Err(ConfigError::UnknownFieldReference {
            reference: token.to_string(),
        }),
        UnresolvedReferencePolicy::Zero => {
            tracing::debug!(calculation, token, "unresolved calculation token reads as 0");
            Ok(CalcExpr::Number(0.0))
        }
    }
}

fn find_grouping<'g>(grouping: &'g [GroupingKey], token: &str) -> Option<&'g GroupingKey> {
    grouping.iter().find(|g| g.column == token)
}

fn lower(
    ast: &ExprAst,
    resolve_ident: &mut dyn FnMut(&str) -> Result<CalcExpr, ConfigError>,
) -> Result<CalcExpr, ConfigError> {
    Ok(match ast {
        ExprAst::Identifier(name) => resolve_ident(name)?,
        ExprAst::Number(value) => CalcExpr::Number(*value),
        ExprAst::Neg(expr) => CalcExpr::Neg(Box::new(lower(expr, resolve_ident)?)),
        ExprAst::Binary { op, lhs, rhs } => CalcExpr::Binary {
            op: *op,
            lhs: Box::new(lower(lhs, resolve_ident)?),
            rhs: Box::new(lower(rhs, resolve_ident)?),
        },
    })
}

/// Accessor merging every same-named field across the participating forms.
pub fn cross_form_accessor(
    resolver: &mut FieldResolver<'_>,
    field_name: &str,
    declared_id: Option<&str>,
) -> Result<FieldAccessor, ConfigError> {
    let mut keys = resolver.resolve(field_name).to_vec();
    if let Some(id) = declared_id {
        if !keys.iter().any(|k| k == id) {
            keys.push(id.to_string());
        }
    }
    let forms = resolver.forms();
    let value_type = forms
        .iter()
        .find_map(|form| form.field_by_name(field_name))
        .map_or(ValueType::Text, |f| f.value_type);
    let mut derivations = Vec::new();
    for form in forms {
        if let Some(field) = form.field_by_name(field_name) {
            if let Some(expr) = derivation(form, field, &mut Vec::new())? {
                derivations.push((form.form_id.clone(), expr));
            }
        }
    }
    Ok(FieldAccessor {
        keys: keys.into(),
        value_type,
        derivations,
    })
}

/// Accessor restricted to one form, used by aggregation scoping.
pub fn scoped_accessor(
    resolver: &FieldResolver<'_>,
    form: &FormFields,
    field: &Field,
) -> Result<FieldAccessor, ConfigError> {
    scoped_accessor_inner(resolver, form, field, &mut Vec::new())
}

fn scoped_accessor_inner(
    resolver: &FieldResolver<'_>,
    form: &FormFields,
    field: &Field,
    visiting: &mut Vec<String>,
) -> Result<FieldAccessor, ConfigError> {
    let keys = resolver.resolve_in_form(&form.form_id, &field.id, &field.name);
    let mut accessor = FieldAccessor::plain(keys, field.value_type);
    if let Some(expr) = derivation_with(resolver, form, field, visiting)? {
        accessor.derivations.push((form.form_id.clone(), expr));
    }
    Ok(accessor)
}

fn derivation(
    form: &FormFields,
    field: &Field,
    visiting: &mut Vec<String>,
) -> Result<Option<CalcExpr>, ConfigError> {
    let forms = std::slice::from_ref(form);
    let resolver = FieldResolver::new(forms);
    derivation_with(&resolver, form, field, visiting)
}

/// Lowers a derived field's formula; its references are display names (or
/// ids) of fields of the same form.
fn derivation_with(
    resolver: &FieldResolver<'_>,
    form: &FormFields,
    field: &Field,
    visiting: &mut Vec<String>,
) -> Result<Option<CalcExpr>, ConfigError> {
    if field.value_type != ValueType::Derived {
        return Ok(None);
    }
    let Some(source) = field.derivation_expression.as_deref() else {
        return Ok(None);
    };
    if visiting.contains(&field.id) {
        return Err(ConfigError::ExpressionSyntax {
            expr: source.to_string(),
            reason: format!("circular reference through `{}`", field.name),
        });
    }
    visiting.push(field.id.clone());
    let ast = parse_expression(source)?;
    let lowered = lower(&ast, &mut |token| {
        let target = form
            .field_by_name(token)
            .or_else(|| form.field_by_id(token))
            .ok_or_else(|| ConfigError::UnknownFieldReference {
                reference: token.to_string(),
            })?;
        let accessor = scoped_accessor_inner(resolver, form, target, visiting)?;
        Ok(CalcExpr::Raw(Box::new(accessor)))
    });
    visiting.pop();
    lowered.map(Some)
}

/// Values a calculation can read.
pub trait CalcInput {
    fn aggregate(&self, column: &str) -> Option<f64>;
    fn grouping(&self, column: &str) -> Option<f64>;
    fn raw(&self, accessor: &FieldAccessor) -> Result<Option<f64>, ExecError>;
}

/// `Ok(None)` means the result is null (division by zero or overflow).
pub fn evaluate<I: CalcInput + ?Sized>(expr: &CalcExpr, input: &I) -> Result<Option<f64>, ExecError> {
    Ok(match expr {
        CalcExpr::Number(value) => Some(*value),
        CalcExpr::Aggregate(column) => Some(input.aggregate(column).unwrap_or(0.0)),
        CalcExpr::Grouping(column) => Some(input.grouping(column).unwrap_or(0.0)),
        CalcExpr::Raw(accessor) => Some(input.raw(accessor)?.unwrap_or(0.0)),
        CalcExpr::Neg(inner) => evaluate(inner, input)?.map(|v| -v),
        CalcExpr::Binary { op, lhs, rhs } => {
            match (evaluate(lhs, input)?, evaluate(rhs, input)?) {
                (Some(l), Some(r)) => op.apply(l, r),
                _ => None,
            }
        }
    })
}
