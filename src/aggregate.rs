//! Splits selected fields into grouping keys and aggregation targets, and
//! builds form-scoped aggregation descriptors.

use crate::calc::scoped_accessor;
use crate::config::EngineConfig;
use crate::error::ConfigError;
use crate::plan::AggregateDescriptor;
use crate::resolve::FieldResolver;
use crate::types::{AggregateFunc, Aggregation, SelectedField};
use crate::value::Scalar;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Aggregated field (by id and by display name) -> generated column.
/// The first aggregation declared for a field wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationManifest {
    by_field_id: BTreeMap<String, String>,
    by_field_name: BTreeMap<String, String>,
}

impl AggregationManifest {
    pub fn insert(&mut self, field_id: &str, field_name: &str, column: &str) {
        self.by_field_id
            .entry(field_id.to_string())
            .or_insert_with(|| column.to_string());
        self.by_field_name
            .entry(field_name.to_string())
            .or_insert_with(|| column.to_string());
    }

    pub fn column_for(&self, reference: &str) -> Option<&str> {
        self.by_field_id
            .get(reference)
            .or_else(|| self.by_field_name.get(reference))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationPlan {
    pub descriptors: Vec<AggregateDescriptor>,
    pub manifest: AggregationManifest,
    pub alias_count: usize,
}

/// Selected fields that are not the target of any aggregation, in order.
pub fn grouping_fields<'s>(
    selected: &'s [SelectedField],
    aggregations: &[Aggregation],
) -> Vec<&'s SelectedField> {
    let aggregated: BTreeSet<&str> = aggregations.iter().map(|a| a.field_id.as_str()).collect();
    selected
        .iter()
        .filter(|f| !aggregated.contains(f.field_id.as_str()))
        .collect()
}

pub fn plan_aggregations(
    aggregations: &[Aggregation],
    resolver: &FieldResolver<'_>,
    config: &EngineConfig,
) -> Result<AggregationPlan, ConfigError> {
    let mut descriptors: Vec<AggregateDescriptor> = Vec::with_capacity(aggregations.len());
    let mut manifest = AggregationManifest::default();
    let mut seen: HashSet<(&str, &str, AggregateFunc)> = HashSet::new();
    let mut used_columns: BTreeSet<String> = BTreeSet::new();
    let mut alias_count = 0;

    for agg in aggregations {
        let key = (agg.form_id.as_str(), agg.field_id.as_str(), agg.function);
        if !seen.insert(key) {
            alias_count += 1;
            continue;
        }
        let invalid = || ConfigError::InvalidIdentifier {
            form_id: agg.form_id.clone(),
            field_id: agg.field_id.clone(),
        };
        let form = resolver.form(&agg.form_id).ok_or_else(invalid)?;
        let field = form.field_by_id(&agg.field_id).ok_or_else(invalid)?;
        let field_name = if agg.field_name.is_empty() {
            field.name.as_str()
        } else {
            agg.field_name.as_str()
        };

        let column = unique_column(
            &mut used_columns,
            format!("{}_{}", field_name, agg.function.suffix()),
        );
        manifest.insert(&agg.field_id, field_name, &column);
        descriptors.push(AggregateDescriptor {
            column,
            form_id: agg.form_id.clone(),
            field_id: agg.field_id.clone(),
            field_name: field_name.to_string(),
            func: agg.function,
            accessor: scoped_accessor(resolver, form, field)?,
            round_to_integer: agg.function == AggregateFunc::Sum
                && config.is_integer_quantity(field_name),
        });
    }

    Ok(AggregationPlan {
        descriptors,
        manifest,
        alias_count,
    })
}

fn unique_column(used: &mut BTreeSet<String>, base: String) -> String {
    let mut column = base.clone();
    let mut suffix = 2;
    while used.contains(&column) {
        column = format!("{base}_{suffix}");
        suffix += 1;
    }
    used.insert(column.clone());
    column
}

/// Running state of one aggregate within one group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accumulator {
    func: AggregateFunc,
    sum: f64,
    count: u64,
    min: f64,
    max: f64,
}

impl Accumulator {
    pub fn new(func: AggregateFunc) -> Self {
        Self {
            func,
            sum: 0.0,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// COUNT counts present values; the numeric functions skip values that
    /// do not coerce to a number.
    pub fn push(&mut self, value: &Scalar) {
        if self.func == AggregateFunc::Count {
            if !value.is_blank() {
                self.count += 1;
            }
            return;
        }
        let Some(n) = value.as_number() else {
            return;
        };
        self.sum += n;
        self.count += 1;
        self.min = self.min.min(n);
        self.max = self.max.max(n);
    }

    /// Groups without contributing rows yield 0.
    pub fn finish(&self, round_to_integer: bool) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        match self.func {
            AggregateFunc::Sum if round_to_integer => self.sum.round(),
            AggregateFunc::Sum => self.sum,
            AggregateFunc::Avg => self.sum / self.count as f64,
            AggregateFunc::Count => self.count as f64,
            AggregateFunc::Max => self.max,
            AggregateFunc::Min => self.min,
        }
    }
}
