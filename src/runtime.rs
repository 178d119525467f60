use crate::aggregate::Accumulator;
use crate::calc::{evaluate, CalcInput};
use crate::compile::{PlanRequest, ReportPlanner, SimplePlanner};
use crate::config::EngineConfig;
use crate::diagnostics::{translate, Diagnostic};
use crate::error::{ExecError, ReportError, StoreError};
use crate::obs::{ExecutionObserver, Stage, TracingObserver};
use crate::plan::{ExecMode, FieldAccessor, FilterPlan, QueryPlan};
use crate::postprocess::{filter_total_rows, sort_rows};
use crate::resolve::{probe, unresolved_keys, FormFields, RowObject};
use crate::store::{FormCatalog, RecordStore, ReportStore};
use crate::types::{FilterOp, FormId, Record, Report, ReportOutput, RequesterContext, ResultRow};
use crate::value::Scalar;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub trait Engine {
    fn execute_report(
        &self,
        report_id: &str,
        requester: &RequesterContext,
    ) -> Result<ReportOutput, ReportError>;
}

/// Report execution engine over one store backend.
///
/// Each execution is read-only and independent; the engine keeps no state
/// between calls.
pub struct ReportEngine<S> {
    store: S,
    planner: SimplePlanner,
    config: EngineConfig,
    observer: Arc<dyn ExecutionObserver>,
}

impl<S> ReportEngine<S>
where
    S: FormCatalog + RecordStore + ReportStore,
{
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            planner: SimplePlanner::new(config.clone()),
            config,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Executes a report and translates any failure into a user-facing
    /// diagnostic.
    pub fn respond(
        &self,
        report_id: &str,
        requester: &RequesterContext,
    ) -> Result<ReportOutput, Diagnostic> {
        self.execute_report(report_id, requester).map_err(|err| {
            let diagnostic = translate(&err, self.config.development_mode);
            self.observer.failure(report_id, &err, &diagnostic);
            diagnostic
        })
    }

    /// Forms named anywhere in the report, restricted to live ones, with
    /// their full field catalogs (archived fields included).
    fn participating_forms(&self, report: &Report) -> Result<Vec<FormFields>, StoreError> {
        let config = &report.config;
        let mut named: Vec<&FormId> = Vec::new();
        let referenced = config
            .selected_forms
            .iter()
            .chain(config.selected_fields.iter().map(|f| &f.form_id))
            .chain(config.aggregations.iter().map(|a| &a.form_id));
        for form_id in referenced {
            if !named.contains(&form_id) {
                named.push(form_id);
            }
        }

        let live: BTreeSet<String> = self
            .store
            .list_active_forms()?
            .into_iter()
            .map(|form| form.id)
            .collect();
        let (kept, dropped): (Vec<&FormId>, Vec<&FormId>) =
            named.into_iter().partition(|id| live.contains(id.as_str()));
        if !dropped.is_empty() {
            let dropped: Vec<String> = dropped.into_iter().cloned().collect();
            self.observer.forms_dropped(&report.id, &dropped);
        }

        let mut forms = Vec::with_capacity(kept.len());
        for form_id in kept {
            forms.push(FormFields {
                form_id: form_id.clone(),
                fields: self.store.list_fields(form_id, true)?,
            });
        }
        Ok(forms)
    }
}

impl<S> Engine for ReportEngine<S>
where
    S: FormCatalog + RecordStore + ReportStore,
{
    fn execute_report(
        &self,
        report_id: &str,
        requester: &RequesterContext,
    ) -> Result<ReportOutput, ReportError> {
        let report = self
            .store
            .get_report(report_id)?
            .ok_or_else(|| ReportError::ReportNotFound {
                report_id: report_id.to_string(),
            })?;
        if !self.config.access.can_access(&report, requester) {
            return Err(ReportError::AccessDenied {
                report_id: report_id.to_string(),
                user_id: requester.user_id.clone(),
            });
        }

        let forms = self.participating_forms(&report)?;
        let request = PlanRequest {
            config: &report.config,
            forms: &forms,
            site_filter: requester.site_id.as_deref(),
        };
        let (plan, manifest) = self.planner.compile(&request)?;
        self.observer.plan_compiled(report_id, &manifest);

        let records = self
            .store
            .query_records(&plan.form_ids, plan.site_filter.as_deref())?;
        let run = PlanRun {
            plan: &plan,
            forms: &forms,
            report_id,
            observer: self.observer.as_ref(),
        };
        let mut data = run.execute(&records)?;

        let removed = filter_total_rows(&mut data, &plan.grouping_columns());
        if removed > 0 {
            self.observer.total_rows_removed(report_id, removed);
        }
        sort_rows(&mut data, &plan.sort);
        self.observer
            .stage(report_id, plan.mode, Stage::Final, data.len());

        Ok(ReportOutput {
            total: data.len(),
            columns: plan.columns,
            data,
            report,
        })
    }
}

struct PlanRun<'a> {
    plan: &'a QueryPlan,
    forms: &'a [FormFields],
    report_id: &'a str,
    observer: &'a dyn ExecutionObserver,
}

impl PlanRun<'_> {
    fn execute(&self, records: &[Record]) -> Result<Vec<ResultRow>, ExecError> {
        let mode = self.plan.mode;
        let rows = self.expand(records)?;
        self.observer
            .stage(self.report_id, mode, Stage::Expanded, rows.len());

        let mut kept = Vec::with_capacity(rows.len());
        for view in rows {
            if self.passes_filters(&view)? {
                kept.push(view);
            }
        }
        self.observer
            .stage(self.report_id, mode, Stage::Filtered, kept.len());

        let out = match mode {
            ExecMode::Raw => self.project(&kept)?,
            ExecMode::Aggregate => self.aggregate(&kept)?,
            ExecMode::AggregateThenCalculate => {
                let mut materialized = self.aggregate(&kept)?;
                self.calculate(&mut materialized)?;
                materialized
            }
        };
        self.observer
            .stage(self.report_id, mode, Stage::Materialized, out.len());
        Ok(out)
    }

    /// One view per row-object of every in-scope record. Records outside the
    /// requester's site never reach grouping.
    fn expand<'r>(&self, records: &'r [Record]) -> Result<Vec<RowView<'r>>, ExecError> {
        let mut rows = Vec::new();
        for record in records {
            if !self.plan.form_ids.contains(&record.form_id) {
                continue;
            }
            if let Some(site) = self.plan.site_filter.as_deref() {
                if record.site_id != site {
                    continue;
                }
            }
            if let Some(form) = self.forms.iter().find(|f| f.form_id == record.form_id) {
                let stray = unresolved_keys(record, &form.fields);
                if !stray.is_empty() {
                    self.observer
                        .unresolved_keys(self.report_id, &record.id, &stray);
                }
            }
            for (index, raw) in record.batch_rows.iter().enumerate() {
                let row = raw
                    .as_object()
                    .ok_or_else(|| ExecError::MalformedValuePath {
                        record_id: record.id.clone(),
                        row_index: index,
                        reason: "row is not an object".to_string(),
                    })?;
                rows.push(RowView {
                    record_id: &record.id,
                    form_id: &record.form_id,
                    index,
                    row,
                });
            }
        }
        Ok(rows)
    }

    /// Rows of forms that do not define a filtered field pass that filter.
    fn passes_filters(&self, view: &RowView<'_>) -> Result<bool, ExecError> {
        for filter in &self.plan.filters {
            if !filter.forms.iter().any(|id| id == view.form_id) {
                continue;
            }
            if !filter_matches(filter, &view.read(&filter.accessor)?) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn project(&self, rows: &[RowView<'_>]) -> Result<Vec<ResultRow>, ExecError> {
        let mut out = Vec::with_capacity(rows.len());
        for view in rows {
            let mut row = ResultRow::new();
            for key in &self.plan.grouping {
                row.insert(key.column.clone(), view.read(&key.accessor)?);
            }
            for calc in &self.plan.calculations {
                let value = evaluate(&calc.expr, view)?;
                row.insert(calc.column.clone(), value.map_or(Scalar::Missing, Scalar::Number));
            }
            out.push(row);
        }
        Ok(out)
    }

    /// Groups rows by canonical grouping text in first-seen order. Each
    /// aggregate only consumes rows of its own form.
    fn aggregate(&self, rows: &[RowView<'_>]) -> Result<Vec<ResultRow>, ExecError> {
        let plan = self.plan;
        let fresh = || {
            plan.aggregates
                .iter()
                .map(|d| Accumulator::new(d.func))
                .collect::<Vec<_>>()
        };
        let mut groups: Vec<(Vec<Scalar>, Vec<Accumulator>)> = Vec::new();
        let mut index: HashMap<Vec<Option<String>>, usize> = HashMap::new();
        if plan.grouping.is_empty() {
            groups.push((Vec::new(), fresh()));
            index.insert(Vec::new(), 0);
        }

        for view in rows {
            let mut values = Vec::with_capacity(plan.grouping.len());
            for key in &plan.grouping {
                values.push(view.read(&key.accessor)?);
            }
            let key: Vec<Option<String>> = values.iter().map(Scalar::group_key).collect();
            let slot = match index.get(&key) {
                Some(slot) => *slot,
                None => {
                    groups.push((values, fresh()));
                    index.insert(key, groups.len() - 1);
                    groups.len() - 1
                }
            };
            let accumulators = &mut groups[slot].1;
            for (descriptor, acc) in plan.aggregates.iter().zip(accumulators.iter_mut()) {
                if descriptor.form_id == view.form_id {
                    acc.push(&view.read(&descriptor.accessor)?);
                }
            }
        }

        let mut out = Vec::with_capacity(groups.len());
        for (values, accumulators) in groups {
            let mut row = ResultRow::new();
            for (key, value) in plan.grouping.iter().zip(values) {
                row.insert(key.column.clone(), value);
            }
            for (descriptor, acc) in plan.aggregates.iter().zip(&accumulators) {
                let value = acc.finish(descriptor.round_to_integer);
                if !value.is_finite() {
                    return Err(ExecError::NumericOverflow {
                        column: descriptor.column.clone(),
                    });
                }
                row.insert(descriptor.column.clone(), Scalar::Number(value));
            }
            out.push(row);
        }
        Ok(out)
    }

    /// Second stage: calculations over the materialized aggregate set.
    fn calculate(&self, rows: &mut [ResultRow]) -> Result<(), ExecError> {
        for row in rows.iter_mut() {
            let mut computed = Vec::with_capacity(self.plan.calculations.len());
            for calc in &self.plan.calculations {
                let value = evaluate(&calc.expr, &Materialized(&*row))?;
                computed.push((calc.column.clone(), value.map_or(Scalar::Missing, Scalar::Number)));
            }
            row.extend(computed);
        }
        Ok(())
    }
}

/// One row-object together with its origin.
#[derive(Debug, Clone, Copy)]
struct RowView<'r> {
    record_id: &'r str,
    form_id: &'r str,
    index: usize,
    row: &'r RowObject,
}

impl RowView<'_> {
    /// Probes the accessor's candidate keys; a derived field without a stored
    /// value is computed from the same row.
    fn read(&self, accessor: &FieldAccessor) -> Result<Scalar, ExecError> {
        let value = probe(self.row, &accessor.keys).map_err(|key| ExecError::MalformedValuePath {
            record_id: self.record_id.to_string(),
            row_index: self.index,
            reason: format!("value under `{key}` is not a scalar"),
        })?;
        if value.is_missing() {
            if let Some(expr) = accessor.derivation_for(self.form_id) {
                return Ok(evaluate(expr, self)?.map_or(Scalar::Missing, Scalar::Number));
            }
        }
        Ok(value.typed(accessor.value_type))
    }
}

impl CalcInput for RowView<'_> {
    fn aggregate(&self, _column: &str) -> Option<f64> {
        None
    }

    fn grouping(&self, _column: &str) -> Option<f64> {
        None
    }

    fn raw(&self, accessor: &FieldAccessor) -> Result<Option<f64>, ExecError> {
        Ok(self.read(accessor)?.as_number())
    }
}

struct Materialized<'a>(&'a ResultRow);

impl CalcInput for Materialized<'_> {
    fn aggregate(&self, column: &str) -> Option<f64> {
        self.0.get(column).and_then(Scalar::as_number)
    }

    fn grouping(&self, column: &str) -> Option<f64> {
        self.0.get(column).and_then(Scalar::as_number)
    }

    fn raw(&self, _accessor: &FieldAccessor) -> Result<Option<f64>, ExecError> {
        Ok(None)
    }
}

pub(crate) fn filter_matches(filter: &FilterPlan, value: &Scalar) -> bool {
    let operand = &filter.operand;
    if filter.op == FilterOp::Contains {
        let needle = operand.display_text().to_lowercase();
        return !value.is_blank() && value.display_text().to_lowercase().contains(&needle);
    }
    if value.is_blank() || operand.is_blank() {
        let both = value.is_blank() && operand.is_blank();
        return match filter.op {
            FilterOp::Eq => both,
            FilterOp::Ne => !both,
            _ => false,
        };
    }
    let ord = value.compare(operand);
    // Ordered operators never match a number against text.
    let ordered = value.as_number().is_some() == operand.as_number().is_some();
    match filter.op {
        FilterOp::Eq => ord == Ordering::Equal,
        FilterOp::Ne => ord != Ordering::Equal,
        FilterOp::Gt => ordered && ord == Ordering::Greater,
        FilterOp::Gte => ordered && ord != Ordering::Less,
        FilterOp::Lt => ordered && ord == Ordering::Less,
        FilterOp::Lte => ordered && ord != Ordering::Greater,
        FilterOp::Contains => false,
    }
}
