//! Execution observer: the engine reports what it did here instead of
//! logging from the core.

use crate::diagnostics::Diagnostic;
use crate::error::ReportError;
use crate::plan::{ExecMode, PlanManifest};
use std::collections::BTreeSet;

/// Named points of the execution pipeline, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Row-objects expanded out of the fetched records.
    Expanded,
    /// Rows left after site and value filters.
    Filtered,
    /// Grouped/projected result rows.
    Materialized,
    /// Rows left after dropping total placeholders.
    Final,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expanded => "expanded",
            Self::Filtered => "filtered",
            Self::Materialized => "materialized",
            Self::Final => "final",
        }
    }
}

pub trait ExecutionObserver: Send + Sync {
    fn plan_compiled(&self, _report_id: &str, _manifest: &PlanManifest) {}
    fn stage(&self, _report_id: &str, _mode: ExecMode, _stage: Stage, _rows: usize) {}
    /// Forms named by the report that are inactive, archived or deleted.
    fn forms_dropped(&self, _report_id: &str, _form_ids: &[String]) {}
    /// Row keys that no current or historical field of the form explains.
    fn unresolved_keys(&self, _report_id: &str, _record_id: &str, _keys: &BTreeSet<String>) {}
    fn total_rows_removed(&self, _report_id: &str, _removed: usize) {}
    fn failure(&self, _report_id: &str, _err: &ReportError, _diagnostic: &Diagnostic) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {}

/// Forwards observations as leveled `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ExecutionObserver for TracingObserver {
    fn plan_compiled(&self, report_id: &str, manifest: &PlanManifest) {
        tracing::info!(report_id, plan = %manifest.summary_line(), "report plan compiled");
        if manifest.ignored_sort_count > 0 {
            tracing::warn!(
                report_id,
                ignored = manifest.ignored_sort_count,
                "sort orders name no output column"
            );
        }
    }

    fn stage(&self, report_id: &str, mode: ExecMode, stage: Stage, rows: usize) {
        tracing::debug!(report_id, mode = mode.as_str(), stage = stage.as_str(), rows);
    }

    fn forms_dropped(&self, report_id: &str, form_ids: &[String]) {
        tracing::warn!(report_id, forms = ?form_ids, "inactive forms excluded from report");
    }

    fn unresolved_keys(&self, report_id: &str, record_id: &str, keys: &BTreeSet<String>) {
        tracing::debug!(report_id, record_id, keys = ?keys, "row keys match no known field");
    }

    fn total_rows_removed(&self, report_id: &str, removed: usize) {
        tracing::debug!(report_id, removed, "total placeholder rows removed");
    }

    fn failure(&self, report_id: &str, err: &ReportError, diagnostic: &Diagnostic) {
        if diagnostic.error.is_system_fault() {
            tracing::error!(report_id, kind = ?diagnostic.error, error = %err, "report execution failed");
        } else {
            tracing::warn!(report_id, kind = ?diagnostic.error, error = %err, "report rejected");
        }
    }
}
