use crate::compile::{PlanRequest, ReportPlanner};
use crate::diagnostics::Diagnostic;
use crate::error::{ReportError, StoreError};
use crate::obs::{ExecutionObserver, NoopObserver, Stage};
use crate::plan::{ExecMode, PlanManifest};
use crate::resolve::FormFields;
use crate::runtime::{Engine, ReportEngine};
use crate::store::{FormCatalog, MemoryStore, RecordStore, ReportStore};
use crate::types::{
    AggregateFunc, Aggregation, Calculation, Field, Form, FormId, Record, Report, ReportConfig,
    RequesterContext, SelectedField, ValueType,
};
use crate::value::Scalar;
use crate::{EngineConfig, SimplePlanner};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};


fn fish_in() -> Form {
    Form::new(
        "fish_in",
        "Stock In",
        vec![
            Field::new("a_species", "Species", ValueType::Text),
            Field::new("a_qty", "QtyIn", ValueType::Number),
            Field::new("a_w", "Weight", ValueType::Number),
        ],
    )
}

fn fish_out() -> Form {
    Form::new(
        "fish_out",
        "Stock Out",
        vec![
            Field::new("b_species", "Species", ValueType::Text),
            Field::new("b_qty", "QtyOut", ValueType::Number),
            Field::new("b_w", "Weight", ValueType::Number),
        ],
    )
}

fn record(id: &str, form_id: &str, site_id: &str, rows: Vec<JsonValue>) -> Record {
    Record {
        id: id.into(),
        form_id: form_id.into(),
        site_id: site_id.into(),
        user_id: "clerk".into(),
        batch_rows: rows,
        field_snapshot: Vec::new(),
    }
}

fn selected(form_id: &str, field_id: &str, name: &str) -> SelectedField {
    SelectedField {
        form_id: form_id.into(),
        field_id: field_id.into(),
        field_name: name.into(),
    }
}

fn sum(form_id: &str, field_id: &str, name: &str) -> Aggregation {
    Aggregation {
        form_id: form_id.into(),
        field_id: field_id.into(),
        field_name: name.into(),
        function: AggregateFunc::Sum,
    }
}

fn report(id: &str, config: ReportConfig) -> Report {
    Report {
        id: id.into(),
        name: id.into(),
        creator_id: "owner".into(),
        config,
    }
}

/// Species grouped across both forms, stock in/out summed per form.
fn net_stock_config() -> ReportConfig {
    ReportConfig {
        selected_forms: vec!["fish_in".into(), "fish_out".into()],
        selected_fields: vec![
            selected("fish_in", "a_species", "Species"),
            selected("fish_out", "b_species", "Species"),
        ],
        aggregations: vec![
            sum("fish_in", "a_qty", "QtyIn"),
            sum("fish_out", "b_qty", "QtyOut"),
        ],
        calculations: vec![Calculation {
            name: "Net".into(),
            expression: "QtyIn - QtyOut".into(),
        }],
        ..ReportConfig::default()
    }
}

/// Three stock-in rows (two sites) and two stock-out rows.
fn fish_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.insert_form(fish_in());
    store.insert_form(fish_out());
    store.append_record(record(
        "r1",
        "fish_in",
        "pond-1",
        vec![
            json!({"a_species": "Carp", "a_qty": 10}),
            json!({"a_species": "Carp", "a_qty": "5"}),
        ],
    ));
    store.append_record(record(
        "r2",
        "fish_in",
        "pond-2",
        vec![json!({"Species": "Bass", "a_qty": 7})],
    ));
    store.append_record(record(
        "r3",
        "fish_out",
        "pond-1",
        vec![
            json!({"b_species": "Carp", "b_qty": 3}),
            json!({"b_species": "Bass", "b_qty": 2}),
        ],
    ));
    store.insert_report(report("net", net_stock_config()));
    store
}

fn catalog(store: &MemoryStore, form_ids: &[&str]) -> Vec<FormFields> {
    form_ids
        .iter()
        .map(|id| FormFields {
            form_id: (*id).to_string(),
            fields: store.list_fields(id, true).expect("list fields"),
        })
        .collect()
}

fn engine(store: MemoryStore) -> ReportEngine<MemoryStore> {
    ReportEngine::new(store, EngineConfig::default()).with_observer(Arc::new(NoopObserver))
}

fn manager() -> RequesterContext {
    RequesterContext::new("m1", "manager")
}

fn number(row: &crate::types::ResultRow, column: &str) -> Option<f64> {
    row.get(column).and_then(Scalar::as_number)
}

#[derive(Debug, Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn push(&self, event: String) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ExecutionObserver for RecordingObserver {
    fn plan_compiled(&self, report_id: &str, manifest: &PlanManifest) {
        self.push(format!("plan {report_id} {}", manifest.mode.as_str()));
    }

    fn stage(&self, _report_id: &str, _mode: ExecMode, stage: Stage, rows: usize) {
        self.push(format!("stage {} {rows}", stage.as_str()));
    }

    fn forms_dropped(&self, _report_id: &str, form_ids: &[String]) {
        self.push(format!("dropped {}", form_ids.join(",")));
    }

    fn unresolved_keys(&self, _report_id: &str, record_id: &str, keys: &BTreeSet<String>) {
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        self.push(format!("unresolved {record_id} {}", keys.join(",")));
    }

    fn failure(&self, _report_id: &str, _err: &ReportError, diagnostic: &Diagnostic) {
        self.push(format!("failure {:?}", diagnostic.error));
    }
}

/// Store whose record query always fails with a backend message.
struct FailingStore {
    inner: MemoryStore,
    message: &'static str,
}

impl FormCatalog for FailingStore {
    fn list_active_forms(&self) -> Result<Vec<Form>, StoreError> {
        self.inner.list_active_forms()
    }

    fn list_fields(&self, form_id: &str, include_archived: bool) -> Result<Vec<Field>, StoreError> {
        self.inner.list_fields(form_id, include_archived)
    }
}

impl RecordStore for FailingStore {
    fn query_records(
        &self,
        _form_ids: &[FormId],
        _site_filter: Option<&str>,
    ) -> Result<Vec<Record>, StoreError> {
        Err(StoreError::Backend(self.message.to_string()))
    }
}

impl ReportStore for FailingStore {
    fn get_report(&self, report_id: &str) -> Result<Option<Report>, StoreError> {
        self.inner.get_report(report_id)
    }
}
