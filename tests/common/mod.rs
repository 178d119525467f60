#![allow(dead_code)]

use report_engine::{Form, MemoryStore, Record, Report, ReportEngine, EngineConfig};
use serde_json::{json, Value as JsonValue};
use std::sync::Once;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn parse<T: serde::de::DeserializeOwned>(value: JsonValue) -> T {
    serde_json::from_value(value).expect("fixture should deserialize")
}

/// Stock-in and stock-out forms sharing a `Species` field under different ids.
pub fn fish_forms() -> Vec<Form> {
    parse(json!([
        {
            "id": "stock_in",
            "name": "Stock In",
            "fields": [
                {"id": "f_in_species", "name": "Species", "valueType": "text"},
                {"id": "f_in_qty", "name": "QtyIn", "valueType": "number"}
            ]
        },
        {
            "id": "stock_out",
            "name": "Stock Out",
            "fields": [
                {"id": "f_out_species", "name": "Species", "valueType": "text"},
                {"id": "f_out_qty", "name": "QtyOut", "valueType": "number"}
            ]
        }
    ]))
}

pub fn fish_records() -> Vec<Record> {
    parse(json!([
        {
            "id": "rec_in_1",
            "formId": "stock_in",
            "siteId": "north",
            "userId": "clerk_1",
            "batchRows": [
                {"f_in_species": "Carp", "f_in_qty": 10},
                {"f_in_species": "Carp", "f_in_qty": 5},
                {"f_in_species": "Bass", "f_in_qty": 7}
            ]
        },
        {
            "id": "rec_out_1",
            "formId": "stock_out",
            "siteId": "north",
            "userId": "clerk_2",
            "batchRows": [
                {"f_out_species": "Carp", "f_out_qty": 3},
                {"f_out_species": "Bass", "f_out_qty": 2}
            ]
        }
    ]))
}

/// Report definition as the presentation layer stores it.
pub fn net_report() -> Report {
    parse(json!({
        "id": "rpt_net",
        "name": "Net stock by species",
        "creatorId": "owner",
        "config": {
            "selectedForms": ["stock_in", "stock_out"],
            "selectedFields": [
                {"formId": "stock_in", "fieldId": "f_in_species", "fieldName": "Species"},
                {"formId": "stock_out", "fieldId": "f_out_species", "fieldName": "Species"}
            ],
            "aggregations": [
                {"formId": "stock_in", "fieldId": "f_in_qty", "fieldName": "QtyIn", "function": "SUM"},
                {"formId": "stock_out", "fieldId": "f_out_qty", "fieldName": "QtyOut", "function": "sum"}
            ],
            "calculations": [{"name": "Net", "expression": "QtyIn - QtyOut"}],
            "accessRules": "{\"roles\": [\"manager\"], \"users\": []}"
        }
    }))
}

pub fn fish_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    for form in fish_forms() {
        store.insert_form(form);
    }
    for record in fish_records() {
        store.append_record(record);
    }
    store.insert_report(net_report());
    store
}

pub fn fish_engine() -> ReportEngine<MemoryStore> {
    init_tracing();
    ReportEngine::new(fish_store(), EngineConfig::default())
}
