mod common;

use common::{fish_engine, fish_store, init_tracing, net_report};
use report_engine::{
    Engine, EngineConfig, ErrorKind, ReportEngine, ReportError, RequesterContext, Scalar,
    UnresolvedReferencePolicy,
};
use serde_json::json;

fn manager() -> RequesterContext {
    RequesterContext::new("m_1", "manager")
}

#[test]
fn net_stock_scenario_yields_one_row_per_species() {
    let engine = fish_engine();
    let out = engine
        .execute_report("rpt_net", &manager())
        .expect("execute should succeed");

    assert_eq!(out.total, 2);
    let body = serde_json::to_value(&out.data).expect("serialize rows");
    assert_eq!(
        body,
        json!([
            {"Species": "Carp", "QtyIn_sum": 15, "QtyOut_sum": 3, "Net": 12},
            {"Species": "Bass", "QtyIn_sum": 7, "QtyOut_sum": 2, "Net": 5}
        ])
    );
}

#[test]
fn sort_orders_reorder_the_materialized_rows() {
    let mut store = fish_store();
    let mut report = net_report();
    report.id = "rpt_sorted".into();
    report.config.sort_orders = serde_json::from_value(json!([
        {"field": "Net", "direction": "asc"},
        {"field": "Species", "direction": "desc"}
    ]))
    .expect("sort orders");
    store.insert_report(report);

    init_tracing();
    let engine = ReportEngine::new(store, EngineConfig::default());
    let out = engine
        .execute_report("rpt_sorted", &manager())
        .expect("execute should succeed");
    let species: Vec<String> = out.data.iter().map(|r| r["Species"].display_text()).collect();
    assert_eq!(species, vec!["Bass", "Carp"]);
}

#[test]
fn stored_access_rules_gate_execution() {
    let engine = fish_engine();
    engine
        .execute_report("rpt_net", &RequesterContext::new("a_1", "super_admin"))
        .expect("super role always passes");

    let err = engine
        .execute_report("rpt_net", &RequesterContext::new("f_1", "finance"))
        .expect_err("finance is not listed on this report");
    assert!(matches!(err, ReportError::AccessDenied { .. }));

    let diagnostic = engine
        .respond("rpt_net", &RequesterContext::new("owner", "guest"))
        .expect_err("guest is always denied");
    assert_eq!(diagnostic.error, ErrorKind::AccessDenied);
}

#[test]
fn empty_report_is_a_configuration_error() {
    let mut store = fish_store();
    let mut report = net_report();
    report.id = "rpt_empty".into();
    report.config.selected_fields.clear();
    report.config.aggregations.clear();
    report.config.calculations.clear();
    store.insert_report(report);

    init_tracing();
    let engine = ReportEngine::new(store, EngineConfig::default());
    let diagnostic = engine
        .respond("rpt_empty", &manager())
        .expect_err("nothing selected");
    assert_eq!(diagnostic.error, ErrorKind::NoFieldsSelected);
    assert_eq!(diagnostic.status(), 400);
    assert!(diagnostic.suggestion.contains("修改报表配置"));
}

#[test]
fn engine_config_loads_from_toml() {
    let config = EngineConfig::from_toml_str(
        r#"
        unresolved_reference = "zero"
        development_mode = true

        [access]
        denied_role = "visitor"
        "#,
    )
    .expect("config should parse");
    assert_eq!(config.unresolved_reference, UnresolvedReferencePolicy::Zero);
    assert_eq!(config.access.super_role, "super_admin");

    let mut store = fish_store();
    let mut report = net_report();
    report.id = "rpt_loose".into();
    report.config.calculations[0].expression = "QtyIn - QtyOut - Spoilage".into();
    store.insert_report(report);

    init_tracing();
    let engine = ReportEngine::new(store, config);
    let out = engine
        .execute_report("rpt_loose", &manager())
        .expect("unresolved token reads as zero");
    assert_eq!(out.data[0]["Net"], Scalar::Number(12.0));

    let err = engine
        .execute_report("rpt_loose", &RequesterContext::new("v_1", "visitor"))
        .expect_err("configured denied role");
    assert!(matches!(err, ReportError::AccessDenied { .. }));
}

#[test]
fn deleting_a_form_removes_its_rows_from_reports() {
    let mut store = fish_store();
    store.delete_form("stock_out");
    let mut report = net_report();
    report.id = "rpt_in".into();
    report.config.calculations.clear();
    store.insert_report(report);

    init_tracing();
    let engine = ReportEngine::new(store, EngineConfig::default());
    let out = engine
        .execute_report("rpt_in", &manager())
        .expect("execute should succeed");
    assert_eq!(out.columns, vec!["Species", "QtyIn_sum"]);
    assert_eq!(out.total, 2);
}
