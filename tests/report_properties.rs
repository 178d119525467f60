mod common;

use common::{fish_forms, init_tracing, net_report};
use proptest::prelude::*;
use report_engine::{
    normalize_access_rules, Engine, EngineConfig, MemoryStore, Record, ReportEngine,
    RequesterContext, Scalar,
};
use serde_json::json;
use std::collections::BTreeSet;

const SPECIES: [&str; 4] = ["Carp", "Bass", "0", ""];

/// (form index, species index, quantity)
fn arb_rows() -> impl Strategy<Value = Vec<(usize, usize, f64)>> {
    prop::collection::vec((0usize..2, 0usize..SPECIES.len(), 0.0f64..50.0), 0..24)
}

fn store_with(rows: &[(usize, usize, f64)]) -> MemoryStore {
    let mut store = MemoryStore::new();
    for form in fish_forms() {
        store.insert_form(form);
    }
    for (i, (form, species, qty)) in rows.iter().enumerate() {
        let (form_id, species_key, qty_key) = if *form == 0 {
            ("stock_in", "f_in_species", "f_in_qty")
        } else {
            ("stock_out", "f_out_species", "f_out_qty")
        };
        store.append_record(Record {
            id: format!("rec_{i}"),
            form_id: form_id.into(),
            site_id: "north".into(),
            user_id: "clerk".into(),
            batch_rows: vec![json!({species_key: SPECIES[*species], qty_key: qty})],
            field_snapshot: Vec::new(),
        });
    }
    store.insert_report(net_report());
    store
}

proptest! {
    #[test]
    fn grouped_output_is_merged_integral_and_free_of_totals(rows in arb_rows()) {
        init_tracing();
        let engine = ReportEngine::new(store_with(&rows), EngineConfig::default());
        let out = engine
            .execute_report("rpt_net", &RequesterContext::new("m_1", "manager"))
            .expect("execute should succeed");

        let mut seen = BTreeSet::new();
        for row in &out.data {
            let species = &row["Species"];
            prop_assert!(!species.is_total_placeholder());
            prop_assert!(seen.insert(species.display_text()), "species appears once");
            for column in ["QtyIn_sum", "QtyOut_sum"] {
                let value = row[column].as_number().expect("aggregate is numeric");
                prop_assert_eq!(value.fract(), 0.0);
            }
        }

        let expected_in: f64 = rows
            .iter()
            .filter(|(form, species, _)| *form == 0 && SPECIES[*species] == "Carp")
            .map(|(_, _, qty)| *qty)
            .sum();
        if let Some(carp) = out.data.iter().find(|r| r["Species"] == Scalar::from("Carp")) {
            prop_assert_eq!(carp["QtyIn_sum"].as_number(), Some(expected_in.round()));
        }
    }

    #[test]
    fn normalized_access_rules_are_stable(roles in prop::collection::vec("[a-z ]{0,8}", 0..4)) {
        let raw = json!({"roles": roles, "users": ["u1", " "]});
        let once = normalize_access_rules(Some(&raw));
        let again = normalize_access_rules(Some(&serde_json::to_value(&once).expect("serialize")));
        prop_assert!(!once.roles.is_empty());
        prop_assert_eq!(once, again);
    }
}
