//! A Query Model graph must round-trip through JSON unchanged — dataset
//! definitions are shipped to backends as serialized graphs, not Rust
//! values.

use chrono::NaiveDate;
use ehrql_model::{Function, FunctionBuilder, Node, Position};
use ehrql_types::{Column, Constraint, Literal, Primitive, TableSchema};

fn patients_schema() -> TableSchema {
    TableSchema::new(
        "patients",
        vec![
            Column::new("patient_id", Primitive::Int, vec![Constraint::NotNull]).unwrap(),
            Column::new("date_of_birth", Primitive::Date, vec![]).unwrap(),
        ],
    )
    .unwrap()
}

fn events_schema() -> TableSchema {
    TableSchema::new(
        "clinical_events",
        vec![
            Column::new("patient_id", Primitive::Int, vec![Constraint::NotNull]).unwrap(),
            Column::new("date", Primitive::Date, vec![]).unwrap(),
            Column::new("code", Primitive::Code, vec![]).unwrap(),
        ],
    )
    .unwrap()
}

#[test]
fn select_column_round_trips() {
    let table = Node::select_patient_table("patients", patients_schema());
    let dob = Node::select_column(table, "date_of_birth").unwrap();

    let json = serde_json::to_string(&dob).unwrap();
    let back: Node = serde_json::from_str(&json).unwrap();
    assert_eq!(*dob, back);
}

#[test]
fn filtered_sorted_pick_round_trips() {
    let events = Node::select_table("clinical_events", events_schema());
    let code_col = Node::select_column(events.clone(), "code").unwrap();
    let target = Node::value_scalar(Literal::Code(
        ehrql_types::Code::new(ehrql_types::CodeSystem::SnomedCt, "123456").unwrap(),
    ));
    let condition = ehrql_model::function(FunctionBuilder::Eq(code_col, target)).unwrap();
    let filtered = Node::filter(events, condition).unwrap();
    let date_col = Node::select_column(filtered.clone(), "date").unwrap();
    let sorted = Node::sort(filtered, date_col).unwrap();
    let picked = Node::pick_one_row_per_patient(sorted, Position::First).unwrap();

    let json = serde_json::to_string(&picked).unwrap();
    let back: Node = serde_json::from_str(&json).unwrap();
    assert_eq!(*picked, back);
}

#[test]
fn date_arithmetic_round_trips() {
    let events = Node::select_table("clinical_events", events_schema());
    let date_col = Node::select_column(events, "date").unwrap();
    let offset = Node::value_scalar(Literal::Int(365));
    let shifted = ehrql_model::function(FunctionBuilder::DateAddDays(date_col, offset)).unwrap();

    let json = serde_json::to_string(&shifted).unwrap();
    let back: Node = serde_json::from_str(&json).unwrap();
    assert_eq!(*shifted, back);
    assert!(matches!(back, Node::Function(Function::DateAddDays(..))));
}

#[test]
fn filtered_sorted_pick_json_shape() {
    let events = Node::select_table("clinical_events", events_schema());
    let code_col = Node::select_column(events.clone(), "code").unwrap();
    let target = Node::value_scalar(Literal::Code(
        ehrql_types::Code::new(ehrql_types::CodeSystem::SnomedCt, "123456").unwrap(),
    ));
    let condition = ehrql_model::function(FunctionBuilder::Eq(code_col, target)).unwrap();
    let filtered = Node::filter(events, condition).unwrap();
    let date_col = Node::select_column(filtered.clone(), "date").unwrap();
    let sorted = Node::sort(filtered, date_col).unwrap();
    let picked = Node::pick_one_row_per_patient(sorted, Position::First).unwrap();

    let json = serde_json::to_string_pretty(&picked).unwrap();
    insta::assert_snapshot!(json);
}

#[test]
fn inline_patient_table_round_trips() {
    let schema = patients_schema();
    let rows = vec![
        vec![Literal::Int(1), Literal::Date(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap())],
        vec![Literal::Int(2), Literal::Date(NaiveDate::from_ymd_opt(1985, 6, 15).unwrap())],
    ];
    let inline = Node::inline_patient_table(rows, schema).unwrap();

    let json = serde_json::to_string(&inline).unwrap();
    let back: Node = serde_json::from_str(&json).unwrap();
    assert_eq!(*inline, back);
}
