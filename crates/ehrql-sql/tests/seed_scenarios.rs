//! The six end-to-end seed scenarios (spec §8): each builds a small QM
//! graph with the fluent `ehrql-builder` API, checks it against the
//! in-memory reference evaluator, and smoke-tests that lowering it to
//! SQL text produces the expected structural shape.

use std::collections::BTreeSet;

use ehrql_builder::{BoolT, DateT, Dataset, EventFrame, IntT, PatientFrame, Series, StrT, minimum_of};
use ehrql_dialect::SqliteDialect;
use ehrql_sql::reference::{TestData, TestRow, eval_dataset_variable, eval_rows};
use ehrql_sql::{lower_dataset, lower_variable};
use ehrql_types::{Column, Primitive, TableSchema};
use ehrql_types::Literal;

fn patients_schema() -> TableSchema {
    TableSchema::new(
        "patients",
        vec![
            Column::new("patient_id", Primitive::Int, vec![]).unwrap(),
            Column::new("date_of_birth", Primitive::Date, vec![]).unwrap(),
        ],
    )
    .unwrap()
}

fn events_schema() -> TableSchema {
    TableSchema::new(
        "events",
        vec![
            Column::new("patient_id", Primitive::Int, vec![]).unwrap(),
            Column::new("date", Primitive::Date, vec![]).unwrap(),
            Column::new("code", Primitive::Str, vec![]).unwrap(),
            Column::new("value", Primitive::Int, vec![]).unwrap(),
        ],
    )
    .unwrap()
}

fn date(y: i32, m: u32, d: u32) -> chrono::NaiveDate {
    chrono::NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Scenario 1: age at an index date, via whole-years date difference.
#[test]
fn age_at_index_date() {
    let patients = PatientFrame::from_table("patients", patients_schema());
    let dob: Series<DateT> = patients.column("date_of_birth").unwrap();
    let index = Series::<DateT>::literal(date(2010, 6, 1));
    let age = dob.difference_from(&index).years().unwrap();

    let mut dataset = Dataset::new();
    dataset.define_variable("age", || Ok(age.clone())).unwrap();
    dataset.set_population(|| patients.column::<IntT>("patient_id").unwrap().is_null().eq(&Series::literal(false))).unwrap();

    let data = TestData::new().with_table(
        "patients",
        vec![
            TestRow::new(1, vec![("patient_id", Literal::Int(1)), ("date_of_birth", Literal::Date(date(1990, 8, 10)))]),
            TestRow::new(2, vec![("patient_id", Literal::Int(2)), ("date_of_birth", Literal::Date(date(2000, 3, 20)))]),
        ],
    );

    let patient_ids: BTreeSet<i64> = [1, 2].into_iter().collect();
    let result = eval_dataset_variable(age.node(), &patient_ids, &data).unwrap();
    assert_eq!(result[&1].as_scalar(), Some(&Literal::Int(19)));
    assert_eq!(result[&2].as_scalar(), Some(&Literal::Int(10)));

    let dialect = SqliteDialect;
    let lowered = lower_dataset(&dataset, &dialect).unwrap();
    assert!(lowered.main_query.contains("WHERE"));
}

/// Scenario 2: first event per patient, then project its code column.
#[test]
fn first_event_code_per_patient() {
    let events = EventFrame::from_table("events", events_schema());
    let event_date: Series<DateT> = events.column("date").unwrap();
    let sorted = events.sort_by(&event_date).unwrap();
    let first = sorted.first_for_patient().unwrap();
    let code: Series<StrT> = first.column("code").unwrap();

    let data = TestData::new().with_table(
        "events",
        vec![
            TestRow::new(1, vec![("patient_id", Literal::Int(1)), ("date", Literal::Date(date(2020, 1, 5))), ("code", Literal::Str("xyz".into())), ("value", Literal::Int(1))]),
            TestRow::new(1, vec![("patient_id", Literal::Int(1)), ("date", Literal::Date(date(2021, 1, 5))), ("code", Literal::Str("later".into())), ("value", Literal::Int(2))]),
            TestRow::new(2, vec![("patient_id", Literal::Int(2)), ("date", Literal::Date(date(2019, 6, 1))), ("code", Literal::Str("abc".into())), ("value", Literal::Int(3))]),
        ],
    );

    let patient_ids: BTreeSet<i64> = [1, 2].into_iter().collect();
    let result = eval_dataset_variable(code.node(), &patient_ids, &data).unwrap();
    assert_eq!(result[&1].as_scalar(), Some(&Literal::Str("xyz".into())));
    assert_eq!(result[&2].as_scalar(), Some(&Literal::Str("abc".into())));

    let dialect = SqliteDialect;
    let (compiled, _) = lower_variable("first_code", code.node(), &dialect).unwrap();
    assert!(!compiled.expr.render().is_empty());
}

/// Scenario 3: sorting only by date leaves ties broken by whichever
/// row the source order placed last; `last_for_patient` picks it.
#[test]
fn last_value_with_a_date_tie() {
    let events = EventFrame::from_table("events", events_schema());
    let event_date: Series<DateT> = events.column("date").unwrap();
    let sorted = events.sort_by(&event_date).unwrap();
    let last = sorted.last_for_patient().unwrap();
    let value: Series<IntT> = last.column("value").unwrap();

    let data = TestData::new().with_table(
        "events",
        vec![
            TestRow::new(1, vec![("patient_id", Literal::Int(1)), ("date", Literal::Date(date(2020, 1, 1))), ("code", Literal::Str("a".into())), ("value", Literal::Int(10))]),
            TestRow::new(1, vec![("patient_id", Literal::Int(1)), ("date", Literal::Date(date(2020, 1, 1))), ("code", Literal::Str("b".into())), ("value", Literal::Int(20))]),
        ],
    );

    let patient_ids: BTreeSet<i64> = [1].into_iter().collect();
    let result = eval_dataset_variable(value.node(), &patient_ids, &data).unwrap();
    assert_eq!(result[&1].as_scalar(), Some(&Literal::Int(20)));
}

/// Scenario 4: division by a column that is always zero yields null
/// for every patient, never a divide-by-zero error.
#[test]
fn division_by_zero_is_null_everywhere() {
    let schema = TableSchema::new(
        "ratios",
        vec![
            Column::new("patient_id", Primitive::Int, vec![]).unwrap(),
            Column::new("i1", Primitive::Int, vec![]).unwrap(),
            Column::new("zero", Primitive::Int, vec![]).unwrap(),
        ],
    )
    .unwrap();
    let table = PatientFrame::from_table("ratios", schema);
    let i1: Series<IntT> = table.column("i1").unwrap();
    let zero: Series<IntT> = table.column("zero").unwrap();
    let ratio = i1.true_divide(&zero).unwrap();

    let data = TestData::new().with_table(
        "ratios",
        vec![
            TestRow::new(1, vec![("patient_id", Literal::Int(1)), ("i1", Literal::Int(4)), ("zero", Literal::Int(0))]),
            TestRow::new(2, vec![("patient_id", Literal::Int(2)), ("i1", Literal::Int(9)), ("zero", Literal::Int(0))]),
        ],
    );

    let patient_ids: BTreeSet<i64> = [1, 2].into_iter().collect();
    let result = eval_dataset_variable(ratio.node(), &patient_ids, &data).unwrap();
    assert!(matches!(result[&1], ehrql_sql::reference::Value::Null));
    assert!(matches!(result[&2], ehrql_sql::reference::Value::Null));

    let dialect = SqliteDialect;
    let (compiled, _) = lower_variable("ratio", ratio.node(), &dialect).unwrap();
    assert!(compiled.expr.render().contains("NULLIF"));
}

/// Scenario 5: codelist-restricted, date-bounded existence check.
#[test]
fn codelist_and_date_bounded_exists() {
    let events = EventFrame::from_table("events", events_schema());
    let code: Series<StrT> = events.column("code").unwrap();
    let event_date: Series<DateT> = events.column("date").unwrap();
    let in_codelist = code.is_in(["A".to_string(), "B".to_string()]).unwrap();
    let after_cutoff = event_date.ge(&Series::literal(date(2022, 1, 1))).unwrap();
    let matching = events.filter(&(in_codelist & after_cutoff).unwrap()).unwrap();
    let exists = matching.column::<IntT>("value").unwrap().exists().unwrap();

    let data = TestData::new().with_table(
        "events",
        vec![
            TestRow::new(1, vec![("patient_id", Literal::Int(1)), ("date", Literal::Date(date(2022, 3, 1))), ("code", Literal::Str("A".into())), ("value", Literal::Int(1))]),
            TestRow::new(2, vec![("patient_id", Literal::Int(2)), ("date", Literal::Date(date(2019, 3, 1))), ("code", Literal::Str("A".into())), ("value", Literal::Int(1))]),
            TestRow::new(2, vec![("patient_id", Literal::Int(2)), ("date", Literal::Date(date(2023, 1, 1))), ("code", Literal::Str("C".into())), ("value", Literal::Int(2))]),
        ],
    );

    let patient_ids: BTreeSet<i64> = [1, 2].into_iter().collect();
    let result = eval_dataset_variable(exists.node(), &patient_ids, &data).unwrap();
    assert_eq!(result[&1].as_bool(), Some(true));
    assert_eq!(result[&2].as_bool(), Some(false));

    let dialect = SqliteDialect;
    let (compiled, _) = lower_variable("has_code", exists.node(), &dialect).unwrap();
    assert!(compiled.expr.render().contains("COALESCE"));
}

/// Scenario 6: an inline patient table left-joined against a wider
/// population leaves unmatched patients null rather than dropping
/// them.
#[test]
fn inline_patient_table_left_joins_against_population() {
    let inline_schema = TableSchema::new(
        "scores",
        vec![
            Column::new("patient_id", Primitive::Int, vec![]).unwrap(),
            Column::new("score", Primitive::Int, vec![]).unwrap(),
        ],
    )
    .unwrap();
    let inline = PatientFrame::from_inline_rows(
        vec![
            vec![Literal::Int(1), Literal::Int(10)],
            vec![Literal::Int(2), Literal::Int(20)],
        ],
        inline_schema,
    )
    .unwrap();
    let score: Series<IntT> = inline.column("score").unwrap();

    let pop_schema = TableSchema::new("patients", vec![Column::new("patient_id", Primitive::Int, vec![]).unwrap()]).unwrap();
    let population_table = PatientFrame::from_table("patients", pop_schema);

    let mut dataset = Dataset::new();
    dataset.define_variable("score", || Ok(score.clone())).unwrap();
    dataset
        .set_population(|| population_table.column::<IntT>("patient_id").unwrap().is_null().eq(&Series::literal(false)))
        .unwrap();

    let rows = eval_rows(inline.node(), &TestData::new()).unwrap();
    assert_eq!(rows.len(), 2);

    let data = TestData::new().with_table(
        "patients",
        vec![TestRow::new(1, vec![]), TestRow::new(2, vec![]), TestRow::new(3, vec![])],
    );
    let patient_ids: BTreeSet<i64> = [1, 2, 3].into_iter().collect();
    let result = eval_dataset_variable(score.node(), &patient_ids, &data).unwrap();
    assert_eq!(result[&1].as_scalar(), Some(&Literal::Int(10)));
    assert_eq!(result[&2].as_scalar(), Some(&Literal::Int(20)));
    assert!(matches!(result[&3], ehrql_sql::reference::Value::Null));

    let dialect = SqliteDialect;
    let lowered = lower_dataset(&dataset, &dialect).unwrap();
    assert!(lowered.main_query.contains("LEFT JOIN"));
}

/// `minimum_of`/`maximum_of` reduce across sibling values on one row,
/// not across an aggregate's rows.
#[test]
fn minimum_of_picks_the_smaller_sibling_value() {
    let a = Series::<IntT>::literal(5);
    let b = Series::<IntT>::literal(3);
    let smallest = minimum_of([a, b]).unwrap();

    let patient_ids: BTreeSet<i64> = [1].into_iter().collect();
    let result = eval_dataset_variable(smallest.node(), &patient_ids, &TestData::new()).unwrap();
    assert_eq!(result[&1].as_scalar(), Some(&Literal::Int(3)));
}

#[test]
fn bool_population_literal_true_still_needs_a_table_to_anchor_on() {
    // A population predicate with no table reference has nowhere to
    // source patient_id from; this is `SqlError::EmptyPopulation`.
    let mut dataset = Dataset::new();
    dataset.define_variable("x", || Ok(Series::<IntT>::literal(1))).unwrap();
    dataset.set_population(|| Ok(Series::<BoolT>::literal(true))).unwrap();

    let dialect = SqliteDialect;
    let result = lower_dataset(&dataset, &dialect);
    assert!(result.is_err());
}
