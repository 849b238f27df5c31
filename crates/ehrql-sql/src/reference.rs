//! A pure in-memory Query Model interpreter, used as ground truth for
//! the seed scenarios (spec §8) rather than driving a real database —
//! lowering plus execution against a backend should equal evaluating
//! the same graph here directly.
//!
//! Grounded on the same row/backend split `ehrql-reader`'s `Backend`
//! trait models (a table is a flat list of rows), and reuses
//! `ehrql-dialect`'s calendar functions so the reference evaluator and
//! every SQL dialect agree on date arithmetic by construction rather
//! than by parallel reimplementation.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Duration, NaiveDate};
use ehrql_dialect::{add_months, add_years, day_difference, whole_months, whole_years};
use ehrql_model::{Aggregate, Function, Node, NodeRef, Position, ValueLiteral};
use ehrql_types::{FiniteFloat, Literal};

use crate::error::{Result, SqlError};

/// A value produced by evaluating a node: absent (`NULL`), a single
/// literal, or (for `AggregateByPatient::CombineAsSet`) a frozen set.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Scalar(Literal),
    Set(BTreeSet<Literal>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Scalar(Literal::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Literal> {
        match self {
            Value::Scalar(literal) => Some(literal),
            _ => None,
        }
    }
}

/// One row of an event- or patient-domain table.
#[derive(Debug, Clone, Default)]
pub struct TestRow {
    pub patient_id: i64,
    pub columns: BTreeMap<String, Literal>,
}

impl TestRow {
    pub fn new(patient_id: i64, columns: Vec<(&str, Literal)>) -> Self {
        Self { patient_id, columns: columns.into_iter().map(|(k, v)| (k.to_string(), v)).collect() }
    }

    fn get(&self, name: &str) -> Value {
        self.columns.get(name).cloned().map(Value::Scalar).unwrap_or(Value::Null)
    }
}

/// The hand-built fixture a reference evaluation runs against.
#[derive(Debug, Clone, Default)]
pub struct TestData {
    tables: BTreeMap<String, Vec<TestRow>>,
}

impl TestData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<TestRow>) -> Self {
        self.tables.insert(name.into(), rows);
        self
    }

    fn table(&self, name: &str) -> Result<&[TestRow]> {
        self.tables.get(name).map(Vec::as_slice).ok_or_else(|| SqlError::UnknownTable(name.to_string()))
    }
}

/// Evaluate `node`, a patient-domain scalar, for every id in
/// `patient_ids` (absent patients read as `NULL`, matching the `LEFT
/// JOIN` semantics the SQL lowerer uses for the same node shapes).
pub fn eval_dataset_variable(node: &NodeRef, patient_ids: &BTreeSet<i64>, data: &TestData) -> Result<BTreeMap<i64, Value>> {
    patient_ids.iter().map(|&pid| Ok((pid, eval_scalar(node, ScalarCtx::Patient(pid), data)?))).collect()
}

/// Evaluate `node`, a row-set-shaped node, to its rows.
pub fn eval_rows(node: &NodeRef, data: &TestData) -> Result<Vec<TestRow>> {
    match node.as_ref() {
        Node::SelectTable { name, .. } | Node::SelectPatientTable { name, .. } => Ok(data.table(name)?.to_vec()),
        Node::InlinePatientTable { rows, schema } => {
            let columns: Vec<&str> = schema.columns().iter().map(|c| c.name()).collect();
            let pid_index = columns
                .iter()
                .position(|c| *c == "patient_id")
                .expect("an inline patient table always declares a patient_id column");
            Ok(rows
                .iter()
                .map(|row| {
                    let patient_id = match &row[pid_index] {
                        Literal::Int(n) => *n,
                        other => panic!("patient_id must be an Int literal, found {other:?}"),
                    };
                    let cols = columns.iter().map(|c| c.to_string()).zip(row.iter().cloned()).collect();
                    TestRow { patient_id, columns: cols }
                })
                .collect())
        }
        Node::Filter { source, condition } => {
            let mut kept = Vec::new();
            for row in eval_rows(source, data)? {
                if eval_scalar(condition, ScalarCtx::Row(&row), data)?.as_bool() == Some(true) {
                    kept.push(row);
                }
            }
            Ok(kept)
        }
        // A bare `Sort` carries no rows of its own; its keys are read
        // by whichever `PickOneRowPerPatient` sits on top (matching
        // `crate::pick`'s SQL lowering of the same chain).
        Node::Sort { source, .. } => eval_rows(source, data),
        Node::PickOneRowPerPatient { .. } => eval_pick(node, data),
        other => Err(SqlError::NotAFrame(other.kind_name())),
    }
}

fn eval_pick(pick_node: &NodeRef, data: &TestData) -> Result<Vec<TestRow>> {
    let Node::PickOneRowPerPatient { source, position, .. } = pick_node.as_ref() else {
        unreachable!("eval_pick is only called for a PickOneRowPerPatient node")
    };
    let (base, sort_keys) = collect_sort_keys(source);
    let rows = eval_rows(&base, data)?;

    let mut by_patient: BTreeMap<i64, Vec<TestRow>> = BTreeMap::new();
    for row in rows {
        by_patient.entry(row.patient_id).or_default().push(row);
    }

    let mut picked = Vec::with_capacity(by_patient.len());
    for (_, mut group) in by_patient {
        group.sort_by(|a, b| {
            for key in &sort_keys {
                let av = eval_scalar(key, ScalarCtx::Row(a), data).unwrap_or(Value::Null);
                let bv = eval_scalar(key, ScalarCtx::Row(b), data).unwrap_or(Value::Null);
                let ord = compare_values(&av, &bv);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        // Ascending order puts the first-in-sort-order row at index 0
        // and the last-in-sort-order row at the end; `Position::Last`
        // is simply the other end of the same ordering, mirroring how
        // the SQL lowering only flips `ORDER BY`'s direction.
        let chosen = match position {
            Position::First => group.into_iter().next(),
            Position::Last => group.into_iter().next_back(),
        };
        if let Some(row) = chosen {
            picked.push(row);
        }
    }
    Ok(picked)
}

fn collect_sort_keys(mut node: &NodeRef) -> (NodeRef, Vec<NodeRef>) {
    let mut keys = Vec::new();
    loop {
        match node.as_ref() {
            Node::Sort { source, sort_by } => {
                keys.push(sort_by.clone());
                node = source;
            }
            _ => return (node.clone(), keys),
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Scalar(x), Value::Scalar(y)) => compare_literals(x, y),
        _ => Ordering::Equal,
    }
}

fn compare_literals(a: &Literal, b: &Literal) -> Ordering {
    match (a, b) {
        (Literal::Bool(x), Literal::Bool(y)) => x.cmp(y),
        (Literal::Int(x), Literal::Int(y)) => x.cmp(y),
        (Literal::Float(x), Literal::Float(y)) => x.get().partial_cmp(&y.get()).unwrap_or(Ordering::Equal),
        (Literal::Str(x), Literal::Str(y)) => x.cmp(y),
        (Literal::Code(x), Literal::Code(y)) => x.to_string().cmp(&y.to_string()),
        (Literal::Date(x), Literal::Date(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Where a scalar expression is being evaluated from: a specific event
/// row (a `Filter` condition or `Sort` key), or a single patient (a
/// dataset variable's root, or an aggregate's per-patient result).
#[derive(Clone, Copy)]
enum ScalarCtx<'a> {
    Row(&'a TestRow),
    Patient(i64),
}

fn eval_scalar(node: &NodeRef, ctx: ScalarCtx, data: &TestData) -> Result<Value> {
    match node.as_ref() {
        Node::Value(ValueLiteral::Scalar(literal)) => Ok(Value::Scalar(literal.clone())),
        Node::Value(ValueLiteral::Set(set)) => Ok(Value::Set(set.iter().cloned().collect())),
        Node::SelectColumn { source, name } => match ctx {
            ScalarCtx::Row(row) => Ok(row.get(name)),
            ScalarCtx::Patient(pid) => {
                Ok(eval_rows(source, data)?.into_iter().find(|row| row.patient_id == pid).map(|row| row.get(name)).unwrap_or(Value::Null))
            }
        },
        Node::AggregateByPatient(agg) => {
            let pid = match ctx {
                ScalarCtx::Row(row) => row.patient_id,
                ScalarCtx::Patient(pid) => pid,
            };
            eval_aggregate(agg, pid, data)
        }
        Node::Function(func) => eval_function(func, ctx, data),
        Node::Case { cases, default } => {
            for (condition, value) in cases {
                if eval_scalar(condition, ctx, data)?.as_bool() == Some(true) {
                    return eval_scalar(value, ctx, data);
                }
            }
            match default {
                Some(value) => eval_scalar(value, ctx, data),
                None => Ok(Value::Null),
            }
        }
        other => Err(SqlError::NotPatientScalar(other.kind_name())),
    }
}

fn agg_source(agg: &Aggregate) -> &NodeRef {
    match agg {
        Aggregate::Exists(s)
        | Aggregate::Count(s)
        | Aggregate::Min(s)
        | Aggregate::Max(s)
        | Aggregate::Sum(s)
        | Aggregate::Mean(s)
        | Aggregate::CombineAsSet(s) => s,
    }
}

fn eval_aggregate(agg: &Aggregate, patient_id: i64, data: &TestData) -> Result<Value> {
    let source = agg_source(agg);
    let (frame_rows, value_of): (NodeRef, Box<dyn Fn(&TestRow) -> Value>) = match source.as_ref() {
        Node::SelectColumn { source: inner, name } => {
            let name = name.clone();
            (inner.clone(), Box::new(move |row: &TestRow| row.get(&name)))
        }
        _ => (source.clone(), Box::new(|_: &TestRow| Value::Scalar(Literal::Int(1)))),
    };
    let rows: Vec<TestRow> = eval_rows(&frame_rows, data)?.into_iter().filter(|row| row.patient_id == patient_id).collect();

    match agg {
        Aggregate::Exists(_) => Ok(Value::Scalar(Literal::Bool(!rows.is_empty()))),
        Aggregate::Count(_) => Ok(Value::Scalar(Literal::Int(rows.len() as i64))),
        Aggregate::Min(_) | Aggregate::Max(_) => {
            let mut values: Vec<Literal> = rows.iter().filter_map(|row| value_of(row).as_scalar().cloned()).collect();
            values.sort_by(compare_literals);
            let picked = match agg {
                Aggregate::Min(_) => values.first(),
                _ => values.last(),
            };
            Ok(picked.cloned().map(Value::Scalar).unwrap_or(Value::Null))
        }
        Aggregate::Sum(_) | Aggregate::Mean(_) => {
            let values: Vec<f64> = rows
                .iter()
                .filter_map(|row| match value_of(row).as_scalar() {
                    Some(Literal::Int(n)) => Some(*n as f64),
                    Some(Literal::Float(f)) => Some(f.get()),
                    _ => None,
                })
                .collect();
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let sum: f64 = values.iter().sum();
            match agg {
                Aggregate::Sum(_) => {
                    let all_int = rows.iter().all(|row| matches!(value_of(row).as_scalar(), Some(Literal::Int(_))));
                    if all_int {
                        Ok(Value::Scalar(Literal::Int(sum as i64)))
                    } else {
                        Ok(Value::Scalar(Literal::Float(FiniteFloat::new(sum).expect("finite sum"))))
                    }
                }
                _ => Ok(Value::Scalar(Literal::Float(
                    FiniteFloat::new(sum / values.len() as f64).expect("finite mean"),
                ))),
            }
        }
        Aggregate::CombineAsSet(_) => {
            Ok(Value::Set(rows.iter().filter_map(|row| value_of(row).as_scalar().cloned()).collect()))
        }
    }
}

fn eval_function(func: &Function, ctx: ScalarCtx, data: &TestData) -> Result<Value> {
    use Function as F;
    let ev = |n: &NodeRef| eval_scalar(n, ctx, data);
    match func {
        F::Eq(a, b) => compare(ev(a)?, ev(b)?, |o| o == Ordering::Equal),
        F::Ne(a, b) => compare(ev(a)?, ev(b)?, |o| o != Ordering::Equal),
        F::Lt(a, b) => compare(ev(a)?, ev(b)?, |o| o == Ordering::Less),
        F::Le(a, b) => compare(ev(a)?, ev(b)?, |o| o != Ordering::Greater),
        F::Gt(a, b) => compare(ev(a)?, ev(b)?, |o| o == Ordering::Greater),
        F::Ge(a, b) => compare(ev(a)?, ev(b)?, |o| o != Ordering::Less),
        F::And(a, b) => bool_op(ev(a)?, ev(b)?, |x, y| x && y),
        F::Or(a, b) => bool_op(ev(a)?, ev(b)?, |x, y| x || y),
        F::Not(a) => match ev(a)? {
            Value::Scalar(Literal::Bool(b)) => Ok(Value::Scalar(Literal::Bool(!b))),
            Value::Null => Ok(Value::Null),
            other => Err(unexpected("Not", other)),
        },
        F::In(a, b) => eval_in(a, b, ctx, data),
        F::IsNull(a) => Ok(Value::Scalar(Literal::Bool(matches!(ev(a)?, Value::Null)))),
        F::Add(a, b) => numeric_op(ev(a)?, ev(b)?, |x, y| x + y),
        F::Subtract(a, b) => numeric_op(ev(a)?, ev(b)?, |x, y| x - y),
        F::Multiply(a, b) => numeric_op(ev(a)?, ev(b)?, |x, y| x * y),
        F::TrueDivide(a, b) => divide(ev(a)?, ev(b)?, false),
        F::FloorDivide(a, b) => divide(ev(a)?, ev(b)?, true),
        F::Negate(a) => match ev(a)? {
            Value::Scalar(Literal::Int(n)) => Ok(Value::Scalar(Literal::Int(-n))),
            Value::Scalar(Literal::Float(f)) => Ok(Value::Scalar(Literal::Float(FiniteFloat::new(-f.get()).expect("finite negation")))),
            Value::Null => Ok(Value::Null),
            other => Err(unexpected("Negate", other)),
        },
        F::StringContains(a, b) => match (ev(a)?, ev(b)?) {
            (Value::Scalar(Literal::Str(h)), Value::Scalar(Literal::Str(n))) => Ok(Value::Scalar(Literal::Bool(h.contains(&n)))),
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (other, _) => Err(unexpected("StringContains", other)),
        },
        F::YearFromDate(a) => date_part(ev(a)?, |d| d.year() as i64),
        F::MonthFromDate(a) => date_part(ev(a)?, |d| i64::from(d.month())),
        F::DayFromDate(a) => date_part(ev(a)?, |d| i64::from(d.day())),
        F::ToFirstOfMonth(a) => date_map(ev(a)?, |d| d.with_day(1).expect("day 1 is always valid")),
        F::ToFirstOfYear(a) => date_map(ev(a)?, |d| NaiveDate::from_ymd_opt(d.year(), 1, 1).expect("Jan 1 is always valid")),
        F::DateAddDays(a, b) => date_add(ev(a)?, ev(b)?, |d, n| d + Duration::days(n)),
        F::DateAddMonths(a, b) => date_add(ev(a)?, ev(b)?, add_months),
        F::DateAddYears(a, b) => date_add(ev(a)?, ev(b)?, add_years),
        F::DateDifferenceInDays(a, b) => date_diff(ev(a)?, ev(b)?, day_difference),
        F::DateDifferenceInMonths(a, b) => date_diff(ev(a)?, ev(b)?, whole_months),
        F::DateDifferenceInYears(a, b) => date_diff(ev(a)?, ev(b)?, whole_years),
        F::CastToInt(a) => match ev(a)? {
            Value::Scalar(Literal::Int(n)) => Ok(Value::Scalar(Literal::Int(n))),
            Value::Scalar(Literal::Float(f)) => Ok(Value::Scalar(Literal::Int(f.get() as i64))),
            Value::Null => Ok(Value::Null),
            other => Err(unexpected("CastToInt", other)),
        },
        F::CastToFloat(a) => match ev(a)? {
            Value::Scalar(Literal::Int(n)) => Ok(Value::Scalar(Literal::Float(FiniteFloat::new(n as f64).expect("finite cast")))),
            Value::Scalar(Literal::Float(f)) => Ok(Value::Scalar(Literal::Float(f))),
            Value::Null => Ok(Value::Null),
            other => Err(unexpected("CastToFloat", other)),
        },
        F::MinimumOf(xs) => reduce(xs, ctx, data, Ordering::Less),
        F::MaximumOf(xs) => reduce(xs, ctx, data, Ordering::Greater),
    }
}

fn unexpected(op: &'static str, value: Value) -> SqlError {
    SqlError::TypeMismatch { op, value: format!("{value:?}") }
}

fn compare(a: Value, b: Value, keep: impl Fn(Ordering) -> bool) -> Result<Value> {
    match (&a, &b) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        _ => Ok(Value::Scalar(Literal::Bool(keep(compare_values(&a, &b))))),
    }
}

fn bool_op(a: Value, b: Value, op: impl Fn(bool, bool) -> bool) -> Result<Value> {
    match (a.as_bool(), b.as_bool()) {
        (Some(x), Some(y)) => Ok(Value::Scalar(Literal::Bool(op(x, y)))),
        _ => Ok(Value::Null),
    }
}

fn as_f64(value: &Value) -> Option<(f64, bool)> {
    match value {
        Value::Scalar(Literal::Int(n)) => Some((*n as f64, true)),
        Value::Scalar(Literal::Float(f)) => Some((f.get(), false)),
        _ => None,
    }
}

fn numeric_op(a: Value, b: Value, op: impl Fn(f64, f64) -> f64) -> Result<Value> {
    match (as_f64(&a), as_f64(&b)) {
        (Some((x, x_int)), Some((y, y_int))) => {
            let result = op(x, y);
            if x_int && y_int && result.fract() == 0.0 {
                Ok(Value::Scalar(Literal::Int(result as i64)))
            } else {
                Ok(Value::Scalar(Literal::Float(FiniteFloat::new(result).expect("finite result"))))
            }
        }
        (None, _) if matches!(a, Value::Null) => Ok(Value::Null),
        (_, None) if matches!(b, Value::Null) => Ok(Value::Null),
        _ => Err(unexpected("arithmetic", a)),
    }
}

/// `lhs / NULLIF(rhs, 0)`, matching the SQL lowering's null guard
/// (spec §4.5 "Division"); `floor` additionally truncates toward
/// negative infinity.
fn divide(a: Value, b: Value, floor: bool) -> Result<Value> {
    match (as_f64(&a), as_f64(&b)) {
        (Some((x, _)), Some((y, _))) => {
            if y == 0.0 {
                return Ok(Value::Null);
            }
            let result = if floor { (x / y).floor() } else { x / y };
            Ok(Value::Scalar(Literal::Float(FiniteFloat::new(result).expect("finite division"))))
        }
        _ => Ok(Value::Null),
    }
}

fn date_part(value: Value, part: impl Fn(NaiveDate) -> i64) -> Result<Value> {
    match value {
        Value::Scalar(Literal::Date(d)) => Ok(Value::Scalar(Literal::Int(part(d)))),
        Value::Null => Ok(Value::Null),
        other => Err(unexpected("date part", other)),
    }
}

fn date_map(value: Value, map: impl Fn(NaiveDate) -> NaiveDate) -> Result<Value> {
    match value {
        Value::Scalar(Literal::Date(d)) => Ok(Value::Scalar(Literal::Date(map(d)))),
        Value::Null => Ok(Value::Null),
        other => Err(unexpected("date floor", other)),
    }
}

fn date_add(date: Value, amount: Value, add: impl Fn(NaiveDate, i64) -> NaiveDate) -> Result<Value> {
    match (date, amount) {
        (Value::Scalar(Literal::Date(d)), Value::Scalar(Literal::Int(n))) => Ok(Value::Scalar(Literal::Date(add(d, n)))),
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (other, _) => Err(unexpected("date add", other)),
    }
}

fn date_diff(a: Value, b: Value, diff: impl Fn(NaiveDate, NaiveDate) -> i64) -> Result<Value> {
    match (a, b) {
        (Value::Scalar(Literal::Date(x)), Value::Scalar(Literal::Date(y))) => Ok(Value::Scalar(Literal::Int(diff(x, y)))),
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (other, _) => Err(unexpected("date difference", other)),
    }
}

fn reduce(xs: &[NodeRef], ctx: ScalarCtx, data: &TestData, keep_when: Ordering) -> Result<Value> {
    let mut values = xs.iter().map(|x| eval_scalar(x, ctx, data)).collect::<Result<Vec<_>>>()?.into_iter();
    let mut best = values.next().expect("MinimumOf/MaximumOf require at least one operand");
    for next in values {
        if matches!(best, Value::Null) || matches!(next, Value::Null) {
            best = Value::Null;
            continue;
        }
        if compare_values(&next, &best) == keep_when {
            best = next;
        }
    }
    Ok(best)
}

fn eval_in(a: &NodeRef, b: &NodeRef, ctx: ScalarCtx, data: &TestData) -> Result<Value> {
    let lhs = eval_scalar(a, ctx, data)?;
    if matches!(lhs, Value::Null) {
        return Ok(Value::Null);
    }
    let lhs = lhs.as_scalar().cloned().ok_or_else(|| unexpected("In", lhs.clone()))?;
    match b.as_ref() {
        Node::Value(ValueLiteral::Set(set)) => Ok(Value::Scalar(Literal::Bool(set.contains(&lhs)))),
        Node::SelectColumn { source, name } if !b.domain().is_patient() => {
            let member = eval_rows(source, data)?.iter().any(|row| row.get(name).as_scalar() == Some(&lhs));
            Ok(Value::Scalar(Literal::Bool(member)))
        }
        _ => match eval_scalar(b, ctx, data)? {
            Value::Set(set) => Ok(Value::Scalar(Literal::Bool(set.contains(&lhs)))),
            Value::Scalar(rhs) => Ok(Value::Scalar(Literal::Bool(rhs == lhs))),
            Value::Null => Ok(Value::Null),
        },
    }
}
