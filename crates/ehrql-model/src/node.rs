//! The Query Model node set (spec §3).
//!
//! `Node` is a sealed, tagged-variant tree (spec §9: "implementers should
//! prefer a sealed enum"). Every node is immutable and reachable only
//! through [`NodeRef`] (an `Arc<Node>`), so the graph is automatically a DAG
//! with structural, value-based equality and hashing (spec §3 invariants
//! 1-2) — sharing a subgraph is just cloning an `Arc`.
//!
//! Nodes are never constructed bare: every variant has a validating
//! constructor function in this module that performs the spec §4.2
//! construction-time checks (type fit, domain compatibility, operator
//! constraints) and returns a [`crate::ModelError`] naming the offending
//! operands on failure.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ehrql_types::{Literal, LiteralSet, Primitive, TableSchema, TypeSpec};

use crate::domain::Domain;
use crate::error::{ModelError, Result};

/// A reference-counted, immutable handle to a node. Cloning is cheap and
/// structural equality/hashing fall out of `Arc`'s blanket impls over a
/// `PartialEq + Eq + Hash` inner type.
pub type NodeRef = Arc<Node>;

/// Which end of a sort order [`Node::PickOneRowPerPatient`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Position {
    /// The first row in sort order.
    First,
    /// The last row in sort order.
    Last,
}

/// `AggregateByPatient.*` (spec §3): collapses an event-domain series to
/// the patient domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op", content = "args")]
pub enum Aggregate {
    /// Whether the source has any rows at all, per patient.
    Exists(NodeRef),
    /// Row count per patient.
    Count(NodeRef),
    /// Minimum value per patient.
    Min(NodeRef),
    /// Maximum value per patient.
    Max(NodeRef),
    /// Sum of values per patient.
    Sum(NodeRef),
    /// Arithmetic mean per patient (always a `float` result — spec §9 Open
    /// Questions).
    Mean(NodeRef),
    /// All distinct values per patient, as a set.
    CombineAsSet(NodeRef),
}

impl Aggregate {
    fn source(&self) -> &NodeRef {
        match self {
            Self::Exists(s)
            | Self::Count(s)
            | Self::Min(s)
            | Self::Max(s)
            | Self::Sum(s)
            | Self::Mean(s)
            | Self::CombineAsSet(s) => s,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Exists(_) => "Exists",
            Self::Count(_) => "Count",
            Self::Min(_) => "Min",
            Self::Max(_) => "Max",
            Self::Sum(_) => "Sum",
            Self::Mean(_) => "Mean",
            Self::CombineAsSet(_) => "CombineAsSet",
        }
    }
}

/// Pure operators over series and values (spec §3 "Function.*").
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op", content = "args")]
pub enum Function {
    // Comparisons: bool result, operand types must match.
    Eq(NodeRef, NodeRef),
    Ne(NodeRef, NodeRef),
    Lt(NodeRef, NodeRef),
    Le(NodeRef, NodeRef),
    Gt(NodeRef, NodeRef),
    Ge(NodeRef, NodeRef),
    // Logical.
    And(NodeRef, NodeRef),
    Or(NodeRef, NodeRef),
    Not(NodeRef),
    In(NodeRef, NodeRef),
    IsNull(NodeRef),
    // Arithmetic.
    Add(NodeRef, NodeRef),
    Subtract(NodeRef, NodeRef),
    Multiply(NodeRef, NodeRef),
    TrueDivide(NodeRef, NodeRef),
    FloorDivide(NodeRef, NodeRef),
    Negate(NodeRef),
    // String.
    StringContains(NodeRef, NodeRef),
    // Date part.
    YearFromDate(NodeRef),
    MonthFromDate(NodeRef),
    DayFromDate(NodeRef),
    // Date floor.
    ToFirstOfMonth(NodeRef),
    ToFirstOfYear(NodeRef),
    // Date arithmetic.
    DateAddDays(NodeRef, NodeRef),
    DateAddMonths(NodeRef, NodeRef),
    DateAddYears(NodeRef, NodeRef),
    DateDifferenceInDays(NodeRef, NodeRef),
    DateDifferenceInMonths(NodeRef, NodeRef),
    DateDifferenceInYears(NodeRef, NodeRef),
    // Casts.
    CastToInt(NodeRef),
    CastToFloat(NodeRef),
    // Reducers (variadic).
    MinimumOf(Vec<NodeRef>),
    MaximumOf(Vec<NodeRef>),
}

impl Function {
    fn name(&self) -> &'static str {
        match self {
            Self::Eq(..) => "Eq",
            Self::Ne(..) => "Ne",
            Self::Lt(..) => "Lt",
            Self::Le(..) => "Le",
            Self::Gt(..) => "Gt",
            Self::Ge(..) => "Ge",
            Self::And(..) => "And",
            Self::Or(..) => "Or",
            Self::Not(..) => "Not",
            Self::In(..) => "In",
            Self::IsNull(..) => "IsNull",
            Self::Add(..) => "Add",
            Self::Subtract(..) => "Subtract",
            Self::Multiply(..) => "Multiply",
            Self::TrueDivide(..) => "TrueDivide",
            Self::FloorDivide(..) => "FloorDivide",
            Self::Negate(..) => "Negate",
            Self::StringContains(..) => "StringContains",
            Self::YearFromDate(..) => "YearFromDate",
            Self::MonthFromDate(..) => "MonthFromDate",
            Self::DayFromDate(..) => "DayFromDate",
            Self::ToFirstOfMonth(..) => "ToFirstOfMonth",
            Self::ToFirstOfYear(..) => "ToFirstOfYear",
            Self::DateAddDays(..) => "DateAddDays",
            Self::DateAddMonths(..) => "DateAddMonths",
            Self::DateAddYears(..) => "DateAddYears",
            Self::DateDifferenceInDays(..) => "DateDifferenceInDays",
            Self::DateDifferenceInMonths(..) => "DateDifferenceInMonths",
            Self::DateDifferenceInYears(..) => "DateDifferenceInYears",
            Self::CastToInt(..) => "CastToInt",
            Self::CastToFloat(..) => "CastToFloat",
            Self::MinimumOf(..) => "MinimumOf",
            Self::MaximumOf(..) => "MaximumOf",
        }
    }

    /// All direct operand nodes, in argument order.
    fn operands(&self) -> Vec<&NodeRef> {
        match self {
            Self::Not(a)
            | Self::IsNull(a)
            | Self::Negate(a)
            | Self::YearFromDate(a)
            | Self::MonthFromDate(a)
            | Self::DayFromDate(a)
            | Self::ToFirstOfMonth(a)
            | Self::ToFirstOfYear(a)
            | Self::CastToInt(a)
            | Self::CastToFloat(a) => vec![a],
            Self::Eq(a, b)
            | Self::Ne(a, b)
            | Self::Lt(a, b)
            | Self::Le(a, b)
            | Self::Gt(a, b)
            | Self::Ge(a, b)
            | Self::And(a, b)
            | Self::Or(a, b)
            | Self::In(a, b)
            | Self::Add(a, b)
            | Self::Subtract(a, b)
            | Self::Multiply(a, b)
            | Self::TrueDivide(a, b)
            | Self::FloorDivide(a, b)
            | Self::StringContains(a, b)
            | Self::DateAddDays(a, b)
            | Self::DateAddMonths(a, b)
            | Self::DateAddYears(a, b)
            | Self::DateDifferenceInDays(a, b)
            | Self::DateDifferenceInMonths(a, b)
            | Self::DateDifferenceInYears(a, b) => vec![a, b],
            Self::MinimumOf(xs) | Self::MaximumOf(xs) => xs.iter().collect(),
        }
    }
}

/// A scalar literal, or a frozen set of literals (spec §3 `Value`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum ValueLiteral {
    /// A single scalar.
    Scalar(Literal),
    /// A frozen, homogeneously-typed set.
    Set(LiteralSet),
}

/// A single `condition -> value` arm of a [`Node::Case`].
pub type CaseArm = (NodeRef, NodeRef);

/// A Query Model node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind")]
pub enum Node {
    /// An event-domain source table.
    SelectTable { name: String, schema: TableSchema },
    /// A patient-domain source table.
    SelectPatientTable { name: String, schema: TableSchema },
    /// A literal table embedded in the query, in the patient domain.
    InlinePatientTable {
        rows: Vec<Vec<Literal>>,
        schema: TableSchema,
    },
    /// Projects a single column; domain equals the source's domain.
    SelectColumn { source: NodeRef, name: String },
    /// Restricts rows to those where `condition` holds; domain is
    /// unchanged.
    Filter { source: NodeRef, condition: NodeRef },
    /// Adds a sort key on top of an existing sort chain (outermost =
    /// highest priority).
    Sort { source: NodeRef, sort_by: NodeRef },
    /// Picks the first or last row per patient from a `Sort` chain,
    /// yielding the patient domain.
    ///
    /// `selected_columns` starts empty at construction and is filled in
    /// by `ehrql-transform`'s "attach selected columns" pass (spec §4.4):
    /// the set of columns the lowerer must carry through the
    /// sort/partition subquery.
    PickOneRowPerPatient {
        source: NodeRef,
        position: Position,
        selected_columns: BTreeSet<String>,
    },
    /// Collapses an event-domain series to the patient domain.
    AggregateByPatient(Aggregate),
    /// A pure operator.
    Function(Function),
    /// A multi-way conditional: first matching arm wins, in insertion
    /// order; `default` is returned (or null) otherwise.
    Case {
        cases: Vec<CaseArm>,
        default: Option<NodeRef>,
    },
    /// A literal value or frozen set of literals.
    Value(ValueLiteral),
}

impl Node {
    /// The node kind's name, for error messages and the serialized shape.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::SelectTable { .. } => "SelectTable",
            Self::SelectPatientTable { .. } => "SelectPatientTable",
            Self::InlinePatientTable { .. } => "InlinePatientTable",
            Self::SelectColumn { .. } => "SelectColumn",
            Self::Filter { .. } => "Filter",
            Self::Sort { .. } => "Sort",
            Self::PickOneRowPerPatient { .. } => "PickOneRowPerPatient",
            Self::AggregateByPatient(agg) => agg.name(),
            Self::Function(func) => func.name(),
            Self::Case { .. } => "Case",
            Self::Value(_) => "Value",
        }
    }

    /// This node's domain (spec §3: "computed structurally from the
    /// node").
    pub fn domain(&self) -> Domain {
        match self {
            Node::SelectTable { .. } | Node::Filter { .. } | Node::Sort { .. } => {
                Domain::Event(Arc::new(self.clone()))
            }
            Node::SelectPatientTable { .. }
            | Node::InlinePatientTable { .. }
            | Node::PickOneRowPerPatient { .. }
            | Node::AggregateByPatient(_)
            | Node::Value(_) => Domain::Patient,
            Node::SelectColumn { source, .. } => source.domain(),
            Node::Function(func) => func
                .operands()
                .into_iter()
                .map(|operand| operand.domain())
                .fold(Domain::Patient, |acc, d| acc.combine(&d)),
            Node::Case { cases, default } => {
                let mut domain = Domain::Patient;
                for (cond, value) in cases {
                    domain = domain.combine(&cond.domain()).combine(&value.domain());
                }
                if let Some(default) = default {
                    domain = domain.combine(&default.domain());
                }
                domain
            }
        }
    }

    /// This node's result [`TypeSpec`], recomputed structurally rather than
    /// cached — every node was validated at construction, so this never
    /// fails for a node reachable through the public constructors.
    pub fn result_type(&self) -> TypeSpec {
        match self {
            Node::SelectTable { .. } | Node::SelectPatientTable { .. } | Node::InlinePatientTable { .. } => {
                // A table reference has no scalar type of its own; callers
                // select a column first. Represented as `Any` here since
                // the node set has no "row" type.
                TypeSpec::Any
            }
            Node::SelectColumn { source, name } => column_type(source, name),
            Node::Filter { source, .. } => source.result_type(),
            Node::Sort { source, .. } => source.result_type(),
            Node::PickOneRowPerPatient { source, .. } => source.result_type(),
            Node::AggregateByPatient(agg) => aggregate_result_type(agg),
            Node::Function(func) => function_result_type(func),
            Node::Case { cases, default } => {
                cases
                    .first()
                    .map(|(_, value)| value.result_type())
                    .or_else(|| default.as_ref().map(|d| d.result_type()))
                    .unwrap_or(TypeSpec::Any)
            }
            Node::Value(ValueLiteral::Scalar(literal)) => TypeSpec::Primitive(literal.primitive()),
            Node::Value(ValueLiteral::Set(set)) => {
                ehrql_types::get_typespec_set(set).unwrap_or(TypeSpec::Any)
            }
        }
    }
}

fn column_type(source: &NodeRef, name: &str) -> TypeSpec {
    find_schema(source)
        .and_then(|schema| schema.column(name))
        .map(|column| TypeSpec::Primitive(column.primitive()))
        .unwrap_or(TypeSpec::Any)
}

/// Walk down through domain-preserving wrapper nodes to find the schema a
/// column selection should resolve against.
fn find_schema(node: &NodeRef) -> Option<&TableSchema> {
    match node.as_ref() {
        Node::SelectTable { schema, .. }
        | Node::SelectPatientTable { schema, .. }
        | Node::InlinePatientTable { schema, .. } => Some(schema),
        Node::Filter { source, .. } | Node::Sort { source, .. } | Node::PickOneRowPerPatient { source, .. } => {
            find_schema(source)
        }
        _ => None,
    }
}

fn aggregate_result_type(agg: &Aggregate) -> TypeSpec {
    match agg {
        Aggregate::Exists(_) => TypeSpec::Primitive(Primitive::Bool),
        Aggregate::Count(_) => TypeSpec::Primitive(Primitive::Int),
        Aggregate::Min(s) | Aggregate::Max(s) => s.result_type(),
        Aggregate::Sum(s) => s.result_type(),
        Aggregate::Mean(_) => TypeSpec::Primitive(Primitive::Float),
        Aggregate::CombineAsSet(s) => TypeSpec::Set(Box::new(s.result_type())),
    }
}

fn is_numeric(t: &TypeSpec) -> bool {
    matches!(t, TypeSpec::Primitive(Primitive::Int) | TypeSpec::Primitive(Primitive::Float))
}

fn promote_numeric(a: &TypeSpec, b: &TypeSpec) -> TypeSpec {
    if matches!(a, TypeSpec::Primitive(Primitive::Float)) || matches!(b, TypeSpec::Primitive(Primitive::Float)) {
        TypeSpec::Primitive(Primitive::Float)
    } else {
        TypeSpec::Primitive(Primitive::Int)
    }
}

fn function_result_type(func: &Function) -> TypeSpec {
    use Function as F;
    let bool_t = TypeSpec::Primitive(Primitive::Bool);
    let int_t = TypeSpec::Primitive(Primitive::Int);
    let float_t = TypeSpec::Primitive(Primitive::Float);
    let date_t = TypeSpec::Primitive(Primitive::Date);
    match func {
        F::Eq(..) | F::Ne(..) | F::Lt(..) | F::Le(..) | F::Gt(..) | F::Ge(..) => bool_t,
        F::And(..) | F::Or(..) | F::Not(..) | F::In(..) | F::IsNull(..) => bool_t,
        F::Add(a, b) | F::Subtract(a, b) | F::Multiply(a, b) => {
            promote_numeric(&a.result_type(), &b.result_type())
        }
        F::TrueDivide(..) => float_t,
        F::FloorDivide(a, b) => promote_numeric(&a.result_type(), &b.result_type()),
        F::Negate(a) => a.result_type(),
        F::StringContains(..) => bool_t,
        F::YearFromDate(..) | F::MonthFromDate(..) | F::DayFromDate(..) => int_t,
        F::ToFirstOfMonth(..) | F::ToFirstOfYear(..) => date_t,
        F::DateAddDays(..) | F::DateAddMonths(..) | F::DateAddYears(..) => date_t,
        F::DateDifferenceInDays(..) | F::DateDifferenceInMonths(..) | F::DateDifferenceInYears(..) => int_t,
        F::CastToInt(..) => int_t,
        F::CastToFloat(..) => float_t,
        F::MinimumOf(xs) | F::MaximumOf(xs) => {
            xs.first().map(|x| x.result_type()).unwrap_or(TypeSpec::Any)
        }
    }
}

// ---------------------------------------------------------------------
// Validating constructors (spec §4.2).
// ---------------------------------------------------------------------

fn expect_type(operator: &'static str, node: &NodeRef, expected: &TypeSpec) -> Result<()> {
    let actual = node.result_type();
    let mut bindings = ehrql_types::Bindings::new();
    if ehrql_types::match_typespec(&actual, expected, &mut bindings) {
        Ok(())
    } else {
        Err(ModelError::type_mismatch(operator, expected, &actual, node.kind_name()))
    }
}

fn expect_domain_compatible(operator: &'static str, a: &NodeRef, b: &NodeRef) -> Result<()> {
    let (da, db) = (a.domain(), b.domain());
    if da.compatible_with(&db) {
        Ok(())
    } else {
        Err(ModelError::DomainMismatch { operator, left: da, right: db })
    }
}

fn expect_same_type(operator: &'static str, a: &NodeRef, b: &NodeRef) -> Result<()> {
    let (ta, tb) = (a.result_type(), b.result_type());
    let mut bindings = ehrql_types::Bindings::new();
    if !ehrql_types::match_typespec(&ta, &TypeSpec::Var("T".into()), &mut bindings) {
        return Err(ModelError::type_mismatch(operator, &ta, &tb, b.kind_name()));
    }
    let bound = bindings.get("T").cloned().expect("variable just bound above");
    if ehrql_types::match_typespec(&tb, &bound, &mut bindings) {
        Ok(())
    } else {
        Err(ModelError::type_mismatch(operator, &ta, &tb, b.kind_name()))
    }
}

/// `In`'s element-type check (spec §4.2 "literal-value fit"): `a`'s type
/// must match `b`'s element type — `b` is either a `Set[T]` (a frozen
/// literal set) or an event-domain `Series[T]` (another column) — and if
/// that element type is `Code`, every code literal found in `a`/`b` must
/// share one `CodeSystem`.
fn expect_in_compatible(operator: &'static str, a: &NodeRef, b: &NodeRef) -> Result<()> {
    let (ta, tb) = (a.result_type(), b.result_type());
    let element = match &tb {
        TypeSpec::Set(element) | TypeSpec::Series(element) => element.as_ref().clone(),
        _ => return Err(ModelError::type_mismatch(operator, &TypeSpec::Set(Box::new(ta)), &tb, b.kind_name())),
    };
    let mut bindings = ehrql_types::Bindings::new();
    if !ehrql_types::match_typespec(&ta, &element, &mut bindings) {
        return Err(ModelError::type_mismatch(operator, &element, &ta, a.kind_name()));
    }
    if element == TypeSpec::Primitive(Primitive::Code) {
        expect_single_code_system(operator, a, b)?;
    }
    Ok(())
}

/// Collects every `Code` literal reachable from `a` (a literal scalar) and
/// `b` (a literal set) and rejects a mix of code systems.
fn expect_single_code_system(operator: &'static str, a: &NodeRef, b: &NodeRef) -> Result<()> {
    let mut systems = Vec::new();
    if let Node::Value(ValueLiteral::Scalar(Literal::Code(code))) = a.as_ref() {
        systems.push(code.system());
    }
    if let Node::Value(ValueLiteral::Set(set)) = b.as_ref() {
        systems.extend(set.iter().filter_map(|literal| match literal {
            Literal::Code(code) => Some(code.system()),
            _ => None,
        }));
    }
    let Some(first) = systems.first().copied() else {
        return Ok(());
    };
    if let Some(other) = systems.iter().copied().find(|system| *system != first) {
        return Err(ModelError::InvalidLiteral(format!(
            "{operator}: an In-set of Code values must share a single code system, found {first:?} and {other:?}"
        )));
    }
    Ok(())
}

impl Node {
    /// Construct an event-domain source table reference.
    pub fn select_table(name: impl Into<String>, schema: TableSchema) -> NodeRef {
        Arc::new(Node::SelectTable { name: name.into(), schema })
    }

    /// Construct a patient-domain source table reference.
    pub fn select_patient_table(name: impl Into<String>, schema: TableSchema) -> NodeRef {
        Arc::new(Node::SelectPatientTable { name: name.into(), schema })
    }

    /// Construct a literal, patient-domain inline table. Validates that
    /// every row's arity matches the schema (spec §3 invariant 7).
    pub fn inline_patient_table(rows: Vec<Vec<Literal>>, schema: TableSchema) -> Result<NodeRef> {
        for row in &rows {
            if row.len() != schema.columns().len() {
                return Err(ModelError::InvalidLiteral(format!(
                    "inline table row has {} values, schema {} expects {}",
                    row.len(),
                    schema.name(),
                    schema.columns().len()
                )));
            }
        }
        Ok(Arc::new(Node::InlinePatientTable { rows, schema }))
    }

    /// Project a column from `source`. Fails if the column is not present
    /// in `source`'s schema.
    pub fn select_column(source: NodeRef, name: impl Into<String>) -> Result<NodeRef> {
        let name = name.into();
        let schema = find_schema(&source).ok_or_else(|| ModelError::SchemaMismatch {
            kind: "table",
            name: format!("{:?}", source.kind_name()),
        })?;
        if !schema.has_column(&name) {
            return Err(ModelError::SchemaMismatch { kind: "column", name });
        }
        Ok(Arc::new(Node::SelectColumn { source, name }))
    }

    /// Filter `source` by `condition`. `condition` must be a bool series
    /// whose domain equals `source`'s (or the patient domain — spec §3
    /// invariant 3).
    pub fn filter(source: NodeRef, condition: NodeRef) -> Result<NodeRef> {
        expect_type("Filter", &condition, &TypeSpec::Primitive(Primitive::Bool))?;
        expect_domain_compatible("Filter", &source, &condition)?;
        Ok(Arc::new(Node::Filter { source, condition }))
    }

    /// Stack a sort key on top of `source`'s existing sort chain.
    /// `sort_by`'s domain must match `source`.
    pub fn sort(source: NodeRef, sort_by: NodeRef) -> Result<NodeRef> {
        expect_domain_compatible("Sort", &source, &sort_by)?;
        Ok(Arc::new(Node::Sort { source, sort_by }))
    }

    /// Pick the first or last row per patient. `source` must be a `Sort`
    /// (spec §3 invariant 4).
    pub fn pick_one_row_per_patient(source: NodeRef, position: Position) -> Result<NodeRef> {
        if !matches!(source.as_ref(), Node::Sort { .. }) {
            return Err(ModelError::PickRequiresSort);
        }
        Ok(Arc::new(Node::PickOneRowPerPatient { source, position, selected_columns: BTreeSet::new() }))
    }

    /// Rebuild a `PickOneRowPerPatient` node with `selected_columns`
    /// replaced. Used only by `ehrql-transform`'s rebuild pass — the
    /// source and position are assumed already valid, since they are
    /// carried over unchanged from a previously-validated node.
    pub fn with_selected_columns(source: NodeRef, position: Position, selected_columns: BTreeSet<String>) -> NodeRef {
        Arc::new(Node::PickOneRowPerPatient { source, position, selected_columns })
    }

    /// Construct an `AggregateByPatient.*` node. The source must be in an
    /// event domain — aggregating an already-patient-domain series (at
    /// most one row per patient already) is not meaningful.
    pub fn aggregate(agg: Aggregate) -> Result<NodeRef> {
        if agg.source().domain().is_patient() {
            return Err(ModelError::InvalidLiteral(format!(
                "{} requires an event-domain source, found a patient-domain series",
                agg.name()
            )));
        }
        Ok(Arc::new(Node::AggregateByPatient(agg)))
    }

    /// Construct a `Case` expression. Every arm's value, and `default` if
    /// present, must share a common type (spec §3 invariant 5); condition
    /// keys must be unique and bool-typed.
    pub fn case(cases: Vec<CaseArm>, default: Option<NodeRef>) -> Result<NodeRef> {
        if cases.is_empty() {
            return Err(ModelError::CaseTypeMismatch("Case requires at least one arm".into()));
        }
        let mut seen_conditions = std::collections::HashSet::new();
        for (condition, _) in &cases {
            expect_type("Case", condition, &TypeSpec::Primitive(Primitive::Bool))?;
            if !seen_conditions.insert(condition.clone()) {
                return Err(ModelError::CaseTypeMismatch("Case condition repeated".into()));
            }
        }
        let first_value_type = cases[0].1.result_type();
        for (_, value) in &cases[1..] {
            let mut bindings = ehrql_types::Bindings::new();
            if !ehrql_types::match_typespec(&value.result_type(), &first_value_type, &mut bindings) {
                return Err(ModelError::CaseTypeMismatch(format!(
                    "arm type {} does not match first arm type {first_value_type}",
                    value.result_type()
                )));
            }
        }
        if let Some(default) = &default {
            let mut bindings = ehrql_types::Bindings::new();
            if !ehrql_types::match_typespec(&default.result_type(), &first_value_type, &mut bindings) {
                return Err(ModelError::CaseTypeMismatch(format!(
                    "default type {} does not match arm type {first_value_type}",
                    default.result_type()
                )));
            }
        }
        Ok(Arc::new(Node::Case { cases, default }))
    }

    /// Construct a scalar literal value node.
    pub fn value_scalar(literal: Literal) -> NodeRef {
        Arc::new(Node::Value(ValueLiteral::Scalar(literal)))
    }

    /// Construct a frozen-set literal value node.
    pub fn value_set(set: LiteralSet) -> NodeRef {
        Arc::new(Node::Value(ValueLiteral::Set(set)))
    }
}

/// Construct a validated [`Function`] node, checking the operator's
/// arity/type/domain constraints before wrapping it.
pub fn function(kind: FunctionBuilder) -> Result<NodeRef> {
    kind.build()
}

/// A builder-method-per-operator entry point kept separate from [`Function`]
/// itself so that validation logic lives next to construction rather than
/// being duplicated at every call site (surface builder included).
pub enum FunctionBuilder {
    /// `a == b`.
    Eq(NodeRef, NodeRef),
    /// `a != b`.
    Ne(NodeRef, NodeRef),
    /// `a < b`.
    Lt(NodeRef, NodeRef),
    /// `a <= b`.
    Le(NodeRef, NodeRef),
    /// `a > b`.
    Gt(NodeRef, NodeRef),
    /// `a >= b`.
    Ge(NodeRef, NodeRef),
    /// `a & b`.
    And(NodeRef, NodeRef),
    /// `a | b`.
    Or(NodeRef, NodeRef),
    /// `!a`.
    Not(NodeRef),
    /// `a.is_in(b)`, `b` a `Set[T]` or event-domain `Series[T]`.
    In(NodeRef, NodeRef),
    /// `a.is_null()`.
    IsNull(NodeRef),
    /// `a + b`.
    Add(NodeRef, NodeRef),
    /// `a - b`.
    Subtract(NodeRef, NodeRef),
    /// `a * b`.
    Multiply(NodeRef, NodeRef),
    /// `a / b`, always float, null on division by zero (lowering concern).
    TrueDivide(NodeRef, NodeRef),
    /// `a // b`, null on division by zero (lowering concern).
    FloorDivide(NodeRef, NodeRef),
    /// `-a`.
    Negate(NodeRef),
    /// `a.contains(b)`.
    StringContains(NodeRef, NodeRef),
    /// `a.year`.
    YearFromDate(NodeRef),
    /// `a.month`.
    MonthFromDate(NodeRef),
    /// `a.day`.
    DayFromDate(NodeRef),
    /// `a.to_first_of_month()`.
    ToFirstOfMonth(NodeRef),
    /// `a.to_first_of_year()`.
    ToFirstOfYear(NodeRef),
    /// `a + N days`.
    DateAddDays(NodeRef, NodeRef),
    /// `a + N months`.
    DateAddMonths(NodeRef, NodeRef),
    /// `a + N years`.
    DateAddYears(NodeRef, NodeRef),
    /// `(a - b).days`.
    DateDifferenceInDays(NodeRef, NodeRef),
    /// `(a - b).months`.
    DateDifferenceInMonths(NodeRef, NodeRef),
    /// `(a - b).years`.
    DateDifferenceInYears(NodeRef, NodeRef),
    /// Cast to int.
    CastToInt(NodeRef),
    /// Cast to float.
    CastToFloat(NodeRef),
    /// `minimum_of(*args)`. Empty input is a construction error (spec §9
    /// Open Questions).
    MinimumOf(Vec<NodeRef>),
    /// `maximum_of(*args)`. Empty input is a construction error.
    MaximumOf(Vec<NodeRef>),
}

impl FunctionBuilder {
    fn build(self) -> Result<NodeRef> {
        let bool_t = TypeSpec::Primitive(Primitive::Bool);
        let date_t = TypeSpec::Primitive(Primitive::Date);
        let str_t = TypeSpec::Primitive(Primitive::Str);
        let int_t = TypeSpec::Primitive(Primitive::Int);
        // Captured before `self` is destructured by the match below, so the
        // arms can still name the operator in error messages.
        let name = self.name();
        match self {
            Self::Eq(a, b) => {
                expect_same_type(name, &a, &b)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::Eq(a, b))))
            }
            Self::Ne(a, b) => {
                expect_same_type(name, &a, &b)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::Ne(a, b))))
            }
            Self::Lt(a, b) => {
                expect_same_type(name, &a, &b)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::Lt(a, b))))
            }
            Self::Le(a, b) => {
                expect_same_type(name, &a, &b)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::Le(a, b))))
            }
            Self::Gt(a, b) => {
                expect_same_type(name, &a, &b)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::Gt(a, b))))
            }
            Self::Ge(a, b) => {
                expect_same_type(name, &a, &b)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::Ge(a, b))))
            }
            Self::And(a, b) => {
                expect_type(name, &a, &bool_t)?;
                expect_type(name, &b, &bool_t)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::And(a, b))))
            }
            Self::Or(a, b) => {
                expect_type(name, &a, &bool_t)?;
                expect_type(name, &b, &bool_t)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::Or(a, b))))
            }
            Self::Not(a) => {
                expect_type(name, &a, &bool_t)?;
                Ok(Arc::new(Node::Function(Function::Not(a))))
            }
            Self::IsNull(a) => Ok(Arc::new(Node::Function(Function::IsNull(a)))),
            Self::In(a, b) => {
                expect_in_compatible(name, &a, &b)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::In(a, b))))
            }
            Self::Add(a, b) => {
                check_numeric_pair(name, &a, &b)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::Add(a, b))))
            }
            Self::Subtract(a, b) => {
                check_numeric_pair(name, &a, &b)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::Subtract(a, b))))
            }
            Self::Multiply(a, b) => {
                check_numeric_pair(name, &a, &b)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::Multiply(a, b))))
            }
            Self::TrueDivide(a, b) => {
                check_numeric_pair(name, &a, &b)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::TrueDivide(a, b))))
            }
            Self::FloorDivide(a, b) => {
                check_numeric_pair(name, &a, &b)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::FloorDivide(a, b))))
            }
            Self::Negate(a) => {
                if !is_numeric(&a.result_type()) {
                    return Err(ModelError::type_mismatch(name, &TypeSpec::Primitive(Primitive::Float), &a.result_type(), a.kind_name()));
                }
                Ok(Arc::new(Node::Function(Function::Negate(a))))
            }
            Self::StringContains(a, b) => {
                expect_type(name, &a, &str_t)?;
                expect_type(name, &b, &str_t)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::StringContains(a, b))))
            }
            Self::YearFromDate(a) => {
                expect_type(name, &a, &date_t)?;
                Ok(Arc::new(Node::Function(Function::YearFromDate(a))))
            }
            Self::MonthFromDate(a) => {
                expect_type(name, &a, &date_t)?;
                Ok(Arc::new(Node::Function(Function::MonthFromDate(a))))
            }
            Self::DayFromDate(a) => {
                expect_type(name, &a, &date_t)?;
                Ok(Arc::new(Node::Function(Function::DayFromDate(a))))
            }
            Self::ToFirstOfMonth(a) => {
                expect_type(name, &a, &date_t)?;
                Ok(Arc::new(Node::Function(Function::ToFirstOfMonth(a))))
            }
            Self::ToFirstOfYear(a) => {
                expect_type(name, &a, &date_t)?;
                Ok(Arc::new(Node::Function(Function::ToFirstOfYear(a))))
            }
            Self::DateAddDays(a, b) => {
                expect_type(name, &a, &date_t)?;
                expect_type(name, &b, &int_t)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::DateAddDays(a, b))))
            }
            Self::DateAddMonths(a, b) => {
                expect_type(name, &a, &date_t)?;
                expect_type(name, &b, &int_t)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::DateAddMonths(a, b))))
            }
            Self::DateAddYears(a, b) => {
                expect_type(name, &a, &date_t)?;
                expect_type(name, &b, &int_t)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::DateAddYears(a, b))))
            }
            Self::DateDifferenceInDays(a, b) => {
                expect_type(name, &a, &date_t)?;
                expect_type(name, &b, &date_t)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::DateDifferenceInDays(a, b))))
            }
            Self::DateDifferenceInMonths(a, b) => {
                expect_type(name, &a, &date_t)?;
                expect_type(name, &b, &date_t)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::DateDifferenceInMonths(a, b))))
            }
            Self::DateDifferenceInYears(a, b) => {
                expect_type(name, &a, &date_t)?;
                expect_type(name, &b, &date_t)?;
                expect_domain_compatible(name, &a, &b)?;
                Ok(Arc::new(Node::Function(Function::DateDifferenceInYears(a, b))))
            }
            Self::CastToInt(a) => Ok(Arc::new(Node::Function(Function::CastToInt(a)))),
            Self::CastToFloat(a) => Ok(Arc::new(Node::Function(Function::CastToFloat(a)))),
            Self::MinimumOf(xs) => {
                if xs.is_empty() {
                    return Err(ModelError::InvalidLiteral(format!("{name} requires at least one argument")));
                }
                for pair in xs.windows(2) {
                    expect_domain_compatible(name, &pair[0], &pair[1])?;
                }
                Ok(Arc::new(Node::Function(Function::MinimumOf(xs))))
            }
            Self::MaximumOf(xs) => {
                if xs.is_empty() {
                    return Err(ModelError::InvalidLiteral(format!("{name} requires at least one argument")));
                }
                for pair in xs.windows(2) {
                    expect_domain_compatible(name, &pair[0], &pair[1])?;
                }
                Ok(Arc::new(Node::Function(Function::MaximumOf(xs))))
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Eq(..) => "Eq",
            Self::Ne(..) => "Ne",
            Self::Lt(..) => "Lt",
            Self::Le(..) => "Le",
            Self::Gt(..) => "Gt",
            Self::Ge(..) => "Ge",
            Self::And(..) => "And",
            Self::Or(..) => "Or",
            Self::Not(..) => "Not",
            Self::In(..) => "In",
            Self::IsNull(..) => "IsNull",
            Self::Add(..) => "Add",
            Self::Subtract(..) => "Subtract",
            Self::Multiply(..) => "Multiply",
            Self::TrueDivide(..) => "TrueDivide",
            Self::FloorDivide(..) => "FloorDivide",
            Self::Negate(..) => "Negate",
            Self::StringContains(..) => "StringContains",
            Self::YearFromDate(..) => "YearFromDate",
            Self::MonthFromDate(..) => "MonthFromDate",
            Self::DayFromDate(..) => "DayFromDate",
            Self::ToFirstOfMonth(..) => "ToFirstOfMonth",
            Self::ToFirstOfYear(..) => "ToFirstOfYear",
            Self::DateAddDays(..) => "DateAddDays",
            Self::DateAddMonths(..) => "DateAddMonths",
            Self::DateAddYears(..) => "DateAddYears",
            Self::DateDifferenceInDays(..) => "DateDifferenceInDays",
            Self::DateDifferenceInMonths(..) => "DateDifferenceInMonths",
            Self::DateDifferenceInYears(..) => "DateDifferenceInYears",
            Self::CastToInt(..) => "CastToInt",
            Self::CastToFloat(..) => "CastToFloat",
            Self::MinimumOf(..) => "MinimumOf",
            Self::MaximumOf(..) => "MaximumOf",
        }
    }

}

/// Both operands of an arithmetic binary operator must be numeric (spec
/// §3 "Function.*" arithmetic group).
fn check_numeric_pair(operator: &'static str, a: &NodeRef, b: &NodeRef) -> Result<()> {
    if !is_numeric(&a.result_type()) {
        return Err(ModelError::type_mismatch(operator, &TypeSpec::Primitive(Primitive::Float), &a.result_type(), a.kind_name()));
    }
    if !is_numeric(&b.result_type()) {
        return Err(ModelError::type_mismatch(operator, &TypeSpec::Primitive(Primitive::Float), &b.result_type(), b.kind_name()));
    }
    Ok(())
}

/// Insertion-ordered condition→value arms, used to build a [`Node::Case`].
pub type CaseBuilder = BTreeMap<usize, CaseArm>;

#[cfg(test)]
mod tests {
    use super::*;
    use ehrql_types::Column;

    fn patients_schema() -> TableSchema {
        TableSchema::new(
            "patients",
            vec![
                Column::new("patient_id", Primitive::Int, vec![]).unwrap(),
                Column::new("sex", Primitive::Str, vec![]).unwrap(),
            ],
        )
        .unwrap()
    }

    fn events_schema() -> TableSchema {
        TableSchema::new(
            "clinical_events",
            vec![
                Column::new("patient_id", Primitive::Int, vec![]).unwrap(),
                Column::new("value", Primitive::Float, vec![]).unwrap(),
                Column::new("date", Primitive::Date, vec![]).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn select_column_rejects_unknown_name() {
        let table = Node::select_patient_table("patients", patients_schema());
        assert!(matches!(
            Node::select_column(table, "nope"),
            Err(ModelError::SchemaMismatch { kind: "column", .. })
        ));
    }

    #[test]
    fn filter_rejects_non_bool_condition() {
        let table = Node::select_table("clinical_events", events_schema());
        let value_col = Node::select_column(table.clone(), "value").unwrap();
        assert!(matches!(Node::filter(table, value_col), Err(ModelError::TypeMismatch { .. })));
    }

    #[test]
    fn pick_one_row_requires_sort_source() {
        let table = Node::select_table("clinical_events", events_schema());
        assert!(matches!(
            Node::pick_one_row_per_patient(table, Position::First),
            Err(ModelError::PickRequiresSort)
        ));
    }

    #[test]
    fn add_rejects_string_operand() {
        let table = Node::select_table("clinical_events", events_schema());
        let date_col = Node::select_column(table, "date").unwrap();
        let one = Node::value_scalar(Literal::Int(1));
        assert!(matches!(
            function(FunctionBuilder::Add(date_col, one)),
            Err(ModelError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn comparison_requires_matching_operand_types() {
        let table = Node::select_table("clinical_events", events_schema());
        let value_col = Node::select_column(table, "value").unwrap();
        let text = Node::value_scalar(Literal::Str("x".into()));
        assert!(matches!(
            function(FunctionBuilder::Eq(value_col, text)),
            Err(ModelError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn aggregate_rejects_patient_domain_source() {
        let table = Node::select_patient_table("patients", patients_schema());
        let patient_id = Node::select_column(table, "patient_id").unwrap();
        assert!(Node::aggregate(Aggregate::Sum(patient_id)).is_err());
    }

    #[test]
    fn case_requires_consistent_arm_types() {
        let table = Node::select_table("clinical_events", events_schema());
        let value_col = Node::select_column(table, "value").unwrap();
        let cond = function(FunctionBuilder::Gt(value_col.clone(), Node::value_scalar(Literal::Float(
            ehrql_types::FiniteFloat::new(0.0).unwrap(),
        ))))
        .unwrap();
        let mismatched = Node::value_scalar(Literal::Str("oops".into()));
        assert!(matches!(
            Node::case(vec![(cond, value_col)], Some(mismatched)),
            Err(ModelError::CaseTypeMismatch(_))
        ));
    }

    #[test]
    fn in_rejects_a_set_of_a_different_element_type() {
        let table = Node::select_table("clinical_events", events_schema());
        let value_col = Node::select_column(table, "value").unwrap();
        let codes = Node::value_set(LiteralSet::new([Literal::Str("x".into())]).unwrap());
        assert!(matches!(function(FunctionBuilder::In(value_col, codes)), Err(ModelError::TypeMismatch { .. })));
    }

    #[test]
    fn in_rejects_a_set_of_codes_spanning_more_than_one_code_system() {
        let snomed = ehrql_types::Code::new(ehrql_types::CodeSystem::SnomedCt, "123456").unwrap();
        let icd10 = ehrql_types::Code::new(ehrql_types::CodeSystem::Icd10, "A01").unwrap();
        let series = Node::value_scalar(Literal::Code(snomed));
        let mixed = Node::value_set(LiteralSet::new([Literal::Code(icd10)]).unwrap());
        assert!(matches!(function(FunctionBuilder::In(series, mixed)), Err(ModelError::InvalidLiteral(_))));
    }

    #[test]
    fn domain_of_filter_is_event_domain() {
        let table = Node::select_table("clinical_events", events_schema());
        let value_col = Node::select_column(table.clone(), "value").unwrap();
        let cond = function(FunctionBuilder::Gt(
            value_col,
            Node::value_scalar(Literal::Float(ehrql_types::FiniteFloat::new(0.0).unwrap())),
        ))
        .unwrap();
        let filtered = Node::filter(table, cond).unwrap();
        assert!(!filtered.domain().is_patient());
    }
}
