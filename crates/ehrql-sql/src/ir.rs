//! A small structured-document IR for SQL text (spec §4.5): accumulate
//! typed pieces, then render on demand rather than building up a raw
//! string at every call site.

/// A scalar SQL expression, rendered on demand rather than built up as
/// a raw string at every call site.
#[derive(Debug, Clone)]
pub enum SqlExpr {
    /// `alias.name`.
    Column { alias: String, name: String },
    /// Already-rendered SQL text (a literal, a dialect-generated
    /// function call, ...), trusted as-is.
    Raw(String),
    Binary { op: &'static str, lhs: Box<SqlExpr>, rhs: Box<SqlExpr> },
    Unary { op: &'static str, expr: Box<SqlExpr> },
    Call { name: String, args: Vec<SqlExpr> },
    Case { arms: Vec<(SqlExpr, SqlExpr)>, default: Option<Box<SqlExpr>> },
}

impl SqlExpr {
    pub fn column(alias: impl Into<String>, name: impl Into<String>) -> Self {
        SqlExpr::Column { alias: alias.into(), name: name.into() }
    }

    pub fn binary(op: &'static str, lhs: SqlExpr, rhs: SqlExpr) -> Self {
        SqlExpr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn unary(op: &'static str, expr: SqlExpr) -> Self {
        SqlExpr::Unary { op, expr: Box::new(expr) }
    }

    pub fn render(&self) -> String {
        match self {
            SqlExpr::Column { alias, name } => format!("{alias}.{name}"),
            SqlExpr::Raw(text) => text.clone(),
            SqlExpr::Binary { op, lhs, rhs } => format!("({} {op} {})", lhs.render(), rhs.render()),
            SqlExpr::Unary { op, expr } => format!("({op} {})", expr.render()),
            SqlExpr::Call { name, args } => {
                format!("{name}({})", args.iter().map(SqlExpr::render).collect::<Vec<_>>().join(", "))
            }
            SqlExpr::Case { arms, default } => {
                let mut sql = String::from("CASE");
                for (cond, value) in arms {
                    sql.push_str(&format!(" WHEN {} THEN {}", cond.render(), value.render()));
                }
                if let Some(default) = default {
                    sql.push_str(&format!(" ELSE {}", default.render()));
                }
                sql.push_str(" END");
                sql
            }
        }
    }
}

/// A single `LEFT JOIN` clause, joining `from_sql AS alias` onto the
/// enclosing query's patient-identity column (spec §4.5 "Patient
/// joins").
#[derive(Debug, Clone)]
pub struct Join {
    pub alias: String,
    pub from_sql: String,
}

/// A fully-assembled per-variable query: a scalar expression plus
/// every subquery it must be joined against to resolve (spec §4.5).
#[derive(Debug, Clone)]
pub struct CompiledVariable {
    pub name: String,
    pub expr: SqlExpr,
    pub joins: Vec<Join>,
}

impl CompiledVariable {
    /// Render this variable as `SELECT <patient_id_alias>.patient_id,
    /// <expr> AS <name> FROM <base> LEFT JOIN ...`.
    pub fn render(&self, base_alias: &str, base_from_sql: &str) -> String {
        let mut sql = format!(
            "SELECT {base_alias}.patient_id, {} AS {} FROM {base_from_sql} AS {base_alias}",
            self.expr.render(),
            self.name
        );
        for join in &self.joins {
            sql.push_str(&format!(
                " LEFT JOIN {} AS {} ON {}.patient_id = {base_alias}.patient_id",
                join.from_sql, join.alias, join.alias
            ));
        }
        sql
    }
}
