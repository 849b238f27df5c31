//! MSSQL-like dialect (spec §4.6): `SELECT * INTO #tmp` session-scoped
//! temp tables, `DATEADD`/`DATEFROMPARTS` date arithmetic, clustered
//! index on the partition key, CTE-wrapped aggregates, and a
//! two-step schema-then-insert staging path when a persistent temp
//! database is configured.

use ehrql_types::Literal;

use crate::dialect::{Dialect, InlineTablePlacement};
use crate::error::Result;

/// A persistent temp-database name, if configured (spec §4.6: "When a
/// persistent temp-database name is configured, results are staged
/// into `<tempdb>..results_<uuid>`").
pub struct MssqlDialect {
    pub persistent_tempdb: Option<String>,
}

impl MssqlDialect {
    pub fn session_scoped() -> Self {
        Self { persistent_tempdb: None }
    }

    pub fn with_persistent_tempdb(name: impl Into<String>) -> Self {
        Self { persistent_tempdb: Some(name.into()) }
    }

    fn table_prefix(&self, name: &str) -> String {
        match &self.persistent_tempdb {
            Some(db) => format!("{db}..{name}"),
            None => format!("#{name}"),
        }
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn literal_sql(&self, literal: &Literal) -> Result<String> {
        Ok(match literal {
            Literal::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Literal::Int(n) => n.to_string(),
            Literal::Float(f) => f.get().to_string(),
            Literal::Str(s) => format!("'{}'", s.replace('\'', "''")),
            Literal::Code(code) => format!("'{}'", code.to_string().replace('\'', "''")),
            Literal::Date(date) => {
                // YYYYMMDD avoids MSSQL's locale-sensitive string-to-date
                // binding (spec §4.5).
                format!("'{}'", date.format("%Y%m%d"))
            }
        })
    }

    fn aggregate_needs_cte(&self) -> bool {
        true
    }

    fn calculate_mean(&self, avg_expr: &str) -> String {
        format!("AVG(CAST({avg_expr} AS FLOAT))")
    }

    fn date_add_days(&self, date_expr: &str, days_expr: &str) -> String {
        format!("DATEADD(day, {days_expr}, {date_expr})")
    }

    fn date_add_months(&self, date_expr: &str, months_expr: &str) -> String {
        format!("DATEADD(month, {months_expr}, {date_expr})")
    }

    fn date_add_years(&self, date_expr: &str, years_expr: &str) -> String {
        format!("DATEADD(year, {years_expr}, {date_expr})")
    }

    fn date_diff_days(&self, a_expr: &str, b_expr: &str) -> String {
        format!("DATEDIFF(day, {b_expr}, {a_expr})")
    }

    fn date_diff_months(&self, a_expr: &str, b_expr: &str) -> String {
        format!("DATEDIFF(month, {b_expr}, {a_expr}) - IIF(DAY({a_expr}) < DAY({b_expr}), 1, 0)")
    }

    fn date_diff_years(&self, a_expr: &str, b_expr: &str) -> String {
        format!(
            "DATEDIFF(year, {b_expr}, {a_expr}) - \
             IIF(DATEADD(year, DATEDIFF(year, {b_expr}, {a_expr}), {b_expr}) > {a_expr}, 1, 0)"
        )
    }

    fn combine_as_set(&self, value_expr: &str) -> String {
        format!("STRING_AGG(CAST({value_expr} AS NVARCHAR(MAX)), ',')")
    }

    fn string_contains(&self, haystack_expr: &str, needle_expr: &str) -> String {
        format!("CHARINDEX({needle_expr}, {haystack_expr}) > 0")
    }

    fn year_from_date(&self, date_expr: &str) -> String {
        format!("YEAR({date_expr})")
    }

    fn month_from_date(&self, date_expr: &str) -> String {
        format!("MONTH({date_expr})")
    }

    fn day_from_date(&self, date_expr: &str) -> String {
        format!("DAY({date_expr})")
    }

    fn first_of_month(&self, date_expr: &str) -> String {
        format!("DATEFROMPARTS(YEAR({date_expr}), MONTH({date_expr}), 1)")
    }

    fn first_of_year(&self, date_expr: &str) -> String {
        format!("DATEFROMPARTS(YEAR({date_expr}), 1, 1)")
    }

    fn create_temp_table(&self, name: &str, select_sql: &str, partition_column: &str) -> Vec<String> {
        let full_name = self.table_prefix(name);
        let mut queries = vec![format!("SELECT * INTO {full_name} FROM ({select_sql}) AS src")];
        queries.push(format!("CREATE CLUSTERED INDEX ix_{name} ON {full_name} ({partition_column})"));
        queries
    }

    fn drop_temp_table(&self, name: &str) -> Vec<String> {
        let full_name = self.table_prefix(name);
        vec![format!("IF OBJECT_ID('tempdb..{full_name}') IS NOT NULL DROP TABLE {full_name}")]
    }

    fn inline_patient_table(&self, name: &str, columns: &[&str], rows: &[Vec<Literal>]) -> Result<InlineTablePlacement> {
        if rows.len() > self.inline_values_row_limit() {
            return self.materialize_as_temp_table(name, columns, rows);
        }
        let column_list = columns.join(", ");
        let rendered_rows = rows
            .iter()
            .map(|row| {
                let values =
                    row.iter().map(|literal| self.literal_sql(literal)).collect::<Result<Vec<_>>>()?.join(", ");
                Ok(format!("({values})"))
            })
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        Ok(InlineTablePlacement::Values(format!(
            "(VALUES {rendered_rows}) AS {name}({column_list})"
        )))
    }

    fn inline_values_row_limit(&self) -> usize {
        1000
    }
}

impl MssqlDialect {
    fn materialize_as_temp_table(&self, name: &str, columns: &[&str], rows: &[Vec<Literal>]) -> Result<InlineTablePlacement> {
        let full_name = self.table_prefix(name);
        let column_list = columns.join(", ");
        let mut setup = vec![format!("CREATE TABLE {full_name} ({column_list})")];
        for row in rows {
            let values = row.iter().map(|literal| self.literal_sql(literal)).collect::<Result<Vec<_>>>()?.join(", ");
            setup.push(format!("INSERT INTO {full_name} VALUES ({values})"));
        }
        Ok(InlineTablePlacement::TempTable {
            from_expr: full_name.clone(),
            setup_queries: setup,
            cleanup_queries: self.drop_temp_table(name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn date_literals_render_as_yyyymmdd() {
        let dialect = MssqlDialect::session_scoped();
        let date = Literal::Date(NaiveDate::from_ymd_opt(2020, 1, 31).unwrap());
        assert_eq!(dialect.literal_sql(&date).unwrap(), "'20200131'");
    }

    #[test]
    fn session_scoped_tables_use_a_hash_prefix() {
        let dialect = MssqlDialect::session_scoped();
        assert_eq!(dialect.create_temp_table("results", "SELECT 1", "patient_id")[0], "SELECT * INTO #results FROM (SELECT 1) AS src");
    }

    #[test]
    fn a_persistent_tempdb_qualifies_the_table_name() {
        let dialect = MssqlDialect::with_persistent_tempdb("tempdb");
        assert!(dialect.create_temp_table("results", "SELECT 1", "patient_id")[0].contains("tempdb..results"));
    }

    #[test]
    fn an_oversized_inline_table_falls_back_to_a_temp_table() {
        let dialect = MssqlDialect::session_scoped();
        let rows: Vec<Vec<Literal>> = (0..1001).map(|n| vec![Literal::Int(n)]).collect();
        let placement = dialect.inline_patient_table("lookup", &["value"], &rows).unwrap();
        assert!(matches!(placement, InlineTablePlacement::TempTable { .. }));
    }

    #[test]
    fn first_of_month_uses_datefromparts() {
        let dialect = MssqlDialect::session_scoped();
        assert_eq!(dialect.first_of_month("d"), "DATEFROMPARTS(YEAR(d), MONTH(d), 1)");
    }
}
