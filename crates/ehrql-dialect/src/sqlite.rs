//! SQLite-like dialect (spec §4.6): plain `CREATE TEMP TABLE` +
//! `INSERT ... SELECT`, case-sensitive `LIKE`, Julian-day date
//! arithmetic, no persistent staging.

use ehrql_types::Literal;

use crate::dialect::{Dialect, InlineTablePlacement};
use crate::error::Result;

pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn literal_sql(&self, literal: &Literal) -> Result<String> {
        Ok(match literal {
            Literal::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Literal::Int(n) => n.to_string(),
            Literal::Float(f) => f.get().to_string(),
            Literal::Str(s) => format!("'{}'", s.replace('\'', "''")),
            Literal::Code(code) => format!("'{}'", code.to_string().replace('\'', "''")),
            Literal::Date(date) => format!("'{}'", date.format("%Y-%m-%d")),
        })
    }

    fn aggregate_needs_cte(&self) -> bool {
        false
    }

    fn calculate_mean(&self, avg_expr: &str) -> String {
        format!("AVG(CAST({avg_expr} AS REAL))")
    }

    fn date_add_days(&self, date_expr: &str, days_expr: &str) -> String {
        format!("date({date_expr}, ({days_expr}) || ' days')")
    }

    fn date_add_months(&self, date_expr: &str, months_expr: &str) -> String {
        format!("date({date_expr}, ({months_expr}) || ' months')")
    }

    fn date_add_years(&self, date_expr: &str, years_expr: &str) -> String {
        format!("date({date_expr}, ({years_expr}) || ' years')")
    }

    fn date_diff_days(&self, a_expr: &str, b_expr: &str) -> String {
        format!("CAST(julianday({a_expr}) - julianday({b_expr}) AS INTEGER)")
    }

    fn date_diff_months(&self, a_expr: &str, b_expr: &str) -> String {
        format!(
            "(CAST(strftime('%Y', {a_expr}) AS INTEGER) - CAST(strftime('%Y', {b_expr}) AS INTEGER)) * 12 + \
             (CAST(strftime('%m', {a_expr}) AS INTEGER) - CAST(strftime('%m', {b_expr}) AS INTEGER)) - \
             (CASE WHEN strftime('%d', {a_expr}) < strftime('%d', {b_expr}) THEN 1 ELSE 0 END)"
        )
    }

    fn date_diff_years(&self, a_expr: &str, b_expr: &str) -> String {
        format!(
            "(CAST(strftime('%Y', {a_expr}) AS INTEGER) - CAST(strftime('%Y', {b_expr}) AS INTEGER)) - \
             (CASE WHEN strftime('%m-%d', {a_expr}) < strftime('%m-%d', {b_expr}) THEN 1 ELSE 0 END)"
        )
    }

    fn combine_as_set(&self, value_expr: &str) -> String {
        format!("GROUP_CONCAT(DISTINCT {value_expr})")
    }

    fn string_contains(&self, haystack_expr: &str, needle_expr: &str) -> String {
        format!("instr({haystack_expr}, {needle_expr}) > 0")
    }

    fn year_from_date(&self, date_expr: &str) -> String {
        format!("CAST(strftime('%Y', {date_expr}) AS INTEGER)")
    }

    fn month_from_date(&self, date_expr: &str) -> String {
        format!("CAST(strftime('%m', {date_expr}) AS INTEGER)")
    }

    fn day_from_date(&self, date_expr: &str) -> String {
        format!("CAST(strftime('%d', {date_expr}) AS INTEGER)")
    }

    fn first_of_month(&self, date_expr: &str) -> String {
        format!("date({date_expr}, 'start of month')")
    }

    fn first_of_year(&self, date_expr: &str) -> String {
        format!("date({date_expr}, 'start of year')")
    }

    fn create_temp_table(&self, name: &str, select_sql: &str, _partition_column: &str) -> Vec<String> {
        vec![
            format!("CREATE TEMP TABLE {name} AS {select_sql}"),
            format!("CREATE INDEX ix_{name} ON {name} (patient_id)"),
        ]
    }

    fn drop_temp_table(&self, name: &str) -> Vec<String> {
        vec![format!("DROP TABLE IF EXISTS {name}")]
    }

    fn inline_patient_table(&self, name: &str, columns: &[&str], rows: &[Vec<Literal>]) -> Result<InlineTablePlacement> {
        if rows.len() > self.inline_values_row_limit() {
            let mut setup = vec![format!("CREATE TEMP TABLE {name} ({})", columns.join(", "))];
            for row in rows {
                let values = row.iter().map(|literal| self.literal_sql(literal)).collect::<Result<Vec<_>>>()?.join(", ");
                setup.push(format!("INSERT INTO {name} VALUES ({values})"));
            }
            return Ok(InlineTablePlacement::TempTable {
                from_expr: name.to_string(),
                setup_queries: setup,
                cleanup_queries: self.drop_temp_table(name),
            });
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
        Ok(InlineTablePlacement::Values(format!("(VALUES {rendered_rows}) AS {name}({column_list})")))
    }

    fn inline_values_row_limit(&self) -> usize {
        500
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn date_literals_render_as_iso() {
        let dialect = SqliteDialect;
        let date = Literal::Date(NaiveDate::from_ymd_opt(2020, 1, 31).unwrap());
        assert_eq!(dialect.literal_sql(&date).unwrap(), "'2020-01-31'");
    }

    #[test]
    fn small_inline_tables_use_a_values_constructor() {
        let dialect = SqliteDialect;
        let rows = vec![vec![Literal::Int(1), Literal::Int(10)], vec![Literal::Int(2), Literal::Int(20)]];
        let placement = dialect.inline_patient_table("lookup", &["patient_id", "value"], &rows).unwrap();
        assert!(matches!(placement, InlineTablePlacement::Values(_)));
    }

    #[test]
    fn aggregates_do_not_need_a_cte() {
        assert!(!SqliteDialect.aggregate_needs_cte());
    }

    #[test]
    fn first_of_year_uses_the_date_modifier() {
        assert_eq!(SqliteDialect.first_of_year("d"), "date(d, 'start of year')");
    }
}
