//! The per-backend idiom seam (spec §4.6): SQL generation hooks, the
//! aggregate-source strategy, the temp-table idiom, a results-staging
//! policy, and the date adapter.

use ehrql_types::Literal;

use crate::error::Result;

/// Where a materialized inline patient table ends up, so the lowerer
/// knows whether it needs a cleanup query.
pub enum InlineTablePlacement {
    /// A `VALUES (...),(...)` row constructor directly in the FROM
    /// clause; no setup/cleanup needed.
    Values(String),
    /// A generated temp table, because the row count exceeds the
    /// backend's inline-constructor limit.
    TempTable { from_expr: String, setup_queries: Vec<String>, cleanup_queries: Vec<String> },
}

/// A backend's SQL idiom. Every method is a pure text-generation
/// function; nothing here touches a live connection.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn quote_ident(&self, name: &str) -> String;

    /// Render a scalar literal in this backend's safe textual form
    /// (spec §4.5: dates are locale-sensitive on some backends).
    fn literal_sql(&self, literal: &Literal) -> Result<String>;

    /// Whether `AVG`/`SUM` can see the source subquery directly, or
    /// must be wrapped in a CTE first.
    fn aggregate_needs_cte(&self) -> bool;

    /// Cast an integer mean expression so division doesn't truncate
    /// (spec §4.5: "dialects where `AVG(int)` returns an integer").
    fn calculate_mean(&self, avg_expr: &str) -> String;

    /// `CombineAsSet`: every distinct per-patient value, concatenated.
    fn combine_as_set(&self, value_expr: &str) -> String;

    fn date_add_days(&self, date_expr: &str, days_expr: &str) -> String;
    fn date_add_months(&self, date_expr: &str, months_expr: &str) -> String;
    fn date_add_years(&self, date_expr: &str, years_expr: &str) -> String;
    fn date_diff_days(&self, a_expr: &str, b_expr: &str) -> String;
    fn date_diff_months(&self, a_expr: &str, b_expr: &str) -> String;
    fn date_diff_years(&self, a_expr: &str, b_expr: &str) -> String;

    /// `haystack.contains(needle)` as a boolean SQL predicate.
    fn string_contains(&self, haystack_expr: &str, needle_expr: &str) -> String;

    fn year_from_date(&self, date_expr: &str) -> String;
    fn month_from_date(&self, date_expr: &str) -> String;
    fn day_from_date(&self, date_expr: &str) -> String;
    fn first_of_month(&self, date_expr: &str) -> String;
    fn first_of_year(&self, date_expr: &str) -> String;

    /// Setup queries (CREATE + populate + index) for a session- or
    /// persistent-scoped temp table holding `select_sql`'s result,
    /// partitioned/indexed on `partition_column`.
    fn create_temp_table(&self, name: &str, select_sql: &str, partition_column: &str) -> Vec<String>;

    /// Cleanup queries (DROP IF EXISTS) for a table created by
    /// [`Dialect::create_temp_table`].
    fn drop_temp_table(&self, name: &str) -> Vec<String>;

    /// Materialize an inline patient table, as either a `VALUES`
    /// constructor or a generated temp table (spec §4.5).
    fn inline_patient_table(&self, name: &str, columns: &[&str], rows: &[Vec<Literal>]) -> Result<InlineTablePlacement>;

    /// The maximum row count this backend's `VALUES` constructor
    /// accepts before a temp table is required instead.
    fn inline_values_row_limit(&self) -> usize;
}
