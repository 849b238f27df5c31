//! Per-backend SQL idiom (spec §4.6): two dialects implementing the
//! same normative date-arithmetic semantics (spec §4.5) over their own
//! native date functions.

mod date_math;
mod dialect;
mod error;
mod mssql;
mod sqlite;

pub use date_math::{add_months, add_years, day_difference, whole_months, whole_years};
pub use dialect::{Dialect, InlineTablePlacement};
pub use error::{DialectError, Result};
pub use mssql::MssqlDialect;
pub use sqlite::SqliteDialect;
