//! Environment-driven backend configuration (spec §6). The core's
//! lowering/reader crates take these values as plain arguments; this
//! struct is the one place the CLI collaborator reads the process
//! environment, turning ambient configuration into explicit values
//! before the pipeline ever sees them.

use std::env;

/// Which "always isolate user code in a sandbox" policy is configured.
/// The core has no sandbox of its own (spec §1 non-goals); this is
/// read and passed straight through to whichever external collaborator
/// honors it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolateUserCode {
    #[default]
    Default,
    Always,
    Never,
}

impl IsolateUserCode {
    fn parse(value: &str) -> Self {
        match value {
            "always" => Self::Always,
            "never" => Self::Never,
            _ => Self::Default,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    pub database_url: Option<String>,
    pub backend_name: Option<String>,
    pub query_engine: Option<String>,
    pub temp_database_name: Option<String>,
    pub isolate_user_code: IsolateUserCode,
    pub log_sql: bool,
}

impl BackendConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            backend_name: env::var("OPENSAFELY_BACKEND").ok(),
            query_engine: env::var("OPENSAFELY_QUERY_ENGINE").ok(),
            temp_database_name: env::var("TEMP_DATABASE_NAME").ok(),
            isolate_user_code: env::var("EHRQL_ISOLATE_USER_CODE").map(|v| IsolateUserCode::parse(&v)).unwrap_or_default(),
            log_sql: env::var("LOG_SQL").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
        }
    }
}
