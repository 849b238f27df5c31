//! CLI-level failure modes (spec §7 item 5 and the "collaborator
//! contract" status of out-of-core-scope subcommands).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// A `--definition` file didn't deserialize to a well-formed
    /// dataset definition. The core never parses user source text
    /// (spec §1 non-goals); this is the trimmed-traceback-style error
    /// the collaborator that does is expected to raise.
    #[error("failed to load dataset definition from {path}: {source}")]
    DefinitionLoad { path: String, source: serde_json::Error },

    #[error("failed to read {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error(transparent)]
    Sql(#[from] ehrql_sql::SqlError),

    #[error(transparent)]
    Builder(#[from] ehrql_builder::BuilderError),

    #[error(transparent)]
    Dialect(#[from] ehrql_dialect::DialectError),

    /// A recognized but out-of-core-scope subcommand (spec §6: "CLI
    /// surface (collaborator only)").
    #[error("`{0}` is not implemented by this build: it is a collaborator-only command outside the query compilation pipeline's core scope")]
    NotImplemented(&'static str),
}

pub type Result<T> = std::result::Result<T, CliError>;
