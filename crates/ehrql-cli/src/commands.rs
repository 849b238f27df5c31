//! Subcommand implementations.

use ehrql_dialect::{MssqlDialect, SqliteDialect};

use crate::cli::{DialectArg, DumpDatasetSqlArgs, SerializeDefinitionArgs};
use crate::config::BackendConfig;
use crate::connection;
use crate::definition::Definition;
use crate::error::Result;

pub fn run_dump_dataset_sql(args: &DumpDatasetSqlArgs) -> Result<()> {
    let definition = Definition::load(&args.definition)?;
    let dataset = definition.into_dataset();

    tracing::info!(variables = dataset.variables().len(), dialect = ?dialect_name(args.dialect), "lowering dataset");

    let lowered = match args.dialect {
        DialectArg::Sqlite => ehrql_sql::lower_dataset(&dataset, &SqliteDialect)?,
        DialectArg::Mssql => ehrql_sql::lower_dataset(&dataset, &MssqlDialect::session_scoped())?,
    };

    for setup in &lowered.setup_queries {
        println!("{setup};");
    }
    println!("{};", lowered.main_query);
    for cleanup in &lowered.cleanup_queries {
        println!("{cleanup};");
    }
    Ok(())
}

pub fn run_serialize_definition(args: &SerializeDefinitionArgs) -> Result<()> {
    let definition = Definition::load(&args.definition)?;
    let canonical = serde_json::to_string_pretty(&definition).expect("a loaded Definition always re-serializes");
    println!("{canonical}");
    Ok(())
}

pub fn run_test_connection() -> std::result::Result<(), ehrql_reader::ReaderError> {
    let config = BackendConfig::from_env();
    tracing::info!(backend = ?config.backend_name, "testing backend connection");
    match connection::test_connection(&config) {
        Ok(()) => {
            println!("SUCCESS");
            Ok(())
        }
        Err(error) => {
            eprintln!("FAILED: {error}");
            Err(error)
        }
    }
}

fn dialect_name(dialect: DialectArg) -> &'static str {
    match dialect {
        DialectArg::Sqlite => "sqlite",
        DialectArg::Mssql => "mssql",
    }
}

/// Reports a recognized but out-of-core-scope command (spec §1/§6).
pub fn run_not_implemented(name: &'static str) -> Result<()> {
    Err(crate::error::CliError::NotImplemented(name))
}
