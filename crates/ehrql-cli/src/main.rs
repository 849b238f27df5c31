#![deny(unsafe_code)]
//! Developer-facing CLI around the ehrQL query compilation pipeline
//! (spec §6 "CLI surface (collaborator only)"). Only `dump-dataset-sql`,
//! `serialize-definition`, and `test-connection` are in core scope;
//! every other subcommand is recognized but answers with a clear
//! not-implemented error rather than silently accepting it.

mod cli;
mod commands;
mod config;
mod connection;
mod definition;
mod error;
mod logging;

use clap::Parser;

use cli::{Cli, Command};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.verbosity);
    cli.color.write_global();

    let result = match &cli.command {
        Command::DumpDatasetSql(args) => commands::run_dump_dataset_sql(args).map_err(anyhow::Error::from),
        Command::SerializeDefinition(args) => commands::run_serialize_definition(args).map_err(anyhow::Error::from),
        Command::TestConnection => commands::run_test_connection().map_err(anyhow::Error::from),
        Command::GenerateDataset => commands::run_not_implemented("generate-dataset").map_err(anyhow::Error::from),
        Command::GenerateMeasures => commands::run_not_implemented("generate-measures").map_err(anyhow::Error::from),
        Command::CreateDummyTables => commands::run_not_implemented("create-dummy-tables").map_err(anyhow::Error::from),
        Command::Sandbox => commands::run_not_implemented("sandbox").map_err(anyhow::Error::from),
        Command::Assure => commands::run_not_implemented("assure").map_err(anyhow::Error::from),
        Command::DumpExampleData => commands::run_not_implemented("dump-example-data").map_err(anyhow::Error::from),
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            std::process::ExitCode::FAILURE
        }
    }
}
