//! CLI argument definitions (spec §6 "CLI surface").

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "ehrql",
    version,
    about = "ehrQL query compilation pipeline CLI",
    long_about = "Lower, inspect, and exercise connectivity for ehrQL dataset definitions.\n\n\
                  The query compiler itself never parses a user's dataset definition source;\n\
                  these commands operate on the Query Model's own JSON serialization."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,
}

#[derive(Subcommand)]
pub enum Command {
    /// Lower a JSON dataset definition to SQL text without executing it.
    DumpDatasetSql(DumpDatasetSqlArgs),

    /// Validate a JSON dataset definition and re-emit its canonical
    /// serialization.
    SerializeDefinition(SerializeDefinitionArgs),

    /// Exercise `ehrql-reader`'s batched fetch loop against the
    /// configured backend, reporting `SUCCESS` or the connection
    /// error.
    TestConnection,

    /// Not implemented: out of core scope (spec §1).
    GenerateDataset,
    /// Not implemented: out of core scope (spec §1).
    GenerateMeasures,
    /// Not implemented: out of core scope (spec §1).
    CreateDummyTables,
    /// Not implemented: out of core scope (spec §1).
    Sandbox,
    /// Not implemented: out of core scope (spec §1).
    Assure,
    /// Not implemented: out of core scope (spec §1).
    DumpExampleData,
}

#[derive(Args)]
pub struct DumpDatasetSqlArgs {
    /// Path to a JSON-serialized dataset definition.
    #[arg(value_name = "DEFINITION")]
    pub definition: PathBuf,

    /// Which backend dialect to lower against.
    #[arg(long, value_enum, default_value = "sqlite")]
    pub dialect: DialectArg,
}

#[derive(Args)]
pub struct SerializeDefinitionArgs {
    /// Path to a JSON-serialized dataset definition.
    #[arg(value_name = "DEFINITION")]
    pub definition: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum DialectArg {
    Sqlite,
    Mssql,
}
