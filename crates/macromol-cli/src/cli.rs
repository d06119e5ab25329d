use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "macromol - parse, inspect, and transform macromolecular structure files (mmCIF and PDB).",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Path to a TOML configuration file with parser options
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub parser_flags: ParserFlags,
}

/// Command-line overrides for the parser options; flags win over the
/// configuration file.
#[derive(Args, Debug, Clone, Copy)]
pub struct ParserFlags {
    /// Downgrade recoverable format errors to warnings and keep parsing
    #[arg(long, global = true)]
    pub permissive: bool,

    /// Use label (mmCIF-internal) chain and sequence ids instead of the
    /// author-assigned ones
    #[arg(long, global = true)]
    pub label_ids: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarize the hierarchy of one or more structure files.
    Info(InfoArgs),
    /// Convert a structure file to PDB format.
    Convert(ConvertArgs),
    /// Generate a biological assembly from symmetry operators.
    Assembly(AssemblyArgs),
}

/// Arguments for the `info` subcommand.
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Input structure files (.cif or .pdb)
    #[arg(required = true, value_name = "PATH")]
    pub inputs: Vec<PathBuf>,
}

/// Arguments for the `convert` subcommand.
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Input structure file (.cif or .pdb)
    #[arg(required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path for the PDB output file
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,
}

/// Arguments for the `assembly` subcommand.
#[derive(Args, Debug)]
pub struct AssemblyArgs {
    /// Input structure file (.cif or .pdb)
    #[arg(required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Biological assembly id to generate ("0" returns the asymmetric
    /// unit unchanged)
    #[arg(short = 'i', long = "id", default_value = "1", value_name = "ID")]
    pub assembly_id: String,

    /// Path for the PDB output file
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,
}
