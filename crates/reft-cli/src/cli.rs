use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use reft_types::HashAlgorithm;

#[derive(Parser)]
#[command(
    name = "reft",
    about = "Write, read and inspect reftable reference files",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a reftable from a packed-refs style listing
    Write(WriteArgs),
    /// Print every ref in a reftable
    Read(ReadArgs),
    /// Look up a single ref
    Lookup(LookupArgs),
    /// Show the block layout of a reftable
    Dump(DumpArgs),
}

#[derive(Args)]
pub struct WriteArgs {
    /// Reftable file to create
    pub file: PathBuf,
    /// Ref listing to read, `-` for stdin
    #[arg(short, long, default_value = "-")]
    pub input: String,
    /// TOML file with writer settings; flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub block_size: Option<u32>,
    #[arg(long)]
    pub restart_gap: Option<usize>,
    /// Object id format (sha1 or sha256); inferred from the input if unset
    #[arg(long)]
    pub hash: Option<HashAlgorithm>,
    /// Update index stamped on every ref
    #[arg(long, default_value = "1")]
    pub update_index: u64,
    /// Do not append index blocks
    #[arg(long)]
    pub no_index: bool,
}

#[derive(Args)]
pub struct TableArgs {
    /// Reftable file to open
    pub file: PathBuf,
    /// Expected block size; taken from the header if unset
    #[arg(long)]
    pub block_size: Option<u32>,
    #[arg(long, default_value = "sha1")]
    pub hash: HashAlgorithm,
}

#[derive(Args)]
pub struct ReadArgs {
    #[command(flatten)]
    pub table: TableArgs,
}

#[derive(Args)]
pub struct LookupArgs {
    #[command(flatten)]
    pub table: TableArgs,
    /// Full ref name, e.g. refs/heads/main
    pub name: String,
}

#[derive(Args)]
pub struct DumpArgs {
    #[command(flatten)]
    pub table: TableArgs,
}
