mod cli;

use clap::{Parser, Subcommand};

use cli::export::{cmd_export, ExportArgs};
use cli::inspect::{cmd_inspect, InspectArgs};
use cli::verify::{cmd_verify, VerifyArgs};

#[derive(Parser)]
#[command(
    name = "heliostat",
    version,
    about = "Train, quantize and export the solar tracker policy"
)]
struct Cli {
    /// Debug-level logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize data, train, quantize and write model.bin + model.h
    Export(ExportArgs),
    /// Decode a model binary or header and print its layout
    Inspect(InspectArgs),
    /// Check that a header embeds exactly the bytes of a binary
    Verify(VerifyArgs),
}

fn main() {
    let cli = Cli::parse();
    cli::init_tracing(cli.verbose);

    match cli.command {
        Command::Export(args) => cmd_export(args),
        Command::Inspect(args) => cmd_inspect(args),
        Command::Verify(args) => cmd_verify(args),
    }
}
