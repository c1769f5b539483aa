//! Convert between Scanco file formats.
//!
//! Reads any supported format (ISQ, RSQ, RAD, AIM) and writes ISQ or AIM,
//! selected by the output extension.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scancoconv", about = "Convert Scanco micro-CT volume files")]
struct Args {
    /// Input file (.isq, .rsq, .rad or .aim)
    input: PathBuf,

    /// Output file (.isq or .aim)
    output: PathBuf,

    /// Log decoding details to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: &Args) -> scanco::Result<()> {
    let image = scanco::load(&args.input)?;
    tracing::info!(
        input = %args.input.display(),
        shape = ?image.shape(),
        component = %image.component(),
        "loaded volume"
    );
    scanco::save(&image, &args.output)?;
    tracing::info!(output = %args.output.display(), "wrote volume");
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("scancoconv: {e}");
            ExitCode::FAILURE
        }
    }
}
