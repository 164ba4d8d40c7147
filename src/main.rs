mod cli;
mod commands;
mod logging;
mod progress;
mod utils;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use slicedl::{JobOptions, DEFAULT_CHUNK_SIZE, DEFAULT_LOWER_BOUND};

use crate::cli::{parse_header, ProgressMode};
use crate::commands::DownloadRequest;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL of the resource to download (the server must honor Range requests)
    #[arg(index = 1)]
    url: String,

    /// Destination file, or a directory to save into using the URL's file name
    #[arg(short = 'o', long = "output", default_value = ".")]
    output: PathBuf,

    /// Number of slices to request, in [1, 16)
    #[arg(short = 's', long, default_value_t = 8)]
    slices: usize,

    /// Extra request header, e.g. -H "Referer: https://example.com/" (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Minimum slice width in bytes
    #[arg(long = "min-slice-size", default_value_t = DEFAULT_LOWER_BOUND)]
    min_slice_size: u64,

    /// Buffer size used when streaming a slice to disk
    #[arg(long = "chunk-size", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// How slice progress is shown
    #[arg(long, value_enum, default_value = "bars")]
    progress: ProgressMode,

    /// Write a JSON report of every slice outcome to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose)?;

    let request = DownloadRequest {
        url: args.url,
        output: args.output,
        headers: args.headers,
        slices: args.slices,
        options: JobOptions {
            lower_bound: args.min_slice_size,
            chunk_size: args.chunk_size,
            ..JobOptions::default()
        },
        progress: args.progress,
        report: args.report,
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(commands::run_download(request))
}
