//! Command-line entry point: replays one or more on-disk redo log files
//! through a `Parser`, emitting trace lines for each committed
//! transaction via `TraceBuilder`.

use std::path::PathBuf;

use log::{error, info};

use redo_stream::{open_file, Parser, ParserConfig, TraceBuilder};

fn print_help() {
    println!("redo-stream - Oracle-style redo log change-data-capture parser");
    println!();
    println!("Usage: redo-stream [OPTIONS] <REDO_LOG_FILE>...");
    println!();
    println!("Options:");
    println!("  -d, --data-dir DIR       Checkpoint/state directory (default: ./data)");
    println!("  -b, --block-size BYTES   Redo block size: 512, 1024, or 4096 (default: 512)");
    println!("      --ignore-data-errors Skip unparseable records instead of aborting");
    println!("      --show-incomplete    Route vectors for transactions whose Begin was never seen");
    println!("      --trace              Log a line per decoded vector");
    println!("  -h, --help               Show this help");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = ParserConfig::default();
    let mut files: Vec<PathBuf> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--data-dir" | "-d" => {
                if i + 1 < args.len() {
                    config.data_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--block-size" | "-b" => {
                if i + 1 < args.len() {
                    config.block_size = args[i + 1].parse()?;
                    i += 1;
                }
            }
            "--ignore-data-errors" => config.flags.ignore_data_errors = true,
            "--show-incomplete" => config.flags.show_incomplete_transactions = true,
            "--trace" => config.trace_level = 1,
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => files.push(PathBuf::from(other)),
        }
        i += 1;
    }

    if files.is_empty() {
        print_help();
        return Ok(());
    }

    let mut parser = Parser::new(config.clone())?;
    let mut builder = TraceBuilder::default();

    for path in files {
        info!("replaying {:?}", path);
        let mut reader = open_file(&path, config.block_size)?;
        if let Err(e) = parser.run(&mut reader, &mut builder) {
            error!("parse error in {:?}: {}", path, e);
            if !config.flags.ignore_data_errors {
                return Err(e.into());
            }
        }
    }

    info!("done; {} transactions committed", builder.commits_seen);
    Ok(())
}
