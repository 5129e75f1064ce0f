//! pixdex CLI binary.

use std::io::Write;
use std::process;

use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;

use pixdex::cli::args::PixdexArgs;
use pixdex::cli::commands::execute_command;

fn main() {
    let args = PixdexArgs::parse();

    let log_level = match args.verbosity() {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };

    // RUST_LOG, when set, refines the level picked by -v/-q.
    Builder::new()
        .filter_level(log_level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    if let Err(e) = execute_command(args) {
        eprintln!("pixdex: {e}");
        process::exit(1);
    }
}
