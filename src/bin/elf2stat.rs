use std::path::PathBuf;

use clap::Parser;
use clap_num::maybe_hex;

use rv32im_bpsim::elf_loader;
use rv32im_bpsim::simulate::simulate;

/// Run an RV32IM ELF program to completion and print its Stat report as JSON.
///
/// Thinner than `rvsim`: no tracing, no single-stepping, just a
/// machine-readable report for test harnesses and CI.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Path to the ELF executable to run
    input: PathBuf,

    /// Override the ELF entry point (use 0x prefix for hexadecimal)
    #[arg(short, long, value_parser=maybe_hex::<u32>)]
    entry: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let loaded = elf_loader::load(&args.input)?;
    let mut memory = loaded.memory;
    let entry = args.entry.unwrap_or(loaded.entry);

    let stat = simulate(&mut memory, entry, None);
    println!("{}", serde_json::to_string_pretty(&stat)?);
    Ok(())
}
