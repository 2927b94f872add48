use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;

use clap::Parser;
use clap_num::maybe_hex;

use rv32im_bpsim::disasm::{format_trace_line, SymbolTable};
use rv32im_bpsim::elf_loader;
use rv32im_bpsim::executor::{Executor, StepOutcome};
use rv32im_bpsim::memory::Memory;
use rv32im_bpsim::predictor::{self, PredictorBank, PredictorStat};
use rv32im_bpsim::simulate::{simulate, Stat};

/// Run an RV32IM program under the branch-prediction evaluator.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Path to the ELF executable to run
    input: PathBuf,

    /// Override the ELF entry point (use 0x prefix for hexadecimal)
    #[arg(short, long, value_parser=maybe_hex::<u32>)]
    entry: Option<u32>,

    /// Mirror the per-instruction disassembly trace to stdout
    #[arg(short, long)]
    trace: bool,

    /// Write the disassembly trace to a file instead of stdout
    #[arg(long, value_name = "FILE")]
    trace_file: Option<PathBuf>,

    /// Single-step: pause after every instruction until Enter is pressed
    #[arg(short, long)]
    step: bool,

    /// Begin single-stepping once this PC is reached (use 0x prefix for hex)
    #[arg(long, value_parser=maybe_hex::<u32>)]
    pc_breakpoint: Option<u32>,

    /// Emit debug/trace-level internal diagnostics (table construction, ELF section loading)
    #[arg(short, long)]
    verbose: bool,
}

fn press_enter_to_continue() {
    let mut stdout = io::stdout();
    let _ = write!(stdout, "Press enter to continue...");
    let _ = stdout.flush();
    let _ = io::stdin().read(&mut [0u8]);
}

/// Manual fetch/decode/execute/predict loop used only by `--step` and
/// `--pc-breakpoint`, since `simulate()` itself doesn't expose a pause hook.
fn run_single_step(
    memory: &mut dyn Memory,
    entry: u32,
    symbols: &SymbolTable,
    step_from_start: bool,
    pc_breakpoint: Option<u32>,
) -> Stat {
    let mut executor = Executor::new(entry);
    let mut predictors = PredictorBank::new();
    let mut stat = Stat::default();
    let mut stepping = step_from_start;

    loop {
        if let Some(bp) = pc_breakpoint {
            if executor.pc == bp {
                stepping = true;
            }
        }

        stat.insns += 1;

        if stepping {
            let word = memory.read_word(executor.pc);
            println!("{}", format_trace_line(stat.insns, executor.pc, word, Some(symbols)));
        }

        let result = executor.step(memory);

        if let Some(event) = result.branch_event {
            predictors.record_branch(event.pc, event.displacement, event.taken);
        }

        match result.outcome {
            StepOutcome::Continue => (),
            StepOutcome::Exit(code) => {
                println!("program exited with code {code}");
                break;
            }
            StepOutcome::DecodeFault(pc, word) => {
                eprintln!("decode fault at pc=0x{pc:08x}: word=0x{word:08x}");
                break;
            }
        }

        if stepping {
            press_enter_to_continue();
        }
    }

    stat.nt = predictors.nt();
    stat.btfnt = predictors.btfnt();
    stat.bimodal = predictors.bimodal();
    stat.gshare = predictors.gshare();
    stat
}

fn print_predictor(name: &str, stat: &PredictorStat) {
    let rate = if stat.predictions == 0 {
        0.0
    } else {
        stat.mispredictions as f64 / stat.predictions as f64 * 100.0
    };
    println!(
        "  {name:<14} predictions={:<10} mispredictions={:<10} rate={rate:.2}%",
        stat.predictions, stat.mispredictions
    );
}

fn print_report(stat: &Stat) {
    println!("instructions executed: {}", stat.insns);
    print_predictor("nt", &stat.nt);
    print_predictor("btfnt", &stat.btfnt);
    for (size, s) in predictor::TABLE_SIZES.iter().zip(stat.bimodal.iter()) {
        print_predictor(&format!("bimodal[{size}]"), s);
    }
    for (size, s) in predictor::TABLE_SIZES.iter().zip(stat.gshare.iter()) {
        print_predictor(&format!("gshare[{size}]"), s);
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let loaded = elf_loader::load(&args.input)?;
    let mut memory = loaded.memory;
    let entry = args.entry.unwrap_or(loaded.entry);
    let symbols = loaded.symbols;

    let stat = if args.step || args.pc_breakpoint.is_some() {
        run_single_step(&mut memory, entry, &symbols, args.step, args.pc_breakpoint)
    } else if let Some(path) = &args.trace_file {
        let mut sink = BufWriter::new(File::create(path)?);
        simulate(&mut memory, entry, Some((&mut sink, Some(&symbols))))
    } else if args.trace {
        let mut sink = io::stdout();
        simulate(&mut memory, entry, Some((&mut sink, Some(&symbols))))
    } else {
        simulate(&mut memory, entry, None)
    };

    print_report(&stat);
    Ok(())
}
