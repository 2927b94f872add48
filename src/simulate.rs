//! The outer simulation loop (spec.md §2, §6.4).
//!
//! Fetches one word at the PC, decodes it, executes it, and — when the
//! instruction was a conditional branch — forwards the actual outcome to
//! the predictor bank before advancing. Terminates on `ECALL exit` or a
//! decode failure, returning the statistics accumulated up to and
//! including the last completed instruction.

use log::error;
use serde::Serialize;

use crate::disasm::{format_trace_line, SymbolTable, TraceSink};
use crate::executor::{Executor, StepOutcome};
use crate::memory::Memory;
use crate::predictor::{PredictorBank, PredictorStat};

/// Aggregate statistics returned by `simulate()`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Stat {
    pub insns: u64,
    pub nt: PredictorStat,
    pub btfnt: PredictorStat,
    pub bimodal: [PredictorStat; 4],
    pub gshare: [PredictorStat; 4],
}

impl Serialize for PredictorStat {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("PredictorStat", 2)?;
        s.serialize_field("predictions", &self.predictions)?;
        s.serialize_field("mispredictions", &self.mispredictions)?;
        s.end()
    }
}

/// Run a loaded program to completion.
///
/// `memory` holds the program image (and receives any writes the program
/// makes); `entry` is the starting PC. `trace` and `symbols`, if given,
/// cause one line per retired instruction to be emitted before it
/// executes, per spec.md §6.3 — purely diagnostic, with no effect on
/// execution or predictor state.
pub fn simulate(
    memory: &mut dyn Memory,
    entry: u32,
    mut trace: Option<(&mut dyn TraceSink, Option<&SymbolTable>)>,
) -> Stat {
    let mut executor = Executor::new(entry);
    let mut predictors = PredictorBank::new();
    let mut stat = Stat::default();

    loop {
        stat.insns += 1;

        if let Some((sink, symbols)) = trace.as_deref_mut() {
            let word = memory.read_word(executor.pc);
            let line = format_trace_line(stat.insns, executor.pc, word, *symbols);
            sink.trace_line(&line);
        }

        let result = executor.step(memory);

        if let Some(event) = result.branch_event {
            predictors.record_branch(event.pc, event.displacement, event.taken);
        }

        match result.outcome {
            StepOutcome::Continue => continue,
            StepOutcome::Exit(_) => break,
            StepOutcome::DecodeFault(pc, word) => {
                error!("decode fault at pc=0x{pc:08x}: word=0x{word:08x}");
                break;
            }
        }
    }

    stat.nt = predictors.nt();
    stat.btfnt = predictors.btfnt();
    stat.bimodal = predictors.bimodal();
    stat.gshare = predictors.gshare();
    stat
}
