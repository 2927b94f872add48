//! Optional textual disassembly, used only for trace logging.
//!
//! `disassemble` is a pure function of `(addr, word, symbols)`: it never
//! touches architectural state and never influences execution or predictor
//! state, matching spec.md §6.3. The mnemonic shapes follow the
//! instructor's C reference (`original_source/src/disassemble.c`) exactly:
//! raw `x<N>` register numbering, no ABI aliases.

use crate::decode::{
    Decoded, OPCODE_AUIPC, OPCODE_BRANCH, OPCODE_JAL, OPCODE_JALR, OPCODE_LOAD, OPCODE_LUI,
    OPCODE_MISC_MEM, OPCODE_OP, OPCODE_OP_IMM, OPCODE_STORE, OPCODE_SYSTEM,
};

/// Maps addresses to the nearest preceding function symbol, for annotating
/// disassembly output. Lookup is "nearest preceding symbol", matching the
/// reference's `symbols_value_to_sym`.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    // Sorted ascending by address.
    symbols: Vec<(u32, String)>,
}

impl SymbolTable {
    pub fn new(mut symbols: Vec<(u32, String)>) -> Self {
        symbols.sort_by_key(|(addr, _)| *addr);
        Self { symbols }
    }

    pub fn lookup(&self, addr: u32) -> Option<(&str, u32)> {
        let idx = self.symbols.partition_point(|(sym_addr, _)| *sym_addr <= addr);
        if idx == 0 {
            return None;
        }
        let (sym_addr, name) = &self.symbols[idx - 1];
        Some((name.as_str(), addr - sym_addr))
    }
}

fn r_mnemonic(d: &Decoded) -> Option<&'static str> {
    Some(match (d.funct3, d.funct7) {
        (0, 0x00) => "add",
        (0, 0x20) => "sub",
        (0, 0x01) => "mul",
        (1, 0x00) => "sll",
        (1, 0x01) => "mulh",
        (2, 0x00) => "slt",
        (2, 0x01) => "mulhsu",
        (3, 0x00) => "sltu",
        (3, 0x01) => "mulhu",
        (4, 0x00) => "xor",
        (4, 0x01) => "div",
        (5, 0x00) => "srl",
        (5, 0x20) => "sra",
        (5, 0x01) => "divu",
        (6, 0x00) => "or",
        (6, 0x01) => "rem",
        (7, 0x00) => "and",
        (7, 0x01) => "remu",
        _ => return None,
    })
}

fn op_imm_mnemonic(d: &Decoded) -> Option<&'static str> {
    Some(match d.funct3 {
        0 => "addi",
        2 => "slti",
        3 => "sltiu",
        4 => "xori",
        6 => "ori",
        7 => "andi",
        1 if d.funct7 == 0x00 => "slli",
        5 if d.funct7 == 0x00 => "srli",
        5 if d.funct7 == 0x20 => "srai",
        _ => return None,
    })
}

fn load_mnemonic(funct3: u8) -> Option<&'static str> {
    Some(match funct3 {
        0 => "lb",
        1 => "lh",
        2 => "lw",
        4 => "lbu",
        5 => "lhu",
        _ => return None,
    })
}

fn store_mnemonic(funct3: u8) -> Option<&'static str> {
    Some(match funct3 {
        0 => "sb",
        1 => "sh",
        2 => "sw",
        _ => return None,
    })
}

fn branch_mnemonic(funct3: u8) -> Option<&'static str> {
    Some(match funct3 {
        0 => "beq",
        1 => "bne",
        4 => "blt",
        5 => "bge",
        6 => "bltu",
        7 => "bgeu",
        _ => return None,
    })
}

/// Render one instruction's mnemonic and operands. Returns a best-effort
/// `"unknown"` string for anything the decoder itself would reject, rather
/// than panicking — disassembly must never be able to crash execution.
pub fn disassemble(addr: u32, word: u32, symbols: Option<&SymbolTable>) -> String {
    let body = match Decoded::decode(word) {
        Ok(d) => render(&d, word),
        Err(_) => format!("unknown 0x{word:08x}"),
    };

    match symbols.and_then(|s| s.lookup(addr)) {
        Some((name, 0)) => format!("{body}  ; <{name}>"),
        Some((name, off)) => format!("{body}  ; <{name}+0x{off:x}>"),
        None => body,
    }
}

fn render(d: &Decoded, word: u32) -> String {
    match d.opcode {
        OPCODE_OP => match r_mnemonic(d) {
            Some(m) => format!("{m} x{}, x{}, x{}", d.rd, d.rs1, d.rs2),
            None => format!("unknown 0x{word:08x}"),
        },
        OPCODE_OP_IMM => match op_imm_mnemonic(d) {
            Some(m @ ("slli" | "srli" | "srai")) => format!("{m} x{}, x{}, {}", d.rd, d.rs1, d.shamt),
            Some(m) => format!("{m} x{}, x{}, {}", d.rd, d.rs1, d.imm),
            None => format!("unknown 0x{word:08x}"),
        },
        OPCODE_LOAD => match load_mnemonic(d.funct3) {
            Some(m) => format!("{m} x{}, {}(x{})", d.rd, d.imm, d.rs1),
            None => format!("unknown 0x{word:08x}"),
        },
        OPCODE_STORE => match store_mnemonic(d.funct3) {
            Some(m) => format!("{m} x{}, {}(x{})", d.rs2, d.imm, d.rs1),
            None => format!("unknown 0x{word:08x}"),
        },
        OPCODE_BRANCH => match branch_mnemonic(d.funct3) {
            Some(m) => format!("{m} x{}, x{}, {}", d.rs1, d.rs2, d.imm),
            None => format!("unknown 0x{word:08x}"),
        },
        OPCODE_AUIPC => format!("auipc x{}, 0x{:x}", d.rd, (d.imm as u32) >> 12),
        OPCODE_LUI => format!("lui x{}, 0x{:x}", d.rd, (d.imm as u32) >> 12),
        OPCODE_JAL => format!("jal x{}, {}", d.rd, d.imm),
        OPCODE_JALR => format!("jalr x{}, {}(x{})", d.rd, d.imm, d.rs1),
        OPCODE_SYSTEM if word == 0x0000_0073 => "ecall".to_string(),
        OPCODE_SYSTEM => format!("unknown 0x{word:08x}"),
        OPCODE_MISC_MEM => "fence".to_string(),
        _ => format!("unknown 0x{word:08x}"),
    }
}

/// A sink that receives one formatted line per retired instruction, in the
/// form `<insn_count:8d>  <pc:08x> : <word:08x>   <mnemonic>` (spec.md
/// §6.3). Implemented for anything that writes text, so the CLI binaries
/// can trace to stdout or to a file.
pub trait TraceSink {
    fn trace_line(&mut self, line: &str);
}

impl<W: std::io::Write> TraceSink for W {
    fn trace_line(&mut self, line: &str) {
        let _ = writeln!(self, "{line}");
    }
}

/// Format one trace line for the given retirement, per the layout in
/// spec.md §6.3.
pub fn format_trace_line(insn_count: u64, pc: u32, word: u32, symbols: Option<&SymbolTable>) -> String {
    let mnemonic = disassemble(pc, word, symbols);
    format!("{insn_count:8}  {pc:08x} : {word:08x}   {mnemonic}")
}
