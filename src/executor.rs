//! Execution of decoded RV32IM instructions against architectural state.
//!
//! The executor owns the register file and program counter and offers one
//! operation, `step()`: fetch one word at `pc`, decode it, perform its
//! effect, and advance `pc`. Behaviour is defined in the RISC-V
//! unprivileged specification restricted to the base integer ISA plus the
//! M extension (RV32IM).

use std::io::{self, Read, Write};

use crate::decode::{
    Decoded, OPCODE_AUIPC, OPCODE_BRANCH, OPCODE_JAL, OPCODE_JALR, OPCODE_LOAD, OPCODE_LUI,
    OPCODE_MISC_MEM, OPCODE_OP, OPCODE_OP_IMM, OPCODE_STORE, OPCODE_SYSTEM,
};
use crate::memory::Memory;

const ECALL_WORD: u32 = 0x0000_0073;

/// Register file: 32 slots of signed 32-bit integers. Slot 0 always reads
/// as zero; writes to it are discarded.
#[derive(Debug, Default)]
pub struct Registers {
    slots: [i32; 32],
}

impl Registers {
    pub fn read(&self, index: u8) -> i32 {
        self.slots[index as usize]
    }

    pub fn write(&mut self, index: u8, value: i32) {
        if index != 0 {
            self.slots[index as usize] = value;
        }
    }
}

/// Outcome of one conditional-branch retirement, forwarded to the
/// predictor bank by the outer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchEvent {
    pub pc: u32,
    pub displacement: i32,
    pub taken: bool,
}

/// Result of one `step()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Exit(i32),
    DecodeFault(u32, u32),
}

/// Everything produced by one `step()`: the step's outcome, and a branch
/// event if (and only if) the retired instruction was a conditional
/// branch.
#[derive(Debug, Clone, Copy)]
pub struct StepResult {
    pub outcome: StepOutcome,
    pub branch_event: Option<BranchEvent>,
}

/// Architectural state: the register file and program counter. Step
/// borrows a memory collaborator and, for ECALL, the host's stdin/stdout.
#[derive(Debug, Default)]
pub struct Executor {
    pub registers: Registers,
    pub pc: u32,
}

impl Executor {
    pub fn new(entry: u32) -> Self {
        Self {
            registers: Registers::default(),
            pc: entry,
        }
    }

    /// Fetch, decode and execute one instruction, advancing `pc`.
    pub fn step(&mut self, memory: &mut dyn Memory) -> StepResult {
        let word = memory.read_word(self.pc);
        let pc = self.pc;

        let decoded = match Decoded::decode(word) {
            Ok(d) => d,
            Err(_) => {
                return StepResult {
                    outcome: StepOutcome::DecodeFault(pc, word),
                    branch_event: None,
                }
            }
        };

        let mut next_pc = pc.wrapping_add(4);
        let mut branch_event = None;
        let mut exit_code = None;

        match decoded.opcode {
            OPCODE_OP => self.exec_op(&decoded),
            OPCODE_OP_IMM => self.exec_op_imm(&decoded),
            OPCODE_LOAD => self.exec_load(&decoded, memory),
            OPCODE_STORE => self.exec_store(&decoded, memory),
            OPCODE_BRANCH => {
                let (taken, target) = self.exec_branch(&decoded, pc);
                branch_event = Some(BranchEvent {
                    pc,
                    displacement: decoded.imm,
                    taken,
                });
                if taken {
                    next_pc = target;
                }
            }
            OPCODE_AUIPC => {
                let value = pc.wrapping_add(decoded.imm as u32) as i32;
                self.registers.write(decoded.rd, value);
            }
            OPCODE_LUI => self.registers.write(decoded.rd, decoded.imm),
            OPCODE_JAL => {
                self.registers.write(decoded.rd, pc.wrapping_add(4) as i32);
                next_pc = pc.wrapping_add(decoded.imm as u32);
            }
            OPCODE_JALR => {
                let base = self.registers.read(decoded.rs1);
                let target = (base.wrapping_add(decoded.imm) as u32) & !1u32;
                self.registers.write(decoded.rd, pc.wrapping_add(4) as i32);
                next_pc = target;
            }
            OPCODE_SYSTEM => {
                if word == ECALL_WORD {
                    exit_code = self.exec_ecall();
                }
            }
            OPCODE_MISC_MEM => {
                // FENCE / PAUSE: treated as NOP regardless of the exact
                // sub-encoding (per spec.md §9 Open Question 2).
            }
            _ => unreachable!("decode() would have rejected this opcode"),
        }

        self.registers.write(0, 0);
        self.pc = next_pc;

        let outcome = match exit_code {
            Some(code) => StepOutcome::Exit(code),
            None => StepOutcome::Continue,
        };

        StepResult { outcome, branch_event }
    }

    fn exec_op(&mut self, d: &Decoded) {
        let a = self.registers.read(d.rs1);
        let b = self.registers.read(d.rs2);
        let shift = (b as u32) & 0x1F;

        let result = match (d.funct3, d.funct7) {
            (0, 0x00) => a.wrapping_add(b),
            (0, 0x20) => a.wrapping_sub(b),
            (0, 0x01) => a.wrapping_mul(b),
            (1, 0x00) => ((a as u32) << shift) as i32,
            (1, 0x01) => (((a as i64) * (b as i64)) >> 32) as i32,
            (2, 0x00) => (a < b) as i32,
            (2, 0x01) => {
                let prod = (a as i64).wrapping_mul(b as u32 as i64);
                (prod >> 32) as i32
            }
            (3, 0x00) => ((a as u32) < (b as u32)) as i32,
            (3, 0x01) => {
                let prod = (a as u32 as u64).wrapping_mul(b as u32 as u64);
                (prod >> 32) as i32
            }
            (4, 0x00) => a ^ b,
            (4, 0x01) => div_signed(a, b),
            (5, 0x00) => ((a as u32) >> shift) as i32,
            (5, 0x20) => a >> shift,
            (5, 0x01) => divu(a, b),
            (6, 0x00) => a | b,
            (6, 0x01) => rem_signed(a, b),
            (7, 0x00) => a & b,
            (7, 0x01) => remu(a, b),
            // Unrecognised funct7 for this funct3: silently a no-op.
            _ => return,
        };
        self.registers.write(d.rd, result);
    }

    fn exec_op_imm(&mut self, d: &Decoded) {
        let a = self.registers.read(d.rs1);
        let shift = d.shamt as u32;
        let result = match d.funct3 {
            0 => a.wrapping_add(d.imm),
            2 => (a < d.imm) as i32,
            3 => ((a as u32) < (d.imm as u32)) as i32,
            4 => a ^ d.imm,
            6 => a | d.imm,
            7 => a & d.imm,
            1 if d.funct7 == 0x00 => ((a as u32) << shift) as i32,
            5 if d.funct7 == 0x20 => a >> shift,
            5 if d.funct7 == 0x00 => ((a as u32) >> shift) as i32,
            _ => return,
        };
        self.registers.write(d.rd, result);
    }

    fn exec_load(&mut self, d: &Decoded, memory: &dyn Memory) {
        let addr = (self.registers.read(d.rs1).wrapping_add(d.imm)) as u32;
        let value = match d.funct3 {
            0 => memory.read_byte(addr) as i8 as i32,
            1 => memory.read_half(addr) as i16 as i32,
            2 => memory.read_word(addr) as i32,
            4 => memory.read_byte(addr) as i32,
            5 => memory.read_half(addr) as i32,
            _ => return,
        };
        self.registers.write(d.rd, value);
    }

    fn exec_store(&mut self, d: &Decoded, memory: &mut dyn Memory) {
        let addr = (self.registers.read(d.rs1).wrapping_add(d.imm)) as u32;
        let value = self.registers.read(d.rs2) as u32;
        match d.funct3 {
            0 => memory.write_byte(addr, value as u8),
            1 => memory.write_half(addr, value as u16),
            2 => memory.write_word(addr, value),
            _ => (),
        }
    }

    /// Returns `(taken, target_if_taken)`.
    fn exec_branch(&mut self, d: &Decoded, pc: u32) -> (bool, u32) {
        let a = self.registers.read(d.rs1);
        let b = self.registers.read(d.rs2);
        let taken = match d.funct3 {
            0 => a == b,
            1 => a != b,
            4 => a < b,
            5 => a >= b,
            6 => (a as u32) < (b as u32),
            7 => (a as u32) >= (b as u32),
            _ => false,
        };
        (taken, pc.wrapping_add(d.imm as u32))
    }

    /// Runs the ECALL ABI (§4.2.6). Returns `Some(exit_code)` when the
    /// simulation should terminate.
    fn exec_ecall(&mut self) -> Option<i32> {
        let a7 = self.registers.read(17);
        match a7 {
            1 => {
                let mut byte = [0u8; 1];
                let value = match io::stdin().read_exact(&mut byte) {
                    Ok(()) => byte[0] as i32,
                    Err(_) => -1,
                };
                self.registers.write(10, value);
                None
            }
            2 => {
                let byte = (self.registers.read(10) & 0xFF) as u8;
                let mut stdout = io::stdout();
                let _ = stdout.write_all(&[byte]);
                let _ = stdout.flush();
                None
            }
            3 | 93 => Some(self.registers.read(10)),
            _ => None,
        }
    }
}

fn div_signed(a: i32, b: i32) -> i32 {
    if b == 0 {
        -1
    } else if a == i32::MIN && b == -1 {
        i32::MIN
    } else {
        a / b
    }
}

fn rem_signed(a: i32, b: i32) -> i32 {
    if b == 0 {
        a
    } else if a == i32::MIN && b == -1 {
        0
    } else {
        a % b
    }
}

fn divu(a: i32, b: i32) -> i32 {
    let (ua, ub) = (a as u32, b as u32);
    if ub == 0 {
        0xFFFF_FFFFu32 as i32
    } else {
        (ua / ub) as i32
    }
}

fn remu(a: i32, b: i32) -> i32 {
    let (ua, ub) = (a as u32, b as u32);
    if ub == 0 {
        a
    } else {
        (ua % ub) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SparseMemory;

    fn r_type(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
    }

    fn i_type(imm12: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        ((imm12 & 0xFFF) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
    }

    #[test]
    fn zero_register_stays_zero_after_every_step() {
        let mut exec = Executor::new(0);
        let mut mem = SparseMemory::new();
        // addi x0, x0, 5
        mem.write_word(0, i_type(5, 0, 0x0, 0, 0x13));
        exec.step(&mut mem);
        assert_eq!(exec.registers.read(0), 0);
    }

    #[test]
    fn addi_negative_one() {
        let mut exec = Executor::new(0);
        let mut mem = SparseMemory::new();
        // addi x1, x0, -1
        mem.write_word(0, i_type(0xFFF, 0, 0x0, 1, 0x13));
        exec.step(&mut mem);
        assert_eq!(exec.registers.read(1), -1);
    }

    #[test]
    fn sra_arithmetic_vs_srl_logical() {
        let mut exec = Executor::new(0);
        exec.registers.write(2, 0x8000_0000u32 as i32);
        exec.registers.write(3, 1);
        let mut mem = SparseMemory::new();
        // sra x1, x2, x3
        mem.write_word(0, r_type(0x20, 3, 2, 0x5, 1, 0x33));
        exec.step(&mut mem);
        assert_eq!(exec.registers.read(1) as u32, 0xC000_0000);
    }

    #[test]
    fn srl_logical_shift() {
        let mut exec = Executor::new(0);
        exec.registers.write(2, 0x8000_0000u32 as i32);
        exec.registers.write(3, 1);
        let mut mem = SparseMemory::new();
        // srl x1, x2, x3
        mem.write_word(0, r_type(0x00, 3, 2, 0x5, 1, 0x33));
        exec.step(&mut mem);
        assert_eq!(exec.registers.read(1) as u32, 0x4000_0000);
    }

    #[test]
    fn div_rem_by_zero() {
        let mut exec = Executor::new(0);
        exec.registers.write(2, 42);
        exec.registers.write(3, 0);
        let mut mem = SparseMemory::new();
        mem.write_word(0, r_type(0x01, 3, 2, 0x4, 1, 0x33)); // div x1, x2, x3
        mem.write_word(4, r_type(0x01, 3, 2, 0x5, 4, 0x33)); // divu x4, x2, x3
        mem.write_word(8, r_type(0x01, 3, 2, 0x6, 5, 0x33)); // rem x5, x2, x3
        exec.step(&mut mem);
        exec.step(&mut mem);
        exec.step(&mut mem);
        assert_eq!(exec.registers.read(1), -1);
        assert_eq!(exec.registers.read(4) as u32, 0xFFFF_FFFF);
        assert_eq!(exec.registers.read(5), 42);
    }

    #[test]
    fn div_overflow_does_not_panic() {
        let mut exec = Executor::new(0);
        exec.registers.write(2, i32::MIN);
        exec.registers.write(3, -1);
        let mut mem = SparseMemory::new();
        mem.write_word(0, r_type(0x01, 3, 2, 0x4, 1, 0x33)); // div x1, x2, x3
        exec.step(&mut mem);
        assert_eq!(exec.registers.read(1), i32::MIN);
    }

    #[test]
    fn jalr_masks_low_bit() {
        let mut exec = Executor::new(0);
        exec.registers.write(1, 0x1003);
        let mut mem = SparseMemory::new();
        // jalr x0, 0(x1)
        mem.write_word(0, i_type(0, 1, 0x0, 0, 0x67));
        exec.step(&mut mem);
        assert_eq!(exec.pc, 0x1002);
    }

    #[test]
    fn jal_jalr_link_written_after_target_computed_when_rs1_eq_rd() {
        let mut exec = Executor::new(0x100);
        exec.registers.write(1, 0x2000);
        let mut mem = SparseMemory::new();
        // jalr x1, 4(x1): target must use the pre-write value of x1.
        mem.write_word(0x100, i_type(4, 1, 0x0, 1, 0x67));
        exec.step(&mut mem);
        assert_eq!(exec.pc, 0x2004);
        assert_eq!(exec.registers.read(1), 0x104);
    }

    #[test]
    fn pc_advances_by_four_for_non_branch_non_jump() {
        let mut exec = Executor::new(0x1000);
        let mut mem = SparseMemory::new();
        mem.write_word(0x1000, i_type(1, 0, 0x0, 1, 0x13));
        exec.step(&mut mem);
        assert_eq!(exec.pc, 0x1004);
    }

    #[test]
    fn writes_to_x0_are_discarded() {
        let mut exec = Executor::new(0);
        let mut mem = SparseMemory::new();
        // addi x0, x0, 5
        mem.write_word(0, i_type(5, 0, 0x0, 0, 0x13));
        // add x1, x0, x0
        mem.write_word(4, r_type(0x00, 0, 0, 0x0, 1, 0x33));
        exec.step(&mut mem);
        exec.step(&mut mem);
        assert_eq!(exec.registers.read(1), 0);
    }

    #[test]
    fn slli_with_unrecognised_funct7_is_a_no_op() {
        let mut exec = Executor::new(0);
        exec.registers.write(1, 0xDEAD_BEEFu32 as i32);
        let mut mem = SparseMemory::new();
        // slli x1, x1, 4 but with funct7 = 0x01 (undefined): imm = (0x01 << 5) | 4
        mem.write_word(0, i_type((0x01 << 5) | 4, 1, 0x1, 1, 0x13));
        exec.step(&mut mem);
        assert_eq!(exec.registers.read(1) as u32, 0xDEAD_BEEF);
    }

    #[test]
    fn unknown_opcode_is_a_decode_fault() {
        let mut exec = Executor::new(0);
        let mut mem = SparseMemory::new();
        mem.write_word(0, 0xFFFF_FFFF);
        let result = exec.step(&mut mem);
        assert_eq!(result.outcome, StepOutcome::DecodeFault(0, 0xFFFF_FFFF));
    }

    #[test]
    fn ecall_exit_returns_a0() {
        let mut exec = Executor::new(0);
        exec.registers.write(17, 93);
        exec.registers.write(10, 7);
        let mut mem = SparseMemory::new();
        mem.write_word(0, ECALL_WORD);
        let result = exec.step(&mut mem);
        assert_eq!(result.outcome, StepOutcome::Exit(7));
    }

    #[test]
    fn lui_preserves_high_bit_immediate() {
        let mut exec = Executor::new(0);
        let mut mem = SparseMemory::new();
        // lui x5, 0xFFFFF
        mem.write_word(0, (0xFFFFFu32 << 12) | (5 << 7) | 0x37);
        exec.step(&mut mem);
        assert_eq!(exec.registers.read(5) as u32, 0xFFFF_F000);
    }
}
