//! RV32IM instruction decode.
//!
//! Extracts the opcode and bitfields from a 32-bit instruction word and
//! sign-extends the immediate per the instruction's format (R, I, S, B, U,
//! J). Decoding is a pure function of the word; nothing here touches
//! architectural state.

use thiserror::Error;

use crate::utils::{extract_field, sign_extend};

pub const OPCODE_OP: u8 = 0x33;
pub const OPCODE_LOAD: u8 = 0x03;
pub const OPCODE_OP_IMM: u8 = 0x13;
pub const OPCODE_STORE: u8 = 0x23;
pub const OPCODE_BRANCH: u8 = 0x63;
pub const OPCODE_AUIPC: u8 = 0x17;
pub const OPCODE_LUI: u8 = 0x37;
pub const OPCODE_JAL: u8 = 0x6F;
pub const OPCODE_JALR: u8 = 0x67;
pub const OPCODE_SYSTEM: u8 = 0x73;
pub const OPCODE_MISC_MEM: u8 = 0x0F;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unrecognised opcode 0x{opcode:02x} in word 0x{word:08x}")]
    UnknownOpcode { opcode: u8, word: u32 },
}

/// A decoded instruction, valid for the duration of one `step()`.
///
/// `imm` holds whichever immediate applies to this instruction's format,
/// already sign-extended to 32 bits. `shamt` holds the unsigned shift
/// amount used by I-type shift instructions (SLLI/SRLI/SRAI).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    pub opcode: u8,
    pub rd: u8,
    pub rs1: u8,
    pub rs2: u8,
    pub funct3: u8,
    pub funct7: u8,
    pub imm: i32,
    pub shamt: u8,
}

fn i_imm(word: u32) -> i32 {
    sign_extend(extract_field(word, 31, 20), 11)
}

fn s_imm(word: u32) -> i32 {
    let hi = extract_field(word, 31, 25);
    let lo = extract_field(word, 11, 7);
    sign_extend((hi << 5) | lo, 11)
}

fn b_imm(word: u32) -> i32 {
    let bit12 = extract_field(word, 31, 31);
    let bit11 = extract_field(word, 7, 7);
    let bits10_5 = extract_field(word, 30, 25);
    let bits4_1 = extract_field(word, 11, 8);
    let imm = (bit12 << 12) | (bit11 << 11) | (bits10_5 << 5) | (bits4_1 << 1);
    sign_extend(imm, 12)
}

fn u_imm(word: u32) -> i32 {
    (extract_field(word, 31, 12) << 12) as i32
}

fn j_imm(word: u32) -> i32 {
    let bit20 = extract_field(word, 31, 31);
    let bits19_12 = extract_field(word, 19, 12);
    let bit11 = extract_field(word, 20, 20);
    let bits10_1 = extract_field(word, 30, 21);
    let imm = (bit20 << 20) | (bits19_12 << 12) | (bit11 << 11) | (bits10_1 << 1);
    sign_extend(imm, 20)
}

impl Decoded {
    /// Decode a 32-bit instruction word. Pure function: identical words
    /// always decode to identical fields.
    pub fn decode(word: u32) -> Result<Decoded, DecodeError> {
        let opcode = extract_field(word, 6, 0) as u8;
        let rd = extract_field(word, 11, 7) as u8;
        let funct3 = extract_field(word, 14, 12) as u8;
        let rs1 = extract_field(word, 19, 15) as u8;
        let rs2 = extract_field(word, 24, 20) as u8;
        let funct7 = extract_field(word, 31, 25) as u8;
        let shamt = extract_field(word, 24, 20) as u8;

        let imm = match opcode {
            OPCODE_OP => 0,
            OPCODE_LOAD | OPCODE_OP_IMM | OPCODE_JALR => i_imm(word),
            OPCODE_STORE => s_imm(word),
            OPCODE_BRANCH => b_imm(word),
            OPCODE_AUIPC | OPCODE_LUI => u_imm(word),
            OPCODE_JAL => j_imm(word),
            OPCODE_SYSTEM | OPCODE_MISC_MEM => 0,
            _ => return Err(DecodeError::UnknownOpcode { opcode, word }),
        };

        Ok(Decoded {
            opcode,
            rd,
            rs1,
            rs2,
            funct3,
            funct7,
            imm,
            shamt,
        })
    }
}
