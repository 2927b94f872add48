//! The program loader (spec.md §6.2).
//!
//! Parses an ELF32 executable via the `elf` crate into a memory image plus
//! an entry address. The simulator itself never interprets ELF; this
//! module is the external collaborator that produces what `simulate()`
//! needs. Grounded on the teacher's `elf_utils::load_elf` (load every
//! `SHF_ALLOC` section byte-by-byte) and `find_function_symbol`
//! (`STT_FUNC` symbol-table walk).

use std::path::Path;

use elf::abi::{SHF_ALLOC, STT_FUNC};
use elf::endian::AnyEndian;
use elf::ElfBytes;
use thiserror::Error;
use log::debug;

use crate::disasm::SymbolTable;
use crate::memory::{Memory, SparseMemory};

#[derive(Debug, Error)]
pub enum ElfLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse ELF file: {0}")]
    Parse(String),
    #[error("ELF file has no section headers")]
    MissingSections,
}

/// The outcome of loading a program: its initial memory image, the entry
/// address taken from the ELF header, and (best-effort) the function
/// symbol table for disassembly annotation.
pub struct LoadedProgram {
    pub memory: SparseMemory,
    pub entry: u32,
    pub symbols: SymbolTable,
}

/// Read an ELF file from disk and load every allocatable (`SHF_ALLOC`)
/// section into a fresh `SparseMemory`, at the address given by its
/// section header. Returns the loaded image, entry point, and symbol
/// table.
pub fn load(path: &Path) -> Result<LoadedProgram, ElfLoadError> {
    let file_data = std::fs::read(path).map_err(|source| ElfLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let file = ElfBytes::<AnyEndian>::minimal_parse(&file_data)
        .map_err(|e| ElfLoadError::Parse(e.to_string()))?;

    let mut memory = SparseMemory::new();

    let (section_headers, strtab) = file
        .section_headers_with_strtab()
        .map_err(|e| ElfLoadError::Parse(e.to_string()))?;
    let section_headers = section_headers.ok_or(ElfLoadError::MissingSections)?;
    let strtab = strtab.ok_or(ElfLoadError::MissingSections)?;

    for header in section_headers.iter() {
        if header.sh_flags & u64::from(SHF_ALLOC) == 0 {
            continue;
        }
        let name = strtab.get(header.sh_name as usize).unwrap_or("<unnamed>");
        let (data, compressed) = file
            .section_data(&header)
            .map_err(|e| ElfLoadError::Parse(e.to_string()))?;
        if compressed.is_some() {
            continue;
        }
        debug!("loading section {name} ({} bytes) at 0x{:x}", data.len(), header.sh_addr);
        for (offset, byte) in data.iter().enumerate() {
            let addr = header.sh_addr as u32 + offset as u32;
            memory.write_byte(addr, *byte);
        }
    }

    let symbols = read_function_symbols(&file);

    Ok(LoadedProgram {
        memory,
        entry: file.ehdr.e_entry as u32,
        symbols,
    })
}

fn read_function_symbols(file: &ElfBytes<AnyEndian>) -> SymbolTable {
    let Ok(Some((symtab, strtab))) = file.symbol_table() else {
        return SymbolTable::new(Vec::new());
    };

    let mut symbols = Vec::new();
    for entry in symtab.iter() {
        if entry.st_symtype() != STT_FUNC {
            continue;
        }
        if let Ok(name) = strtab.get(entry.st_name as usize) {
            if !name.is_empty() {
                symbols.push((entry.st_value as u32, name.to_string()));
            }
        }
    }
    SymbolTable::new(symbols)
}
