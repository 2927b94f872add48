//! Shared error taxonomy glue.
//!
//! Each module defines its own `thiserror` error enum (`DecodeError`,
//! `ElfLoadError`); this module binds them into one top-level `SimError` for
//! callers that want a single `Result` type instead of matching on each
//! module's error individually. `simulate()` itself never returns this —
//! per spec.md §7 it always returns `Stat`, with no exception flow
//! observable at the external interface.

use thiserror::Error;

use crate::decode::DecodeError;
use crate::elf_loader::ElfLoadError;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    ElfLoad(#[from] ElfLoadError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
