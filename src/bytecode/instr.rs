//! The bytecode IR (§3): a small fixed instruction set over exact rationals.

use crate::note::NoteId;
use crate::variable::VariableKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    /// Push a rational constant.
    LoadConst(i32, i32),
    /// Push the evaluated value of another note's slot.
    LoadRef(NoteId, VariableKind),
    /// Push the evaluated value of the base note's slot.
    LoadBase(VariableKind),
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    /// Pop exponent, pop base, push `base ^ exponent` (may corrupt).
    Pow,
    /// Pop a note-reference value, push the resolved tempo (§4.3, §4.5).
    FindTempo,
    /// Pop a note-reference value, push the resolved measure length.
    FindMeasure,
    Dup,
    Swap,
}

impl Instr {
    /// The note this instruction directly references, if any (used by the
    /// compiler to build the deduplicated reference set, §4.2).
    pub fn referenced_note(&self) -> Option<NoteId> {
        match self {
            Instr::LoadRef(id, _) => Some(*id),
            _ => None,
        }
    }

    pub fn references_base(&self) -> bool {
        matches!(self, Instr::LoadBase(_))
    }
}
