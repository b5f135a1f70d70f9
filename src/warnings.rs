//! Compiler warning channel (module `warnings`) (§4.2, §7).
//!
//! Parse failures never abort a module load — the compiler falls back to a
//! zero-valued expression and records the source text verbatim, surfacing a
//! warning here instead of failing the edit.

use serde::{Deserialize, Serialize};

use crate::note::NoteId;
use crate::variable::VariableKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Warning {
    pub note: NoteId,
    pub kind: VariableKind,
    /// The source text that failed to compile, preserved verbatim.
    pub source: String,
    pub message: String,
}

impl Warning {
    pub fn new(note: NoteId, kind: VariableKind, source: impl Into<String>, message: impl Into<String>) -> Warning {
        Warning {
            note,
            kind,
            source: source.into(),
            message: message.into(),
        }
    }
}
