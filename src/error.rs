//! Error taxonomy surfaced to collaborators of the reactive engine.
//!
//! Corruption is deliberately absent from this enum: it is a first-class,
//! non-fatal annotation carried on the dependency graph's corruption bitmap,
//! not a failure.

use thiserror::Error;

use crate::note::NoteId;
use crate::variable::VariableKind;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("failed to parse expression: {0}")]
    ParseError(String),

    #[error("unknown property '{0}'")]
    UnknownProperty(String),

    #[error("note {0} has no referenceable note {1}")]
    MissingReference(NoteId, NoteId),

    #[error("setting note {note}'s {kind:?} to this expression would create a cycle")]
    WouldCreateCycle { note: NoteId, kind: VariableKind },

    #[error("division by zero")]
    DivideByZero,

    #[error("note {0}'s {1:?} was read before evaluate() was called")]
    Stale(NoteId, VariableKind),

    #[error("no note with id {0}")]
    NoteNotFound(NoteId),

    #[error("the base note (id 0) cannot be removed")]
    BaseNoteImmutable,

    #[error("invalid module JSON: {0}")]
    InvalidJson(String),

    #[error("expected a note-reference argument, found a non-integer value")]
    InvalidReference(NoteId),
}
