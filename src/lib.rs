//! Reactive expression engine for microtonal music composition.
//!
//! A module (`module::Module`) holds a set of notes, each exposing six
//! slots (`variable::VariableKind`) whose values are small DSL expressions
//! (`compiler`) compiled to bytecode (`bytecode`) and resolved against
//! exact rational arithmetic (`rational`). Cross-note references are
//! tracked in a bidirectional dependency graph (`graph`) so that editing one
//! note's expression only re-evaluates (`evaluator`) the notes it actually
//! affects.

pub mod rational;
pub mod variable;
pub mod note;
pub mod error;
pub mod warnings;
pub mod bytecode;
pub mod compiler;
pub mod decompiler;
pub mod evaluator;
pub mod graph;
pub mod module;
pub mod serializer;

pub mod api;

pub use error::EngineError;
pub use module::{EvaluatedNote, Module};
pub use note::{NoteId, BASE_NOTE_ID};
pub use variable::VariableKind;

use wasm_bindgen::prelude::*;

// This is like the `main` function, but for WASM modules.
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).expect("failed to initialize logger");

    log::info!("reactive expression engine initialized");
}