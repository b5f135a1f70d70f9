//! JSON persistence for a module (L5/L6, §4.6, §6.1).
//!
//! A module round-trips through two JSON shapes: the canonical form this
//! module always writes (`createJson`), and a legacy form some imported
//! files still carry where a slot's expression is embedded as a JS function
//! body rather than bare DSL text. `loadFromJson` accepts both.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use crate::decompiler;
use crate::error::EngineError;
use crate::module::Module;
use crate::note::{Note, NoteId, BASE_NOTE_ID};
use crate::variable::{VariableKind, ALL_VARIABLE_KINDS};

lazy_static! {
    /// Matches the common `function() { ... return <expr>; }` legacy shape
    /// (§4.6 Open Question 2): we only need the returned expression text,
    /// not a full JS parse.
    static ref LEGACY_RETURN_RE: Regex = Regex::new(r"return\s+(.+?)\s*;?\s*\}?\s*$").unwrap();
}

/// Strip a legacy function wrapper down to its returned expression text, if
/// present; otherwise return the input unchanged.
fn normalize_dsl_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("function") {
        if let Some(caps) = LEGACY_RETURN_RE.captures(trimmed) {
            return caps[1].trim().to_string();
        }
    }
    trimmed.to_string()
}

fn note_to_json(note: &Note) -> Value {
    let mut obj = json!({ "id": note.id });
    let map = obj.as_object_mut().expect("object literal");
    for kind in ALL_VARIABLE_KINDS {
        if let Some(expr) = note.slot(kind) {
            map.insert(kind.json_key().to_string(), json!(decompiler::decompile(&expr.code)));
        }
    }
    if let Some(color) = &note.color {
        map.insert("color".to_string(), json!(color));
    }
    if let Some(instrument) = &note.instrument {
        map.insert("instrument".to_string(), json!(instrument));
    }
    obj
}

pub fn create_json(m: &Module) -> Value {
    let notes = m.notes_map();
    let base = notes.get(&BASE_NOTE_ID).expect("base note always present");

    let mut others: Vec<&Note> = notes.values().filter(|n| n.id != BASE_NOTE_ID).collect();
    others.sort_by_key(|n| n.id);

    json!({
        "baseNote": note_to_json(base),
        "notes": others.iter().map(|n| note_to_json(n)).collect::<Vec<_>>(),
        "nextId": m.next_id_hint(),
    })
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(normalize_dsl_text)
}

fn required_str_field(v: &Value, key: &str) -> String {
    str_field(v, key).unwrap_or_else(|| "0".to_string())
}

/// Build a module from its JSON form (§6.1). Unparseable per-slot DSL text
/// never fails the load (the compiler falls back to zero); edits that would
/// create a cycle are dropped, leaving that slot unset, rather than failing
/// the whole import (see DESIGN.md).
pub fn load_from_json(data: &Value) -> Result<Module, EngineError> {
    let base_json = data
        .get("baseNote")
        .ok_or_else(|| EngineError::InvalidJson("missing baseNote".to_string()))?;

    let mut m = Module::new(
        &required_str_field(base_json, "startTime"),
        &required_str_field(base_json, "frequency"),
        &required_str_field(base_json, "tempo"),
        &required_str_field(base_json, "beatsPerMeasure"),
    );
    if let Some(ml) = str_field(base_json, "measureLength") {
        let _ = m.set_expression(BASE_NOTE_ID, VariableKind::MeasureLength, &ml);
    }
    m.set_note_metadata(
        BASE_NOTE_ID,
        base_json.get("color").and_then(Value::as_str).map(str::to_string),
        base_json.get("instrument").and_then(Value::as_str).map(str::to_string),
    );

    let entries = data.get("notes").and_then(Value::as_array).cloned().unwrap_or_default();

    // Phase 1: every note must exist before any slot references another
    // note, including forward references (§4.5 "needed for bulk import").
    let mut ids = Vec::with_capacity(entries.len());
    for entry in &entries {
        let id = entry
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| EngineError::InvalidJson("note entry missing integer id".to_string()))? as NoteId;
        if id == BASE_NOTE_ID {
            return Err(EngineError::InvalidJson("note id 0 is reserved for the base note".to_string()));
        }
        m.insert_bare_note(id);
        ids.push(id);
    }

    // Phase 2: register every slot's final expression before marking
    // anything dirty.
    let mut changes: Vec<(NoteId, VariableKind, String)> = Vec::new();
    let mut metadata: HashMap<NoteId, (Option<String>, Option<String>)> = HashMap::new();
    for (entry, &id) in entries.iter().zip(&ids) {
        for kind in ALL_VARIABLE_KINDS {
            if let Some(dsl) = str_field(entry, kind.json_key()) {
                changes.push((id, kind, dsl));
            }
        }
        metadata.insert(
            id,
            (
                entry.get("color").and_then(Value::as_str).map(str::to_string),
                entry.get("instrument").and_then(Value::as_str).map(str::to_string),
            ),
        );
    }
    let _dropped_for_cycles = m.batch_set_expressions(&changes);

    for (id, (color, instrument)) in metadata {
        m.set_note_metadata(id, color, instrument);
    }

    if let Some(next_id) = data.get("nextId").and_then(Value::as_u64) {
        m.set_next_id_hint(next_id as NoteId);
    }

    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_canonical_form() {
        let mut m = Module::new("0", "base.f", "120", "4");
        let n = m.add_note();
        m.set_expression(n, VariableKind::Frequency, "base.f * 3/2").unwrap();
        m.set_expression(n, VariableKind::StartTime, "base.t").unwrap();

        let json = create_json(&m);
        let reloaded = load_from_json(&json).unwrap();

        assert_eq!(reloaded.note(n).unwrap().frequency.as_ref().unwrap().source, "base.f * 3/2");
    }

    #[test]
    fn extracts_legacy_function_wrapped_expression() {
        let text = "function() { return module.baseNote.getVariable('frequency').mul(new Fraction(3,2)); }";
        assert_eq!(
            normalize_dsl_text(text),
            "module.baseNote.getVariable('frequency').mul(new Fraction(3,2))"
        );
    }

    #[test]
    fn load_handles_forward_references() {
        let json = json!({
            "baseNote": { "startTime": "0", "frequency": "1", "tempo": "120", "beatsPerMeasure": "4" },
            "notes": [
                { "id": 2, "startTime": "[1].t" },
                { "id": 1, "startTime": "base.t" },
            ],
        });
        let m = load_from_json(&json).unwrap();
        assert_eq!(m.note(2).unwrap().start_time.as_ref().unwrap().refs, vec![1]);
    }

    #[test]
    fn missing_base_note_is_invalid_json() {
        let json = json!({ "notes": [] });
        assert!(matches!(load_from_json(&json), Err(EngineError::InvalidJson(_))));
    }

    #[test]
    fn reserved_base_id_in_notes_array_is_rejected() {
        let json = json!({
            "baseNote": { "startTime": "0", "frequency": "1", "tempo": "120", "beatsPerMeasure": "4" },
            "notes": [ { "id": 0, "startTime": "0" } ],
        });
        assert!(matches!(load_from_json(&json), Err(EngineError::InvalidJson(_))));
    }
}
