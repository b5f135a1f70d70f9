//! JavaScript-facing API for the reactive expression engine (L6, §4.5/§4.6).
//!
//! Mirrors the rest of `api/`: a single WASM-owned instance behind a
//! `lazy_static` `Mutex`, JSON in and out via `serde_wasm_bindgen`, and
//! fallible operations returning `Result<_, JsValue>` with the error's
//! `Display` text as the JS-visible message.

use std::sync::Mutex;

use lazy_static::lazy_static;
use serde_json::{json, Value};
use wasm_bindgen::prelude::*;

use crate::error::EngineError;
use crate::evaluator::SlotValue;
use crate::module::{EvaluatedNote, Module};
use crate::note::NoteId;
use crate::variable::{VariableKind, ALL_VARIABLE_KINDS};

lazy_static! {
    static ref MODULE: Mutex<Option<Module>> = Mutex::new(None);
}

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    fn log(s: &str);

    #[wasm_bindgen(js_namespace = console)]
    fn warn(s: &str);
}

macro_rules! wasm_log {
    ($($arg:tt)*) => {
        log(&format!("[reactive] {}", format!($($arg)*)))
    };
}

macro_rules! wasm_warn {
    ($($arg:tt)*) => {
        warn(&format!("[reactive] ⚠️ {}", format!($($arg)*)))
    };
}

fn to_js_err(e: EngineError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn not_initialized() -> JsValue {
    JsValue::from_str("reactive module not initialized; call initModule first")
}

fn with_module<T>(f: impl FnOnce(&Module) -> T) -> Result<T, JsValue> {
    let guard = MODULE.lock().unwrap();
    guard.as_ref().map(f).ok_or_else(not_initialized)
}

fn with_module_mut<T>(f: impl FnOnce(&mut Module) -> T) -> Result<T, JsValue> {
    let mut guard = MODULE.lock().unwrap();
    guard.as_mut().map(f).ok_or_else(not_initialized)
}

fn parse_kind(s: &str) -> Result<VariableKind, JsValue> {
    ALL_VARIABLE_KINDS
        .into_iter()
        .find(|k| k.json_key() == s)
        .or_else(|| VariableKind::from_shortcut(s))
        .ok_or_else(|| JsValue::from_str(&format!("unknown variable kind '{s}'")))
}

fn slot_value_json(v: &SlotValue) -> Value {
    match v {
        SlotValue::Exact(r) => json!({ "kind": "exact", "value": serde_json::to_value(r).unwrap_or(Value::Null) }),
        SlotValue::Corrupted(f) => json!({ "kind": "corrupted", "value": f }),
        SlotValue::Error(e) => json!({ "kind": "error", "message": e.to_string() }),
    }
}

fn evaluated_note_json(id: NoteId, n: &EvaluatedNote) -> Value {
    json!({
        "id": id,
        "startTime": slot_value_json(&n.start_time),
        "duration": slot_value_json(&n.duration),
        "frequency": slot_value_json(&n.frequency),
        "tempo": slot_value_json(&n.tempo),
        "beatsPerMeasure": slot_value_json(&n.beats_per_measure),
        "measureLength": slot_value_json(&n.measure_length),
        "corruption": n.corruption,
    })
}

/// `initModule(startTime, frequency, tempo, beatsPerMeasure)`: (re)create the
/// WASM-owned module with the base note's four required slots (§3).
#[wasm_bindgen(js_name = initModule)]
pub fn init_module(start_time: &str, frequency: &str, tempo: &str, beats_per_measure: &str) {
    let mut guard = MODULE.lock().unwrap();
    *guard = Some(Module::new(start_time, frequency, tempo, beats_per_measure));
    wasm_log!("module initialized");
}

#[wasm_bindgen(js_name = addNote)]
pub fn add_note() -> Result<NoteId, JsValue> {
    with_module_mut(|m| m.add_note())
}

#[wasm_bindgen(js_name = removeNote)]
pub fn remove_note(note_id: NoteId) -> Result<(), JsValue> {
    with_module_mut(|m| m.remove_note(note_id))?.map_err(to_js_err)
}

#[wasm_bindgen(js_name = clearModule)]
pub fn clear_module() -> Result<(), JsValue> {
    with_module_mut(|m| m.clear())
}

/// `setExpression(noteId, kind, dsl)`: `kind` accepts either the canonical
/// JSON key (`"startTime"`) or the DSL shortcut (`"t"`).
#[wasm_bindgen(js_name = setExpression)]
pub fn set_expression(note_id: NoteId, kind: &str, dsl: &str) -> Result<(), JsValue> {
    let kind = parse_kind(kind)?;
    let result = with_module_mut(|m| m.set_expression(note_id, kind, dsl))?;
    result.map_err(|e| {
        wasm_warn!("setExpression({note_id}, {kind:?}) rejected: {e}");
        to_js_err(e)
    })
}

/// `evaluate()`: run the reactive pass and return every note's resolved
/// slots as JSON (§4.5, §6.1).
#[wasm_bindgen(js_name = evaluate)]
pub fn evaluate() -> Result<JsValue, JsValue> {
    let results = with_module_mut(|m| m.evaluate())?;
    let mut entries: Vec<&NoteId> = results.keys().collect();
    entries.sort();
    let array: Vec<Value> = entries.into_iter().map(|id| evaluated_note_json(*id, &results[id])).collect();
    serde_wasm_bindgen::to_value(&Value::Array(array)).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen(js_name = createJson)]
pub fn create_json() -> Result<JsValue, JsValue> {
    let value = with_module(|m| m.create_json())?;
    serde_wasm_bindgen::to_value(&value).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen(js_name = loadFromJson)]
pub fn load_from_json(data: JsValue) -> Result<(), JsValue> {
    let value: Value = serde_wasm_bindgen::from_value(data).map_err(|e| JsValue::from_str(&e.to_string()))?;
    let module = Module::load_from_json(&value).map_err(to_js_err)?;
    let mut guard = MODULE.lock().unwrap();
    *guard = Some(module);
    wasm_log!("module loaded from JSON");
    Ok(())
}

/// `transitiveDependents(noteId)`: every note whose value would change,
/// directly or indirectly, if `noteId` changed (§4.4).
#[wasm_bindgen(js_name = transitiveDependents)]
pub fn transitive_dependents(note_id: NoteId) -> Result<Vec<NoteId>, JsValue> {
    with_module(|m| {
        let mut out: Vec<NoteId> = m.transitive_dependents(note_id).into_iter().collect();
        out.sort();
        out
    })
}

/// `slotTypedTransitiveEffect(noteId, slot)`: the `(note, slot)` pairs
/// reachable from a change at `(noteId, slot)` through the per-slot-on-slot
/// index (§4.4). `slot` must be one of `startTime`/`duration`/`frequency`
/// (or its `measureLength` alias, which folds onto `duration`).
#[wasm_bindgen(js_name = slotTypedTransitiveEffect)]
pub fn slot_typed_transitive_effect(note_id: NoteId, slot: &str) -> Result<JsValue, JsValue> {
    let kind = parse_kind(slot)?;
    let effects = with_module(|m| m.slot_typed_transitive_effect(note_id, kind))?;
    let array: Vec<Value> = effects.into_iter().map(|(id, k)| json!({ "id": id, "slot": k.json_key() })).collect();
    serde_wasm_bindgen::to_value(&Value::Array(array)).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen(js_name = measureChain)]
pub fn measure_chain(note_id: NoteId) -> Result<Vec<NoteId>, JsValue> {
    with_module(|m| m.measure_chain(note_id))
}

#[wasm_bindgen(js_name = findTempo)]
pub fn find_tempo(note_id: NoteId) -> Result<JsValue, JsValue> {
    let value = with_module(|m| m.find_tempo(note_id))?;
    serde_wasm_bindgen::to_value(&slot_value_json(&value)).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen(js_name = findMeasureLength)]
pub fn find_measure_length(note_id: NoteId) -> Result<JsValue, JsValue> {
    let value = with_module(|m| m.find_measure_length(note_id))?;
    serde_wasm_bindgen::to_value(&slot_value_json(&value)).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen(js_name = findInstrument)]
pub fn find_instrument(note_id: NoteId) -> Result<Option<String>, JsValue> {
    with_module(|m| m.find_instrument(note_id))
}

/// `takeWarnings()`: drain and return the compiler's accumulated warnings
/// (§4.2, §7) — parse failures that degraded silently to a zero expression.
#[wasm_bindgen(js_name = takeWarnings)]
pub fn take_warnings() -> Result<JsValue, JsValue> {
    let warnings = with_module_mut(|m| m.take_warnings())?;
    serde_wasm_bindgen::to_value(&warnings).map_err(|e| JsValue::from_str(&e.to_string()))
}
