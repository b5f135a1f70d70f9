//! Stack machine over rationals (L3, §4.3).
//!
//! [`eval_slot`] executes one note's compiled bytecode for one slot against
//! the shared [`EvalCache`]. The module guarantees the cache already holds
//! every transitive dependency's value before a slot is evaluated (§5:
//! "this never recurses") — a miss here means either an unset slot
//! (defaults to exact zero, matching the empty-expression rule in §3) or a
//! genuine staleness bug, surfaced as [`EngineError::Stale`].

use std::collections::{HashMap, HashSet};

use crate::bytecode::Instr;
use crate::error::EngineError;
use crate::note::{Note, NoteId, BASE_NOTE_ID};
use crate::rational::{PowResult, Rational};
use crate::variable::{VariableKind, ALL_VARIABLE_KINDS};

/// One slot's resolved value: exact, corrupted, or erroneous (§7: evaluation
/// errors abort only the single slot, not the whole pass).
#[derive(Debug, Clone, PartialEq)]
pub enum SlotValue {
    Exact(Rational),
    Corrupted(f64),
    Error(EngineError),
}

impl SlotValue {
    pub fn is_corrupted(&self) -> bool {
        matches!(self, SlotValue::Corrupted(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SlotValue::Error(_))
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            SlotValue::Exact(r) => r.to_f64(),
            SlotValue::Corrupted(f) => *f,
            SlotValue::Error(_) => f64::NAN,
        }
    }

    fn numeric(r: PowResult) -> SlotValue {
        match r {
            PowResult::Exact(v) => SlotValue::Exact(v),
            PowResult::Corrupted(f) => SlotValue::Corrupted(f),
        }
    }
}

/// The six resolved values for one note plus its corruption bitmask and the
/// generation at which they were last written (§3, §8 boundary scenario 5).
#[derive(Debug, Clone)]
pub struct CacheEntry {
    values: [Option<SlotValue>; 6],
    pub corruption: u8,
    pub generation: u64,
}

impl Default for CacheEntry {
    fn default() -> Self {
        CacheEntry { values: Default::default(), corruption: 0, generation: 0 }
    }
}

impl CacheEntry {
    pub fn get(&self, kind: VariableKind) -> Option<&SlotValue> {
        self.values[kind as usize].as_ref()
    }
}

/// Mapping from note identifier to its resolved record (§3 "Evaluation
/// cache").
#[derive(Debug, Clone, Default)]
pub struct EvalCache {
    entries: HashMap<NoteId, CacheEntry>,
}

impl EvalCache {
    pub fn new() -> EvalCache {
        EvalCache::default()
    }

    pub fn get(&self, note: NoteId, kind: VariableKind) -> Option<&SlotValue> {
        self.entries.get(&note).and_then(|e| e.get(kind))
    }

    pub fn entry(&self, note: NoteId) -> Option<&CacheEntry> {
        self.entries.get(&note)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn remove_note(&mut self, note: NoteId) {
        self.entries.remove(&note);
    }

    fn write(&mut self, note: NoteId, kind: VariableKind, value: SlotValue, generation: u64) {
        let entry = self.entries.entry(note).or_default();
        if value.is_corrupted() {
            entry.corruption |= kind.corruption_bit();
        } else {
            entry.corruption &= !kind.corruption_bit();
        }
        entry.values[kind as usize] = Some(value);
        entry.generation = generation;
    }
}

/// Execute `note`'s `kind` bytecode against `cache`, writing the result back
/// (value + corruption bit + generation) before returning it (§4.3: "on
/// completion, the evaluator writes the top of stack into the cache ...").
pub fn eval_slot(
    notes: &HashMap<NoteId, Note>,
    cache: &mut EvalCache,
    note_id: NoteId,
    kind: VariableKind,
    generation: u64,
) -> SlotValue {
    let result = match notes.get(&note_id).and_then(|n| n.slot(kind)) {
        None => SlotValue::Exact(Rational::ZERO),
        Some(expr) if expr.is_empty() => SlotValue::Exact(Rational::ZERO),
        Some(expr) => run(&expr.code, notes, cache, note_id),
    };
    cache.write(note_id, kind, result.clone(), generation);
    result
}

fn run(code: &[Instr], notes: &HashMap<NoteId, Note>, cache: &EvalCache, current: NoteId) -> SlotValue {
    let mut stack: Vec<SlotValue> = Vec::with_capacity(code.len());

    macro_rules! pop {
        () => {
            match stack.pop() {
                Some(SlotValue::Error(e)) => return SlotValue::Error(e),
                Some(v) => v,
                None => return SlotValue::Error(EngineError::ParseError("stack underflow".into())),
            }
        };
    }

    for instr in code {
        let value = match instr {
            Instr::LoadConst(num, den) => match Rational::checked_new(*num as i64, *den as i64) {
                Ok(r) => SlotValue::Exact(r),
                Err(e) => return SlotValue::Error(e),
            },
            Instr::LoadRef(target, kind) => {
                if !notes.contains_key(target) {
                    return SlotValue::Error(EngineError::MissingReference(current, *target));
                }
                match read_cached(notes, cache, *target, *kind) {
                    Ok(v) => v,
                    Err(e) => return SlotValue::Error(e),
                }
            }
            Instr::LoadBase(kind) => match read_cached(notes, cache, BASE_NOTE_ID, *kind) {
                Ok(v) => v,
                Err(e) => return SlotValue::Error(e),
            },
            Instr::Add => {
                let b = pop!();
                let a = pop!();
                binary(a, b, |x, y| Ok(x.add(y)), |x, y| x + y)
            }
            Instr::Sub => {
                let b = pop!();
                let a = pop!();
                binary(a, b, |x, y| Ok(x.sub(y)), |x, y| x - y)
            }
            Instr::Mul => {
                let b = pop!();
                let a = pop!();
                binary(a, b, |x, y| Ok(x.mul(y)), |x, y| x * y)
            }
            Instr::Div => {
                let b = pop!();
                let a = pop!();
                match (&a, &b) {
                    (SlotValue::Exact(_), SlotValue::Exact(y)) if y.is_zero() => {
                        return SlotValue::Error(EngineError::DivideByZero)
                    }
                    _ => binary(a, b, |x, y| x.div(y), |x, y| x / y),
                }
            }
            Instr::Neg => {
                let a = pop!();
                match a {
                    SlotValue::Exact(r) => SlotValue::Exact(r.neg()),
                    SlotValue::Corrupted(f) => SlotValue::Corrupted(-f),
                    SlotValue::Error(e) => return SlotValue::Error(e),
                }
            }
            Instr::Pow => {
                let exp = pop!();
                let base = pop!();
                match (base, exp) {
                    (SlotValue::Exact(b), SlotValue::Exact(e)) => {
                        SlotValue::numeric(b.pow_rational(e.numer(), e.denom()))
                    }
                    (b, e) => SlotValue::Corrupted(b.as_f64().powf(e.as_f64())),
                }
            }
            Instr::FindTempo => {
                let r = pop!();
                match ref_note_id(&r, current) {
                    Ok(target) => resolve_tempo(notes, cache, target),
                    Err(e) => return SlotValue::Error(e),
                }
            }
            Instr::FindMeasure => {
                let r = pop!();
                match ref_note_id(&r, current) {
                    Ok(target) => resolve_measure(notes, cache, target),
                    Err(e) => return SlotValue::Error(e),
                }
            }
            Instr::Dup => {
                let top = match stack.last() {
                    Some(v) => v.clone(),
                    None => return SlotValue::Error(EngineError::ParseError("stack underflow".into())),
                };
                stack.push(top.clone());
                top
            }
            Instr::Swap => {
                let len = stack.len();
                if len < 2 {
                    return SlotValue::Error(EngineError::ParseError("stack underflow".into()));
                }
                stack.swap(len - 2, len - 1);
                continue;
            }
        };
        stack.push(value);
    }

    stack.pop().unwrap_or(SlotValue::Exact(Rational::ZERO))
}

fn binary(
    a: SlotValue,
    b: SlotValue,
    exact_op: impl Fn(Rational, Rational) -> Result<Rational, EngineError>,
    float_op: impl Fn(f64, f64) -> f64,
) -> SlotValue {
    match (a, b) {
        (SlotValue::Error(e), _) | (_, SlotValue::Error(e)) => SlotValue::Error(e),
        (SlotValue::Exact(x), SlotValue::Exact(y)) => match exact_op(x, y) {
            Ok(r) => SlotValue::Exact(r),
            Err(e) => SlotValue::Error(e),
        },
        (x, y) => SlotValue::Corrupted(float_op(x.as_f64(), y.as_f64())),
    }
}

/// Read `(note, kind)` from the cache; an unset slot defaults to exact zero
/// (§3), a set-but-uncached slot is a genuine staleness bug.
fn read_cached(
    notes: &HashMap<NoteId, Note>,
    cache: &EvalCache,
    note: NoteId,
    kind: VariableKind,
) -> Result<SlotValue, EngineError> {
    match cache.get(note, kind) {
        Some(v) => Ok(v.clone()),
        None => match notes.get(&note).and_then(|n| n.slot(kind)) {
            None => Ok(SlotValue::Exact(Rational::ZERO)),
            Some(_) => Err(EngineError::Stale(note, kind)),
        },
    }
}

fn ref_note_id(value: &SlotValue, current: NoteId) -> Result<NoteId, EngineError> {
    match value {
        SlotValue::Exact(r) if r.is_integer() && r.numer() >= 0 => Ok(r.numer() as NoteId),
        SlotValue::Error(e) => Err(e.clone()),
        _ => Err(EngineError::InvalidReference(current)),
    }
}

/// Walk the `StartTime` ancestor chain from `start` until a note defines
/// `kind` (`Tempo` or `BeatsPerMeasure`), falling back to the base note
/// (§4.3, §4.5). Loop-guarded by a visited set (§4.4 "loop guards").
fn resolve_inherited(notes: &HashMap<NoteId, Note>, start: NoteId, kind: VariableKind) -> NoteId {
    let mut current = start;
    let mut visited = HashSet::new();
    loop {
        if !visited.insert(current) {
            return BASE_NOTE_ID;
        }
        let Some(note) = notes.get(&current) else {
            return BASE_NOTE_ID;
        };
        if note.slot(kind).is_some() {
            return current;
        }
        if current == BASE_NOTE_ID {
            return BASE_NOTE_ID;
        }
        match note.start_time.as_ref() {
            Some(expr) if expr.refs.len() == 1 && !expr.references_base => {
                current = expr.refs[0];
            }
            Some(expr) if expr.refs.is_empty() && expr.references_base => {
                current = BASE_NOTE_ID;
            }
            _ => return BASE_NOTE_ID,
        }
    }
}

fn resolve_tempo(notes: &HashMap<NoteId, Note>, cache: &EvalCache, start: NoteId) -> SlotValue {
    let source = resolve_inherited(notes, start, VariableKind::Tempo);
    cache
        .get(source, VariableKind::Tempo)
        .cloned()
        .unwrap_or(SlotValue::Exact(Rational::ZERO))
}

fn resolve_beats_per_measure(notes: &HashMap<NoteId, Note>, cache: &EvalCache, start: NoteId) -> SlotValue {
    let source = resolve_inherited(notes, start, VariableKind::BeatsPerMeasure);
    cache
        .get(source, VariableKind::BeatsPerMeasure)
        .cloned()
        .unwrap_or(SlotValue::Exact(Rational::ZERO))
}

/// `(60 / FindTempo(ref)) * BeatsPerMeasure(ref)` (§4.3).
fn resolve_measure(notes: &HashMap<NoteId, Note>, cache: &EvalCache, start: NoteId) -> SlotValue {
    let tempo = resolve_tempo(notes, cache, start);
    let beats = resolve_beats_per_measure(notes, cache, start);
    match (&tempo, &beats) {
        (SlotValue::Error(e), _) | (_, SlotValue::Error(e)) => SlotValue::Error(e.clone()),
        (SlotValue::Exact(t), SlotValue::Exact(b)) => {
            if t.is_zero() {
                SlotValue::Error(EngineError::DivideByZero)
            } else {
                match Rational::new(60, 1).div(*t) {
                    Ok(beat) => SlotValue::Exact(beat.mul(*b)),
                    Err(e) => SlotValue::Error(e),
                }
            }
        }
        _ => SlotValue::Corrupted((60.0 / tempo.as_f64()) * beats.as_f64()),
    }
}

/// Exposed for the module layer's `findTempo`/`findMeasureLength` effect
/// queries (§4.5), which need the same inheritance walk outside of a slot
/// evaluation.
pub fn find_tempo(notes: &HashMap<NoteId, Note>, cache: &EvalCache, note: NoteId) -> SlotValue {
    resolve_tempo(notes, cache, note)
}

pub fn find_measure_length(notes: &HashMap<NoteId, Note>, cache: &EvalCache, note: NoteId) -> SlotValue {
    resolve_measure(notes, cache, note)
}

/// Fixed per-note evaluation order: `Tempo, BeatsPerMeasure, MeasureLength,
/// StartTime, Duration, Frequency` (§4.5).
pub const SLOT_EVAL_ORDER: [VariableKind; 6] = [
    VariableKind::Tempo,
    VariableKind::BeatsPerMeasure,
    VariableKind::MeasureLength,
    VariableKind::StartTime,
    VariableKind::Duration,
    VariableKind::Frequency,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Expression;

    fn note_with(id: NoteId, kind: VariableKind, code: Vec<Instr>) -> Note {
        let mut n = Note::new(id);
        let refs: Vec<NoteId> = code.iter().filter_map(|i| i.referenced_note()).collect();
        let references_base = code.iter().any(|i| i.references_base());
        n.set_slot(kind, Expression { code, refs, references_base, source: String::new() });
        n
    }

    #[test]
    fn constant_evaluates_exactly() {
        let notes = HashMap::new();
        let mut cache = EvalCache::new();
        let code = vec![Instr::LoadConst(3, 2)];
        let mut n = HashMap::new();
        n.insert(1, note_with(1, VariableKind::Frequency, code));
        let v = eval_slot(&n, &mut cache, 1, VariableKind::Frequency, 1);
        assert_eq!(v, SlotValue::Exact(Rational::new(3, 2)));
        let _ = notes;
    }

    #[test]
    fn pow_twelve_twelfths_is_exact() {
        let mut notes = HashMap::new();
        notes.insert(
            0,
            note_with(0, VariableKind::Frequency, vec![Instr::LoadConst(1, 1)]),
        );
        let mut cache = EvalCache::new();
        eval_slot(&notes, &mut cache, 0, VariableKind::Frequency, 1);

        notes.insert(
            12,
            note_with(
                12,
                VariableKind::Frequency,
                vec![
                    Instr::LoadBase(VariableKind::Frequency),
                    Instr::LoadConst(2, 1),
                    Instr::LoadConst(12, 1),
                    Instr::LoadConst(12, 1),
                    Instr::Div,
                    Instr::Pow,
                    Instr::Mul,
                ],
            ),
        );
        let v = eval_slot(&notes, &mut cache, 12, VariableKind::Frequency, 1);
        assert_eq!(v, SlotValue::Exact(Rational::from_integer(2)));
    }

    #[test]
    fn pow_seven_twelfths_corrupts() {
        let mut notes = HashMap::new();
        notes.insert(
            7,
            note_with(
                7,
                VariableKind::Frequency,
                vec![
                    Instr::LoadConst(2, 1),
                    Instr::LoadConst(7, 1),
                    Instr::LoadConst(12, 1),
                    Instr::Div,
                    Instr::Pow,
                ],
            ),
        );
        let mut cache = EvalCache::new();
        let v = eval_slot(&notes, &mut cache, 7, VariableKind::Frequency, 1);
        assert!(v.is_corrupted());
    }

    #[test]
    fn division_by_zero_is_recorded_as_error_not_panic() {
        let mut notes = HashMap::new();
        notes.insert(
            1,
            note_with(
                1,
                VariableKind::Frequency,
                vec![Instr::LoadConst(1, 1), Instr::LoadConst(0, 1), Instr::Div],
            ),
        );
        let mut cache = EvalCache::new();
        let v = eval_slot(&notes, &mut cache, 1, VariableKind::Frequency, 1);
        assert!(matches!(v, SlotValue::Error(EngineError::DivideByZero)));
    }

    #[test]
    fn missing_reference_is_an_error() {
        let mut notes = HashMap::new();
        notes.insert(
            1,
            note_with(1, VariableKind::StartTime, vec![Instr::LoadRef(99, VariableKind::StartTime)]),
        );
        let mut cache = EvalCache::new();
        let v = eval_slot(&notes, &mut cache, 1, VariableKind::StartTime, 1);
        assert!(matches!(v, SlotValue::Error(EngineError::MissingReference(1, 99))));
    }

    #[test]
    fn unset_slot_defaults_to_zero() {
        let notes = HashMap::from([(1, Note::new(1))]);
        let mut cache = EvalCache::new();
        let v = eval_slot(&notes, &mut cache, 1, VariableKind::Duration, 1);
        assert_eq!(v, SlotValue::Exact(Rational::ZERO));
    }

    #[test]
    fn slot_eval_order_is_a_permutation_of_all_kinds() {
        let mut sorted = SLOT_EVAL_ORDER.to_vec();
        sorted.sort();
        let mut all = ALL_VARIABLE_KINDS.to_vec();
        all.sort();
        assert_eq!(sorted, all);
    }
}
