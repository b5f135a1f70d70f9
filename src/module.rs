//! Reactive module (L5, §4.5): note storage, dirty tracking, topological
//! evaluation, and the JSON round-trip entry points.
//!
//! The module is the single owner of notes, the dependency graph, the
//! evaluation cache, and the compiler's memoization table (§5); nothing
//! outside this type mutates any of them directly.

use std::collections::{HashMap, HashSet};

use crate::compiler::Compiler;
use crate::error::EngineError;
use crate::evaluator::{self, EvalCache, SlotValue, SLOT_EVAL_ORDER};
use crate::graph::DependencyGraph;
use crate::note::{Note, NoteId, BASE_NOTE_ID};
use crate::serializer;
use crate::variable::VariableKind;
use crate::warnings::Warning;

/// One note's fully-resolved six slots, as returned by [`Module::evaluate`].
#[derive(Debug, Clone)]
pub struct EvaluatedNote {
    pub start_time: SlotValue,
    pub duration: SlotValue,
    pub frequency: SlotValue,
    pub tempo: SlotValue,
    pub beats_per_measure: SlotValue,
    pub measure_length: SlotValue,
    pub corruption: u8,
}

impl EvaluatedNote {
    fn from_cache(cache: &EvalCache, id: NoteId) -> EvaluatedNote {
        let get = |kind: VariableKind| {
            cache
                .get(id, kind)
                .cloned()
                .unwrap_or(SlotValue::Exact(crate::rational::Rational::ZERO))
        };
        EvaluatedNote {
            start_time: get(VariableKind::StartTime),
            duration: get(VariableKind::Duration),
            frequency: get(VariableKind::Frequency),
            tempo: get(VariableKind::Tempo),
            beats_per_measure: get(VariableKind::BeatsPerMeasure),
            measure_length: get(VariableKind::MeasureLength),
            corruption: cache.entry(id).map(|e| e.corruption).unwrap_or(0),
        }
    }
}

pub struct Module {
    notes: HashMap<NoteId, Note>,
    next_id: NoteId,
    generation: u64,
    dirty: HashSet<NoteId>,
    graph: DependencyGraph,
    cache: EvalCache,
    compiler: Compiler,
    warnings: Vec<Warning>,
}

impl Module {
    /// Construct a module with the base note's four required slots defined
    /// (§3 invariant); `measure_length` is optional and defaults to unset.
    pub fn new(start_time: &str, frequency: &str, tempo: &str, beats_per_measure: &str) -> Module {
        let mut m = Module {
            notes: HashMap::new(),
            next_id: 1,
            generation: 0,
            dirty: HashSet::new(),
            graph: DependencyGraph::new(),
            cache: EvalCache::new(),
            compiler: Compiler::new(),
            warnings: Vec::new(),
        };
        m.notes.insert(BASE_NOTE_ID, Note::new(BASE_NOTE_ID));
        // Base-note slots can never reference anything, so these calls can
        // only fail their cycle check if one of the strings itself contains
        // a reference — which set_expression below rejects separately.
        for (kind, dsl) in [
            (VariableKind::StartTime, start_time),
            (VariableKind::Frequency, frequency),
            (VariableKind::Tempo, tempo),
            (VariableKind::BeatsPerMeasure, beats_per_measure),
        ] {
            let _ = m.set_expression(BASE_NOTE_ID, kind, dsl);
        }
        m
    }

    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.get(&id)
    }

    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.notes.values()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The generation at which `note_id`'s cache entry was last written, or
    /// `0` if it has never been evaluated (§8 boundary scenario 5: "observable
    /// via a generation counter on the cache entries").
    pub fn cache_generation(&self, note_id: NoteId) -> u64 {
        self.cache.entry(note_id).map(|e| e.generation).unwrap_or(0)
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    /// Compile `dsl`, validate against cycle detection, replace the stored
    /// expression, re-register the note in every graph index, and mark the
    /// note plus its transitive general dependents dirty (§4.5).
    pub fn set_expression(&mut self, note_id: NoteId, kind: VariableKind, dsl: &str) -> Result<(), EngineError> {
        if !self.notes.contains_key(&note_id) {
            return Err(EngineError::NoteNotFound(note_id));
        }

        let expr = self.compiler.compile(note_id, kind, dsl, &mut self.warnings);

        if note_id == BASE_NOTE_ID && (!expr.refs.is_empty() || expr.references_base) {
            // Base-note expressions may not reference any other note — they
            // are the roots of the graph (§3).
            return Err(EngineError::WouldCreateCycle { note: note_id, kind });
        }

        let mut candidate = self.notes.get(&note_id).expect("checked above").clone();
        candidate.set_slot(kind, expr);

        self.graph.register(&candidate, kind)?;
        self.notes.insert(note_id, candidate);

        self.mark_dirty_with_dependents(note_id);
        self.generation += 1;
        Ok(())
    }

    /// Mark `note_id` and its transitive general dependents dirty. The base
    /// note is never a key in the graph's forward/inverse index (notes read
    /// it via `LoadBase`, not an explicit reference to id 0), so a change to
    /// the base note instead fans out from `base_note_dependents` (§4.2,
    /// §4.4).
    fn mark_dirty_with_dependents(&mut self, note_id: NoteId) {
        self.dirty.insert(note_id);
        self.dirty.extend(self.graph.transitive_dependents(note_id));
        if note_id == BASE_NOTE_ID {
            for dependent in self.graph.base_note_dependents() {
                self.dirty.insert(dependent);
                self.dirty.extend(self.graph.transitive_dependents(dependent));
            }
        }
    }

    /// Apply many `(note, kind, dsl)` edits, registering every note's final
    /// dependency shape in the graph before marking anything dirty, so the
    /// eventual topological sort reflects the batch's final graph rather
    /// than each intermediate state (§4.5 "needed for bulk import"). Edits
    /// that would create a cycle are skipped (their note's prior slot is
    /// left untouched) and reported in the returned list.
    pub fn batch_set_expressions(&mut self, changes: &[(NoteId, VariableKind, String)]) -> Vec<EngineError> {
        let mut errors = Vec::new();
        let mut touched = HashSet::new();

        for (note_id, kind, dsl) in changes {
            if !self.notes.contains_key(note_id) {
                errors.push(EngineError::NoteNotFound(*note_id));
                continue;
            }
            let expr = self.compiler.compile(*note_id, *kind, dsl, &mut self.warnings);
            if *note_id == BASE_NOTE_ID && (!expr.refs.is_empty() || expr.references_base) {
                errors.push(EngineError::WouldCreateCycle { note: *note_id, kind: *kind });
                continue;
            }
            let mut candidate = self.notes.get(note_id).expect("checked above").clone();
            candidate.set_slot(*kind, expr);
            match self.graph.register(&candidate, *kind) {
                Ok(()) => {
                    self.notes.insert(*note_id, candidate);
                    touched.insert(*note_id);
                }
                Err(e) => errors.push(e),
            }
        }

        for note_id in touched {
            self.mark_dirty_with_dependents(note_id);
        }
        if !errors.is_empty() || !self.dirty.is_empty() {
            self.generation += 1;
        }
        errors
    }

    /// `addNote()` (§4.5): allocate the next identifier, register an empty
    /// note, and mark it dirty so its first `evaluate()` gives every slot an
    /// explicit zero-valued cache entry rather than leaving it absent.
    pub fn add_note(&mut self) -> NoteId {
        let id = self.next_id;
        self.next_id += 1;
        let note = Note::new(id);
        self.graph.register(&note, VariableKind::StartTime).expect("empty note cannot cycle");
        self.notes.insert(id, note);
        self.dirty.insert(id);
        self.generation += 1;
        id
    }

    pub fn remove_note(&mut self, id: NoteId) -> Result<(), EngineError> {
        if id == BASE_NOTE_ID {
            return Err(EngineError::BaseNoteImmutable);
        }
        if !self.notes.contains_key(&id) {
            return Err(EngineError::NoteNotFound(id));
        }
        self.notes.remove(&id);
        self.graph.remove(id);
        self.cache.remove_note(id);
        self.dirty.remove(&id);
        self.generation += 1;
        Ok(())
    }

    /// `clear()` (§4.5): preserves the base note, drops everything else.
    pub fn clear(&mut self) {
        let base = self.notes.remove(&BASE_NOTE_ID);
        for id in self.notes.keys().copied().collect::<Vec<_>>() {
            self.graph.remove(id);
            self.cache.remove_note(id);
        }
        self.notes.clear();
        if let Some(base) = base {
            self.notes.insert(BASE_NOTE_ID, base);
        }
        self.next_id = 1;
        self.dirty.clear();
        self.dirty.insert(BASE_NOTE_ID);
        self.generation += 1;
    }

    /// `evaluate()` (§4.5): base note first, in fixed inter-slot order, then
    /// the topologically-ordered closure of the dirty set. Returns every
    /// note's current (possibly stale-from-a-prior-pass, if untouched)
    /// resolved values.
    pub fn evaluate(&mut self) -> HashMap<NoteId, EvaluatedNote> {
        self.generation += 1;
        let gen = self.generation;

        for kind in SLOT_EVAL_ORDER {
            let value = evaluator::eval_slot(&self.notes, &mut self.cache, BASE_NOTE_ID, kind, gen);
            self.graph.set_corruption_bit(BASE_NOTE_ID, kind, value.is_corrupted());
        }

        let mut subset: HashSet<NoteId> = HashSet::new();
        for &n in &self.dirty {
            if n == BASE_NOTE_ID {
                continue;
            }
            subset.insert(n);
            subset.extend(self.graph.transitive_dependents(n));
        }
        subset.retain(|n| *n != BASE_NOTE_ID && self.notes.contains_key(n));

        let order = self.graph.topological_order(&subset);
        for note_id in order {
            for kind in SLOT_EVAL_ORDER {
                let value = evaluator::eval_slot(&self.notes, &mut self.cache, note_id, kind, gen);
                self.graph.set_corruption_bit(note_id, kind, value.is_corrupted());
            }
        }

        self.dirty.clear();

        self.notes.keys().map(|&id| (id, EvaluatedNote::from_cache(&self.cache, id))).collect()
    }

    /// Resolve the evaluated tempo of `note_id` via the inheritance rule
    /// (§4.3, §4.5): its own tempo if defined, else walk `StartTime`
    /// ancestors, else the base note's tempo.
    pub fn find_tempo(&self, note_id: NoteId) -> SlotValue {
        evaluator::find_tempo(&self.notes, &self.cache, note_id)
    }

    pub fn find_measure_length(&self, note_id: NoteId) -> SlotValue {
        evaluator::find_measure_length(&self.notes, &self.cache, note_id)
    }

    /// Walk the `Frequency` reference chain until a note defines an
    /// instrument, else fall back to the base note's (§4.5).
    pub fn find_instrument(&self, note_id: NoteId) -> Option<String> {
        let mut current = note_id;
        let mut visited = HashSet::new();
        loop {
            if !visited.insert(current) {
                return self.notes.get(&BASE_NOTE_ID).and_then(|n| n.instrument.clone());
            }
            let Some(note) = self.notes.get(&current) else {
                return None;
            };
            if note.instrument.is_some() {
                return note.instrument.clone();
            }
            if current == BASE_NOTE_ID {
                return None;
            }
            match note.frequency.as_ref() {
                Some(expr) if expr.refs.len() == 1 && !expr.references_base => current = expr.refs[0],
                Some(expr) if expr.refs.is_empty() && expr.references_base => current = BASE_NOTE_ID,
                _ => return self.notes.get(&BASE_NOTE_ID).and_then(|n| n.instrument.clone()),
            }
        }
    }

    /// Transitive general dependents exposed to external collaborators
    /// (§4.5, §4.4).
    pub fn transitive_dependents(&self, note_id: NoteId) -> HashSet<NoteId> {
        self.graph.transitive_dependents(note_id)
    }

    pub fn slot_typed_transitive_effect(
        &self,
        note_id: NoteId,
        producer_slot: VariableKind,
    ) -> Vec<(NoteId, VariableKind)> {
        self.graph.slot_typed_transitive_effect(note_id, producer_slot)
    }

    /// The chain-link predecessor of `note_id`'s `StartTime` expression: the
    /// note id `measure(prev)` is applied to, if the expression contains
    /// that exact shape (§4.4 glossary "chain link measure").
    fn chain_predecessor(&self, note_id: NoteId) -> Option<NoteId> {
        let note = self.notes.get(&note_id)?;
        let expr = note.start_time.as_ref()?;
        find_measure_arg(&expr.code)
    }

    /// Measure chain for marker `m` (§4.4, §8 boundary scenario 4): walk
    /// backward through chain-link predecessors, then forward through each
    /// step's earliest (by evaluated `StartTime`) chain-link successor.
    /// Anchors (notes not linked via `measure(prev)`) terminate the walk in
    /// both directions. Loop-guarded by a visited set.
    pub fn measure_chain(&self, m: NoteId) -> Vec<NoteId> {
        if !self.notes.contains_key(&m) {
            return Vec::new();
        }

        let mut earliest = m;
        let mut visited = HashSet::new();
        visited.insert(m);
        while let Some(prev) = self.chain_predecessor(earliest) {
            if !visited.insert(prev) || !self.notes.contains_key(&prev) {
                break;
            }
            earliest = prev;
        }

        let mut chain = vec![earliest];
        let mut seen: HashSet<NoteId> = chain.iter().copied().collect();
        let mut current = earliest;
        loop {
            let successors: Vec<NoteId> = self
                .notes
                .keys()
                .copied()
                .filter(|&candidate| !seen.contains(&candidate) && self.chain_predecessor(candidate) == Some(current))
                .collect();
            if successors.is_empty() {
                break;
            }
            let next = successors
                .into_iter()
                .min_by(|&a, &b| {
                    let sa = self.cache.get(a, VariableKind::StartTime).map(|v| v.as_f64()).unwrap_or(f64::MAX);
                    let sb = self.cache.get(b, VariableKind::StartTime).map(|v| v.as_f64()).unwrap_or(f64::MAX);
                    sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .expect("non-empty");
            chain.push(next);
            seen.insert(next);
            current = next;
        }

        chain
    }

    pub fn create_json(&self) -> serde_json::Value {
        serializer::create_json(self)
    }

    pub fn load_from_json(data: &serde_json::Value) -> Result<Module, EngineError> {
        serializer::load_from_json(data)
    }

    pub(crate) fn notes_map(&self) -> &HashMap<NoteId, Note> {
        &self.notes
    }

    pub(crate) fn next_id_hint(&self) -> NoteId {
        self.next_id
    }

    pub(crate) fn set_next_id_hint(&mut self, id: NoteId) {
        if id > self.next_id {
            self.next_id = id;
        }
    }

    pub(crate) fn insert_bare_note(&mut self, id: NoteId) {
        self.notes.entry(id).or_insert_with(|| Note::new(id));
        self.set_next_id_hint(id + 1);
    }

    pub(crate) fn set_note_metadata(&mut self, id: NoteId, color: Option<String>, instrument: Option<String>) {
        if let Some(note) = self.notes.get_mut(&id) {
            note.color = color;
            note.instrument = instrument;
        }
    }
}

fn find_measure_arg(code: &[crate::bytecode::Instr]) -> Option<NoteId> {
    for window in code.windows(2) {
        if let [crate::bytecode::Instr::LoadConst(id, 1), crate::bytecode::Instr::FindMeasure] = window {
            return Some(*id as NoteId);
        }
    }
    None
}
