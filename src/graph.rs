//! Bidirectional dependency graph with property-level granularity (L4, §4.4).
//!
//! Three families of index are kept in lockstep on every [`DependencyGraph::register`]:
//!
//! - **General**: `deps`/`dependents` across all six slots, plus the set of
//!   notes that reference the base note anywhere.
//! - **Per-slot**: the same shape, restricted to `StartTime`/`Duration`/`Frequency`.
//! - **Per-slot-on-slot**: nine `(consumerSlot, producerSlot)` maps answering
//!   "which notes' slot X changes when note N's slot Y changes" in
//!   `O(result size)` (§9 "property-level effect sets").
//!
//! `MeasureLength` producer references fold onto `Duration`
//! ([`VariableKind::as_graph_producer`]) because measure length is
//! duration-like (tempo × beats-per-measure), per §4.4.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::EngineError;
use crate::note::{Note, NoteId};
use crate::variable::{VariableKind, ALL_VARIABLE_KINDS, GRAPH_SLOT_KINDS};

type NoteSet = HashSet<NoteId>;

fn graph_slot_index(kind: VariableKind) -> usize {
    match kind {
        VariableKind::StartTime => 0,
        VariableKind::Duration => 1,
        VariableKind::Frequency => 2,
        _ => unreachable!("graph_slot_index called with a non-graph-slot kind"),
    }
}

/// `None` when `kind` (after `MeasureLength` folds to `Duration`) isn't one
/// of the three slots the per-slot-on-slot grid tracks as a producer — i.e.
/// references to `Tempo`/`BeatsPerMeasure` show up in the general indexes
/// only (§4.4).
fn producer_slot_index(kind: VariableKind) -> Option<usize> {
    match kind.as_graph_producer() {
        VariableKind::StartTime => Some(0),
        VariableKind::Duration => Some(1),
        VariableKind::Frequency => Some(2),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    deps: HashMap<NoteId, NoteSet>,
    dependents: HashMap<NoteId, NoteSet>,
    base_note_dependents: NoteSet,

    slot_deps: [HashMap<NoteId, NoteSet>; 3],
    slot_dependents: [HashMap<NoteId, NoteSet>; 3],
    slot_base_note_dependents: [NoteSet; 3],

    /// `slot_on_slot_deps[consumer][producer][note] = producer notes`.
    slot_on_slot_deps: [[HashMap<NoteId, NoteSet>; 3]; 3],
    /// `slot_on_slot_dependents[consumer][producer][producer_note] = consumer notes`.
    slot_on_slot_dependents: [[HashMap<NoteId, NoteSet>; 3]; 3],

    corruption: HashMap<NoteId, u8>,
}

/// Extracted forward-dependency shape of one note, computed fresh from its
/// six slots ahead of a `register` call.
struct NoteDeps {
    general: NoteSet,
    references_base: bool,
    slot_deps: [NoteSet; 3],
    slot_references_base: [bool; 3],
    /// `slot_on_slot[consumer_idx][producer_idx]`.
    slot_on_slot: [[NoteSet; 3]; 3],
}

fn extract(note: &Note) -> NoteDeps {
    let mut general = NoteSet::new();
    let mut references_base = false;
    let mut slot_deps: [NoteSet; 3] = Default::default();
    let mut slot_references_base = [false; 3];
    let mut slot_on_slot: [[NoteSet; 3]; 3] = Default::default();

    for kind in ALL_VARIABLE_KINDS {
        if let Some(expr) = note.slot(kind) {
            general.extend(expr.refs.iter().copied());
            references_base |= expr.references_base;
        }
    }

    for &consumer_kind in &GRAPH_SLOT_KINDS {
        let idx = graph_slot_index(consumer_kind);
        if let Some(expr) = note.slot(consumer_kind) {
            slot_deps[idx].extend(expr.refs.iter().copied());
            slot_references_base[idx] = expr.references_base;

            for instr in &expr.code {
                if let crate::bytecode::Instr::LoadRef(target, producer_kind) = instr {
                    if let Some(p_idx) = producer_slot_index(*producer_kind) {
                        slot_on_slot[idx][p_idx].insert(*target);
                    }
                }
            }
        }
    }

    NoteDeps { general, references_base, slot_deps, slot_references_base, slot_on_slot }
}

impl DependencyGraph {
    pub fn new() -> DependencyGraph {
        DependencyGraph::default()
    }

    fn can_reach(&self, from: NoteId, to: NoteId) -> bool {
        if from == to {
            return true;
        }
        let mut visited = NoteSet::new();
        let mut stack = vec![from];
        while let Some(cur) = stack.pop() {
            if !visited.insert(cur) {
                continue;
            }
            if cur == to {
                return true;
            }
            if let Some(neighbors) = self.deps.get(&cur) {
                stack.extend(neighbors.iter().copied());
            }
        }
        false
    }

    /// Would adding edges `note -> r` for every `r` in `new_general` create a
    /// cycle, given the graph as it stands *before* this edit (§4.4 "pre-edit
    /// validation")?
    fn would_cycle(&self, note: NoteId, new_general: &NoteSet) -> bool {
        new_general.iter().any(|&r| r == note || self.can_reach(r, note))
    }

    /// Re-register `note`'s forward/inverse edges across all three index
    /// families, rejecting the edit if it would introduce a cycle. On
    /// rejection the graph is left completely unchanged (§4.5, §7).
    /// `changed_kind` is only used to shape the error if a cycle is found.
    pub fn register(&mut self, note: &Note, changed_kind: VariableKind) -> Result<(), EngineError> {
        let new = extract(note);
        if self.would_cycle(note.id, &new.general) {
            return Err(EngineError::WouldCreateCycle { note: note.id, kind: changed_kind });
        }

        let id = note.id;

        // General.
        let old_general = self.deps.remove(&id).unwrap_or_default();
        apply_diff(&old_general, &new.general, |target, present| {
            let set = self.dependents.entry(target).or_default();
            if present {
                set.insert(id);
            } else {
                set.remove(&id);
            }
        });
        self.deps.insert(id, new.general.clone());
        if new.references_base {
            self.base_note_dependents.insert(id);
        } else {
            self.base_note_dependents.remove(&id);
        }

        // Per-slot.
        for i in 0..3 {
            let old = self.slot_deps[i].remove(&id).unwrap_or_default();
            apply_diff(&old, &new.slot_deps[i], |target, present| {
                let set = self.slot_dependents[i].entry(target).or_default();
                if present {
                    set.insert(id);
                } else {
                    set.remove(&id);
                }
            });
            self.slot_deps[i].insert(id, new.slot_deps[i].clone());
            if new.slot_references_base[i] {
                self.slot_base_note_dependents[i].insert(id);
            } else {
                self.slot_base_note_dependents[i].remove(&id);
            }
        }

        // Per-slot-on-slot.
        for c in 0..3 {
            for p in 0..3 {
                let old = self.slot_on_slot_deps[c][p].remove(&id).unwrap_or_default();
                apply_diff(&old, &new.slot_on_slot[c][p], |target, present| {
                    let set = self.slot_on_slot_dependents[c][p].entry(target).or_default();
                    if present {
                        set.insert(id);
                    } else {
                        set.remove(&id);
                    }
                });
                self.slot_on_slot_deps[c][p].insert(id, new.slot_on_slot[c][p].clone());
            }
        }

        Ok(())
    }

    /// Delete all of `note`'s forward entries and scrub it from every
    /// dependent's forward set (§4.4 "Remove").
    pub fn remove(&mut self, note: NoteId) {
        if let Some(old) = self.deps.remove(&note) {
            for target in old {
                if let Some(set) = self.dependents.get_mut(&target) {
                    set.remove(&note);
                }
            }
        }
        self.dependents.remove(&note);
        self.base_note_dependents.remove(&note);

        for i in 0..3 {
            if let Some(old) = self.slot_deps[i].remove(&note) {
                for target in old {
                    if let Some(set) = self.slot_dependents[i].get_mut(&target) {
                        set.remove(&note);
                    }
                }
            }
            self.slot_dependents[i].remove(&note);
            self.slot_base_note_dependents[i].remove(&note);
        }

        for c in 0..3 {
            for p in 0..3 {
                if let Some(old) = self.slot_on_slot_deps[c][p].remove(&note) {
                    for target in old {
                        if let Some(set) = self.slot_on_slot_dependents[c][p].get_mut(&target) {
                            set.remove(&note);
                        }
                    }
                }
                self.slot_on_slot_dependents[c][p].remove(&note);
            }
        }

        self.corruption.remove(&note);
    }

    pub fn dependents_of(&self, note: NoteId) -> NoteSet {
        self.dependents.get(&note).cloned().unwrap_or_default()
    }

    pub fn deps_of(&self, note: NoteId) -> NoteSet {
        self.deps.get(&note).cloned().unwrap_or_default()
    }

    pub fn references_base(&self, note: NoteId) -> bool {
        self.base_note_dependents.contains(&note)
    }

    /// Every note whose some slot reads the base note directly (`LoadBase`),
    /// as opposed to an explicit `LoadRef` to note 0 — the base note is
    /// never a key in `dependents` since nothing may hold an explicit
    /// reference to it (§4.2, §4.4).
    pub fn base_note_dependents(&self) -> NoteSet {
        self.base_note_dependents.clone()
    }

    /// BFS closure over `deps` (§4.4 "Transitive forward dependencies").
    pub fn transitive_deps(&self, note: NoteId) -> NoteSet {
        bfs(note, |n| self.deps.get(&n).cloned().unwrap_or_default())
    }

    /// BFS closure over `dependents` (§4.4 "Transitive general dependents").
    /// Does not include `note` itself.
    pub fn transitive_dependents(&self, note: NoteId) -> NoteSet {
        bfs(note, |n| self.dependents.get(&n).cloned().unwrap_or_default())
    }

    /// All `(note, slot)` pairs reachable by following per-slot-on-slot
    /// edges starting from a change at `(note, producer_slot)` (§4.4
    /// "Slot-typed transitive effect"). Each `(note, slot)` pair is visited
    /// at most once. `producer_slot` is folded via `as_graph_producer`
    /// before lookup.
    pub fn slot_typed_transitive_effect(
        &self,
        note: NoteId,
        producer_slot: VariableKind,
    ) -> Vec<(NoteId, VariableKind)> {
        let Some(p_idx) = producer_slot_index(producer_slot) else {
            return Vec::new();
        };

        let mut visited: HashSet<(NoteId, usize)> = HashSet::new();
        let mut queue: VecDeque<(NoteId, usize)> = VecDeque::new();
        let mut out = Vec::new();

        queue.push_back((note, p_idx));
        visited.insert((note, p_idx));

        while let Some((cur_note, cur_idx)) = queue.pop_front() {
            for consumer_idx in 0..3 {
                let Some(consumers) = self.slot_on_slot_dependents[consumer_idx][cur_idx].get(&cur_note) else {
                    continue;
                };
                for &consumer_note in consumers {
                    let key = (consumer_note, consumer_idx);
                    if visited.insert(key) {
                        out.push((consumer_note, GRAPH_SLOT_KINDS[consumer_idx]));
                        queue.push_back(key);
                    }
                }
            }
        }

        out
    }

    /// Kahn's algorithm restricted to `subset`, ties broken by identifier for
    /// determinism (§4.4 "Topological order").
    pub fn topological_order(&self, subset: &NoteSet) -> Vec<NoteId> {
        let mut in_degree: HashMap<NoteId, usize> = HashMap::new();
        for &n in subset {
            in_degree.insert(n, 0);
        }
        for &n in subset {
            for dep in self.deps.get(&n).into_iter().flatten() {
                if subset.contains(dep) {
                    *in_degree.get_mut(&n).unwrap() += 1;
                }
            }
        }

        let mut ready: std::collections::BTreeSet<NoteId> =
            in_degree.iter().filter(|(_, &d)| d == 0).map(|(&n, _)| n).collect();
        let mut order = Vec::with_capacity(subset.len());

        while let Some(&n) = ready.iter().next() {
            ready.remove(&n);
            order.push(n);
            if let Some(dependents) = self.dependents.get(&n) {
                for &dep_note in dependents {
                    if let Some(d) = in_degree.get_mut(&dep_note) {
                        *d -= 1;
                        if *d == 0 {
                            ready.insert(dep_note);
                        }
                    }
                }
            }
        }

        order
    }

    pub fn corruption(&self, note: NoteId) -> u8 {
        self.corruption.get(&note).copied().unwrap_or(0)
    }

    pub fn set_corruption_bit(&mut self, note: NoteId, kind: VariableKind, corrupted: bool) {
        let bit = kind.corruption_bit();
        let entry = self.corruption.entry(note).or_insert(0);
        if corrupted {
            *entry |= bit;
        } else {
            *entry &= !bit;
        }
    }

    pub fn clear_corruption(&mut self, note: NoteId) {
        self.corruption.remove(&note);
    }
}

fn apply_diff(old: &NoteSet, new: &NoteSet, mut on_change: impl FnMut(NoteId, bool)) {
    for &target in old.difference(new) {
        on_change(target, false);
    }
    for &target in new.difference(old) {
        on_change(target, true);
    }
}

fn bfs(start: NoteId, neighbors: impl Fn(NoteId) -> NoteSet) -> NoteSet {
    let mut visited = NoteSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(start);
    while let Some(n) = queue.pop_front() {
        for next in neighbors(n) {
            if visited.insert(next) {
                queue.push_back(next);
            }
        }
    }
    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Expression, Instr};
    use crate::note::Note;

    fn note_ref(id: NoteId, kind: VariableKind, target: NoteId, target_kind: VariableKind) -> Note {
        let mut n = Note::new(id);
        n.set_slot(
            kind,
            Expression {
                code: vec![Instr::LoadRef(target, target_kind)],
                refs: vec![target],
                references_base: false,
                source: format!("[{}].{:?}", target, target_kind),
            },
        );
        n
    }

    #[test]
    fn register_populates_forward_and_inverse() {
        let mut g = DependencyGraph::new();
        let n = note_ref(2, VariableKind::StartTime, 1, VariableKind::StartTime);
        g.register(&n, VariableKind::StartTime).unwrap();
        assert!(g.deps_of(2).contains(&1));
        assert!(g.dependents_of(1).contains(&2));
    }

    #[test]
    fn rejects_cycle() {
        let mut g = DependencyGraph::new();
        let a = note_ref(1, VariableKind::StartTime, 2, VariableKind::StartTime);
        g.register(&a, VariableKind::StartTime).unwrap();

        let b = note_ref(2, VariableKind::StartTime, 1, VariableKind::StartTime);
        let err = g.register(&b, VariableKind::StartTime).unwrap_err();
        assert!(matches!(err, EngineError::WouldCreateCycle { note: 2, .. }));
        // Rejected edit must leave state unchanged.
        assert!(g.deps_of(2).is_empty());
    }

    #[test]
    fn remove_clears_forward_and_inverse() {
        let mut g = DependencyGraph::new();
        let n = note_ref(2, VariableKind::StartTime, 1, VariableKind::StartTime);
        g.register(&n, VariableKind::StartTime).unwrap();
        g.remove(2);
        assert!(g.deps_of(2).is_empty());
        assert!(g.dependents_of(1).is_empty());
    }

    #[test]
    fn transitive_dependents_follows_chain() {
        let mut g = DependencyGraph::new();
        g.register(&note_ref(2, VariableKind::StartTime, 1, VariableKind::StartTime), VariableKind::StartTime)
            .unwrap();
        g.register(&note_ref(3, VariableKind::StartTime, 2, VariableKind::StartTime), VariableKind::StartTime)
            .unwrap();
        let dependents = g.transitive_dependents(1);
        assert!(dependents.contains(&2));
        assert!(dependents.contains(&3));
    }

    #[test]
    fn topological_order_is_deterministic_and_valid() {
        let mut g = DependencyGraph::new();
        g.register(&note_ref(2, VariableKind::StartTime, 1, VariableKind::StartTime), VariableKind::StartTime)
            .unwrap();
        g.register(&note_ref(3, VariableKind::StartTime, 1, VariableKind::StartTime), VariableKind::StartTime)
            .unwrap();
        let subset: NoteSet = [1, 2, 3].into_iter().collect();
        let order = g.topological_order(&subset);
        let pos1 = order.iter().position(|&n| n == 1).unwrap();
        let pos2 = order.iter().position(|&n| n == 2).unwrap();
        let pos3 = order.iter().position(|&n| n == 3).unwrap();
        assert!(pos1 < pos2 && pos1 < pos3);
        // 2 and 3 are both independent of each other, tie broken by id.
        assert!(pos2 < pos3);
    }

    #[test]
    fn slot_typed_transitive_effect_follows_duration_to_starttime() {
        let mut g = DependencyGraph::new();
        // note 2's StartTime depends on note 1's Duration.
        g.register(&note_ref(2, VariableKind::StartTime, 1, VariableKind::Duration), VariableKind::StartTime)
            .unwrap();
        let effects = g.slot_typed_transitive_effect(1, VariableKind::Duration);
        assert_eq!(effects, vec![(2, VariableKind::StartTime)]);
    }

    #[test]
    fn measure_length_producer_folds_to_duration() {
        let mut g = DependencyGraph::new();
        g.register(
            &note_ref(2, VariableKind::StartTime, 1, VariableKind::MeasureLength),
            VariableKind::StartTime,
        )
        .unwrap();
        let effects = g.slot_typed_transitive_effect(1, VariableKind::Duration);
        assert_eq!(effects, vec![(2, VariableKind::StartTime)]);
    }

    #[test]
    fn tempo_producer_is_not_tracked_in_slot_on_slot() {
        let mut g = DependencyGraph::new();
        g.register(&note_ref(2, VariableKind::StartTime, 1, VariableKind::Tempo), VariableKind::StartTime)
            .unwrap();
        assert!(g.slot_typed_transitive_effect(1, VariableKind::Tempo).is_empty());
        // But the general index still sees it.
        assert!(g.dependents_of(1).contains(&2));
    }
}
