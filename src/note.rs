//! Note entity (§3).

use crate::bytecode::Expression;
use crate::variable::VariableKind;

/// Stable note identifier. Persisted as `u32` in JSON (§6.1); bytecode
/// references truncate to `u16` at the instruction-encoding boundary (§6.2) —
/// compositions with more than 65535 live notes are outside what this engine
/// can express as dependencies, which the compiler reports rather than
/// silently wrapping (see `compiler::emit`).
pub type NoteId = u32;

/// The id reserved for the base note; the conceptual root of the graph.
pub const BASE_NOTE_ID: NoteId = 0;

#[derive(Debug, Clone)]
pub struct Note {
    pub id: NoteId,
    pub start_time: Option<Expression>,
    pub duration: Option<Expression>,
    pub frequency: Option<Expression>,
    pub tempo: Option<Expression>,
    pub beats_per_measure: Option<Expression>,
    pub measure_length: Option<Expression>,
    /// Opaque to the core; passed through verbatim by the serializer.
    pub color: Option<String>,
    /// Opaque to the core; passed through verbatim by the serializer.
    pub instrument: Option<String>,
}

impl Note {
    pub fn new(id: NoteId) -> Note {
        Note {
            id,
            start_time: None,
            duration: None,
            frequency: None,
            tempo: None,
            beats_per_measure: None,
            measure_length: None,
            color: None,
            instrument: None,
        }
    }

    pub fn slot(&self, kind: VariableKind) -> Option<&Expression> {
        match kind {
            VariableKind::StartTime => self.start_time.as_ref(),
            VariableKind::Duration => self.duration.as_ref(),
            VariableKind::Frequency => self.frequency.as_ref(),
            VariableKind::Tempo => self.tempo.as_ref(),
            VariableKind::BeatsPerMeasure => self.beats_per_measure.as_ref(),
            VariableKind::MeasureLength => self.measure_length.as_ref(),
        }
    }

    pub fn set_slot(&mut self, kind: VariableKind, expr: Expression) {
        match kind {
            VariableKind::StartTime => self.start_time = Some(expr),
            VariableKind::Duration => self.duration = Some(expr),
            VariableKind::Frequency => self.frequency = Some(expr),
            VariableKind::Tempo => self.tempo = Some(expr),
            VariableKind::BeatsPerMeasure => self.beats_per_measure = Some(expr),
            VariableKind::MeasureLength => self.measure_length = Some(expr),
        }
    }

    /// A measure marker has a start time but no duration or frequency (§3).
    /// Behavioral, not structural: any note satisfying this shape is one.
    pub fn is_measure_marker(&self) -> bool {
        self.start_time.is_some() && self.duration.is_none() && self.frequency.is_none()
    }

    pub fn is_base(&self) -> bool {
        self.id == BASE_NOTE_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_note_has_no_slots() {
        let n = Note::new(3);
        for kind in crate::variable::ALL_VARIABLE_KINDS {
            assert!(n.slot(kind).is_none());
        }
    }

    #[test]
    fn measure_marker_shape() {
        let mut n = Note::new(1);
        assert!(!n.is_measure_marker());
        n.set_slot(VariableKind::StartTime, Expression::zero(""));
        assert!(n.is_measure_marker());
        n.set_slot(VariableKind::Duration, Expression::zero(""));
        assert!(!n.is_measure_marker());
    }
}
