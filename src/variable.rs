//! The six slots a note exposes (§3 "Variable Kind").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum VariableKind {
    StartTime = 0,
    Duration = 1,
    Frequency = 2,
    Tempo = 3,
    BeatsPerMeasure = 4,
    MeasureLength = 5,
}

pub const ALL_VARIABLE_KINDS: [VariableKind; 6] = [
    VariableKind::StartTime,
    VariableKind::Duration,
    VariableKind::Frequency,
    VariableKind::Tempo,
    VariableKind::BeatsPerMeasure,
    VariableKind::MeasureLength,
];

/// The three slots that participate in the per-slot-on-slot dependency
/// indexes (§4.4); `MeasureLength` producers fold into `Duration`.
pub const GRAPH_SLOT_KINDS: [VariableKind; 3] =
    [VariableKind::StartTime, VariableKind::Duration, VariableKind::Frequency];

impl VariableKind {
    pub fn corruption_bit(self) -> u8 {
        1 << (self as u8)
    }

    pub fn from_u8(v: u8) -> Option<VariableKind> {
        match v {
            0 => Some(VariableKind::StartTime),
            1 => Some(VariableKind::Duration),
            2 => Some(VariableKind::Frequency),
            3 => Some(VariableKind::Tempo),
            4 => Some(VariableKind::BeatsPerMeasure),
            5 => Some(VariableKind::MeasureLength),
            _ => None,
        }
    }

    /// Fold `MeasureLength` onto `Duration` for the per-slot-on-slot indexes
    /// (§4.4: "MeasureLength references are folded into the Duration
    /// producer").
    pub fn as_graph_producer(self) -> VariableKind {
        match self {
            VariableKind::MeasureLength => VariableKind::Duration,
            other => other,
        }
    }

    /// Parse one of the DSL property shortcuts (§4.2).
    pub fn from_shortcut(name: &str) -> Option<VariableKind> {
        match name {
            "f" | "freq" | "frequency" => Some(VariableKind::Frequency),
            "t" | "s" | "start" | "startTime" => Some(VariableKind::StartTime),
            "d" | "dur" | "duration" => Some(VariableKind::Duration),
            "tempo" => Some(VariableKind::Tempo),
            "bpm" | "beatsPerMeasure" => Some(VariableKind::BeatsPerMeasure),
            "ml" | "measureLength" => Some(VariableKind::MeasureLength),
            _ => None,
        }
    }

    /// Canonical long-form JSON field name used by the serializer (§6.1).
    pub fn json_key(self) -> &'static str {
        match self {
            VariableKind::StartTime => "startTime",
            VariableKind::Duration => "duration",
            VariableKind::Frequency => "frequency",
            VariableKind::Tempo => "tempo",
            VariableKind::BeatsPerMeasure => "beatsPerMeasure",
            VariableKind::MeasureLength => "measureLength",
        }
    }

    /// Canonical DSL property accessor used when decompiling (§6.3).
    pub fn dsl_accessor(self) -> &'static str {
        match self {
            VariableKind::StartTime => "t",
            VariableKind::Duration => "d",
            VariableKind::Frequency => "f",
            VariableKind::Tempo => "tempo",
            VariableKind::BeatsPerMeasure => "bpm",
            VariableKind::MeasureLength => "ml",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortcuts_cover_every_kind() {
        for kind in ALL_VARIABLE_KINDS {
            assert_eq!(VariableKind::from_shortcut(kind.dsl_accessor()), Some(kind));
        }
    }

    #[test]
    fn corruption_bits_are_distinct() {
        let bits: Vec<u8> = ALL_VARIABLE_KINDS.iter().map(|k| k.corruption_bit()).collect();
        assert_eq!(bits, vec![1, 2, 4, 8, 16, 32]);
    }

    #[test]
    fn measure_length_folds_to_duration() {
        assert_eq!(VariableKind::MeasureLength.as_graph_producer(), VariableKind::Duration);
        assert_eq!(VariableKind::StartTime.as_graph_producer(), VariableKind::StartTime);
    }
}
