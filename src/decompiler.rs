//! Bytecode → DSL decompiler (L2, §4.3).
//!
//! Symbolic stack interpretation: each load pushes a token string, each
//! arithmetic op pops two and pushes a parenthesized combination. The short
//! DSL is the only canonical output form (§4.2); round-tripping through
//! [`crate::compiler::Compiler::compile`] must reproduce the same bytecode
//! for anything this module emits.

use crate::bytecode::Instr;
use crate::variable::VariableKind;

/// Binding power used to decide whether a child needs parenthesizing
/// against its parent operator. Higher binds tighter.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Prec {
    Sum = 0,
    Product = 1,
    Unary = 2,
    Power = 3,
    Atom = 4,
}

#[derive(Debug, Clone)]
struct Piece {
    text: String,
    prec: Prec,
}

impl Piece {
    fn atom(text: impl Into<String>) -> Piece {
        Piece { text: text.into(), prec: Prec::Atom }
    }

    /// Render this piece as an operand of an operator requiring at least
    /// `min_prec` binding power on that side, parenthesizing if needed.
    fn render_as_operand(&self, min_prec: Prec) -> String {
        if self.prec < min_prec {
            format!("({})", self.text)
        } else {
            self.text.clone()
        }
    }
}

/// Render a compiled program back to canonical short DSL text.
pub fn decompile(code: &[Instr]) -> String {
    let mut stack: Vec<Piece> = Vec::new();

    for instr in code {
        let piece = match instr {
            Instr::LoadConst(num, den) => {
                if *den == 1 {
                    Piece::atom(num.to_string())
                } else {
                    Piece::atom(format!("{}/{}", num, den))
                }
            }
            Instr::LoadRef(id, kind) => Piece::atom(format!("[{}].{}", id, kind.dsl_accessor())),
            Instr::LoadBase(kind) => Piece::atom(format!("base.{}", kind.dsl_accessor())),
            Instr::Add | Instr::Sub | Instr::Mul | Instr::Div => {
                let rhs = stack.pop().expect("decompile: stack underflow on binary op rhs");
                let lhs = stack.pop().expect("decompile: stack underflow on binary op lhs");
                binary_piece(instr, lhs, rhs)
            }
            Instr::Neg => {
                let inner = stack.pop().expect("decompile: stack underflow on neg");
                Piece {
                    text: format!("-{}", inner.render_as_operand(Prec::Unary)),
                    prec: Prec::Unary,
                }
            }
            Instr::Pow => {
                let rhs = stack.pop().expect("decompile: stack underflow on pow rhs");
                let lhs = stack.pop().expect("decompile: stack underflow on pow lhs");
                Piece {
                    text: format!(
                        "{}^{}",
                        lhs.render_as_operand(Prec::Power),
                        rhs.render_as_operand(Prec::Unary)
                    ),
                    prec: Prec::Power,
                }
            }
            Instr::FindTempo => {
                let arg = stack.pop().expect("decompile: stack underflow on FindTempo");
                Piece::atom(format!("tempo({})", arg.text))
            }
            Instr::FindMeasure => {
                let arg = stack.pop().expect("decompile: stack underflow on FindMeasure");
                Piece::atom(format!("measure({})", arg.text))
            }
            Instr::Dup => {
                let top = stack.last().cloned().expect("decompile: stack underflow on dup");
                stack.push(top.clone());
                top
            }
            Instr::Swap => {
                let len = stack.len();
                stack.swap(len - 2, len - 1);
                continue;
            }
        };
        stack.push(piece);
    }

    stack.pop().map(|p| p.text).unwrap_or_else(|| "0".to_string())
}

fn binary_piece(instr: &Instr, lhs: Piece, rhs: Piece) -> Piece {
    let (op, prec) = match instr {
        Instr::Add => ("+", Prec::Sum),
        Instr::Sub => ("-", Prec::Sum),
        Instr::Mul => ("*", Prec::Product),
        Instr::Div => ("/", Prec::Product),
        _ => unreachable!(),
    };
    // Sub/Div are left-associative and non-commutative: the rhs needs
    // parens whenever it binds no tighter than this operator to avoid
    // reassociating `a - (b - c)` into `a - b - c`.
    let rhs_min = match instr {
        Instr::Sub | Instr::Div => bump(prec),
        _ => prec,
    };
    Piece {
        text: format!("{} {} {}", lhs.render_as_operand(prec), op, rhs.render_as_operand(rhs_min)),
        prec,
    }
}

fn bump(p: Prec) -> Prec {
    match p {
        Prec::Sum => Prec::Product,
        Prec::Product => Prec::Unary,
        Prec::Unary => Prec::Power,
        Prec::Power | Prec::Atom => Prec::Atom,
    }
}

pub fn decompile_kind(_kind: VariableKind, code: &[Instr]) -> String {
    decompile(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::variable::VariableKind;
    use crate::warnings::Warning;

    fn roundtrip(src: &str) -> (Vec<Instr>, Vec<Instr>) {
        let mut c = Compiler::new();
        let mut warnings: Vec<Warning> = Vec::new();
        let first = c.compile(1, VariableKind::Frequency, src, &mut warnings);
        assert!(warnings.is_empty(), "unexpected warnings for {src}: {warnings:?}");
        let text = decompile(&first.code);
        let mut c2 = Compiler::new();
        let mut warnings2 = Vec::new();
        let second = c2.compile(1, VariableKind::Frequency, &text, &mut warnings2);
        assert!(warnings2.is_empty(), "decompiled text '{text}' failed to recompile: {warnings2:?}");
        (first.code, second.code)
    }

    #[test]
    fn roundtrips_simple_arithmetic() {
        let (a, b) = roundtrip("base.f * 3/2 + 1");
        assert_eq!(a, b);
    }

    #[test]
    fn roundtrips_subtraction_associativity() {
        let (a, b) = roundtrip("base.f - (1 - 2)");
        assert_eq!(a, b);
    }

    #[test]
    fn roundtrips_power_right_associative() {
        let (a, b) = roundtrip("2^3^2");
        assert_eq!(a, b);
    }

    #[test]
    fn roundtrips_note_reference() {
        let (a, b) = roundtrip("[1].t + [1].d");
        assert_eq!(a, b);
    }

    #[test]
    fn roundtrips_beat_helper() {
        // beat(x) normalizes to 60/tempo(x) at the bytecode level (§4.2); the
        // decompiler renders that expanded form, which recompiles to the
        // identical program rather than reproducing the word "beat".
        let (a, b) = roundtrip("beat(base)");
        assert_eq!(a, b);
    }

    #[test]
    fn roundtrips_tempo_and_measure_helpers() {
        let (a, b) = roundtrip("tempo([2]) + measure([3])");
        assert_eq!(a, b);
    }

    #[test]
    fn empty_program_decompiles_to_zero() {
        assert_eq!(decompile(&[]), "0");
    }
}
