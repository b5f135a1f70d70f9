//! AST → bytecode emission (§4.2). Post-order walk producing a valid
//! operand-stack program, plus the deduplicated reference set the
//! dependency graph needs.

use crate::bytecode::Instr;
use crate::compiler::ast::{BinOp, Expr};
use crate::note::NoteId;

pub struct Emitted {
    pub code: Vec<Instr>,
    pub refs: Vec<NoteId>,
    pub references_base: bool,
}

pub fn emit(expr: &Expr) -> Result<Emitted, String> {
    let mut code = Vec::new();
    let mut refs = Vec::new();
    let mut references_base = false;
    emit_into(expr, &mut code, &mut refs, &mut references_base)?;
    Ok(Emitted { code, refs, references_base })
}

fn emit_into(
    expr: &Expr,
    code: &mut Vec<Instr>,
    refs: &mut Vec<NoteId>,
    references_base: &mut bool,
) -> Result<(), String> {
    match expr {
        Expr::Num(r) => {
            let num = i32::try_from(r.numer()).map_err(|_| "constant numerator out of range".to_string())?;
            let den = i32::try_from(r.denom()).map_err(|_| "constant denominator out of range".to_string())?;
            code.push(Instr::LoadConst(num, den));
        }
        Expr::NoteRefLit(id) => {
            let num = i32::try_from(*id).map_err(|_| "note id out of range".to_string())?;
            code.push(Instr::LoadConst(num, 1));
            if *id == crate::note::BASE_NOTE_ID {
                *references_base = true;
            } else if !refs.contains(id) {
                refs.push(*id);
            }
        }
        Expr::BaseProp(kind) => {
            code.push(Instr::LoadBase(*kind));
            *references_base = true;
        }
        Expr::RefProp(id, kind) => {
            if *id > u16::MAX as NoteId {
                return Err(format!("note id {} exceeds the {}-bit bytecode reference width", id, 16));
            }
            code.push(Instr::LoadRef(*id, *kind));
            if !refs.contains(id) {
                refs.push(*id);
            }
        }
        Expr::Tempo(x) => {
            emit_into(x, code, refs, references_base)?;
            code.push(Instr::FindTempo);
        }
        Expr::Measure(x) => {
            emit_into(x, code, refs, references_base)?;
            code.push(Instr::FindMeasure);
        }
        Expr::Beat(x) => {
            // beat(x) == 60 / tempo(x); normalized to LoadConst(60,1), x's
            // bytecode, FindTempo, Div (§4.2).
            code.push(Instr::LoadConst(60, 1));
            emit_into(x, code, refs, references_base)?;
            code.push(Instr::FindTempo);
            code.push(Instr::Div);
        }
        Expr::Neg(x) => {
            emit_into(x, code, refs, references_base)?;
            code.push(Instr::Neg);
        }
        Expr::Bin(op, a, b) => {
            emit_into(a, code, refs, references_base)?;
            emit_into(b, code, refs, references_base)?;
            code.push(match op {
                BinOp::Add => Instr::Add,
                BinOp::Sub => Instr::Sub,
                BinOp::Mul => Instr::Mul,
                BinOp::Div => Instr::Div,
                BinOp::Pow => Instr::Pow,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rational::Rational;
    use crate::variable::VariableKind;

    #[test]
    fn emits_post_order() {
        let expr = Expr::Bin(
            BinOp::Add,
            Box::new(Expr::Num(Rational::from_integer(1))),
            Box::new(Expr::Num(Rational::from_integer(2))),
        );
        let emitted = emit(&expr).unwrap();
        assert_eq!(
            emitted.code,
            vec![Instr::LoadConst(1, 1), Instr::LoadConst(2, 1), Instr::Add]
        );
    }

    #[test]
    fn dedups_references() {
        let expr = Expr::Bin(
            BinOp::Add,
            Box::new(Expr::RefProp(3, VariableKind::StartTime)),
            Box::new(Expr::RefProp(3, VariableKind::Duration)),
        );
        let emitted = emit(&expr).unwrap();
        assert_eq!(emitted.refs, vec![3]);
    }

    #[test]
    fn base_prop_does_not_register_as_a_dependency() {
        let expr = Expr::BaseProp(VariableKind::Frequency);
        let emitted = emit(&expr).unwrap();
        assert!(emitted.references_base);
        assert!(emitted.refs.is_empty());
    }

    #[test]
    fn bare_note_ref_lit_registers_as_a_dependency() {
        let expr = Expr::Tempo(Box::new(Expr::NoteRefLit(5)));
        let emitted = emit(&expr).unwrap();
        assert_eq!(emitted.refs, vec![5]);
        assert!(!emitted.references_base);
    }

    #[test]
    fn bare_note_ref_lit_to_base_sets_references_base() {
        let expr = Expr::Measure(Box::new(Expr::NoteRefLit(crate::note::BASE_NOTE_ID)));
        let emitted = emit(&expr).unwrap();
        assert!(emitted.refs.is_empty());
        assert!(emitted.references_base);
    }

    #[test]
    fn beat_normalizes_to_const_find_tempo_div() {
        let expr = Expr::Beat(Box::new(Expr::NoteRefLit(0)));
        let emitted = emit(&expr).unwrap();
        assert_eq!(
            emitted.code,
            vec![
                Instr::LoadConst(60, 1),
                Instr::LoadConst(0, 1),
                Instr::FindTempo,
                Instr::Div,
            ]
        );
    }
}
