//! Big-endian persistence encoding for `Instr` streams (§6.2).
//!
//! Stable and suitable for inter-process transfer: opcode byte first, then
//! fixed-width operands as documented on `Opcode`. This is deliberately
//! separate from the in-memory `Instr` IR so the wire format can be audited
//! (and fuzzed/round-tripped in tests) independent of how the compiler or
//! evaluator model instructions.

use crate::bytecode::{Instr, Opcode};
use crate::error::EngineError;
use crate::variable::VariableKind;

pub fn encode(program: &[Instr]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(program.len() * 4);
    for instr in program {
        match *instr {
            Instr::LoadConst(num, den) => {
                buf.push(Opcode::LoadConst as u8);
                buf.extend_from_slice(&num.to_be_bytes());
                buf.extend_from_slice(&den.to_be_bytes());
            }
            Instr::LoadRef(note_id, kind) => {
                buf.push(Opcode::LoadRef as u8);
                buf.extend_from_slice(&(note_id as u16).to_be_bytes());
                buf.push(kind as u8);
            }
            Instr::LoadBase(kind) => {
                buf.push(Opcode::LoadBase as u8);
                buf.push(kind as u8);
            }
            Instr::Add => buf.push(Opcode::Add as u8),
            Instr::Sub => buf.push(Opcode::Sub as u8),
            Instr::Mul => buf.push(Opcode::Mul as u8),
            Instr::Div => buf.push(Opcode::Div as u8),
            Instr::Neg => buf.push(Opcode::Neg as u8),
            Instr::Pow => buf.push(Opcode::Pow as u8),
            Instr::FindTempo => buf.push(Opcode::FindTempo as u8),
            Instr::FindMeasure => buf.push(Opcode::FindMeasure as u8),
            Instr::Dup => buf.push(Opcode::Dup as u8),
            Instr::Swap => buf.push(Opcode::Swap as u8),
        }
    }
    buf
}

pub fn decode(bytes: &[u8]) -> Result<Vec<Instr>, EngineError> {
    let mut out = Vec::new();
    let mut i = 0usize;

    macro_rules! take {
        ($n:expr) => {{
            if i + $n > bytes.len() {
                return Err(EngineError::ParseError("truncated bytecode".into()));
            }
            let s = &bytes[i..i + $n];
            i += $n;
            s
        }};
    }

    while i < bytes.len() {
        let opcode = Opcode::from_byte(bytes[i])
            .ok_or_else(|| EngineError::ParseError(format!("unknown opcode byte 0x{:02X}", bytes[i])))?;
        i += 1;
        let instr = match opcode {
            Opcode::LoadConst => {
                let num = i32::from_be_bytes(take!(4).try_into().unwrap());
                let den = i32::from_be_bytes(take!(4).try_into().unwrap());
                Instr::LoadConst(num, den)
            }
            Opcode::LoadRef => {
                let id = u16::from_be_bytes(take!(2).try_into().unwrap());
                let var = read_var(take!(1)[0])?;
                Instr::LoadRef(id as u32, var)
            }
            Opcode::LoadBase => {
                let var = read_var(take!(1)[0])?;
                Instr::LoadBase(var)
            }
            Opcode::Add => Instr::Add,
            Opcode::Sub => Instr::Sub,
            Opcode::Mul => Instr::Mul,
            Opcode::Div => Instr::Div,
            Opcode::Neg => Instr::Neg,
            Opcode::Pow => Instr::Pow,
            Opcode::FindTempo => Instr::FindTempo,
            Opcode::FindMeasure => Instr::FindMeasure,
            Opcode::Dup => Instr::Dup,
            Opcode::Swap => Instr::Swap,
        };
        out.push(instr);
    }

    Ok(out)
}

fn read_var(b: u8) -> Result<VariableKind, EngineError> {
    VariableKind::from_u8(b).ok_or_else(|| EngineError::ParseError(format!("invalid variable tag {}", b)))
}

/// Render a byte buffer as a human-readable opcode listing, one instruction
/// per line. Debug/test tooling only; never round-tripped through.
pub fn disassemble(bytes: &[u8]) -> String {
    match decode(bytes) {
        Ok(instrs) => instrs
            .iter()
            .map(|i| format!("{:?}", i))
            .collect::<Vec<_>>()
            .join("\n"),
        Err(e) => format!("<invalid bytecode: {}>", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_instruction_shape() {
        let program = vec![
            Instr::LoadConst(-3, 4),
            Instr::LoadRef(7, VariableKind::Frequency),
            Instr::LoadBase(VariableKind::Tempo),
            Instr::Add,
            Instr::Sub,
            Instr::Mul,
            Instr::Div,
            Instr::Neg,
            Instr::Pow,
            Instr::FindTempo,
            Instr::FindMeasure,
            Instr::Dup,
            Instr::Swap,
        ];
        let bytes = encode(&program);
        let back = decode(&bytes).unwrap();
        assert_eq!(program, back);
    }

    #[test]
    fn load_const_is_nine_bytes() {
        let bytes = encode(&[Instr::LoadConst(1, 2)]);
        assert_eq!(bytes.len(), 9);
    }

    #[test]
    fn load_ref_is_four_bytes() {
        let bytes = encode(&[Instr::LoadRef(1, VariableKind::Duration)]);
        assert_eq!(bytes.len(), 4);
    }

    #[test]
    fn nullary_ops_are_one_byte() {
        let bytes = encode(&[Instr::Add]);
        assert_eq!(bytes.len(), 1);
    }

    #[test]
    fn rejects_truncated_buffer() {
        let bytes = encode(&[Instr::LoadConst(1, 2)]);
        assert!(decode(&bytes[..5]).is_err());
    }

    #[test]
    fn rejects_unknown_opcode() {
        assert!(decode(&[0xFF]).is_err());
    }
}
