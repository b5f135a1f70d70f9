//! Parser for the legacy fluent surface (§4.2):
//! `module.baseNote.getVariable('name')`, `module.getNoteById(n).getVariable('name')`,
//! `new Fraction(n[,d])`, `.add/.sub/.mul/.div/.pow/.neg`,
//! `module.findTempo(...)`, `module.findMeasureLength(...)`.
//!
//! Parses to the same [`Expr`] tree the short-DSL parser produces, so
//! emission is shared.

use crate::compiler::ast::{BinOp, Expr};
use crate::note::NoteId;
use crate::rational::Rational;
use crate::variable::VariableKind;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Number(f64),
    Str(String),
    Dot,
    LParen,
    RParen,
    Comma,
    Eof,
}

fn lex(src: &str) -> Result<Vec<Tok>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                toks.push(Tok::Dot);
                i += 1;
            }
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            ',' => {
                toks.push(Tok::Comma);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err("unterminated string literal".into());
                }
                toks.push(Tok::Str(chars[start..i].iter().collect()));
                i += 1;
            }
            '-' if i + 1 < chars.len() && chars[i + 1].is_ascii_digit() => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                toks.push(Tok::Number(text.parse().map_err(|_| "bad number".to_string())?));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                toks.push(Tok::Number(text.parse().map_err(|_| "bad number".to_string())?));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                toks.push(Tok::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }
    toks.push(Tok::Eof);
    Ok(toks)
}

pub fn parse(src: &str) -> Result<Expr, String> {
    let tokens = lex(src)?;
    let mut p = LegacyParser { tokens, pos: 0 };
    let expr = p.parse_chain()?;
    p.expect(&Tok::Eof)?;
    Ok(expr)
}

struct LegacyParser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl LegacyParser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Tok {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Tok) -> Result<(), String> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(format!("expected {:?}, found {:?}", expected, self.peek()))
        }
    }

    fn expect_ident(&mut self, name: &str) -> Result<(), String> {
        match self.advance() {
            Tok::Ident(s) if s == name => Ok(()),
            other => Err(format!("expected '{}', found {:?}", name, other)),
        }
    }

    fn parse_chain(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;
        while *self.peek() == Tok::Dot {
            self.advance();
            let method = match self.advance() {
                Tok::Ident(s) => s,
                other => return Err(format!("expected method name, found {:?}", other)),
            };
            match method.as_str() {
                "add" | "sub" | "mul" | "div" | "pow" => {
                    self.expect(&Tok::LParen)?;
                    let arg = self.parse_chain()?;
                    self.expect(&Tok::RParen)?;
                    let op = match method.as_str() {
                        "add" => BinOp::Add,
                        "sub" => BinOp::Sub,
                        "mul" => BinOp::Mul,
                        "div" => BinOp::Div,
                        _ => BinOp::Pow,
                    };
                    expr = Expr::Bin(op, Box::new(expr), Box::new(arg));
                }
                "neg" => {
                    self.expect(&Tok::LParen)?;
                    self.expect(&Tok::RParen)?;
                    expr = Expr::Neg(Box::new(expr));
                }
                "getVariable" => {
                    self.expect(&Tok::LParen)?;
                    let name = match self.advance() {
                        Tok::Str(s) => s,
                        other => return Err(format!("expected property string, found {:?}", other)),
                    };
                    self.expect(&Tok::RParen)?;
                    let kind = VariableKind::from_shortcut(&name)
                        .ok_or_else(|| format!("unknown property '{}'", name))?;
                    expr = match expr {
                        Expr::NoteRefLit(0) => Expr::BaseProp(kind),
                        Expr::NoteRefLit(id) => Expr::RefProp(id, kind),
                        other => return Err(format!("getVariable() on non-reference expression {:?}", other)),
                    };
                }
                other => return Err(format!("unknown method '{}'", other)),
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Tok::Ident(s) if s == "module" => {
                self.expect(&Tok::Dot)?;
                match self.advance() {
                    Tok::Ident(s) if s == "baseNote" => Ok(Expr::NoteRefLit(0)),
                    Tok::Ident(s) if s == "getNoteById" => {
                        self.expect(&Tok::LParen)?;
                        let id = self.parse_note_id()?;
                        self.expect(&Tok::RParen)?;
                        Ok(Expr::NoteRefLit(id))
                    }
                    Tok::Ident(s) if s == "findTempo" => {
                        self.expect(&Tok::LParen)?;
                        let arg = self.parse_chain()?;
                        self.expect(&Tok::RParen)?;
                        Ok(Expr::Tempo(Box::new(arg)))
                    }
                    Tok::Ident(s) if s == "findMeasureLength" => {
                        self.expect(&Tok::LParen)?;
                        let arg = self.parse_chain()?;
                        self.expect(&Tok::RParen)?;
                        Ok(Expr::Measure(Box::new(arg)))
                    }
                    other => Err(format!("unknown module member {:?}", other)),
                }
            }
            Tok::Ident(s) if s == "new" => {
                self.expect_ident("Fraction")?;
                self.expect(&Tok::LParen)?;
                let num = self.parse_number()?;
                let den = if *self.peek() == Tok::Comma {
                    self.advance();
                    self.parse_number()?
                } else {
                    1
                };
                self.expect(&Tok::RParen)?;
                Ok(Expr::Num(Rational::new(num, den)))
            }
            Tok::Number(n) => Ok(Expr::Num(if n.fract() == 0.0 {
                Rational::from_integer(n as i64)
            } else {
                Rational::from_f64_approx(n)
            })),
            other => Err(format!("unexpected token {:?}", other)),
        }
    }

    fn parse_note_id(&mut self) -> Result<NoteId, String> {
        match self.advance() {
            Tok::Number(n) if n.fract() == 0.0 && n >= 0.0 => Ok(n as NoteId),
            other => Err(format!("expected note id, found {:?}", other)),
        }
    }

    fn parse_number(&mut self) -> Result<i64, String> {
        match self.advance() {
            Tok::Number(n) if n.fract() == 0.0 => Ok(n as i64),
            other => Err(format!("expected integer, found {:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_base_getvariable() {
        assert_eq!(
            parse("module.baseNote.getVariable('frequency')").unwrap(),
            Expr::BaseProp(VariableKind::Frequency)
        );
    }

    #[test]
    fn parses_note_by_id() {
        assert_eq!(
            parse("module.getNoteById(2).getVariable('startTime')").unwrap(),
            Expr::RefProp(2, VariableKind::StartTime)
        );
    }

    #[test]
    fn parses_fraction_and_mul() {
        assert_eq!(
            parse("module.baseNote.getVariable('f').mul(new Fraction(3,2))").unwrap(),
            Expr::Bin(
                BinOp::Mul,
                Box::new(Expr::BaseProp(VariableKind::Frequency)),
                Box::new(Expr::Num(Rational::new(3, 2)))
            )
        );
    }

    #[test]
    fn parses_find_tempo() {
        assert_eq!(
            parse("module.findTempo(module.getNoteById(1))").unwrap(),
            Expr::Tempo(Box::new(Expr::NoteRefLit(1)))
        );
    }

    #[test]
    fn parses_neg_and_add_chain() {
        assert_eq!(
            parse("module.baseNote.getVariable('t').add(new Fraction(1)).neg()").unwrap(),
            Expr::Neg(Box::new(Expr::Bin(
                BinOp::Add,
                Box::new(Expr::BaseProp(VariableKind::StartTime)),
                Box::new(Expr::Num(Rational::from_integer(1)))
            )))
        );
    }
}
